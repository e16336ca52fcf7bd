//! Preemption evaluator: the `Preempt` entry point.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use reef_core::{
    CancelHandle, Candidate, CycleState, FrameworkHandle, NodeInfo, PostFilterResult, Status,
    StatusCode, Workload,
};

use crate::dry_run::dry_run_preemption;
use crate::error::PreemptionError;
use crate::extender::call_extenders;
use crate::prepare::prepare_candidate;
use crate::scorer::pick_one_node;
use crate::strategy::PreemptionStrategy;

/// Configuration for the evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EvaluatorConfig {
    /// Whether victims are patched with a disruption condition before
    /// deletion.
    pub pod_disruption_conditions: bool,
}

impl EvaluatorConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables the disruption-condition patch.
    #[must_use]
    pub const fn with_pod_disruption_conditions(mut self, enabled: bool) -> Self {
        self.pod_disruption_conditions = enabled;
        self
    }
}

/// Partitions nodes into those where evicting workloads might make the
/// preemptor fit and those whose failure is unresolvable by preemption.
#[must_use]
pub fn nodes_where_preemption_might_help(
    nodes: Vec<NodeInfo>,
    statuses: &BTreeMap<String, Status>,
) -> (Vec<NodeInfo>, BTreeMap<String, Status>) {
    let mut potential = Vec::new();
    let mut rejected = BTreeMap::new();
    for node in nodes {
        // The positive scheduling path marks hopeless nodes as
        // unresolvable; resource pressure shows up as plain Unschedulable.
        if statuses.get(&node.name).map(Status::code)
            == Some(StatusCode::UnschedulableAndUnresolvable)
        {
            rejected.insert(
                node.name,
                Status::unresolvable("Preemption is not helpful for scheduling"),
            );
            continue;
        }
        potential.push(node);
    }
    (potential, rejected)
}

/// Drives one preemption attempt for a single preemptor.
///
/// The returned pairs follow the framework contract:
/// - `(None, Error)`: transient failure, retry later,
/// - `(None, Unschedulable)`: waiting (ineligible preemptor, victims still
///   terminating, extender rejection),
/// - `(Some(cleared), Unschedulable)`: not schedulable even with
///   preemption; any stale nomination is cleared,
/// - `(Some(node), Success)`: commit to the nominated node.
pub struct Evaluator {
    plugin_name: String,
    handle: Arc<dyn FrameworkHandle>,
    strategy: Arc<dyn PreemptionStrategy>,
    state: CycleState,
    config: EvaluatorConfig,
}

impl Evaluator {
    /// Creates an evaluator bound to a framework handle and strategy.
    #[must_use]
    pub fn new(
        plugin_name: impl Into<String>,
        handle: Arc<dyn FrameworkHandle>,
        strategy: Arc<dyn PreemptionStrategy>,
    ) -> Self {
        Self {
            plugin_name: plugin_name.into(),
            handle,
            strategy,
            state: CycleState::new(),
            config: EvaluatorConfig::default(),
        }
    }

    /// Sets the evaluator configuration.
    #[must_use]
    pub fn with_config(mut self, config: EvaluatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Seeds the per-cycle state cloned into every dry-run task.
    #[must_use]
    pub fn with_state(mut self, state: CycleState) -> Self {
        self.state = state;
        self
    }

    /// Attempts to make room for `pod` by evicting lower-priority
    /// workloads. `node_statuses` carries the per-node failures of the
    /// positive scheduling path for this cycle.
    pub fn preempt(
        &self,
        pod: &Workload,
        node_statuses: &BTreeMap<String, Status>,
        cancel: &CancelHandle,
    ) -> (Option<PostFilterResult>, Status) {
        // Work against the freshest view of the preemptor; its priority or
        // nomination may have changed since the cycle began.
        let pod = match self.handle.client().get_pod(&pod.namespace, &pod.name) {
            Ok(pod) => pod,
            Err(e) => {
                error!(error = %e, "could not get the updated preemptor");
                return (None, Status::error(e.to_string()));
            }
        };

        let prior = pod
            .nominated_node
            .as_deref()
            .and_then(|node| node_statuses.get(node));
        let (eligible, reason) = self.strategy.eligible_to_preempt(&pod, prior);
        if !eligible {
            debug!(pod = %pod, reason, "workload is not eligible for preemption");
            return (None, Status::unschedulable(reason));
        }

        let (candidates, statuses, dry_run_error) =
            self.find_candidates(&pod, node_statuses, cancel);
        if candidates.is_empty() {
            if let Some(e) = dry_run_error {
                return (None, Status::error(e.to_string()));
            }
            return (
                Some(PostFilterResult::clearing_nomination()),
                Status::unschedulable(format!(
                    "0/{} nodes are available for preemption",
                    statuses.len()
                )),
            );
        }

        let candidates = match call_extenders(
            self.handle.as_ref(),
            self.strategy.as_ref(),
            &pod,
            candidates,
        ) {
            Ok(candidates) => candidates,
            Err(e) => return (None, Status::error(e.to_string())),
        };

        let Some(best) = self.select_candidate(&candidates) else {
            return (
                None,
                Status::unschedulable("no candidate node for preemption"),
            );
        };

        let status = prepare_candidate(
            self.handle.as_ref(),
            &self.config,
            &best,
            &pod,
            &self.plugin_name,
            cancel,
        );
        if !status.is_success() {
            return (None, status);
        }

        (
            Some(PostFilterResult::with_nominated_node(best.name)),
            Status::success(),
        )
    }

    /// Chooses the best-fit candidate using the layered tie-break scorer.
    #[must_use]
    pub fn select_candidate(&self, candidates: &[Candidate]) -> Option<Candidate> {
        if candidates.is_empty() {
            return None;
        }
        if candidates.len() == 1 {
            return candidates.first().cloned();
        }

        let victims_map = self.strategy.candidates_to_victims_map(candidates);
        let funcs = self.strategy.ordered_score_funcs(&victims_map);
        let Some(node) = pick_one_node(&victims_map, funcs) else {
            error!("no candidate selected, should not reach here");
            return candidates.first().cloned();
        };
        victims_map
            .get(&node)
            .map(|victims| Candidate::new(node.clone(), victims.clone()))
    }

    /// Computes the preemption candidates and per-node statuses.
    fn find_candidates(
        &self,
        pod: &Workload,
        node_statuses: &BTreeMap<String, Status>,
        cancel: &CancelHandle,
    ) -> (Vec<Candidate>, BTreeMap<String, Status>, Option<PreemptionError>) {
        let all_nodes = self.handle.snapshot();
        if all_nodes.is_empty() {
            return (Vec::new(), BTreeMap::new(), Some(PreemptionError::NoNodes));
        }

        let (potential, unresolvable) = nodes_where_preemption_might_help(all_nodes, node_statuses);
        if potential.is_empty() {
            debug!(pod = %pod, "preemption will not help schedule the workload on any node");
            // Clean up any stale nomination; failing to do so is not
            // critical.
            if let Err(e) = self.handle.client().clear_nominated_node(&pod.reference()) {
                warn!(pod = %pod, error = %e, "could not clear nominated node");
            }
            return (Vec::new(), unresolvable, None);
        }

        let budgets = match self.handle.client().list_disruption_budgets() {
            Ok(budgets) => budgets,
            Err(e) => return (Vec::new(), BTreeMap::new(), Some(e.into())),
        };

        let (offset, num_candidates) = self.strategy.offset_and_num_candidates(potential.len());
        debug!(
            pod = %pod,
            potential = potential.len(),
            offset,
            candidates = num_candidates,
            "dry running preemption"
        );

        let outcome = dry_run_preemption(
            self.handle.parallelizer(),
            self.strategy.as_ref(),
            &self.state,
            pod,
            &potential,
            &budgets,
            offset,
            num_candidates,
            cancel,
            &self.plugin_name,
        );

        let mut statuses = outcome.statuses;
        statuses.extend(unresolvable);
        let dry_run_error = if outcome.errors.is_empty() {
            None
        } else {
            Some(PreemptionError::Aggregate {
                errors: outcome.errors,
            })
        };
        (outcome.candidates, statuses, dry_run_error)
    }
}
