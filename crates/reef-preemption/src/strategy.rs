//! Plugin-variable preemption algorithms.
//!
//! The framework binds one [`PreemptionStrategy`] per evaluator at
//! construction. [`DefaultStrategy`] is the in-tree implementation used by
//! the GPU batch scheduler: victims are chosen by GPU arithmetic with a
//! reprieve pass that keeps as many lower-priority workloads running as
//! possible, preferring to spare the ones whose eviction would violate a
//! disruption budget.

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use reef_core::{
    Candidate, CycleState, DisruptionBudget, NodeInfo, PreemptionPolicy, Status, StatusCode,
    Victims, Workload,
};

/// A per-node score used by the tie-break scorer; higher wins.
pub type ScoreFn<'a> = Box<dyn Fn(&str) -> i64 + Sync + 'a>;

/// The capability record of plugin-variable preemption algorithms.
pub trait PreemptionStrategy: Send + Sync {
    /// Chooses a starting offset into the potential-node list and the number
    /// of candidates to shortlist for the dry-run.
    fn offset_and_num_candidates(&self, node_count: usize) -> (usize, usize);

    /// Whether the preemptor may displace other workloads at all.
    /// `nominated_status` is the prior cycle's status for the preemptor's
    /// nominated node, when it has one.
    fn eligible_to_preempt(
        &self,
        pod: &Workload,
        nominated_status: Option<&Status>,
    ) -> (bool, String);

    /// Computes the minimum victim set on one node. Both `state` and `node`
    /// are deep copies owned by the calling task.
    fn select_victims(
        &self,
        state: &mut CycleState,
        pod: &Workload,
        node: &NodeInfo,
        budgets: &[DisruptionBudget],
    ) -> (Vec<Workload>, u64, Status);

    /// Builds a node-to-victims map from a candidate list. Candidates must
    /// refer to distinct nodes.
    fn candidates_to_victims_map(&self, candidates: &[Candidate]) -> BTreeMap<String, Victims>;

    /// Ordered score functions for the tie-break scorer, or `None` to use
    /// the default layered criteria.
    fn ordered_score_funcs<'a>(
        &self,
        victims: &'a BTreeMap<String, Victims>,
    ) -> Option<Vec<ScoreFn<'a>>>;
}

/// Configuration for [`DefaultStrategy`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultStrategyConfig {
    /// Percentage of potential nodes to shortlist as candidates.
    pub min_candidate_nodes_percentage: usize,
    /// Lower bound on the candidate shortlist, before clamping to the
    /// number of potential nodes.
    pub min_candidate_nodes_absolute: usize,
}

impl Default for DefaultStrategyConfig {
    fn default() -> Self {
        Self {
            min_candidate_nodes_percentage: 10,
            min_candidate_nodes_absolute: 100,
        }
    }
}

/// Default strategy: GPU-fit victim selection with budget-aware reprieve.
#[derive(Debug, Clone, Default)]
pub struct DefaultStrategy {
    config: DefaultStrategyConfig,
}

impl DefaultStrategy {
    /// Creates the strategy with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the strategy with the given configuration.
    #[must_use]
    pub const fn with_config(config: DefaultStrategyConfig) -> Self {
        Self { config }
    }
}

/// Orders workloads by importance: higher priority first, earlier start
/// breaking ties.
fn more_important(a: &Workload, b: &Workload) -> std::cmp::Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.start_time.cmp(&b.start_time))
}

/// Splits workloads into those whose eviction would violate a budget and
/// those whose eviction fits within the budgets' allowed disruptions.
/// Allowances are consumed in iteration order.
fn split_by_budget(
    pods: Vec<Workload>,
    budgets: &[DisruptionBudget],
) -> (Vec<Workload>, Vec<Workload>) {
    let mut allowed: Vec<u32> = budgets.iter().map(|b| b.disruptions_allowed).collect();
    let mut violating = Vec::new();
    let mut non_violating = Vec::new();
    for pod in pods {
        let mut violates = false;
        for (i, budget) in budgets.iter().enumerate() {
            if !budget.matches(&pod) {
                continue;
            }
            if let Some(slot) = allowed.get_mut(i) {
                if *slot == 0 {
                    violates = true;
                } else {
                    *slot -= 1;
                }
            }
        }
        if violates {
            violating.push(pod);
        } else {
            non_violating.push(pod);
        }
    }
    (violating, non_violating)
}

impl PreemptionStrategy for DefaultStrategy {
    fn offset_and_num_candidates(&self, node_count: usize) -> (usize, usize) {
        if node_count == 0 {
            return (0, 0);
        }
        let offset = rand::rng().random_range(0..node_count);
        let from_percentage = node_count * self.config.min_candidate_nodes_percentage / 100;
        let num = from_percentage
            .max(self.config.min_candidate_nodes_absolute)
            .min(node_count);
        (offset, num)
    }

    fn eligible_to_preempt(
        &self,
        pod: &Workload,
        nominated_status: Option<&Status>,
    ) -> (bool, String) {
        if pod.preemption_policy == PreemptionPolicy::Never {
            return (false, "preemptor has a never-preempt policy".into());
        }
        if pod.terminating {
            return (false, "preemptor is terminating".into());
        }
        if pod.nominated_node.is_some() {
            if let Some(status) = nominated_status {
                if status.code() != StatusCode::UnschedulableAndUnresolvable {
                    return (
                        false,
                        "previously nominated node is still awaiting victim termination".into(),
                    );
                }
            }
        }
        (true, String::new())
    }

    fn select_victims(
        &self,
        _state: &mut CycleState,
        pod: &Workload,
        node: &NodeInfo,
        budgets: &[DisruptionBudget],
    ) -> (Vec<Workload>, u64, Status) {
        let mut potential: Vec<Workload> = node
            .pods
            .iter()
            .filter(|p| p.priority < pod.priority)
            .cloned()
            .collect();
        if potential.is_empty() {
            return (
                Vec::new(),
                0,
                Status::unschedulable(format!(
                    "no lower-priority workloads on node {}",
                    node.name
                )),
            );
        }

        // Fit check with every potential victim removed.
        let capacity = u64::from(node.gpu_capacity);
        let unremovable: u64 = node
            .pods
            .iter()
            .filter(|p| p.priority >= pod.priority)
            .map(|p| u64::from(p.resources.gpus))
            .sum();
        let mut used = unremovable + u64::from(pod.resources.gpus);
        if used > capacity {
            return (
                Vec::new(),
                0,
                Status::unschedulable(format!(
                    "insufficient gpu capacity on node {} even after removing all lower-priority workloads",
                    node.name
                )),
            );
        }

        // Reprieve as many potential victims as still fit, sparing
        // budget-violating workloads first.
        potential.sort_by(more_important);
        let (violating, non_violating) = split_by_budget(potential, budgets);

        let mut victims = Vec::new();
        let mut num_violations = 0u64;
        let reprieve = |p: Workload, used: &mut u64, victims: &mut Vec<Workload>| -> bool {
            let next = *used + u64::from(p.resources.gpus);
            if next <= capacity {
                *used = next;
                true
            } else {
                victims.push(p);
                false
            }
        };
        for p in violating {
            if !reprieve(p, &mut used, &mut victims) {
                num_violations += 1;
            }
        }
        for p in non_violating {
            let _ = reprieve(p, &mut used, &mut victims);
        }

        if victims.is_empty() {
            // The preemptor fits without evicting anyone; preemption on
            // this node is pointless.
            return (
                Vec::new(),
                0,
                Status::unschedulable(format!("workload fits node {} without preemption", node.name)),
            );
        }

        victims.sort_by(more_important);
        (victims, num_violations, Status::success())
    }

    fn candidates_to_victims_map(&self, candidates: &[Candidate]) -> BTreeMap<String, Victims> {
        candidates
            .iter()
            .map(|c| (c.name.clone(), c.victims.clone()))
            .collect()
    }

    fn ordered_score_funcs<'a>(
        &self,
        _victims: &'a BTreeMap<String, Victims>,
    ) -> Option<Vec<ScoreFn<'a>>> {
        None
    }
}
