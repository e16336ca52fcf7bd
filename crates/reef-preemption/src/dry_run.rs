//! Parallel dry-run of preemption across potential nodes.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use tracing::debug;

use reef_core::{
    CancelHandle, Candidate, CycleState, DisruptionBudget, NodeInfo, Parallelizer, Status,
    StatusCode, Victims, Workload,
};

use crate::candidate::CandidateList;
use crate::strategy::PreemptionStrategy;

/// Output of one dry-run pass.
#[derive(Debug, Default)]
pub struct DryRunOutcome {
    /// Shortlisted candidates, disruption-budget-clean ones first.
    pub candidates: Vec<Candidate>,
    /// Status per node that produced no candidate.
    pub statuses: BTreeMap<String, Status>,
    /// Messages of plugin-level errors, aggregated.
    pub errors: Vec<String>,
}

/// Simulates preemption on `potential` nodes in parallel and shortlists up
/// to `num_candidates` candidates.
///
/// Task *i* processes the node at index `(offset + i) % len`, so every task
/// owns a distinct node. Victim computation runs against per-task deep
/// copies of the node snapshot and cycle state. Once the shortlist is full
/// and contains at least one budget-clean candidate, outstanding tasks are
/// cancelled; tasks already past the cancellation check still publish, so
/// the result may exceed the cap by up to `workers - 1` candidates.
#[allow(clippy::too_many_arguments)]
pub fn dry_run_preemption(
    parallelizer: &Parallelizer,
    strategy: &dyn PreemptionStrategy,
    state: &CycleState,
    pod: &Workload,
    potential: &[NodeInfo],
    budgets: &[DisruptionBudget],
    offset: usize,
    num_candidates: usize,
    cancel: &CancelHandle,
    plugin: &str,
) -> DryRunOutcome {
    if potential.is_empty() || num_candidates == 0 {
        return DryRunOutcome::default();
    }

    let non_violating = CandidateList::new(num_candidates);
    let violating = CandidateList::new(num_candidates);
    let cancel = cancel.child();
    let statuses: Mutex<BTreeMap<String, Status>> = Mutex::new(BTreeMap::new());
    let errors: Mutex<Vec<String>> = Mutex::new(Vec::new());

    let check_node = |i: usize| {
        let node = potential[(offset + i) % potential.len()].snapshot();
        let mut state_copy = state.clone();
        let (pods, num_violations, status) =
            strategy.select_victims(&mut state_copy, pod, &node, budgets);

        if status.is_success() && !pods.is_empty() {
            let candidate = Candidate::new(
                node.name.clone(),
                Victims {
                    pods,
                    num_pdb_violations: num_violations,
                },
            );
            if num_violations == 0 {
                non_violating.add(candidate);
            } else {
                violating.add(candidate);
            }
            let (nvc, vc) = (non_violating.size(), violating.size());
            if nvc > 0 && nvc + vc >= num_candidates {
                // Enough candidates with at least one budget-clean option;
                // more work cannot improve the final ranking.
                cancel.cancel();
            }
            return;
        }

        let status = if status.is_success() {
            Status::error(format!(
                "expected at least one victim pod on node {}",
                node.name
            ))
        } else {
            status
        };
        if status.code() == StatusCode::Error {
            errors.lock().push(status.reason().to_string());
        }
        statuses.lock().insert(node.name, status);
    };

    parallelizer.until(&cancel, potential.len(), check_node, plugin);

    let mut candidates = non_violating.snapshot();
    candidates.extend(violating.snapshot());
    debug!(
        plugin,
        candidates = candidates.len(),
        cap = num_candidates,
        "dry run finished"
    );
    DryRunOutcome {
        candidates,
        statuses: statuses.into_inner(),
        errors: errors.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::DefaultStrategy;

    fn preemptor() -> Workload {
        Workload::new("training", "preemptor")
            .with_priority(50)
            .with_gpus(2)
    }

    fn victim_node(name: &str) -> NodeInfo {
        NodeInfo::new(name, 2)
            .with_pod(Workload::new("training", format!("victim-{name}")).with_priority(10).with_gpus(2))
    }

    fn blocked_node(name: &str) -> NodeInfo {
        NodeInfo::new(name, 2)
            .with_pod(Workload::new("training", format!("high-{name}")).with_priority(100).with_gpus(2))
    }

    #[test]
    fn collects_candidates_from_eligible_nodes() {
        let parallelizer = Parallelizer::new(4);
        let strategy = DefaultStrategy::new();
        let potential = vec![victim_node("n1"), blocked_node("n2"), victim_node("n3")];

        let outcome = dry_run_preemption(
            &parallelizer,
            &strategy,
            &CycleState::new(),
            &preemptor(),
            &potential,
            &[],
            0,
            3,
            &CancelHandle::new(),
            "test",
        );

        let mut names: Vec<&str> = outcome.candidates.iter().map(|c| c.name.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["n1", "n3"]);
        assert_eq!(
            outcome.statuses.get("n2").map(Status::code),
            Some(StatusCode::Unschedulable)
        );
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn every_candidate_refers_to_a_distinct_node() {
        let parallelizer = Parallelizer::new(4);
        let strategy = DefaultStrategy::new();
        let potential: Vec<NodeInfo> = (0..8).map(|i| victim_node(&format!("n{i}"))).collect();

        let outcome = dry_run_preemption(
            &parallelizer,
            &strategy,
            &CycleState::new(),
            &preemptor(),
            &potential,
            &[],
            5,
            8,
            &CancelHandle::new(),
            "test",
        );

        let mut names: Vec<&str> = outcome.candidates.iter().map(|c| c.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), outcome.candidates.len());
    }

    #[test]
    fn budget_clean_candidates_come_first() {
        let parallelizer = Parallelizer::new(2);
        let strategy = DefaultStrategy::new();
        let guarded = Workload::new("training", "guarded")
            .with_priority(10)
            .with_gpus(2)
            .with_label("app", "guarded");
        let potential = vec![
            NodeInfo::new("pdb-node", 2).with_pod(guarded),
            victim_node("clean-node"),
        ];
        let budgets = vec![DisruptionBudget::new("pdb", 0).with_selector("app", "guarded")];

        let outcome = dry_run_preemption(
            &parallelizer,
            &strategy,
            &CycleState::new(),
            &preemptor(),
            &potential,
            &budgets,
            0,
            2,
            &CancelHandle::new(),
            "test",
        );

        assert_eq!(outcome.candidates.len(), 2);
        assert_eq!(outcome.candidates[0].name, "clean-node");
        assert_eq!(outcome.candidates[0].victims.num_pdb_violations, 0);
        assert_eq!(outcome.candidates[1].name, "pdb-node");
        assert_eq!(outcome.candidates[1].victims.num_pdb_violations, 1);
    }

    #[test]
    fn candidate_cap_allows_bounded_overshoot() {
        let parallelizer = Parallelizer::new(4);
        let strategy = DefaultStrategy::new();
        let potential: Vec<NodeInfo> = (0..64).map(|i| victim_node(&format!("n{i:02}"))).collect();
        let cap = 4;

        let outcome = dry_run_preemption(
            &parallelizer,
            &strategy,
            &CycleState::new(),
            &preemptor(),
            &potential,
            &[],
            17,
            cap,
            &CancelHandle::new(),
            "test",
        );

        let len = outcome.candidates.len();
        assert!(len >= cap, "collected {len}");
        assert!(
            len <= cap + parallelizer.workers() - 1,
            "collected {len} candidates for cap {cap}"
        );
    }

    #[test]
    fn pre_cancelled_run_produces_nothing() {
        let parallelizer = Parallelizer::new(2);
        let strategy = DefaultStrategy::new();
        let potential = vec![victim_node("n1")];
        let cancel = CancelHandle::new();
        cancel.cancel();

        let outcome = dry_run_preemption(
            &parallelizer,
            &strategy,
            &CycleState::new(),
            &preemptor(),
            &potential,
            &[],
            0,
            1,
            &CancelHandle::new(),
            "test",
        );
        // The dry-run derives a child handle, so the outer cancellation
        // propagates down.
        let cancelled_outcome = dry_run_preemption(
            &parallelizer,
            &strategy,
            &CycleState::new(),
            &preemptor(),
            &potential,
            &[],
            0,
            1,
            &cancel,
            "test",
        );

        assert_eq!(outcome.candidates.len(), 1);
        assert!(cancelled_outcome.candidates.is_empty());
        assert!(cancelled_outcome.statuses.is_empty());
    }
}
