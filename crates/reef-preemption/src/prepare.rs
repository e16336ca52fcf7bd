//! Preparation work before nominating the selected candidate.

use parking_lot::Mutex;
use tracing::{info, warn};

use reef_core::{
    CancelHandle, Candidate, DisruptionCondition, FrameworkHandle, Status, Workload,
};

use crate::error::PreemptionError;
use crate::evaluator::EvaluatorConfig;

/// Evicts the candidate's victims and cleans up stale nominations.
///
/// Victims are evicted in parallel. A victim held in the admission gate is
/// rejected with reason `preempted` instead of deleted; other victims are
/// optionally patched with a disruption condition and then deleted. The
/// first eviction error cancels the remaining evictions and is surfaced.
/// After a successful eviction round, the victim count is observed as a
/// metric sample and lower-priority workloads nominated to the chosen node
/// have their nomination cleared best-effort.
pub fn prepare_candidate(
    handle: &dyn FrameworkHandle,
    config: &EvaluatorConfig,
    candidate: &Candidate,
    pod: &Workload,
    plugin: &str,
    cancel: &CancelHandle,
) -> Status {
    let client = handle.client();
    let cancel = cancel.child();
    let first_error: Mutex<Option<PreemptionError>> = Mutex::new(None);

    let send_error_with_cancel = |err: PreemptionError| {
        let mut slot = first_error.lock();
        if slot.is_none() {
            *slot = Some(err);
        }
        cancel.cancel();
    };

    let preempt_pod = |index: usize| {
        let Some(victim) = candidate.victims.pods.get(index) else {
            return;
        };
        // A victim still held at the admission gate is rejected there;
        // everything else is deleted from the cluster.
        if let Some(waiting) = handle.waiting_pod(&victim.uid) {
            waiting.reject(plugin, "preempted");
            info!(preemptor = %pod, victim = %victim, node = %candidate.name, "rejected waiting victim");
        } else {
            if config.pod_disruption_conditions {
                let condition = DisruptionCondition::new(
                    "PreemptionByScheduler",
                    format!(
                        "{}: preempting to accommodate a higher priority pod",
                        pod.scheduler_name
                    ),
                );
                if let Err(e) = client.patch_disruption_condition(&victim.reference(), &condition)
                {
                    warn!(victim = %victim, error = %e, "could not add disruption condition");
                    send_error_with_cancel(e.into());
                    return;
                }
            }
            if let Err(e) = client.delete_pod(&victim.reference()) {
                warn!(victim = %victim, error = %e, "eviction failed");
                send_error_with_cancel(e.into());
                return;
            }
            info!(preemptor = %pod, victim = %victim, node = %candidate.name, "evicted victim");
        }

        handle.event_recorder().event(
            &victim.reference(),
            Some(&pod.reference()),
            "Normal",
            "Preempted",
            &format!("Preempted by pod {} on node {}", pod.uid, candidate.name),
        );
    };

    handle
        .parallelizer()
        .until(&cancel, candidate.victims.pods.len(), preempt_pod, plugin);

    if let Some(err) = first_error.into_inner() {
        return Status::error(err.to_string());
    }

    handle
        .metrics()
        .observe_preemption_victims(candidate.victims.pods.len());

    // Lower-priority workloads nominated to this node may no longer fit
    // once the preemptor lands; clearing their nomination sends them back
    // through the queue. Failures here are not fatal.
    for nominee in handle.nominated_pods_for_node(&candidate.name) {
        if nominee.priority >= pod.priority {
            continue;
        }
        if let Err(e) = client.clear_nominated_node(&nominee.reference()) {
            warn!(nominee = %nominee, error = %e, "could not clear nominated node");
        }
    }

    Status::success()
}
