//! Sequential candidate refinement through external policy plugins.

use std::collections::BTreeMap;

use tracing::{info, warn};

use reef_core::{Candidate, FrameworkHandle, Workload};

use crate::error::{PreemptionError, Result};
use crate::strategy::PreemptionStrategy;

/// Runs every registered extender over the candidate set, sequentially.
///
/// Extenders that do not support preemption or are not interested in the
/// preemptor are skipped. A failing extender aborts the cycle unless it is
/// marked ignorable; ignorable failures are logged and skipped. Nodes an
/// extender omits from its result are dropped, and an entry with no victims
/// is an error for non-ignorable extenders.
pub fn call_extenders(
    handle: &dyn FrameworkHandle,
    strategy: &dyn PreemptionStrategy,
    pod: &Workload,
    candidates: Vec<Candidate>,
) -> Result<Vec<Candidate>> {
    let extenders = handle.extenders();
    if extenders.is_empty() {
        return Ok(candidates);
    }

    // Candidates are keyed by node here, which requires distinct nodes per
    // candidate; plugins emitting several candidates for one node are not
    // supported on this path.
    let mut victims_map = strategy.candidates_to_victims_map(&candidates);
    if victims_map.is_empty() {
        return Ok(candidates);
    }
    let nodes = handle.snapshot();

    for extender in extenders {
        if !extender.supports_preemption() || !extender.is_interested(pod) {
            continue;
        }
        let mut refined: BTreeMap<_, _> =
            match extender.process_preemption(pod, victims_map.clone(), &nodes) {
                Ok(refined) => refined,
                Err(e) => {
                    if extender.is_ignorable() {
                        info!(
                            extender = extender.name(),
                            error = %e,
                            "skipped failing extender with ignorable flag set"
                        );
                        continue;
                    }
                    return Err(PreemptionError::Extender {
                        name: extender.name().to_string(),
                        message: e.to_string(),
                    });
                }
            };

        let empty_nodes: Vec<String> = refined
            .iter()
            .filter(|(_, victims)| victims.pods.is_empty())
            .map(|(node, _)| node.clone())
            .collect();
        for node in empty_nodes {
            if !extender.is_ignorable() {
                return Err(PreemptionError::EmptyVictims { node });
            }
            warn!(
                extender = extender.name(),
                node, "ignored node for which the extender reported no victims"
            );
            refined.remove(&node);
        }

        // The refined map feeds the next extender.
        victims_map = refined;
        if victims_map.is_empty() {
            break;
        }
    }

    Ok(victims_map
        .into_iter()
        .map(|(name, victims)| Candidate::new(name, victims))
        .collect())
}
