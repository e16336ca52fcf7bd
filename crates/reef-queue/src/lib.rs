//! Pending-queue ordering for the reef GPU batch scheduler.
//!
//! [`PrioritySort`] provides the total order the framework's pending heap
//! sorts by. Three layers, in order:
//!
//! 1. **Elastic residency.** A pod belonging to an elastic job that already
//!    has a pod bound to some node is ordered first, so distributed jobs
//!    co-locate quickly.
//! 2. **Priority.** Higher priority first.
//! 3. **Effective timestamp.** On equal priority the earlier effective
//!    timestamp wins, where a retracted pod reuses its retraction timestamp
//!    (`retract-check-var`) and everything else uses its queue-insertion
//!    time.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use reef_core::{annotations, elastic_job_name, ClusterClient, Workload};

/// A pending workload paired with its queue-insertion time.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedWorkload {
    /// The pending workload.
    pub workload: Workload,
    /// When the workload entered the pending queue.
    pub queued_at: DateTime<Utc>,
}

impl QueuedWorkload {
    /// Creates a queued workload.
    #[must_use]
    pub const fn new(workload: Workload, queued_at: DateTime<Utc>) -> Self {
        Self {
            workload,
            queued_at,
        }
    }

    /// The timestamp this entry sorts by: the retraction timestamp when the
    /// workload was retracted, else the queue-insertion time.
    #[must_use]
    pub fn effective_timestamp(&self) -> DateTime<Utc> {
        self.workload
            .annotations
            .get(annotations::RETRACT_CHECK_VAR)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map_or(self.queued_at, |t| t.with_timezone(&Utc))
    }
}

/// Queue ordering policy over pending workloads.
pub struct PrioritySort {
    client: Arc<dyn ClusterClient>,
}

impl PrioritySort {
    /// Creates the policy over the given cluster client.
    #[must_use]
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self { client }
    }

    /// Strict weak ordering used by the pending heap: `true` when `a` runs
    /// before `b`.
    #[must_use]
    pub fn less(&self, a: &QueuedWorkload, b: &QueuedWorkload) -> bool {
        let a_resident = self.resident_elastic(&a.workload);
        let b_resident = self.resident_elastic(&b.workload);
        if a_resident != b_resident {
            return a_resident;
        }

        let (pa, pb) = (a.workload.priority, b.workload.priority);
        pa > pb || (pa == pb && a.effective_timestamp() < b.effective_timestamp())
    }

    /// Whether the workload belongs to an elastic job with at least one pod
    /// bound to some node.
    fn resident_elastic(&self, workload: &Workload) -> bool {
        let Some(job) = elastic_job_name(&workload.name) else {
            return false;
        };
        self.job_has_bound_pod(&job)
    }

    fn job_has_bound_pod(&self, job: &str) -> bool {
        let nodes = match self.client.list_nodes() {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!(error = %e, "node listing failed");
                return false;
            }
        };
        for node in nodes {
            let pods = match self.client.pods_on_node(&node.name) {
                Ok(pods) => pods,
                Err(e) => {
                    warn!(node = %node.name, error = %e, "pod listing failed");
                    continue;
                }
            };
            if pods
                .iter()
                .any(|p| elastic_job_name(&p.name).as_deref() == Some(job))
            {
                return true;
            }
        }
        false
    }
}
