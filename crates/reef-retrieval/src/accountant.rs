//! Cluster-wide GPU accounting.

use std::sync::Arc;

use tracing::warn;

use reef_core::ClusterClient;

use crate::error::Result;

/// Counts GPU capacity and allocation across the cluster.
///
/// Accounting is snapshot-consistent per call: it reuses the same listings
/// the retrieval engine works from and takes no locks. A node whose pod
/// listing fails contributes its capacity but no allocation; the failure is
/// logged and skipped.
pub struct GpuAccountant {
    client: Arc<dyn ClusterClient>,
}

impl GpuAccountant {
    /// Creates an accountant over the given client.
    #[must_use]
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self { client }
    }

    /// Total GPU capacity minus total GPU allocation, cluster-wide.
    ///
    /// # Errors
    ///
    /// Returns a transient error when the node listing fails.
    pub fn idle_gpus(&self) -> Result<i64> {
        let nodes = self.client.list_nodes()?;
        let mut capacity: i64 = 0;
        let mut allocated: i64 = 0;
        for node in &nodes {
            capacity += i64::from(node.gpu_capacity);
            match self.client.pods_on_node(&node.name) {
                Ok(pods) => {
                    allocated += pods
                        .iter()
                        .map(|p| i64::from(p.resources.gpus))
                        .sum::<i64>();
                }
                Err(e) => {
                    warn!(node = %node.name, error = %e, "pod listing failed");
                    continue;
                }
            }
        }
        Ok(capacity - allocated)
    }
}
