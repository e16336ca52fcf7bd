//! Cluster control-plane access.
//!
//! The core never talks to an apiserver directly; it goes through the
//! [`ClusterClient`] trait provided by the scheduler binary. All calls may
//! block on network I/O and inherit the caller's deadline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{DisruptionBudget, Workload, WorkloadRef};

/// A node as returned by a cluster listing: name plus GPU capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Node name.
    pub name: String,
    /// GPU capacity of the node.
    pub gpu_capacity: u32,
}

impl NodeRecord {
    /// Creates a node record.
    #[must_use]
    pub fn new(name: impl Into<String>, gpu_capacity: u32) -> Self {
        Self {
            name: name.into(),
            gpu_capacity,
        }
    }
}

/// Condition patched onto a victim before deletion, marking it a voluntary
/// disruption target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisruptionCondition {
    /// Machine-readable reason.
    pub reason: String,
    /// Human-readable message.
    pub message: String,
}

impl DisruptionCondition {
    /// Creates a condition.
    #[must_use]
    pub fn new(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            message: message.into(),
        }
    }
}

/// Blocking access to the cluster control plane.
///
/// Errors are [`crate::CoreError::Transient`] unless the target object does
/// not exist. Deletions and updates are not rolled back by the core;
/// retraction is idempotent under the owning controller.
pub trait ClusterClient: Send + Sync {
    /// Lists all nodes.
    ///
    /// # Errors
    ///
    /// Returns a transient error when the listing fails.
    fn list_nodes(&self) -> Result<Vec<NodeRecord>>;

    /// Lists the workloads bound to a node.
    ///
    /// # Errors
    ///
    /// Returns an error when the node is unknown or the listing fails.
    fn pods_on_node(&self, node: &str) -> Result<Vec<Workload>>;

    /// Fetches the latest version of a workload.
    ///
    /// # Errors
    ///
    /// Returns an error when the workload does not exist.
    fn get_pod(&self, namespace: &str, name: &str) -> Result<Workload>;

    /// Deletes a workload.
    ///
    /// # Errors
    ///
    /// Returns an error when the workload does not exist or the deletion
    /// fails.
    fn delete_pod(&self, pod: &WorkloadRef) -> Result<()>;

    /// Patches a disruption condition onto a workload's status.
    ///
    /// # Errors
    ///
    /// Returns an error when the patch fails.
    fn patch_disruption_condition(
        &self,
        pod: &WorkloadRef,
        condition: &DisruptionCondition,
    ) -> Result<()>;

    /// Retracts a workload: annotates it with the retraction timestamp,
    /// removes it from its node, and returns it to the pending queue.
    ///
    /// # Errors
    ///
    /// Returns an error when the workload does not exist or the update
    /// fails.
    fn retract_pod(&self, pod: &WorkloadRef, retracted_at: DateTime<Utc>) -> Result<()>;

    /// Clears a workload's nominated-node hint.
    ///
    /// # Errors
    ///
    /// Returns an error when the workload does not exist or the update
    /// fails.
    fn clear_nominated_node(&self, pod: &WorkloadRef) -> Result<()>;

    /// Lists all disruption budgets.
    ///
    /// # Errors
    ///
    /// Returns a transient error when the listing fails.
    fn list_disruption_budgets(&self) -> Result<Vec<DisruptionBudget>>;

    /// Fetches an elastic-job record as an untyped document.
    ///
    /// # Errors
    ///
    /// Returns an error when the job does not exist.
    fn get_elastic_job(&self, namespace: &str, name: &str) -> Result<serde_json::Value>;

    /// Replaces an elastic-job record with a full-object write. Lost-update
    /// races surface as [`crate::CoreError::Conflict`].
    ///
    /// # Errors
    ///
    /// Returns an error when the job does not exist or the write conflicts.
    fn update_elastic_job(
        &self,
        namespace: &str,
        name: &str,
        job: serde_json::Value,
    ) -> Result<()>;
}
