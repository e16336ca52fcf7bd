//! In-memory cluster fixture.
//!
//! [`InMemoryCluster`] implements both [`ClusterClient`] and
//! [`FrameworkHandle`] over interior-mutable maps, and records every
//! mutation (deletions, retractions, patches, events, metric samples) so
//! tests can assert on what the core actually did.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;

use crate::cluster::{ClusterClient, DisruptionCondition, NodeRecord};
use crate::error::{CoreError, Result};
use crate::framework::{EventRecorder, Extender, FrameworkHandle, MetricsSink, WaitingPod};
use crate::parallel::Parallelizer;
use crate::types::{annotations, DisruptionBudget, NodeInfo, Workload, WorkloadRef};

/// An audit event captured by the fixture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    /// Workload the event is about.
    pub object: WorkloadRef,
    /// Related workload, when any.
    pub related: Option<WorkloadRef>,
    /// Event type (`Normal`, `Warning`).
    pub event_type: String,
    /// Machine-readable reason.
    pub reason: String,
    /// Human-readable message.
    pub message: String,
}

/// A waiting pod that records its rejections.
#[derive(Debug, Default)]
pub struct RecordingWaitingPod {
    uid: String,
    rejections: RwLock<Vec<(String, String)>>,
}

impl RecordingWaitingPod {
    /// Creates a waiting pod with the given uid.
    #[must_use]
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            rejections: RwLock::new(Vec::new()),
        }
    }

    /// The `(plugin, reason)` pairs this pod was rejected with.
    #[must_use]
    pub fn rejections(&self) -> Vec<(String, String)> {
        self.rejections.read().clone()
    }
}

impl WaitingPod for RecordingWaitingPod {
    fn uid(&self) -> &str {
        &self.uid
    }

    fn reject(&self, plugin: &str, reason: &str) {
        self.rejections
            .write()
            .push((plugin.to_string(), reason.to_string()));
    }
}

#[derive(Debug, Default)]
struct NodeState {
    gpu_capacity: u32,
    pods: Vec<Workload>,
}

#[derive(Default)]
struct ClusterState {
    nodes: BTreeMap<String, NodeState>,
    pending: BTreeMap<String, Workload>,
    elastic_jobs: BTreeMap<String, Value>,
    budgets: Vec<DisruptionBudget>,
    deleted: Vec<WorkloadRef>,
    retracted: Vec<WorkloadRef>,
    disruption_patches: Vec<WorkloadRef>,
    cleared_nominations: Vec<WorkloadRef>,
}

fn key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

/// In-memory cluster backing for tests and local experimentation.
pub struct InMemoryCluster {
    state: RwLock<ClusterState>,
    events: RwLock<Vec<RecordedEvent>>,
    victim_samples: RwLock<Vec<usize>>,
    waiting: RwLock<BTreeMap<String, Arc<dyn WaitingPod>>>,
    extenders: RwLock<Vec<Arc<dyn Extender>>>,
    parallelizer: Parallelizer,
    fail_deletions: AtomicBool,
}

impl Default for InMemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCluster {
    /// Creates an empty cluster with a small worker pool.
    #[must_use]
    pub fn new() -> Self {
        Self::with_workers(4)
    }

    /// Creates an empty cluster with the given worker-pool size.
    #[must_use]
    pub fn with_workers(workers: usize) -> Self {
        Self {
            state: RwLock::new(ClusterState::default()),
            events: RwLock::new(Vec::new()),
            victim_samples: RwLock::new(Vec::new()),
            waiting: RwLock::new(BTreeMap::new()),
            extenders: RwLock::new(Vec::new()),
            parallelizer: Parallelizer::new(workers),
            fail_deletions: AtomicBool::new(false),
        }
    }

    /// Adds a node with the given GPU capacity.
    pub fn add_node(&self, name: impl Into<String>, gpu_capacity: u32) {
        self.state.write().nodes.insert(
            name.into(),
            NodeState {
                gpu_capacity,
                pods: Vec::new(),
            },
        );
    }

    /// Binds a workload to a node, creating the node with zero capacity if
    /// it does not exist yet.
    pub fn bind_pod(&self, node: &str, pod: Workload) {
        let mut state = self.state.write();
        state.nodes.entry(node.to_string()).or_default().pods.push(pod);
    }

    /// Adds a pending (unbound) workload.
    pub fn add_pending(&self, pod: Workload) {
        let mut state = self.state.write();
        state.pending.insert(key(&pod.namespace, &pod.name), pod);
    }

    /// Stores an elastic-job record.
    pub fn put_elastic_job(&self, namespace: &str, name: &str, job: Value) {
        self.state
            .write()
            .elastic_jobs
            .insert(key(namespace, name), job);
    }

    /// Adds a disruption budget.
    pub fn add_budget(&self, budget: DisruptionBudget) {
        self.state.write().budgets.push(budget);
    }

    /// Registers an extender plugin.
    pub fn register_extender(&self, extender: Arc<dyn Extender>) {
        self.extenders.write().push(extender);
    }

    /// Places a workload in the admission gate.
    pub fn register_waiting_pod(&self, pod: Arc<dyn WaitingPod>) {
        self.waiting.write().insert(pod.uid().to_string(), pod);
    }

    /// Makes every subsequent deletion fail with a transient error.
    pub fn fail_deletions(&self, fail: bool) {
        self.fail_deletions.store(fail, Ordering::SeqCst);
    }

    /// Workloads deleted so far.
    #[must_use]
    pub fn deleted(&self) -> Vec<WorkloadRef> {
        self.state.read().deleted.clone()
    }

    /// Workloads retracted so far.
    #[must_use]
    pub fn retracted(&self) -> Vec<WorkloadRef> {
        self.state.read().retracted.clone()
    }

    /// Workloads patched with a disruption condition so far.
    #[must_use]
    pub fn disruption_patches(&self) -> Vec<WorkloadRef> {
        self.state.read().disruption_patches.clone()
    }

    /// Workloads whose nomination was cleared so far.
    #[must_use]
    pub fn cleared_nominations(&self) -> Vec<WorkloadRef> {
        self.state.read().cleared_nominations.clone()
    }

    /// Recorded audit events.
    #[must_use]
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.read().clone()
    }

    /// Observed `preemption_victims` samples.
    #[must_use]
    pub fn victim_samples(&self) -> Vec<usize> {
        self.victim_samples.read().clone()
    }

    /// A pending workload by namespace and name.
    #[must_use]
    pub fn pending_pod(&self, namespace: &str, name: &str) -> Option<Workload> {
        self.state.read().pending.get(&key(namespace, name)).cloned()
    }

    /// The stored elastic-job record.
    #[must_use]
    pub fn elastic_job(&self, namespace: &str, name: &str) -> Option<Value> {
        self.state
            .read()
            .elastic_jobs
            .get(&key(namespace, name))
            .cloned()
    }
}

impl ClusterClient for InMemoryCluster {
    fn list_nodes(&self) -> Result<Vec<NodeRecord>> {
        let state = self.state.read();
        Ok(state
            .nodes
            .iter()
            .map(|(name, node)| NodeRecord::new(name.clone(), node.gpu_capacity))
            .collect())
    }

    fn pods_on_node(&self, node: &str) -> Result<Vec<Workload>> {
        let state = self.state.read();
        state
            .nodes
            .get(node)
            .map(|n| n.pods.clone())
            .ok_or_else(|| CoreError::NodeNotFound {
                name: node.to_string(),
            })
    }

    fn get_pod(&self, namespace: &str, name: &str) -> Result<Workload> {
        let state = self.state.read();
        if let Some(pod) = state.pending.get(&key(namespace, name)) {
            return Ok(pod.clone());
        }
        state
            .nodes
            .values()
            .flat_map(|n| n.pods.iter())
            .find(|p| p.namespace == namespace && p.name == name)
            .cloned()
            .ok_or_else(|| CoreError::WorkloadNotFound {
                workload: key(namespace, name),
            })
    }

    fn delete_pod(&self, pod: &WorkloadRef) -> Result<()> {
        if self.fail_deletions.load(Ordering::SeqCst) {
            return Err(CoreError::transient(format!("deletion of {pod} refused")));
        }
        let mut state = self.state.write();
        let state = &mut *state;
        for node in state.nodes.values_mut() {
            if let Some(idx) = node.pods.iter().position(|p| p.uid == pod.uid) {
                node.pods.remove(idx);
                state.deleted.push(pod.clone());
                return Ok(());
            }
        }
        if state.pending.remove(&key(&pod.namespace, &pod.name)).is_some() {
            state.deleted.push(pod.clone());
            return Ok(());
        }
        Err(CoreError::WorkloadNotFound {
            workload: pod.to_string(),
        })
    }

    fn patch_disruption_condition(
        &self,
        pod: &WorkloadRef,
        _condition: &DisruptionCondition,
    ) -> Result<()> {
        let mut state = self.state.write();
        let exists = state
            .nodes
            .values()
            .flat_map(|n| n.pods.iter())
            .any(|p| p.uid == pod.uid);
        if !exists {
            return Err(CoreError::WorkloadNotFound {
                workload: pod.to_string(),
            });
        }
        state.disruption_patches.push(pod.clone());
        Ok(())
    }

    fn retract_pod(&self, pod: &WorkloadRef, retracted_at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.write();
        let state = &mut *state;
        for node in state.nodes.values_mut() {
            if let Some(idx) = node.pods.iter().position(|p| p.uid == pod.uid) {
                let mut retracted = node.pods.remove(idx);
                retracted.annotations.insert(
                    annotations::RETRACT_CHECK_VAR.to_string(),
                    retracted_at.to_rfc3339(),
                );
                state
                    .pending
                    .insert(key(&retracted.namespace, &retracted.name), retracted);
                state.retracted.push(pod.clone());
                return Ok(());
            }
        }
        Err(CoreError::WorkloadNotFound {
            workload: pod.to_string(),
        })
    }

    fn clear_nominated_node(&self, pod: &WorkloadRef) -> Result<()> {
        let mut state = self.state.write();
        let state = &mut *state;
        if let Some(pending) = state.pending.get_mut(&key(&pod.namespace, &pod.name)) {
            pending.nominated_node = None;
            state.cleared_nominations.push(pod.clone());
            return Ok(());
        }
        Err(CoreError::WorkloadNotFound {
            workload: pod.to_string(),
        })
    }

    fn list_disruption_budgets(&self) -> Result<Vec<DisruptionBudget>> {
        Ok(self.state.read().budgets.clone())
    }

    fn get_elastic_job(&self, namespace: &str, name: &str) -> Result<Value> {
        self.state
            .read()
            .elastic_jobs
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| CoreError::ElasticJobNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    fn update_elastic_job(&self, namespace: &str, name: &str, job: Value) -> Result<()> {
        let mut state = self.state.write();
        let slot = state.elastic_jobs.get_mut(&key(namespace, name)).ok_or(
            CoreError::ElasticJobNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
        )?;
        *slot = job;
        Ok(())
    }
}

impl EventRecorder for InMemoryCluster {
    fn event(
        &self,
        object: &WorkloadRef,
        related: Option<&WorkloadRef>,
        event_type: &str,
        reason: &str,
        message: &str,
    ) {
        self.events.write().push(RecordedEvent {
            object: object.clone(),
            related: related.cloned(),
            event_type: event_type.to_string(),
            reason: reason.to_string(),
            message: message.to_string(),
        });
    }
}

impl MetricsSink for InMemoryCluster {
    fn observe_preemption_victims(&self, count: usize) {
        self.victim_samples.write().push(count);
    }
}

impl FrameworkHandle for InMemoryCluster {
    fn snapshot(&self) -> Vec<NodeInfo> {
        let state = self.state.read();
        state
            .nodes
            .iter()
            .map(|(name, node)| NodeInfo {
                name: name.clone(),
                gpu_capacity: node.gpu_capacity,
                pods: node.pods.clone(),
            })
            .collect()
    }

    fn client(&self) -> &dyn ClusterClient {
        self
    }

    fn extenders(&self) -> Vec<Arc<dyn Extender>> {
        self.extenders.read().clone()
    }

    fn parallelizer(&self) -> &Parallelizer {
        &self.parallelizer
    }

    fn waiting_pod(&self, uid: &str) -> Option<Arc<dyn WaitingPod>> {
        self.waiting.read().get(uid).cloned()
    }

    fn nominated_pods_for_node(&self, node: &str) -> Vec<Workload> {
        let state = self.state.read();
        state
            .pending
            .values()
            .filter(|p| p.nominated_node.as_deref() == Some(node))
            .cloned()
            .collect()
    }

    fn event_recorder(&self) -> &dyn EventRecorder {
        self
    }

    fn metrics(&self) -> &dyn MetricsSink {
        self
    }
}
