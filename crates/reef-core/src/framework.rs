//! Seams to the scheduling framework host.
//!
//! The framework owns the node snapshot, the worker pool, extender plugins,
//! the waiting-pod admission gate, nominations, events, and metrics. The
//! core consumes all of these through [`FrameworkHandle`].

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cluster::ClusterClient;
use crate::error::Result;
use crate::parallel::Parallelizer;
use crate::types::{NodeInfo, Victims, Workload};

/// Records audit-trail events for cluster objects.
pub trait EventRecorder: Send + Sync {
    /// Records an event about `object`, optionally related to another
    /// workload (e.g. the preemptor that displaced it).
    fn event(
        &self,
        object: &crate::types::WorkloadRef,
        related: Option<&crate::types::WorkloadRef>,
        event_type: &str,
        reason: &str,
        message: &str,
    );
}

/// An event recorder that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpEventRecorder;

impl EventRecorder for NoOpEventRecorder {
    fn event(
        &self,
        _object: &crate::types::WorkloadRef,
        _related: Option<&crate::types::WorkloadRef>,
        _event_type: &str,
        _reason: &str,
        _message: &str,
    ) {
    }
}

/// Sink for the core's metric samples.
pub trait MetricsSink: Send + Sync {
    /// Observes the number of victims evicted by one preemption.
    fn observe_preemption_victims(&self, count: usize);
}

/// A metrics sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpMetricsSink;

impl MetricsSink for NoOpMetricsSink {
    fn observe_preemption_victims(&self, _count: usize) {}
}

/// A workload held in the cross-cycle admission gate. Rejecting it releases
/// the gate without a deletion round-trip.
pub trait WaitingPod: Send + Sync {
    /// Unique identifier of the held workload.
    fn uid(&self) -> &str;

    /// Rejects the held workload with the given plugin name and reason.
    fn reject(&self, plugin: &str, reason: &str);
}

/// External policy plugin refining the candidate set after the dry-run.
pub trait Extender: Send + Sync {
    /// Name of the extender, used in logs.
    fn name(&self) -> &str;

    /// Whether this extender cares about the given preemptor.
    fn is_interested(&self, pod: &Workload) -> bool;

    /// Whether this extender participates in preemption at all.
    fn supports_preemption(&self) -> bool;

    /// Whether failures of this extender may be skipped.
    fn is_ignorable(&self) -> bool;

    /// Refines the node-to-victims map. Nodes absent from the returned map
    /// are dropped from the candidate set.
    ///
    /// # Errors
    ///
    /// Returns an error when the extender cannot process the request; fatal
    /// for the cycle unless the extender is ignorable.
    fn process_preemption(
        &self,
        pod: &Workload,
        victims: BTreeMap<String, Victims>,
        nodes: &[NodeInfo],
    ) -> Result<BTreeMap<String, Victims>>;
}

/// Handle to the scheduling framework host.
pub trait FrameworkHandle: Send + Sync {
    /// Snapshot of all nodes with their bound workloads, taken at the start
    /// of the cycle.
    fn snapshot(&self) -> Vec<NodeInfo>;

    /// Cluster control-plane client.
    fn client(&self) -> &dyn ClusterClient;

    /// Registered extender plugins, in invocation order.
    fn extenders(&self) -> Vec<Arc<dyn Extender>>;

    /// Bounded worker pool shared by dry-run and eviction fan-out.
    fn parallelizer(&self) -> &Parallelizer;

    /// Looks up a workload held in the admission gate.
    fn waiting_pod(&self, uid: &str) -> Option<Arc<dyn WaitingPod>>;

    /// Workloads currently nominated to the given node.
    fn nominated_pods_for_node(&self, node: &str) -> Vec<Workload>;

    /// Audit-trail recorder.
    fn event_recorder(&self) -> &dyn EventRecorder;

    /// Metric sink.
    fn metrics(&self) -> &dyn MetricsSink;
}
