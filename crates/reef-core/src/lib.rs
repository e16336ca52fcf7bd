//! Shared data model and framework seams for the reef scheduling core.
//!
//! `reef-core` holds everything the preemption, retrieval, and
//! queue-ordering crates have in common:
//!
//! - the cluster data model ([`Workload`], [`NodeInfo`], [`Victims`],
//!   [`Candidate`], [`DisruptionBudget`], [`CycleState`])
//! - scheduling [`Status`] codes and the [`PostFilterResult`] returned to
//!   the framework
//! - the [`ClusterClient`] and [`FrameworkHandle`] traits the scheduler
//!   binary implements
//! - the bounded [`Parallelizer`] worker pool with cooperative
//!   [`CancelHandle`] cancellation
//! - the elastic-job pod-name parser shared by retrieval and queue ordering
//! - an [`InMemoryCluster`] fixture used throughout the workspace's tests
//!
//! # Example
//!
//! ```rust
//! use reef_core::{InMemoryCluster, Workload, ClusterClient};
//!
//! let cluster = InMemoryCluster::new();
//! cluster.add_node("gpu-node-1", 8);
//! cluster.bind_pod("gpu-node-1", Workload::new("training", "job-1").with_gpus(2));
//!
//! let pods = cluster.pods_on_node("gpu-node-1");
//! assert_eq!(pods.map(|p| p.len()).ok(), Some(1));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cluster;
pub mod elastic;
pub mod error;
pub mod framework;
pub mod memory;
pub mod parallel;
pub mod status;
pub mod types;

pub use cluster::{ClusterClient, DisruptionCondition, NodeRecord};
pub use elastic::elastic_job_name;
pub use error::{CoreError, Result};
pub use framework::{
    EventRecorder, Extender, FrameworkHandle, MetricsSink, NoOpEventRecorder, NoOpMetricsSink,
    WaitingPod,
};
pub use memory::{InMemoryCluster, RecordedEvent, RecordingWaitingPod};
pub use parallel::{CancelHandle, Parallelizer};
pub use status::{PostFilterResult, Status, StatusCode};
pub use types::{
    annotations, Candidate, CycleState, DisruptionBudget, NodeInfo, PreemptionPolicy,
    ResourceRequest, Victims, Workload, WorkloadRef,
};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::cluster::{ClusterClient, DisruptionCondition, NodeRecord};
    pub use crate::elastic::elastic_job_name;
    pub use crate::error::{CoreError, Result};
    pub use crate::framework::{
        EventRecorder, Extender, FrameworkHandle, MetricsSink, WaitingPod,
    };
    pub use crate::parallel::{CancelHandle, Parallelizer};
    pub use crate::status::{PostFilterResult, Status, StatusCode};
    pub use crate::types::{
        annotations, Candidate, CycleState, DisruptionBudget, NodeInfo, PreemptionPolicy,
        ResourceRequest, Victims, Workload, WorkloadRef,
    };
}
