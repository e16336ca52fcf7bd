//! Elastic resource retrieval for the reef GPU batch scheduler.
//!
//! When a high-priority workload cannot be placed because GPU capacity is
//! exhausted, retrieval runs before classical preemption and tries to
//! reclaim capacity cheaply:
//!
//! 1. **Retract** workloads that were backfilled onto the cluster after the
//!    preemptor arrived.
//! 2. **Scale down** elastic distributed-training jobs that were previously
//!    scaled out, reverting the scale-out whose marginal throughput
//!    contributed least.
//! 3. When neither covers the deficit but idle GPUs exist, **scale out**
//!    the elastic job that would gain the most marginal throughput and let
//!    the preemptor retry next cycle.
//!
//! Only if reclamation is impossible does the scheduler fall back to
//! classical preemption (`reef-preemption`).
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use reef_core::{ClusterClient, InMemoryCluster, Workload};
//! use reef_retrieval::{RetrievalConfig, RetrievalEngine};
//!
//! let cluster = Arc::new(InMemoryCluster::new());
//! cluster.add_node("gpu-node-1", 2);
//! cluster.bind_pod(
//!     "gpu-node-1",
//!     Workload::new("training", "steady").with_gpus(2),
//! );
//!
//! let engine = RetrievalEngine::new(Arc::clone(&cluster) as Arc<dyn ClusterClient>, RetrievalConfig::new());
//! let preemptor = Workload::new("training", "urgent").with_gpus(2);
//!
//! // Nothing is backfilled and no elastic job is running, so nothing can
//! // be reclaimed.
//! let (_, status) = engine.dynamic(&preemptor);
//! assert_eq!(status.reason(), "Nothing can do");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod accountant;
pub mod elastic;
pub mod engine;
pub mod error;
pub mod throughput;

pub use accountant::GpuAccountant;
pub use elastic::{ElasticJobClient, ElasticJobDoc, ScaleOutAnnotationMode};
pub use engine::{RetrievalConfig, RetrievalEngine};
pub use error::{Result, RetrievalError};
pub use throughput::{ThroughputTable, MAX_WORKER_REPLICAS, MIN_WORKER_REPLICAS};
