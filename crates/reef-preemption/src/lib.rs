//! Priority-based preemption for the reef GPU batch scheduler.
//!
//! `reef-preemption` decides, deterministically and with bounded cost, which
//! running workloads must yield resources so a high-priority workload fits.
//!
//! # How a preemption cycle runs
//!
//! 1. **Eligibility gate**: preemptors with a never-preempt policy, a
//!    deletion in progress, or a still-valid nomination are turned away.
//! 2. **Node pre-filter**: nodes whose scheduling failure cannot be
//!    resolved by evicting workloads are dropped.
//! 3. **Dry run**: the remaining nodes are evaluated in parallel; each
//!    task computes the minimum victim set on its node and the number of
//!    disruption-budget violations evicting it would incur. The run stops
//!    early once the candidate shortlist is full and contains at least one
//!    budget-clean option.
//! 4. **Extender bridge**: registered external policy plugins refine the
//!    candidate set sequentially.
//! 5. **Tie-break scorer**: layered criteria (fewest budget violations,
//!    lowest victim priorities, fewest victims, latest start times, sorted
//!    name order) pick a single winning node.
//! 6. **Preparation**: victims are evicted in parallel, the victim count
//!    is observed as a metric sample, and stale lower-priority nominations
//!    on the winning node are cleared.
//!
//! # Example
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//!
//! use reef_core::{CancelHandle, FrameworkHandle, InMemoryCluster, Status, Workload};
//! use reef_preemption::{DefaultStrategy, Evaluator};
//!
//! let cluster = Arc::new(InMemoryCluster::new());
//! cluster.add_node("gpu-node-1", 2);
//! cluster.bind_pod(
//!     "gpu-node-1",
//!     Workload::new("training", "victim").with_priority(10).with_gpus(2),
//! );
//!
//! let preemptor = Workload::new("training", "urgent").with_priority(100).with_gpus(2);
//! cluster.add_pending(preemptor.clone());
//!
//! let handle: Arc<dyn FrameworkHandle> = Arc::clone(&cluster) as Arc<dyn FrameworkHandle>;
//! let evaluator = Evaluator::new("reef-preemption", handle, Arc::new(DefaultStrategy::new()));
//!
//! let mut statuses = BTreeMap::new();
//! statuses.insert("gpu-node-1".to_string(), Status::unschedulable("Insufficient gpu"));
//!
//! let (result, status) = evaluator.preempt(&preemptor, &statuses, &CancelHandle::new());
//! assert!(status.is_success());
//! assert_eq!(
//!     result.and_then(|r| r.nominated_node).as_deref(),
//!     Some("gpu-node-1")
//! );
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod candidate;
pub mod dry_run;
pub mod error;
pub mod evaluator;
pub mod extender;
pub mod prepare;
pub mod scorer;
pub mod strategy;

pub use candidate::CandidateList;
pub use dry_run::{dry_run_preemption, DryRunOutcome};
pub use error::{PreemptionError, Result};
pub use evaluator::{nodes_where_preemption_might_help, Evaluator, EvaluatorConfig};
pub use extender::call_extenders;
pub use prepare::prepare_candidate;
pub use scorer::pick_one_node;
pub use strategy::{DefaultStrategy, DefaultStrategyConfig, PreemptionStrategy, ScoreFn};
