//! Bounded parallel execution with cooperative cancellation.
//!
//! Both the dry-run and the eviction phases fan work out through
//! [`Parallelizer::until`]. Cancellation is cooperative: a task observed
//! after the cancel flag is raised is skipped, but tasks already running are
//! left to finish. Callers must therefore tolerate slight overshoot past any
//! cap they enforce through cancellation (at most `workers - 1` extra
//! completions).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{trace, warn};

/// Clone-able cancellation flag with optional parent chaining.
///
/// A child handle is cancelled when either its own flag or any ancestor's
/// flag is raised; cancelling a child never affects its parent.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
    parent: Option<Arc<CancelHandle>>,
}

impl CancelHandle {
    /// Creates a root cancel handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives a child handle that also observes this handle's flag.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            parent: Some(Arc::new(self.clone())),
        }
    }

    /// Raises this handle's flag.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether this handle or any ancestor has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self.parent.as_ref().is_some_and(|p| p.is_cancelled())
    }
}

/// Bounded worker pool.
///
/// Construction degrades to sequential execution on the caller's thread if
/// the pool cannot be built, so the scheduler keeps making progress on
/// constrained hosts.
#[derive(Debug)]
pub struct Parallelizer {
    pool: Option<rayon::ThreadPool>,
    workers: usize,
}

impl Parallelizer {
    /// Creates a pool with the given number of workers.
    #[must_use]
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("reef-worker-{i}"))
            .build();
        match pool {
            Ok(pool) => Self {
                pool: Some(pool),
                workers,
            },
            Err(e) => {
                warn!(error = %e, "worker pool unavailable, falling back to sequential execution");
                Self {
                    pool: None,
                    workers: 1,
                }
            }
        }
    }

    /// Number of workers in the pool.
    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Runs `work(0..n)` across the pool, skipping indexes observed after
    /// `cancel` is raised. Returns once every dispatched task has finished;
    /// published results may be read afterwards without locking.
    pub fn until<F>(&self, cancel: &CancelHandle, n: usize, work: F, tag: &str)
    where
        F: Fn(usize) + Send + Sync,
    {
        if n == 0 {
            return;
        }
        match &self.pool {
            Some(pool) => pool.install(|| {
                (0..n).into_par_iter().for_each(|i| {
                    if cancel.is_cancelled() {
                        return;
                    }
                    work(i);
                });
            }),
            None => {
                for i in 0..n {
                    if cancel.is_cancelled() {
                        break;
                    }
                    work(i);
                }
            }
        }
        trace!(tag, tasks = n, "parallel work drained");
    }
}

impl Default for Parallelizer {
    fn default() -> Self {
        Self::new(rayon::current_num_threads())
    }
}
