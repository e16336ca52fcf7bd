//! Concurrency-safe bounded candidate collector.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use reef_core::Candidate;

/// Fixed-capacity collector used by the parallel dry-run.
///
/// `add` reserves a slot with an atomic increment and installs the candidate
/// when the reserved index is within capacity; overflow reservations are
/// discarded. [`CandidateList::snapshot`] is only meaningful after every
/// writer has quiesced (the worker pool has drained).
#[derive(Debug)]
pub struct CandidateList {
    idx: AtomicUsize,
    slots: Box<[OnceLock<Candidate>]>,
}

impl CandidateList {
    /// Creates a collector holding up to `capacity` candidates.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            idx: AtomicUsize::new(0),
            slots: (0..capacity).map(|_| OnceLock::new()).collect(),
        }
    }

    /// Adds a candidate, discarding it when the list is already full. Safe
    /// under concurrent callers.
    pub fn add(&self, candidate: Candidate) {
        let idx = self.idx.fetch_add(1, Ordering::SeqCst);
        if let Some(slot) = self.slots.get(idx) {
            let _ = slot.set(candidate);
        }
    }

    /// Number of candidates stored, clamped to capacity. Reserved slots
    /// whose install is still in flight are counted; see
    /// [`CandidateList::snapshot`] for the publication contract.
    #[must_use]
    pub fn size(&self) -> usize {
        self.idx.load(Ordering::SeqCst).min(self.slots.len())
    }

    /// The collected candidates. Valid only after all writers finished.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Candidate> {
        self.slots
            .iter()
            .take(self.size())
            .filter_map(|slot| slot.get().cloned())
            .collect()
    }
}
