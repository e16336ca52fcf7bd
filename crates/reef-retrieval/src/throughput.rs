//! Static per-model training throughput.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RetrievalError};

/// Smallest valid worker replica count for an elastic job.
pub const MIN_WORKER_REPLICAS: i64 = 1;
/// Largest valid worker replica count for an elastic job.
pub const MAX_WORKER_REPLICAS: i64 = 5;

/// Number of entries per model: measured throughput at worker counts
/// `0..=MAX_WORKER_REPLICAS`.
const TABLE_LEN: usize = MAX_WORKER_REPLICAS as usize + 1;

/// Measured training throughput per model, indexed by worker count.
///
/// `throughput(model, k)` is the throughput with `k` workers; the marginal
/// throughput of the `k`-th worker is `T[k] - T[k-1]`. The table is an
/// input to the scheduler, not something it optimizes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughputTable {
    models: BTreeMap<String, [f64; TABLE_LEN]>,
}

impl ThroughputTable {
    /// Creates an empty table.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            models: BTreeMap::new(),
        }
    }

    /// The measured table shipped with the scheduler.
    #[must_use]
    pub fn builtin() -> Self {
        let mut table = Self::empty();
        table.insert("VGG16", [4.232, 3.499, 4.61, 4.526, 5.396, 6.363]);
        table.insert("VGG19", [3.693, 2.793, 3.6294, 4.3105, 5.2051, 5.934]);
        table.insert("inceptionv3", [3.5, 5.495, 6.29, 8.449, 9.693, 11.262]);
        table.insert("alex-net", [15.969, 7.496, 9.002, 10.572, 13.005, 14.708]);
        table.insert("resnet50", [6.78098, 7.777, 12.4701, 12.18717, 15.90254, 18.968]);
        table.insert("resnet101", [4.253, 5.519, 8.863, 8.8171, 9.686, 12.904]);
        table
    }

    /// Adds or replaces a model's measurements.
    pub fn insert(&mut self, model: impl Into<String>, values: [f64; TABLE_LEN]) {
        self.models.insert(model.into(), values);
    }

    /// Whether the table knows the model.
    #[must_use]
    pub fn contains(&self, model: &str) -> bool {
        self.models.contains_key(model)
    }

    /// Throughput of `model` at `workers` workers.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown model or a worker count outside
    /// `0..=MAX_WORKER_REPLICAS`.
    pub fn throughput(&self, model: &str, workers: i64) -> Result<f64> {
        let values = self
            .models
            .get(model)
            .ok_or_else(|| RetrievalError::UnknownModel {
                model: model.to_string(),
            })?;
        let index = usize::try_from(workers)
            .ok()
            .filter(|&i| i < TABLE_LEN)
            .ok_or(RetrievalError::ReplicasOutOfRange {
                replicas: workers,
                min: 0,
                max: MAX_WORKER_REPLICAS,
            })?;
        values
            .get(index)
            .copied()
            .ok_or(RetrievalError::ReplicasOutOfRange {
                replicas: workers,
                min: 0,
                max: MAX_WORKER_REPLICAS,
            })
    }

    /// Marginal throughput of the `workers`-th worker:
    /// `T[workers] - T[workers - 1]`.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown model or a worker count outside
    /// `1..=MAX_WORKER_REPLICAS`.
    pub fn marginal(&self, model: &str, workers: i64) -> Result<f64> {
        Ok(self.throughput(model, workers)? - self.throughput(model, workers - 1)?)
    }
}

impl Default for ThroughputTable {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_models_are_present() {
        let table = ThroughputTable::builtin();
        for model in ["VGG16", "VGG19", "inceptionv3", "alex-net", "resnet50", "resnet101"] {
            assert!(table.contains(model), "missing {model}");
        }
        assert!(!table.contains("bert-large"));
    }

    #[test]
    fn throughput_lookup() {
        let table = ThroughputTable::builtin();
        assert_eq!(table.throughput("resnet50", 2).ok(), Some(12.4701));
        assert_eq!(table.throughput("resnet50", 0).ok(), Some(6.78098));
    }

    #[test]
    fn marginal_of_third_resnet50_worker() {
        let table = ThroughputTable::builtin();
        let gain = table.marginal("resnet50", 3);
        // 12.18717 - 12.4701: adding a third worker actually hurts.
        assert!(gain.is_ok_and(|g| g < 0.0));

        let gain = table.marginal("resnet50", 2);
        assert!(gain.is_ok_and(|g| (g - 4.6931).abs() < 1e-9));
    }

    #[test]
    fn unknown_model_is_rejected() {
        let table = ThroughputTable::builtin();
        assert!(matches!(
            table.throughput("bert-large", 1),
            Err(RetrievalError::UnknownModel { .. })
        ));
    }

    #[test]
    fn out_of_range_workers_are_rejected() {
        let table = ThroughputTable::builtin();
        assert!(matches!(
            table.throughput("resnet50", 6),
            Err(RetrievalError::ReplicasOutOfRange { .. })
        ));
        assert!(matches!(
            table.throughput("resnet50", -1),
            Err(RetrievalError::ReplicasOutOfRange { .. })
        ));
        assert!(matches!(
            table.marginal("resnet50", 0),
            Err(RetrievalError::ReplicasOutOfRange { .. })
        ));
    }

    #[test]
    fn custom_entries_can_be_inserted() {
        let mut table = ThroughputTable::empty();
        table.insert("toy", [0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(table.marginal("toy", 5).ok(), Some(1.0));
    }
}
