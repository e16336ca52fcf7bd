//! Error types for the retrieval engine.

use reef_core::CoreError;
use thiserror::Error;

/// Result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Errors that can occur while reclaiming GPUs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RetrievalError {
    /// Cluster access failed.
    #[error(transparent)]
    Cluster(#[from] CoreError),

    /// The throughput table has no entry for a model.
    #[error("unknown model: {model}")]
    UnknownModel {
        /// The model name that was looked up.
        model: String,
    },

    /// A worker replica count fell outside the table's valid range.
    #[error("worker replica count {replicas} outside [{min}, {max}]")]
    ReplicasOutOfRange {
        /// The offending replica count.
        replicas: i64,
        /// Lower bound of the valid interval.
        min: i64,
        /// Upper bound of the valid interval.
        max: i64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_unknown_model() {
        let err = RetrievalError::UnknownModel {
            model: "bert-large".into(),
        };
        assert_eq!(err.to_string(), "unknown model: bert-large");
    }

    #[test]
    fn error_display_replicas_out_of_range() {
        let err = RetrievalError::ReplicasOutOfRange {
            replicas: 7,
            min: 1,
            max: 5,
        };
        assert_eq!(err.to_string(), "worker replica count 7 outside [1, 5]");
    }

    #[test]
    fn error_from_core() {
        let err = RetrievalError::from(CoreError::transient("timeout"));
        assert_eq!(err.to_string(), "transient cluster error: timeout");
    }
}
