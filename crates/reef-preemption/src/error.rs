//! Error types for the preemption engine.

use reef_core::CoreError;
use thiserror::Error;

/// Result type for preemption operations.
pub type Result<T> = std::result::Result<T, PreemptionError>;

/// Errors that can occur while computing or executing a preemption.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PreemptionError {
    /// Cluster access failed.
    #[error(transparent)]
    Cluster(#[from] CoreError),

    /// The node snapshot was empty.
    #[error("no nodes available in snapshot")]
    NoNodes,

    /// An extender failed and was not ignorable.
    #[error("extender {name} failed: {message}")]
    Extender {
        /// Name of the failing extender.
        name: String,
        /// Description of the failure.
        message: String,
    },

    /// An extender reported a candidate without victims.
    #[error("expected at least one victim pod on node {node}")]
    EmptyVictims {
        /// Node the empty entry referred to.
        node: String,
    },

    /// Multiple dry-run tasks failed; the individual messages are retained.
    #[error("{} dry-run errors occurred: [{}]", .errors.len(), .errors.join("; "))]
    Aggregate {
        /// Messages of the individual failures.
        errors: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_cluster() {
        let err = PreemptionError::from(CoreError::transient("listing failed"));
        assert_eq!(err.to_string(), "transient cluster error: listing failed");
    }

    #[test]
    fn error_display_extender() {
        let err = PreemptionError::Extender {
            name: "gpu-topology".into(),
            message: "connection reset".into(),
        };
        assert_eq!(
            err.to_string(),
            "extender gpu-topology failed: connection reset"
        );
    }

    #[test]
    fn error_display_empty_victims() {
        let err = PreemptionError::EmptyVictims {
            node: "gpu-node-2".into(),
        };
        assert_eq!(
            err.to_string(),
            "expected at least one victim pod on node gpu-node-2"
        );
    }

    #[test]
    fn error_display_aggregate() {
        let err = PreemptionError::Aggregate {
            errors: vec!["boom".into(), "bang".into()],
        };
        assert_eq!(err.to_string(), "2 dry-run errors occurred: [boom; bang]");
    }
}
