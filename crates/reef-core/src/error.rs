//! Error types shared across the reef scheduling core.

use thiserror::Error;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors surfaced by cluster access and shared infrastructure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Transient infrastructure failure (listing, patching, networking).
    /// The scheduler retries these on a later cycle.
    #[error("transient cluster error: {message}")]
    Transient {
        /// Description of the failure.
        message: String,
    },

    /// Node not present in the cluster.
    #[error("node not found: {name}")]
    NodeNotFound {
        /// Name of the node that was not found.
        name: String,
    },

    /// Workload not present in the cluster.
    #[error("workload not found: {workload}")]
    WorkloadNotFound {
        /// `namespace/name` of the workload that was not found.
        workload: String,
    },

    /// Elastic job record not present in the cluster.
    #[error("elastic job not found: {namespace}/{name}")]
    ElasticJobNotFound {
        /// Namespace of the job.
        namespace: String,
        /// Name of the job.
        name: String,
    },

    /// A schema-typed document is missing a required field or carries the
    /// wrong type at one of its access paths.
    #[error("invalid document at {path}: {reason}")]
    InvalidDocument {
        /// JSON-pointer style path that failed to resolve.
        path: String,
        /// Description of the mismatch.
        reason: String,
    },

    /// A full-object write raced with a concurrent update.
    #[error("conflicting update: {message}")]
    Conflict {
        /// Description of the conflict.
        message: String,
    },
}

impl CoreError {
    /// Convenience constructor for transient failures.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_transient() {
        let err = CoreError::transient("connection refused");
        assert_eq!(err.to_string(), "transient cluster error: connection refused");
    }

    #[test]
    fn error_display_node_not_found() {
        let err = CoreError::NodeNotFound {
            name: "gpu-node-3".into(),
        };
        assert_eq!(err.to_string(), "node not found: gpu-node-3");
    }

    #[test]
    fn error_display_workload_not_found() {
        let err = CoreError::WorkloadNotFound {
            workload: "training/job-1".into(),
        };
        assert_eq!(err.to_string(), "workload not found: training/job-1");
    }

    #[test]
    fn error_display_elastic_job_not_found() {
        let err = CoreError::ElasticJobNotFound {
            namespace: "training".into(),
            name: "mnist-elastic".into(),
        };
        assert_eq!(err.to_string(), "elastic job not found: training/mnist-elastic");
    }

    #[test]
    fn error_display_invalid_document() {
        let err = CoreError::InvalidDocument {
            path: "/spec/mpiReplicaSpecs/Worker/replicas".into(),
            reason: "not an integer".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid document at /spec/mpiReplicaSpecs/Worker/replicas: not an integer"
        );
    }

    #[test]
    fn error_clone_and_eq() {
        let err1 = CoreError::Conflict {
            message: "stale write".into(),
        };
        let err2 = err1.clone();
        assert_eq!(err1, err2);
    }
}
