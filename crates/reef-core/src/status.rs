//! Scheduling status codes returned to the host framework.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Outcome class of a scheduling operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusCode {
    /// The operation succeeded.
    Success,
    /// The preemptor cannot be scheduled right now; retry later.
    Unschedulable,
    /// The failure cannot be resolved by evicting workloads.
    UnschedulableAndUnresolvable,
    /// Transient internal error; the scheduler retries.
    Error,
}

/// A status code paired with a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    code: StatusCode,
    reason: String,
}

impl Status {
    /// A success status with no reason.
    #[must_use]
    pub fn success() -> Self {
        Self {
            code: StatusCode::Success,
            reason: String::new(),
        }
    }

    /// An unschedulable status.
    #[must_use]
    pub fn unschedulable(reason: impl Into<String>) -> Self {
        Self {
            code: StatusCode::Unschedulable,
            reason: reason.into(),
        }
    }

    /// An unschedulable-and-unresolvable status.
    #[must_use]
    pub fn unresolvable(reason: impl Into<String>) -> Self {
        Self {
            code: StatusCode::UnschedulableAndUnresolvable,
            reason: reason.into(),
        }
    }

    /// An error status.
    #[must_use]
    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            code: StatusCode::Error,
            reason: reason.into(),
        }
    }

    /// The status code.
    #[must_use]
    pub const fn code(&self) -> StatusCode {
        self.code
    }

    /// The reason string.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Whether the code is [`StatusCode::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.code == StatusCode::Success
    }

    /// Whether the code is [`StatusCode::Error`].
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.code == StatusCode::Error
    }
}

impl From<CoreError> for Status {
    fn from(err: CoreError) -> Self {
        Self::error(err.to_string())
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.reason.is_empty() {
            write!(f, "{:?}", self.code)
        } else {
            write!(f, "{:?}: {}", self.code, self.reason)
        }
    }
}

/// Result handed back to the framework after the post-filter hook.
///
/// `nominated_node` semantics:
/// - `None` keeps the preemptor's current nomination unchanged,
/// - `Some("")` clears any stale nomination,
/// - `Some(node)` commits the preemptor to `node`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PostFilterResult {
    /// Nominated node name, see the type-level documentation.
    pub nominated_node: Option<String>,
}

impl PostFilterResult {
    /// A result nominating the given node. An empty name clears the
    /// preemptor's nomination.
    #[must_use]
    pub fn with_nominated_node(node: impl Into<String>) -> Self {
        Self {
            nominated_node: Some(node.into()),
        }
    }

    /// A result clearing any stale nomination.
    #[must_use]
    pub fn clearing_nomination() -> Self {
        Self::with_nominated_node("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_constructors() {
        assert!(Status::success().is_success());
        assert_eq!(
            Status::unschedulable("no fit").code(),
            StatusCode::Unschedulable
        );
        assert_eq!(
            Status::unresolvable("taint").code(),
            StatusCode::UnschedulableAndUnresolvable
        );
        assert!(Status::error("boom").is_error());
    }

    #[test]
    fn status_display() {
        assert_eq!(Status::success().to_string(), "Success");
        assert_eq!(
            Status::unschedulable("Nothing can do").to_string(),
            "Unschedulable: Nothing can do"
        );
    }

    #[test]
    fn status_from_core_error() {
        let status = Status::from(CoreError::transient("timeout"));
        assert!(status.is_error());
        assert_eq!(status.reason(), "transient cluster error: timeout");
    }

    #[test]
    fn post_filter_result_nomination_modes() {
        let keep = PostFilterResult::default();
        assert_eq!(keep.nominated_node, None);

        let clear = PostFilterResult::clearing_nomination();
        assert_eq!(clear.nominated_node.as_deref(), Some(""));

        let commit = PostFilterResult::with_nominated_node("gpu-node-1");
        assert_eq!(commit.nominated_node.as_deref(), Some("gpu-node-1"));
    }
}
