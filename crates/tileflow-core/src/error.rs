//! Typed errors surfaced by the control API

use thiserror::Error;

/// Errors returned to callers of the control-plane operations
///
/// Executor failures are not represented here: they are reported as job
/// state (`FAILED` with an error message) and cascade to dependents.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControlError {
    #[error("tenant id is missing or empty")]
    TenantMissing,

    #[error("workflow validation failed: {reason}")]
    ValidationFailed { reason: String },

    #[error("tenant admission cap reached")]
    TenantRejected,

    #[error("workflow id '{0}' already exists")]
    DuplicateWorkflowId(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("job '{0}' is no longer cancellable")]
    NotCancellable(String),

    #[error("scheduler is not running: {0}")]
    SchedulerUnavailable(String),
}

impl ControlError {
    pub fn validation(reason: impl Into<String>) -> Self {
        ControlError::ValidationFailed {
            reason: reason.into(),
        }
    }

    /// Stable machine-readable error kind
    pub fn code(&self) -> &'static str {
        match self {
            ControlError::TenantMissing => "tenant_missing",
            ControlError::ValidationFailed { .. } => "validation_failed",
            ControlError::TenantRejected => "tenant_rejected",
            ControlError::DuplicateWorkflowId(_) => "duplicate_workflow_id",
            ControlError::NotFound(_) => "not_found",
            ControlError::NotCancellable(_) => "not_cancellable",
            ControlError::SchedulerUnavailable(_) => "internal_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(ControlError::TenantMissing.code(), "tenant_missing");
        assert_eq!(
            ControlError::validation("cycle detected").code(),
            "validation_failed"
        );
        assert_eq!(
            ControlError::NotCancellable("a".into()).code(),
            "not_cancellable"
        );
    }

    #[test]
    fn test_validation_message() {
        let err = ControlError::validation("job 'b' depends on unknown job 'x'");
        assert_eq!(
            err.to_string(),
            "workflow validation failed: job 'b' depends on unknown job 'x'"
        );
    }
}
