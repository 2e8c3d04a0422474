//! Workflow error types.

use thiserror::Error;

use careflow_core::{SessionId, WorkflowState};
use careflow_store::StoreError;

/// Errors that can occur in the workflow state machine.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The requested transition is not in the legal-transition table.
    ///
    /// Recoverable: the caller should re-query allowed transitions and
    /// retry with a legal target.
    #[error("Illegal transition from {from} to {to}")]
    InvalidTransition {
        from: WorkflowState,
        to: WorkflowState,
    },

    /// The (from, to) pair requires a non-empty reason and none was given.
    #[error("Transition from {from} to {to} requires a reason")]
    ReasonRequired {
        from: WorkflowState,
        to: WorkflowState,
    },

    /// The session does not exist.
    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: SessionId },

    /// Store error. Fatal for the single request; the atomic transition
    /// write guarantees no partial effect is observable.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl WorkflowError {
    /// Check if the caller can recover by correcting the request.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            WorkflowError::InvalidTransition { .. } | WorkflowError::ReasonRequired { .. }
        )
    }
}

/// Result type for workflow operations.
pub type Result<T> = std::result::Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_names_states() {
        let err = WorkflowError::InvalidTransition {
            from: WorkflowState::Closed,
            to: WorkflowState::UnderTreatment,
        };
        assert_eq!(err.to_string(), "Illegal transition from closed to under_treatment");
        assert!(err.is_recoverable());

        let err = WorkflowError::ReasonRequired {
            from: WorkflowState::Triaged,
            to: WorkflowState::Closed,
        };
        assert!(err.to_string().contains("requires a reason"));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_store_errors_are_not_recoverable() {
        let err = WorkflowError::from(StoreError::not_found("Session", "x"));
        assert!(!err.is_recoverable());
    }
}
