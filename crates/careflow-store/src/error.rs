//! Store error types.

use careflow_core::{SessionId, WorkflowState};
use thiserror::Error;

/// Errors that can occur in a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Entity not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The session's workflow state changed between read and locked write.
    ///
    /// Returned by the atomic transition write when the compare-and-set on
    /// the expected from-state fails; the caller is expected to re-read and
    /// re-validate against the actual state.
    #[error("Session {session_id} is in state {actual}, expected {expected}")]
    StaleState {
        session_id: SessionId,
        expected: WorkflowState,
        actual: WorkflowState,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Create a not found error.
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
