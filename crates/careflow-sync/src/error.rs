//! Sync error types.

use thiserror::Error;

use careflow_store::StoreError;

/// Errors that can occur during synchronization.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The document is not a JSON object.
    #[error("Document is not an object")]
    NotAnObject,

    /// The document carries no identifier.
    #[error("Document has no identifier")]
    MissingId,

    /// The document carries no kind discriminant.
    #[error("Document {doc_id} has no kind discriminant")]
    MissingKind { doc_id: String },

    /// The declared kind is not one this pipeline knows.
    #[error("Document {doc_id} has unknown kind '{kind}'")]
    UnknownKind { doc_id: String, kind: String },

    /// A required field is absent under every known alias.
    #[error("Document {doc_id}: no value for '{field}' under any known alias")]
    MissingField {
        doc_id: String,
        field: &'static str,
    },

    /// A field was present but could not be interpreted.
    #[error("Document {doc_id}: field '{field}' - {message}")]
    Mapping {
        doc_id: String,
        field: &'static str,
        message: String,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Create a missing field error.
    pub fn missing_field(doc_id: impl Into<String>, field: &'static str) -> Self {
        Self::MissingField {
            doc_id: doc_id.into(),
            field,
        }
    }

    /// Create a mapping error.
    pub fn mapping(
        doc_id: impl Into<String>,
        field: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::Mapping {
            doc_id: doc_id.into(),
            field,
            message: message.into(),
        }
    }

    /// Check if this error marks skippable data rather than a failure.
    ///
    /// Skippable documents are logged and counted as skipped; the batch
    /// continues and nothing surfaces to the caller.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            SyncError::NotAnObject
                | SyncError::MissingId
                | SyncError::MissingKind { .. }
                | SyncError::UnknownKind { .. }
        )
    }
}

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SyncError::missing_field("doc-9", "tracking_code");
        assert!(err.to_string().contains("doc-9"));
        assert!(err.to_string().contains("tracking_code"));

        let err = SyncError::mapping("doc-9", "date_of_birth", "not a date");
        assert!(err.to_string().contains("date_of_birth"));
        assert!(err.to_string().contains("not a date"));
    }

    #[test]
    fn test_is_skippable() {
        assert!(SyncError::MissingId.is_skippable());
        assert!(SyncError::MissingKind {
            doc_id: "d".into()
        }
        .is_skippable());
        assert!(SyncError::UnknownKind {
            doc_id: "d".into(),
            kind: "mystery".into()
        }
        .is_skippable());
        assert!(!SyncError::missing_field("d", "patient").is_skippable());
    }
}
