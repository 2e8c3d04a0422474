//! Event error types.

use thiserror::Error;

/// Errors that can occur when building or publishing events.
#[derive(Debug, Error)]
pub enum EventError {
    /// Failed to serialize an event payload.
    #[error("Failed to serialize event {event_type}: {cause}")]
    SerializationFailed {
        /// Type of the event that failed.
        event_type: String,
        /// Underlying serialization failure.
        cause: String,
    },

    /// An envelope failed validation.
    #[error("Invalid event envelope: {reason}")]
    InvalidEnvelope {
        /// Why the envelope was rejected.
        reason: String,
    },

    /// The publisher could not deliver the event.
    #[error("Failed to publish event {event_type}: {cause}")]
    PublishFailed {
        /// Type of the event that failed.
        event_type: String,
        /// Underlying delivery failure.
        cause: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EventError::InvalidEnvelope {
            reason: "event_type is empty".into(),
        };
        assert!(err.to_string().contains("event_type is empty"));
    }
}
