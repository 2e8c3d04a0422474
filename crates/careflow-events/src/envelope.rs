//! Event envelope wrapping all events with metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use careflow_core::UserId;

use crate::error::EventError;
use crate::event::Event;

/// Standard envelope wrapping every Careflow event.
///
/// Carries the metadata consumers need for routing, idempotence, and audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope<T> {
    /// Unique identifier for this event instance, used for idempotence
    /// checking by consumers.
    pub event_id: Uuid,

    /// Fully qualified event type name.
    pub event_type: String,

    /// User that triggered the event. `None` for system-generated events.
    pub actor_id: Option<UserId>,

    /// When the event occurred.
    pub timestamp: DateTime<Utc>,

    /// The actual event payload.
    pub payload: T,
}

impl<T: Event> EventEnvelope<T> {
    /// Create a new event envelope.
    ///
    /// The timestamp comes from the caller's clock; envelopes never read
    /// wall-clock time themselves.
    pub fn new(payload: T, actor_id: Option<UserId>, timestamp: DateTime<Utc>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: T::EVENT_TYPE.to_string(),
            actor_id,
            timestamp,
            payload,
        }
    }

    /// Erase the payload type for transport.
    pub fn into_raw(self) -> Result<RawEnvelope, EventError> {
        let payload =
            serde_json::to_value(&self.payload).map_err(|e| EventError::SerializationFailed {
                event_type: T::EVENT_TYPE.to_string(),
                cause: e.to_string(),
            })?;
        Ok(RawEnvelope {
            event_id: self.event_id,
            event_type: self.event_type,
            actor_id: self.actor_id,
            timestamp: self.timestamp,
            payload,
        })
    }
}

/// Type-erased envelope, for publishers and for consumers that dispatch on
/// the event type at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEnvelope {
    /// Unique identifier for this event instance.
    pub event_id: Uuid,
    /// Fully qualified event type name.
    pub event_type: String,
    /// User that triggered the event.
    pub actor_id: Option<UserId>,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// The payload as JSON.
    pub payload: serde_json::Value,
}

impl RawEnvelope {
    /// Validate that required fields are present and follow the naming
    /// convention.
    pub fn validate(&self) -> Result<(), EventError> {
        if self.event_type.is_empty() {
            return Err(EventError::InvalidEnvelope {
                reason: "event_type is empty".to_string(),
            });
        }
        if !self.event_type.starts_with("careflow.") {
            return Err(EventError::InvalidEnvelope {
                reason: format!(
                    "event_type '{}' does not follow naming convention",
                    self.event_type
                ),
            });
        }
        Ok(())
    }

    /// Try to deserialize the payload into a specific event type.
    pub fn into_typed<T: Event>(self) -> Result<EventEnvelope<T>, EventError> {
        let payload: T =
            serde_json::from_value(self.payload).map_err(|e| EventError::InvalidEnvelope {
                reason: format!("payload does not match {}: {e}", self.event_type),
            })?;
        Ok(EventEnvelope {
            event_id: self.event_id,
            event_type: self.event_type,
            actor_id: self.actor_id,
            timestamp: self.timestamp,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct TestEvent {
        message: String,
    }

    impl Event for TestEvent {
        const EVENT_TYPE: &'static str = "careflow.test.event";
    }

    #[test]
    fn test_envelope_creation() {
        let actor = UserId::new();
        let timestamp = Utc::now();
        let envelope = EventEnvelope::new(
            TestEvent {
                message: "hello".into(),
            },
            Some(actor),
            timestamp,
        );
        assert_eq!(envelope.event_type, "careflow.test.event");
        assert_eq!(envelope.actor_id, Some(actor));
        assert_eq!(envelope.timestamp, timestamp);
    }

    #[test]
    fn test_raw_roundtrip() {
        let envelope = EventEnvelope::new(
            TestEvent {
                message: "typed".into(),
            },
            None,
            Utc::now(),
        );
        let event_id = envelope.event_id;

        let raw = envelope.into_raw().unwrap();
        assert!(raw.validate().is_ok());

        let typed: EventEnvelope<TestEvent> = raw.into_typed().unwrap();
        assert_eq!(typed.event_id, event_id);
        assert_eq!(typed.payload.message, "typed");
    }

    #[test]
    fn test_raw_envelope_validation() {
        let raw = RawEnvelope {
            event_id: Uuid::new_v4(),
            event_type: "not-careflow".into(),
            actor_id: None,
            timestamp: Utc::now(),
            payload: serde_json::json!({}),
        };
        assert!(raw.validate().is_err());
    }
}
