//! Session lifecycle events.

use serde::{Deserialize, Serialize};

use careflow_core::{SessionId, WorkflowState};

use crate::event::Event;

/// A clinical session changed workflow state.
///
/// Consumed by external reporting and notification collaborators; the
/// acting user and the instant of the change ride on the envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionStateChanged {
    /// The session that changed.
    pub session_id: SessionId,
    /// State before the change.
    pub from_state: WorkflowState,
    /// State after the change.
    pub to_state: WorkflowState,
}

impl Event for SessionStateChanged {
    const EVENT_TYPE: &'static str = "careflow.session.state_changed";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::EventEnvelope;
    use chrono::Utc;

    #[test]
    fn test_state_changed_event_type() {
        let envelope = EventEnvelope::new(
            SessionStateChanged {
                session_id: SessionId::new(),
                from_state: WorkflowState::New,
                to_state: WorkflowState::Triaged,
            },
            None,
            Utc::now(),
        );
        assert_eq!(envelope.event_type, "careflow.session.state_changed");

        let raw = envelope.into_raw().unwrap();
        assert_eq!(raw.payload["from_state"], "new");
        assert_eq!(raw.payload["to_state"], "triaged");
    }
}
