//! Strongly typed identifiers.
//!
//! Newtype wrappers around [`Uuid`] so that the different entity identifiers
//! cannot be confused at compile time, plus the human-assigned
//! [`TrackingCode`] that joins every entity back to a patient.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// Error type for ID parsing failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The underlying UUID parse error message.
    pub message: String,
}

impl Display for ParseIdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Failed to parse {}: {}", self.id_type, self.message)
    }
}

impl std::error::Error for ParseIdError {}

/// Macro to define a strongly-typed ID type.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random ID using UUID v4.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an ID from an existing UUID.
            #[must_use]
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns a reference to the underlying UUID.
            #[must_use]
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self).map_err(|e| ParseIdError {
                    id_type: stringify!($name),
                    message: e.to_string(),
                })
            }
        }
    };
}

define_id!(
    /// Strongly typed identifier for patients.
    PatientId
);

define_id!(
    /// Strongly typed identifier for clinical sessions (encounters).
    SessionId
);

define_id!(
    /// Strongly typed identifier for workflow state transition audit rows.
    TransitionId
);

define_id!(
    /// Strongly typed identifier for referrals.
    ReferralId
);

define_id!(
    /// Strongly typed identifier for local users (clinicians, reviewers).
    UserId
);

/// Human-assigned patient tracking code.
///
/// Issued once at registration and immutable afterwards; this is the join
/// key every other entity uses to reference a patient, independent of the
/// document-store identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackingCode(String);

impl TrackingCode {
    /// Create a tracking code from its string form.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// The code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TrackingCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TrackingCode {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_roundtrip() {
        let id = SessionId::new();
        let parsed: SessionId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_id_parse_failure() {
        let err = "not-a-uuid".parse::<PatientId>().unwrap_err();
        assert_eq!(err.id_type, "PatientId");
    }

    #[test]
    fn test_ids_are_distinct_types() {
        // Compile-time property; just exercise construction from a shared UUID.
        let uuid = Uuid::new_v4();
        let patient = PatientId::from_uuid(uuid);
        let session = SessionId::from_uuid(uuid);
        assert_eq!(patient.as_uuid(), session.as_uuid());
    }

    #[test]
    fn test_tracking_code() {
        let code = TrackingCode::new("CPT-00042");
        assert_eq!(code.as_str(), "CPT-00042");
        assert_eq!(code.to_string(), "CPT-00042");
        assert_eq!(TrackingCode::from("CPT-00042"), code);
    }

    #[test]
    fn test_serde_transparent() {
        let id = ReferralId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }
}
