//! Raw document access.
//!
//! Documents arrive as loosely-typed JSON objects with arbitrary key casing
//! and field names that have drifted across producer versions.
//! [`RawDocument`] gives the mappers tolerant, read-only access:
//! case-insensitive key lookup, fixed-priority alias resolution, and value
//! coercion for the handful of primitive shapes producers emit.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::{SyncError, SyncResult};

/// Aliases for the document identifier.
const ID_ALIASES: &[&str] = &["_id", "id", "uuid", "doc_id"];

/// Aliases for the kind discriminant.
const KIND_ALIASES: &[&str] = &["type", "kind", "doc_type"];

/// Aliases for the encryption flag.
const ENCRYPTED_ALIASES: &[&str] = &["encrypted", "is_encrypted", "isEncrypted"];

/// Aliases for the document-declared update timestamp.
const UPDATED_AT_ALIASES: &[&str] = &["updatedAt", "updated_at", "lastModified", "reported_date"];

/// A raw change-feed document.
#[derive(Debug, Clone)]
pub struct RawDocument {
    obj: Map<String, Value>,
}

impl RawDocument {
    /// Wrap a JSON value. Anything but an object is rejected.
    pub fn new(value: &Value) -> SyncResult<Self> {
        match value.as_object() {
            Some(obj) => Ok(Self { obj: obj.clone() }),
            None => Err(SyncError::NotAnObject),
        }
    }

    /// Look up a key: exact match first, then case-insensitive.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        if let Some(value) = self.obj.get(key) {
            return Some(value);
        }
        self.obj
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    /// The first non-null value among `aliases`, in order.
    ///
    /// The alias order is a contract: it decides which of two conflicting
    /// fields wins, so callers pass the canonical priority list verbatim.
    #[must_use]
    pub fn first_of(&self, aliases: &[&str]) -> Option<&Value> {
        aliases
            .iter()
            .filter_map(|alias| self.get(alias))
            .find(|value| !value.is_null())
    }

    /// The first alias value coerced to a trimmed, non-empty string.
    /// Numbers are rendered to their decimal form.
    #[must_use]
    pub fn str_of(&self, aliases: &[&str]) -> Option<String> {
        let value = self.first_of(aliases)?;
        let text = match value {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    /// The first alias value coerced to a boolean. Accepts JSON booleans,
    /// the strings "true"/"false", and 0/1.
    #[must_use]
    pub fn bool_of(&self, aliases: &[&str]) -> Option<bool> {
        match self.first_of(aliases)? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_i64().map(|n| n != 0),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// The first alias value coerced to a UTC instant.
    ///
    /// Producers emit either epoch milliseconds (number or numeric string)
    /// or an RFC 3339 string.
    #[must_use]
    pub fn datetime_of(&self, aliases: &[&str]) -> Option<DateTime<Utc>> {
        coerce_datetime(self.first_of(aliases)?)
    }

    /// The document identifier.
    #[must_use]
    pub fn id(&self) -> Option<String> {
        self.str_of(ID_ALIASES)
    }

    /// The declared kind, verbatim.
    #[must_use]
    pub fn kind_raw(&self) -> Option<String> {
        self.str_of(KIND_ALIASES)
    }

    /// The declared kind, parsed. `None` when the discriminant is absent or
    /// not one this pipeline knows; the caller decides how to log the two
    /// cases apart via [`RawDocument::kind_raw`].
    #[must_use]
    pub fn kind(&self) -> Option<DocumentKind> {
        self.kind_raw().and_then(|raw| raw.parse().ok())
    }

    /// Whether the document declares itself encrypted.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.bool_of(ENCRYPTED_ALIASES).unwrap_or(false)
    }

    /// The document-declared update timestamp, if any.
    #[must_use]
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.datetime_of(UPDATED_AT_ALIASES)
    }

    /// The document as a JSON value, verbatim.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.obj.clone())
    }
}

fn coerce_datetime(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(millis) = s.parse::<i64>() {
                return DateTime::from_timestamp_millis(millis);
            }
            DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        }
        _ => None,
    }
}

/// The closed set of document kinds this pipeline ingests.
///
/// Dispatch over this enum is exhaustive at compile time; a discriminant
/// outside the set never reaches it (the document is logged and skipped).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Patient demographic record.
    Patient,
    /// Clinical session (encounter).
    Session,
    /// Submitted form.
    Form,
    /// AI assistant interaction log.
    AiLog,
    /// Clinical report.
    Report,
    /// Imaging study.
    ImagingStudy,
}

impl DocumentKind {
    /// All kinds, for iteration in tests and configuration.
    pub const ALL: [DocumentKind; 6] = [
        Self::Patient,
        Self::Session,
        Self::Form,
        Self::AiLog,
        Self::Report,
        Self::ImagingStudy,
    ];

    /// Convert to the canonical string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Patient => "patient",
            Self::Session => "session",
            Self::Form => "form",
            Self::AiLog => "ai_log",
            Self::Report => "report",
            Self::ImagingStudy => "imaging_study",
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DocumentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Historical producer names, kept for compatibility.
        match s.to_lowercase().as_str() {
            "patient" | "person" | "contact" => Ok(Self::Patient),
            "session" | "encounter" | "visit" => Ok(Self::Session),
            "form" | "data_record" | "form_submission" => Ok(Self::Form),
            "ai_log" | "ai_interaction" | "ai_interaction_log" => Ok(Self::AiLog),
            "report" | "lab_report" => Ok(Self::Report),
            "imaging_study" | "imaging" | "radiology" => Ok(Self::ImagingStudy),
            _ => Err(format!("Unknown document kind: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rejects_non_objects() {
        assert!(RawDocument::new(&json!("scalar")).is_err());
        assert!(RawDocument::new(&json!([1, 2, 3])).is_err());
        assert!(RawDocument::new(&json!({})).is_ok());
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let doc = RawDocument::new(&json!({"PatientCpt": "CPT-1"})).unwrap();
        assert_eq!(doc.get("patientCpt"), Some(&json!("CPT-1")));
        assert_eq!(doc.get("patientcpt"), Some(&json!("CPT-1")));
        assert!(doc.get("patient_id").is_none());
    }

    #[test]
    fn test_first_of_priority_order() {
        // Both aliases present: the earlier alias must win.
        let doc = RawDocument::new(&json!({
            "patient_id": "CPT-LOSER",
            "patientCpt": "CPT-WINNER"
        }))
        .unwrap();
        assert_eq!(
            doc.str_of(&["patientCpt", "patient_id"]),
            Some("CPT-WINNER".into())
        );
        assert_eq!(
            doc.str_of(&["patient_id", "patientCpt"]),
            Some("CPT-LOSER".into())
        );
    }

    #[test]
    fn test_first_of_skips_nulls() {
        let doc = RawDocument::new(&json!({
            "patientCpt": null,
            "patient_id": "CPT-2"
        }))
        .unwrap();
        assert_eq!(
            doc.str_of(&["patientCpt", "patient_id"]),
            Some("CPT-2".into())
        );
    }

    #[test]
    fn test_str_of_coerces_numbers_and_trims() {
        let doc = RawDocument::new(&json!({"user": 42, "name": "  Ada  ", "blank": "   "}))
            .unwrap();
        assert_eq!(doc.str_of(&["user"]), Some("42".into()));
        assert_eq!(doc.str_of(&["name"]), Some("Ada".into()));
        assert_eq!(doc.str_of(&["blank"]), None);
    }

    #[test]
    fn test_datetime_coercion() {
        let doc = RawDocument::new(&json!({
            "a": 1_717_200_000_000_i64,
            "b": "1717200000000",
            "c": "2024-06-01T00:00:00Z",
            "d": "yesterday"
        }))
        .unwrap();
        let expected = DateTime::from_timestamp_millis(1_717_200_000_000).unwrap();
        assert_eq!(doc.datetime_of(&["a"]), Some(expected));
        assert_eq!(doc.datetime_of(&["b"]), Some(expected));
        assert_eq!(doc.datetime_of(&["c"]), Some(expected));
        assert_eq!(doc.datetime_of(&["d"]), None);
    }

    #[test]
    fn test_id_kind_encrypted() {
        let doc = RawDocument::new(&json!({
            "_id": "doc-1",
            "type": "Person",
            "encrypted": "true"
        }))
        .unwrap();
        assert_eq!(doc.id(), Some("doc-1".into()));
        assert_eq!(doc.kind(), Some(DocumentKind::Patient));
        assert!(doc.is_encrypted());

        let doc = RawDocument::new(&json!({"id": "doc-2", "type": "hologram"})).unwrap();
        assert_eq!(doc.kind_raw(), Some("hologram".into()));
        assert_eq!(doc.kind(), None);
        assert!(!doc.is_encrypted());
    }

    #[test]
    fn test_kind_aliases() {
        for (name, kind) in [
            ("encounter", DocumentKind::Session),
            ("data_record", DocumentKind::Form),
            ("ai_interaction_log", DocumentKind::AiLog),
            ("lab_report", DocumentKind::Report),
            ("radiology", DocumentKind::ImagingStudy),
        ] {
            assert_eq!(name.parse::<DocumentKind>(), Ok(kind));
        }
        assert!("".parse::<DocumentKind>().is_err());
    }

    #[test]
    fn test_kind_roundtrip() {
        for kind in DocumentKind::ALL {
            assert_eq!(kind.as_str().parse::<DocumentKind>(), Ok(kind));
        }
    }
}
