//! Plain data records and write-input structs.
//!
//! Records carry no behaviour beyond cheap accessors; every mutation goes
//! through a store trait. Each record has a matching write-input struct
//! (`PatientUpsert`, `TransitionWrite`, ...) so callers never hand a store a
//! half-initialised record.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use careflow_core::{
    PatientId, ReferralId, ReferralStatus, SessionId, SessionStage, TrackingCode, TransitionId,
    TriagePriority, UserId, WorkflowState,
};

/// A patient's demographic identity.
///
/// Keyed by the immutable human-assigned tracking code; the document-store
/// identifier, when present, is unique as well. Never hard-deleted, only
/// deactivated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    /// Unique identifier.
    pub id: PatientId,
    /// Human-assigned tracking code, immutable once issued.
    pub tracking_code: TrackingCode,
    /// Document-store identifier, if the patient originated there.
    pub doc_id: Option<String>,
    /// Given name.
    pub given_name: Option<String>,
    /// Family name.
    pub family_name: Option<String>,
    /// Reported sex.
    pub sex: Option<String>,
    /// Date of birth.
    pub date_of_birth: Option<NaiveDate>,
    /// Contact phone number.
    pub phone: Option<String>,
    /// Catchment area or village.
    pub area: Option<String>,
    /// Number of recorded visits. Maintained by `record_visit`, never by
    /// the table-level upsert.
    pub visit_count: i64,
    /// When the patient was last seen.
    pub last_seen_at: Option<DateTime<Utc>>,
    /// Whether the record is active.
    pub active: bool,
    /// Update timestamp declared by the producing document.
    pub doc_updated_at: Option<DateTime<Utc>>,
    /// When the row was created locally.
    pub created_at: DateTime<Utc>,
    /// When the row was last written locally.
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a patient directly (registration path, or a
/// placeholder raised when a session arrives before its patient document).
#[derive(Debug, Clone)]
pub struct NewPatient {
    /// Tracking code to issue the patient under.
    pub tracking_code: TrackingCode,
    /// Given name.
    pub given_name: Option<String>,
    /// Family name.
    pub family_name: Option<String>,
    /// Creation instant (from the caller's clock).
    pub created_at: DateTime<Utc>,
}

/// Canonical patient fields produced by the field mapper, ready to upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientUpsert {
    /// Document-store identifier. The idempotency key.
    pub doc_id: String,
    /// Tracking code carried by the document.
    pub tracking_code: TrackingCode,
    /// Given name.
    pub given_name: Option<String>,
    /// Family name.
    pub family_name: Option<String>,
    /// Reported sex.
    pub sex: Option<String>,
    /// Date of birth.
    pub date_of_birth: Option<NaiveDate>,
    /// Contact phone number.
    pub phone: Option<String>,
    /// Catchment area or village.
    pub area: Option<String>,
    /// Update timestamp declared by the document.
    pub doc_updated_at: Option<DateTime<Utc>>,
    /// When the document was observed locally.
    pub observed_at: DateTime<Utc>,
}

/// Outcome of a patient upsert.
#[derive(Debug, Clone)]
pub enum PatientWrite {
    /// A new row was created.
    Created(Patient),
    /// An existing row was refreshed.
    Refreshed(Patient),
    /// The incoming write was older than the stored row and was discarded.
    SkippedStale(Patient),
}

impl PatientWrite {
    /// The stored row after the write, whatever the outcome.
    #[must_use]
    pub fn patient(&self) -> &Patient {
        match self {
            Self::Created(p) | Self::Refreshed(p) | Self::SkippedStale(p) => p,
        }
    }

    /// Check if the incoming write was applied.
    #[must_use]
    pub fn applied(&self) -> bool {
        !matches!(self, Self::SkippedStale(_))
    }
}

/// One clinical visit (encounter).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicalSession {
    /// Unique identifier.
    pub id: SessionId,
    /// The patient this visit belongs to.
    pub patient_id: PatientId,
    /// Document-store identifier, if the session originated there.
    pub doc_id: Option<String>,
    /// Coarse lifecycle phase reported by the producer.
    pub stage: SessionStage,
    /// Fine-grained machine state. Mutated only by the workflow state
    /// machine once the row exists.
    pub workflow_state: WorkflowState,
    /// When the workflow state last changed. Monotonically non-decreasing.
    pub state_updated_at: DateTime<Utc>,
    /// Triage severity.
    pub triage_priority: TriagePriority,
    /// Free-text chief complaint.
    pub chief_complaint: Option<String>,
    /// Free-text clinical notes.
    pub notes: Option<String>,
    /// Structured treatment plan.
    pub treatment_plan: Option<serde_json::Value>,
    /// Creation timestamp declared by the producing document.
    pub doc_created_at: Option<DateTime<Utc>>,
    /// Update timestamp declared by the producing document.
    pub doc_updated_at: Option<DateTime<Utc>>,
    /// Stamped when the session transitions into the closed state.
    pub completed_at: Option<DateTime<Utc>>,
    /// When the row was created locally.
    pub created_at: DateTime<Utc>,
    /// When the row was last written locally.
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a session directly (registration path).
#[derive(Debug, Clone)]
pub struct NewSession {
    /// The patient this visit belongs to.
    pub patient_id: PatientId,
    /// Coarse lifecycle phase.
    pub stage: SessionStage,
    /// Triage severity.
    pub triage_priority: TriagePriority,
    /// Free-text chief complaint.
    pub chief_complaint: Option<String>,
    /// Creation instant (from the caller's clock).
    pub created_at: DateTime<Utc>,
}

/// Canonical session fields produced by the field mapper, ready to upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionUpsert {
    /// Document-store identifier. The idempotency key.
    pub doc_id: String,
    /// The patient this visit belongs to.
    pub patient_id: PatientId,
    /// Coarse lifecycle phase, when reported.
    pub stage: Option<SessionStage>,
    /// Workflow state reported by the document. Adopted only at row
    /// creation; refreshes never overwrite the machine-owned state.
    pub reported_state: Option<WorkflowState>,
    /// Triage severity.
    pub triage_priority: TriagePriority,
    /// Free-text chief complaint.
    pub chief_complaint: Option<String>,
    /// Free-text clinical notes.
    pub notes: Option<String>,
    /// Structured treatment plan.
    pub treatment_plan: Option<serde_json::Value>,
    /// Creation timestamp declared by the document.
    pub doc_created_at: Option<DateTime<Utc>>,
    /// Update timestamp declared by the document.
    pub doc_updated_at: Option<DateTime<Utc>>,
    /// When the document was observed locally.
    pub observed_at: DateTime<Utc>,
}

/// Outcome of a session upsert.
#[derive(Debug, Clone)]
pub enum SessionWrite {
    /// A new row was created.
    Created(ClinicalSession),
    /// An existing row was refreshed. `previous` is the row before the
    /// write, for side-effect decisions.
    Refreshed {
        session: ClinicalSession,
        previous: Box<ClinicalSession>,
    },
    /// The incoming write was older than the stored row and was discarded.
    SkippedStale(ClinicalSession),
    /// The stored session is closed; closed sessions are immutable to sync.
    SkippedClosed(ClinicalSession),
}

impl SessionWrite {
    /// The stored row after the write, whatever the outcome.
    #[must_use]
    pub fn session(&self) -> &ClinicalSession {
        match self {
            Self::Created(s) | Self::SkippedStale(s) | Self::SkippedClosed(s) => s,
            Self::Refreshed { session, .. } => session,
        }
    }

    /// Check if the incoming write was applied.
    #[must_use]
    pub fn applied(&self) -> bool {
        matches!(self, Self::Created(_) | Self::Refreshed { .. })
    }
}

/// Append-only audit row for one workflow-state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    /// Unique identifier.
    pub id: TransitionId,
    /// The session that changed state.
    pub session_id: SessionId,
    /// State before the change.
    pub from_state: WorkflowState,
    /// State after the change.
    pub to_state: WorkflowState,
    /// User who performed the change, when known.
    pub actor_id: Option<UserId>,
    /// Justification supplied with the change.
    pub reason: Option<String>,
    /// Free-form metadata supplied with the change.
    pub metadata: Option<serde_json::Value>,
    /// When the change occurred.
    pub occurred_at: DateTime<Utc>,
}

/// Input for the atomic transition write.
///
/// `expected_from` is the compare-and-set guard: the write only applies if
/// the locked row is still in that state.
#[derive(Debug, Clone)]
pub struct TransitionWrite {
    /// The session to transition.
    pub session_id: SessionId,
    /// The state the caller validated against.
    pub expected_from: WorkflowState,
    /// The target state.
    pub to: WorkflowState,
    /// User performing the transition, when known.
    pub actor_id: Option<UserId>,
    /// Justification for the transition.
    pub reason: Option<String>,
    /// Free-form metadata.
    pub metadata: Option<serde_json::Value>,
    /// Instant of the transition (from the caller's clock). Clamped by the
    /// store so `state_updated_at` never decreases.
    pub occurred_at: DateTime<Utc>,
}

/// Result of a successful atomic transition write.
#[derive(Debug, Clone)]
pub struct AppliedTransition {
    /// The audit row that was written.
    pub transition: StateTransition,
    /// The session row after the state change.
    pub session: ClinicalSession,
}

/// A request to move responsibility for a session to another actor/role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Referral {
    /// Unique identifier.
    pub id: ReferralId,
    /// The session being referred.
    pub session_id: SessionId,
    /// Referral status (sub-state-machine).
    pub status: ReferralStatus,
    /// Urgency of the referral.
    pub priority: TriagePriority,
    /// Requested specialty, when stated.
    pub specialty: Option<String>,
    /// Why the referral was raised.
    pub reason: Option<String>,
    /// User the referral is assigned to, when known.
    pub assigned_to: Option<UserId>,
    /// When the referral was created.
    pub created_at: DateTime<Utc>,
    /// When the referral was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a referral.
#[derive(Debug, Clone)]
pub struct NewReferral {
    /// The session being referred.
    pub session_id: SessionId,
    /// Urgency of the referral.
    pub priority: TriagePriority,
    /// Requested specialty, when stated.
    pub specialty: Option<String>,
    /// Why the referral was raised.
    pub reason: Option<String>,
    /// User the referral is assigned to, when known.
    pub assigned_to: Option<UserId>,
    /// Creation instant (from the caller's clock).
    pub created_at: DateTime<Utc>,
}

/// A document stored verbatim alongside its parsed stub.
///
/// This is the persistence target for form / AI-log / report / imaging
/// kinds, and what makes encrypted payloads reprocessable later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedDocument {
    /// Document-store identifier.
    pub doc_id: String,
    /// Declared kind, verbatim.
    pub kind: Option<String>,
    /// Tracking code of the referenced patient, when the stub could be read.
    pub patient_ref: Option<TrackingCode>,
    /// Human-readable name (form name, report title, study description).
    pub title: Option<String>,
    /// Whether the payload declared itself encrypted.
    pub encrypted: bool,
    /// The raw document, verbatim.
    pub body: serde_json::Value,
    /// Update timestamp declared by the document.
    pub doc_updated_at: Option<DateTime<Utc>>,
    /// When the document was observed locally.
    pub received_at: DateTime<Utc>,
}

/// The last successfully processed change-feed position for one source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedCheckpoint {
    /// Name of the feed source (one per document-store database).
    pub source: String,
    /// Opaque feed position from the document store.
    pub position: String,
    /// When the checkpoint was advanced.
    pub updated_at: DateTime<Utc>,
}

/// A user known to the local directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryUser {
    /// Unique identifier.
    pub id: UserId,
    /// Numeric identifier from the legacy relational user table, when the
    /// user predates UUID identities.
    pub legacy_id: Option<i64>,
    /// Login name.
    pub username: String,
    /// Contact email.
    pub email: Option<String>,
    /// Contact phone number.
    pub phone: Option<String>,
    /// Whether the account is active.
    pub active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_session() -> ClinicalSession {
        ClinicalSession {
            id: SessionId::new(),
            patient_id: PatientId::new(),
            doc_id: Some("doc-1".into()),
            stage: SessionStage::Assessment,
            workflow_state: WorkflowState::New,
            state_updated_at: Utc::now(),
            triage_priority: TriagePriority::Green,
            chief_complaint: None,
            notes: None,
            treatment_plan: None,
            doc_created_at: None,
            doc_updated_at: None,
            completed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_session_write_applied() {
        let session = sample_session();
        assert!(SessionWrite::Created(session.clone()).applied());
        assert!(SessionWrite::Refreshed {
            session: session.clone(),
            previous: Box::new(session.clone()),
        }
        .applied());
        assert!(!SessionWrite::SkippedStale(session.clone()).applied());
        assert!(!SessionWrite::SkippedClosed(session).applied());
    }

    #[test]
    fn test_patient_write_accessors() {
        let patient = Patient {
            id: PatientId::new(),
            tracking_code: TrackingCode::new("CPT-1"),
            doc_id: None,
            given_name: Some("Ada".into()),
            family_name: None,
            sex: None,
            date_of_birth: None,
            phone: None,
            area: None,
            visit_count: 0,
            last_seen_at: None,
            active: true,
            doc_updated_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let write = PatientWrite::SkippedStale(patient.clone());
        assert!(!write.applied());
        assert_eq!(write.patient().tracking_code, patient.tracking_code);
    }
}
