//! Store traits.
//!
//! Both subsystems receive these as `Arc<dyn ...>` so tests can supply the
//! in-memory backend. Backends are expected to serialize writes to the same
//! row; the atomic guarantees each method must provide are documented on the
//! method.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use careflow_core::{PatientId, ReferralId, ReferralStatus, SessionId, TrackingCode, UserId};

use crate::error::Result;
use crate::records::{
    AppliedTransition, ArchivedDocument, ClinicalSession, DirectoryUser, FeedCheckpoint,
    NewPatient, NewReferral, NewSession, Patient, PatientUpsert, PatientWrite, Referral,
    SessionUpsert, SessionWrite, StateTransition, TransitionWrite,
};

/// Store for patient rows.
#[async_trait]
pub trait PatientStore: Send + Sync {
    /// Create a patient directly, without a document-store identifier.
    async fn create_patient(&self, input: NewPatient) -> Result<Patient>;

    /// Upsert a patient keyed by its document-store identifier.
    ///
    /// Runs the last-writer-wins guard against the stored
    /// `doc_updated_at` under the row lock; a stale write returns
    /// [`PatientWrite::SkippedStale`] and changes nothing.
    async fn upsert_patient(&self, input: PatientUpsert) -> Result<PatientWrite>;

    /// Get a patient by ID.
    async fn get_patient(&self, id: PatientId) -> Result<Option<Patient>>;

    /// Find a patient by tracking code.
    async fn find_patient_by_code(&self, code: &TrackingCode) -> Result<Option<Patient>>;

    /// Find a patient by document-store identifier.
    async fn find_patient_by_doc_id(&self, doc_id: &str) -> Result<Option<Patient>>;

    /// Record a visit: increment the visit counter and refresh the
    /// last-seen timestamp. Counters are excluded from the table-level
    /// upsert so that redelivery stays idempotent.
    async fn record_visit(&self, id: PatientId, seen_at: DateTime<Utc>) -> Result<Patient>;

    /// Deactivate a patient. Patients are never hard-deleted.
    async fn deactivate_patient(&self, id: PatientId, at: DateTime<Utc>) -> Result<Patient>;
}

/// Store for clinical sessions and their transition audit trail.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a session directly (registration path). The session starts in
    /// the initial workflow state.
    async fn create_session(&self, input: NewSession) -> Result<ClinicalSession>;

    /// Upsert a session keyed by its document-store identifier.
    ///
    /// Under the row lock: a closed session is immutable to sync
    /// ([`SessionWrite::SkippedClosed`]); an incoming write older than the
    /// stored `doc_updated_at` is discarded ([`SessionWrite::SkippedStale`]).
    /// The machine-owned `workflow_state` is adopted from
    /// `reported_state` only at row creation, never on refresh.
    async fn upsert_session(&self, input: SessionUpsert) -> Result<SessionWrite>;

    /// Get a session by ID.
    async fn get_session(&self, id: SessionId) -> Result<Option<ClinicalSession>>;

    /// Find a session by document-store identifier.
    async fn find_session_by_doc_id(&self, doc_id: &str) -> Result<Option<ClinicalSession>>;

    /// List the sessions of a patient, newest first.
    async fn list_sessions_for_patient(&self, patient_id: PatientId)
        -> Result<Vec<ClinicalSession>>;

    /// Atomically write a state transition: append the audit row, update
    /// the session's workflow state and `state_updated_at`, and stamp
    /// `completed_at` when the target state is terminal. All or nothing.
    ///
    /// The write re-checks the session's state under the row lock; if it no
    /// longer equals `expected_from` the method fails with
    /// [`crate::StoreError::StaleState`] and nothing is written.
    async fn apply_transition(&self, write: TransitionWrite) -> Result<AppliedTransition>;

    /// The ordered audit trail for a session (oldest first).
    async fn transition_history(&self, session_id: SessionId) -> Result<Vec<StateTransition>>;
}

/// Store for referrals.
#[async_trait]
pub trait ReferralStore: Send + Sync {
    /// Create a referral.
    async fn create_referral(&self, input: NewReferral) -> Result<Referral>;

    /// Get a referral by ID.
    async fn get_referral(&self, id: ReferralId) -> Result<Option<Referral>>;

    /// The pending referral for a session, if one exists.
    async fn find_pending_referral(&self, session_id: SessionId) -> Result<Option<Referral>>;

    /// List all referrals for a session, newest first.
    async fn list_referrals_for_session(&self, session_id: SessionId) -> Result<Vec<Referral>>;

    /// Set a referral's status. Referrals are never deleted.
    async fn set_referral_status(
        &self,
        id: ReferralId,
        status: ReferralStatus,
        at: DateTime<Utc>,
    ) -> Result<Referral>;
}

/// Verbatim archive of synced documents.
#[async_trait]
pub trait DocumentArchive: Send + Sync {
    /// Store a document verbatim, replacing any prior copy with the same
    /// document-store identifier.
    async fn archive_document(&self, doc: ArchivedDocument) -> Result<()>;

    /// Fetch an archived document.
    async fn get_document(&self, doc_id: &str) -> Result<Option<ArchivedDocument>>;
}

/// Store for change-feed checkpoints.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// The checkpoint for a feed source, if one has been saved.
    async fn get_checkpoint(&self, source: &str) -> Result<Option<FeedCheckpoint>>;

    /// Save (replace) the checkpoint for a feed source.
    async fn save_checkpoint(&self, checkpoint: FeedCheckpoint) -> Result<()>;
}

/// The local user directory.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Look up a user by legacy numeric identifier.
    async fn find_user_by_legacy_id(&self, legacy_id: i64) -> Result<Option<DirectoryUser>>;

    /// Look up a user by UUID identity.
    async fn find_user_by_id(&self, id: UserId) -> Result<Option<DirectoryUser>>;

    /// Look up a user by contact field (username, email, or phone).
    /// Matching is exact, case-insensitive for username and email.
    async fn find_user_by_contact(&self, needle: &str) -> Result<Option<DirectoryUser>>;
}
