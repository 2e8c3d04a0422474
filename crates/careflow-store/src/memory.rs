//! In-memory store backend.
//!
//! Backs every store trait with maps behind a single `RwLock`, so the
//! compare-and-set transition write and the last-writer-wins upsert guard
//! hold the same lock a relational backend takes on the row.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::warn;

use careflow_core::{
    PatientId, ReferralId, ReferralStatus, SessionId, SessionStage, TrackingCode, TransitionId,
    UserId, WorkflowState,
};

use crate::conflict::resolve_write;
use crate::error::{Result, StoreError};
use crate::records::{
    AppliedTransition, ArchivedDocument, ClinicalSession, DirectoryUser, FeedCheckpoint,
    NewPatient, NewReferral, NewSession, Patient, PatientUpsert, PatientWrite, Referral,
    SessionUpsert, SessionWrite, StateTransition, TransitionWrite,
};
use crate::traits::{
    CheckpointStore, DocumentArchive, PatientStore, ReferralStore, SessionStore, UserDirectory,
};

#[derive(Debug, Default)]
struct Inner {
    patients: HashMap<PatientId, Patient>,
    patients_by_code: HashMap<String, PatientId>,
    patients_by_doc: HashMap<String, PatientId>,
    sessions: HashMap<SessionId, ClinicalSession>,
    sessions_by_doc: HashMap<String, SessionId>,
    transitions: Vec<StateTransition>,
    referrals: HashMap<ReferralId, Referral>,
    archive: HashMap<String, ArchivedDocument>,
    checkpoints: HashMap<String, FeedCheckpoint>,
    users: Vec<DirectoryUser>,
}

/// In-memory backend for every store trait.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user to the directory (for tests).
    pub async fn add_user(&self, user: DirectoryUser) {
        self.inner.write().await.users.push(user);
    }

    /// Number of transition audit rows in the store (for tests).
    pub async fn transition_count(&self) -> usize {
        self.inner.read().await.transitions.len()
    }

    /// Number of referrals in the store (for tests).
    pub async fn referral_count(&self) -> usize {
        self.inner.read().await.referrals.len()
    }

    /// Number of archived documents in the store (for tests).
    pub async fn archived_count(&self) -> usize {
        self.inner.read().await.archive.len()
    }

    /// Clear everything (for tests).
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        *inner = Inner::default();
    }
}

#[async_trait]
impl PatientStore for InMemoryStore {
    async fn create_patient(&self, input: NewPatient) -> Result<Patient> {
        let mut inner = self.inner.write().await;
        let patient = Patient {
            id: PatientId::new(),
            tracking_code: input.tracking_code.clone(),
            doc_id: None,
            given_name: input.given_name,
            family_name: input.family_name,
            sex: None,
            date_of_birth: None,
            phone: None,
            area: None,
            visit_count: 0,
            last_seen_at: None,
            active: true,
            doc_updated_at: None,
            created_at: input.created_at,
            updated_at: input.created_at,
        };
        inner
            .patients_by_code
            .insert(patient.tracking_code.as_str().to_string(), patient.id);
        inner.patients.insert(patient.id, patient.clone());
        Ok(patient)
    }

    async fn upsert_patient(&self, input: PatientUpsert) -> Result<PatientWrite> {
        let mut inner = self.inner.write().await;

        // Prefer the doc-id key; fall back to the tracking code so a synced
        // document attaches to a patient that was registered directly.
        let existing_id = inner
            .patients_by_doc
            .get(&input.doc_id)
            .or_else(|| inner.patients_by_code.get(input.tracking_code.as_str()))
            .copied();

        if let Some(id) = existing_id {
            let stored = inner
                .patients
                .get(&id)
                .cloned()
                .ok_or_else(|| StoreError::not_found("Patient", id.to_string()))?;

            if !resolve_write(input.doc_updated_at, stored.doc_updated_at).is_apply() {
                return Ok(PatientWrite::SkippedStale(stored));
            }

            if stored.tracking_code != input.tracking_code {
                warn!(
                    patient_id = %id,
                    stored_code = %stored.tracking_code,
                    incoming_code = %input.tracking_code,
                    "Tracking code is immutable; keeping stored value"
                );
            }

            if stored.doc_id.is_none() {
                inner.patients_by_doc.insert(input.doc_id.clone(), id);
            }
            let patient = inner.patients.get_mut(&id).expect("checked above");
            if patient.doc_id.is_none() {
                patient.doc_id = Some(input.doc_id.clone());
            }
            patient.given_name = input.given_name;
            patient.family_name = input.family_name;
            patient.sex = input.sex;
            patient.date_of_birth = input.date_of_birth;
            patient.phone = input.phone;
            patient.area = input.area;
            patient.doc_updated_at = input.doc_updated_at;
            patient.updated_at = input.observed_at;
            return Ok(PatientWrite::Refreshed(patient.clone()));
        }

        let patient = Patient {
            id: PatientId::new(),
            tracking_code: input.tracking_code.clone(),
            doc_id: Some(input.doc_id.clone()),
            given_name: input.given_name,
            family_name: input.family_name,
            sex: input.sex,
            date_of_birth: input.date_of_birth,
            phone: input.phone,
            area: input.area,
            visit_count: 0,
            last_seen_at: None,
            active: true,
            doc_updated_at: input.doc_updated_at,
            created_at: input.observed_at,
            updated_at: input.observed_at,
        };
        inner
            .patients_by_code
            .insert(patient.tracking_code.as_str().to_string(), patient.id);
        inner.patients_by_doc.insert(input.doc_id, patient.id);
        inner.patients.insert(patient.id, patient.clone());
        Ok(PatientWrite::Created(patient))
    }

    async fn get_patient(&self, id: PatientId) -> Result<Option<Patient>> {
        Ok(self.inner.read().await.patients.get(&id).cloned())
    }

    async fn find_patient_by_code(&self, code: &TrackingCode) -> Result<Option<Patient>> {
        let inner = self.inner.read().await;
        Ok(inner
            .patients_by_code
            .get(code.as_str())
            .and_then(|id| inner.patients.get(id))
            .cloned())
    }

    async fn find_patient_by_doc_id(&self, doc_id: &str) -> Result<Option<Patient>> {
        let inner = self.inner.read().await;
        Ok(inner
            .patients_by_doc
            .get(doc_id)
            .and_then(|id| inner.patients.get(id))
            .cloned())
    }

    async fn record_visit(&self, id: PatientId, seen_at: DateTime<Utc>) -> Result<Patient> {
        let mut inner = self.inner.write().await;
        let patient = inner
            .patients
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Patient", id.to_string()))?;
        patient.visit_count += 1;
        patient.last_seen_at = Some(seen_at);
        patient.updated_at = seen_at;
        Ok(patient.clone())
    }

    async fn deactivate_patient(&self, id: PatientId, at: DateTime<Utc>) -> Result<Patient> {
        let mut inner = self.inner.write().await;
        let patient = inner
            .patients
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Patient", id.to_string()))?;
        patient.active = false;
        patient.updated_at = at;
        Ok(patient.clone())
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn create_session(&self, input: NewSession) -> Result<ClinicalSession> {
        let mut inner = self.inner.write().await;
        let session = ClinicalSession {
            id: SessionId::new(),
            patient_id: input.patient_id,
            doc_id: None,
            stage: input.stage,
            workflow_state: WorkflowState::initial(),
            state_updated_at: input.created_at,
            triage_priority: input.triage_priority,
            chief_complaint: input.chief_complaint,
            notes: None,
            treatment_plan: None,
            doc_created_at: None,
            doc_updated_at: None,
            completed_at: None,
            created_at: input.created_at,
            updated_at: input.created_at,
        };
        inner.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn upsert_session(&self, input: SessionUpsert) -> Result<SessionWrite> {
        let mut inner = self.inner.write().await;

        if let Some(id) = inner.sessions_by_doc.get(&input.doc_id).copied() {
            let stored = inner
                .sessions
                .get(&id)
                .cloned()
                .ok_or_else(|| StoreError::not_found("Session", id.to_string()))?;

            if stored.workflow_state.is_terminal() {
                return Ok(SessionWrite::SkippedClosed(stored));
            }
            if !resolve_write(input.doc_updated_at, stored.doc_updated_at).is_apply() {
                return Ok(SessionWrite::SkippedStale(stored));
            }

            let session = inner.sessions.get_mut(&id).expect("checked above");
            if let Some(stage) = input.stage {
                session.stage = stage;
            }
            session.triage_priority = input.triage_priority;
            session.chief_complaint = input.chief_complaint;
            session.notes = input.notes;
            session.treatment_plan = input.treatment_plan;
            session.doc_created_at = input.doc_created_at;
            session.doc_updated_at = input.doc_updated_at;
            session.updated_at = input.observed_at;
            return Ok(SessionWrite::Refreshed {
                session: session.clone(),
                previous: Box::new(stored),
            });
        }

        let state = input.reported_state.unwrap_or_else(WorkflowState::initial);
        let session = ClinicalSession {
            id: SessionId::new(),
            patient_id: input.patient_id,
            doc_id: Some(input.doc_id.clone()),
            stage: input.stage.unwrap_or(SessionStage::Registration),
            workflow_state: state,
            state_updated_at: input.doc_updated_at.unwrap_or(input.observed_at),
            triage_priority: input.triage_priority,
            chief_complaint: input.chief_complaint,
            notes: input.notes,
            treatment_plan: input.treatment_plan,
            doc_created_at: input.doc_created_at,
            doc_updated_at: input.doc_updated_at,
            completed_at: state
                .is_terminal()
                .then(|| input.doc_updated_at.unwrap_or(input.observed_at)),
            created_at: input.observed_at,
            updated_at: input.observed_at,
        };
        inner.sessions_by_doc.insert(input.doc_id, session.id);
        inner.sessions.insert(session.id, session.clone());
        Ok(SessionWrite::Created(session))
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<ClinicalSession>> {
        Ok(self.inner.read().await.sessions.get(&id).cloned())
    }

    async fn find_session_by_doc_id(&self, doc_id: &str) -> Result<Option<ClinicalSession>> {
        let inner = self.inner.read().await;
        Ok(inner
            .sessions_by_doc
            .get(doc_id)
            .and_then(|id| inner.sessions.get(id))
            .cloned())
    }

    async fn list_sessions_for_patient(
        &self,
        patient_id: PatientId,
    ) -> Result<Vec<ClinicalSession>> {
        let inner = self.inner.read().await;
        let mut sessions: Vec<_> = inner
            .sessions
            .values()
            .filter(|s| s.patient_id == patient_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    async fn apply_transition(&self, write: TransitionWrite) -> Result<AppliedTransition> {
        // The write lock is held across the re-check and both mutations,
        // which is this backend's single transactional boundary.
        let mut inner = self.inner.write().await;

        let session = inner
            .sessions
            .get(&write.session_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("Session", write.session_id.to_string()))?;

        if session.workflow_state != write.expected_from {
            return Err(StoreError::StaleState {
                session_id: write.session_id,
                expected: write.expected_from,
                actual: session.workflow_state,
            });
        }

        // Offline clients can carry skewed clocks; state_updated_at must
        // never decrease for the same session.
        let occurred_at = write.occurred_at.max(session.state_updated_at);

        let transition = StateTransition {
            id: TransitionId::new(),
            session_id: write.session_id,
            from_state: write.expected_from,
            to_state: write.to,
            actor_id: write.actor_id,
            reason: write.reason,
            metadata: write.metadata,
            occurred_at,
        };
        inner.transitions.push(transition.clone());

        let session = inner
            .sessions
            .get_mut(&write.session_id)
            .expect("checked above");
        session.workflow_state = write.to;
        session.state_updated_at = occurred_at;
        session.updated_at = occurred_at;
        if write.to.is_terminal() {
            session.completed_at = Some(occurred_at);
        }

        Ok(AppliedTransition {
            transition,
            session: session.clone(),
        })
    }

    async fn transition_history(&self, session_id: SessionId) -> Result<Vec<StateTransition>> {
        let inner = self.inner.read().await;
        let mut history: Vec<_> = inner
            .transitions
            .iter()
            .filter(|t| t.session_id == session_id)
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal timestamps.
        history.sort_by_key(|t| t.occurred_at);
        Ok(history)
    }
}

#[async_trait]
impl ReferralStore for InMemoryStore {
    async fn create_referral(&self, input: NewReferral) -> Result<Referral> {
        let mut inner = self.inner.write().await;
        let referral = Referral {
            id: ReferralId::new(),
            session_id: input.session_id,
            status: ReferralStatus::Pending,
            priority: input.priority,
            specialty: input.specialty,
            reason: input.reason,
            assigned_to: input.assigned_to,
            created_at: input.created_at,
            updated_at: input.created_at,
        };
        inner.referrals.insert(referral.id, referral.clone());
        Ok(referral)
    }

    async fn get_referral(&self, id: ReferralId) -> Result<Option<Referral>> {
        Ok(self.inner.read().await.referrals.get(&id).cloned())
    }

    async fn find_pending_referral(&self, session_id: SessionId) -> Result<Option<Referral>> {
        let inner = self.inner.read().await;
        Ok(inner
            .referrals
            .values()
            .filter(|r| r.session_id == session_id && r.status == ReferralStatus::Pending)
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn list_referrals_for_session(&self, session_id: SessionId) -> Result<Vec<Referral>> {
        let inner = self.inner.read().await;
        let mut referrals: Vec<_> = inner
            .referrals
            .values()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect();
        referrals.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(referrals)
    }

    async fn set_referral_status(
        &self,
        id: ReferralId,
        status: ReferralStatus,
        at: DateTime<Utc>,
    ) -> Result<Referral> {
        let mut inner = self.inner.write().await;
        let referral = inner
            .referrals
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Referral", id.to_string()))?;
        referral.status = status;
        referral.updated_at = at;
        Ok(referral.clone())
    }
}

#[async_trait]
impl DocumentArchive for InMemoryStore {
    async fn archive_document(&self, doc: ArchivedDocument) -> Result<()> {
        self.inner
            .write()
            .await
            .archive
            .insert(doc.doc_id.clone(), doc);
        Ok(())
    }

    async fn get_document(&self, doc_id: &str) -> Result<Option<ArchivedDocument>> {
        Ok(self.inner.read().await.archive.get(doc_id).cloned())
    }
}

#[async_trait]
impl CheckpointStore for InMemoryStore {
    async fn get_checkpoint(&self, source: &str) -> Result<Option<FeedCheckpoint>> {
        Ok(self.inner.read().await.checkpoints.get(source).cloned())
    }

    async fn save_checkpoint(&self, checkpoint: FeedCheckpoint) -> Result<()> {
        self.inner
            .write()
            .await
            .checkpoints
            .insert(checkpoint.source.clone(), checkpoint);
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for InMemoryStore {
    async fn find_user_by_legacy_id(&self, legacy_id: i64) -> Result<Option<DirectoryUser>> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .iter()
            .find(|u| u.legacy_id == Some(legacy_id))
            .cloned())
    }

    async fn find_user_by_id(&self, id: UserId) -> Result<Option<DirectoryUser>> {
        let inner = self.inner.read().await;
        Ok(inner.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_contact(&self, needle: &str) -> Result<Option<DirectoryUser>> {
        let inner = self.inner.read().await;
        let lowered = needle.to_lowercase();
        Ok(inner
            .users
            .iter()
            .find(|u| {
                u.username.to_lowercase() == lowered
                    || u.email
                        .as_deref()
                        .is_some_and(|e| e.to_lowercase() == lowered)
                    || u.phone.as_deref() == Some(needle)
            })
            .cloned())
    }
}
