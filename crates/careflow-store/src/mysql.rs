//! MySQL store backend.
//!
//! Runtime-checked `sqlx` queries against the relational mirror. Row structs
//! decode the raw columns and are converted to domain records with
//! `parse().unwrap_or(..)` fallbacks for enum columns. Read-modify-write
//! operations take the row lock (`SELECT ... FOR UPDATE`) inside a single
//! transaction, so the last-writer-wins guard and the transition
//! compare-and-set run against the row the transaction holds.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::mysql::MySqlPool;
use uuid::Uuid;

use careflow_core::{
    PatientId, ReferralId, ReferralStatus, SessionId, SessionStage, TrackingCode, TransitionId,
    TriagePriority, UserId, WorkflowState,
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

/// MySQL-backed implementation of every store trait.
#[derive(Debug, Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    /// Create a new store over a connection pool.
    #[must_use]
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Apply the embedded schema migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

const PATIENT_COLUMNS: &str = "id, tracking_code, doc_id, given_name, family_name, sex, \
     date_of_birth, phone, area, visit_count, last_seen_at, active, doc_updated_at, \
     created_at, updated_at";

const SESSION_COLUMNS: &str = "id, patient_id, doc_id, stage, workflow_state, state_updated_at, \
     triage_priority, chief_complaint, notes, treatment_plan, doc_created_at, doc_updated_at, \
     completed_at, created_at, updated_at";

const TRANSITION_COLUMNS: &str =
    "id, session_id, from_state, to_state, actor_id, reason, metadata, occurred_at";

const REFERRAL_COLUMNS: &str =
    "id, session_id, status, priority, specialty, reason, assigned_to, created_at, updated_at";

#[async_trait]
impl PatientStore for MySqlStore {
    async fn create_patient(&self, input: NewPatient) -> Result<Patient> {
        let patient = Patient {
            id: PatientId::new(),
            tracking_code: input.tracking_code,
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
        sqlx::query(
            "INSERT INTO patients (id, tracking_code, doc_id, given_name, family_name, sex, \
             date_of_birth, phone, area, visit_count, last_seen_at, active, doc_updated_at, \
             created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(*patient.id.as_uuid())
        .bind(patient.tracking_code.as_str())
        .bind(&patient.doc_id)
        .bind(&patient.given_name)
        .bind(&patient.family_name)
        .bind(&patient.sex)
        .bind(patient.date_of_birth)
        .bind(&patient.phone)
        .bind(&patient.area)
        .bind(patient.visit_count)
        .bind(patient.last_seen_at)
        .bind(patient.active)
        .bind(patient.doc_updated_at)
        .bind(patient.created_at)
        .bind(patient.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(patient)
    }

    async fn upsert_patient(&self, input: PatientUpsert) -> Result<PatientWrite> {
        let mut tx = self.pool.begin().await?;

        let mut row: Option<PatientRow> = sqlx::query_as(&format!(
            "SELECT {PATIENT_COLUMNS} FROM patients WHERE doc_id = ? FOR UPDATE"
        ))
        .bind(&input.doc_id)
        .fetch_optional(&mut *tx)
        .await?;
        if row.is_none() {
            // A synced document may belong to a patient registered directly.
            row = sqlx::query_as(&format!(
                "SELECT {PATIENT_COLUMNS} FROM patients WHERE tracking_code = ? FOR UPDATE"
            ))
            .bind(input.tracking_code.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        }

        if let Some(row) = row {
            let stored = row.into_patient();
            if !resolve_write(input.doc_updated_at, stored.doc_updated_at).is_apply() {
                return Ok(PatientWrite::SkippedStale(stored));
            }

            let patient = Patient {
                doc_id: stored.doc_id.clone().or(Some(input.doc_id.clone())),
                given_name: input.given_name,
                family_name: input.family_name,
                sex: input.sex,
                date_of_birth: input.date_of_birth,
                phone: input.phone,
                area: input.area,
                doc_updated_at: input.doc_updated_at,
                updated_at: input.observed_at,
                ..stored
            };
            sqlx::query(
                "UPDATE patients SET doc_id = ?, given_name = ?, family_name = ?, sex = ?, \
                 date_of_birth = ?, phone = ?, area = ?, doc_updated_at = ?, updated_at = ? \
                 WHERE id = ?",
            )
            .bind(&patient.doc_id)
            .bind(&patient.given_name)
            .bind(&patient.family_name)
            .bind(&patient.sex)
            .bind(patient.date_of_birth)
            .bind(&patient.phone)
            .bind(&patient.area)
            .bind(patient.doc_updated_at)
            .bind(patient.updated_at)
            .bind(*patient.id.as_uuid())
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            return Ok(PatientWrite::Refreshed(patient));
        }

        let patient = Patient {
            id: PatientId::new(),
            tracking_code: input.tracking_code,
            doc_id: Some(input.doc_id),
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
        sqlx::query(
            "INSERT INTO patients (id, tracking_code, doc_id, given_name, family_name, sex, \
             date_of_birth, phone, area, visit_count, last_seen_at, active, doc_updated_at, \
             created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(*patient.id.as_uuid())
        .bind(patient.tracking_code.as_str())
        .bind(&patient.doc_id)
        .bind(&patient.given_name)
        .bind(&patient.family_name)
        .bind(&patient.sex)
        .bind(patient.date_of_birth)
        .bind(&patient.phone)
        .bind(&patient.area)
        .bind(patient.visit_count)
        .bind(patient.last_seen_at)
        .bind(patient.active)
        .bind(patient.doc_updated_at)
        .bind(patient.created_at)
        .bind(patient.updated_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(PatientWrite::Created(patient))
    }

    async fn get_patient(&self, id: PatientId) -> Result<Option<Patient>> {
        let row: Option<PatientRow> = sqlx::query_as(&format!(
            "SELECT {PATIENT_COLUMNS} FROM patients WHERE id = ?"
        ))
        .bind(*id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(PatientRow::into_patient))
    }

    async fn find_patient_by_code(&self, code: &TrackingCode) -> Result<Option<Patient>> {
        let row: Option<PatientRow> = sqlx::query_as(&format!(
            "SELECT {PATIENT_COLUMNS} FROM patients WHERE tracking_code = ?"
        ))
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(PatientRow::into_patient))
    }

    async fn find_patient_by_doc_id(&self, doc_id: &str) -> Result<Option<Patient>> {
        let row: Option<PatientRow> = sqlx::query_as(&format!(
            "SELECT {PATIENT_COLUMNS} FROM patients WHERE doc_id = ?"
        ))
        .bind(doc_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(PatientRow::into_patient))
    }

    async fn record_visit(&self, id: PatientId, seen_at: DateTime<Utc>) -> Result<Patient> {
        let result = sqlx::query(
            "UPDATE patients SET visit_count = visit_count + 1, last_seen_at = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(seen_at)
        .bind(seen_at)
        .bind(*id.as_uuid())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Patient", id.to_string()));
        }
        self.get_patient(id)
            .await?
            .ok_or_else(|| StoreError::not_found("Patient", id.to_string()))
    }

    async fn deactivate_patient(&self, id: PatientId, at: DateTime<Utc>) -> Result<Patient> {
        let result = sqlx::query("UPDATE patients SET active = FALSE, updated_at = ? WHERE id = ?")
            .bind(at)
            .bind(*id.as_uuid())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Patient", id.to_string()));
        }
        self.get_patient(id)
            .await?
            .ok_or_else(|| StoreError::not_found("Patient", id.to_string()))
    }
}

#[async_trait]
impl SessionStore for MySqlStore {
    async fn create_session(&self, input: NewSession) -> Result<ClinicalSession> {
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
        insert_session(&self.pool, &session).await?;
        Ok(session)
    }

    async fn upsert_session(&self, input: SessionUpsert) -> Result<SessionWrite> {
        let mut tx = self.pool.begin().await?;

        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM clinical_sessions WHERE doc_id = ? FOR UPDATE"
        ))
        .bind(&input.doc_id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(row) = row {
            let stored = row.into_session();
            if stored.workflow_state.is_terminal() {
                return Ok(SessionWrite::SkippedClosed(stored));
            }
            if !resolve_write(input.doc_updated_at, stored.doc_updated_at).is_apply() {
                return Ok(SessionWrite::SkippedStale(stored));
            }

            let session = ClinicalSession {
                stage: input.stage.unwrap_or(stored.stage),
                triage_priority: input.triage_priority,
                chief_complaint: input.chief_complaint,
                notes: input.notes,
                treatment_plan: input.treatment_plan,
                doc_created_at: input.doc_created_at,
                doc_updated_at: input.doc_updated_at,
                updated_at: input.observed_at,
                ..stored.clone()
            };
            sqlx::query(
                "UPDATE clinical_sessions SET stage = ?, triage_priority = ?, \
                 chief_complaint = ?, notes = ?, treatment_plan = ?, doc_created_at = ?, \
                 doc_updated_at = ?, updated_at = ? WHERE id = ?",
            )
            .bind(session.stage.as_str())
            .bind(session.triage_priority.as_str())
            .bind(&session.chief_complaint)
            .bind(&session.notes)
            .bind(&session.treatment_plan)
            .bind(session.doc_created_at)
            .bind(session.doc_updated_at)
            .bind(session.updated_at)
            .bind(*session.id.as_uuid())
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            return Ok(SessionWrite::Refreshed {
                session,
                previous: Box::new(stored),
            });
        }

        let state = input.reported_state.unwrap_or_else(WorkflowState::initial);
        let session = ClinicalSession {
            id: SessionId::new(),
            patient_id: input.patient_id,
            doc_id: Some(input.doc_id),
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
        insert_session(&mut *tx, &session).await?;
        tx.commit().await?;
        Ok(SessionWrite::Created(session))
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<ClinicalSession>> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM clinical_sessions WHERE id = ?"
        ))
        .bind(*id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(SessionRow::into_session))
    }

    async fn find_session_by_doc_id(&self, doc_id: &str) -> Result<Option<ClinicalSession>> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM clinical_sessions WHERE doc_id = ?"
        ))
        .bind(doc_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(SessionRow::into_session))
    }

    async fn list_sessions_for_patient(
        &self,
        patient_id: PatientId,
    ) -> Result<Vec<ClinicalSession>> {
        let rows: Vec<SessionRow> = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM clinical_sessions WHERE patient_id = ? \
             ORDER BY created_at DESC"
        ))
        .bind(*patient_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SessionRow::into_session).collect())
    }

    async fn apply_transition(&self, write: TransitionWrite) -> Result<AppliedTransition> {
        // Lock the session row; the compare-and-set below runs against the
        // state the lock guarantees, and both writes commit or neither does.
        let mut tx = self.pool.begin().await?;

        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM clinical_sessions WHERE id = ? FOR UPDATE"
        ))
        .bind(*write.session_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;
        let stored = row
            .map(SessionRow::into_session)
            .ok_or_else(|| StoreError::not_found("Session", write.session_id.to_string()))?;

        if stored.workflow_state != write.expected_from {
            return Err(StoreError::StaleState {
                session_id: write.session_id,
                expected: write.expected_from,
                actual: stored.workflow_state,
            });
        }

        // state_updated_at never decreases, whatever the caller's clock says.
        let occurred_at = write.occurred_at.max(stored.state_updated_at);
        let completed_at = if write.to.is_terminal() {
            Some(occurred_at)
        } else {
            stored.completed_at
        };

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
        sqlx::query(
            "INSERT INTO state_transitions (id, session_id, from_state, to_state, actor_id, \
             reason, metadata, occurred_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(*transition.id.as_uuid())
        .bind(*transition.session_id.as_uuid())
        .bind(transition.from_state.as_str())
        .bind(transition.to_state.as_str())
        .bind(transition.actor_id.map(|a| *a.as_uuid()))
        .bind(&transition.reason)
        .bind(&transition.metadata)
        .bind(transition.occurred_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE clinical_sessions SET workflow_state = ?, state_updated_at = ?, \
             completed_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(write.to.as_str())
        .bind(occurred_at)
        .bind(completed_at)
        .bind(occurred_at)
        .bind(*write.session_id.as_uuid())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let session = ClinicalSession {
            workflow_state: write.to,
            state_updated_at: occurred_at,
            completed_at,
            updated_at: occurred_at,
            ..stored
        };
        Ok(AppliedTransition {
            transition,
            session,
        })
    }

    async fn transition_history(&self, session_id: SessionId) -> Result<Vec<StateTransition>> {
        let rows: Vec<TransitionRow> = sqlx::query_as(&format!(
            "SELECT {TRANSITION_COLUMNS} FROM state_transitions WHERE session_id = ? \
             ORDER BY occurred_at ASC, seq ASC"
        ))
        .bind(*session_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(TransitionRow::into_transition).collect())
    }
}

#[async_trait]
impl ReferralStore for MySqlStore {
    async fn create_referral(&self, input: NewReferral) -> Result<Referral> {
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
        sqlx::query(
            "INSERT INTO referrals (id, session_id, status, priority, specialty, reason, \
             assigned_to, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(*referral.id.as_uuid())
        .bind(*referral.session_id.as_uuid())
        .bind(referral.status.as_str())
        .bind(referral.priority.as_str())
        .bind(&referral.specialty)
        .bind(&referral.reason)
        .bind(referral.assigned_to.map(|a| *a.as_uuid()))
        .bind(referral.created_at)
        .bind(referral.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(referral)
    }

    async fn get_referral(&self, id: ReferralId) -> Result<Option<Referral>> {
        let row: Option<ReferralRow> = sqlx::query_as(&format!(
            "SELECT {REFERRAL_COLUMNS} FROM referrals WHERE id = ?"
        ))
        .bind(*id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ReferralRow::into_referral))
    }

    async fn find_pending_referral(&self, session_id: SessionId) -> Result<Option<Referral>> {
        let row: Option<ReferralRow> = sqlx::query_as(&format!(
            "SELECT {REFERRAL_COLUMNS} FROM referrals WHERE session_id = ? AND status = 'pending' \
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(*session_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ReferralRow::into_referral))
    }

    async fn list_referrals_for_session(&self, session_id: SessionId) -> Result<Vec<Referral>> {
        let rows: Vec<ReferralRow> = sqlx::query_as(&format!(
            "SELECT {REFERRAL_COLUMNS} FROM referrals WHERE session_id = ? \
             ORDER BY created_at DESC"
        ))
        .bind(*session_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ReferralRow::into_referral).collect())
    }

    async fn set_referral_status(
        &self,
        id: ReferralId,
        status: ReferralStatus,
        at: DateTime<Utc>,
    ) -> Result<Referral> {
        let result = sqlx::query("UPDATE referrals SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(at)
            .bind(*id.as_uuid())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Referral", id.to_string()));
        }
        self.get_referral(id)
            .await?
            .ok_or_else(|| StoreError::not_found("Referral", id.to_string()))
    }
}

#[async_trait]
impl DocumentArchive for MySqlStore {
    async fn archive_document(&self, doc: ArchivedDocument) -> Result<()> {
        sqlx::query(
            "INSERT INTO document_archive (doc_id, kind, patient_ref, title, encrypted, body, \
             doc_updated_at, received_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             ON DUPLICATE KEY UPDATE kind = VALUES(kind), patient_ref = VALUES(patient_ref), \
             title = VALUES(title), encrypted = VALUES(encrypted), body = VALUES(body), \
             doc_updated_at = VALUES(doc_updated_at), received_at = VALUES(received_at)",
        )
        .bind(&doc.doc_id)
        .bind(&doc.kind)
        .bind(doc.patient_ref.as_ref().map(TrackingCode::as_str))
        .bind(&doc.title)
        .bind(doc.encrypted)
        .bind(&doc.body)
        .bind(doc.doc_updated_at)
        .bind(doc.received_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_document(&self, doc_id: &str) -> Result<Option<ArchivedDocument>> {
        let row: Option<ArchiveRow> = sqlx::query_as(
            "SELECT doc_id, kind, patient_ref, title, encrypted, body, doc_updated_at, \
             received_at FROM document_archive WHERE doc_id = ?",
        )
        .bind(doc_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ArchiveRow::into_document))
    }
}

#[async_trait]
impl CheckpointStore for MySqlStore {
    async fn get_checkpoint(&self, source: &str) -> Result<Option<FeedCheckpoint>> {
        let row: Option<(String, String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT source, position, updated_at FROM feed_checkpoints WHERE source = ?",
        )
        .bind(source)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(source, position, updated_at)| FeedCheckpoint {
            source,
            position,
            updated_at,
        }))
    }

    async fn save_checkpoint(&self, checkpoint: FeedCheckpoint) -> Result<()> {
        sqlx::query(
            "INSERT INTO feed_checkpoints (source, position, updated_at) VALUES (?, ?, ?) \
             ON DUPLICATE KEY UPDATE position = VALUES(position), updated_at = VALUES(updated_at)",
        )
        .bind(&checkpoint.source)
        .bind(&checkpoint.position)
        .bind(checkpoint.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for MySqlStore {
    async fn find_user_by_legacy_id(&self, legacy_id: i64) -> Result<Option<DirectoryUser>> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, legacy_id, username, email, phone, active FROM directory_users \
             WHERE legacy_id = ?",
        )
        .bind(legacy_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(UserRow::into_user))
    }

    async fn find_user_by_id(&self, id: UserId) -> Result<Option<DirectoryUser>> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, legacy_id, username, email, phone, active FROM directory_users \
             WHERE id = ?",
        )
        .bind(*id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(UserRow::into_user))
    }

    async fn find_user_by_contact(&self, needle: &str) -> Result<Option<DirectoryUser>> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, legacy_id, username, email, phone, active FROM directory_users \
             WHERE LOWER(username) = LOWER(?) OR LOWER(email) = LOWER(?) OR phone = ? \
             LIMIT 1",
        )
        .bind(needle)
        .bind(needle)
        .bind(needle)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(UserRow::into_user))
    }
}

async fn insert_session<'e, E>(executor: E, session: &ClinicalSession) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::MySql>,
{
    sqlx::query(
        "INSERT INTO clinical_sessions (id, patient_id, doc_id, stage, workflow_state, \
         state_updated_at, triage_priority, chief_complaint, notes, treatment_plan, \
         doc_created_at, doc_updated_at, completed_at, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(*session.id.as_uuid())
    .bind(*session.patient_id.as_uuid())
    .bind(&session.doc_id)
    .bind(session.stage.as_str())
    .bind(session.workflow_state.as_str())
    .bind(session.state_updated_at)
    .bind(session.triage_priority.as_str())
    .bind(&session.chief_complaint)
    .bind(&session.notes)
    .bind(&session.treatment_plan)
    .bind(session.doc_created_at)
    .bind(session.doc_updated_at)
    .bind(session.completed_at)
    .bind(session.created_at)
    .bind(session.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}

/// Database row for a patient.
#[derive(Debug, sqlx::FromRow)]
struct PatientRow {
    id: Uuid,
    tracking_code: String,
    doc_id: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
    sex: Option<String>,
    date_of_birth: Option<NaiveDate>,
    phone: Option<String>,
    area: Option<String>,
    visit_count: i64,
    last_seen_at: Option<DateTime<Utc>>,
    active: bool,
    doc_updated_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PatientRow {
    fn into_patient(self) -> Patient {
        Patient {
            id: PatientId::from_uuid(self.id),
            tracking_code: TrackingCode::new(self.tracking_code),
            doc_id: self.doc_id,
            given_name: self.given_name,
            family_name: self.family_name,
            sex: self.sex,
            date_of_birth: self.date_of_birth,
            phone: self.phone,
            area: self.area,
            visit_count: self.visit_count,
            last_seen_at: self.last_seen_at,
            active: self.active,
            doc_updated_at: self.doc_updated_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Database row for a clinical session.
#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    patient_id: Uuid,
    doc_id: Option<String>,
    stage: String,
    workflow_state: String,
    state_updated_at: DateTime<Utc>,
    triage_priority: String,
    chief_complaint: Option<String>,
    notes: Option<String>,
    treatment_plan: Option<serde_json::Value>,
    doc_created_at: Option<DateTime<Utc>>,
    doc_updated_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SessionRow {
    fn into_session(self) -> ClinicalSession {
        ClinicalSession {
            id: SessionId::from_uuid(self.id),
            patient_id: PatientId::from_uuid(self.patient_id),
            doc_id: self.doc_id,
            stage: self.stage.parse().unwrap_or(SessionStage::Registration),
            workflow_state: self
                .workflow_state
                .parse()
                .unwrap_or_else(|_| WorkflowState::initial()),
            state_updated_at: self.state_updated_at,
            triage_priority: self
                .triage_priority
                .parse()
                .unwrap_or(TriagePriority::Unknown),
            chief_complaint: self.chief_complaint,
            notes: self.notes,
            treatment_plan: self.treatment_plan,
            doc_created_at: self.doc_created_at,
            doc_updated_at: self.doc_updated_at,
            completed_at: self.completed_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Database row for a state transition.
#[derive(Debug, sqlx::FromRow)]
struct TransitionRow {
    id: Uuid,
    session_id: Uuid,
    from_state: String,
    to_state: String,
    actor_id: Option<Uuid>,
    reason: Option<String>,
    metadata: Option<serde_json::Value>,
    occurred_at: DateTime<Utc>,
}

impl TransitionRow {
    fn into_transition(self) -> StateTransition {
        StateTransition {
            id: TransitionId::from_uuid(self.id),
            session_id: SessionId::from_uuid(self.session_id),
            from_state: self
                .from_state
                .parse()
                .unwrap_or_else(|_| WorkflowState::initial()),
            to_state: self
                .to_state
                .parse()
                .unwrap_or_else(|_| WorkflowState::initial()),
            actor_id: self.actor_id.map(UserId::from_uuid),
            reason: self.reason,
            metadata: self.metadata,
            occurred_at: self.occurred_at,
        }
    }
}

/// Database row for a referral.
#[derive(Debug, sqlx::FromRow)]
struct ReferralRow {
    id: Uuid,
    session_id: Uuid,
    status: String,
    priority: String,
    specialty: Option<String>,
    reason: Option<String>,
    assigned_to: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ReferralRow {
    fn into_referral(self) -> Referral {
        Referral {
            id: ReferralId::from_uuid(self.id),
            session_id: SessionId::from_uuid(self.session_id),
            status: self.status.parse().unwrap_or(ReferralStatus::Pending),
            priority: self.priority.parse().unwrap_or(TriagePriority::Unknown),
            specialty: self.specialty,
            reason: self.reason,
            assigned_to: self.assigned_to.map(UserId::from_uuid),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Database row for an archived document.
#[derive(Debug, sqlx::FromRow)]
struct ArchiveRow {
    doc_id: String,
    kind: Option<String>,
    patient_ref: Option<String>,
    title: Option<String>,
    encrypted: bool,
    body: serde_json::Value,
    doc_updated_at: Option<DateTime<Utc>>,
    received_at: DateTime<Utc>,
}

impl ArchiveRow {
    fn into_document(self) -> ArchivedDocument {
        ArchivedDocument {
            doc_id: self.doc_id,
            kind: self.kind,
            patient_ref: self.patient_ref.map(TrackingCode::new),
            title: self.title,
            encrypted: self.encrypted,
            body: self.body,
            doc_updated_at: self.doc_updated_at,
            received_at: self.received_at,
        }
    }
}

/// Database row for a directory user.
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    legacy_id: Option<i64>,
    username: String,
    email: Option<String>,
    phone: Option<String>,
    active: bool,
}

impl UserRow {
    fn into_user(self) -> DirectoryUser {
        DirectoryUser {
            id: UserId::from_uuid(self.id),
            legacy_id: self.legacy_id,
            username: self.username,
            email: self.email,
            phone: self.phone,
            active: self.active,
        }
    }
}
