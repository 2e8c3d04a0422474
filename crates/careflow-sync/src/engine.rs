//! The synchronization engine.
//!
//! One-way change ingestion from the offline-capable document store into
//! the relational mirror. Each document is dispatched by kind to its upsert
//! routine; failures are isolated per document so one malformed document
//! never blocks the rest of a batch.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use careflow_core::{Clock, UserId, WorkflowState};
use careflow_store::{
    ArchivedDocument, CheckpointStore, DocumentArchive, NewPatient, NewReferral, PatientStore,
    PatientUpsert, PatientWrite, Referral, ReferralStore, SessionStore, SessionUpsert,
    SessionWrite, UserDirectory,
};

use crate::checkpoint::CheckpointManager;
use crate::config::SyncConfig;
use crate::conflict::resolve_for_kind;
use crate::document::{DocumentKind, RawDocument};
use crate::error::{SyncError, SyncResult};
use crate::fields::{
    map_ai_log, map_form, map_imaging, map_patient, map_report, map_session, AttachmentFields,
};
use crate::identity::IdentityResolver;

/// One page of the change feed: the documents plus the feed position they
/// end at.
#[derive(Debug, Clone)]
pub struct FeedPage {
    /// The raw documents, in feed order.
    pub docs: Vec<Value>,
    /// The feed position after this page, used to advance the checkpoint.
    pub last_seq: Option<String>,
}

/// How a single document came out of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Mapped and persisted.
    Applied,
    /// Skippable data: logged and passed over.
    Skipped,
    /// Mapping or persistence failed.
    Failed,
}

/// Result of processing a single document.
#[derive(Debug, Clone)]
pub struct ProcessedDocument {
    /// Document identifier, when one could be read.
    pub doc_id: Option<String>,
    /// Parsed kind, when the discriminant was recognised.
    pub kind: Option<DocumentKind>,
    /// Outcome.
    pub status: DocumentStatus,
    /// Outcome detail (skip reason or error message).
    pub detail: Option<String>,
}

impl ProcessedDocument {
    /// Create an applied result.
    #[must_use]
    pub fn applied(doc_id: impl Into<String>, kind: Option<DocumentKind>) -> Self {
        Self {
            doc_id: Some(doc_id.into()),
            kind,
            status: DocumentStatus::Applied,
            detail: None,
        }
    }

    /// Create a skipped result.
    #[must_use]
    pub fn skipped(
        doc_id: Option<String>,
        kind: Option<DocumentKind>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            doc_id,
            kind,
            status: DocumentStatus::Skipped,
            detail: Some(detail.into()),
        }
    }

    /// Create a failed result.
    #[must_use]
    pub fn failed(
        doc_id: Option<String>,
        kind: Option<DocumentKind>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            doc_id,
            kind,
            status: DocumentStatus::Failed,
            detail: Some(detail.into()),
        }
    }

    /// Attach a detail message.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Summary of one batch run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Documents seen.
    pub processed: usize,
    /// Documents mapped and persisted. This is the applied-count contract:
    /// `applied = processed - (skipped + failed)`.
    pub applied: usize,
    /// Skippable documents passed over.
    pub skipped: usize,
    /// Documents that errored.
    pub failed: usize,
}

impl BatchSummary {
    /// Create an empty summary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a processed document to the tally.
    pub fn add(&mut self, result: &ProcessedDocument) {
        self.processed += 1;
        match result.status {
            DocumentStatus::Applied => self.applied += 1,
            DocumentStatus::Skipped => self.skipped += 1,
            DocumentStatus::Failed => self.failed += 1,
        }
    }
}

/// The sync engine.
///
/// Holds no state beyond its store seams; instances are cheap and safe to
/// run concurrently against the same store.
pub struct SyncEngine {
    patients: Arc<dyn PatientStore>,
    sessions: Arc<dyn SessionStore>,
    referrals: Arc<dyn ReferralStore>,
    archive: Arc<dyn DocumentArchive>,
    checkpoints: CheckpointManager,
    identity: IdentityResolver,
    clock: Arc<dyn Clock>,
    config: SyncConfig,
}

impl SyncEngine {
    /// Create an engine over a single store backend that implements every
    /// store trait (both shipped backends do).
    pub fn new<S>(store: Arc<S>, clock: Arc<dyn Clock>, config: SyncConfig) -> Self
    where
        S: PatientStore
            + SessionStore
            + ReferralStore
            + DocumentArchive
            + CheckpointStore
            + UserDirectory
            + 'static,
    {
        Self::with_parts(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store,
            clock,
            config,
        )
    }

    /// Create an engine with each seam injected separately.
    #[allow(clippy::too_many_arguments)]
    pub fn with_parts(
        patients: Arc<dyn PatientStore>,
        sessions: Arc<dyn SessionStore>,
        referrals: Arc<dyn ReferralStore>,
        archive: Arc<dyn DocumentArchive>,
        checkpoints: Arc<dyn CheckpointStore>,
        directory: Arc<dyn UserDirectory>,
        clock: Arc<dyn Clock>,
        config: SyncConfig,
    ) -> Self {
        Self {
            patients,
            sessions,
            referrals,
            archive,
            checkpoints: CheckpointManager::new(checkpoints),
            identity: IdentityResolver::new(directory),
            clock,
            config,
        }
    }

    /// The feed position to resume from.
    pub async fn resume_position(&self) -> SyncResult<Option<String>> {
        self.checkpoints.position(&self.config.source).await
    }

    /// Process one page of the change feed, then advance the checkpoint.
    ///
    /// The checkpoint only moves after every document in the page has been
    /// individually committed or skipped-and-logged.
    pub async fn process_feed_page(&self, page: FeedPage) -> SyncResult<BatchSummary> {
        let summary = self.process_batch(&page.docs).await;
        if let Some(last_seq) = page.last_seq {
            self.checkpoints
                .advance(&self.config.source, last_seq, self.clock.now())
                .await?;
        }
        Ok(summary)
    }

    /// Process a batch of raw documents.
    ///
    /// Never errors: per-document failures are caught, logged with the
    /// document identifier and kind, and tallied.
    #[instrument(skip(self, docs), fields(source = %self.config.source, count = docs.len()))]
    pub async fn process_batch(&self, docs: &[Value]) -> BatchSummary {
        let mut summary = BatchSummary::new();
        for doc in docs {
            let result = match self.upsert(doc).await {
                Ok(processed) => processed,
                Err(error) if error.is_skippable() => {
                    warn!(%error, "Skipping document");
                    skipped_from_error(&error)
                }
                Err(error) => {
                    let (doc_id, kind) = doc_identity(doc);
                    warn!(
                        doc_id = doc_id.as_deref().unwrap_or("?"),
                        kind = ?kind,
                        %error,
                        "Failed to sync document"
                    );
                    ProcessedDocument::failed(doc_id, kind, error.to_string())
                }
            };
            summary.add(&result);
        }
        info!(
            applied = summary.applied,
            skipped = summary.skipped,
            failed = summary.failed,
            "Batch processed"
        );
        summary
    }

    /// Upsert a single raw document.
    ///
    /// Skippable conditions (stale writes, closed sessions) come back as
    /// [`DocumentStatus::Skipped`] results; malformed-but-identifiable data
    /// and persistence failures surface as errors for the batch loop to
    /// isolate.
    pub async fn upsert(&self, value: &Value) -> SyncResult<ProcessedDocument> {
        let doc = RawDocument::new(value)?;
        let doc_id = doc.id().ok_or(SyncError::MissingId)?;

        // Encrypted payloads: persist the identifier and a metadata stub,
        // keep the raw body verbatim for later reprocessing, and interpret
        // nothing else.
        if doc.is_encrypted() {
            self.archive
                .archive_document(ArchivedDocument {
                    doc_id: doc_id.clone(),
                    kind: doc.kind_raw(),
                    patient_ref: None,
                    title: None,
                    encrypted: true,
                    body: doc.to_value(),
                    doc_updated_at: doc.updated_at(),
                    received_at: self.clock.now(),
                })
                .await?;
            info!(doc_id = %doc_id, "Encrypted document archived as stub");
            return Ok(ProcessedDocument::applied(doc_id, None).with_detail("encrypted stub"));
        }

        let kind_raw = doc.kind_raw().ok_or_else(|| SyncError::MissingKind {
            doc_id: doc_id.clone(),
        })?;
        let kind: DocumentKind = kind_raw.parse().map_err(|_| SyncError::UnknownKind {
            doc_id: doc_id.clone(),
            kind: kind_raw,
        })?;

        match kind {
            DocumentKind::Patient => self.upsert_patient_doc(&doc).await,
            DocumentKind::Session => self.upsert_session_doc(&doc).await,
            DocumentKind::Form => self.archive_doc(kind, &doc, map_form(&doc)?).await,
            DocumentKind::AiLog => self.archive_doc(kind, &doc, map_ai_log(&doc)?).await,
            DocumentKind::Report => self.archive_doc(kind, &doc, map_report(&doc)?).await,
            DocumentKind::ImagingStudy => self.archive_doc(kind, &doc, map_imaging(&doc)?).await,
        }
    }

    async fn upsert_patient_doc(&self, doc: &RawDocument) -> SyncResult<ProcessedDocument> {
        let fields = map_patient(doc)?;
        let doc_id = fields.doc_id.clone();
        let write = self
            .patients
            .upsert_patient(PatientUpsert {
                doc_id: fields.doc_id,
                tracking_code: fields.tracking_code,
                given_name: fields.given_name,
                family_name: fields.family_name,
                sex: fields.sex,
                date_of_birth: fields.date_of_birth,
                phone: fields.phone,
                area: fields.area,
                doc_updated_at: fields.doc_updated_at,
                observed_at: self.clock.now(),
            })
            .await?;

        match write {
            PatientWrite::SkippedStale(stored) => {
                info!(
                    doc_id = %doc_id,
                    stored_updated_at = ?stored.doc_updated_at,
                    "Stale patient write discarded"
                );
                Ok(ProcessedDocument::skipped(
                    Some(doc_id),
                    Some(DocumentKind::Patient),
                    "stale write",
                ))
            }
            PatientWrite::Created(_) | PatientWrite::Refreshed(_) => Ok(
                ProcessedDocument::applied(doc_id, Some(DocumentKind::Patient)),
            ),
        }
    }

    async fn upsert_session_doc(&self, doc: &RawDocument) -> SyncResult<ProcessedDocument> {
        let fields = map_session(doc)?;
        let doc_id = fields.doc_id.clone();
        let now = self.clock.now();

        // Out-of-order delivery: the session may arrive before its patient
        // document. Create a minimal patient from the tracking code; the
        // patient document fills in demographics when it lands.
        let patient = match self.patients.find_patient_by_code(&fields.patient_ref).await? {
            Some(patient) => patient,
            None => {
                info!(
                    tracking_code = %fields.patient_ref,
                    doc_id = %doc_id,
                    "Session references unseen patient; creating placeholder"
                );
                self.patients
                    .create_patient(NewPatient {
                        tracking_code: fields.patient_ref.clone(),
                        given_name: None,
                        family_name: None,
                        created_at: now,
                    })
                    .await?
            }
        };

        let actor = self.identity.resolve_opt(fields.actor_raw.as_deref()).await;

        let write = self
            .sessions
            .upsert_session(SessionUpsert {
                doc_id: fields.doc_id,
                patient_id: patient.id,
                stage: fields.stage,
                reported_state: fields.reported_state,
                triage_priority: fields.triage_priority,
                chief_complaint: fields.chief_complaint,
                notes: fields.notes,
                treatment_plan: fields.treatment_plan,
                doc_created_at: fields.doc_created_at,
                doc_updated_at: fields.doc_updated_at,
                observed_at: now,
            })
            .await?;

        match &write {
            SessionWrite::SkippedStale(stored) => {
                info!(
                    doc_id = %doc_id,
                    stored_updated_at = ?stored.doc_updated_at,
                    "Stale session write discarded"
                );
                Ok(ProcessedDocument::skipped(
                    Some(doc_id),
                    Some(DocumentKind::Session),
                    "stale write",
                ))
            }
            SessionWrite::SkippedClosed(_) => {
                info!(doc_id = %doc_id, "Closed session is immutable to sync");
                Ok(ProcessedDocument::skipped(
                    Some(doc_id),
                    Some(DocumentKind::Session),
                    "session closed",
                ))
            }
            SessionWrite::Created(_) => {
                self.patients.record_visit(patient.id, now).await?;
                self.maybe_auto_refer(&write, actor, now).await?;
                Ok(ProcessedDocument::applied(
                    doc_id,
                    Some(DocumentKind::Session),
                ))
            }
            SessionWrite::Refreshed { .. } => {
                self.maybe_auto_refer(&write, actor, now).await?;
                Ok(ProcessedDocument::applied(
                    doc_id,
                    Some(DocumentKind::Session),
                ))
            }
        }
    }

    /// The only cross-entity side effect in the engine: create a referral
    /// for a session that first reports the referred state, or is newly
    /// discovered at critical triage. Both triggers are policy-gated.
    pub async fn maybe_auto_refer(
        &self,
        write: &SessionWrite,
        assigned_to: Option<UserId>,
        at: DateTime<Utc>,
    ) -> SyncResult<Option<Referral>> {
        let (session, trigger) = match write {
            SessionWrite::Created(session) => {
                if self.config.auto_referral_on_reported_state
                    && session.workflow_state == WorkflowState::Referred
                {
                    (session, "sync_reported_referral")
                } else if self.config.auto_referral_on_critical_triage
                    && session.triage_priority.is_critical()
                {
                    (session, "critical_triage")
                } else {
                    return Ok(None);
                }
            }
            SessionWrite::Refreshed { session, previous } => {
                if self.config.auto_referral_on_critical_triage
                    && session.triage_priority.is_critical()
                    && !previous.triage_priority.is_critical()
                {
                    (session, "critical_triage")
                } else {
                    return Ok(None);
                }
            }
            SessionWrite::SkippedStale(_) | SessionWrite::SkippedClosed(_) => return Ok(None),
        };

        if self
            .referrals
            .find_pending_referral(session.id)
            .await?
            .is_some()
        {
            return Ok(None);
        }

        let referral = self
            .referrals
            .create_referral(NewReferral {
                session_id: session.id,
                priority: session.triage_priority,
                specialty: None,
                reason: Some(trigger.to_string()),
                assigned_to,
                created_at: at,
            })
            .await?;
        info!(
            session_id = %session.id,
            referral_id = %referral.id,
            trigger = trigger,
            "Referral auto-created from sync"
        );
        Ok(Some(referral))
    }

    async fn archive_doc(
        &self,
        kind: DocumentKind,
        doc: &RawDocument,
        fields: AttachmentFields,
    ) -> SyncResult<ProcessedDocument> {
        let stored = self.archive.get_document(&fields.doc_id).await?;
        let decision = resolve_for_kind(
            kind,
            fields.doc_updated_at,
            stored.and_then(|d| d.doc_updated_at),
        );
        if !decision.is_apply() {
            info!(doc_id = %fields.doc_id, kind = %kind, "Stale document discarded");
            return Ok(ProcessedDocument::skipped(
                Some(fields.doc_id),
                Some(kind),
                "stale write",
            ));
        }

        let doc_id = fields.doc_id.clone();
        self.archive
            .archive_document(ArchivedDocument {
                doc_id: fields.doc_id,
                kind: Some(kind.as_str().to_string()),
                patient_ref: fields.patient_ref,
                title: fields.title,
                encrypted: false,
                body: doc.to_value(),
                doc_updated_at: fields.doc_updated_at,
                received_at: self.clock.now(),
            })
            .await?;
        Ok(ProcessedDocument::applied(doc_id, Some(kind)))
    }
}

fn skipped_from_error(error: &SyncError) -> ProcessedDocument {
    let doc_id = match error {
        SyncError::MissingKind { doc_id } | SyncError::UnknownKind { doc_id, .. } => {
            Some(doc_id.clone())
        }
        _ => None,
    };
    ProcessedDocument::skipped(doc_id, None, error.to_string())
}

fn doc_identity(value: &Value) -> (Option<String>, Option<DocumentKind>) {
    match RawDocument::new(value) {
        Ok(doc) => (doc.id(), doc.kind()),
        Err(_) => (None, None),
    }
}
