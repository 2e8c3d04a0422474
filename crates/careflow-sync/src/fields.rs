//! Per-kind field mapping.
//!
//! Pure functions from a [`RawDocument`] to the canonical record for its
//! kind. Producer field names have drifted across versions, so every
//! logical field carries the full list of historically-seen aliases.
//!
//! Alias order is a contract: the first non-null match wins, and changing
//! the order changes which of two conflicting fields wins. Do not reorder.

use chrono::{DateTime, NaiveDate, Utc};

use careflow_core::{SessionStage, TrackingCode, TriagePriority, WorkflowState};

use crate::document::RawDocument;
use crate::error::{SyncError, SyncResult};

/// Patient reference carried by non-patient documents.
pub const PATIENT_REF_ALIASES: &[&str] =
    &["patientCpt", "patient_id", "patientId", "patient_code", "cpt"];

/// The patient document's own tracking code.
pub const TRACKING_CODE_ALIASES: &[&str] =
    &["trackingCode", "tracking_code", "patientCpt", "cpt", "patient_id"];

const GIVEN_NAME_ALIASES: &[&str] = &["first_name", "firstName", "given_name"];
const FAMILY_NAME_ALIASES: &[&str] = &["last_name", "lastName", "family_name", "surname"];
const SEX_ALIASES: &[&str] = &["sex", "gender"];
const DATE_OF_BIRTH_ALIASES: &[&str] = &["date_of_birth", "dob", "birth_date"];
const PHONE_ALIASES: &[&str] = &["phone", "phone_number", "contact_phone"];
const AREA_ALIASES: &[&str] = &["area", "village", "catchment_area"];

const STAGE_ALIASES: &[&str] = &["stage", "phase"];
const WORKFLOW_STATE_ALIASES: &[&str] = &["workflow_state", "workflowState", "status", "state"];
const TRIAGE_ALIASES: &[&str] =
    &["triage_priority", "triagePriority", "triage", "priority", "severity"];
const COMPLAINT_ALIASES: &[&str] =
    &["chief_complaint", "chiefComplaint", "complaint", "presenting_complaint"];
const NOTES_ALIASES: &[&str] = &["notes", "note", "comments"];
const TREATMENT_PLAN_ALIASES: &[&str] = &["treatment_plan", "treatmentPlan", "plan"];
const CREATED_AT_ALIASES: &[&str] = &["createdAt", "created_at", "reported_date"];
const ACTOR_ALIASES: &[&str] = &["assigned_to", "assignee", "created_by", "user"];

const FORM_TITLE_ALIASES: &[&str] = &["form", "form_name", "formName"];
const AI_TASK_ALIASES: &[&str] = &["task", "task_id", "taskId"];
const REPORT_TITLE_ALIASES: &[&str] = &["title", "report_name", "reportName"];
const IMAGING_TITLE_ALIASES: &[&str] = &["description", "study_description", "modality"];

/// Canonical fields of a patient document.
#[derive(Debug, Clone)]
pub struct PatientFields {
    /// Document-store identifier.
    pub doc_id: String,
    /// Tracking code.
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
    /// Document-declared update timestamp.
    pub doc_updated_at: Option<DateTime<Utc>>,
}

/// Map a patient document to its canonical fields.
pub fn map_patient(doc: &RawDocument) -> SyncResult<PatientFields> {
    let doc_id = doc.id().ok_or(SyncError::MissingId)?;
    let tracking_code = doc
        .str_of(TRACKING_CODE_ALIASES)
        .map(TrackingCode::new)
        .ok_or_else(|| SyncError::missing_field(&doc_id, "tracking_code"))?;

    Ok(PatientFields {
        tracking_code,
        given_name: doc.str_of(GIVEN_NAME_ALIASES),
        family_name: doc.str_of(FAMILY_NAME_ALIASES),
        sex: doc.str_of(SEX_ALIASES),
        date_of_birth: map_date(doc, &doc_id, DATE_OF_BIRTH_ALIASES)?,
        phone: doc.str_of(PHONE_ALIASES),
        area: doc.str_of(AREA_ALIASES),
        doc_updated_at: doc.updated_at(),
        doc_id,
    })
}

/// Canonical fields of a session document.
#[derive(Debug, Clone)]
pub struct SessionFields {
    /// Document-store identifier.
    pub doc_id: String,
    /// Tracking code of the patient this visit belongs to.
    pub patient_ref: TrackingCode,
    /// Coarse lifecycle phase, when reported.
    pub stage: Option<SessionStage>,
    /// Workflow state reported by the producer, when recognisable.
    pub reported_state: Option<WorkflowState>,
    /// Triage severity. Unreported or unrecognised values map to
    /// [`TriagePriority::Unknown`], never to an error.
    pub triage_priority: TriagePriority,
    /// Free-text chief complaint.
    pub chief_complaint: Option<String>,
    /// Free-text clinical notes.
    pub notes: Option<String>,
    /// Structured treatment plan, verbatim.
    pub treatment_plan: Option<serde_json::Value>,
    /// Actor reference carried by the document, unresolved.
    pub actor_raw: Option<String>,
    /// Document-declared creation timestamp.
    pub doc_created_at: Option<DateTime<Utc>>,
    /// Document-declared update timestamp.
    pub doc_updated_at: Option<DateTime<Utc>>,
}

/// Map a session document to its canonical fields.
pub fn map_session(doc: &RawDocument) -> SyncResult<SessionFields> {
    let doc_id = doc.id().ok_or(SyncError::MissingId)?;
    let patient_ref = doc
        .str_of(PATIENT_REF_ALIASES)
        .map(TrackingCode::new)
        .ok_or_else(|| SyncError::missing_field(&doc_id, "patient"))?;

    Ok(SessionFields {
        patient_ref,
        stage: doc.str_of(STAGE_ALIASES).and_then(|s| s.parse().ok()),
        reported_state: doc
            .str_of(WORKFLOW_STATE_ALIASES)
            .and_then(|s| s.parse().ok()),
        triage_priority: doc
            .str_of(TRIAGE_ALIASES)
            .and_then(|s| s.parse().ok())
            .unwrap_or(TriagePriority::Unknown),
        chief_complaint: doc.str_of(COMPLAINT_ALIASES),
        notes: doc.str_of(NOTES_ALIASES),
        treatment_plan: doc.first_of(TREATMENT_PLAN_ALIASES).cloned(),
        actor_raw: doc.str_of(ACTOR_ALIASES),
        doc_created_at: doc.datetime_of(CREATED_AT_ALIASES),
        doc_updated_at: doc.updated_at(),
        doc_id,
    })
}

/// Canonical stub of a document archived verbatim (forms, AI logs, reports,
/// imaging studies).
#[derive(Debug, Clone)]
pub struct AttachmentFields {
    /// Document-store identifier.
    pub doc_id: String,
    /// Tracking code of the referenced patient, when present.
    pub patient_ref: Option<TrackingCode>,
    /// Human-readable name for the stub.
    pub title: Option<String>,
    /// Document-declared update timestamp.
    pub doc_updated_at: Option<DateTime<Utc>>,
}

/// Map a form document to its archive stub.
pub fn map_form(doc: &RawDocument) -> SyncResult<AttachmentFields> {
    map_attachment(doc, FORM_TITLE_ALIASES)
}

/// Map an AI interaction log to its archive stub. The AI pipeline is an
/// opaque collaborator; all the stub needs is the task identifier.
pub fn map_ai_log(doc: &RawDocument) -> SyncResult<AttachmentFields> {
    map_attachment(doc, AI_TASK_ALIASES)
}

/// Map a report document to its archive stub.
pub fn map_report(doc: &RawDocument) -> SyncResult<AttachmentFields> {
    map_attachment(doc, REPORT_TITLE_ALIASES)
}

/// Map an imaging study document to its archive stub.
pub fn map_imaging(doc: &RawDocument) -> SyncResult<AttachmentFields> {
    map_attachment(doc, IMAGING_TITLE_ALIASES)
}

fn map_attachment(doc: &RawDocument, title_aliases: &[&str]) -> SyncResult<AttachmentFields> {
    let doc_id = doc.id().ok_or(SyncError::MissingId)?;
    Ok(AttachmentFields {
        patient_ref: doc.str_of(PATIENT_REF_ALIASES).map(TrackingCode::new),
        title: doc.str_of(title_aliases),
        doc_updated_at: doc.updated_at(),
        doc_id,
    })
}

fn map_date(
    doc: &RawDocument,
    doc_id: &str,
    aliases: &'static [&'static str],
) -> SyncResult<Option<NaiveDate>> {
    let Some(raw) = doc.str_of(aliases) else {
        return Ok(None);
    };
    // Dates arrive either bare or as a full timestamp.
    if let Ok(date) = raw.parse::<NaiveDate>() {
        return Ok(Some(date));
    }
    if let Some(instant) = doc.datetime_of(aliases) {
        return Ok(Some(instant.date_naive()));
    }
    Err(SyncError::mapping(
        doc_id,
        aliases[0],
        format!("'{raw}' is not a date"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> RawDocument {
        RawDocument::new(&value).unwrap()
    }

    #[test]
    fn test_map_patient_full() {
        let fields = map_patient(&doc(json!({
            "_id": "patient-1",
            "type": "patient",
            "tracking_code": "CPT-7",
            "firstName": "Ada",
            "surname": "Okoro",
            "gender": "female",
            "dob": "1990-04-12",
            "phone_number": "+2348000000",
            "village": "Ward 4",
            "updatedAt": 1_717_200_000_000_i64,
            "some_future_field": {"ignored": true}
        })))
        .unwrap();

        assert_eq!(fields.doc_id, "patient-1");
        assert_eq!(fields.tracking_code.as_str(), "CPT-7");
        assert_eq!(fields.given_name.as_deref(), Some("Ada"));
        assert_eq!(fields.family_name.as_deref(), Some("Okoro"));
        assert_eq!(fields.sex.as_deref(), Some("female"));
        assert_eq!(
            fields.date_of_birth,
            Some(NaiveDate::from_ymd_opt(1990, 4, 12).unwrap())
        );
        assert_eq!(fields.area.as_deref(), Some("Ward 4"));
        assert!(fields.doc_updated_at.is_some());
    }

    #[test]
    fn test_map_patient_requires_tracking_code() {
        let err = map_patient(&doc(json!({"_id": "patient-2"}))).unwrap_err();
        assert!(matches!(err, SyncError::MissingField { field: "tracking_code", .. }));
    }

    #[test]
    fn test_map_patient_rejects_bad_date() {
        let err = map_patient(&doc(json!({
            "_id": "patient-3",
            "tracking_code": "CPT-3",
            "dob": "the other day"
        })))
        .unwrap_err();
        assert!(matches!(err, SyncError::Mapping { .. }));
    }

    #[test]
    fn test_session_patient_ref_priority() {
        // patientCpt must beat patient_id: the alias order is a contract.
        let fields = map_session(&doc(json!({
            "_id": "session-1",
            "patient_id": "CPT-OLD",
            "patientCpt": "CPT-NEW"
        })))
        .unwrap();
        assert_eq!(fields.patient_ref.as_str(), "CPT-NEW");
    }

    #[test]
    fn test_map_session_tolerant_enums() {
        let fields = map_session(&doc(json!({
            "_id": "session-2",
            "patient_id": "CPT-1",
            "stage": "assessment",
            "status": "referred",
            "severity": "high",
            "chiefComplaint": "chest pain",
            "assigned_to": "42"
        })))
        .unwrap();
        assert_eq!(fields.stage, Some(SessionStage::Assessment));
        assert_eq!(fields.reported_state, Some(WorkflowState::Referred));
        assert_eq!(fields.triage_priority, TriagePriority::Red);
        assert_eq!(fields.chief_complaint.as_deref(), Some("chest pain"));
        assert_eq!(fields.actor_raw.as_deref(), Some("42"));
    }

    #[test]
    fn test_map_session_unknown_enum_values_never_error() {
        let fields = map_session(&doc(json!({
            "_id": "session-3",
            "patient_id": "CPT-1",
            "stage": "limbo",
            "status": "meditating",
            "triage": "purple"
        })))
        .unwrap();
        assert_eq!(fields.stage, None);
        assert_eq!(fields.reported_state, None);
        assert_eq!(fields.triage_priority, TriagePriority::Unknown);
    }

    #[test]
    fn test_map_session_requires_patient_ref() {
        let err = map_session(&doc(json!({"_id": "session-4"}))).unwrap_err();
        assert!(matches!(err, SyncError::MissingField { field: "patient", .. }));
    }

    #[test]
    fn test_attachment_stubs() {
        let form = map_form(&doc(json!({
            "_id": "form-1",
            "patientCpt": "CPT-1",
            "form_name": "antenatal_visit"
        })))
        .unwrap();
        assert_eq!(form.title.as_deref(), Some("antenatal_visit"));
        assert_eq!(form.patient_ref.as_ref().map(TrackingCode::as_str), Some("CPT-1"));

        let ai = map_ai_log(&doc(json!({"_id": "ai-1", "task": "summarise-visit"}))).unwrap();
        assert_eq!(ai.title.as_deref(), Some("summarise-visit"));
        assert!(ai.patient_ref.is_none());

        let report = map_report(&doc(json!({"_id": "report-1", "reportName": "monthly"}))).unwrap();
        assert_eq!(report.title.as_deref(), Some("monthly"));

        let imaging =
            map_imaging(&doc(json!({"_id": "img-1", "modality": "ultrasound"}))).unwrap();
        assert_eq!(imaging.title.as_deref(), Some("ultrasound"));
    }
}
