//! Per-kind conflict policy.
//!
//! The last-writer-wins comparison itself lives in
//! [`careflow_store::conflict`], where the store backends run it under the
//! row lock. This module owns the per-kind policy: which document kinds
//! carry a timestamp worth comparing at all.

pub use careflow_store::conflict::{resolve_write, WriteDecision};

use chrono::{DateTime, Utc};

use crate::document::DocumentKind;

/// The comparison basis a document kind uses for conflict resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampBasis {
    /// Compare the document-declared update timestamp against the stored
    /// one; older incoming writes are discarded.
    DocumentDeclared,
    /// No meaningful producer timestamp; writes always apply in feed order.
    None,
}

impl TimestampBasis {
    /// The canonical basis for a document kind.
    ///
    /// Patient and session documents carry a producer-maintained update
    /// timestamp. Form, AI-log, report, and imaging documents do not; for
    /// them the feed order is trusted.
    #[must_use]
    pub fn for_kind(kind: DocumentKind) -> Self {
        match kind {
            DocumentKind::Patient | DocumentKind::Session => Self::DocumentDeclared,
            DocumentKind::Form
            | DocumentKind::AiLog
            | DocumentKind::Report
            | DocumentKind::ImagingStudy => Self::None,
        }
    }
}

/// Resolve an incoming write for `kind` against the stored timestamp.
#[must_use]
pub fn resolve_for_kind(
    kind: DocumentKind,
    incoming: Option<DateTime<Utc>>,
    stored: Option<DateTime<Utc>>,
) -> WriteDecision {
    match TimestampBasis::for_kind(kind) {
        TimestampBasis::DocumentDeclared => resolve_write(incoming, stored),
        TimestampBasis::None => WriteDecision::Apply,
    }
}
