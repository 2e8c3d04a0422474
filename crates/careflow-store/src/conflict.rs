//! Last-writer-wins write resolution.
//!
//! The one comparison both store backends run under their row lock before
//! refreshing a synced row. Keeping it here, next to the guard it powers,
//! means the outcome of two racing upserts for the same identifier is
//! decided by this function regardless of arrival order.

use chrono::{DateTime, Utc};

/// Decision for an incoming write against the currently stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteDecision {
    /// Apply the incoming write.
    Apply,
    /// The incoming write is older than the stored row; discard it.
    SkipStale,
}

impl WriteDecision {
    /// Check if the incoming write should be applied.
    #[must_use]
    pub fn is_apply(&self) -> bool {
        matches!(self, Self::Apply)
    }
}

/// Resolve an incoming write against the stored row, last writer wins.
///
/// The comparison basis is the document-declared update timestamp. An
/// incoming write applies when it is *not older* than the stored one; equal
/// timestamps apply, which is what makes redelivery idempotent. When either
/// side carries no timestamp there is no basis for comparison and the write
/// applies.
#[must_use]
pub fn resolve_write(
    incoming: Option<DateTime<Utc>>,
    stored: Option<DateTime<Utc>>,
) -> WriteDecision {
    match (incoming, stored) {
        (Some(incoming), Some(stored)) if incoming < stored => WriteDecision::SkipStale,
        _ => WriteDecision::Apply,
    }
}
