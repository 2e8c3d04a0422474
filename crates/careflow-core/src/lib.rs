//! Careflow core library.
//!
//! Shared types for the Careflow clinical workflow platform.
//!
//! # Modules
//!
//! - [`ids`] - Strongly typed identifiers (`PatientId`, `SessionId`, ...)
//! - [`types`] - Domain enums (workflow states, triage priority, referral status)
//! - [`clock`] - Injectable time source (`Clock`, `SystemClock`, `FixedClock`)

pub mod clock;
pub mod ids;
pub mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use ids::{ParseIdError, PatientId, ReferralId, SessionId, TrackingCode, TransitionId, UserId};
pub use types::{ReferralStatus, SessionStage, TriagePriority, WorkflowState};
