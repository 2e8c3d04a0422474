//! Careflow workflow state machine.
//!
//! The finite-state model governing a clinical encounter's lifecycle:
//! registration, triage, referral, review, treatment, closure. Transitions
//! are validated against a single legal-transition table, justified per a
//! configurable reason policy, written atomically together with their audit
//! row, and announced as domain events.
//!
//! # Modules
//!
//! - [`config`] - [`ReasonPolicy`] and the exported [`WorkflowConfig`]
//! - [`service`] - [`WorkflowService`] transition operations and queries
//! - [`error`] - [`WorkflowError`] and the workflow [`Result`] alias

pub mod config;
pub mod error;
pub mod service;

pub use config::{ReasonPolicy, WorkflowConfig};
pub use error::{Result, WorkflowError};
pub use service::{TransitionRequest, WorkflowService};
