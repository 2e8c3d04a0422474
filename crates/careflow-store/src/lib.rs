//! Careflow persistence layer.
//!
//! Plain data records plus explicit store traits, so the sync engine and the
//! workflow state machine never touch a database handle directly and tests
//! can run entirely against the in-memory backend.
//!
//! # Modules
//!
//! - [`records`] - Plain data records and write-input structs
//! - [`traits`] - Store traits ([`PatientStore`], [`SessionStore`], ...)
//! - [`memory`] - [`InMemoryStore`] backend for tests and tooling
//! - [`mysql`] - [`MySqlStore`] backend for the production MySQL mirror
//! - [`error`] - [`StoreError`] and the store [`Result`] alias

pub mod conflict;
pub mod error;
pub mod memory;
pub mod mysql;
pub mod records;
pub mod traits;

pub use conflict::{resolve_write, WriteDecision};
pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use mysql::MySqlStore;
pub use records::{
    AppliedTransition, ArchivedDocument, ClinicalSession, DirectoryUser, FeedCheckpoint,
    NewPatient, NewReferral, NewSession, Patient, PatientUpsert, PatientWrite, Referral,
    SessionUpsert, SessionWrite, StateTransition, TransitionWrite,
};
pub use traits::{
    CheckpointStore, DocumentArchive, PatientStore, ReferralStore, SessionStore, UserDirectory,
};
