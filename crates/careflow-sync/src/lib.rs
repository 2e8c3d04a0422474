//! Careflow synchronization engine.
//!
//! One-way change ingestion from the offline-capable document store into
//! the relational mirror. The pipeline tolerates out-of-order delivery,
//! duplicate delivery, encrypted payloads, and field names that have
//! drifted across producer versions, while staying idempotent.
//!
//! # Modules
//!
//! - [`document`] - Raw document access and the closed [`DocumentKind`] set
//! - [`fields`] - Per-kind pure field mapping with alias priority tables
//! - [`identity`] - Actor reference resolution against the user directory
//! - [`conflict`] - Per-kind last-writer-wins policy
//! - [`checkpoint`] - Change-feed checkpoint management
//! - [`engine`] - The [`SyncEngine`] batch pipeline
//! - [`config`] - [`SyncConfig`] policies
//! - [`error`] - [`SyncError`] and the [`SyncResult`] alias

pub mod checkpoint;
pub mod config;
pub mod conflict;
pub mod document;
pub mod engine;
pub mod error;
pub mod fields;
pub mod identity;

pub use checkpoint::CheckpointManager;
pub use config::SyncConfig;
pub use conflict::{resolve_for_kind, TimestampBasis, WriteDecision};
pub use document::{DocumentKind, RawDocument};
pub use engine::{BatchSummary, DocumentStatus, FeedPage, ProcessedDocument, SyncEngine};
pub use error::{SyncError, SyncResult};
pub use identity::{ActorRef, IdentityResolver};
