//! Change-feed checkpoint management.
//!
//! The checkpoint is the last successfully processed feed position for one
//! source. It is owned exclusively by the sync engine and advanced only
//! after every document in a batch has been committed or explicitly
//! skipped-and-logged, never mid-batch.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use careflow_store::{CheckpointStore, FeedCheckpoint};

use crate::error::SyncResult;

/// Loads and advances per-source feed checkpoints.
#[derive(Clone)]
pub struct CheckpointManager {
    store: Arc<dyn CheckpointStore>,
}

impl CheckpointManager {
    /// Create a manager over a checkpoint store.
    pub fn new(store: Arc<dyn CheckpointStore>) -> Self {
        Self { store }
    }

    /// The feed position to resume from, if one has been saved.
    pub async fn position(&self, source: &str) -> SyncResult<Option<String>> {
        Ok(self
            .store
            .get_checkpoint(source)
            .await?
            .map(|checkpoint| checkpoint.position))
    }

    /// Advance the checkpoint for `source` to `position`.
    pub async fn advance(
        &self,
        source: &str,
        position: String,
        at: DateTime<Utc>,
    ) -> SyncResult<()> {
        self.store
            .save_checkpoint(FeedCheckpoint {
                source: source.to_string(),
                position: position.clone(),
                updated_at: at,
            })
            .await?;
        info!(source = %source, position = %position, "Feed checkpoint advanced");
        Ok(())
    }
}
