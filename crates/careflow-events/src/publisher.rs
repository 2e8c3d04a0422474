//! Event publisher seam.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::envelope::RawEnvelope;
use crate::error::EventError;

/// Transport-agnostic event publisher.
///
/// Implementations deliver type-erased envelopes to whatever the deployment
/// subscribes: a message broker, a webhook fan-out, or the in-memory
/// collector used in tests.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish one envelope.
    async fn publish(&self, envelope: RawEnvelope) -> Result<(), EventError>;
}

/// In-memory publisher that collects envelopes, for tests.
#[derive(Debug, Default)]
pub struct InMemoryPublisher {
    published: RwLock<Vec<RawEnvelope>>,
}

impl InMemoryPublisher {
    /// Create a new empty publisher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All envelopes published so far, in publish order.
    pub async fn published(&self) -> Vec<RawEnvelope> {
        self.published.read().await.clone()
    }

    /// Number of envelopes published so far.
    pub async fn count(&self) -> usize {
        self.published.read().await.len()
    }

    /// Drop all collected envelopes.
    pub async fn clear(&self) {
        self.published.write().await.clear();
    }
}

#[async_trait]
impl EventPublisher for InMemoryPublisher {
    async fn publish(&self, envelope: RawEnvelope) -> Result<(), EventError> {
        envelope.validate()?;
        self.published.write().await.push(envelope);
        Ok(())
    }
}
