//! Sync engine configuration.

use serde::{Deserialize, Serialize};

/// Configuration for one sync engine instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Name of the change-feed source (one per document-store database).
    pub source: String,

    /// Number of documents requested per feed page.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Create a referral when a session document first reports the
    /// referred workflow state.
    #[serde(default = "default_true")]
    pub auto_referral_on_reported_state: bool,

    /// Create a referral when a session is newly discovered at critical
    /// (red) triage priority.
    #[serde(default = "default_true")]
    pub auto_referral_on_critical_triage: bool,
}

fn default_batch_size() -> usize {
    100
}

fn default_true() -> bool {
    true
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            source: "default".to_string(),
            batch_size: default_batch_size(),
            auto_referral_on_reported_state: true,
            auto_referral_on_critical_triage: true,
        }
    }
}

impl SyncConfig {
    /// Create a config for a named source with default policies.
    pub fn for_source(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::for_source("clinic-a");
        assert_eq!(config.source, "clinic-a");
        assert_eq!(config.batch_size, 100);
        assert!(config.auto_referral_on_reported_state);
        assert!(config.auto_referral_on_critical_triage);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: SyncConfig = serde_json::from_str(r#"{"source": "clinic-b"}"#).unwrap();
        assert_eq!(config.source, "clinic-b");
        assert_eq!(config.batch_size, 100);
        assert!(config.auto_referral_on_critical_triage);
    }
}
