//! Shared, replaceable LLM configuration.
//!
//! Read-mostly cell holding the current [`LlmConfig`] snapshot. Readers
//! get an `Arc` to an immutable snapshot; updates swap the whole
//! snapshot, so a reader never observes a partially-applied change.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::config::LlmConfig;

/// Concurrent holder of the active LLM configuration.
pub struct SharedLlmConfig {
    inner: RwLock<Arc<LlmConfig>>,
}

impl SharedLlmConfig {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            inner: RwLock::new(Arc::new(config)),
        }
    }

    /// Snapshot current at call time. The invoker calls this immediately
    /// before each builder invocation, never caching across calls, so
    /// updates applied while a request waits are honored.
    pub async fn current(&self) -> Arc<LlmConfig> {
        self.inner.read().await.clone()
    }

    /// Replace the snapshot wholesale.
    pub async fn replace(&self, config: LlmConfig) {
        let mut guard = self.inner.write().await;
        *guard = Arc::new(config);
        info!(
            base_url = %guard.base_url,
            model = %guard.model,
            "LLM configuration updated"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replace_is_visible_to_readers() {
        let shared = SharedLlmConfig::new(LlmConfig {
            api_key: "k1".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
        });

        assert_eq!(shared.current().await.model, "gpt-4o");

        shared
            .replace(LlmConfig {
                api_key: "k2".to_string(),
                base_url: "http://localhost:8080/v1".to_string(),
                model: "qwen2.5-coder".to_string(),
            })
            .await;

        let snapshot = shared.current().await;
        assert_eq!(snapshot.model, "qwen2.5-coder");
        assert_eq!(snapshot.api_key, "k2");
    }

    #[tokio::test]
    async fn test_old_snapshot_stays_valid_after_replace() {
        let shared = SharedLlmConfig::new(LlmConfig::default());

        let before = shared.current().await;
        shared
            .replace(LlmConfig {
                model: "other".to_string(),
                ..LlmConfig::default()
            })
            .await;

        // A snapshot taken before the swap is unchanged
        assert_eq!(before.model, "gpt-4o");
        assert_eq!(shared.current().await.model, "other");
    }
}
