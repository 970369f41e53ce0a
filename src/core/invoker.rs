//! Deadline-bound builder invocation.
//!
//! Wraps the opaque chain builder with a hard wall-clock deadline and
//! maps its outcome onto the engine error taxonomy. Retry policy, if
//! any, belongs to callers.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::debug;

use crate::adapters::ChainBuilder;
use crate::domain::AttackChain;

use super::{ChainError, SharedLlmConfig};

/// Invokes the chain builder with a bounded execution window.
pub struct GenerationInvoker {
    builder: Arc<dyn ChainBuilder>,
    config: Arc<SharedLlmConfig>,
    deadline: Duration,
}

impl GenerationInvoker {
    pub fn new(
        builder: Arc<dyn ChainBuilder>,
        config: Arc<SharedLlmConfig>,
        deadline: Duration,
    ) -> Self {
        Self {
            builder,
            config,
            deadline,
        }
    }

    /// The configured generation deadline.
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Run one generation for a key.
    ///
    /// Reads the config snapshot current at this moment, then drives the
    /// builder until it completes or the deadline expires. Expiry drops
    /// the builder future, cancelling any in-flight request.
    pub async fn invoke(&self, key: &str) -> Result<AttackChain, ChainError> {
        let snapshot = self.config.current().await;
        debug!(
            key,
            model = %snapshot.model,
            deadline_secs = self.deadline.as_secs(),
            "invoking chain builder"
        );

        let result = timeout(self.deadline, self.builder.build(key, &snapshot)).await;

        match result {
            Err(_) => Err(ChainError::Timeout {
                key: key.to_string(),
                deadline: self.deadline,
            }),
            Ok(Err(source)) => Err(ChainError::Generation {
                key: key.to_string(),
                source,
            }),
            Ok(Ok(chain)) => {
                // An empty chain would be indistinguishable from "never
                // generated" in the store, so it is a builder failure.
                if !chain.is_generated() {
                    return Err(ChainError::Generation {
                        key: key.to_string(),
                        source: anyhow::anyhow!("builder produced a chain with no nodes"),
                    });
                }
                Ok(chain)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;
    use crate::domain::{AttackPhase, ChainNode, Severity};
    use anyhow::Result;
    use async_trait::async_trait;

    struct StaticBuilder {
        nodes: usize,
        delay: Duration,
    }

    #[async_trait]
    impl ChainBuilder for StaticBuilder {
        fn name(&self) -> &str {
            "static"
        }

        async fn build(&self, key: &str, _config: &LlmConfig) -> Result<AttackChain> {
            tokio::time::sleep(self.delay).await;
            let nodes = (0..self.nodes)
                .map(|i| ChainNode {
                    id: format!("n{}", i),
                    phase: AttackPhase::Execution,
                    title: format!("step {}", i),
                    description: String::new(),
                    tools: vec![],
                    severity: Severity::Info,
                })
                .collect();
            Ok(AttackChain::new(key, nodes, vec![], "test-model", "digest"))
        }
    }

    fn invoker(builder: StaticBuilder, deadline: Duration) -> GenerationInvoker {
        GenerationInvoker::new(
            Arc::new(builder),
            Arc::new(SharedLlmConfig::new(LlmConfig::default())),
            deadline,
        )
    }

    #[tokio::test]
    async fn test_successful_invocation() {
        let invoker = invoker(
            StaticBuilder {
                nodes: 2,
                delay: Duration::ZERO,
            },
            Duration::from_secs(5),
        );

        let chain = invoker.invoke("conv-1").await.unwrap();
        assert_eq!(chain.nodes.len(), 2);
    }

    #[tokio::test]
    async fn test_deadline_expiry_is_timeout() {
        let invoker = invoker(
            StaticBuilder {
                nodes: 2,
                delay: Duration::from_secs(60),
            },
            Duration::from_millis(20),
        );

        let err = invoker.invoke("conv-1").await.unwrap_err();
        assert!(matches!(err, ChainError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_empty_chain_is_generation_failure() {
        let invoker = invoker(
            StaticBuilder {
                nodes: 0,
                delay: Duration::ZERO,
            },
            Duration::from_secs(5),
        );

        let err = invoker.invoke("conv-1").await.unwrap_err();
        assert!(matches!(err, ChainError::Generation { .. }));
    }
}
