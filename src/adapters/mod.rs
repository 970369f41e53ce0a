//! Builder interfaces for external systems.
//!
//! The engine depends on one narrow capability: something that can turn
//! a conversation into an attack chain, respecting cancellation. The
//! production implementation talks to an OpenAI-compatible API; tests
//! substitute deterministic doubles.

pub mod openai;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::LlmConfig;
use crate::domain::AttackChain;

// Re-export the OpenAI builder
pub use openai::OpenAiBuilder;

/// Trait for chain builders.
///
/// `build` may run for seconds to minutes and perform network calls; it
/// is driven under the invoker's deadline and must stop promptly when
/// its future is dropped.
#[async_trait]
pub trait ChainBuilder: Send + Sync {
    /// Human-readable builder name
    fn name(&self) -> &str;

    /// Build an attack chain for a conversation using the given
    /// configuration snapshot.
    async fn build(&self, key: &str, config: &LlmConfig) -> Result<AttackChain>;
}
