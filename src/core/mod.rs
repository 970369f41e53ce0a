//! Core generation engine.
//!
//! This module contains:
//! - KeyLocks: per-conversation mutual exclusion
//! - SharedLlmConfig: replaceable LLM config snapshot
//! - GenerationInvoker: deadline-bound builder invocation
//! - ChainService: the on-demand generation orchestrator

pub mod invoker;
pub mod locks;
pub mod orchestrator;
pub mod shared_config;

use std::time::Duration;

use thiserror::Error;

use crate::store::StoreError;

// Re-export commonly used types
pub use invoker::GenerationInvoker;
pub use locks::KeyLocks;
pub use orchestrator::{ChainOutcome, ChainService};
pub use shared_config::SharedLlmConfig;

/// Errors surfaced by the generation engine.
///
/// Each variant maps to a distinct caller-visible outcome: missing
/// conversation, generation already in flight, deadline expiry, builder
/// failure, or a storage failure on a path that cannot fall through.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("conversation not found: {0}")]
    NotFound(String),

    #[error("attack chain generation already in progress for conversation {0}")]
    Conflict(String),

    #[error("attack chain generation for conversation {key} timed out after {deadline:?}")]
    Timeout { key: String, deadline: Duration },

    #[error("attack chain generation failed for conversation {key}: {source}")]
    Generation {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("conversation id must not be empty")]
    InvalidKey,
}

impl ChainError {
    /// Whether a caller can expect a later retry of the same request
    /// to succeed without any other action on their part.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChainError::Conflict(_) | ChainError::Timeout { .. } | ChainError::Generation { .. }
        )
    }
}
