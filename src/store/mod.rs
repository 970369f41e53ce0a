//! Storage boundary for conversations and generated chains.
//!
//! The engine only depends on the narrow [`ChainStore`] capability;
//! the filesystem implementation lives in [`fs`].

pub mod fs;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{AttackChain, Conversation};

pub use fs::FsStore;

/// Errors from the storage layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("invalid conversation id: {0:?}")]
    InvalidId(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Persistence operations the generation engine requires.
///
/// Implementations must tolerate concurrent callers; the engine orders
/// writes per key via its own lock, but reads may race with writes.
#[async_trait]
pub trait ChainStore: Send + Sync {
    /// Whether a conversation exists for the given id.
    async fn conversation_exists(&self, id: &str) -> Result<bool, StoreError>;

    /// Load a conversation with its full message history.
    async fn load_conversation(&self, id: &str) -> Result<Conversation, StoreError>;

    /// Load the stored chain for a conversation, if any record exists.
    /// Callers decide whether a record counts as generated
    /// (see [`AttackChain::is_generated`]).
    async fn load_chain(&self, id: &str) -> Result<Option<AttackChain>, StoreError>;

    /// Persist a generated chain, replacing any existing record.
    async fn save_chain(&self, id: &str, chain: &AttackChain) -> Result<(), StoreError>;

    /// Delete the stored chain for a conversation.
    /// Deleting an absent chain is not an error.
    async fn delete_chain(&self, id: &str) -> Result<(), StoreError>;

    /// List all known conversation ids.
    async fn list_conversations(&self) -> Result<Vec<String>, StoreError>;
}
