//! On-demand chain generation orchestrator.
//!
//! Decides cache-hit vs. generate, holds per-key exclusivity for the
//! generate path, and guarantees at most one in-flight generation per
//! conversation across the whole process.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::domain::AttackChain;
use crate::store::ChainStore;

use super::{ChainError, GenerationInvoker, KeyLocks};

/// How a chain was obtained.
#[derive(Debug)]
pub enum ChainOutcome {
    /// A previously generated chain was returned unchanged
    Cached(AttackChain),

    /// The chain was generated by this call
    Generated(AttackChain),
}

impl ChainOutcome {
    pub fn chain(&self) -> &AttackChain {
        match self {
            ChainOutcome::Cached(chain) | ChainOutcome::Generated(chain) => chain,
        }
    }

    pub fn into_chain(self) -> AttackChain {
        match self {
            ChainOutcome::Cached(chain) | ChainOutcome::Generated(chain) => chain,
        }
    }

    pub fn was_generated(&self) -> bool {
        matches!(self, ChainOutcome::Generated(_))
    }
}

/// On-demand attack-chain service.
pub struct ChainService {
    store: Arc<dyn ChainStore>,
    invoker: GenerationInvoker,
    locks: KeyLocks,
}

impl ChainService {
    pub fn new(store: Arc<dyn ChainStore>, invoker: GenerationInvoker) -> Self {
        Self {
            store,
            invoker,
            locks: KeyLocks::new(),
        }
    }

    /// Return the stored chain for a conversation, generating it first
    /// if no usable record exists.
    ///
    /// Concurrent calls for the same key collapse into one generation:
    /// the caller holding the key lock generates, everyone else gets
    /// [`ChainError::Conflict`] immediately.
    #[instrument(skip(self))]
    pub async fn get_or_build(&self, key: &str) -> Result<ChainOutcome, ChainError> {
        self.ensure_conversation(key).await?;

        // Fast path: already generated, no exclusivity needed
        if let Some(chain) = self.load_generated(key).await {
            info!(key, nodes = chain.nodes.len(), "returning stored attack chain");
            return Ok(ChainOutcome::Cached(chain));
        }

        let _guard = self
            .locks
            .try_acquire(key)
            .ok_or_else(|| ChainError::Conflict(key.to_string()))?;

        // A concurrent holder may have finished between the first check
        // and lock acquisition; that window is unbounded.
        if let Some(chain) = self.load_generated(key).await {
            info!(key, "attack chain was generated while acquiring the lock");
            return Ok(ChainOutcome::Cached(chain));
        }

        let chain = self.generate(key).await?;
        Ok(ChainOutcome::Generated(chain))
    }

    /// Discard any stored chain for a conversation and generate a new one.
    ///
    /// Deletion happens before the lock attempt and is best-effort: a
    /// failed delete is logged and generation proceeds regardless, since
    /// the fresh result overwrites the record anyway.
    #[instrument(skip(self))]
    pub async fn regenerate(&self, key: &str) -> Result<AttackChain, ChainError> {
        self.ensure_conversation(key).await?;

        if let Err(e) = self.store.delete_chain(key).await {
            warn!(key, error = %e, "failed to delete stored attack chain, regenerating anyway");
        }

        let _guard = self
            .locks
            .try_acquire(key)
            .ok_or_else(|| ChainError::Conflict(key.to_string()))?;

        info!(key, "regenerating attack chain");
        self.generate(key).await
    }

    /// Validate the key and confirm the conversation exists.
    async fn ensure_conversation(&self, key: &str) -> Result<(), ChainError> {
        if key.is_empty() {
            return Err(ChainError::InvalidKey);
        }

        if !self.store.conversation_exists(key).await? {
            warn!(key, "conversation does not exist");
            return Err(ChainError::NotFound(key.to_string()));
        }

        Ok(())
    }

    /// Load the stored chain if it counts as generated.
    ///
    /// Store failures here fall through to generation rather than
    /// surfacing: a broken read is indistinguishable from a miss and
    /// regeneration repairs both.
    async fn load_generated(&self, key: &str) -> Option<AttackChain> {
        match self.store.load_chain(key).await {
            Ok(Some(chain)) if chain.is_generated() => Some(chain),
            Ok(_) => None,
            Err(e) => {
                warn!(key, error = %e, "failed to load stored chain, treating as missing");
                None
            }
        }
    }

    /// Run one bounded generation and persist the result.
    /// Caller must hold the key lock.
    async fn generate(&self, key: &str) -> Result<AttackChain, ChainError> {
        info!(key, "generating attack chain");

        let chain = self.invoker.invoke(key).await?;
        self.store.save_chain(key, &chain).await?;

        info!(
            key,
            nodes = chain.nodes.len(),
            edges = chain.edges.len(),
            "attack chain generated"
        );
        Ok(chain)
    }
}

impl std::fmt::Debug for ChainService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainService")
            .field("locked_keys", &self.locks.len())
            .finish()
    }
}
