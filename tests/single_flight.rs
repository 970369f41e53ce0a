//! Single-Flight Integration Tests
//!
//! Concurrent `get_or_build` calls for one conversation must collapse
//! into at most one builder invocation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{Mutex, Semaphore};

use strikechain::{
    AttackChain, AttackPhase, ChainBuilder, ChainError, ChainNode, ChainService, ChainStore,
    Conversation, GenerationInvoker, LlmConfig, Message, Role, SharedLlmConfig, StoreError,
};

fn make_chain(key: &str, node_count: usize) -> AttackChain {
    let nodes = (0..node_count)
        .map(|i| ChainNode {
            id: format!("n{}", i),
            phase: AttackPhase::Execution,
            title: format!("step {}", i),
            description: String::new(),
            tools: vec![],
            severity: Default::default(),
        })
        .collect();
    AttackChain::new(key, nodes, vec![], "test-model", "digest")
}

/// In-memory store with injectable read failures.
struct MemStore {
    conversations: Vec<String>,
    chains: Mutex<HashMap<String, AttackChain>>,
    fail_load: AtomicBool,
    fail_exists: AtomicBool,
}

impl MemStore {
    fn new(conversations: &[&str]) -> Self {
        Self {
            conversations: conversations.iter().map(|s| s.to_string()).collect(),
            chains: Mutex::new(HashMap::new()),
            fail_load: AtomicBool::new(false),
            fail_exists: AtomicBool::new(false),
        }
    }

    fn injected_error() -> StoreError {
        StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "injected"))
    }
}

#[async_trait]
impl ChainStore for MemStore {
    async fn conversation_exists(&self, id: &str) -> Result<bool, StoreError> {
        if self.fail_exists.load(Ordering::SeqCst) {
            return Err(Self::injected_error());
        }
        Ok(self.conversations.iter().any(|c| c == id))
    }

    async fn load_conversation(&self, id: &str) -> Result<Conversation, StoreError> {
        if !self.conversations.iter().any(|c| c == id) {
            return Err(StoreError::ConversationNotFound(id.to_string()));
        }
        Ok(Conversation::new(
            id,
            vec![Message::new(Role::User, "scan the target")],
        ))
    }

    async fn load_chain(&self, id: &str) -> Result<Option<AttackChain>, StoreError> {
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(Self::injected_error());
        }
        Ok(self.chains.lock().await.get(id).cloned())
    }

    async fn save_chain(&self, id: &str, chain: &AttackChain) -> Result<(), StoreError> {
        self.chains
            .lock()
            .await
            .insert(id.to_string(), chain.clone());
        Ok(())
    }

    async fn delete_chain(&self, id: &str) -> Result<(), StoreError> {
        self.chains.lock().await.remove(id);
        Ok(())
    }

    async fn list_conversations(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.conversations.clone())
    }
}

/// Builder that signals entry and blocks until released.
struct GatedBuilder {
    invocations: AtomicUsize,
    entered: Semaphore,
    release: Semaphore,
    node_count: usize,
}

impl GatedBuilder {
    fn new(node_count: usize) -> Self {
        Self {
            invocations: AtomicUsize::new(0),
            entered: Semaphore::new(0),
            release: Semaphore::new(0),
            node_count,
        }
    }

    /// Wait until a builder invocation is in flight.
    async fn wait_entered(&self) {
        self.entered.acquire().await.unwrap().forget();
    }

    /// Allow one in-flight invocation to finish.
    fn release_one(&self) {
        self.release.add_permits(1);
    }
}

#[async_trait]
impl ChainBuilder for GatedBuilder {
    fn name(&self) -> &str {
        "gated"
    }

    async fn build(&self, key: &str, _config: &LlmConfig) -> Result<AttackChain> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        self.entered.add_permits(1);
        self.release.acquire().await?.forget();
        Ok(make_chain(key, self.node_count))
    }
}

fn service_with(store: Arc<MemStore>, builder: Arc<dyn ChainBuilder>) -> Arc<ChainService> {
    let shared = Arc::new(SharedLlmConfig::new(LlmConfig::default()));
    let invoker = GenerationInvoker::new(builder, shared, Duration::from_secs(30));
    Arc::new(ChainService::new(store, invoker))
}

#[tokio::test]
async fn test_concurrent_calls_trigger_one_generation() {
    let store = Arc::new(MemStore::new(&["conv-42"]));
    let builder = Arc::new(GatedBuilder::new(3));
    let service = service_with(store.clone(), builder.clone());

    // Call A enters generation and blocks inside the builder
    let winner = {
        let service = service.clone();
        tokio::spawn(async move { service.get_or_build("conv-42").await })
    };
    builder.wait_entered().await;

    // Concurrent calls are rejected immediately, never queued
    for _ in 0..8 {
        let err = service.get_or_build("conv-42").await.unwrap_err();
        assert!(matches!(err, ChainError::Conflict(_)), "expected Conflict, got {:?}", err);
    }

    builder.release_one();
    let outcome = winner.await.unwrap().unwrap();
    assert!(outcome.was_generated());
    assert_eq!(outcome.chain().nodes.len(), 3);

    // A later call gets the stored chain without another invocation
    let outcome = service.get_or_build("conv-42").await.unwrap();
    assert!(!outcome.was_generated());
    assert_eq!(outcome.chain().nodes.len(), 3);

    assert_eq!(builder.invocations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cache_hit_skips_lock_and_generation() {
    let store = Arc::new(MemStore::new(&["conv-1"]));
    store
        .save_chain("conv-1", &make_chain("conv-1", 2))
        .await
        .unwrap();

    let builder = Arc::new(GatedBuilder::new(2));
    let service = service_with(store, builder.clone());

    let outcome = service.get_or_build("conv-1").await.unwrap();
    assert!(!outcome.was_generated());
    assert_eq!(builder.invocations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_empty_chain_record_is_a_miss() {
    let store = Arc::new(MemStore::new(&["conv-1"]));
    store
        .save_chain("conv-1", &make_chain("conv-1", 0))
        .await
        .unwrap();

    let builder = Arc::new(GatedBuilder::new(2));
    builder.release_one();
    let service = service_with(store, builder.clone());

    let outcome = service.get_or_build("conv-1").await.unwrap();
    assert!(outcome.was_generated());
    assert_eq!(outcome.chain().nodes.len(), 2);
    assert_eq!(builder.invocations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unknown_conversation_is_not_found() {
    let store = Arc::new(MemStore::new(&[]));
    let builder = Arc::new(GatedBuilder::new(1));
    let service = service_with(store, builder.clone());

    let err = service.get_or_build("ghost").await.unwrap_err();
    assert!(matches!(err, ChainError::NotFound(_)));
    assert_eq!(builder.invocations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_empty_key_is_rejected() {
    let store = Arc::new(MemStore::new(&[]));
    let builder = Arc::new(GatedBuilder::new(1));
    let service = service_with(store, builder);

    let err = service.get_or_build("").await.unwrap_err();
    assert!(matches!(err, ChainError::InvalidKey));
}

#[tokio::test]
async fn test_chain_load_failure_falls_through_to_generation() {
    let store = Arc::new(MemStore::new(&["conv-1"]));
    store.fail_load.store(true, Ordering::SeqCst);

    let builder = Arc::new(GatedBuilder::new(1));
    builder.release_one();
    let service = service_with(store.clone(), builder.clone());

    // Broken cache reads are treated as a miss, not surfaced
    let outcome = service.get_or_build("conv-1").await.unwrap();
    assert!(outcome.was_generated());
    assert_eq!(builder.invocations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_existence_check_failure_is_surfaced() {
    let store = Arc::new(MemStore::new(&["conv-1"]));
    store.fail_exists.store(true, Ordering::SeqCst);

    let builder = Arc::new(GatedBuilder::new(1));
    let service = service_with(store, builder.clone());

    let err = service.get_or_build("conv-1").await.unwrap_err();
    assert!(matches!(err, ChainError::Store(_)));
    assert_eq!(builder.invocations.load(Ordering::SeqCst), 0);
}
