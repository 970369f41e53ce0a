//! Per-key generation locks.
//!
//! Each conversation id maps to one mutex, created on first use and kept
//! for the life of the process. Acquisition is non-blocking: generation
//! can take minutes, and queueing callers behind it would pin worker
//! tasks for the whole duration. Callers that lose the race are told
//! immediately and retry later.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Guard holding exclusivity for one key.
///
/// Dropping the guard releases the lock; every exit path of the
/// generation branch releases by construction.
pub type KeyLockGuard = OwnedMutexGuard<()>;

/// Registry of per-key mutexes.
///
/// Entries are never removed: the key space is bounded by existing
/// conversations (the orchestrator checks existence before locking), so
/// the registry grows at most to the conversation count. If the key
/// space ever becomes unbounded, this is the place to add idle-entry
/// eviction.
#[derive(Default)]
pub struct KeyLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Try to acquire the lock for a key without blocking.
    ///
    /// Returns `None` when another caller currently holds the key.
    /// Concurrent callers racing to create the entry for an unseen key
    /// all observe the same mutex instance.
    pub fn try_acquire(&self, key: &str) -> Option<KeyLockGuard> {
        let lock = self
            .locks
            .entry(key.to_string())
            .or_default()
            .clone();

        lock.try_lock_owned().ok()
    }

    /// Number of keys ever locked (for diagnostics).
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
