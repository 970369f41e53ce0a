//! strikechain - On-demand attack-chain generation engine
//!
//! Derives attack chains (graphs of attack steps) from security-assistant
//! conversations by calling an LLM-backed builder, with a cache in front
//! of it.
//!
//! # Architecture
//!
//! Generation is expensive (seconds to minutes per chain), so the engine
//! is built around three guarantees:
//! - a chain is generated at most once per conversation unless explicitly
//!   invalidated (`regenerate`)
//! - concurrent requests for the same conversation collapse into a single
//!   generation; losers are told immediately instead of queueing
//! - every generation runs under a hard wall-clock deadline
//!
//! # Modules
//!
//! - `core`: the generation engine (locks, invoker, orchestrator, config cell)
//! - `adapters`: chain builders (OpenAI-compatible API)
//! - `store`: conversation and chain persistence
//! - `domain`: data structures (AttackChain, Conversation)
//! - `watch`: directory watcher driving generation on demand
//! - `cli`: command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Generate (or fetch) the chain for a conversation
//! strikechain generate conv-42
//!
//! # Throw away the stored chain and rebuild it
//! strikechain regenerate conv-42
//!
//! # Keep chains up to date as conversations change
//! strikechain watch
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod store;
pub mod watch;

// Re-export main types at crate root for convenience
pub use adapters::{ChainBuilder, OpenAiBuilder};
pub use config::{GenerationSettings, LlmConfig};
pub use core::{
    ChainError, ChainOutcome, ChainService, GenerationInvoker, KeyLocks, SharedLlmConfig,
};
pub use domain::{AttackChain, AttackPhase, ChainEdge, ChainNode, Conversation, Message, Role};
pub use store::{ChainStore, FsStore, StoreError};
pub use watch::{ChainWatcher, ScanReport, WatchSettings};
