//! Domain types for the strikechain engine.
//!
//! This module contains the core data structures:
//! - AttackChain: the generated artifact (nodes + edges)
//! - Conversation: the unit of work a chain is derived from

pub mod chain;
pub mod conversation;

// Re-export commonly used types
pub use chain::{AttackChain, AttackPhase, ChainEdge, ChainNode, Severity};
pub use conversation::{transcript_digest, Conversation, Message, Role};
