//! Conversation types.
//!
//! A conversation is the unit of work an attack chain is generated from:
//! an ordered log of messages between the user and the assistant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A conversation with its full message history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Conversation identifier (also the generation key)
    pub id: String,

    /// Messages in chronological order
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn new(id: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            id: id.into(),
            messages,
        }
    }

    /// Render the conversation as a plain-text transcript for the builder.
    pub fn transcript(&self) -> String {
        let mut out = String::new();
        for message in &self.messages {
            out.push_str(message.role.as_str());
            out.push_str(": ");
            out.push_str(&message.content);
            out.push('\n');
        }
        out
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Who produced the message
    pub role: Role,

    /// Message body
    pub content: String,

    /// When the message was recorded
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a message stamped with the current time.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Message author role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    Tool,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
            Role::System => "system",
        }
    }
}

/// Hash a transcript (first 16 hex chars of SHA256).
///
/// Stored on generated chains so callers can tell when the conversation
/// has changed since the chain was built.
pub fn transcript_digest(transcript: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(transcript.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_rendering() {
        let conversation = Conversation::new(
            "conv-1",
            vec![
                Message::new(Role::User, "scan 10.0.0.5"),
                Message::new(Role::Assistant, "Running nmap against 10.0.0.5"),
            ],
        );

        let transcript = conversation.transcript();
        assert_eq!(
            transcript,
            "user: scan 10.0.0.5\nassistant: Running nmap against 10.0.0.5\n"
        );
    }

    #[test]
    fn test_digest_consistency() {
        let d1 = transcript_digest("same input");
        let d2 = transcript_digest("same input");
        let d3 = transcript_digest("different input");

        assert_eq!(d1, d2);
        assert_ne!(d1, d3);
        assert_eq!(d1.len(), 16);
    }

    #[test]
    fn test_message_serialization() {
        let message = Message::new(Role::Tool, "nmap output");
        let json = serde_json::to_string(&message).unwrap();
        let parsed: Message = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.role, Role::Tool);
        assert_eq!(parsed.content, "nmap output");
    }
}
