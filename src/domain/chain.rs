//! Attack chain types.
//!
//! An attack chain is the derived analysis result for a conversation:
//! a graph of attack steps (nodes) connected by edges, reconstructed
//! from the conversation transcript by the chain builder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A generated attack chain for a single conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackChain {
    /// The conversation this chain was derived from
    pub conversation_id: String,

    /// Attack steps, in discovery order
    pub nodes: Vec<ChainNode>,

    /// Directed edges between node ids
    #[serde(default)]
    pub edges: Vec<ChainEdge>,

    /// When generation completed
    pub generated_at: DateTime<Utc>,

    /// Model that produced the chain
    pub model: String,

    /// Short hash of the transcript the chain was generated from.
    /// Lets callers detect that the conversation has grown since generation.
    pub source_digest: String,
}

impl AttackChain {
    /// Create a chain for a conversation with the current timestamp.
    pub fn new(
        conversation_id: impl Into<String>,
        nodes: Vec<ChainNode>,
        edges: Vec<ChainEdge>,
        model: impl Into<String>,
        source_digest: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            nodes,
            edges,
            generated_at: Utc::now(),
            model: model.into(),
            source_digest: source_digest.into(),
        }
    }

    /// A chain counts as generated only if it has at least one node.
    /// A stored record with zero nodes is treated the same as no record.
    pub fn is_generated(&self) -> bool {
        !self.nodes.is_empty()
    }
}

/// A single attack step in the chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainNode {
    /// Stable identifier, unique within the chain
    pub id: String,

    /// Kill-chain phase this step belongs to
    pub phase: AttackPhase,

    /// Short label for display
    pub title: String,

    /// What happened in this step
    pub description: String,

    /// Tools or commands involved, if any
    #[serde(default)]
    pub tools: Vec<String>,

    /// Assessed severity of the step
    #[serde(default)]
    pub severity: Severity,
}

/// A directed edge between two chain nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainEdge {
    /// Source node id
    pub from: String,

    /// Target node id
    pub to: String,

    /// Optional relationship label (e.g. "enabled", "discovered")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Kill-chain phases a node can be classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackPhase {
    Reconnaissance,
    InitialAccess,
    Execution,
    Persistence,
    PrivilegeEscalation,
    LateralMovement,
    Exfiltration,
    Impact,
    /// Anything the builder could not classify
    #[serde(other)]
    Other,
}

/// Severity of a chain node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Default for Severity {
    fn default() -> Self {
        Self::Info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_node(id: &str) -> ChainNode {
        ChainNode {
            id: id.to_string(),
            phase: AttackPhase::Reconnaissance,
            title: "Port scan".to_string(),
            description: "Scanned target with nmap".to_string(),
            tools: vec!["nmap".to_string()],
            severity: Severity::Low,
        }
    }

    #[test]
    fn test_empty_chain_is_not_generated() {
        let chain = AttackChain::new("conv-1", vec![], vec![], "gpt-4o", "abc123");
        assert!(!chain.is_generated());

        let chain = AttackChain::new("conv-1", vec![sample_node("n1")], vec![], "gpt-4o", "abc123");
        assert!(chain.is_generated());
    }

    #[test]
    fn test_chain_serialization_round_trip() {
        let chain = AttackChain::new(
            "conv-42",
            vec![sample_node("n1"), sample_node("n2")],
            vec![ChainEdge {
                from: "n1".to_string(),
                to: "n2".to_string(),
                label: Some("enabled".to_string()),
            }],
            "gpt-4o",
            "deadbeefcafe0123",
        );

        let json = serde_json::to_string(&chain).unwrap();
        let parsed: AttackChain = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.conversation_id, "conv-42");
        assert_eq!(parsed.nodes.len(), 2);
        assert_eq!(parsed.edges.len(), 1);
        assert_eq!(parsed.edges[0].label.as_deref(), Some("enabled"));
    }

    #[test]
    fn test_unknown_phase_falls_back_to_other() {
        let json = r#"{
            "id": "n1",
            "phase": "celebration",
            "title": "t",
            "description": "d"
        }"#;
        let node: ChainNode = serde_json::from_str(json).unwrap();
        assert_eq!(node.phase, AttackPhase::Other);
        assert_eq!(node.severity, Severity::Info);
    }

    #[test]
    fn test_phase_snake_case_names() {
        let json = serde_json::to_string(&AttackPhase::PrivilegeEscalation).unwrap();
        assert_eq!(json, "\"privilege_escalation\"");
    }
}
