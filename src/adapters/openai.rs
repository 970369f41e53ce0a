//! LLM-backed chain builder.
//!
//! Renders the conversation transcript into a chat-completions request
//! against an OpenAI-compatible endpoint and parses the model's JSON
//! reply into an attack chain.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::LlmConfig;
use crate::domain::{
    transcript_digest, AttackChain, AttackPhase, ChainEdge, ChainNode, Severity,
};
use crate::store::ChainStore;

use super::ChainBuilder;

const SYSTEM_PROMPT: &str = "You are a security analyst. Reconstruct the attack chain from the \
following penetration-testing conversation transcript. Respond with a single JSON object and \
nothing else, shaped as {\"nodes\": [{\"id\", \"phase\", \"title\", \"description\", \"tools\", \
\"severity\"}], \"edges\": [{\"from\", \"to\", \"label\"}]}. Valid phases: reconnaissance, \
initial_access, execution, persistence, privilege_escalation, lateral_movement, exfiltration, \
impact, other. Valid severities: info, low, medium, high, critical. Order nodes chronologically \
and connect consecutive steps with edges.";

/// Chain builder backed by an OpenAI-compatible chat-completions API.
pub struct OpenAiBuilder {
    store: Arc<dyn ChainStore>,
    client: reqwest::Client,
    max_input_bytes: usize,
}

impl OpenAiBuilder {
    pub fn new(store: Arc<dyn ChainStore>, max_input_bytes: usize) -> Self {
        Self {
            store,
            client: reqwest::Client::new(),
            max_input_bytes,
        }
    }

    async fn complete(&self, config: &LlmConfig, transcript: &str) -> Result<String> {
        let request = ChatRequest {
            model: config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: transcript.to_string(),
                },
            ],
            temperature: 0.2,
        };

        let url = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", config.api_key))
            .json(&request)
            .send()
            .await
            .context("Failed to reach chat-completions endpoint")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            anyhow::bail!("chat-completions request failed ({}): {}", status, message);
        }

        let completion: ChatResponse = response
            .json()
            .await
            .context("Failed to parse chat-completions response")?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .context("chat-completions response contained no choices")
    }
}

#[async_trait]
impl ChainBuilder for OpenAiBuilder {
    fn name(&self) -> &str {
        "openai"
    }

    async fn build(&self, key: &str, config: &LlmConfig) -> Result<AttackChain> {
        let conversation = self
            .store
            .load_conversation(key)
            .await
            .with_context(|| format!("Failed to load conversation {}", key))?;

        let mut transcript = conversation.transcript();
        if transcript.len() > self.max_input_bytes {
            warn!(
                key,
                transcript_bytes = transcript.len(),
                max = self.max_input_bytes,
                "transcript exceeds input limit, truncating"
            );
            truncate_on_char_boundary(&mut transcript, self.max_input_bytes);
        }

        let digest = transcript_digest(&transcript);
        let content = self.complete(config, &transcript).await?;
        debug!(key, reply_bytes = content.len(), "received builder reply");

        let draft = parse_chain_draft(&content)
            .with_context(|| format!("Builder returned unparseable chain for {}", key))?;

        Ok(assemble_chain(key, draft, &config.model, &digest))
    }
}

/// Shape the model is asked to produce.
#[derive(Debug, Deserialize)]
struct ChainDraft {
    nodes: Vec<DraftNode>,
    #[serde(default)]
    edges: Vec<ChainEdge>,
}

#[derive(Debug, Deserialize)]
struct DraftNode {
    #[serde(default)]
    id: Option<String>,
    #[serde(default = "default_phase")]
    phase: AttackPhase,
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    tools: Vec<String>,
    #[serde(default)]
    severity: Severity,
}

fn default_phase() -> AttackPhase {
    AttackPhase::Other
}

/// Parse the model reply, tolerating a markdown code fence around the JSON.
fn parse_chain_draft(content: &str) -> Result<ChainDraft> {
    let stripped = strip_code_fence(content);
    serde_json::from_str(stripped).context("chain JSON did not match the expected shape")
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the language tag (e.g. "json") on the fence line
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };

    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn assemble_chain(key: &str, draft: ChainDraft, model: &str, digest: &str) -> AttackChain {
    let nodes = draft
        .nodes
        .into_iter()
        .map(|node| ChainNode {
            id: node
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            phase: node.phase,
            title: node.title,
            description: node.description,
            tools: node.tools,
            severity: node.severity,
        })
        .collect();

    AttackChain::new(key, nodes, draft.edges, model, digest)
}

fn truncate_on_char_boundary(s: &mut String, max_bytes: usize) {
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}

// Wire types for the chat-completions API

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}
