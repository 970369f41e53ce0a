//! Filesystem-backed chain store.
//!
//! Conversations are stored as newline-delimited JSON message logs
//! (`conversations/<id>.jsonl`) and chains as single JSON documents
//! (`chains/<id>.json`) for simplicity and easy inspection.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::domain::{AttackChain, Conversation, Message};

use super::{ChainStore, StoreError};

/// File-based store rooted at a home directory.
pub struct FsStore {
    conversations_dir: PathBuf,
    chains_dir: PathBuf,
}

impl FsStore {
    /// Create a store rooted at the given directory, creating the
    /// subdirectory layout if needed.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref();
        let conversations_dir = root.join("conversations");
        let chains_dir = root.join("chains");

        fs::create_dir_all(&conversations_dir).await?;
        fs::create_dir_all(&chains_dir).await?;

        Ok(Self {
            conversations_dir,
            chains_dir,
        })
    }

    /// Open the store at the configured home directory.
    pub async fn open_default() -> anyhow::Result<Self> {
        let home = crate::config::strikechain_home()?;
        Ok(Self::open(home).await?)
    }

    /// Directory holding conversation message logs.
    pub fn conversations_dir(&self) -> &Path {
        &self.conversations_dir
    }

    fn conversation_path(&self, id: &str) -> Result<PathBuf, StoreError> {
        validate_id(id)?;
        Ok(self.conversations_dir.join(format!("{}.jsonl", id)))
    }

    fn chain_path(&self, id: &str) -> Result<PathBuf, StoreError> {
        validate_id(id)?;
        Ok(self.chains_dir.join(format!("{}.json", id)))
    }

    /// Append a message to a conversation log, creating it if absent.
    pub async fn append_message(&self, id: &str, message: &Message) -> Result<(), StoreError> {
        let path = self.conversation_path(id)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let json = serde_json::to_string(message)?;
        file.write_all(format!("{}\n", json).as_bytes()).await?;
        file.flush().await?;

        Ok(())
    }

    /// Import a whole conversation, replacing any existing message log.
    pub async fn import_conversation(
        &self,
        conversation: &Conversation,
    ) -> Result<(), StoreError> {
        let path = self.conversation_path(&conversation.id)?;

        let mut lines = String::new();
        for message in &conversation.messages {
            lines.push_str(&serde_json::to_string(message)?);
            lines.push('\n');
        }

        fs::write(&path, lines).await?;
        Ok(())
    }
}

#[async_trait]
impl ChainStore for FsStore {
    async fn conversation_exists(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.conversation_path(id)?.exists())
    }

    async fn load_conversation(&self, id: &str) -> Result<Conversation, StoreError> {
        let path = self.conversation_path(id)?;

        if !path.exists() {
            return Err(StoreError::ConversationNotFound(id.to_string()));
        }

        let file = File::open(&path).await?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut messages = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let message: Message = serde_json::from_str(&line)?;
            messages.push(message);
        }

        Ok(Conversation::new(id, messages))
    }

    async fn load_chain(&self, id: &str) -> Result<Option<AttackChain>, StoreError> {
        let path = self.chain_path(id)?;

        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path).await?;
        let chain: AttackChain = serde_json::from_str(&content)?;
        Ok(Some(chain))
    }

    async fn save_chain(&self, id: &str, chain: &AttackChain) -> Result<(), StoreError> {
        let path = self.chain_path(id)?;
        let json = serde_json::to_string_pretty(chain)?;
        fs::write(&path, json).await?;
        Ok(())
    }

    async fn delete_chain(&self, id: &str) -> Result<(), StoreError> {
        let path = self.chain_path(id)?;

        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            // Idempotent: deleting an absent chain is a no-op
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_conversations(&self) -> Result<Vec<String>, StoreError> {
        let mut ids = Vec::new();

        let mut entries = fs::read_dir(&self.conversations_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if let Some(id) = name.strip_suffix(".jsonl") {
                    ids.push(id.to_string());
                }
            }
        }

        ids.sort();
        Ok(ids)
    }
}

/// Conversation ids become file names; reject anything that could
/// escape the store directory.
fn validate_id(id: &str) -> Result<(), StoreError> {
    if id.is_empty()
        || id.contains('/')
        || id.contains('\\')
        || id.contains("..")
        || id.starts_with('.')
    {
        return Err(StoreError::InvalidId(id.to_string()));
    }
    Ok(())
}
