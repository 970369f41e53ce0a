//! Command-line interface for strikechain.
//!
//! Provides commands for generating and inspecting attack chains,
//! importing conversations, and running the directory watcher.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::info;

use crate::adapters::OpenAiBuilder;
use crate::config;
use crate::core::{ChainError, ChainService, GenerationInvoker, SharedLlmConfig};
use crate::domain::Conversation;
use crate::store::{ChainStore, FsStore};
use crate::watch::{ChainWatcher, WatchSettings};

/// strikechain - On-demand attack-chain generation engine
#[derive(Parser, Debug)]
#[command(name = "strikechain")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate the attack chain for a conversation (cached if it exists)
    Generate {
        /// Conversation identifier
        conversation_id: String,
    },

    /// Discard any stored chain and generate a fresh one
    Regenerate {
        /// Conversation identifier
        conversation_id: String,
    },

    /// Print the stored attack chain for a conversation
    Show {
        /// Conversation identifier
        conversation_id: String,
    },

    /// List conversations and their chain status
    List,

    /// Import a conversation from a JSON file
    Import {
        /// Path to a JSON document: {"id": "...", "messages": [...]}
        file: PathBuf,

        /// Override the conversation id from the file
        #[arg(long)]
        id: Option<String>,
    },

    /// Watch the conversations directory and generate chains on demand
    Watch {
        /// Run a single scan and exit instead of watching
        #[arg(long)]
        once: bool,
    },
}

/// Everything a command needs, wired from the resolved configuration.
struct Engine {
    store: Arc<FsStore>,
    service: Arc<ChainService>,
    shared: Arc<SharedLlmConfig>,
    config_file: Option<PathBuf>,
}

async fn build_engine() -> Result<Engine> {
    let cfg = config::config()?;

    let store = Arc::new(FsStore::open(&cfg.home).await?);
    let shared = Arc::new(SharedLlmConfig::new(cfg.llm.clone()));

    let builder = Arc::new(OpenAiBuilder::new(
        store.clone() as Arc<dyn ChainStore>,
        cfg.generation.max_input_bytes,
    ));
    let invoker = GenerationInvoker::new(
        builder,
        shared.clone(),
        Duration::from_secs(cfg.generation.timeout_seconds),
    );
    let service = Arc::new(ChainService::new(
        store.clone() as Arc<dyn ChainStore>,
        invoker,
    ));

    Ok(Engine {
        store,
        service,
        shared,
        config_file: cfg.config_file.clone(),
    })
}

impl Cli {
    /// Execute the parsed command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Generate { conversation_id } => generate(&conversation_id).await,
            Commands::Regenerate { conversation_id } => regenerate(&conversation_id).await,
            Commands::Show { conversation_id } => show(&conversation_id).await,
            Commands::List => list().await,
            Commands::Import { file, id } => import(&file, id).await,
            Commands::Watch { once } => watch(once).await,
        }
    }
}

async fn generate(conversation_id: &str) -> Result<()> {
    let engine = build_engine().await?;

    let outcome = engine
        .service
        .get_or_build(conversation_id)
        .await
        .map_err(describe)?;

    if outcome.was_generated() {
        info!(conversation_id, "attack chain generated");
    } else {
        info!(conversation_id, "attack chain loaded from store");
    }

    println!("{}", serde_json::to_string_pretty(outcome.chain())?);
    Ok(())
}

async fn regenerate(conversation_id: &str) -> Result<()> {
    let engine = build_engine().await?;

    let chain = engine
        .service
        .regenerate(conversation_id)
        .await
        .map_err(describe)?;

    println!("{}", serde_json::to_string_pretty(&chain)?);
    Ok(())
}

async fn show(conversation_id: &str) -> Result<()> {
    let engine = build_engine().await?;

    let chain = engine
        .store
        .load_chain(conversation_id)
        .await?
        .filter(|chain| chain.is_generated())
        .with_context(|| {
            format!(
                "No attack chain generated for {} (run `strikechain generate {}`)",
                conversation_id, conversation_id
            )
        })?;

    println!("{}", serde_json::to_string_pretty(&chain)?);
    Ok(())
}

async fn list() -> Result<()> {
    let engine = build_engine().await?;

    let ids = engine.store.list_conversations().await?;
    if ids.is_empty() {
        println!("No conversations found");
        return Ok(());
    }

    for id in ids {
        let status = match engine.store.load_chain(&id).await? {
            Some(chain) if chain.is_generated() => {
                format!("chain: {} nodes ({})", chain.nodes.len(), chain.model)
            }
            _ => "no chain".to_string(),
        };
        println!("{:<40} {}", id, status);
    }

    Ok(())
}

async fn import(file: &PathBuf, id: Option<String>) -> Result<()> {
    let engine = build_engine().await?;

    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let mut conversation: Conversation = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse conversation from {}", file.display()))?;

    if let Some(id) = id {
        conversation.id = id;
    }

    engine.store.import_conversation(&conversation).await?;
    println!(
        "Imported conversation {} ({} messages)",
        conversation.id,
        conversation.messages.len()
    );

    Ok(())
}

async fn watch(once: bool) -> Result<()> {
    let engine = build_engine().await?;

    let settings = WatchSettings::new(
        engine.store.conversations_dir().to_path_buf(),
        engine.config_file.clone(),
    );
    let watcher = ChainWatcher::new(
        engine.service.clone(),
        engine.store.clone() as Arc<dyn ChainStore>,
        engine.shared.clone(),
        settings,
    );

    if once {
        let report = watcher.scan_once().await?;
        println!(
            "Scanned {} conversations: {} generated, {} cached, {} in progress, {} failed",
            report.total(),
            report.generated,
            report.cached,
            report.conflicts,
            report.errors
        );
        return Ok(());
    }

    let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = stop_tx.send(()).await;
        }
    });

    watcher.run(&mut stop_rx).await
}

/// Attach a caller-facing hint to engine errors where one helps.
fn describe(err: ChainError) -> anyhow::Error {
    match err {
        ChainError::Conflict(key) => anyhow::anyhow!(
            "attack chain generation already in progress for conversation {}; retry shortly",
            key
        ),
        other => other.into(),
    }
}
