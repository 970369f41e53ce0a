//! Conversation directory watcher.
//!
//! Long-running mode: watches the conversations directory and drives
//! chain generation through the orchestrator for conversations that have
//! no usable chain yet, or whose transcript changed since generation.
//! Also watches the config file and swaps the shared LLM snapshot when
//! it changes, so in-flight work picks up new credentials/models.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::{ChainError, ChainService, SharedLlmConfig};
use crate::domain::transcript_digest;
use crate::store::ChainStore;

/// Errors that can occur while watching
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Watch directory does not exist: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("Notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration for the watcher
#[derive(Debug, Clone)]
pub struct WatchSettings {
    /// Directory of conversation message logs
    pub conversations_dir: PathBuf,

    /// Config file to watch for LLM setting changes (if any)
    pub config_file: Option<PathBuf>,

    /// Filesystem event debounce window (seconds)
    pub debounce_secs: u64,
}

impl WatchSettings {
    pub fn new(conversations_dir: PathBuf, config_file: Option<PathBuf>) -> Self {
        Self {
            conversations_dir,
            config_file,
            debounce_secs: 2,
        }
    }

    /// Check that the watch path exists
    pub fn validate(&self) -> Result<(), WatchError> {
        if !self.conversations_dir.exists() {
            return Err(WatchError::DirectoryNotFound(self.conversations_dir.clone()));
        }
        Ok(())
    }
}

/// Result of one pass over the conversations directory
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub generated: usize,
    pub cached: usize,
    pub conflicts: usize,
    pub errors: usize,
}

impl ScanReport {
    pub fn total(&self) -> usize {
        self.generated + self.cached + self.conflicts + self.errors
    }
}

/// Drives on-demand generation from filesystem activity.
pub struct ChainWatcher {
    service: Arc<ChainService>,
    store: Arc<dyn ChainStore>,
    shared: Arc<SharedLlmConfig>,
    settings: WatchSettings,
}

impl ChainWatcher {
    pub fn new(
        service: Arc<ChainService>,
        store: Arc<dyn ChainStore>,
        shared: Arc<SharedLlmConfig>,
        settings: WatchSettings,
    ) -> Self {
        Self {
            service,
            store,
            shared,
            settings,
        }
    }

    /// Generate chains for every conversation that lacks one.
    ///
    /// Conversations are processed concurrently; the per-key locks in
    /// the service keep each conversation at a single generation even if
    /// a scan overlaps with watch events or other callers.
    pub async fn scan_once(&self) -> Result<ScanReport> {
        self.settings.validate()?;

        let ids = self.store.list_conversations().await?;
        let mut handles = Vec::with_capacity(ids.len());

        for id in ids {
            let service = self.service.clone();
            handles.push(tokio::spawn(async move {
                let outcome = service.get_or_build(&id).await;
                (id, outcome)
            }));
        }

        let mut report = ScanReport::default();
        for handle in handles {
            let (id, outcome) = handle.await?;
            match outcome {
                Ok(outcome) if outcome.was_generated() => report.generated += 1,
                Ok(_) => report.cached += 1,
                Err(ChainError::Conflict(_)) => {
                    debug!(id, "generation already in progress, skipping");
                    report.conflicts += 1;
                }
                Err(e) => {
                    warn!(id, error = %e, "failed to generate chain during scan");
                    report.errors += 1;
                }
            }
        }

        Ok(report)
    }

    /// Watch until a stop signal arrives.
    ///
    /// Runs an initial scan, then reacts to conversation-log changes
    /// (generating or regenerating the affected chain) and to config
    /// file changes (replacing the shared LLM snapshot).
    pub async fn run(&self, stop_rx: &mut mpsc::Receiver<()>) -> Result<()> {
        self.settings.validate()?;

        let report = self.scan_once().await?;
        info!(
            generated = report.generated,
            cached = report.cached,
            conflicts = report.conflicts,
            errors = report.errors,
            "initial scan complete"
        );

        let (tx, rx) = std::sync::mpsc::channel();
        let mut debouncer = new_debouncer(Duration::from_secs(self.settings.debounce_secs), tx)?;

        debouncer
            .watcher()
            .watch(&self.settings.conversations_dir, RecursiveMode::NonRecursive)?;
        if let Some(ref config_file) = self.settings.config_file {
            debouncer
                .watcher()
                .watch(config_file, RecursiveMode::NonRecursive)?;
        }

        info!(
            path = %self.settings.conversations_dir.display(),
            "watching for conversation changes"
        );

        loop {
            if stop_rx.try_recv().is_ok() {
                info!("watcher stopping...");
                break;
            }

            match rx.recv_timeout(Duration::from_millis(500)) {
                Ok(Ok(events)) => {
                    for event in events {
                        self.handle_path_event(event.path).await;
                    }
                }
                Ok(Err(e)) => {
                    warn!("watcher error: {:?}", e);
                }
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                    // Expected - loop back to the stop check
                }
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    warn!("watcher channel disconnected");
                    break;
                }
            }
        }

        Ok(())
    }

    async fn handle_path_event(&self, path: PathBuf) {
        if self
            .settings
            .config_file
            .as_deref()
            .is_some_and(|config_file| path.as_path() == config_file)
        {
            self.reload_llm_config().await;
            return;
        }

        let Some(id) = conversation_id_for(&path) else {
            return;
        };

        let service = self.service.clone();
        let store = self.store.clone();
        let id = id.to_string();
        tokio::spawn(async move {
            if let Err(e) = refresh_conversation(&service, store.as_ref(), &id).await {
                match e {
                    ChainError::Conflict(_) => {
                        debug!(id, "generation already in progress")
                    }
                    e => warn!(id, error = %e, "failed to refresh chain"),
                }
            }
        });
    }

    async fn reload_llm_config(&self) {
        match crate::config::reload_config() {
            Ok(resolved) => self.shared.replace(resolved.llm).await,
            Err(e) => warn!(error = %e, "failed to reload config file, keeping current snapshot"),
        }
    }
}

/// Extract a conversation id from a message-log path.
fn conversation_id_for(path: &std::path::Path) -> Option<&str> {
    path.file_name()?.to_str()?.strip_suffix(".jsonl")
}

/// Bring one conversation's chain up to date.
///
/// A missing chain is generated; a chain whose source digest no longer
/// matches the transcript is regenerated; anything else is left alone.
async fn refresh_conversation(
    service: &ChainService,
    store: &dyn ChainStore,
    id: &str,
) -> Result<(), ChainError> {
    let stale = match store.load_chain(id).await {
        Ok(Some(chain)) if chain.is_generated() => match store.load_conversation(id).await {
            Ok(conversation) => chain.source_digest != transcript_digest(&conversation.transcript()),
            Err(e) => {
                warn!(id, error = %e, "failed to read conversation for staleness check");
                false
            }
        },
        _ => false,
    };

    if stale {
        info!(id, "conversation changed since generation, regenerating chain");
        service.regenerate(id).await?;
    } else {
        service.get_or_build(id).await?;
    }

    Ok(())
}
