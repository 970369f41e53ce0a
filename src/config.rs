//! Configuration for strikechain.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (STRIKECHAIN_HOME, STRIKECHAIN_API_KEY)
//! 2. Config file (.strikechain/config.yaml)
//! 3. Defaults (~/.strikechain)
//!
//! Config file discovery:
//! - Searches current directory and parents for .strikechain/config.yaml
//! - The `llm` section is the snapshot held by the shared config cell and
//!   can be replaced at runtime without restarting (see `watch`)

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub llm: Option<LlmFileConfig>,
    #[serde(default)]
    pub generation: Option<GenerationFileConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Engine state directory (relative to the .strikechain directory)
    pub home: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LlmFileConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerationFileConfig {
    pub timeout_seconds: Option<u64>,
    pub max_input_bytes: Option<usize>,
}

/// Snapshot of LLM settings the builder reads at call time.
///
/// Treated as immutable once constructed; runtime updates replace the
/// whole snapshot through the shared config cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// API key for the chat-completions endpoint
    pub api_key: String,

    /// Base URL of an OpenAI-compatible API
    pub base_url: String,

    /// Model used for chain generation
    pub model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
        }
    }
}

/// Generation limits.
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    /// Hard wall-clock deadline for a single generation
    pub timeout_seconds: u64,

    /// Maximum transcript size fed to the builder
    pub max_input_bytes: usize,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: 300,     // 5 minutes
            max_input_bytes: 262_144, // 256KB
        }
    }
}

/// Resolved configuration with absolute paths and applied defaults.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to strikechain home (engine state)
    pub home: PathBuf,

    /// LLM snapshot loaded from file + environment
    pub llm: LlmConfig,

    /// Generation limits
    pub generation: GenerationSettings,

    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".strikechain").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

fn resolve_llm(file: Option<&LlmFileConfig>) -> LlmConfig {
    let defaults = LlmConfig::default();
    let mut llm = LlmConfig {
        api_key: file
            .and_then(|l| l.api_key.clone())
            .unwrap_or(defaults.api_key),
        base_url: file
            .and_then(|l| l.base_url.clone())
            .unwrap_or(defaults.base_url),
        model: file.and_then(|l| l.model.clone()).unwrap_or(defaults.model),
    };

    // Environment always wins for the credential
    if let Ok(key) = std::env::var("STRIKECHAIN_API_KEY") {
        llm.api_key = key;
    }

    llm
}

fn resolve_generation(file: Option<&GenerationFileConfig>) -> GenerationSettings {
    let defaults = GenerationSettings::default();
    GenerationSettings {
        timeout_seconds: file
            .and_then(|g| g.timeout_seconds)
            .unwrap_or(defaults.timeout_seconds),
        max_input_bytes: file
            .and_then(|g| g.max_input_bytes)
            .unwrap_or(defaults.max_input_bytes),
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".strikechain");

    let config_file = find_config_file();

    let (home, llm, generation) = if let Some(ref config_path) = config_file {
        let config = load_config_file(config_path)?;

        // home is relative to the .strikechain/ directory
        let home = if let Ok(env_home) = std::env::var("STRIKECHAIN_HOME") {
            PathBuf::from(env_home)
        } else if let Some(ref home_path) = config.paths.home {
            let strikechain_dir = config_path.parent().unwrap_or(Path::new("."));
            resolve_path(strikechain_dir, home_path)
        } else {
            default_home.clone()
        };

        let llm = resolve_llm(config.llm.as_ref());
        let generation = resolve_generation(config.generation.as_ref());

        (home, llm, generation)
    } else {
        let home = std::env::var("STRIKECHAIN_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_home.clone());

        (home, resolve_llm(None), GenerationSettings::default())
    };

    Ok(ResolvedConfig {
        home,
        llm,
        generation,
        config_file,
    })
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (used by the config watcher and tests)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

// ============================================================================
// Convenience functions
// ============================================================================

/// Get the strikechain home directory (engine state).
pub fn strikechain_home() -> Result<PathBuf> {
    Ok(config()?.home.clone())
}
