//! TOML configuration parsing and validation.
//!
//! ```toml
//! [index]
//! path = "./data/index.sqlite"
//!
//! [embedding]
//! kind = "openai"
//! model = "text-embedding-3-small"
//! api_key_env = "OPENAI_API_KEY"
//!
//! [chunking]
//! strategy = "markdown"
//!
//! [corpus]
//! root = "./notes"
//!
//! [tools]
//! impersonation_role = "superadmin"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use blinko_ai_core::chunk::{ChunkStrategy, Chunker, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};

use crate::provider::ProviderConfig;
use crate::tools::Role;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub index: IndexConfig,
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub corpus: Option<CorpusConfig>,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub notes: Option<NotesConfig>,
    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// Provider kind tag; unknown tags are served by the OpenAI-compatible client.
    pub kind: String,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Environment variable holding the API key, read when `api_key` is unset.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
    /// Overrides the model's known dimension; `0` means auto-detect.
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    32
}

impl EmbeddingConfig {
    /// Build the provider config, resolving `api_key_env` from the environment.
    pub fn provider_config(&self) -> ProviderConfig {
        let api_key = self.api_key.clone().or_else(|| {
            self.api_key_env
                .as_deref()
                .and_then(|var| std::env::var(var).ok())
        });
        ProviderConfig {
            kind: self.kind.clone(),
            api_key,
            base_url: self.base_url.clone(),
            api_version: self.api_version.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default)]
    pub strategy: ChunkStrategy,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_chunk_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            strategy: ChunkStrategy::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    pub fn chunker(&self) -> Result<Chunker> {
        Chunker::new(self.strategy, self.chunk_size, self.chunk_overlap)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.txt".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    /// Proxy URL applied to every outbound provider and note API call.
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotesConfig {
    pub base_url: String,
    pub token: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ToolsConfig {
    /// Role granted to the impersonated caller of every tool invocation.
    #[serde(default = "default_impersonation_role")]
    pub impersonation_role: Role,
}

fn default_impersonation_role() -> Role {
    Role::Superadmin
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            impersonation_role: default_impersonation_role(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.embedding.model.trim().is_empty() {
        bail!("embedding.model must not be empty");
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }
    config
        .chunking
        .chunker()
        .with_context(|| "Invalid [chunking] section")?;

    if let Some(notes) = &config.notes {
        if notes.base_url.trim().is_empty() {
            bail!("notes.base_url must not be empty");
        }
    }

    Ok(config)
}
