use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Which retrieval backend the pipeline runs and how repeated uploads
/// interact with the existing index.
#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    /// `"append"` keeps prior documents searchable; `"overwrite"` replaces
    /// the whole index on each upload. Unset: visual overwrites, text appends.
    #[serde(default)]
    pub update_policy: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            update_policy: None,
        }
    }
}

fn default_backend() -> String {
    "text".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Visual,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePolicy {
    Overwrite,
    Append,
}

impl PipelineConfig {
    pub fn backend(&self) -> Backend {
        match self.backend.as_str() {
            "visual" => Backend::Visual,
            _ => Backend::Text,
        }
    }

    pub fn update_policy(&self) -> UpdatePolicy {
        match self.update_policy.as_deref() {
            Some("overwrite") => UpdatePolicy::Overwrite,
            Some("append") => UpdatePolicy::Append,
            // The visual index is rebuilt per document; the shared text
            // table accumulates across uploads.
            None => match self.backend() {
                Backend::Visual => UpdatePolicy::Overwrite,
                Backend::Text => UpdatePolicy::Append,
            },
            _ => UpdatePolicy::Append,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_backend")]
    pub backend: String,
    #[serde(default = "default_table")]
    pub table: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            table: default_table(),
        }
    }
}

fn default_store_backend() -> String {
    "memory".to_string()
}
fn default_table() -> String {
    "document_chunks".to_string()
}

/// Connection settings for the MySQL-compatible store (TiDB Cloud and
/// friends). The CA bundle path is existence-checked at startup.
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
    pub database: String,
    pub ssl_ca: PathBuf,
}

fn default_db_port() -> u16 {
    4000
}

impl DatabaseConfig {
    /// Password from config, overridable by `DOCQ_DB_PASSWORD`.
    pub fn password(&self) -> String {
        std::env::var("DOCQ_DB_PASSWORD")
            .ok()
            .or_else(|| self.password.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Result count K. Unset: 1 for the visual backend, 3 for the text backend.
    #[serde(default)]
    pub top_k: Option<usize>,
    /// What a query against an empty index does: `"error"` (precondition
    /// failure) or `"empty"` (empty result list plus a message).
    #[serde(default = "default_on_missing_index")]
    pub on_missing_index: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: None,
            on_missing_index: default_on_missing_index(),
        }
    }
}

fn default_on_missing_index() -> String {
    "error".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnMissingIndex {
    Error,
    Empty,
}

impl RetrievalConfig {
    pub fn on_missing_index(&self) -> OnMissingIndex {
        match self.on_missing_index.as_str() {
            "empty" => OnMissingIndex::Empty,
            _ => OnMissingIndex::Error,
        }
    }
}

impl Config {
    pub fn top_k(&self) -> usize {
        self.retrieval.top_k.unwrap_or(match self.pipeline.backend() {
            Backend::Visual => 1,
            Backend::Text => 3,
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_model")]
    pub model: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: default_generation_model(),
        }
    }
}

fn default_generation_model() -> String {
    "gemini-1.5-flash".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    match config.pipeline.backend.as_str() {
        "visual" | "text" => {}
        other => anyhow::bail!("Unknown pipeline backend: '{}'. Must be visual or text.", other),
    }

    if let Some(policy) = config.pipeline.update_policy.as_deref() {
        match policy {
            "overwrite" | "append" => {}
            other => anyhow::bail!(
                "Unknown update_policy: '{}'. Must be overwrite or append.",
                other
            ),
        }
    }

    match config.store.backend.as_str() {
        "memory" => {}
        "mysql" => {
            if config.pipeline.backend() == Backend::Visual {
                anyhow::bail!("The visual backend requires store.backend = \"memory\"");
            }
            if config.database.is_none() {
                anyhow::bail!("store.backend = \"mysql\" requires a [database] section");
            }
        }
        other => anyhow::bail!("Unknown store backend: '{}'. Must be memory or mysql.", other),
    }

    if config.store.table.is_empty()
        || !config
            .store
            .table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        anyhow::bail!(
            "store.table must be a plain identifier, got '{}'",
            config.store.table
        );
    }

    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        anyhow::bail!(
            "chunking.chunk_overlap ({}) must be smaller than chunk_size ({})",
            config.chunking.chunk_overlap,
            config.chunking.chunk_size
        );
    }

    if config.retrieval.top_k == Some(0) {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    match config.retrieval.on_missing_index.as_str() {
        "error" | "empty" => {}
        other => anyhow::bail!(
            "Unknown on_missing_index policy: '{}'. Must be error or empty.",
            other
        ),
    }

    match config.embedding.provider.as_str() {
        "local" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be local or openai.",
            other
        ),
    }

    Ok(())
}

/// Startup precondition checks for commands that open the store.
/// Absence of the CA bundle is fatal before any connection is attempted.
pub fn check_store_preconditions(config: &Config) -> Result<()> {
    if config.store.backend == "mysql" {
        if let Some(db) = config.database.as_ref() {
            if !db.ssl_ca.exists() {
                anyhow::bail!(
                    "SSL CA file not found at: {}. Download it from your database dashboard and update [database].ssl_ca.",
                    db.ssl_ca.display()
                );
            }
        }
    }
    Ok(())
}

/// The Gemini API key comes from the environment only; there is no
/// in-source fallback. Commands that generate answers call this at startup.
pub fn gemini_api_key() -> Result<String> {
    std::env::var("GEMINI_API_KEY")
        .ok()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!("GEMINI_API_KEY environment variable not set"))
}
