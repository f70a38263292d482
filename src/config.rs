//! TOML configuration parsing and validation.
//!
//! Every section has sensible defaults except `[db]` and `[sync]`, which
//! name the two pieces of durable state (the vector index and the local
//! download tree). Secrets are never read from the file; they come from the
//! environment (`OPENAI_API_KEY`, `GRAPH_CLIENT_SECRET`,
//! `SRAG_SESSION_SECRET`, ...).
//!
//! ```toml
//! [db]
//! path = "./data/srag.sqlite"
//!
//! [sync]
//! root = "./downloads"
//! state_file = "./data/sync_state.json"
//!
//! [sync.graph]
//! site_hostname = "acme.sharepoint.com"
//! site_path = "/sites/intranet"
//! library = "Documents"
//!
//! [retrieval]
//! top_k = 4
//! min_similarity = 0.5
//! global_categories = ["General"]
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [llm]
//! provider = "openai"
//! model = "gpt-4o"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub sync: SyncConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    /// Local download tree. Categories are derived relative to this root.
    pub root: PathBuf,
    /// JSON file mapping remote item ids to their last-synced modification time.
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    #[serde(default)]
    pub graph: Option<GraphConfig>,
}

fn default_state_file() -> PathBuf {
    PathBuf::from("./sync_state.json")
}

/// Microsoft Graph drive to mirror. Tenant/client credentials come from
/// `GRAPH_TENANT_ID`, `GRAPH_CLIENT_ID` and `GRAPH_CLIENT_SECRET`.
#[derive(Debug, Deserialize, Clone)]
pub struct GraphConfig {
    pub site_hostname: String,
    pub site_path: String,
    pub library: String,
    #[serde(default = "default_graph_base_url")]
    pub base_url: String,
    #[serde(default = "default_login_base_url")]
    pub login_base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Per-file bound for content downloads; `timeout_secs` covers the
    /// JSON calls.
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
}

fn default_download_timeout_secs() -> u64 {
    600
}

fn default_graph_base_url() -> String {
    "https://graph.microsoft.com/v1.0".to_string()
}
fn default_login_base_url() -> String {
    "https://login.microsoftonline.com".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    #[serde(default = "default_min_content_chars")]
    pub min_content_chars: usize,
    #[serde(default = "default_max_block_chars")]
    pub max_block_chars: usize,
    #[serde(default = "default_index_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            min_content_chars: default_min_content_chars(),
            max_block_chars: default_max_block_chars(),
            batch_size: default_index_batch_size(),
            include_globs: default_include_globs(),
        }
    }
}

fn default_min_content_chars() -> usize {
    50
}
fn default_max_block_chars() -> usize {
    2000
}
fn default_index_batch_size() -> usize {
    10
}
fn default_include_globs() -> Vec<String> {
    ["pdf", "docx", "pptx", "md", "txt"]
        .iter()
        .map(|ext| format!("**/*.{}", ext))
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f64,
    /// Categories every department may read, in addition to its own.
    #[serde(default = "default_global_categories")]
    pub global_categories: Vec<String>,
    #[serde(default = "default_store_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_similarity: default_min_similarity(),
            global_categories: default_global_categories(),
            timeout_secs: default_store_timeout_secs(),
        }
    }
}

fn default_top_k() -> usize {
    4
}
fn default_min_similarity() -> f64 {
    0.5
}
fn default_global_categories() -> Vec<String> {
    vec!["General".to_string()]
}
fn default_store_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Overrides the provider's default endpoint (OpenAI-compatible proxies, remote Ollama).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            dims: None,
            url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            url: None,
            temperature: 0.0,
            max_retries: default_max_retries(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_llm_timeout_secs() -> u64 {
    60
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

/// Session-token settings. The signing secret is read from
/// `SRAG_SESSION_SECRET`, never from the file.
#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_ttl_secs: default_token_ttl_secs(),
        }
    }
}

fn default_token_ttl_secs() -> i64 {
    8 * 60 * 60
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.indexing.batch_size == 0 {
        bail!("indexing.batch_size must be > 0");
    }
    if config.indexing.max_block_chars < config.indexing.min_content_chars {
        bail!("indexing.max_block_chars must be >= indexing.min_content_chars");
    }

    if let Some(graph) = &config.sync.graph {
        if graph.timeout_secs == 0 || graph.download_timeout_secs == 0 {
            bail!("sync.graph timeouts must be > 0");
        }
    }
    if config.retrieval.top_k == 0 {
        bail!("retrieval.top_k must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.retrieval.min_similarity) {
        bail!("retrieval.min_similarity must be in [0.0, 1.0]");
    }
    if config
        .retrieval
        .global_categories
        .iter()
        .any(|c| c.trim().is_empty())
    {
        bail!("retrieval.global_categories must not contain empty names");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }
    if matches!(config.embedding.provider.as_str(), "openai" | "ollama") {
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.dims == Some(0) {
            bail!("embedding.dims must be > 0");
        }
    }

    match config.llm.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => bail!(
            "Unknown llm provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }
    if config.llm.is_enabled() && config.llm.model.is_none() {
        bail!(
            "llm.model must be specified when provider is '{}'",
            config.llm.provider
        );
    }

    if config.auth.token_ttl_secs <= 0 {
        bail!("auth.token_ttl_secs must be > 0");
    }

    Ok(config)
}
