//! TOML configuration.
//!
//! The whole file is parsed into one immutable [`Config`] and validated
//! once by [`load_config`] (or [`Config::validate`] for configs built in
//! code). CLI overrides are applied with [`Config::with_overrides`] before
//! validation, so no partially valid config is ever handed to the pipeline.
//!
//! ```toml
//! [index]
//! path = "./data/index"
//!
//! [ingest]
//! sources_file = "./data/article_urls.txt"
//! batch_size = 50
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use vector_ingest_core::batch::BatchOptions;
use vector_ingest_core::embedding::DEFAULT_MAX_INPUT_CHARS;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub index: IndexConfig,
    pub ingest: IngestConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    pub sources_file: PathBuf,
    #[serde(default = "default_ingest_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub batch_limit: Option<usize>,
    #[serde(default)]
    pub source_limit: Option<usize>,
    /// Prefix for relative entries in the source list.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Directory of images to ingest after the source list.
    #[serde(default)]
    pub images_dir: Option<PathBuf>,
    #[serde(default = "default_enrich_concurrency")]
    pub enrich_concurrency: usize,
    /// Timeout for fetching one URL from the source list.
    #[serde(default = "default_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

fn default_ingest_batch_size() -> usize {
    BatchOptions::DEFAULT_BATCH_SIZE
}
fn default_enrich_concurrency() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Longer inputs are cut to this many characters before embedding.
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_embedding_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            max_input_chars: default_max_input_chars(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embedding_provider() -> String {
    "disabled".to_string()
}
fn default_embedding_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_input_chars() -> usize {
    DEFAULT_MAX_INPUT_CHARS
}

#[derive(Debug, Deserialize, Clone)]
pub struct EnrichmentConfig {
    /// `extractive` (offline) or `openai`.
    #[serde(default = "default_enrichment_provider")]
    pub provider: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
    /// Model used to caption images.
    #[serde(default = "default_vision_model")]
    pub vision_model: String,
    #[serde(default = "default_chat_max_tokens")]
    pub max_tokens: u32,
    /// Character budget for extractive summaries.
    #[serde(default = "default_summary_chars")]
    pub summary_chars: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_chat_timeout_secs")]
    pub timeout_secs: u64,
    /// Text longer than this is cut before it is put in a summary prompt.
    #[serde(default = "default_prompt_chars")]
    pub max_input_chars: usize,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            provider: default_enrichment_provider(),
            model: default_chat_model(),
            vision_model: default_vision_model(),
            max_tokens: default_chat_max_tokens(),
            summary_chars: default_summary_chars(),
            max_retries: default_max_retries(),
            timeout_secs: default_chat_timeout_secs(),
            max_input_chars: default_prompt_chars(),
        }
    }
}

fn default_enrichment_provider() -> String {
    "extractive".to_string()
}
fn default_chat_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_vision_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_chat_max_tokens() -> u32 {
    1024
}
fn default_summary_chars() -> usize {
    600
}
fn default_chat_timeout_secs() -> u64 {
    60
}
fn default_prompt_chars() -> usize {
    12_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Ceiling on context handed to a query-time consumer, in tokens.
    #[serde(default = "default_token_limit")]
    pub token_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            token_limit: default_token_limit(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_token_limit() -> usize {
    12000
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Write a timestamped log file here in addition to stderr.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub batch_size: Option<usize>,
    pub batch_limit: Option<usize>,
    pub source_limit: Option<usize>,
    pub images_dir: Option<PathBuf>,
}

impl Config {
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(size) = overrides.batch_size {
            self.ingest.batch_size = size;
        }
        if overrides.batch_limit.is_some() {
            self.ingest.batch_limit = overrides.batch_limit;
        }
        if overrides.source_limit.is_some() {
            self.ingest.source_limit = overrides.source_limit;
        }
        if overrides.images_dir.is_some() {
            self.ingest.images_dir = overrides.images_dir;
        }
        self
    }

    pub fn batch_options(&self) -> Result<BatchOptions> {
        BatchOptions::new(self.ingest.batch_size, self.ingest.batch_limit)
    }

    pub fn validate(&self) -> Result<()> {
        self.batch_options()?;

        if self.ingest.source_limit == Some(0) {
            bail!("ingest.source_limit must be > 0 when set");
        }
        if self.ingest.enrich_concurrency == 0 {
            bail!("ingest.enrich_concurrency must be > 0");
        }
        if self.ingest.fetch_timeout_secs == 0 {
            bail!("ingest.fetch_timeout_secs must be > 0");
        }
        if let Some(ref base) = self.ingest.base_url {
            if !base.starts_with("http") {
                bail!("ingest.base_url must start with 'http', got '{}'", base);
            }
        }
        check_parent_exists("ingest.sources_file", &self.ingest.sources_file)?;
        check_parent_exists("index.path", &self.index.path)?;

        if self.retrieval.top_k == 0 {
            bail!("retrieval.top_k must be > 0");
        }
        if self.retrieval.token_limit == 0 {
            bail!("retrieval.token_limit must be > 0");
        }

        match self.embedding.provider.as_str() {
            "disabled" | "local" => {}
            "openai" | "ollama" => {
                if self.embedding.model.is_none() {
                    bail!(
                        "embedding.model must be specified when provider is '{}'",
                        self.embedding.provider
                    );
                }
                if matches!(self.embedding.dims, None | Some(0)) {
                    bail!(
                        "embedding.dims must be > 0 when provider is '{}'",
                        self.embedding.provider
                    );
                }
            }
            other => bail!(
                "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
                other
            ),
        }

        if self.embedding.max_input_chars == 0 {
            bail!("embedding.max_input_chars must be > 0");
        }

        match self.enrichment.provider.as_str() {
            "extractive" | "openai" => {}
            other => bail!(
                "Unknown enrichment provider: '{}'. Must be extractive or openai.",
                other
            ),
        }
        if self.enrichment.summary_chars == 0 {
            bail!("enrichment.summary_chars must be > 0");
        }
        if self.enrichment.max_input_chars == 0 {
            bail!("enrichment.max_input_chars must be > 0");
        }

        Ok(())
    }
}

/// Relative paths with an empty parent resolve against the working
/// directory, which always exists.
fn check_parent_exists(field: &str, path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => bail!(
            "{}: parent directory does not exist: {}",
            field,
            parent.display()
        ),
        _ => Ok(()),
    }
}

pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

pub fn load_config(path: &Path, overrides: Overrides) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config = parse_config(&content)?.with_overrides(overrides);
    config.validate()?;
    Ok(config)
}
