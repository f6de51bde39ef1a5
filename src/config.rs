use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// How many keyword-scored sections to return.
    #[serde(default = "default_top_sections")]
    pub top_sections: usize,
    /// How many embedding-scored chunks to return.
    #[serde(default = "default_top_chunks")]
    pub top_chunks: usize,
    /// Sections shorter than this (chars, trimmed) are discarded.
    #[serde(default = "default_min_section_len")]
    pub min_section_len: usize,
    /// TTL for the query-result cache.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_sections: default_top_sections(),
            top_chunks: default_top_chunks(),
            min_section_len: default_min_section_len(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

fn default_top_sections() -> usize {
    5
}
fn default_top_chunks() -> usize {
    4
}
fn default_min_section_len() -> usize {
    15
}
fn default_cache_ttl_secs() -> u64 {
    3600
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `"disabled"` or `"openai"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Delay between per-chunk embedding calls, as backpressure against
    /// provider rate limits.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            request_delay_ms: default_request_delay_ms(),
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

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_request_delay_ms() -> u64 {
    200
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_completion_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// How many recent conversation messages are kept in the prompt.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: default_completion_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            history_window: default_history_window(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_completion_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_history_window() -> usize {
    6
}

/// Per-1000-token rates for one model.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct ModelRates {
    pub prompt_per_1k: f64,
    pub completion_per_1k: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PricingConfig {
    /// Customer markup over provider cost (0.30 = 30%).
    #[serde(default = "default_markup")]
    pub markup: f64,
    /// Model whose rates apply when the requested model is unknown.
    #[serde(default = "default_pricing_model")]
    pub default_model: String,
    #[serde(default = "default_models")]
    pub models: HashMap<String, ModelRates>,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            markup: default_markup(),
            default_model: default_pricing_model(),
            models: default_models(),
        }
    }
}

fn default_markup() -> f64 {
    0.30
}
fn default_pricing_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_models() -> HashMap<String, ModelRates> {
    let mut m = HashMap::new();
    m.insert(
        "gpt-3.5-turbo".to_string(),
        ModelRates {
            prompt_per_1k: 0.0005,
            completion_per_1k: 0.0015,
        },
    );
    m.insert(
        "gpt-4".to_string(),
        ModelRates {
            prompt_per_1k: 0.03,
            completion_per_1k: 0.06,
        },
    );
    m.insert(
        "gpt-4-turbo".to_string(),
        ModelRates {
            prompt_per_1k: 0.01,
            completion_per_1k: 0.03,
        },
    );
    m.insert(
        "gpt-4o".to_string(),
        ModelRates {
            prompt_per_1k: 0.0025,
            completion_per_1k: 0.01,
        },
    );
    m
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.overlap must be < chunking.chunk_size");
    }
    if config.retrieval.top_sections == 0 || config.retrieval.top_chunks == 0 {
        anyhow::bail!("retrieval.top_sections and retrieval.top_chunks must be >= 1");
    }
    if config.pricing.markup < 0.0 {
        anyhow::bail!("pricing.markup must be >= 0");
    }
    if !config.pricing.models.contains_key(&config.pricing.default_model) {
        anyhow::bail!(
            "pricing.default_model '{}' has no entry in pricing.models",
            config.pricing.default_model
        );
    }

    if config.embedding.is_enabled() {
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config(extra: &str) -> Result<Config> {
        let toml = format!("[db]\npath = \"/tmp/agentkb.sqlite\"\n{}", extra);
        let config: Config = toml::from_str(&toml)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn defaults_apply() {
        let cfg = base_config("").unwrap();
        assert_eq!(cfg.chunking.chunk_size, 1000);
        assert_eq!(cfg.chunking.overlap, 200);
        assert_eq!(cfg.retrieval.top_sections, 5);
        assert_eq!(cfg.completion.max_retries, 5);
        assert_eq!(cfg.embedding.provider, "disabled");
        assert!((cfg.pricing.markup - 0.30).abs() < 1e-9);
        assert!(cfg.pricing.models.contains_key("gpt-4"));
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let err = base_config("[chunking]\nchunk_size = 100\noverlap = 100\n").unwrap_err();
        assert!(err.to_string().contains("overlap"));
    }

    #[test]
    fn enabled_embedding_requires_model_and_dims() {
        assert!(base_config("[embedding]\nprovider = \"openai\"\n").is_err());
        assert!(base_config(
            "[embedding]\nprovider = \"openai\"\nmodel = \"text-embedding-3-small\"\ndims = 1536\n"
        )
        .is_ok());
    }

    #[test]
    fn completion_retries_configured_independently() {
        let cfg = base_config("[completion]\nmax_retries = 2\n[embedding]\nmax_retries = 7\n")
            .unwrap();
        assert_eq!(cfg.completion.max_retries, 2);
        assert_eq!(cfg.embedding.max_retries, 7);
    }

    #[test]
    fn negative_markup_rejected() {
        assert!(base_config("[pricing]\nmarkup = -0.1\n").is_err());
    }

    #[test]
    fn unknown_embedding_provider_rejected() {
        assert!(base_config("[embedding]\nprovider = \"cohere\"\n").is_err());
    }
}
