//! Application configuration
//!
//! Loaded from an optional TOML file and then overridden by environment
//! variables prefixed with `AGENT_MEMORY__` (for example
//! `AGENT_MEMORY__MEMORY__SUMMARIZE_THRESHOLD=20`).

use crate::error::{ContextError, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Environment prefix for configuration overrides
pub const ENV_PREFIX: &str = "AGENT_MEMORY";

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub compressor: CompressorConfig,
    #[serde(default)]
    pub chunker: ChunkerConfig,
}

impl Config {
    /// Load configuration from `path` (if it exists) and the environment
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let mut config: Config = settings.try_deserialize()?;
        config.compressor = config.compressor.with_env_api_key();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string, ignoring the environment
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Toml))
            .build()?;
        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would silently disable a subsystem
    pub fn validate(&self) -> Result<()> {
        if self.compressor.timeout_secs == 0 {
            return Err(ContextError::Configuration(
                "compressor.timeout_secs must be positive".to_string(),
            ));
        }
        if self.chunker.default_max_tokens == 0 {
            return Err(ContextError::Configuration(
                "chunker.default_max_tokens must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8000 }
fn default_max_body_bytes() -> usize { 10 * 1024 * 1024 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String { "info".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

/// Session memory configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryConfig {
    /// Directory holding one JSON record per session
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Live turn count above which a session is summarized
    #[serde(default = "default_summarize_threshold")]
    pub summarize_threshold: usize,

    /// Live turns retained after summarization
    #[serde(default = "default_keep_recent")]
    pub keep_recent: usize,

    /// Default number of turns returned by a recent-context read
    #[serde(default = "default_recent_context_messages")]
    pub recent_context_messages: usize,

    /// Output budget handed to the compressor
    #[serde(default = "default_summary_max_tokens")]
    pub summary_max_tokens: usize,
}

fn default_storage_dir() -> PathBuf { PathBuf::from("memory") }
fn default_summarize_threshold() -> usize { 10 }
fn default_keep_recent() -> usize { 15 }
fn default_recent_context_messages() -> usize { 5 }
fn default_summary_max_tokens() -> usize { 1500 }

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            summarize_threshold: default_summarize_threshold(),
            keep_recent: default_keep_recent(),
            recent_context_messages: default_recent_context_messages(),
            summary_max_tokens: default_summary_max_tokens(),
        }
    }
}

/// LLM backend used by the context compressor
#[derive(Debug, Clone, Deserialize)]
pub struct CompressorConfig {
    /// OpenAI-compatible chat completions endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// API key; when absent the compressor runs in offline mode
    #[serde(default)]
    pub api_key: Option<SecretString>,

    #[serde(default = "default_compressor_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_endpoint() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_compressor_model() -> String { "gpt-3.5-turbo".to_string() }
fn default_temperature() -> f32 { 0.3 }
fn default_timeout_secs() -> u64 { 60 }

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: None,
            model: default_compressor_model(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl CompressorConfig {
    /// Fill a missing API key from `OPENAI_API_KEY`
    pub fn with_env_api_key(mut self) -> Self {
        if self.api_key.is_none() {
            if let Ok(key) = std::env::var("OPENAI_API_KEY") {
                if !key.trim().is_empty() {
                    self.api_key = Some(SecretString::new(key));
                }
            }
        }
        self
    }

    /// Get timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Defaults for the chunking endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkerConfig {
    #[serde(default = "default_chunk_tokens")]
    pub default_max_tokens: usize,
    #[serde(default = "default_chunk_model")]
    pub default_model: String,
}

fn default_chunk_tokens() -> usize { 1500 }
fn default_chunk_model() -> String { "gpt-4o".to_string() }

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            default_max_tokens: default_chunk_tokens(),
            default_model: default_chunk_model(),
        }
    }
}
