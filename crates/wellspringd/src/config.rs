//! Configuration management for wellspringd.
//!
//! Loads settings from /etc/wellspring/config.toml or uses defaults. Model
//! providers and the crawler mode are parsed into closed enums here, so an
//! unknown provider or mode fails at startup, not at call time.

use crate::crawl::FetchMode;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/wellspring/config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP API.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

/// Supported model backends. Extending this enum is the only way to add a
/// provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[default]
    Ollama,
}

/// Per-role model selection and sampling parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub top_k: Option<u32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProvider,

    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Covers the whole request for completions and the initial response
    /// for streams.
    #[serde(default = "default_llm_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_planner_model")]
    pub planner: ModelConfig,

    #[serde(default = "default_reranker_model")]
    pub reranker: ModelConfig,

    #[serde(default = "default_generator_model")]
    pub generator: ModelConfig,
}

fn default_llm_base_url() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_llm_timeout() -> u64 {
    120
}

fn default_planner_model() -> ModelConfig {
    ModelConfig {
        model: "qwen2.5:7b-instruct".to_string(),
        temperature: Some(0.7),
        ..Default::default()
    }
}

fn default_reranker_model() -> ModelConfig {
    ModelConfig {
        model: "qwen2.5:7b-instruct".to_string(),
        temperature: Some(0.2),
        ..Default::default()
    }
}

fn default_generator_model() -> ModelConfig {
    ModelConfig {
        model: "qwen2.5:14b-instruct".to_string(),
        temperature: Some(0.7),
        ..Default::default()
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            base_url: default_llm_base_url(),
            request_timeout_secs: default_llm_timeout(),
            planner: default_planner_model(),
            reranker: default_reranker_model(),
            generator: default_generator_model(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// SearXNG endpoints; each sub-query picks one uniformly at random.
    #[serde(default)]
    pub endpoints: Vec<String>,

    /// Engines forwarded to SearXNG's `engines` parameter.
    #[serde(default = "default_search_engines")]
    pub engines: Vec<String>,

    #[serde(default = "default_search_timeout")]
    pub request_timeout_secs: u64,
}

fn default_search_engines() -> Vec<String> {
    vec!["duckduckgo".to_string(), "google".to_string()]
}

fn default_search_timeout() -> u64 {
    10
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            engines: default_search_engines(),
            request_timeout_secs: default_search_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    #[serde(default)]
    pub mode: FetchMode,

    #[serde(default = "default_crawl_timeout")]
    pub request_timeout_secs: u64,
}

fn default_crawl_timeout() -> u64 {
    10
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            mode: FetchMode::default(),
            request_timeout_secs: default_crawl_timeout(),
        }
    }
}

impl Config {
    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            warn!("Config file {} not found, using defaults", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path))?;

        info!("Loaded config from {}", path);
        Ok(config)
    }
}
