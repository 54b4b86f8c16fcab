use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub similarity: SimilarityConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            exclude: Vec::new(),
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}
fn default_max_file_bytes() -> u64 {
    10 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub default_limit: i64,
    #[serde(default = "default_context_lines")]
    pub context_lines: usize,
    #[serde(default = "default_recency_decay")]
    pub recency_decay: f64,
    #[serde(default = "default_rg_timeout_secs")]
    pub rg_timeout_secs: u64,
    #[serde(default = "default_grep_timeout_secs")]
    pub grep_timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            context_lines: default_context_lines(),
            recency_decay: default_recency_decay(),
            rg_timeout_secs: default_rg_timeout_secs(),
            grep_timeout_secs: default_grep_timeout_secs(),
        }
    }
}

fn default_limit() -> i64 {
    50
}
fn default_context_lines() -> usize {
    3
}
fn default_recency_decay() -> f64 {
    0.01
}
fn default_rg_timeout_secs() -> u64 {
    30
}
fn default_grep_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct SimilarityConfig {
    #[serde(default = "default_related_limit")]
    pub related_limit: usize,
    #[serde(default = "default_near_dup_threshold")]
    pub near_dup_threshold: f64,
    #[serde(default = "default_prefix_chars")]
    pub prefix_chars: usize,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            related_limit: default_related_limit(),
            near_dup_threshold: default_near_dup_threshold(),
            prefix_chars: default_prefix_chars(),
        }
    }
}

fn default_related_limit() -> usize {
    10
}
fn default_near_dup_threshold() -> f64 {
    0.80
}
fn default_prefix_chars() -> usize {
    500
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.index.max_file_bytes == 0 {
        anyhow::bail!("index.max_file_bytes must be > 0");
    }

    if config.search.default_limit < 1 {
        anyhow::bail!("search.default_limit must be >= 1");
    }

    if config.search.recency_decay < 0.0 {
        anyhow::bail!("search.recency_decay must not be negative");
    }

    if config.search.rg_timeout_secs == 0 || config.search.grep_timeout_secs == 0 {
        anyhow::bail!("search timeouts must be > 0 seconds");
    }

    if config.similarity.related_limit == 0 {
        anyhow::bail!("similarity.related_limit must be >= 1");
    }

    if !(config.similarity.near_dup_threshold > 0.0 && config.similarity.near_dup_threshold <= 1.0)
    {
        anyhow::bail!("similarity.near_dup_threshold must be in (0.0, 1.0]");
    }

    if config.similarity.prefix_chars == 0 {
        anyhow::bail!("similarity.prefix_chars must be > 0");
    }

    Ok(config)
}
