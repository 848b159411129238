//! TOML configuration.
//!
//! ```toml
//! [registry]
//! path = "./registry"
//!
//! [db]
//! path = "./data/clihub.sqlite"
//!
//! [embedding]
//! provider = "local"        # local | openai | ollama
//! dims = 256
//! remote_cooldown_secs = 30  # skip a failing provider this long
//!
//! [retrieval]
//! final_limit = 10
//!
//! [ranking]
//! semantic_weight = 3.0     # any field of RankingParams
//!
//! [intents]
//! path = "./intents.toml"   # optional replacement taxonomy
//!
//! [server]
//! bind = "127.0.0.1:7341"
//! ```

use anyhow::{Context, Result};
use clihub_core::intent::IntentTable;
use clihub_core::rank::RankingParams;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub registry: RegistryConfig,
    pub db: DbConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub ranking: RankingParams,
    #[serde(default)]
    pub intents: IntentsConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RegistryConfig {
    /// A directory with `clis/` and `workflows/` subdirectories, or a single
    /// JSON file with `entries` and `workflows` arrays.
    pub path: PathBuf,
    /// Bound on every profile/workflow store read.
    #[serde(default = "default_store_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_store_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_dims")]
    pub dims: usize,
    /// Base URL for Ollama (default `http://localhost:11434`).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// Seconds to skip the remote provider after it fails.
    #[serde(default = "default_remote_cooldown_secs")]
    pub remote_cooldown_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: default_dims(),
            url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            cache_capacity: default_cache_capacity(),
            remote_cooldown_secs: default_remote_cooldown_secs(),
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_dims() -> usize {
    256
}
fn default_max_retries() -> u32 {
    2
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_cache_capacity() -> usize {
    4096
}
fn default_remote_cooldown_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    /// Whether a remote backend is configured in front of the local fallback.
    pub fn is_remote(&self) -> bool {
        self.provider != "local"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_final_limit")]
    pub final_limit: usize,
    /// Use the persistent SQLite vector index as the first similarity tier.
    #[serde(default = "default_use_vector_index")]
    pub use_vector_index: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            final_limit: default_final_limit(),
            use_vector_index: default_use_vector_index(),
        }
    }
}

fn default_final_limit() -> usize {
    10
}
fn default_use_vector_index() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct IntentsConfig {
    /// TOML file with `[[intent]]` tables replacing the built-in taxonomy.
    #[serde(default)]
    pub path: Option<PathBuf>,
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
    "127.0.0.1:7341".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Relative paths resolve against the config file's directory
    if let Some(base) = path.parent() {
        for p in [&mut config.registry.path, &mut config.db.path] {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        }
        if let Some(p) = config.intents.path.as_mut() {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        }
    }

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.retrieval.final_limit < 1 {
        anyhow::bail!("retrieval.final_limit must be >= 1");
    }

    if config.registry.timeout_secs == 0 {
        anyhow::bail!("registry.timeout_secs must be > 0");
    }

    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }

    if config.embedding.cache_capacity == 0 {
        anyhow::bail!("embedding.cache_capacity must be > 0");
    }

    match config.embedding.provider.as_str() {
        "local" => {}
        "openai" | "ollama" => {
            if config.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be local, openai, or ollama.",
            other
        ),
    }

    let r = &config.ranking;
    if !(0.0..=1.0).contains(&r.semantic_threshold)
        || !(0.0..=1.0).contains(&r.semantic_threshold_no_evidence)
    {
        anyhow::bail!("ranking semantic thresholds must be in [0.0, 1.0]");
    }
    if r.min_score_relaxed > r.min_score {
        anyhow::bail!("ranking.min_score_relaxed must be <= ranking.min_score");
    }

    Ok(())
}

/// The intent taxonomy: the configured file, or the built-in table.
pub fn load_intent_table(config: &Config) -> Result<IntentTable> {
    match &config.intents.path {
        None => Ok(IntentTable::builtin()),
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read intents file: {}", path.display()))?;
            let table: IntentTable = toml::from_str(&content)
                .with_context(|| format!("Failed to parse intents file: {}", path.display()))?;
            if table.rules.is_empty() {
                anyhow::bail!("intents file {} defines no intents", path.display());
            }
            Ok(table)
        }
    }
}
