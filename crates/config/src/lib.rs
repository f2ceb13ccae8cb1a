//! Configuration loading, validation, and management for Ensemble.
//!
//! Loads configuration from `~/.ensemble/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use ensemble_core::EmbeddingMethod;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.ensemble/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Pool scheduling limits
    #[serde(default)]
    pub pool: PoolConfig,

    /// Long-term memory configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("pool", &self.pool)
            .field("memory", &self.memory)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum agent invocations per run
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Wall-clock limit for a whole run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_timeout_secs: Option<u64>,

    /// Wall-clock limit for one agent invocation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_timeout_secs: Option<u64>,

    /// Extra attempts for a failed invocation before the run fails
    #[serde(default)]
    pub retry_attempts: u32,
}

fn default_max_iterations() -> usize {
    5
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            run_timeout_secs: None,
            agent_timeout_secs: None,
            retry_attempts: 0,
        }
    }
}

impl PoolConfig {
    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }

    pub fn agent_timeout(&self) -> Option<Duration> {
        self.agent_timeout_secs.map(Duration::from_secs)
    }
}

/// Which vector store backs long-term memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryBackendKind {
    /// Ephemeral, process lifetime only
    #[default]
    Memory,
    /// JSON-lines file
    File,
    /// SQLite database
    Sqlite,
}

impl std::fmt::Display for MemoryBackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MemoryBackendKind::Memory => "memory",
            MemoryBackendKind::File => "file",
            MemoryBackendKind::Sqlite => "sqlite",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default)]
    pub backend: MemoryBackendKind,

    /// Store location for durable backends; defaults under `~/.ensemble/memory/`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    #[serde(default)]
    pub embedding_method: EmbeddingMethod,

    /// Model used by the `local` and `remote` embedding methods
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,

    /// Store facts from completed turns automatically
    #[serde(default)]
    pub auto_extract: bool,

    /// Memories recalled into an agent's prompt per turn
    #[serde(default = "default_recall_limit")]
    pub recall_limit: usize,

    /// Similarity at or above which a new fact is treated as already known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedup_threshold: Option<f32>,
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_embedding_dimension() -> usize {
    256
}
fn default_recall_limit() -> usize {
    5
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: MemoryBackendKind::default(),
            path: None,
            embedding_method: EmbeddingMethod::default(),
            embedding_model: default_embedding_model(),
            embedding_dimension: default_embedding_dimension(),
            auto_extract: false,
            recall_limit: default_recall_limit(),
            dedup_threshold: None,
        }
    }
}

impl MemoryConfig {
    /// Where a durable backend keeps its data.
    pub fn resolved_path(&self) -> PathBuf {
        if let Some(path) = &self.path {
            return path.clone();
        }
        let dir = AppConfig::config_dir().join("memory");
        match self.backend {
            MemoryBackendKind::Sqlite => dir.join("memory.db"),
            _ => dir.join("memory.jsonl"),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.ensemble/config.toml).
    ///
    /// Environment variables override the file:
    /// - `ENSEMBLE_API_KEY`, then `OPENAI_API_KEY` (only when no key is configured)
    /// - `ENSEMBLE_PROVIDER`
    /// - `ENSEMBLE_MODEL`
    /// - `ENSEMBLE_MAX_ITERATIONS`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup, then re-validate.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.api_key.is_none() {
            self.api_key = lookup("ENSEMBLE_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(provider) = lookup("ENSEMBLE_PROVIDER") {
            self.default_provider = provider;
        }

        if let Some(model) = lookup("ENSEMBLE_MODEL") {
            self.default_model = model;
        }

        if let Some(raw) = lookup("ENSEMBLE_MAX_ITERATIONS") {
            self.pool.max_iterations = raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "ENSEMBLE_MAX_ITERATIONS must be a positive integer, got {raw:?}"
                ))
            })?;
        }

        self.validate()
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".ensemble")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.pool.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "pool.max_iterations must be > 0".into(),
            ));
        }

        if self.memory.embedding_dimension == 0 {
            return Err(ConfigError::ValidationError(
                "memory.embedding_dimension must be > 0".into(),
            ));
        }

        if self.memory.recall_limit == 0 {
            return Err(ConfigError::ValidationError(
                "memory.recall_limit must be > 0".into(),
            ));
        }

        if let Some(t) = self.memory.dedup_threshold {
            if !(t > 0.0 && t <= 1.0) {
                return Err(ConfigError::ValidationError(
                    "memory.dedup_threshold must be in (0.0, 1.0]".into(),
                ));
            }
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `config init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            pool: PoolConfig::default(),
            memory: MemoryConfig::default(),
            providers: HashMap::new(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
