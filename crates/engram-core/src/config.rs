//! Configuration
//!
//! YAML configuration loaded from the first file found at `./config.yaml`,
//! `~/.engram/config.yaml`, `/etc/engram/config.yaml`. Every section has
//! serde defaults so a missing file yields a fully usable configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Top-level configuration document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub rest_api: RestApiConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
    pub ollama: OllamaConfig,
    pub qdrant: QdrantConfig,
    pub rate_limit: RateLimitConfig,
}

/// Embedded database settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file path. `~` expands to the home directory.
    pub path: String,
    /// Apply pending migrations on open.
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "~/.engram/memories.db".to_string(),
            auto_migrate: true,
        }
    }
}

/// REST HTTP surface settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestApiConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub cors: bool,
}

impl Default for RestApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "localhost".to_string(),
            port: 3002,
            cors: true,
        }
    }
}

/// Session identifier derivation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStrategy {
    /// Walk ancestor directories for `.git` and use the directory name.
    #[default]
    GitDirectory,
    /// Use the explicitly configured identifier.
    Manual,
    /// Hash the git remote origin URL.
    Hash,
}

impl SessionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStrategy::GitDirectory => "git-directory",
            SessionStrategy::Manual => "manual",
            SessionStrategy::Hash => "hash",
        }
    }
}

/// Session detection settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub strategy: SessionStrategy,
    /// Used when strategy is `manual`.
    pub manual_id: Option<String>,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of `debug`, `info`, `warn`, `error`.
    pub level: String,
    /// One of `console`, `json`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "console".to_string(),
        }
    }
}

/// Model service settings (embeddings + chat)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub enabled: bool,
    pub base_url: String,
    pub embedding_model: String,
    pub chat_model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "http://localhost:11434".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            chat_model: "qwen2.5:3b".to_string(),
        }
    }
}

/// Vector service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QdrantConfig {
    pub enabled: bool,
    pub url: String,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "http://localhost:6333".to_string(),
        }
    }
}

/// Admission control settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Global requests per second.
    pub requests_per_second: f64,
    /// Global burst capacity.
    pub burst: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_second: 100.0,
            burst: 200.0,
        }
    }
}

impl Config {
    /// Load configuration from the standard search path.
    ///
    /// Missing files are skipped; a present-but-invalid file is an error so a
    /// typo never silently falls back to defaults.
    pub fn load() -> Result<Self> {
        for path in Self::search_paths() {
            if path.exists() {
                tracing::debug!(path = %path.display(), "Loading configuration");
                return Self::load_from(&path);
            }
        }
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an explicit file path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| EngineError::BadRequest(format!("cannot read {}: {}", path.display(), e)))?;
        let config: Config = serde_yaml::from_str(&raw)
            .map_err(|e| EngineError::BadRequest(format!("invalid config {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration file search order.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("./config.yaml")];
        if let Some(home) = directories::BaseDirs::new() {
            paths.push(home.home_dir().join(".engram").join("config.yaml"));
        }
        paths.push(PathBuf::from("/etc/engram/config.yaml"));
        paths
    }

    /// Validate the loaded document. All failures are `BadRequest`.
    pub fn validate(&self) -> Result<()> {
        if self.database.path.trim().is_empty() {
            return Err(EngineError::BadRequest(
                "database.path must not be empty".to_string(),
            ));
        }
        if self.rest_api.enabled && self.rest_api.port == 0 {
            return Err(EngineError::BadRequest(
                "rest_api.port must be in 1..=65535".to_string(),
            ));
        }
        match self.logging.level.as_str() {
            "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(EngineError::BadRequest(format!(
                    "logging.level '{}' is not one of debug|info|warn|error",
                    other
                )));
            }
        }
        match self.logging.format.as_str() {
            "console" | "json" => {}
            other => {
                return Err(EngineError::BadRequest(format!(
                    "logging.format '{}' is not one of console|json",
                    other
                )));
            }
        }
        if self.ollama.enabled && self.ollama.base_url.trim().is_empty() {
            return Err(EngineError::BadRequest(
                "ollama.base_url must not be empty when ollama.enabled".to_string(),
            ));
        }
        if self.qdrant.enabled && self.qdrant.url.trim().is_empty() {
            return Err(EngineError::BadRequest(
                "qdrant.url must not be empty when qdrant.enabled".to_string(),
            ));
        }
        if self.session.strategy == SessionStrategy::Manual
            && self
                .session
                .manual_id
                .as_deref()
                .map(str::trim)
                .is_none_or(str::is_empty)
        {
            tracing::warn!("session.strategy=manual without session.manual_id; falling back to git-directory detection");
        }
        Ok(())
    }

    /// Resolved database path with `~` expanded.
    pub fn database_path(&self) -> PathBuf {
        expand_home(&self.database.path)
    }

    /// Directory holding the daemon's PID and state files.
    pub fn state_dir(&self) -> PathBuf {
        self.database_path()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Expand a leading `~/` to the user's home directory.
fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(dirs) = directories::BaseDirs::new() {
            return dirs.home_dir().join(rest);
        }
    }
    PathBuf::from(path)
}

// ============================================================================
// TESTS
// ============================================================================
