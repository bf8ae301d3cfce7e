//! TOML configuration loading for the review tool.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tool name whose results mark spawned conversations, unless configured.
pub const DEFAULT_SPAWN_TOOL: &str = "sessions_spawn";

/// Default port for the review server.
pub const DEFAULT_PORT: u16 = 3000;

/// Top-level configuration, loaded from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// Directory session logs are read from. The CLI `--dir` flag wins over
    /// this; when both are absent, the current directory is used.
    pub session_dir: Option<PathBuf>,
    /// Tool name whose results mark spawned conversations.
    pub spawn_tool: String,
    /// Ambient expand instruction applied to views without a manual choice.
    pub expand_all: bool,
    /// Danger scan settings.
    pub danger: DangerConfig,
    /// Review server settings.
    pub server: ServerConfig,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            session_dir: None,
            spawn_tool: DEFAULT_SPAWN_TOOL.to_string(),
            expand_all: false,
            danger: DangerConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

/// Danger scan configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DangerConfig {
    /// Whether logs are scanned for dangerous tool calls.
    pub enabled: bool,
    /// Extra regex patterns appended to the built-in rules.
    pub extra_patterns: Vec<String>,
}

impl Default for DangerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            extra_patterns: Vec::new(),
        }
    }
}

/// Review server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Whether to allow cross-origin requests from any origin, for separate
    /// frontends during development.
    pub cors_permissive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            cors_permissive: true,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file.
    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Failed to parse the config file as TOML.
    #[error("Failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Loads configuration from a list of candidate paths, first hit wins.
pub struct ConfigLoader {
    search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Loader with the default search order: `.session-review.toml` in the
    /// current directory, then `session-review/config.toml` under the user
    /// config directory.
    #[must_use]
    pub fn new() -> Self {
        let mut search_paths = vec![PathBuf::from(".session-review.toml")];
        if let Some(config_dir) = dirs::config_dir() {
            search_paths.push(config_dir.join("session-review").join("config.toml"));
        }
        Self { search_paths }
    }

    /// Loader that considers only the given path.
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            search_paths: vec![path],
        }
    }

    /// The candidate paths, in search order.
    #[must_use]
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// The first candidate path that exists, if any.
    #[must_use]
    pub fn find_config_file(&self) -> Option<PathBuf> {
        self.search_paths.iter().find(|path| path.exists()).cloned()
    }

    /// Load the configuration, falling back to defaults when no candidate
    /// file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if a found file cannot be read or parsed. A missing
    /// file is not an error.
    pub fn load(&self) -> Result<ReviewConfig, ConfigError> {
        let Some(path) = self.find_config_file() else {
            tracing::debug!("No config file found, using defaults");
            return Ok(ReviewConfig::default());
        };

        tracing::debug!(path = %path.display(), "Loading config file");
        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::ReadError {
            path: path.clone(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::ParseError { path, source })
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
