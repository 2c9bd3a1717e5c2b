//! Configuration management for podterm.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/podterm/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use session_client::{
    SessionOptions, DEFAULT_CONNECT_TIMEOUT, DEFAULT_DEBUG_IMAGE, DEFAULT_FAILURE_SIGNATURES,
    DEFAULT_RESIZE_INTERVAL, DEFAULT_SHELLS,
};
use thiserror::Error;

/// Default dashboard server.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8080";

/// Largest accepted resize coalescing interval, in milliseconds.
const MAX_RESIZE_INTERVAL_MS: u64 = 1000;

/// Largest accepted handshake timeout, in seconds.
const MAX_CONNECT_TIMEOUT_SECS: u64 = 300;

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("base_url must start with http://, https://, ws:// or wss://, got {0}")]
    InvalidServerUrl(String),

    #[error("shells must list at least one shell")]
    EmptyShellList,

    #[error("default_shell must be one of the configured shells, got {0}")]
    UnknownDefaultShell(String),

    #[error("debug_image must not be empty")]
    EmptyDebugImage,

    #[error("resize_interval_ms must be at most 1000, got {0}")]
    InvalidResizeInterval(u64),

    #[error("connect_timeout_secs must be between 1 and 300, got {0}")]
    InvalidConnectTimeout(u64),

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Main configuration structure for podterm.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Dashboard server.
    pub server: ServerConfig,

    /// Session defaults.
    pub session: SessionConfig,

    /// Shell failure heuristic.
    pub detector: DetectorConfig,

    /// Log output.
    pub logging: LoggingConfig,
}

/// Dashboard server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the dashboard backend.
    pub base_url: String,

    /// Bearer token sent with every session request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

/// Session defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Shells offered for exec sessions, in order of preference.
    pub shells: Vec<String>,

    /// Shell used when none is given on the command line.
    pub default_shell: String,

    /// Image for debug containers.
    pub debug_image: String,

    /// Resize coalescing interval in milliseconds (0 disables coalescing).
    pub resize_interval_ms: u64,

    /// Socket handshake timeout in seconds.
    pub connect_timeout_secs: u64,
}

/// Shell failure heuristic configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectorConfig {
    /// Output fragments that mark a failed shell exec. Case-sensitive.
    pub signatures: Vec<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub level: String,

    /// Directory for log files.
    pub log_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SERVER_URL.to_string(),
            auth_token: None,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            shells: DEFAULT_SHELLS.iter().map(|s| s.to_string()).collect(),
            default_shell: DEFAULT_SHELLS[0].to_string(),
            debug_image: DEFAULT_DEBUG_IMAGE.to_string(),
            resize_interval_ms: DEFAULT_RESIZE_INTERVAL.as_millis() as u64,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT.as_secs(),
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            signatures: DEFAULT_FAILURE_SIGNATURES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: default_log_dir(),
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("podterm")
        .join("config.toml")
}

/// Returns the default log directory.
fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("podterm")
        .join("logs")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - PODTERM_SERVER_URL: Override the dashboard base URL
    /// - PODTERM_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    /// - PODTERM_TOKEN: Override the bearer token
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("PODTERM_SERVER_URL") {
            if !url.is_empty() {
                tracing::info!("Overriding base_url from environment: {}", url);
                self.server.base_url = url;
            }
        }

        if let Ok(level) = std::env::var("PODTERM_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log level from environment: {}", level);
                self.logging.level = level;
            }
        }

        if let Ok(token) = std::env::var("PODTERM_TOKEN") {
            if !token.is_empty() {
                tracing::info!("Overriding auth_token from environment");
                self.server.auth_token = Some(token);
            }
        }
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = &self.server.base_url;
        if !["http://", "https://", "ws://", "wss://"]
            .iter()
            .any(|scheme| url.starts_with(scheme))
        {
            return Err(ConfigError::InvalidServerUrl(url.clone()));
        }

        if self.session.shells.is_empty() {
            return Err(ConfigError::EmptyShellList);
        }
        if !self.session.shells.contains(&self.session.default_shell) {
            return Err(ConfigError::UnknownDefaultShell(
                self.session.default_shell.clone(),
            ));
        }

        if self.session.debug_image.trim().is_empty() {
            return Err(ConfigError::EmptyDebugImage);
        }

        if self.session.resize_interval_ms > MAX_RESIZE_INTERVAL_MS {
            return Err(ConfigError::InvalidResizeInterval(
                self.session.resize_interval_ms,
            ));
        }

        let timeout = self.session.connect_timeout_secs;
        if timeout == 0 || timeout > MAX_CONNECT_TIMEOUT_SECS {
            return Err(ConfigError::InvalidConnectTimeout(timeout));
        }

        let level = self.logging.level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.logging.level.clone()));
        }

        Ok(())
    }

    /// Session options derived from this configuration.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            shells: self.session.shells.clone(),
            shell: self.session.default_shell.clone(),
            debug_mode: false,
            debug_image: self.session.debug_image.clone(),
            failure_signatures: self.detector.signatures.clone(),
            resize_interval: Duration::from_millis(self.session.resize_interval_ms),
        }
    }

    /// Socket handshake timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.session.connect_timeout_secs)
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}
