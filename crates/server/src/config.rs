//! Configuration management for the FileDepot server.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/filedepot/config.toml`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::runner::{CommandHooks, NoHooks, Runner};
use crate::shares::MIN_TOKEN_BYTES;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("token_bytes must be at least 6, got {0}")]
    InvalidTokenBytes(usize),

    #[error("max_text_size must be greater than 0, got {0}")]
    InvalidMaxTextSize(u64),

    #[error("base_url must be empty or start with http:// or https://, got {0}")]
    InvalidBaseUrl(String),

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),

    #[error("hook shell must not be empty when hooks are enabled")]
    EmptyHookShell,

    #[error("unknown hook event: {0}")]
    UnknownHookEvent(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Operations that can carry hooks.
const HOOK_ACTIONS: &[&str] = &["delete", "upload", "rename", "copy"];

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub share: ShareConfig,
    pub files: FilesConfig,
    pub hooks: HooksConfig,
}

/// General server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Directory for user and share data.
    pub data_dir: PathBuf,

    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Public URL prefix used when rendering share links.
    pub base_url: String,
}

/// Store file locations. Relative paths resolve against `server.data_dir`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub users_file: PathBuf,
    pub shares_file: PathBuf,
}

/// Share link settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShareConfig {
    /// Random bytes per share token.
    pub token_bytes: usize,
}

/// File handling settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FilesConfig {
    /// Largest text file embedded in a read, in bytes (default: 10MB).
    pub max_text_size: u64,
}

/// Hook commands run around mutating operations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HooksConfig {
    pub enabled: bool,

    /// Shell used as `<shell> -c <command>`.
    pub shell: String,

    /// Commands keyed by event, e.g. `before_delete` or `after_upload`.
    pub commands: HashMap<String, Vec<String>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: "info".to_string(),
            base_url: String::new(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            users_file: PathBuf::from("users.json"),
            shares_file: PathBuf::from("shares.json"),
        }
    }
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            token_bytes: MIN_TOKEN_BYTES,
        }
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            max_text_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

impl Default for HooksConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            shell: "sh".to_string(),
            commands: HashMap::new(),
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("filedepot")
        .join("config.toml")
}

/// Returns the default data directory path.
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("filedepot")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported variables:
    /// - FILEDEPOT_BASE_URL: Override the share link base URL
    /// - FILEDEPOT_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("FILEDEPOT_BASE_URL") {
            if !url.is_empty() {
                tracing::info!("Overriding base_url from environment: {}", url);
                self.server.base_url = url;
            }
        }

        if let Ok(level) = std::env::var("FILEDEPOT_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.server.log_level = level;
            }
        }
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.share.token_bytes < MIN_TOKEN_BYTES {
            return Err(ConfigError::InvalidTokenBytes(self.share.token_bytes));
        }

        if self.files.max_text_size == 0 {
            return Err(ConfigError::InvalidMaxTextSize(self.files.max_text_size));
        }

        let url = &self.server.base_url;
        if !url.is_empty() && !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::InvalidBaseUrl(url.clone()));
        }

        let level = self.server.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.server.log_level.clone()));
        }

        if self.hooks.enabled && self.hooks.shell.trim().is_empty() {
            return Err(ConfigError::EmptyHookShell);
        }

        for event in self.hooks.commands.keys() {
            if !is_hook_event(event) {
                return Err(ConfigError::UnknownHookEvent(event.clone()));
            }
        }

        Ok(())
    }

    /// Path of the user store file.
    pub fn users_path(&self) -> PathBuf {
        self.server.data_dir.join(&self.storage.users_file)
    }

    /// Path of the share store file.
    pub fn shares_path(&self) -> PathBuf {
        self.server.data_dir.join(&self.storage.shares_file)
    }

    /// Build the runner for mutating operations.
    pub fn runner(&self) -> Runner {
        if self.hooks.enabled {
            Runner::new(Arc::new(CommandHooks::new(
                self.hooks.shell.clone(),
                self.hooks.commands.clone(),
            )))
        } else {
            Runner::new(Arc::new(NoHooks))
        }
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
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

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
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

fn is_hook_event(event: &str) -> bool {
    let action = event
        .strip_prefix("before_")
        .or_else(|| event.strip_prefix("after_"));
    matches!(action, Some(a) if HOOK_ACTIONS.contains(&a))
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}
