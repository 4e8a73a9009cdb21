//! Configuration management for the shroud CLI.
//!
//! Configuration is stored as TOML in the platform config directory
//! (`~/.config/shroud/config.toml` on Linux). Precedence, lowest first:
//! file, `SHROUD_*` environment variables, command-line flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use shroud_core::http_directory::HttpDirectoryConfig;
use shroud_core::{KdfMode, PeerId};

pub const ENV_DIRECTORY_URL: &str = "SHROUD_DIRECTORY_URL";
pub const ENV_OWN_ID: &str = "SHROUD_OWN_ID";
pub const ENV_DATA_DIR: &str = "SHROUD_DATA_DIR";

const SESSIONS_DB_FILE: &str = "sessions.db";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// CLI configuration.
///
/// # Example TOML
///
/// ```toml
/// [identity]
/// own_id = 123456789
/// data_dir = "/home/me/.local/share/shroud"
///
/// [directory]
/// url = "https://keys.example.org"
/// timeout_seconds = 10
/// key_cache_ttl_seconds = 100
/// date_cache_ttl_seconds = 120
///
/// [crypto]
/// kdf_binding = "none"  # "none" | "peer_ids"
///
/// [logging]
/// level = "warn"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub identity: IdentityConfig,

    #[serde(default)]
    pub directory: DirectoryConfig,

    #[serde(default)]
    pub crypto: CryptoConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// This node's identifier on the messaging platform.
    #[serde(default)]
    pub own_id: Option<u64>,

    /// Where identity keys and the session database live (empty = default location).
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default = "default_directory_url")]
    pub url: String,

    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_key_ttl")]
    pub key_cache_ttl_seconds: u64,

    #[serde(default = "default_date_ttl")]
    pub date_cache_ttl_seconds: u64,
}

fn default_directory_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_key_ttl() -> u64 {
    100
}

fn default_date_ttl() -> u64 {
    120
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            url: default_directory_url(),
            timeout_seconds: default_timeout(),
            key_cache_ttl_seconds: default_key_ttl(),
            date_cache_ttl_seconds: default_date_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CryptoConfig {
    /// "none" or "peer_ids". Every peer must use the same setting.
    #[serde(default = "default_kdf_binding")]
    pub kdf_binding: String,
}

fn default_kdf_binding() -> String {
    "none".to_string()
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            kdf_binding: default_kdf_binding(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// "error", "warn", "info", "debug" or "trace"
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Values from command-line flags that take precedence over everything else.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub directory_url: Option<String>,
    pub own_id: Option<u64>,
    pub data_dir: Option<PathBuf>,
    pub debug: bool,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_default() -> Result<Self, ConfigError> {
        if let Some(path) = Self::default_path() {
            if path.exists() {
                return Self::load(&path);
            }
        }
        Ok(Self::default())
    }

    pub fn load_from(custom_path: Option<&Path>) -> Result<Self, ConfigError> {
        match custom_path {
            Some(path) => Self::load(path),
            None => Self::load_default(),
        }
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("org", "shroud", "shroud")
    }

    pub fn default_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Write the sample configuration to `path` unless a file is already there.
    pub fn create_default_if_missing(path: &Path) -> Result<bool, ConfigError> {
        if path.exists() {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, Self::sample_toml())?;
        Ok(true)
    }

    /// Apply `SHROUD_*` overrides using `lookup` to read variables.
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_DIRECTORY_URL) {
            self.directory.url = url;
        }
        if let Some(raw) = lookup(ENV_OWN_ID) {
            let own_id = raw.trim().parse::<u64>().map_err(|_| {
                ConfigError::ValidationError(format!("{ENV_OWN_ID} must be a numeric id, got '{raw}'"))
            })?;
            self.identity.own_id = Some(own_id);
        }
        if let Some(dir) = lookup(ENV_DATA_DIR) {
            self.identity.data_dir = Some(PathBuf::from(dir));
        }
        Ok(self)
    }

    pub fn with_process_env(self) -> Result<Self, ConfigError> {
        self.with_env(|name| std::env::var(name).ok())
    }

    pub fn with_overrides(mut self, overrides: &CliOverrides) -> Self {
        if let Some(ref url) = overrides.directory_url {
            self.directory.url = url.clone();
        }
        if let Some(own_id) = overrides.own_id {
            self.identity.own_id = Some(own_id);
        }
        if let Some(ref dir) = overrides.data_dir {
            self.identity.data_dir = Some(dir.clone());
        }
        if overrides.debug {
            self.logging.level = "debug".to_string();
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log level '{}'. Valid values: {:?}",
                self.logging.level, valid_levels
            )));
        }

        let valid_bindings = ["none", "peer_ids"];
        if !valid_bindings.contains(&self.crypto.kdf_binding.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid kdf_binding '{}'. Valid values: {:?}",
                self.crypto.kdf_binding, valid_bindings
            )));
        }

        if self.directory.timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "timeout_seconds must be greater than 0".to_string(),
            ));
        }

        let url = &self.directory.url;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::ValidationError(format!(
                "Invalid directory URL '{url}': must start with http:// or https://"
            )));
        }

        Ok(())
    }

    pub fn own_id(&self) -> Option<PeerId> {
        self.identity.own_id.map(PeerId)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.identity
            .data_dir
            .clone()
            .or_else(|| Self::project_dirs().map(|dirs| dirs.data_dir().to_path_buf()))
            .unwrap_or_else(|| PathBuf::from(".shroud"))
    }

    pub fn sessions_db_path(&self) -> PathBuf {
        self.data_dir().join(SESSIONS_DB_FILE)
    }

    pub fn kdf_mode(&self) -> KdfMode {
        match self.crypto.kdf_binding.as_str() {
            "peer_ids" => KdfMode::PeerIds,
            _ => KdfMode::Unbound,
        }
    }

    pub fn http_directory(&self) -> HttpDirectoryConfig {
        HttpDirectoryConfig {
            base_url: self.directory.url.clone(),
            timeout: Duration::from_secs(self.directory.timeout_seconds),
            key_ttl: Duration::from_secs(self.directory.key_cache_ttl_seconds),
            date_ttl: Duration::from_secs(self.directory.date_cache_ttl_seconds),
        }
    }

    pub fn sample_toml() -> &'static str {
        r#"# shroud configuration

[identity]
# This node's numeric id on the messaging platform
# own_id = 123456789
# Directory for identity keys and the session database (empty = default location)
# data_dir = ""

[directory]
# Public-key directory base URL
url = "http://localhost:8000"
# Request timeout in seconds
timeout_seconds = 10
# How long directory answers are cached, in seconds (0 disables caching)
key_cache_ttl_seconds = 100
date_cache_ttl_seconds = 120

[crypto]
# "none" or "peer_ids"; every peer must use the same value
kdf_binding = "none"

[logging]
# Log level: "error", "warn", "info", "debug", "trace"
level = "warn"
"#
    }
}
