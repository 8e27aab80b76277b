//! Server configuration file support.
//!
//! Settings come from built-in defaults, then the global file
//! (`~/.fanout/config.toml`), then the local file (`./fanout.toml`), then
//! `FANOUT_*` environment variables. Later sources win.

use fanout_core::BatchConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_address")]
    pub address: String,

    /// Route that accepts batch submissions
    #[serde(default = "default_batch_path")]
    pub batch_path: String,

    /// Base URL sub-requests are forwarded to
    #[serde(default = "default_upstream_url")]
    pub upstream_url: String,

    /// Per sub-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Largest accepted batch body in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Batch execution defaults
    #[serde(default)]
    pub batch: BatchConfig,
}

fn default_address() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_batch_path() -> String {
    "/batch".to_string()
}

fn default_upstream_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

pub(crate) fn default_max_body_bytes() -> usize {
    1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            batch_path: default_batch_path(),
            upstream_url: default_upstream_url(),
            request_timeout_secs: default_request_timeout_secs(),
            max_body_bytes: default_max_body_bytes(),
            batch: BatchConfig::default(),
        }
    }
}

/// A configuration file. Every field is optional so files can be layered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Listen address
    #[serde(default)]
    pub address: Option<String>,

    /// Batch route
    #[serde(default)]
    pub batch_path: Option<String>,

    /// Upstream base URL
    #[serde(default)]
    pub upstream_url: Option<String>,

    /// Timeout in seconds
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,

    /// Body size cap in bytes
    #[serde(default)]
    pub max_body_bytes: Option<usize>,

    /// Batch execution overrides
    #[serde(default)]
    pub batch: BatchFileConfig,
}

/// The `[batch]` table of a configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFileConfig {
    /// Default execution mode
    #[serde(default)]
    pub parallel: Option<bool>,

    /// In-flight cap for parallel batches
    #[serde(default)]
    pub max_concurrency: Option<usize>,
}

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found.
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    /// Failed to read configuration file.
    #[error("Failed to read configuration file: {0}")]
    ReadError(String),

    /// Failed to parse configuration file.
    #[error("Failed to parse configuration file: {0}")]
    ParseError(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

impl ConfigFile {
    /// Load a configuration file from TOML.
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))
    }
}

impl ServerConfig {
    /// Load configuration from a single TOML file on top of the defaults.
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let mut config = Self::default();
        config.merge(&ConfigFile::load_from_file(path)?);
        config.validate()?;
        Ok(config)
    }

    /// Get default global configuration file path.
    pub fn default_global_path() -> PathBuf {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".fanout")
            .join("config.toml")
    }

    /// Get default local configuration file path.
    pub fn default_local_path() -> PathBuf {
        PathBuf::from("fanout.toml")
    }

    /// Discover and load configuration.
    ///
    /// Loads the global then the local configuration file, skipping files
    /// that do not exist, and applies environment overrides last.
    pub fn discover_and_load() -> ConfigResult<Self> {
        let mut config =
            Self::discover_from(&Self::default_global_path(), &Self::default_local_path())?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Layers `global` then `local` over the defaults. Missing files are skipped.
    pub fn discover_from(global: &Path, local: &Path) -> ConfigResult<Self> {
        let mut config = Self::default();

        for path in [global, local] {
            match ConfigFile::load_from_file(path) {
                Ok(file) => {
                    debug!(path = %path.display(), "Loaded configuration file");
                    config.merge(&file);
                }
                Err(ConfigError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(config)
    }

    /// Merge a configuration file into this one.
    ///
    /// Values from `other` override values in `self` if they are Some.
    pub fn merge(&mut self, other: &ConfigFile) {
        if let Some(ref address) = other.address {
            self.address.clone_from(address);
        }
        if let Some(ref batch_path) = other.batch_path {
            self.batch_path.clone_from(batch_path);
        }
        if let Some(ref upstream_url) = other.upstream_url {
            self.upstream_url.clone_from(upstream_url);
        }
        if let Some(timeout) = other.request_timeout_secs {
            self.request_timeout_secs = timeout;
        }
        if let Some(limit) = other.max_body_bytes {
            self.max_body_bytes = limit;
        }
        if let Some(parallel) = other.batch.parallel {
            self.batch.parallel = parallel;
        }
        if let Some(limit) = other.batch.max_concurrency {
            self.batch.max_concurrency = Some(limit);
        }
    }

    /// Applies `FANOUT_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(address) = lookup("FANOUT_ADDRESS") {
            self.address = address;
        }
        if let Some(batch_path) = lookup("FANOUT_BATCH_PATH") {
            self.batch_path = batch_path;
        }
        if let Some(upstream_url) = lookup("FANOUT_UPSTREAM_URL") {
            self.upstream_url = upstream_url;
        }
        if let Some(limit) = lookup("FANOUT_MAX_BODY_BYTES") {
            self.max_body_bytes = limit.trim().parse::<usize>().map_err(|e| {
                ConfigError::InvalidValue(format!("FANOUT_MAX_BODY_BYTES={}: {}", limit, e))
            })?;
        }
        if let Some(parallel) = lookup("FANOUT_PARALLEL") {
            self.batch.parallel = parse_bool("FANOUT_PARALLEL", &parallel)?;
        }
        if let Some(limit) = lookup("FANOUT_MAX_CONCURRENCY") {
            let limit = limit.trim().parse::<usize>().map_err(|e| {
                ConfigError::InvalidValue(format!("FANOUT_MAX_CONCURRENCY={}: {}", limit, e))
            })?;
            self.batch.max_concurrency = Some(limit);
        }
        Ok(())
    }

    /// Checks every value is usable.
    pub fn validate(&self) -> ConfigResult<()> {
        self.socket_addr()?;
        if !self.batch_path.starts_with('/') {
            return Err(ConfigError::InvalidValue(format!(
                "batch_path must start with '/': {}",
                self.batch_path
            )));
        }
        reqwest::Url::parse(&self.upstream_url).map_err(|e| {
            ConfigError::InvalidValue(format!("upstream_url {}: {}", self.upstream_url, e))
        })?;
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.max_body_bytes == 0 {
            return Err(ConfigError::InvalidValue("max_body_bytes must be at least 1".to_string()));
        }
        self.batch.validate().map_err(|e| ConfigError::InvalidValue(e.to_string()))
    }

    /// The listen address as a socket address.
    pub fn socket_addr(&self) -> ConfigResult<SocketAddr> {
        self.address
            .parse()
            .map_err(|e| ConfigError::InvalidValue(format!("address {}: {}", self.address, e)))
    }

    /// Per sub-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_bool(key: &str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue(format!("{}={}: expected a boolean", key, value))),
    }
}
