//! Harvester configuration, persisted as TOML.
//!
//! The file lives at `$XDG_CONFIG_HOME/biblio-harvest/config.toml` unless a
//! path is given on the command line. Every field has a default, so an empty
//! or missing file yields a usable configuration; command-line flags override
//! file values after loading.

use std::path::{Path, PathBuf};
use std::time::Duration;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from loading or validating configuration.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(harvest::config::read),
        help("Ensure the config file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    #[diagnostic(
        code(harvest::config::parse),
        help("Check the TOML syntax. Print a valid file with `biblio-harvest config`.")
    )]
    Parse { path: String, message: String },

    #[error("invalid configuration: {message}")]
    #[diagnostic(
        code(harvest::config::invalid),
        help("Fix the named setting in the config file or on the command line.")
    )]
    Invalid { message: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// How to reach the metadata source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Endpoint of the list protocol.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Metadata format requested on fresh queries.
    #[serde(default = "default_metadata_format")]
    pub metadata_format: String,
    /// Minimum spacing between requests, in milliseconds.
    #[serde(default = "default_min_request_interval_ms")]
    pub min_request_interval_ms: u64,
    /// Per-request timeout, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_base_url() -> String {
    "http://localhost:8080/oai".into()
}
fn default_metadata_format() -> String {
    "arXiv".into()
}
fn default_min_request_interval_ms() -> u64 {
    3_000
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_user_agent() -> String {
    concat!("biblio-harvest/", env!("CARGO_PKG_VERSION")).into()
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            metadata_format: default_metadata_format(),
            min_request_interval_ms: default_min_request_interval_ms(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl SourceConfig {
    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Tuning for the harvest loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestSettings {
    /// Records per upsert batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pages between checkpoint saves.
    #[serde(default = "default_checkpoint_every_pages")]
    pub checkpoint_every_pages: u32,
    /// Pages between progress log lines.
    #[serde(default = "default_progress_every_pages")]
    pub progress_every_pages: u32,
    /// Wait after a rate-limit answer without a usable retry hint.
    #[serde(default = "default_rate_limit_cooldown_secs")]
    pub rate_limit_cooldown_secs: u64,
    /// Wait after a transient protocol error.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    /// Attempts at a page whose body does not parse before the run fails.
    #[serde(default = "default_max_parse_retries")]
    pub max_parse_retries: u32,
    /// Flush attempts while the record store is down before the run fails.
    #[serde(default = "default_max_sink_retries")]
    pub max_sink_retries: u32,
    /// Records per run (0 = unlimited).
    #[serde(default)]
    pub max_records: u64,
}

fn default_batch_size() -> usize {
    500
}
fn default_checkpoint_every_pages() -> u32 {
    5
}
fn default_progress_every_pages() -> u32 {
    10
}
fn default_rate_limit_cooldown_secs() -> u64 {
    30
}
fn default_retry_delay_secs() -> u64 {
    10
}
fn default_max_parse_retries() -> u32 {
    3
}
fn default_max_sink_retries() -> u32 {
    5
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            checkpoint_every_pages: default_checkpoint_every_pages(),
            progress_every_pages: default_progress_every_pages(),
            rate_limit_cooldown_secs: default_rate_limit_cooldown_secs(),
            retry_delay_secs: default_retry_delay_secs(),
            max_parse_retries: default_max_parse_retries(),
            max_sink_retries: default_max_sink_retries(),
            max_records: 0,
        }
    }
}

/// Where harvested data lives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory; defaults to `$XDG_DATA_HOME/biblio-harvest`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

/// Complete harvester configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarvestConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub harvest: HarvestSettings,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl HarvestConfig {
    /// Read and validate a config file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config = Self::from_toml(&text).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })?;
        Ok(config)
    }

    /// Like [`HarvestConfig::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Parse and validate TOML text.
    pub fn from_toml(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: "<inline>".into(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid {
            message: format!("cannot serialize configuration: {e}"),
        })
    }

    /// Validate this configuration, returning an error if invalid.
    pub fn validate(&self) -> ConfigResult<()> {
        let url = &self.source.base_url;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                message: format!("source.base_url must start with http:// or https://, got \"{url}\""),
            });
        }
        if self.source.metadata_format.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "source.metadata_format must not be empty".into(),
            });
        }
        if self.source.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "source.timeout_secs must be non-zero".into(),
            });
        }
        if self.harvest.batch_size == 0 {
            return Err(ConfigError::Invalid {
                message: "harvest.batch_size must be at least 1".into(),
            });
        }
        if self.harvest.checkpoint_every_pages == 0 {
            return Err(ConfigError::Invalid {
                message: "harvest.checkpoint_every_pages must be at least 1".into(),
            });
        }
        Ok(())
    }
}
