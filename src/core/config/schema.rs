//! core::config::schema
//!
//! Configuration schema types.
//!
//! # Validation
//!
//! Config values are validated after parsing: the document version must be
//! supported, the store endpoint must be an http(s) URL and the name record
//! parameters must be non-zero.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// The only configuration document version this build understands.
pub const CURRENT_VERSION: u32 = 1;

/// Top-level configuration document.
///
/// # Example
///
/// ```toml
/// version = 1
///
/// [store]
/// api_url = "http://127.0.0.1:5001"
///
/// [index]
/// key_name = "gh1000"
/// lifetime_hours = 2400
/// ttl_seconds = 3600
///
/// [pipeline]
/// workspace = "/var/lib/gh1000"
/// targets = "/etc/gh1000/targets.json"
/// keep_clones = true
/// seed = 42
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Schema version of this document.
    pub version: u32,

    /// Content-addressed store endpoint.
    pub store: StoreConfig,

    /// Name record the index is published under.
    pub index: IndexConfig,

    /// Archive run settings.
    pub pipeline: PipelineConfig,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            store: StoreConfig::default(),
            index: IndexConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl FileConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnsupportedVersion` for an unknown schema
    /// version and `ConfigError::InvalidValue` for any other bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != CURRENT_VERSION {
            return Err(ConfigError::UnsupportedVersion(self.version));
        }
        self.store.validate()?;
        self.index.validate()?;
        Ok(())
    }
}

/// Store endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Base URL of the Kubo RPC API (without the `/api/v0` suffix).
    pub api_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:5001".to_string(),
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let parsed = url::Url::parse(&self.api_url).map_err(|e| {
            ConfigError::InvalidValue(format!("invalid store api_url '{}': {}", self.api_url, e))
        })?;
        match parsed.scheme() {
            "http" | "https" => Ok(()),
            other => Err(ConfigError::InvalidValue(format!(
                "store api_url must be http or https, got '{}'",
                other
            ))),
        }
    }
}

/// Index name record settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct IndexConfig {
    /// Name of the store key the index is published under.
    pub key_name: String,

    /// Validity lifetime of a published name record, in hours.
    pub lifetime_hours: u64,

    /// Refresh interval hint of a published name record, in seconds.
    pub ttl_seconds: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            key_name: "gh1000".to_string(),
            lifetime_hours: 2400,
            ttl_seconds: 3600,
        }
    }
}

impl IndexConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.key_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "index key_name cannot be empty".to_string(),
            ));
        }
        if self.lifetime_hours == 0 {
            return Err(ConfigError::InvalidValue(
                "index lifetime_hours must be greater than zero".to_string(),
            ));
        }
        if self.ttl_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "index ttl_seconds must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Record lifetime as a duration.
    pub fn lifetime(&self) -> Duration {
        Duration::from_secs(self.lifetime_hours * 3600)
    }

    /// Record ttl as a duration.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

/// Archive run settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Directory holding working clones. Defaults to the user cache dir.
    pub workspace: Option<PathBuf>,

    /// JSON file listing the repositories to archive.
    pub targets: Option<PathBuf>,

    /// Keep clones between runs so later fetches are incremental.
    pub keep_clones: bool,

    /// Seed for the processing-order shuffle.
    pub seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workspace: None,
            targets: None,
            keep_clones: true,
            seed: None,
        }
    }
}
