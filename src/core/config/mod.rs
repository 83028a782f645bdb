//! core::config
//!
//! Configuration schema and loading.
//!
//! # Locations
//!
//! Searched in order, first existing file wins:
//! 1. `--config <path>` (must exist)
//! 2. `$GH1000_CONFIG` if set
//! 3. `$XDG_CONFIG_HOME/gh1000/config.toml`
//! 4. `~/.gh1000/config.toml`
//!
//! With no file found, defaults are used.
//!
//! # Example
//!
//! ```no_run
//! use gh1000::core::config::Config;
//!
//! let result = Config::load(None).unwrap();
//! let config = result.config;
//!
//! println!("Store: {}", config.api_url());
//! println!("Key: {}", config.key_name());
//! ```

pub mod schema;

pub use schema::{FileConfig, IndexConfig, PipelineConfig, StoreConfig, CURRENT_VERSION};

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "GH1000_CONFIG";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("config file '{0}' does not exist")]
    NotFound(PathBuf),

    #[error("unsupported config version {0} (expected {CURRENT_VERSION})")]
    UnsupportedVersion(u32),

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Result of loading configuration.
#[derive(Debug)]
pub struct ConfigLoadResult {
    /// The loaded configuration.
    pub config: Config,
    /// Path the configuration was read from, if any.
    pub path: Option<PathBuf>,
}

/// Loaded configuration with accessor methods that apply defaults.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub file: FileConfig,
}

impl Config {
    /// Load configuration from `explicit` or the default locations.
    ///
    /// # Errors
    ///
    /// Returns an error if `explicit` does not exist, or if a config file
    /// exists but cannot be read, parsed or validated.
    pub fn load(explicit: Option<&Path>) -> Result<ConfigLoadResult, ConfigError> {
        let path = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound(path.to_path_buf()));
                }
                Some(path.to_path_buf())
            }
            None => Self::search(|name| std::env::var(name).ok(), dirs::home_dir()),
        };

        let file = match &path {
            Some(path) => Self::read_config(path)?,
            None => FileConfig::default(),
        };
        file.validate()?;

        Ok(ConfigLoadResult {
            config: Config { file },
            path,
        })
    }

    /// Find the first existing config file in the default locations.
    fn search(env: impl Fn(&str) -> Option<String>, home: Option<PathBuf>) -> Option<PathBuf> {
        let mut candidates = Vec::new();
        if let Some(path) = env(CONFIG_ENV) {
            candidates.push(PathBuf::from(path));
        }
        if let Some(xdg_home) = env("XDG_CONFIG_HOME") {
            candidates.push(PathBuf::from(xdg_home).join("gh1000/config.toml"));
        }
        if let Some(home) = home {
            candidates.push(home.join(".gh1000/config.toml"));
        }
        candidates.into_iter().find(|p| p.exists())
    }

    /// Read and parse a config file.
    fn read_config(path: &Path) -> Result<FileConfig, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Base URL of the store RPC API.
    pub fn api_url(&self) -> &str {
        &self.file.store.api_url
    }

    /// Name of the key the index is published under.
    pub fn key_name(&self) -> &str {
        &self.file.index.key_name
    }

    /// Validity lifetime of published name records.
    pub fn record_lifetime(&self) -> Duration {
        self.file.index.lifetime()
    }

    /// Refresh interval of published name records.
    pub fn record_ttl(&self) -> Duration {
        self.file.index.ttl()
    }

    /// Directory holding working clones.
    ///
    /// Defaults to `<cache dir>/gh1000`, or `./gh1000-workspace` when the
    /// platform has no cache directory.
    pub fn workspace(&self) -> PathBuf {
        if let Some(ws) = &self.file.pipeline.workspace {
            return ws.clone();
        }
        dirs::cache_dir()
            .map(|d| d.join("gh1000"))
            .unwrap_or_else(|| PathBuf::from("gh1000-workspace"))
    }

    /// Targets file, if configured.
    pub fn targets(&self) -> Option<&Path> {
        self.file.pipeline.targets.as_deref()
    }

    /// Whether clones survive the run.
    pub fn keep_clones(&self) -> bool {
        self.file.pipeline.keep_clones
    }

    /// Configured shuffle seed.
    pub fn seed(&self) -> Option<u64> {
        self.file.pipeline.seed
    }
}
