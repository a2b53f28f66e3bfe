//! Layered configuration.
//!
//! Settings are merged with figment, lowest priority first:
//!
//! 1. Built-in defaults
//! 2. TOML file (platform config dir, or `--config PATH`)
//! 3. Environment variables prefixed with `FINDDUP_`
//! 4. CLI flags
//!
//! ```toml
//! # ~/.config/finddup/config.toml
//! memory_budget = 536870912
//! max_open_files = 64
//! io_threads = 2
//! ignore_names = [".DS_Store", "Thumbs.db", "desktop.ini"]
//! ```

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::cli::Cli;
use crate::duplicates::resolver::{DEFAULT_FIRST_CHUNK, DEFAULT_MAX_CHUNK, DEFAULT_MIN_CHUNK};
use crate::duplicates::FinderConfig;
use crate::scanner::{CatalogConfig, DEFAULT_IGNORE_NAMES};

/// Prefix of environment variables read into the configuration.
pub const ENV_PREFIX: &str = "FINDDUP_";

/// Errors raised while loading configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// A file, environment value or default could not be parsed.
    #[error("Invalid configuration: {0}")]
    Extract(#[from] figment::Error),

    /// A configuration file named on the command line does not exist.
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    /// Values parsed but are out of range.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Total bytes of chunk buffers across all workers
    pub memory_budget: u64,
    /// Open-handle ceiling across all workers
    pub max_open_files: usize,
    /// Bucket worker-pool size
    pub io_threads: usize,
    /// Chunk size of the first pass
    pub first_chunk_size: usize,
    /// Smallest viable chunk
    pub min_chunk_size: usize,
    /// Cap on later-pass chunks
    pub max_chunk_size: usize,
    /// Exact basenames left out of comparison
    pub ignore_names: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            memory_budget: 1024 * 1024 * 1024,
            max_open_files: 128,
            io_threads: 4,
            first_chunk_size: DEFAULT_FIRST_CHUNK,
            min_chunk_size: DEFAULT_MIN_CHUNK,
            max_chunk_size: DEFAULT_MAX_CHUNK,
            ignore_names: DEFAULT_IGNORE_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Config {
    /// Default platform-specific configuration file, if a home directory
    /// can be determined.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "finddup", "finddup")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Build the provider stack: defaults, then `path` (if any), then env.
    ///
    /// A missing TOML file contributes nothing.
    #[must_use]
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Load configuration from `explicit` or the default location.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] if `explicit` names a missing
    /// file, [`ConfigError::Extract`] if a file or variable is malformed,
    /// and [`ConfigError::Invalid`] if values are out of range.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => {
                if !path.is_file() {
                    return Err(ConfigError::NotFound(path.to_path_buf()));
                }
                Some(path.to_path_buf())
            }
            None => Self::default_path(),
        };

        if let Some(ref p) = path {
            log::debug!("Loading configuration from {}", p.display());
        }
        Self::from_figment(&Self::figment(path.as_deref()))
    }

    /// Extract and validate a configuration from any figment.
    ///
    /// # Errors
    ///
    /// See [`Config::load`].
    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory_budget == 0 {
            return Err(ConfigError::Invalid(
                "memory_budget must be greater than 0".to_string(),
            ));
        }
        if self.max_open_files == 0 {
            return Err(ConfigError::Invalid(
                "max_open_files must be at least 1".to_string(),
            ));
        }
        if self.io_threads == 0 {
            return Err(ConfigError::Invalid(
                "io_threads must be at least 1".to_string(),
            ));
        }
        if self.min_chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "min_chunk_size must be at least 1".to_string(),
            ));
        }
        if self.first_chunk_size < self.min_chunk_size
            || self.max_chunk_size < self.min_chunk_size
        {
            return Err(ConfigError::Invalid(format!(
                "first_chunk_size ({}) and max_chunk_size ({}) must not be below min_chunk_size ({})",
                self.first_chunk_size, self.max_chunk_size, self.min_chunk_size
            )));
        }
        Ok(())
    }

    /// Apply limits given on the command line.
    pub fn apply_cli_overrides(&mut self, cli: &Cli) {
        if let Some(bytes) = cli.memory_budget {
            self.memory_budget = bytes;
        }
        if let Some(count) = cli.max_open_files {
            self.max_open_files = count;
        }
        if let Some(threads) = cli.io_threads {
            self.io_threads = threads;
        }
    }

    /// Pipeline configuration for these settings.
    #[must_use]
    pub fn finder_config(&self) -> FinderConfig {
        FinderConfig::default()
            .with_io_threads(self.io_threads)
            .with_memory_budget(self.memory_budget)
            .with_max_open_files(self.max_open_files)
            .with_chunk_sizes(
                self.first_chunk_size,
                self.min_chunk_size,
                self.max_chunk_size,
            )
            .with_catalog_config(CatalogConfig::with_ignore_names(
                self.ignore_names.iter().cloned(),
            ))
    }
}
