//! Snapshot configuration via `arbor.toml`
//!
//! On first open of a store directory a default `arbor.toml` is written next
//! to the database files. Edit it to change batch sizes or stream-export
//! defaults; per-call [`SnapshotOptions`] still override the file.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Config file name placed in the store directory.
pub const CONFIG_FILE_NAME: &str = "arbor.toml";

/// Default rows per committed batch
pub const DEFAULT_BATCH_SIZE: usize = 200_000;

/// Default number of imported nodes between progress logs
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 1_000_000;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config file '{}': {source}", path.display())]
    Read {
        /// File path
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("Failed to parse config file '{}': {message}", path.display())]
    Parse {
        /// File path
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// Config could not be rendered as TOML
    #[error("Failed to serialize config: {0}")]
    Serialize(String),

    /// Config file could not be written
    #[error("Failed to write config file '{}': {source}", path.display())]
    Write {
        /// File path
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },

    /// A field holds an unusable value
    #[error("Invalid {field}: {reason}")]
    Invalid {
        /// Field name
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

/// Per-call options of stream-driven export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotOptions {
    /// Keep leaf values in the stored rows. Hashes always cover the value.
    pub store_leaf_values: bool,
    /// Start a fresh internal-node shard before writing
    pub save_tree: bool,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        SnapshotOptions {
            store_leaf_values: true,
            save_tree: true,
        }
    }
}

/// Snapshot configuration loaded from `arbor.toml`.
///
/// # Example
///
/// ```toml
/// batch_size = 200000
/// progress_interval = 1000000
/// store_leaf_values = true
/// save_tree = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Rows staged per transaction before a flush
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Imported nodes between progress log lines
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,
    /// Default for [`SnapshotOptions::store_leaf_values`]
    #[serde(default = "default_true")]
    pub store_leaf_values: bool,
    /// Default for [`SnapshotOptions::save_tree`]
    #[serde(default = "default_true")]
    pub save_tree: bool,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_progress_interval() -> u64 {
    DEFAULT_PROGRESS_INTERVAL
}

fn default_true() -> bool {
    true
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        SnapshotConfig {
            batch_size: DEFAULT_BATCH_SIZE,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            store_leaf_values: true,
            save_tree: true,
        }
    }
}

impl SnapshotConfig {
    /// Set the batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the import progress interval
    pub fn with_progress_interval(mut self, progress_interval: u64) -> Self {
        self.progress_interval = progress_interval;
        self
    }

    /// Set whether stream export keeps leaf values by default
    pub fn with_store_leaf_values(mut self, store: bool) -> Self {
        self.store_leaf_values = store;
        self
    }

    /// Set whether stream export starts a fresh shard by default
    pub fn with_save_tree(mut self, save: bool) -> Self {
        self.save_tree = save;
        self
    }

    /// Stream-export options implied by this config
    pub fn options(&self) -> SnapshotOptions {
        SnapshotOptions {
            store_leaf_values: self.store_leaf_values,
            save_tree: self.save_tree,
        }
    }

    /// Reject values the writer and importer cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "batch_size",
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.progress_interval == 0 {
            return Err(ConfigError::Invalid {
                field: "progress_interval",
                reason: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Arbor snapshot configuration
#
# Rows committed per transaction during export (default: 200000).
# Cancellation is checked once per batch.
batch_size = 200000

# Imported nodes between progress log lines (default: 1000000)
progress_interval = 1000000

# Stream-export defaults; per-call options override these.
# store_leaf_values = false drops leaf values from stored rows (hashes are unchanged).
# save_tree = true starts a new internal-node shard for each stream export.
store_leaf_values = true
save_tree = true
"#
    }

    /// Read, parse and validate config from a file path.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: SnapshotConfig =
            toml::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<(), ConfigError> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}
