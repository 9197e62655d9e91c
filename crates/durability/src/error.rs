//! Snapshot error types
//!
//! Failures fall into five groups:
//! - structural corruption: `Corrupt`, `Core`
//! - integrity failure: `HashMismatch`
//! - storage failure: `Storage`, `Commit`, `Io`
//! - cancellation: `Cancelled`
//! - catalog miss: `NotFound`
//!
//! None are retried internally.

use std::io;

use arbor_core::{CoreError, NodeKey};
use arbor_storage::StorageError;
use thiserror::Error;

use crate::config::ConfigError;

/// Result type alias for snapshot operations
pub type SnapshotResult<T> = std::result::Result<T, SnapshotError>;

/// Errors raised by export, import and catalog operations
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Persisted rows do not form the expected pre-order sequence
    #[error("Corrupt snapshot at ordinal {ordinal}: {reason}")]
    Corrupt {
        /// Ordinal where the problem was found
        ordinal: u64,
        /// What was wrong
        reason: String,
    },

    /// Node could not be decoded, hashed or linked
    #[error("Node error: {0}")]
    Core(#[from] CoreError),

    /// Recomputed hash differs from the stored one
    #[error("Hash mismatch at node {node_key}: expected={expected}, got={actual}")]
    HashMismatch {
        /// Node whose hash failed
        node_key: NodeKey,
        /// Stored hash, hex
        expected: String,
        /// Recomputed hash, hex
        actual: String,
    },

    /// Store operation failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Batch commit failed on one or both databases
    #[error(
        "Commit failed: changelog={}, tree={}",
        describe(.changelog),
        describe(.tree)
    )]
    Commit {
        /// Changelog commit failure
        changelog: Option<StorageError>,
        /// Tree commit failure
        tree: Option<StorageError>,
    },

    /// Export was cancelled; the generation must be discarded
    #[error("Snapshot cancelled at ordinal {ordinal}")]
    Cancelled {
        /// Rows staged when cancellation was observed
        ordinal: u64,
    },

    /// No complete generation at or before the target version
    #[error("No snapshot found at or before version {target} in {path}")]
    NotFound {
        /// Requested version
        target: i64,
        /// Store location
        path: String,
    },

    /// A complete generation already exists for this version
    #[error("Snapshot of version {version} already exists")]
    GenerationExists {
        /// Version
        version: i64,
    },

    /// Configuration rejected
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Filesystem failure outside a store
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

fn describe(err: &Option<StorageError>) -> String {
    match err {
        Some(err) => err.to_string(),
        None => "ok".to_string(),
    }
}

impl SnapshotError {
    /// Create a corruption error
    pub fn corrupt(ordinal: u64, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            ordinal,
            reason: reason.into(),
        }
    }

    /// True if the operation was cancelled rather than failed
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// True for a catalog miss
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True for integrity and structural failures of persisted data
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::Corrupt { .. } | Self::Core(_) | Self::HashMismatch { .. }
        )
    }
}
