//! Error types for the node model
//!
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use crate::node_key::NodeKey;
use std::io;
use thiserror::Error;

/// Result type alias for node model operations
pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Errors raised while building, hashing or decoding nodes
#[derive(Debug, Error)]
pub enum CoreError {
    /// Node bytes could not be decoded
    #[error("Decode error: {reason}")]
    Decode {
        /// What was wrong with the bytes
        reason: String,
    },

    /// Node has no hash yet, so it cannot be encoded
    #[error("Node {node_key} has no hash")]
    MissingHash {
        /// Node that lacks a hash
        node_key: NodeKey,
    },

    /// Internal node hashed before its children were
    #[error("Node {node_key} cannot be hashed: {side} child hash unavailable")]
    MissingChildHash {
        /// Node being hashed
        node_key: NodeKey,
        /// Which child was missing ("left" or "right")
        side: &'static str,
    },

    /// Leaf hashed without a value
    #[error("Leaf {node_key} has no value to hash")]
    MissingValue {
        /// Leaf being hashed
        node_key: NodeKey,
    },

    /// Child is only known by key, not held in memory
    #[error("Node {node_key} is not materialized")]
    NotMaterialized {
        /// Key of the missing node
        node_key: NodeKey,
    },

    /// Requested tree version does not exist
    #[error("Version {version} not found")]
    VersionNotFound {
        /// Requested version
        version: i64,
    },

    /// Tree shape or linkage is inconsistent
    #[error("Invalid tree: {0}")]
    InvalidTree(String),

    /// I/O error while encoding
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CoreError {
    /// Create a decode error
    pub fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
        }
    }

    /// Create an invalid tree error
    pub fn invalid_tree(reason: impl Into<String>) -> Self {
        Self::InvalidTree(reason.into())
    }
}
