//! Persisted table layout
//!
//! Table names are part of the on-disk contract:
//!
//! | Table | Database | Columns |
//! |-------|----------|---------|
//! | `snapshot_<version>` | changelog | `ordinal, version, sequence, bytes` |
//! | `leaf` | changelog | `generation, version, sequence, bytes` |
//! | `snapshot_marker` | changelog | `version, row_count, root_hash` |
//! | `tree_<shard>` | tree | `generation, version, sequence, bytes` |
//! | `shard_versions` | tree | `version, shard_id` |

use std::fmt;
use std::str::FromStr;

use arbor_core::{NodeHash, NodeKey};

use crate::error::StorageError;

const SNAPSHOT_PREFIX: &str = "snapshot_";
const TREE_PREFIX: &str = "tree_";

/// A table in the persisted layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TableName {
    /// Compact per-generation table, one row per node in pre-order
    Snapshot(i64),
    /// Append-only leaf table
    Leaf,
    /// Sharded internal-node table
    Tree(u32),
    /// Completion markers, one row per finished generation
    SnapshotMarker,
    /// Version to shard registry
    ShardVersions,
}

/// Row shape of a table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// `(ordinal, version, sequence, bytes)`
    Ordinal,
    /// `(generation, version, sequence, bytes)`
    Node,
    /// `(version, row_count, root_hash)`
    Marker,
    /// `(version, shard_id)`
    ShardVersion,
}

impl TableName {
    /// Row shape stored in this table
    pub fn kind(&self) -> TableKind {
        match self {
            TableName::Snapshot(_) => TableKind::Ordinal,
            TableName::Leaf | TableName::Tree(_) => TableKind::Node,
            TableName::SnapshotMarker => TableKind::Marker,
            TableName::ShardVersions => TableKind::ShardVersion,
        }
    }

    /// Name of the lookup index over this table
    pub fn index_name(&self) -> String {
        match self {
            TableName::Snapshot(version) => format!("snapshot_{}_idx", version),
            TableName::Tree(shard) => format!("tree_idx_{}", shard),
            other => format!("{}_idx", other),
        }
    }

    /// Generation version, for compact tables
    pub fn snapshot_version(&self) -> Option<i64> {
        match self {
            TableName::Snapshot(version) => Some(*version),
            _ => None,
        }
    }

    /// Shard id, for internal-node tables
    pub fn shard_id(&self) -> Option<u32> {
        match self {
            TableName::Tree(shard) => Some(*shard),
            _ => None,
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableName::Snapshot(version) => write!(f, "{}{}", SNAPSHOT_PREFIX, version),
            TableName::Leaf => f.write_str("leaf"),
            TableName::Tree(shard) => write!(f, "{}{}", TREE_PREFIX, shard),
            TableName::SnapshotMarker => f.write_str("snapshot_marker"),
            TableName::ShardVersions => f.write_str("shard_versions"),
        }
    }
}

impl FromStr for TableName {
    type Err = StorageError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let invalid = || StorageError::InvalidTableName {
            name: name.to_string(),
        };
        match name {
            "leaf" => return Ok(TableName::Leaf),
            "snapshot_marker" => return Ok(TableName::SnapshotMarker),
            "shard_versions" => return Ok(TableName::ShardVersions),
            _ => {}
        }
        if let Some(version) = name.strip_prefix(SNAPSHOT_PREFIX) {
            let version = version.parse::<i64>().map_err(|_| invalid())?;
            return Ok(TableName::Snapshot(version));
        }
        if let Some(shard) = name.strip_prefix(TREE_PREFIX) {
            let shard = shard.parse::<u32>().map_err(|_| invalid())?;
            return Ok(TableName::Tree(shard));
        }
        Err(invalid())
    }
}

/// One row of a compact table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrdinalRow {
    /// Pre-order position within the generation
    pub ordinal: u64,
    /// Identity the bytes are stored under
    pub node_key: NodeKey,
    /// Encoded node
    pub bytes: Vec<u8>,
}

/// Completion record of a generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotMarker {
    /// Generation version
    pub version: i64,
    /// Rows written to the compact table
    pub row_count: u64,
    /// Root hash; `None` for an empty tree
    pub root_hash: Option<NodeHash>,
}
