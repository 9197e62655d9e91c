//! Live tree consumed by tree-driven export
//!
//! Mutation (insert/delete/rebalance) lives outside this crate. The exporter
//! only needs to select a version and walk its materialized root.

use std::collections::BTreeMap;

use crate::error::{CoreError, CoreResult};
use crate::node::Node;

/// A tree with selectable versions
pub trait VersionedTree {
    /// Make `version` the current root
    fn load_version(&mut self, version: i64) -> CoreResult<()>;

    /// Root of the loaded version; `None` for an empty tree
    fn root(&self) -> Option<&Node>;
}

/// In-memory tree holding one fully materialized root per version
#[derive(Debug, Default)]
pub struct MemTree {
    roots: BTreeMap<i64, Option<Node>>,
    loaded: Option<i64>,
}

impl MemTree {
    /// Create a tree with no versions
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the root of `version`, replacing any previous one
    pub fn insert_version(&mut self, version: i64, root: Option<Node>) {
        self.roots.insert(version, root);
    }

    /// Known versions in ascending order
    pub fn versions(&self) -> impl Iterator<Item = i64> + '_ {
        self.roots.keys().copied()
    }

    /// Currently loaded version
    pub fn loaded_version(&self) -> Option<i64> {
        self.loaded
    }
}

impl VersionedTree for MemTree {
    fn load_version(&mut self, version: i64) -> CoreResult<()> {
        if !self.roots.contains_key(&version) {
            return Err(CoreError::VersionNotFound { version });
        }
        self.loaded = Some(version);
        Ok(())
    }

    fn root(&self) -> Option<&Node> {
        self.loaded
            .and_then(|version| self.roots.get(&version))
            .and_then(Option::as_ref)
    }
}
