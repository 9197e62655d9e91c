//! Snapshot database
//!
//! [`SnapshotDb`] owns the two connections of one store (changelog and tree),
//! the node pool used by imports, the current internal-node shard and the
//! configuration. It is the entry point for every snapshot operation.
//!
//! ## Directory layout
//!
//! ```text
//! <dir>/arbor.toml         configuration
//! <dir>/changelog.sqlite   snapshot_<v>, leaf, snapshot_marker
//! <dir>/tree.sqlite        tree_<shard>, shard_versions
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arbor_core::{CancellationToken, Node, NodePool, SnapshotNode, VersionedTree};
use arbor_storage::{MemoryStore, SqliteConn, StoreConn, TableName};
use tracing::info;

use crate::catalog::{
    list_generations, select_at_or_before, Generation, CHANGELOG_FILE_NAME, TREE_FILE_NAME,
};
use crate::config::{SnapshotConfig, SnapshotOptions, CONFIG_FILE_NAME};
use crate::error::{SnapshotError, SnapshotResult};
use crate::export::{discard_generation, export_stream, export_tree, ExportSummary, ExportTarget};
use crate::import::import_generation;

/// Snapshot store over a changelog and a tree database
pub struct SnapshotDb {
    path: Option<PathBuf>,
    changelog: Box<dyn StoreConn>,
    tree: Box<dyn StoreConn>,
    shard_id: u32,
    pool: Arc<NodePool>,
    config: SnapshotConfig,
}

impl fmt::Debug for SnapshotDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotDb")
            .field("path", &self.path)
            .field("shard_id", &self.shard_id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SnapshotDb {
    /// Open the store in `dir`, creating it and a default `arbor.toml` if needed
    pub fn open(dir: impl AsRef<Path>) -> SnapshotResult<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let config_path = dir.join(CONFIG_FILE_NAME);
        SnapshotConfig::write_default_if_missing(&config_path)?;
        let config = SnapshotConfig::from_file(&config_path)?;
        Self::open_with_config(dir, config)
    }

    /// Open the store in `dir` with an explicit config; `arbor.toml` is ignored
    pub fn open_with_config(dir: impl AsRef<Path>, config: SnapshotConfig) -> SnapshotResult<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let changelog = SqliteConn::open(&dir.join(CHANGELOG_FILE_NAME))?;
        let tree = SqliteConn::open(&dir.join(TREE_FILE_NAME))?;
        let mut db = Self::with_connections(Box::new(changelog), Box::new(tree), config)?;
        db.path = Some(dir.to_path_buf());
        info!(
            target: "arbor::snapshot",
            path = %dir.display(),
            shard = db.shard_id,
            "Opened snapshot store"
        );
        Ok(db)
    }

    /// Store backed by two fresh in-memory databases
    pub fn in_memory(config: SnapshotConfig) -> SnapshotResult<Self> {
        Self::with_connections(
            Box::new(MemoryStore::new().connect()),
            Box::new(MemoryStore::new().connect()),
            config,
        )
    }

    /// Store over caller-supplied connections
    ///
    /// Creates the fixed tables if missing and resumes at the highest
    /// existing shard, or creates `tree_1`.
    pub fn with_connections(
        mut changelog: Box<dyn StoreConn>,
        mut tree: Box<dyn StoreConn>,
        config: SnapshotConfig,
    ) -> SnapshotResult<Self> {
        config.validate()?;
        changelog.ensure_table(&TableName::Leaf)?;
        changelog.ensure_table(&TableName::SnapshotMarker)?;
        tree.ensure_table(&TableName::ShardVersions)?;

        let shard_id = match highest_shard(tree.as_ref())? {
            Some(shard) => shard,
            None => {
                tree.create_table(&TableName::Tree(1))?;
                1
            }
        };

        Ok(SnapshotDb {
            path: None,
            changelog,
            tree,
            shard_id,
            pool: Arc::new(NodePool::default()),
            config,
        })
    }

    /// Store directory, if on disk
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn location(&self) -> String {
        self.path
            .as_ref()
            .map_or_else(|| "<memory>".to_string(), |p| p.display().to_string())
    }

    /// Active configuration
    pub fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    /// Node pool shared by imports
    pub fn pool(&self) -> &Arc<NodePool> {
        &self.pool
    }

    /// Shard internal nodes are currently written to
    pub fn shard_id(&self) -> u32 {
        self.shard_id
    }

    /// Changelog connection
    pub fn changelog(&self) -> &dyn StoreConn {
        self.changelog.as_ref()
    }

    /// Tree connection
    pub fn tree(&self) -> &dyn StoreConn {
        self.tree.as_ref()
    }

    /// Start a new internal-node shard and make it current
    pub fn next_shard(&mut self) -> SnapshotResult<u32> {
        let next = highest_shard(self.tree.as_ref())?.map_or(1, |s| s + 1);
        self.tree.create_table(&TableName::Tree(next))?;
        self.shard_id = next;
        info!(target: "arbor::snapshot", shard = next, "Allocated tree shard");
        Ok(next)
    }

    fn target<'a>(&'a mut self, cancel: &'a CancellationToken) -> ExportTarget<'a> {
        ExportTarget {
            changelog: self.changelog.as_mut(),
            tree: self.tree.as_mut(),
            shard: self.shard_id,
            batch_size: self.config.batch_size,
            cancel,
        }
    }

    /// Freeze version `version` of `tree` as a generation
    pub fn snapshot<T>(
        &mut self,
        cancel: &CancellationToken,
        tree: &mut T,
        version: i64,
    ) -> SnapshotResult<ExportSummary>
    where
        T: VersionedTree + ?Sized,
    {
        tree.load_version(version)?;
        export_tree(self.target(cancel), tree.root(), version)
    }

    /// Write generation `version` from an external pre-order node stream
    ///
    /// Returns the rebuilt root, children released to key-only links.
    pub fn write_snapshot<I>(
        &mut self,
        cancel: &CancellationToken,
        version: i64,
        nodes: I,
        opts: SnapshotOptions,
    ) -> SnapshotResult<(Option<Node>, ExportSummary)>
    where
        I: IntoIterator<Item = SnapshotNode>,
    {
        if opts.save_tree {
            self.next_shard()?;
        }
        export_stream(self.target(cancel), version, nodes, opts.store_leaf_values)
    }

    /// [`SnapshotDb::write_snapshot`] with options from the config
    pub fn write_snapshot_default<I>(
        &mut self,
        cancel: &CancellationToken,
        version: i64,
        nodes: I,
    ) -> SnapshotResult<(Option<Node>, ExportSummary)>
    where
        I: IntoIterator<Item = SnapshotNode>,
    {
        let opts = self.config.options();
        self.write_snapshot(cancel, version, nodes, opts)
    }

    /// Rebuild generation `version`
    ///
    /// `load_leaves` selects verify mode. Only complete generations are read.
    pub fn import_snapshot(&self, version: i64, load_leaves: bool) -> SnapshotResult<Option<Node>> {
        let not_found = || SnapshotError::NotFound {
            target: version,
            path: self.location(),
        };
        if !self.changelog.has_table(&TableName::Snapshot(version))? {
            return Err(not_found());
        }
        let marker = self
            .changelog
            .markers()?
            .into_iter()
            .find(|m| m.version == version)
            .ok_or_else(not_found)?;
        import_generation(
            self.changelog.as_ref(),
            &self.pool,
            &marker,
            load_leaves,
            self.config.progress_interval,
        )
    }

    /// Rebuild the newest complete generation at or before `target`
    ///
    /// Returns the root and the version that was imported.
    pub fn import_most_recent(
        &self,
        target: i64,
        load_leaves: bool,
    ) -> SnapshotResult<(Option<Node>, i64)> {
        let generations = self.generations()?;
        let version = select_at_or_before(&generations, target)
            .map(|g| g.version)
            .ok_or_else(|| SnapshotError::NotFound {
                target,
                path: self.location(),
            })?;
        let root = self.import_snapshot(version, load_leaves)?;
        Ok((root, version))
    }

    /// Every generation, newest first
    pub fn generations(&self) -> SnapshotResult<Vec<Generation>> {
        list_generations(self.changelog.as_ref())
    }

    /// Drop every generation that never got its completion marker
    ///
    /// Returns the discarded versions, ascending. Leaf and shard rows those
    /// exports left behind are deleted along with the compact table.
    pub fn recover(&mut self) -> SnapshotResult<Vec<i64>> {
        let mut discarded: Vec<i64> = self
            .generations()?
            .into_iter()
            .filter(|g| !g.complete)
            .map(|g| g.version)
            .collect();
        discarded.sort_unstable();
        for &version in &discarded {
            discard_generation(self.changelog.as_mut(), self.tree.as_mut(), version)?;
        }
        Ok(discarded)
    }
}

fn highest_shard(tree: &dyn StoreConn) -> SnapshotResult<Option<u32>> {
    Ok(tree
        .table_names()?
        .iter()
        .filter_map(|name| name.parse::<TableName>().ok())
        .filter_map(|table| table.shard_id())
        .max())
}
