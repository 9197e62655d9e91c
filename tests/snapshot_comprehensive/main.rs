//! Snapshot Comprehensive Test Suite
//!
//! End-to-end coverage of snapshot export, import and the catalog against
//! on-disk SQLite stores.
//!
//! ## Modules
//!
//! - `roundtrip`: tree and stream exports rebuilt in both import modes
//! - `corruption`: damaged rows and markers detected on import
//! - `catalog`: generation selection and store discovery
//! - `cancellation`: cancelled exports and clean re-export
//! - `batching`: flush counts and destination row counts
//! - `properties`: randomized structural properties
//!
//! ## Running Tests
//!
//! ```bash
//! # Run the whole suite
//! cargo test --test snapshot_comprehensive
//!
//! # Run one module
//! cargo test --test snapshot_comprehensive corruption::
//!
//! # Run with output
//! cargo test --test snapshot_comprehensive -- --nocapture
//! ```

use std::path::{Path, PathBuf};

use arbor::{
    build_balanced, CancellationToken, Entry, MemTree, Node, SnapshotConfig, SnapshotDb,
    SnapshotNode, VersionedTree,
};
use tempfile::TempDir;

pub mod batching;
pub mod cancellation;
pub mod corruption;
pub mod properties;
pub mod roundtrip;

// =============================================================================
// SHARED TEST UTILITIES
// =============================================================================

/// `n` sorted entries stamped with `version`
pub fn entries(n: usize, version: i64) -> Vec<Entry> {
    (0..n)
        .map(|i| Entry::new(format!("key{:05}", i), format!("value-{}-{}", version, i), version))
        .collect()
}

/// Balanced tree of `n` entries at `version`
pub fn tree_of(n: usize, version: i64) -> Node {
    build_balanced(entries(n, version))
        .expect("sorted entries build")
        .expect("non-empty tree")
}

/// Versioned tree holding one balanced tree of `n` entries per version
pub fn versioned(versions: &[i64], n: usize) -> MemTree {
    let mut tree = MemTree::new();
    for &version in versions {
        tree.insert_version(version, Some(tree_of(n, version)));
    }
    tree
}

/// Pre-order stream of the tree at `version`
pub fn stream_of(n: usize, version: i64) -> Vec<SnapshotNode> {
    let root = tree_of(n, version);
    arbor::snapshot_stream(&root).collect()
}

/// Store directory that survives reopen
pub struct TestStore {
    dir: TempDir,
    config: SnapshotConfig,
    db: Option<SnapshotDb>,
}

impl TestStore {
    /// Fresh store with the default config
    pub fn new() -> Self {
        Self::with_config(SnapshotConfig::default())
    }

    /// Fresh store with `config`
    pub fn with_config(config: SnapshotConfig) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let db = SnapshotDb::open_with_config(dir.path(), config.clone())
            .expect("Failed to open store");
        TestStore {
            dir,
            config,
            db: Some(db),
        }
    }

    /// Store directory
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Changelog database file
    pub fn changelog_path(&self) -> PathBuf {
        self.dir.path().join(arbor::CHANGELOG_FILE_NAME)
    }

    /// Open handle
    pub fn db(&mut self) -> &mut SnapshotDb {
        self.db.as_mut().expect("store is closed")
    }

    /// Close the handle so the files can be edited directly
    pub fn close(&mut self) {
        self.db = None;
    }

    /// Close and open again
    pub fn reopen(&mut self) {
        self.close();
        self.db = Some(
            SnapshotDb::open_with_config(self.dir.path(), self.config.clone())
                .expect("Failed to reopen store"),
        );
    }

    /// Tree-driven export of `version` from `tree`
    pub fn snapshot(&mut self, tree: &mut MemTree, version: i64) {
        self.db()
            .snapshot(&CancellationToken::new(), tree, version)
            .expect("snapshot should succeed");
    }
}

impl Default for TestStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Root of the tree stored in `tree` at `version`
pub fn root_at(tree: &mut MemTree, version: i64) -> Node {
    tree.load_version(version).expect("version exists");
    tree.root().cloned().expect("non-empty version")
}
