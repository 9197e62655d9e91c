//! Arbor - versioned authenticated tree snapshots
//!
//! Arbor freezes versions of an AVL/IAVL Merkle tree into a transactional
//! blob store and rebuilds them later, either trusting stored hashes or
//! recomputing every one of them.
//!
//! # Quick Start
//!
//! ```ignore
//! use arbor::{build_balanced, CancellationToken, Entry, MemTree, SnapshotDb, VersionedTree};
//!
//! let mut db = SnapshotDb::open("/var/lib/arbor")?;
//!
//! let mut tree = MemTree::new();
//! let entries = vec![Entry::new("a", "1", 7), Entry::new("b", "2", 7)];
//! tree.insert_version(7, build_balanced(entries)?);
//!
//! db.snapshot(&CancellationToken::new(), &mut tree, 7)?;
//! let (root, version) = db.import_most_recent(10, true)?;
//! ```
//!
//! # Architecture
//!
//! - `arbor-core`: node model, hashing, byte codec, node pool
//! - `arbor-storage`: the transactional store trait with SQLite and memory backends
//! - `arbor-durability`: batched writer, exporters, importer, catalog and [`SnapshotDb`]

pub use arbor_core::{
    build_balanced, rehash_tree, snapshot_stream, CancellationToken, Child, CoreError, CoreResult,
    Entry, MemTree, Node, NodeHash, NodeKey, NodePool, PoolStats, SnapshotNode, VersionedTree,
};
pub use arbor_durability::{
    discover_stores, list_generations, select_at_or_before, ConfigError, ExportSummary,
    Generation, SnapshotConfig, SnapshotDb, SnapshotError, SnapshotOptions, SnapshotResult,
    CHANGELOG_FILE_NAME, CONFIG_FILE_NAME, TREE_FILE_NAME,
};
pub use arbor_storage::{
    MemoryConn, MemoryStore, OrdinalRow, RowCursor, SnapshotMarker, SqliteConn, StorageError,
    StorageResult, StoreConn, TableKind, TableName,
};
