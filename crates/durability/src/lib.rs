//! Snapshot durability for arbor
//!
//! This crate persists versioned Merkle trees to a pair of transactional
//! stores and rebuilds them:
//!
//! - Writer: batched dual-transaction inserts with cooperative cancellation
//! - Walk: one explicit-stack pre-order traversal shared by export and import
//! - Export: tree-driven and stream-driven generation writers
//! - Import: trust and verify modes with row, count and hash checks
//! - Catalog: generation listing, version selection, store discovery
//! - SnapshotDb: the store handle tying connections, shard and config together
//! - Config: `arbor.toml` with batching and export defaults

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod import;
pub mod walk;
pub mod writer;

pub use catalog::{
    discover_stores, list_generations, select_at_or_before, Generation, CHANGELOG_FILE_NAME,
    TREE_FILE_NAME,
};
pub use config::{
    ConfigError, SnapshotConfig, SnapshotOptions, CONFIG_FILE_NAME, DEFAULT_BATCH_SIZE,
    DEFAULT_PROGRESS_INTERVAL,
};
pub use db::SnapshotDb;
pub use error::{SnapshotError, SnapshotResult};
pub use export::{export_stream, export_tree, ExportSummary, ExportTarget};
pub use import::import_generation;
pub use walk::{walk_preorder, walk_preorder_with, ChildSource, Side, StreamSource, TreeSource};
pub use writer::{BatchWriter, Durable, WriterStats};
