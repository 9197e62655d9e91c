//! Storage layer for arbor
//!
//! This crate implements the transactional blob store that snapshots are
//! written to and read from:
//! - StoreConn: connection trait (tables, indexes, transactions, inserts, cursors)
//! - TableName: the persisted table layout
//! - MemoryStore: shared in-memory backend with fault injection
//! - SqliteConn: SQLite backend via rusqlite

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod memory;
pub mod sqlite;
pub mod table;
pub mod traits;

pub use error::{StorageError, StorageResult};
pub use memory::{MemoryConn, MemoryStore};
pub use sqlite::SqliteConn;
pub use table::{OrdinalRow, SnapshotMarker, TableKind, TableName};
pub use traits::{RowCursor, StoreConn};
