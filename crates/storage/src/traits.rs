//! Store connection abstraction
//!
//! A `StoreConn` is one connection to one logical database. Snapshots use two
//! of them (changelog and tree) and treat each batch as a unit across both.
//!
//! Transaction model:
//! - `begin` opens a scope; `commit`/`rollback` close it
//! - Row writes outside a scope apply immediately
//! - Table and index DDL always applies immediately
//!
//! Implementations: [`crate::MemoryStore`] and [`crate::SqliteConn`].

use arbor_core::NodeKey;

use crate::error::StorageResult;
use crate::table::{OrdinalRow, SnapshotMarker, TableName};

/// Ordered cursor over a compact table
pub trait RowCursor {
    /// Next row by ascending ordinal, `None` once exhausted
    fn step(&mut self) -> StorageResult<Option<OrdinalRow>>;
}

/// One connection to a transactional blob store
pub trait StoreConn: Send {
    /// Create `table`; fails with `TableExists` if present
    fn create_table(&mut self, table: &TableName) -> StorageResult<()>;

    /// Create `table` unless it already exists
    fn ensure_table(&mut self, table: &TableName) -> StorageResult<()> {
        if !self.has_table(table)? {
            self.create_table(table)?;
        }
        Ok(())
    }

    /// Build the lookup index of `table`; no-op if it exists
    fn create_index(&mut self, table: &TableName) -> StorageResult<()>;

    /// Drop `table` with its index
    fn drop_table(&mut self, table: &TableName) -> StorageResult<()>;

    /// True if `table` exists
    fn has_table(&self, table: &TableName) -> StorageResult<bool>;

    /// True if the lookup index of `table` exists
    fn has_index(&self, table: &TableName) -> StorageResult<bool>;

    /// Names of all tables, including ones outside the layout
    fn table_names(&self) -> StorageResult<Vec<String>>;

    /// Open a transaction scope
    fn begin(&mut self) -> StorageResult<()>;

    /// Commit the open scope
    fn commit(&mut self) -> StorageResult<()>;

    /// Discard the open scope
    fn rollback(&mut self) -> StorageResult<()>;

    /// True while a scope is open
    fn in_transaction(&self) -> bool;

    /// Prepare the insert statement for `table`
    fn prepare(&mut self, table: &TableName) -> StorageResult<()>;

    /// Release every prepared statement
    fn close_prepared(&mut self) -> StorageResult<()>;

    /// Insert into a compact table
    fn insert_ordinal(
        &mut self,
        table: &TableName,
        ordinal: u64,
        node_key: NodeKey,
        bytes: &[u8],
    ) -> StorageResult<()>;

    /// Insert into a leaf or internal-node table, tagged with the
    /// generation whose export wrote it
    fn insert_node(
        &mut self,
        table: &TableName,
        generation: i64,
        node_key: NodeKey,
        bytes: &[u8],
    ) -> StorageResult<()>;

    /// Delete every row of a leaf or internal-node table written by the export
    /// of `generation`; returns the number of rows removed
    fn delete_generation(&mut self, table: &TableName, generation: i64) -> StorageResult<u64>;

    /// Cursor over a compact table in ascending ordinal order
    fn scan_ordinal<'a>(&'a self, table: &TableName) -> StorageResult<Box<dyn RowCursor + 'a>>;

    /// Look up node bytes by identity in a leaf or internal-node table
    fn get_node(&self, table: &TableName, node_key: NodeKey) -> StorageResult<Option<Vec<u8>>>;

    /// Number of rows in `table`
    fn row_count(&self, table: &TableName) -> StorageResult<u64>;

    /// Record a completion marker, replacing any marker of the same version
    fn put_marker(&mut self, marker: &SnapshotMarker) -> StorageResult<()>;

    /// All completion markers, ascending by version
    fn markers(&self) -> StorageResult<Vec<SnapshotMarker>>;

    /// Register `versions` as living in `shard`
    fn map_versions(&mut self, versions: &[i64], shard: u32) -> StorageResult<()>;

    /// Highest shard registered for `version`
    fn shard_for_version(&self, version: i64) -> StorageResult<Option<u32>>;
}
