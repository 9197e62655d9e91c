//! In-memory store
//!
//! `BTreeMap` tables behind a shared `RwLock`. Every connection made from one
//! [`MemoryStore`] sees the same committed data; rows staged inside a
//! transaction become visible only on commit. Reads observe committed state.
//!
//! Also carries test hooks: failing commits, corrupting rows and a log of
//! how many rows each commit applied.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arbor_core::NodeKey;
use parking_lot::{Mutex, RwLock};

use crate::error::{StorageError, StorageResult};
use crate::table::{OrdinalRow, SnapshotMarker, TableKind, TableName};
use crate::traits::{RowCursor, StoreConn};

#[derive(Debug, Clone)]
enum Row {
    Ordinal(OrdinalRow),
    Node {
        generation: i64,
        node_key: NodeKey,
        bytes: Vec<u8>,
    },
    Marker(SnapshotMarker),
    Shard { version: i64, shard: u32 },
}

impl Row {
    fn kind(&self) -> TableKind {
        match self {
            Row::Ordinal(_) => TableKind::Ordinal,
            Row::Node { .. } => TableKind::Node,
            Row::Marker(_) => TableKind::Marker,
            Row::Shard { .. } => TableKind::ShardVersion,
        }
    }
}

#[derive(Debug, Default)]
struct Table {
    rows: Vec<Row>,
    indexed: bool,
}

#[derive(Debug, Default)]
struct Tables {
    tables: BTreeMap<TableName, Table>,
}

impl Tables {
    fn table(&self, name: &TableName) -> StorageResult<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| StorageError::no_such_table(name))
    }

    fn table_mut(&mut self, name: &TableName) -> StorageResult<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| StorageError::no_such_table(name))
    }

    fn apply(&mut self, (name, row): (TableName, Row)) -> StorageResult<()> {
        let table = self.table_mut(&name)?;
        if let Row::Marker(marker) = &row {
            let version = marker.version;
            table
                .rows
                .retain(|r| !matches!(r, Row::Marker(m) if m.version == version));
        }
        table.rows.push(row);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Hooks {
    fail_next_commit: AtomicBool,
    committed: Mutex<Vec<usize>>,
}

/// Shared in-memory database
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    db: Arc<RwLock<Tables>>,
    hooks: Arc<Hooks>,
}

impl MemoryStore {
    /// Create an empty database
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a connection to this database
    pub fn connect(&self) -> MemoryConn {
        MemoryConn {
            store: self.clone(),
            pending: None,
            prepared: BTreeSet::new(),
        }
    }

    // ========================================================================
    // Test hooks
    // ========================================================================

    /// Make the next commit on any connection fail with `Injected`
    ///
    /// The failed transaction's rows are discarded.
    pub fn fail_next_commit(&self) {
        self.hooks.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Rows applied by each successful commit, oldest first
    pub fn committed_batches(&self) -> Vec<usize> {
        self.hooks.committed.lock().clone()
    }

    /// Rewrite the bytes of the compact-table row at `ordinal`
    ///
    /// Returns false if no such row exists.
    pub fn modify_ordinal_row<F>(
        &self,
        table: &TableName,
        ordinal: u64,
        f: F,
    ) -> StorageResult<bool>
    where
        F: FnOnce(&mut Vec<u8>),
    {
        let mut db = self.db.write();
        let table = db.table_mut(table)?;
        let row = table.rows.iter_mut().find_map(|row| match row {
            Row::Ordinal(r) if r.ordinal == ordinal => Some(r),
            _ => None,
        });
        match row {
            Some(row) => {
                f(&mut row.bytes);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Connection to a [`MemoryStore`]
#[derive(Debug)]
pub struct MemoryConn {
    store: MemoryStore,
    pending: Option<Vec<(TableName, Row)>>,
    prepared: BTreeSet<TableName>,
}

impl MemoryConn {
    fn write_row(&mut self, table: &TableName, row: Row) -> StorageResult<()> {
        self.store.db.read().table(table)?;
        if table.kind() != row.kind() {
            return Err(StorageError::invalid_row(
                table,
                format!("{:?} row does not fit {:?} table", row.kind(), table.kind()),
            ));
        }
        match &mut self.pending {
            Some(pending) => {
                pending.push((*table, row));
                Ok(())
            }
            None => self.store.db.write().apply((*table, row)),
        }
    }

    /// Number of rows staged in the open transaction
    pub fn staged(&self) -> usize {
        self.pending.as_ref().map_or(0, Vec::len)
    }
}

impl StoreConn for MemoryConn {
    fn create_table(&mut self, table: &TableName) -> StorageResult<()> {
        let mut db = self.store.db.write();
        if db.tables.contains_key(table) {
            return Err(StorageError::TableExists {
                table: table.to_string(),
            });
        }
        db.tables.insert(*table, Table::default());
        Ok(())
    }

    fn create_index(&mut self, table: &TableName) -> StorageResult<()> {
        self.store.db.write().table_mut(table)?.indexed = true;
        Ok(())
    }

    fn drop_table(&mut self, table: &TableName) -> StorageResult<()> {
        self.store
            .db
            .write()
            .tables
            .remove(table)
            .map(|_| ())
            .ok_or_else(|| StorageError::no_such_table(table))
    }

    fn has_table(&self, table: &TableName) -> StorageResult<bool> {
        Ok(self.store.db.read().tables.contains_key(table))
    }

    fn has_index(&self, table: &TableName) -> StorageResult<bool> {
        Ok(self
            .store
            .db
            .read()
            .tables
            .get(table)
            .map_or(false, |t| t.indexed))
    }

    fn table_names(&self) -> StorageResult<Vec<String>> {
        Ok(self
            .store
            .db
            .read()
            .tables
            .keys()
            .map(TableName::to_string)
            .collect())
    }

    fn begin(&mut self) -> StorageResult<()> {
        if self.pending.is_some() {
            return Err(StorageError::TransactionOpen);
        }
        self.pending = Some(Vec::new());
        Ok(())
    }

    fn commit(&mut self) -> StorageResult<()> {
        let pending = self.pending.take().ok_or(StorageError::NoTransaction)?;
        if self.store.hooks.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StorageError::Injected("commit failure".to_string()));
        }

        let mut db = self.store.db.write();
        for (table, _) in &pending {
            db.table(table)?;
        }
        let rows = pending.len();
        for op in pending {
            db.apply(op)?;
        }
        self.store.hooks.committed.lock().push(rows);
        Ok(())
    }

    fn rollback(&mut self) -> StorageResult<()> {
        self.pending
            .take()
            .map(|_| ())
            .ok_or(StorageError::NoTransaction)
    }

    fn in_transaction(&self) -> bool {
        self.pending.is_some()
    }

    fn prepare(&mut self, table: &TableName) -> StorageResult<()> {
        self.store.db.read().table(table)?;
        self.prepared.insert(*table);
        Ok(())
    }

    fn close_prepared(&mut self) -> StorageResult<()> {
        self.prepared.clear();
        Ok(())
    }

    fn insert_ordinal(
        &mut self,
        table: &TableName,
        ordinal: u64,
        node_key: NodeKey,
        bytes: &[u8],
    ) -> StorageResult<()> {
        self.write_row(
            table,
            Row::Ordinal(OrdinalRow {
                ordinal,
                node_key,
                bytes: bytes.to_vec(),
            }),
        )
    }

    fn insert_node(
        &mut self,
        table: &TableName,
        generation: i64,
        node_key: NodeKey,
        bytes: &[u8],
    ) -> StorageResult<()> {
        self.write_row(
            table,
            Row::Node {
                generation,
                node_key,
                bytes: bytes.to_vec(),
            },
        )
    }

    fn delete_generation(&mut self, table: &TableName, generation: i64) -> StorageResult<u64> {
        if table.kind() != TableKind::Node {
            return Err(StorageError::invalid_row(
                table,
                format!("{:?} table holds no generation rows", table.kind()),
            ));
        }
        let mut db = self.store.db.write();
        let rows = &mut db.table_mut(table)?.rows;
        let before = rows.len();
        rows.retain(|row| !matches!(row, Row::Node { generation: g, .. } if *g == generation));
        Ok((before - rows.len()) as u64)
    }

    fn scan_ordinal<'a>(&'a self, table: &TableName) -> StorageResult<Box<dyn RowCursor + 'a>> {
        let db = self.store.db.read();
        let mut rows: Vec<OrdinalRow> = db
            .table(table)?
            .rows
            .iter()
            .filter_map(|row| match row {
                Row::Ordinal(r) => Some(r.clone()),
                _ => None,
            })
            .collect();
        rows.sort_by_key(|r| r.ordinal);
        Ok(Box::new(MemoryCursor {
            rows: rows.into_iter(),
        }))
    }

    fn get_node(&self, table: &TableName, node_key: NodeKey) -> StorageResult<Option<Vec<u8>>> {
        let db = self.store.db.read();
        Ok(db.table(table)?.rows.iter().find_map(|row| match row {
            Row::Node { node_key: k, bytes, .. } if *k == node_key => Some(bytes.clone()),
            _ => None,
        }))
    }

    fn row_count(&self, table: &TableName) -> StorageResult<u64> {
        Ok(self.store.db.read().table(table)?.rows.len() as u64)
    }

    fn put_marker(&mut self, marker: &SnapshotMarker) -> StorageResult<()> {
        self.write_row(&TableName::SnapshotMarker, Row::Marker(marker.clone()))
    }

    fn markers(&self) -> StorageResult<Vec<SnapshotMarker>> {
        let db = self.store.db.read();
        let mut markers: Vec<SnapshotMarker> = db
            .table(&TableName::SnapshotMarker)?
            .rows
            .iter()
            .filter_map(|row| match row {
                Row::Marker(m) => Some(m.clone()),
                _ => None,
            })
            .collect();
        markers.sort_by_key(|m| m.version);
        Ok(markers)
    }

    fn map_versions(&mut self, versions: &[i64], shard: u32) -> StorageResult<()> {
        for &version in versions {
            self.write_row(&TableName::ShardVersions, Row::Shard { version, shard })?;
        }
        Ok(())
    }

    fn shard_for_version(&self, version: i64) -> StorageResult<Option<u32>> {
        let db = self.store.db.read();
        Ok(db
            .table(&TableName::ShardVersions)?
            .rows
            .iter()
            .filter_map(|row| match row {
                Row::Shard { version: v, shard } if *v == version => Some(*shard),
                _ => None,
            })
            .max())
    }
}

struct MemoryCursor {
    rows: std::vec::IntoIter<OrdinalRow>,
}

impl RowCursor for MemoryCursor {
    fn step(&mut self) -> StorageResult<Option<OrdinalRow>> {
        Ok(self.rows.next())
    }
}
