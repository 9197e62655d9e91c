//! SQLite store
//!
//! One [`SqliteConn`] per database file. Tables follow [`TableName`] exactly,
//! so stores written here stay readable by any tool that knows the layout.
//! Insert statements are cached per table; `close_prepared` flushes the cache.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use arbor_core::{NodeHash, NodeKey};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::table::{OrdinalRow, SnapshotMarker, TableKind, TableName};
use crate::traits::{RowCursor, StoreConn};

/// Rows fetched per cursor page
const PAGE_ROWS: i64 = 4096;

/// Connection to one SQLite database
#[derive(Debug)]
pub struct SqliteConn {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteConn {
    /// Open or create the database at `path` in WAL mode
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        debug!(target: "arbor::storage", path = %path.display(), "Opened sqlite store");
        Ok(SqliteConn {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> StorageResult<Self> {
        Ok(SqliteConn {
            conn: Connection::open_in_memory()?,
            path: None,
        })
    }

    /// Database file, if on disk
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn exists(&self, kind: &str, name: &str) -> StorageResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT count(*) FROM sqlite_master WHERE type = ?1 AND name = ?2",
            params![kind, name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn require(&self, table: &TableName) -> StorageResult<()> {
        if self.exists("table", &table.to_string())? {
            Ok(())
        } else {
            Err(StorageError::no_such_table(table))
        }
    }
}

fn columns(kind: TableKind) -> &'static str {
    match kind {
        TableKind::Ordinal => "ordinal int, version int, sequence int, bytes blob",
        TableKind::Node => "generation int, version int, sequence int, bytes blob",
        TableKind::Marker => "version int, row_count int, root_hash blob",
        TableKind::ShardVersion => "version int, shard_id int",
    }
}

fn index_columns(kind: TableKind) -> &'static str {
    match kind {
        TableKind::Ordinal => "ordinal",
        TableKind::Node => "version, sequence",
        TableKind::Marker | TableKind::ShardVersion => "version",
    }
}

fn insert_sql(table: &TableName) -> String {
    match table.kind() {
        TableKind::Ordinal => format!(
            "INSERT INTO \"{}\" (ordinal, version, sequence, bytes) VALUES (?1, ?2, ?3, ?4)",
            table
        ),
        TableKind::Node => format!(
            "INSERT INTO \"{}\" (generation, version, sequence, bytes) VALUES (?1, ?2, ?3, ?4)",
            table
        ),
        TableKind::Marker => format!(
            "INSERT INTO \"{}\" (version, row_count, root_hash) VALUES (?1, ?2, ?3)",
            table
        ),
        TableKind::ShardVersion => {
            format!("INSERT INTO \"{}\" (version, shard_id) VALUES (?1, ?2)", table)
        }
    }
}

fn expect_kind(table: &TableName, kind: TableKind) -> StorageResult<()> {
    if table.kind() == kind {
        Ok(())
    } else {
        Err(StorageError::invalid_row(
            table,
            format!("{:?} row does not fit {:?} table", kind, table.kind()),
        ))
    }
}

fn to_sequence(table: &TableName, sequence: i64) -> StorageResult<u32> {
    u32::try_from(sequence).map_err(|_| {
        StorageError::invalid_row(table, format!("sequence {} out of range", sequence))
    })
}

impl StoreConn for SqliteConn {
    fn create_table(&mut self, table: &TableName) -> StorageResult<()> {
        if self.has_table(table)? {
            return Err(StorageError::TableExists {
                table: table.to_string(),
            });
        }
        self.conn.execute_batch(&format!(
            "CREATE TABLE \"{}\" ({});",
            table,
            columns(table.kind())
        ))?;
        Ok(())
    }

    fn create_index(&mut self, table: &TableName) -> StorageResult<()> {
        self.require(table)?;
        self.conn.execute_batch(&format!(
            "CREATE INDEX IF NOT EXISTS \"{}\" ON \"{}\" ({});",
            table.index_name(),
            table,
            index_columns(table.kind())
        ))?;
        Ok(())
    }

    fn drop_table(&mut self, table: &TableName) -> StorageResult<()> {
        self.require(table)?;
        // Cached inserts may reference the table
        self.conn.flush_prepared_statement_cache();
        self.conn.execute_batch(&format!("DROP TABLE \"{}\";", table))?;
        Ok(())
    }

    fn has_table(&self, table: &TableName) -> StorageResult<bool> {
        self.exists("table", &table.to_string())
    }

    fn has_index(&self, table: &TableName) -> StorageResult<bool> {
        self.exists("index", &table.index_name())
    }

    fn table_names(&self) -> StorageResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    fn begin(&mut self) -> StorageResult<()> {
        if !self.conn.is_autocommit() {
            return Err(StorageError::TransactionOpen);
        }
        self.conn.execute_batch("BEGIN")?;
        Ok(())
    }

    fn commit(&mut self) -> StorageResult<()> {
        if self.conn.is_autocommit() {
            return Err(StorageError::NoTransaction);
        }
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> StorageResult<()> {
        if self.conn.is_autocommit() {
            return Err(StorageError::NoTransaction);
        }
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    fn prepare(&mut self, table: &TableName) -> StorageResult<()> {
        self.conn.prepare_cached(&insert_sql(table))?;
        Ok(())
    }

    fn close_prepared(&mut self) -> StorageResult<()> {
        self.conn.flush_prepared_statement_cache();
        Ok(())
    }

    fn insert_ordinal(
        &mut self,
        table: &TableName,
        ordinal: u64,
        node_key: NodeKey,
        bytes: &[u8],
    ) -> StorageResult<()> {
        expect_kind(table, TableKind::Ordinal)?;
        let mut stmt = self.conn.prepare_cached(&insert_sql(table))?;
        stmt.execute(params![
            ordinal as i64,
            node_key.version(),
            node_key.sequence(),
            bytes
        ])?;
        Ok(())
    }

    fn insert_node(
        &mut self,
        table: &TableName,
        generation: i64,
        node_key: NodeKey,
        bytes: &[u8],
    ) -> StorageResult<()> {
        expect_kind(table, TableKind::Node)?;
        let mut stmt = self.conn.prepare_cached(&insert_sql(table))?;
        stmt.execute(params![
            generation,
            node_key.version(),
            node_key.sequence(),
            bytes
        ])?;
        Ok(())
    }

    fn delete_generation(&mut self, table: &TableName, generation: i64) -> StorageResult<u64> {
        expect_kind(table, TableKind::Node)?;
        self.require(table)?;
        let removed = self.conn.execute(
            &format!("DELETE FROM \"{}\" WHERE generation = ?1", table),
            params![generation],
        )?;
        Ok(removed as u64)
    }

    fn scan_ordinal<'a>(&'a self, table: &TableName) -> StorageResult<Box<dyn RowCursor + 'a>> {
        expect_kind(table, TableKind::Ordinal)?;
        self.require(table)?;
        Ok(Box::new(SqliteCursor {
            conn: &self.conn,
            table: *table,
            sql: format!(
                "SELECT ordinal, version, sequence, bytes FROM \"{}\" \
                 WHERE ordinal > ?1 ORDER BY ordinal LIMIT ?2",
                table
            ),
            after: i64::MIN,
            buf: VecDeque::new(),
            exhausted: false,
        }))
    }

    fn get_node(&self, table: &TableName, node_key: NodeKey) -> StorageResult<Option<Vec<u8>>> {
        expect_kind(table, TableKind::Node)?;
        let bytes = self
            .conn
            .query_row(
                &format!(
                    "SELECT bytes FROM \"{}\" WHERE version = ?1 AND sequence = ?2 LIMIT 1",
                    table
                ),
                params![node_key.version(), node_key.sequence()],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(bytes)
    }

    fn row_count(&self, table: &TableName) -> StorageResult<u64> {
        self.require(table)?;
        let count: i64 = self.conn.query_row(
            &format!("SELECT count(*) FROM \"{}\"", table),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn put_marker(&mut self, marker: &SnapshotMarker) -> StorageResult<()> {
        let table = TableName::SnapshotMarker;
        self.require(&table)?;
        let sp = self.conn.savepoint()?;
        sp.execute(
            &format!("DELETE FROM \"{}\" WHERE version = ?1", table),
            params![marker.version],
        )?;
        sp.execute(
            &insert_sql(&table),
            params![
                marker.version,
                marker.row_count as i64,
                marker.root_hash.as_ref().map(|h| h.as_bytes().to_vec())
            ],
        )?;
        sp.commit()?;
        Ok(())
    }

    fn markers(&self) -> StorageResult<Vec<SnapshotMarker>> {
        let table = TableName::SnapshotMarker;
        self.require(&table)?;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT version, row_count, root_hash FROM \"{}\" ORDER BY version",
            table
        ))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<Vec<u8>>>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(version, row_count, root_hash)| {
                let root_hash = match root_hash {
                    Some(bytes) => Some(NodeHash::from_slice(&bytes).ok_or_else(|| {
                        StorageError::invalid_row(
                            &table,
                            format!("root hash of version {} has {} bytes", version, bytes.len()),
                        )
                    })?),
                    None => None,
                };
                Ok(SnapshotMarker {
                    version,
                    row_count: row_count as u64,
                    root_hash,
                })
            })
            .collect()
    }

    fn map_versions(&mut self, versions: &[i64], shard: u32) -> StorageResult<()> {
        let table = TableName::ShardVersions;
        self.require(&table)?;
        let mut stmt = self.conn.prepare_cached(&insert_sql(&table))?;
        for &version in versions {
            stmt.execute(params![version, shard])?;
        }
        Ok(())
    }

    fn shard_for_version(&self, version: i64) -> StorageResult<Option<u32>> {
        let table = TableName::ShardVersions;
        self.require(&table)?;
        let shard = self
            .conn
            .query_row(
                &format!("SELECT max(shard_id) FROM \"{}\" WHERE version = ?1", table),
                params![version],
                |row| row.get::<_, Option<u32>>(0),
            )?;
        Ok(shard)
    }
}

/// Keyset-paginated cursor; each page is one indexed range query
struct SqliteCursor<'a> {
    conn: &'a Connection,
    table: TableName,
    sql: String,
    after: i64,
    buf: VecDeque<OrdinalRow>,
    exhausted: bool,
}

impl SqliteCursor<'_> {
    fn fill(&mut self) -> StorageResult<()> {
        let conn = self.conn;
        let mut stmt = conn.prepare_cached(&self.sql)?;
        let mut rows = stmt.query(params![self.after, PAGE_ROWS])?;
        let mut fetched = 0;
        while let Some(row) = rows.next()? {
            let ordinal: i64 = row.get(0)?;
            let version: i64 = row.get(1)?;
            let sequence: i64 = row.get(2)?;
            let bytes: Vec<u8> = row.get(3)?;
            self.after = ordinal;
            fetched += 1;
            self.buf.push_back(OrdinalRow {
                ordinal: u64::try_from(ordinal).map_err(|_| {
                    StorageError::invalid_row(&self.table, format!("negative ordinal {}", ordinal))
                })?,
                node_key: NodeKey::new(version, to_sequence(&self.table, sequence)?),
                bytes,
            });
        }
        if fetched < PAGE_ROWS {
            self.exhausted = true;
        }
        Ok(())
    }
}

impl RowCursor for SqliteCursor<'_> {
    fn step(&mut self) -> StorageResult<Option<OrdinalRow>> {
        if self.buf.is_empty() && !self.exhausted {
            self.fill()?;
        }
        Ok(self.buf.pop_front())
    }
}
