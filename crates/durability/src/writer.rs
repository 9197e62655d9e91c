//! Batched transactional writer
//!
//! Stages node rows across two databases and commits them together every
//! `batch_size` rows:
//!
//! - changelog: the compact `snapshot_<version>` table (every node) and the
//!   `leaf` table (leaves only)
//! - tree: the `tree_<shard>` table (internal nodes only)
//!
//! Cancellation is checked at flush boundaries only. A cancelled flush rolls
//! both scopes back and the writer is finished.
//!
//! The two commits are not atomic with each other. If one fails the error
//! carries both outcomes and the generation stays unmarked; see
//! `SnapshotDb::recover`.

use std::time::Instant;

use arbor_core::{CancellationToken, NodeKey};
use arbor_storage::{StoreConn, TableName};
use tracing::{info, warn};

use crate::error::{SnapshotError, SnapshotResult};

/// Durable table a row goes to besides the compact table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Durable {
    /// Compact table only
    None,
    /// Also the leaf table
    Leaf,
    /// Also the current internal-node shard
    Branch,
}

/// Counters reported when the writer finishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriterStats {
    /// Rows written to the compact table
    pub rows: u64,
    /// Committed batches
    pub flushes: u64,
}

/// Batched writer over the changelog and tree databases
pub struct BatchWriter<'a> {
    changelog: &'a mut dyn StoreConn,
    tree: &'a mut dyn StoreConn,
    cancel: &'a CancellationToken,
    generation: i64,
    snapshot: TableName,
    shard: TableName,
    batch_size: usize,
    staged: usize,
    total: u64,
    flushes: u64,
    last_flush: Instant,
}

impl<'a> BatchWriter<'a> {
    /// Create a writer for generation `version`, internal nodes going to `shard`
    ///
    /// No scope is open until [`BatchWriter::prepare`].
    pub fn new(
        changelog: &'a mut dyn StoreConn,
        tree: &'a mut dyn StoreConn,
        cancel: &'a CancellationToken,
        version: i64,
        shard: u32,
        batch_size: usize,
    ) -> Self {
        BatchWriter {
            changelog,
            tree,
            cancel,
            generation: version,
            snapshot: TableName::Snapshot(version),
            shard: TableName::Tree(shard),
            batch_size: batch_size.max(1),
            staged: 0,
            total: 0,
            flushes: 0,
            last_flush: Instant::now(),
        }
    }

    /// Open a scope on both databases and prepare the three inserts
    pub fn prepare(&mut self) -> SnapshotResult<()> {
        self.changelog.begin()?;
        self.tree.begin()?;
        self.changelog.prepare(&self.snapshot)?;
        self.changelog.prepare(&TableName::Leaf)?;
        self.tree.prepare(&self.shard)?;
        Ok(())
    }

    /// Stage one row
    pub fn insert(
        &mut self,
        ordinal: u64,
        node_key: NodeKey,
        bytes: &[u8],
        durable: Durable,
    ) -> SnapshotResult<()> {
        self.changelog.insert_ordinal(&self.snapshot, ordinal, node_key, bytes)?;
        match durable {
            Durable::None => {}
            Durable::Leaf => {
                self.changelog.insert_node(&TableName::Leaf, self.generation, node_key, bytes)?
            }
            Durable::Branch => {
                self.tree.insert_node(&self.shard, self.generation, node_key, bytes)?
            }
        }
        self.staged += 1;
        self.total += 1;
        Ok(())
    }

    /// Flush and re-prepare once a full batch is staged
    pub fn maybe_flush(&mut self) -> SnapshotResult<()> {
        if self.staged >= self.batch_size {
            self.flush()?;
            self.prepare()?;
        }
        Ok(())
    }

    /// Commit the open batch on both databases
    ///
    /// Checks cancellation first; a cancelled writer rolls back and reports
    /// [`SnapshotError::Cancelled`].
    pub fn flush(&mut self) -> SnapshotResult<()> {
        self.check_cancelled()?;

        let elapsed = self.last_flush.elapsed();
        info!(
            target: "arbor::snapshot",
            table = %self.snapshot,
            total = self.total,
            batch = self.staged,
            elapsed_ms = elapsed.as_millis() as u64,
            rows_per_sec = (self.staged as f64 / elapsed.as_secs_f64().max(1e-9)) as u64,
            "Snapshot flush"
        );

        let changelog = self.changelog.commit().err();
        let tree = self.tree.commit().err();
        if changelog.is_some() || tree.is_some() {
            return Err(SnapshotError::Commit { changelog, tree });
        }
        self.changelog.close_prepared()?;
        self.tree.close_prepared()?;

        self.flushes += 1;
        self.staged = 0;
        self.last_flush = Instant::now();
        Ok(())
    }

    /// Flush whatever is staged and report counters
    ///
    /// An empty trailing batch is rolled back instead of committed.
    pub fn finish(mut self) -> SnapshotResult<WriterStats> {
        if self.staged > 0 {
            self.flush()?;
        } else {
            self.check_cancelled()?;
            self.release();
        }
        Ok(WriterStats {
            rows: self.total,
            flushes: self.flushes,
        })
    }

    /// Rows staged since the last flush
    pub fn staged(&self) -> usize {
        self.staged
    }

    /// Rows staged in total
    pub fn total(&self) -> u64 {
        self.total
    }

    fn check_cancelled(&mut self) -> SnapshotResult<()> {
        if self.cancel.is_cancelled() {
            info!(
                target: "arbor::snapshot",
                table = %self.snapshot,
                ordinal = self.total,
                "Snapshot cancelled"
            );
            self.release();
            return Err(SnapshotError::Cancelled {
                ordinal: self.total,
            });
        }
        Ok(())
    }

    /// Close statements and roll back any open scope, best effort
    fn release(&mut self) {
        for (name, conn) in [("changelog", &mut *self.changelog), ("tree", &mut *self.tree)] {
            if let Err(e) = conn.close_prepared() {
                warn!(
                    target: "arbor::snapshot",
                    db = name,
                    error = %e,
                    "Failed to close statements"
                );
            }
            if conn.in_transaction() {
                if let Err(e) = conn.rollback() {
                    warn!(target: "arbor::snapshot", db = name, error = %e, "Rollback failed");
                }
            }
        }
    }
}

impl Drop for BatchWriter<'_> {
    fn drop(&mut self) {
        if self.changelog.in_transaction() || self.tree.in_transaction() {
            self.release();
        }
    }
}
