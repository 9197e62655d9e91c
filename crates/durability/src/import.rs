//! Snapshot import
//!
//! Reads one generation's compact table by ascending ordinal and rebuilds the
//! tree in the same pre-order it was written in. Every row must carry exactly
//! the next ordinal; a gap, a missing child or a trailing row is corruption.
//!
//! Trust mode (`load_leaves = false`) keeps internal nodes only: leaves are
//! returned to the pool as soon as they are read and their parents keep the
//! key-only link. The root is kept even if it is a leaf.
//!
//! Verify mode (`load_leaves = true`) keeps every node, then recomputes all
//! hashes bottom-up and fails on the first node whose hash changed.

use std::time::Instant;

use arbor_core::{rehash_tree, Node, NodeHash, NodePool};
use arbor_storage::{RowCursor, SnapshotMarker, StoreConn, TableName};
use tracing::{debug, info};

use crate::error::{SnapshotError, SnapshotResult};
use crate::walk::{walk_preorder, ChildSource, Side};

const FIRST_ORDINAL: u64 = 1;

/// Compact-table rows as a pre-order child source
struct RowSource<'a> {
    cursor: Box<dyn RowCursor + 'a>,
    pool: &'a NodePool,
    progress_interval: u64,
    read: u64,
    since: Instant,
}

impl RowSource<'_> {
    fn next_node(&mut self, ordinal: u64) -> SnapshotResult<Option<Node>> {
        let row = match self.cursor.step()? {
            Some(row) => row,
            None => return Ok(None),
        };
        if row.ordinal != ordinal {
            return Err(SnapshotError::corrupt(
                ordinal,
                format!("found row with ordinal {}", row.ordinal),
            ));
        }

        self.read += 1;
        if self.read % self.progress_interval == 0 {
            let elapsed = self.since.elapsed().as_secs_f64().max(1e-9);
            debug!(
                target: "arbor::snapshot",
                nodes = self.read,
                nodes_per_sec = (self.progress_interval as f64 / elapsed) as u64,
                "Import progress"
            );
            self.since = Instant::now();
        }

        let node = self.pool.acquire(row.node_key, &row.bytes).map_err(|e| {
            SnapshotError::corrupt(ordinal, format!("undecodable node {}: {}", row.node_key, e))
        })?;
        Ok(Some(node))
    }
}

impl ChildSource for RowSource<'_> {
    type Item = Node;

    fn root(&mut self, ordinal: u64) -> SnapshotResult<Option<Node>> {
        self.next_node(ordinal)
    }

    fn is_leaf(&self, item: &Node) -> bool {
        item.is_leaf()
    }

    fn child(&mut self, _parent: &Node, side: Side, ordinal: u64) -> SnapshotResult<Node> {
        self.next_node(ordinal)?.ok_or_else(|| {
            SnapshotError::corrupt(ordinal, format!("rows exhausted before {} child", side))
        })
    }
}

fn hex(hash: Option<NodeHash>) -> String {
    hash.map_or_else(|| "none".to_string(), |h| h.to_hex())
}

/// Rebuild generation `marker.version` from `changelog`
///
/// `marker` is the generation's completion record; row count and root hash
/// are checked against it.
pub fn import_generation(
    changelog: &dyn StoreConn,
    pool: &NodePool,
    marker: &SnapshotMarker,
    load_leaves: bool,
    progress_interval: u64,
) -> SnapshotResult<Option<Node>> {
    let started = Instant::now();
    let table = TableName::Snapshot(marker.version);
    let mut source = RowSource {
        cursor: changelog.scan_ordinal(&table)?,
        pool,
        progress_interval: progress_interval.max(1),
        read: 0,
        since: Instant::now(),
    };

    let root = walk_preorder(&mut source, FIRST_ORDINAL, |node, ordinal, children| {
        match children {
            Some((left, right)) => {
                let mut node = node;
                node.attach_children(left, right)?;
                Ok(Some(node))
            }
            None if load_leaves || ordinal == FIRST_ORDINAL => Ok(Some(node)),
            None => {
                pool.release(node);
                Ok(None)
            }
        }
    })?
    .flatten();

    if let Some(row) = source.cursor.step()? {
        return Err(SnapshotError::corrupt(
            row.ordinal,
            "row after the end of the root subtree",
        ));
    }
    if source.read != marker.row_count {
        return Err(SnapshotError::corrupt(
            source.read,
            format!("read {} rows, marker records {}", source.read, marker.row_count),
        ));
    }

    let stored_root = root.as_ref().and_then(Node::hash);
    if stored_root != marker.root_hash {
        return Err(SnapshotError::HashMismatch {
            node_key: root.as_ref().map(Node::node_key).unwrap_or_default(),
            expected: hex(marker.root_hash),
            actual: hex(stored_root),
        });
    }

    let root = match root {
        Some(root) if load_leaves => Some(rehash_tree(root, |node, stored| {
            if node.hash() != stored {
                return Err(SnapshotError::HashMismatch {
                    node_key: node.node_key(),
                    expected: hex(stored),
                    actual: hex(node.hash()),
                });
            }
            Ok(())
        })?),
        other => other,
    };

    info!(
        target: "arbor::snapshot",
        version = marker.version,
        rows = source.read,
        verified = load_leaves,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Snapshot import complete"
    );
    Ok(root)
}
