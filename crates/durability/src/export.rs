//! Snapshot export
//!
//! Two entry points write one generation into `snapshot_<version>`:
//!
//! - [`export_tree`] freezes a materialized tree. Rows keep each node's own
//!   key; only the compact table is written.
//! - [`export_stream`] rebuilds a tree from an external pre-order generator.
//!   Each node gets key `(item version, ordinal)`, leaves also go to `leaf`
//!   and internal nodes to the current `tree_<shard>`. Internal versions are
//!   registered with the shard afterwards.
//!
//! Tree mode inserts rows in pre-order, parents first. Stream mode inserts a
//! node once its children are hashed, so rows land in post-order there.
//! Ordinals start at 1 in both modes. After the last flush the ordinal index
//! is built and a completion marker written; a generation without a marker
//! is never read.

use std::collections::BTreeSet;
use std::time::Instant;

use arbor_core::{CancellationToken, Node, NodeHash, NodeKey, SnapshotNode};
use arbor_storage::{SnapshotMarker, StoreConn, TableName};
use tracing::{info, warn};

use crate::error::{SnapshotError, SnapshotResult};
use crate::walk::{walk_preorder, walk_preorder_with, StreamSource, TreeSource};
use crate::writer::{BatchWriter, Durable};

/// What an export wrote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    /// Generation version
    pub version: i64,
    /// Rows in the compact table
    pub rows: u64,
    /// Leaf rows
    pub leaves: u64,
    /// Internal-node rows
    pub branches: u64,
    /// Committed batches
    pub flushes: u64,
    /// Root hash; `None` for an empty tree
    pub root_hash: Option<NodeHash>,
    /// Internal-node versions registered with the shard (stream export)
    pub versions: Vec<i64>,
    /// Shard internal nodes went to (stream export)
    pub shard: Option<u32>,
}

/// Destination of one export
pub struct ExportTarget<'a> {
    /// Changelog database: compact, leaf and marker tables
    pub changelog: &'a mut dyn StoreConn,
    /// Tree database: internal-node shards and the shard registry
    pub tree: &'a mut dyn StoreConn,
    /// Current internal-node shard
    pub shard: u32,
    /// Rows per committed batch
    pub batch_size: usize,
    /// Checked at every flush
    pub cancel: &'a CancellationToken,
}

/// Remove everything an unfinished export of `version` wrote
///
/// Leaf and shard rows go first, the compact table last, so an interrupted
/// discard still shows up as an incomplete generation.
pub(crate) fn discard_generation(
    changelog: &mut dyn StoreConn,
    tree: &mut dyn StoreConn,
    version: i64,
) -> SnapshotResult<()> {
    let mut removed = 0;
    if changelog.has_table(&TableName::Leaf)? {
        removed += changelog.delete_generation(&TableName::Leaf, version)?;
    }
    let shards: Vec<TableName> = tree
        .table_names()?
        .iter()
        .filter_map(|name| name.parse::<TableName>().ok())
        .filter(|table| table.shard_id().is_some())
        .collect();
    for shard in &shards {
        removed += tree.delete_generation(shard, version)?;
    }
    warn!(
        target: "arbor::snapshot",
        version,
        node_rows = removed,
        "Discarding incomplete snapshot generation"
    );
    changelog.drop_table(&TableName::Snapshot(version))?;
    Ok(())
}

/// Create the compact table, discarding an unmarked leftover
fn begin_generation(
    changelog: &mut dyn StoreConn,
    tree: &mut dyn StoreConn,
    version: i64,
) -> SnapshotResult<()> {
    let table = TableName::Snapshot(version);
    if changelog.has_table(&table)? {
        if changelog.markers()?.iter().any(|m| m.version == version) {
            return Err(SnapshotError::GenerationExists { version });
        }
        discard_generation(changelog, tree, version)?;
    }
    changelog.create_table(&table)?;
    Ok(())
}

/// Index the compact table and mark the generation complete
fn complete_generation(
    changelog: &mut dyn StoreConn,
    version: i64,
    rows: u64,
    root_hash: Option<NodeHash>,
) -> SnapshotResult<()> {
    let table = TableName::Snapshot(version);
    info!(target: "arbor::snapshot", index = %table.index_name(), "Creating snapshot index");
    changelog.create_index(&table)?;
    changelog.put_marker(&SnapshotMarker {
        version,
        row_count: rows,
        root_hash,
    })?;
    Ok(())
}

/// Export the materialized tree under `root` as generation `version`
pub fn export_tree(
    target: ExportTarget<'_>,
    root: Option<&Node>,
    version: i64,
) -> SnapshotResult<ExportSummary> {
    let started = Instant::now();
    begin_generation(&mut *target.changelog, &mut *target.tree, version)?;
    info!(target: "arbor::snapshot", version, "Snapshot started");

    let (mut leaves, mut branches) = (0u64, 0u64);
    let stats = {
        let mut writer = BatchWriter::new(
            &mut *target.changelog,
            &mut *target.tree,
            target.cancel,
            version,
            target.shard,
            target.batch_size,
        );
        writer.prepare()?;
        walk_preorder_with(
            &mut TreeSource::new(root),
            1,
            |node, ordinal| {
                let bytes = node.encode()?;
                writer.insert(ordinal, node.node_key(), &bytes, Durable::None)?;
                if node.is_leaf() {
                    leaves += 1;
                } else {
                    branches += 1;
                }
                writer.maybe_flush()
            },
            |_, _, _| Ok(()),
        )?;
        writer.finish()?
    };

    let root_hash = root.and_then(Node::hash);
    complete_generation(&mut *target.changelog, version, stats.rows, root_hash)?;
    info!(
        target: "arbor::snapshot",
        version,
        rows = stats.rows,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Snapshot complete"
    );

    Ok(ExportSummary {
        version,
        rows: stats.rows,
        leaves,
        branches,
        flushes: stats.flushes,
        root_hash,
        versions: Vec::new(),
        shard: None,
    })
}

/// Export the pre-order stream `nodes` as generation `version`
///
/// Returns the rebuilt root with its children released to key-only links.
/// With `store_leaf_values` off, leaf rows omit the value; hashes still cover
/// it.
pub fn export_stream<I>(
    target: ExportTarget<'_>,
    version: i64,
    nodes: I,
    store_leaf_values: bool,
) -> SnapshotResult<(Option<Node>, ExportSummary)>
where
    I: IntoIterator<Item = SnapshotNode>,
{
    let started = Instant::now();
    begin_generation(&mut *target.changelog, &mut *target.tree, version)?;
    info!(target: "arbor::snapshot", version, shard = target.shard, "Stream snapshot started");

    let mut versions = BTreeSet::new();
    let (mut leaves, mut branches) = (0u64, 0u64);
    let (root, stats) = {
        let mut writer = BatchWriter::new(
            &mut *target.changelog,
            &mut *target.tree,
            target.cancel,
            version,
            target.shard,
            target.batch_size,
        );
        writer.prepare()?;
        let mut source = StreamSource::new(nodes.into_iter());
        let root = walk_preorder(&mut source, 1, |item, ordinal, children| {
            let sequence = u32::try_from(ordinal)
                .map_err(|_| SnapshotError::corrupt(ordinal, "ordinal exceeds sequence range"))?;
            let node_key = NodeKey::new(item.version, sequence);

            let (mut node, durable) = match children {
                None => {
                    let mut leaf = Node::leaf(node_key, item.key, item.value);
                    leaf.compute_hash()?;
                    if !store_leaf_values {
                        leaf.clear_value();
                    }
                    leaves += 1;
                    (leaf, Durable::Leaf)
                }
                Some((left, right)) => {
                    let mut branch = Node::branch(node_key, item.key, left, right);
                    if branch.height() != item.height {
                        return Err(SnapshotError::corrupt(
                            ordinal,
                            format!(
                                "declared height {} but children give {}",
                                item.height,
                                branch.height()
                            ),
                        ));
                    }
                    branch.compute_hash()?;
                    versions.insert(item.version);
                    branches += 1;
                    (branch, Durable::Branch)
                }
            };

            let bytes = node.encode()?;
            writer.insert(ordinal, node_key, &bytes, durable)?;
            writer.maybe_flush()?;
            node.release_children();
            Ok(node)
        })?;
        (root, writer.finish()?)
    };

    let versions: Vec<i64> = versions.into_iter().collect();
    target.tree.map_versions(&versions, target.shard)?;

    let root_hash = root.as_ref().and_then(Node::hash);
    let shard_table = TableName::Tree(target.shard);
    info!(target: "arbor::snapshot", index = %shard_table.index_name(), "Creating shard index");
    target.tree.create_index(&shard_table)?;
    complete_generation(&mut *target.changelog, version, stats.rows, root_hash)?;
    info!(
        target: "arbor::snapshot",
        version,
        rows = stats.rows,
        leaves,
        branches,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Stream snapshot complete"
    );

    let summary = ExportSummary {
        version,
        rows: stats.rows,
        leaves,
        branches,
        flushes: stats.flushes,
        root_hash,
        versions,
        shard: Some(target.shard),
    };
    Ok((root, summary))
}
