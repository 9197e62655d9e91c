//! Bulk construction of balanced trees
//!
//! Builds a height-balanced tree from key-sorted entries in one pass. Used to
//! seed trees for export and as a fixture generator; it is not an
//! incremental insert.
//!
//! Keys follow the usual layout:
//! - Leaves carry the entry's version
//! - Internal nodes take the newest version of their two children
//! - An internal node's key is the smallest key of its right subtree
//! - Sequences are assigned per version in post-order, starting at 1

use std::collections::BTreeMap;

use crate::error::{CoreError, CoreResult};
use crate::node::Node;
use crate::node_key::NodeKey;

/// One key/value pair to place in a leaf
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Leaf key
    pub key: Vec<u8>,
    /// Leaf value
    pub value: Vec<u8>,
    /// Version the leaf was written at
    pub version: i64,
}

impl Entry {
    /// Create an entry
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>, version: i64) -> Self {
        Entry {
            key: key.into(),
            value: value.into(),
            version,
        }
    }
}

/// Build a hashed, balanced tree from entries sorted by strictly ascending key
///
/// Returns `Ok(None)` for no entries.
pub fn build_balanced(entries: Vec<Entry>) -> CoreResult<Option<Node>> {
    if entries.is_empty() {
        return Ok(None);
    }
    if let Some(pair) = entries.windows(2).find(|pair| pair[0].key >= pair[1].key) {
        return Err(CoreError::invalid_tree(format!(
            "entries not strictly ascending at key {:?}",
            String::from_utf8_lossy(&pair[1].key)
        )));
    }

    let mut sequences = BTreeMap::new();
    build(entries, &mut sequences).map(Some)
}

// Recursion depth is log2(entries).
fn build(mut entries: Vec<Entry>, sequences: &mut BTreeMap<i64, u32>) -> CoreResult<Node> {
    if entries.len() == 1 {
        let entry = entries.remove(0);
        let mut leaf = Node::leaf(
            next_key(sequences, entry.version),
            entry.key,
            entry.value,
        );
        leaf.compute_hash()?;
        return Ok(leaf);
    }

    let right_entries = entries.split_off(entries.len() / 2);
    let split_key = right_entries[0].key.clone();
    let left = build(entries, sequences)?;
    let right = build(right_entries, sequences)?;

    let version = left.version().max(right.version());
    let mut node = Node::branch(next_key(sequences, version), split_key, left, right);
    node.compute_hash()?;
    Ok(node)
}

fn next_key(sequences: &mut BTreeMap<i64, u32>, version: i64) -> NodeKey {
    let sequence = sequences.entry(version).or_insert(0);
    *sequence += 1;
    NodeKey::new(version, *sequence)
}
