//! Transfer record for externally driven export
//!
//! An external generator yields `SnapshotNode`s in pre-order; the exporter
//! turns them into persisted nodes with assigned keys. The generator never
//! sees storage details.

use crate::node::Node;

/// One node of an externally generated pre-order stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotNode {
    /// Partition key
    pub key: Vec<u8>,
    /// Leaf payload; empty for internal nodes
    pub value: Vec<u8>,
    /// Version that wrote the node
    pub version: i64,
    /// Declared subtree height, 0 for leaves
    pub height: i8,
}

impl SnapshotNode {
    /// Leaf record
    pub fn leaf(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>, version: i64) -> Self {
        SnapshotNode {
            key: key.into(),
            value: value.into(),
            version,
            height: 0,
        }
    }

    /// Internal node record
    pub fn branch(key: impl Into<Vec<u8>>, version: i64, height: i8) -> Self {
        SnapshotNode {
            key: key.into(),
            value: Vec::new(),
            version,
            height,
        }
    }

    /// True iff the declared height is 0
    pub fn is_leaf(&self) -> bool {
        self.height == 0
    }
}

impl From<&Node> for SnapshotNode {
    fn from(node: &Node) -> Self {
        SnapshotNode {
            key: node.key().to_vec(),
            value: node.value().map(<[u8]>::to_vec).unwrap_or_default(),
            version: node.version(),
            height: node.height(),
        }
    }
}

/// Pre-order stream of a materialized tree, as an external generator would yield it
pub fn snapshot_stream(root: &Node) -> impl Iterator<Item = SnapshotNode> + '_ {
    root.preorder().map(SnapshotNode::from)
}
