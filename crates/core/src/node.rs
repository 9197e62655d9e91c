//! Authenticated tree node
//!
//! A node is either a leaf (height 0, size 1, carries a value) or an internal
//! node with exactly two children. Children are held in one of two states:
//!
//! - [`Child::Loaded`]: the child is owned in memory (during construction or
//!   verification)
//! - [`Child::Persisted`]: only the child's [`NodeKey`] is known
//!
//! A child is never both; once a node is persisted its children are released
//! back to key-only references.
//!
//! ## Byte Format (Version 0x01)
//!
//! ```text
//! [Format: u8]
//! [Height: i8]
//! [Size: i64 LE]
//! [Key Length: u32 LE][Key]
//! [Hash: 32 bytes]
//! Leaf:
//!   [Has Value: u8 (0 or 1)]
//!   If has value: [Value Length: u32 LE][Value]
//! Internal:
//!   [Left NodeKey: 12 bytes][Right NodeKey: 12 bytes]
//! ```
//!
//! The node's own version and sequence are not part of the bytes; they come
//! from the row the bytes are stored in.

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{CoreError, CoreResult};
use crate::hash::{inner_hash, leaf_hash, NodeHash, HASH_LEN};
use crate::node_key::NodeKey;

/// Node byte format version
pub const NODE_FORMAT_VERSION: u8 = 0x01;

/// A child slot of an internal node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Child {
    /// Child owned in memory
    Loaded(Box<Node>),
    /// Child known only by its identity
    Persisted(NodeKey),
}

impl Child {
    /// Identity of the child, whichever state it is in
    pub fn node_key(&self) -> NodeKey {
        match self {
            Child::Loaded(node) => node.node_key,
            Child::Persisted(key) => *key,
        }
    }

    /// The in-memory child, if loaded
    pub fn node(&self) -> Option<&Node> {
        match self {
            Child::Loaded(node) => Some(node),
            Child::Persisted(_) => None,
        }
    }

    /// True if the child is held in memory
    pub fn is_loaded(&self) -> bool {
        matches!(self, Child::Loaded(_))
    }

    fn hash(&self) -> Option<NodeHash> {
        self.node().and_then(|node| node.hash)
    }
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Left,
    Right,
}

impl Side {
    fn name(self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}

/// Authenticated tree node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node {
    key: Vec<u8>,
    value: Option<Vec<u8>>,
    height: i8,
    size: i64,
    hash: Option<NodeHash>,
    node_key: NodeKey,
    left: Option<Child>,
    right: Option<Child>,
}

impl Node {
    /// Create an unhashed leaf
    pub fn leaf(node_key: NodeKey, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Node {
            key: key.into(),
            value: Some(value.into()),
            height: 0,
            size: 1,
            hash: None,
            node_key,
            left: None,
            right: None,
        }
    }

    /// Create an unhashed internal node owning both children
    ///
    /// Height and size are derived from the children.
    pub fn branch(node_key: NodeKey, key: impl Into<Vec<u8>>, left: Node, right: Node) -> Self {
        Node {
            key: key.into(),
            value: None,
            height: left.height.max(right.height).saturating_add(1),
            size: left.size + right.size,
            hash: None,
            node_key,
            left: Some(Child::Loaded(Box::new(left))),
            right: Some(Child::Loaded(Box::new(right))),
        }
    }

    /// Partition key
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Leaf payload; `None` on internal nodes and on value-pruned leaves
    pub fn value(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }

    /// Subtree height, 0 for leaves
    pub fn height(&self) -> i8 {
        self.height
    }

    /// Number of leaves in the subtree
    pub fn size(&self) -> i64 {
        self.size
    }

    /// Content hash, if computed or decoded
    pub fn hash(&self) -> Option<NodeHash> {
        self.hash
    }

    /// Identity of this node
    pub fn node_key(&self) -> NodeKey {
        self.node_key
    }

    /// Version that wrote this node
    pub fn version(&self) -> i64 {
        self.node_key.version()
    }

    /// True iff height is 0
    pub fn is_leaf(&self) -> bool {
        self.height == 0
    }

    /// Left child slot
    pub fn left(&self) -> Option<&Child> {
        self.left.as_ref()
    }

    /// Right child slot
    pub fn right(&self) -> Option<&Child> {
        self.right.as_ref()
    }

    /// Left child, if held in memory
    pub fn left_node(&self) -> Option<&Node> {
        self.left.as_ref().and_then(Child::node)
    }

    /// Right child, if held in memory
    pub fn right_node(&self) -> Option<&Node> {
        self.right.as_ref().and_then(Child::node)
    }

    /// Identity of the left child
    pub fn left_key(&self) -> Option<NodeKey> {
        self.left.as_ref().map(Child::node_key)
    }

    /// Identity of the right child
    pub fn right_key(&self) -> Option<NodeKey> {
        self.right.as_ref().map(Child::node_key)
    }

    /// Drop the leaf value from storage; the hash is unaffected
    pub fn clear_value(&mut self) {
        self.value = None;
    }

    /// Forget the stored hash
    pub fn clear_hash(&mut self) {
        self.hash = None;
    }

    /// Compute and store the content hash
    ///
    /// Leaves need their value; internal nodes need both children loaded and
    /// already hashed.
    pub fn compute_hash(&mut self) -> CoreResult<NodeHash> {
        let version = self.node_key.version();
        let hash = if self.is_leaf() {
            let value = self.value.as_deref().ok_or(CoreError::MissingValue {
                node_key: self.node_key,
            })?;
            leaf_hash(&self.key, value, version)
        } else {
            let left = self.child_hash(Side::Left)?;
            let right = self.child_hash(Side::Right)?;
            inner_hash(self.height, self.size, version, &left, &right)
        };
        self.hash = Some(hash);
        Ok(hash)
    }

    fn child_hash(&self, side: Side) -> CoreResult<NodeHash> {
        let slot = match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        };
        slot.as_ref()
            .and_then(Child::hash)
            .ok_or(CoreError::MissingChildHash {
                node_key: self.node_key,
                side: side.name(),
            })
    }

    /// Release in-memory children, keeping only their keys
    pub fn release_children(&mut self) {
        for slot in [&mut self.left, &mut self.right] {
            if let Some(child) = slot.take() {
                *slot = Some(Child::Persisted(child.node_key()));
            }
        }
    }

    /// Attach decoded children to this node's recorded child keys
    ///
    /// Each present child must carry exactly the key this node recorded for
    /// that side.
    pub fn attach_children(&mut self, left: Option<Node>, right: Option<Node>) -> CoreResult<()> {
        if let Some(left) = left {
            self.attach(Side::Left, left)?;
        }
        if let Some(right) = right {
            self.attach(Side::Right, right)?;
        }
        Ok(())
    }

    fn attach(&mut self, side: Side, child: Node) -> CoreResult<()> {
        let node_key = self.node_key;
        let slot = match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        };
        let expected = slot.as_ref().map(Child::node_key).ok_or_else(|| {
            CoreError::invalid_tree(format!("node {} has no {} child slot", node_key, side.name()))
        })?;
        if expected != child.node_key {
            return Err(CoreError::invalid_tree(format!(
                "node {} records {} child {} but got {}",
                node_key,
                side.name(),
                expected,
                child.node_key
            )));
        }
        *slot = Some(Child::Loaded(Box::new(child)));
        Ok(())
    }

    fn take_loaded(&mut self, side: Side) -> Option<Node> {
        let slot = match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        };
        match slot.take() {
            Some(Child::Loaded(node)) => {
                *slot = Some(Child::Persisted(node.node_key));
                Some(*node)
            }
            other => {
                *slot = other;
                None
            }
        }
    }

    /// Check height and size against loaded children
    fn check_shape(&self) -> CoreResult<()> {
        if let (Some(left), Some(right)) = (self.left_node(), self.right_node()) {
            if self.size != left.size + right.size {
                return Err(CoreError::invalid_tree(format!(
                    "node {} size {} != {} + {}",
                    self.node_key, self.size, left.size, right.size
                )));
            }
            if self.height != left.height.max(right.height).saturating_add(1) {
                return Err(CoreError::invalid_tree(format!(
                    "node {} height {} inconsistent with children {} and {}",
                    self.node_key, self.height, left.height, right.height
                )));
            }
        }
        Ok(())
    }

    /// Pre-order walk over the materialized part of this subtree
    pub fn preorder(&self) -> Preorder<'_> {
        Preorder { stack: vec![self] }
    }

    /// Encoded length in bytes
    pub fn encoded_len(&self) -> usize {
        let body = if self.is_leaf() {
            1 + self.value.as_ref().map_or(0, |v| 4 + v.len())
        } else {
            2 * NodeKey::ENCODED_LEN
        };
        1 + 1 + 8 + 4 + self.key.len() + HASH_LEN + body
    }

    /// Encode all persisted fields
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut buf)?;
        Ok(buf)
    }

    /// Encode all persisted fields, appending to `writer`
    pub fn encode_into<W: Write>(&self, writer: &mut W) -> CoreResult<()> {
        let hash = self.hash.ok_or(CoreError::MissingHash {
            node_key: self.node_key,
        })?;

        writer.write_u8(NODE_FORMAT_VERSION)?;
        writer.write_i8(self.height)?;
        writer.write_i64::<LittleEndian>(self.size)?;
        writer.write_u32::<LittleEndian>(field_len(self.key.len(), "key", self.node_key)?)?;
        writer.write_all(&self.key)?;
        writer.write_all(hash.as_bytes())?;

        if self.is_leaf() {
            match &self.value {
                Some(value) => {
                    writer.write_u8(1)?;
                    let len = field_len(value.len(), "value", self.node_key)?;
                    writer.write_u32::<LittleEndian>(len)?;
                    writer.write_all(value)?;
                }
                None => writer.write_u8(0)?,
            }
        } else {
            let (left, right) = match (self.left_key(), self.right_key()) {
                (Some(left), Some(right)) => (left, right),
                _ => {
                    return Err(CoreError::invalid_tree(format!(
                        "internal node {} lacks a child",
                        self.node_key
                    )))
                }
            };
            left.write_to(writer)?;
            right.write_to(writer)?;
        }
        Ok(())
    }

    /// Decode a node stored under `node_key`
    pub fn decode(node_key: NodeKey, bytes: &[u8]) -> CoreResult<Node> {
        let mut node = Node::default();
        node.decode_from(node_key, bytes)?;
        Ok(node)
    }

    /// Decode into this node, reusing its key buffer
    pub fn decode_from(&mut self, node_key: NodeKey, bytes: &[u8]) -> CoreResult<()> {
        let mut reader = Cursor::new(bytes);

        let format = reader.read_u8().map_err(truncated)?;
        if format != NODE_FORMAT_VERSION {
            return Err(CoreError::decode(format!(
                "unsupported node format {:#04x}",
                format
            )));
        }

        let height = reader.read_i8().map_err(truncated)?;
        if height < 0 {
            return Err(CoreError::decode(format!("negative height {}", height)));
        }
        let size = reader.read_i64::<LittleEndian>().map_err(truncated)?;
        if size < 1 || (height == 0 && size != 1) {
            return Err(CoreError::decode(format!(
                "size {} invalid for height {}",
                size, height
            )));
        }

        let key_len = reader.read_u32::<LittleEndian>().map_err(truncated)? as usize;
        let key = take(&mut reader, key_len)?;
        self.key.clear();
        self.key.extend_from_slice(key);

        let mut hash = [0u8; HASH_LEN];
        reader.read_exact(&mut hash).map_err(truncated)?;

        if height == 0 {
            self.value = match reader.read_u8().map_err(truncated)? {
                0 => None,
                1 => {
                    let len = reader.read_u32::<LittleEndian>().map_err(truncated)? as usize;
                    Some(take(&mut reader, len)?.to_vec())
                }
                flag => {
                    return Err(CoreError::decode(format!("invalid value flag {}", flag)));
                }
            };
            self.left = None;
            self.right = None;
        } else {
            let left = NodeKey::read_from(&mut reader).map_err(truncated)?;
            let right = NodeKey::read_from(&mut reader).map_err(truncated)?;
            self.value = None;
            self.left = Some(Child::Persisted(left));
            self.right = Some(Child::Persisted(right));
        }

        let consumed = reader.position() as usize;
        if consumed != bytes.len() {
            return Err(CoreError::decode(format!(
                "{} trailing bytes",
                bytes.len() - consumed
            )));
        }

        self.height = height;
        self.size = size;
        self.hash = Some(NodeHash::from_bytes(hash));
        self.node_key = node_key;
        Ok(())
    }

    /// Clear every field, keeping the key buffer's allocation
    pub(crate) fn reset(&mut self) {
        self.key.clear();
        self.value = None;
        self.height = 0;
        self.size = 0;
        self.hash = None;
        self.node_key = NodeKey::default();
        self.left = None;
        self.right = None;
    }
}

/// Length prefix for a key or value; encoded lengths are 32-bit
fn field_len(len: usize, field: &str, node_key: NodeKey) -> CoreResult<u32> {
    u32::try_from(len).map_err(|_| {
        CoreError::invalid_tree(format!(
            "{} of node {} is {} bytes, above the 32-bit length limit",
            field, node_key, len
        ))
    })
}

fn truncated(err: std::io::Error) -> CoreError {
    CoreError::decode(format!("truncated node bytes: {}", err))
}

fn take<'a>(reader: &mut Cursor<&'a [u8]>, len: usize) -> CoreResult<&'a [u8]> {
    let data: &'a [u8] = *reader.get_ref();
    let start = reader.position() as usize;
    let end = start
        .checked_add(len)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| {
            CoreError::decode(format!(
                "length {} exceeds remaining {} bytes",
                len,
                data.len().saturating_sub(start)
            ))
        })?;
    reader.set_position(end as u64);
    Ok(&data[start..end])
}

/// Pre-order (node, left, right) iterator over materialized nodes
#[derive(Debug)]
pub struct Preorder<'a> {
    stack: Vec<&'a Node>,
}

impl<'a> Iterator for Preorder<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<&'a Node> {
        let node = self.stack.pop()?;
        if let Some(right) = node.right_node() {
            self.stack.push(right);
        }
        if let Some(left) = node.left_node() {
            self.stack.push(left);
        }
        Some(node)
    }
}

/// Recompute every hash in the materialized tree bottom-up
///
/// For each node, the stored hash is cleared and recomputed from content,
/// then `check` is called with the node (now carrying the new hash) and the
/// hash it held before. Leaves whose value was pruned keep their stored hash.
/// After `check` passes, size and height are validated against the children.
///
/// Runs on an explicit stack; tree height does not bound the call depth.
pub fn rehash_tree<E, F>(root: Node, mut check: F) -> Result<Node, E>
where
    E: From<CoreError>,
    F: FnMut(&Node, Option<NodeHash>) -> Result<(), E>,
{
    enum Frame {
        Visit(Node),
        Finish {
            node: Node,
            has_left: bool,
            has_right: bool,
        },
    }

    let mut work = vec![Frame::Visit(root)];
    let mut done: Vec<Node> = Vec::new();

    while let Some(frame) = work.pop() {
        match frame {
            Frame::Visit(mut node) => {
                let left = node.take_loaded(Side::Left);
                let right = node.take_loaded(Side::Right);
                work.push(Frame::Finish {
                    node,
                    has_left: left.is_some(),
                    has_right: right.is_some(),
                });
                if let Some(right) = right {
                    work.push(Frame::Visit(right));
                }
                if let Some(left) = left {
                    work.push(Frame::Visit(left));
                }
            }
            Frame::Finish {
                mut node,
                has_left,
                has_right,
            } => {
                let right = if has_right { done.pop() } else { None };
                let left = if has_left { done.pop() } else { None };
                node.attach_children(left, right)?;

                let stored = node.hash.take();
                if node.is_leaf() && node.value.is_none() {
                    node.hash = Some(stored.ok_or(CoreError::MissingHash {
                        node_key: node.node_key,
                    })?);
                } else {
                    node.compute_hash()?;
                }
                check(&node, stored)?;
                node.check_shape()?;
                done.push(node);
            }
        }
    }

    done.pop()
        .ok_or_else(|| CoreError::invalid_tree("rehash produced no root").into())
}
