//! Pre-order walk shared by export and import
//!
//! Every traversal here has the same shape: take a node, then its left
//! subtree, then its right subtree, assigning consecutive ordinals in that
//! order. Only the place children come from differs:
//!
//! - [`TreeSource`]: children of an already materialized node
//! - [`StreamSource`]: the next items of an external pre-order generator
//! - the import cursor: the next rows of a compact table
//!
//! [`walk_preorder`] runs on an explicit stack. Ordinals are assigned when an
//! item is pulled (pre-order); `visit` runs once both children are done
//! (post-order), so a parent can combine its children's results.
//! [`walk_preorder_with`] also calls `enter` on each item as it is pulled,
//! for work that must happen in pre-order.

use std::fmt;

use arbor_core::{Child, CoreError, Node, SnapshotNode};

use crate::error::{SnapshotError, SnapshotResult};

/// Which child of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Left child
    Left,
    /// Right child
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => f.write_str("left"),
            Side::Right => f.write_str("right"),
        }
    }
}

/// Supplies the nodes of a pre-order walk
pub trait ChildSource {
    /// Node handle produced by this source
    type Item;

    /// The root, or `None` for an empty tree
    fn root(&mut self, ordinal: u64) -> SnapshotResult<Option<Self::Item>>;

    /// True if `item` has no children
    fn is_leaf(&self, item: &Self::Item) -> bool;

    /// The `side` child of `parent`, which will get `ordinal`
    ///
    /// Called for the left child right after the parent, and for the right
    /// child once the whole left subtree has been pulled.
    fn child(&mut self, parent: &Self::Item, side: Side, ordinal: u64)
        -> SnapshotResult<Self::Item>;
}

struct Frame<I, T> {
    item: I,
    ordinal: u64,
    left: Option<T>,
}

/// Walk `source` in pre-order starting at `first_ordinal`
///
/// `visit(item, ordinal, children)` is called with `None` for leaves and with
/// the results of the left and right subtree for internal nodes. Returns the
/// root's result, or `None` if the source is empty.
pub fn walk_preorder<S, T, F>(
    source: &mut S,
    first_ordinal: u64,
    visit: F,
) -> SnapshotResult<Option<T>>
where
    S: ChildSource,
    F: FnMut(S::Item, u64, Option<(T, T)>) -> SnapshotResult<T>,
{
    walk_preorder_with(source, first_ordinal, |_, _| Ok(()), visit)
}

/// [`walk_preorder`] with a pre-order hook
///
/// `enter(item, ordinal)` runs as soon as an item is pulled, before any of
/// its descendants, so `enter` calls arrive in ascending ordinal order.
pub fn walk_preorder_with<S, T, E, F>(
    source: &mut S,
    first_ordinal: u64,
    mut enter: E,
    mut visit: F,
) -> SnapshotResult<Option<T>>
where
    S: ChildSource,
    E: FnMut(&S::Item, u64) -> SnapshotResult<()>,
    F: FnMut(S::Item, u64, Option<(T, T)>) -> SnapshotResult<T>,
{
    let mut ordinal = first_ordinal;
    let mut next = match source.root(ordinal)? {
        Some(item) => item,
        None => return Ok(None),
    };
    let mut stack: Vec<Frame<S::Item, T>> = Vec::new();

    loop {
        let at = ordinal;
        ordinal += 1;
        enter(&next, at)?;

        // Descend the left spine
        if !source.is_leaf(&next) {
            let left = source.child(&next, Side::Left, ordinal)?;
            stack.push(Frame {
                item: next,
                ordinal: at,
                left: None,
            });
            next = left;
            continue;
        }
        let mut done = visit(next, at, None)?;

        // Climb until some ancestor still needs its right subtree
        loop {
            let left = match stack.last_mut() {
                None => return Ok(Some(done)),
                Some(frame) => match frame.left.take() {
                    None => {
                        frame.left = Some(done);
                        next = source.child(&frame.item, Side::Right, ordinal)?;
                        break;
                    }
                    Some(left) => left,
                },
            };
            if let Some(frame) = stack.pop() {
                done = visit(frame.item, frame.ordinal, Some((left, done)))?;
            }
        }
    }
}

/// Children of a fully materialized tree
#[derive(Debug)]
pub struct TreeSource<'a> {
    root: Option<&'a Node>,
}

impl<'a> TreeSource<'a> {
    /// Walk the tree under `root`
    pub fn new(root: Option<&'a Node>) -> Self {
        TreeSource { root }
    }
}

impl<'a> ChildSource for TreeSource<'a> {
    type Item = &'a Node;

    fn root(&mut self, _ordinal: u64) -> SnapshotResult<Option<&'a Node>> {
        Ok(self.root.take())
    }

    fn is_leaf(&self, item: &&'a Node) -> bool {
        item.is_leaf()
    }

    fn child(&mut self, parent: &&'a Node, side: Side, _ordinal: u64) -> SnapshotResult<&'a Node> {
        let parent: &'a Node = *parent;
        let slot = match side {
            Side::Left => parent.left(),
            Side::Right => parent.right(),
        };
        match slot {
            Some(Child::Loaded(node)) => Ok(&**node),
            Some(Child::Persisted(node_key)) => Err(CoreError::NotMaterialized {
                node_key: *node_key,
            }
            .into()),
            None => Err(CoreError::invalid_tree(format!(
                "internal node {} has no {} child",
                parent.node_key(),
                side
            ))
            .into()),
        }
    }
}

/// Items of an external pre-order generator
///
/// Each call pulls exactly one item. A child must declare a smaller height
/// than its parent, which bounds the walk depth by the root's height.
#[derive(Debug)]
pub struct StreamSource<I> {
    nodes: I,
}

impl<I> StreamSource<I>
where
    I: Iterator<Item = SnapshotNode>,
{
    /// Consume `nodes` in order
    pub fn new(nodes: I) -> Self {
        StreamSource { nodes }
    }

    fn pull(&mut self, ordinal: u64, what: fmt::Arguments<'_>) -> SnapshotResult<SnapshotNode> {
        let node = self.nodes.next().ok_or_else(|| {
            SnapshotError::corrupt(ordinal, format!("node stream ended before {}", what))
        })?;
        if node.height < 0 {
            return Err(SnapshotError::corrupt(
                ordinal,
                format!("negative declared height {}", node.height),
            ));
        }
        Ok(node)
    }
}

impl<I> ChildSource for StreamSource<I>
where
    I: Iterator<Item = SnapshotNode>,
{
    type Item = SnapshotNode;

    fn root(&mut self, ordinal: u64) -> SnapshotResult<Option<SnapshotNode>> {
        match self.nodes.next() {
            Some(node) if node.height < 0 => Err(SnapshotError::corrupt(
                ordinal,
                format!("negative declared height {}", node.height),
            )),
            other => Ok(other),
        }
    }

    fn is_leaf(&self, item: &SnapshotNode) -> bool {
        item.is_leaf()
    }

    fn child(
        &mut self,
        parent: &SnapshotNode,
        side: Side,
        ordinal: u64,
    ) -> SnapshotResult<SnapshotNode> {
        let child = self.pull(ordinal, format_args!("{} child", side))?;
        if child.height >= parent.height {
            return Err(SnapshotError::corrupt(
                ordinal,
                format!(
                    "{} child height {} not below parent height {}",
                    side, child.height, parent.height
                ),
            ));
        }
        Ok(child)
    }
}
