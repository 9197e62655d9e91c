//! Node pool
//!
//! Bulk import decodes millions of nodes and throws most leaves away again.
//! The pool keeps released nodes around so their key buffers are reused by
//! the next decode. Shared between readers behind a `parking_lot::Mutex`.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::CoreResult;
use crate::node::Node;
use crate::node_key::NodeKey;

/// Default number of released nodes kept for reuse
pub const DEFAULT_POOL_CAPACITY: usize = 4096;

/// Reusable node allocations
#[derive(Debug)]
pub struct NodePool {
    free: Mutex<Vec<Node>>,
    capacity: usize,
    acquired: AtomicU64,
    released: AtomicU64,
}

/// Counters describing pool traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Nodes handed out by `acquire`
    pub acquired: u64,
    /// Nodes given back through `release`
    pub released: u64,
    /// Nodes currently waiting for reuse
    pub available: usize,
}

impl NodePool {
    /// Create a pool keeping at most `capacity` released nodes
    pub fn new(capacity: usize) -> Self {
        NodePool {
            free: Mutex::new(Vec::new()),
            capacity,
            acquired: AtomicU64::new(0),
            released: AtomicU64::new(0),
        }
    }

    /// Decode `bytes` stored under `node_key` into a pooled node
    pub fn acquire(&self, node_key: NodeKey, bytes: &[u8]) -> CoreResult<Node> {
        let mut node = self.free.lock().pop().unwrap_or_default();
        if let Err(e) = node.decode_from(node_key, bytes) {
            self.put_back(node);
            return Err(e);
        }
        self.acquired.fetch_add(1, Ordering::Relaxed);
        Ok(node)
    }

    /// Return a node for reuse
    pub fn release(&self, node: Node) {
        self.released.fetch_add(1, Ordering::Relaxed);
        self.put_back(node);
    }

    fn put_back(&self, mut node: Node) {
        node.reset();
        let mut free = self.free.lock();
        if free.len() < self.capacity {
            free.push(node);
        }
    }

    /// Number of nodes waiting for reuse
    pub fn available(&self) -> usize {
        self.free.lock().len()
    }

    /// Snapshot of pool counters
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            acquired: self.acquired.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            available: self.available(),
        }
    }
}

impl Default for NodePool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY)
    }
}
