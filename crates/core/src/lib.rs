//! Core types for arbor
//!
//! This crate defines the authenticated tree node and everything needed to
//! move it in and out of storage:
//!
//! - NodeKey: `(version, sequence)` identity of a node across generations
//! - Node: key, optional value, height, size, hash and child linkage
//! - NodeHash: SHA-256 content hash, computed bottom-up
//! - Byte codec: symmetric node encoding used by every storage table
//! - SnapshotNode: transfer record yielded by external pre-order generators
//! - NodePool: reusable node allocations for bulk import
//! - VersionedTree / MemTree: the live tree consumed by tree-driven export
//! - Bulk builder: balanced trees from sorted entries
//! - CancellationToken: cooperative cancellation signal

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod build;
pub mod cancel;
pub mod error;
pub mod hash;
pub mod node;
pub mod node_key;
pub mod pool;
pub mod snapshot_node;
pub mod tree;

pub use build::{build_balanced, Entry};
pub use cancel::CancellationToken;
pub use error::{CoreError, CoreResult};
pub use hash::{inner_hash, leaf_hash, NodeHash, HASH_LEN};
pub use node::{rehash_tree, Child, Node, Preorder, NODE_FORMAT_VERSION};
pub use node_key::NodeKey;
pub use pool::{NodePool, PoolStats};
pub use snapshot_node::{snapshot_stream, SnapshotNode};
pub use tree::{MemTree, VersionedTree};
