//! Node content hashing
//!
//! SHA-256 over fixed-width little-endian integers and u32-length-prefixed
//! byte strings:
//!
//! ```text
//! leaf:     sha256( height=0 | size=1 | version | key | sha256(value) )
//! internal: sha256( height | size | version | left.hash | right.hash )
//! ```
//!
//! The internal hash does not cover the node's own key; a branch is
//! authenticated through its children.

use std::fmt;

use sha2::{Digest, Sha256};

/// Length of a node hash in bytes
pub const HASH_LEN: usize = 32;

/// SHA-256 content hash of a node
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct NodeHash([u8; HASH_LEN]);

impl NodeHash {
    /// Wrap raw hash bytes
    pub const fn from_bytes(bytes: [u8; HASH_LEN]) -> Self {
        NodeHash(bytes)
    }

    /// Wrap a slice, which must be exactly [`HASH_LEN`] bytes
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; HASH_LEN]>::try_from(bytes).ok().map(NodeHash)
    }

    /// Raw hash bytes
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Lowercase hex rendering
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Display for NodeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for NodeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeHash({})", self.to_hex())
    }
}

/// Hash of a leaf holding `value` under `key`, written at `version`
pub fn leaf_hash(key: &[u8], value: &[u8], version: i64) -> NodeHash {
    let value_hash = Sha256::digest(value);

    let mut hasher = Sha256::new();
    hasher.update(0i8.to_le_bytes());
    hasher.update(1i64.to_le_bytes());
    hasher.update(version.to_le_bytes());
    update_prefixed(&mut hasher, key);
    update_prefixed(&mut hasher, &value_hash);
    finish(hasher)
}

/// Hash of an internal node over its children's hashes
pub fn inner_hash(
    height: i8,
    size: i64,
    version: i64,
    left: &NodeHash,
    right: &NodeHash,
) -> NodeHash {
    let mut hasher = Sha256::new();
    hasher.update(height.to_le_bytes());
    hasher.update(size.to_le_bytes());
    hasher.update(version.to_le_bytes());
    update_prefixed(&mut hasher, left.as_bytes());
    update_prefixed(&mut hasher, right.as_bytes());
    finish(hasher)
}

fn update_prefixed(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u32).to_le_bytes());
    hasher.update(bytes);
}

fn finish(hasher: Sha256) -> NodeHash {
    let digest = hasher.finalize();
    let mut out = [0u8; HASH_LEN];
    out.copy_from_slice(&digest);
    NodeHash(out)
}
