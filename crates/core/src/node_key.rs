//! Node identity
//!
//! A node is addressed by the version that wrote it plus a sequence number
//! within that version. Encoded form is 12 bytes: `[version: i64 LE][sequence: u32 LE]`.

use std::fmt;
use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

/// Identity of a node across all tree generations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct NodeKey {
    version: i64,
    sequence: u32,
}

impl NodeKey {
    /// Size of the encoded form in bytes
    pub const ENCODED_LEN: usize = 12;

    /// Create a node key
    pub const fn new(version: i64, sequence: u32) -> Self {
        NodeKey { version, sequence }
    }

    /// Version that wrote the node
    pub const fn version(&self) -> i64 {
        self.version
    }

    /// Sequence of the node within its version
    pub const fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Write the 12-byte encoding
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_i64::<LittleEndian>(self.version)?;
        writer.write_u32::<LittleEndian>(self.sequence)
    }

    /// Read the 12-byte encoding
    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let version = reader.read_i64::<LittleEndian>()?;
        let sequence = reader.read_u32::<LittleEndian>()?;
        Ok(NodeKey { version, sequence })
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.version, self.sequence)
    }
}
