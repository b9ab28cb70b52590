//! B-tree node record
//!
//! ## Layout (2539 bytes, stored as a single-block object)
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ keys: NODE_KEYS x KEY_LEN bytes, zero-padded                 │
//! ├──────────────────────────────────────────────────────────────┤
//! │ children: (NODE_KEYS+1) x [offset: i64 LE][count: i32 LE]    │
//! ├──────────┬────────────────┬──────────────────────────────────┤
//! │ kind (1) │ key count (2)  │ CRC32 of all preceding bytes (4) │
//! └──────────┴────────────────┴──────────────────────────────────┘
//! ```
//!
//! A leaf's `children[i]` is the value object of `keys[i]`. An internal
//! node's `children[i]` holds keys in `[keys[i-1], keys[i])`.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{BlockError, Result};
use crate::storage::{BlockPointer, POINTER_SIZE};

/// Maximum number of keys in a node
pub const NODE_KEYS: usize = 10;

/// Width of one key field in bytes
pub const KEY_LEN: usize = 240;

/// Fewest keys a non-root node may hold
pub const MIN_KEYS: usize = (NODE_KEYS + 1).div_ceil(2) - 1;

/// Fixed key and pointer fields
const BODY_SIZE: usize = NODE_KEYS * KEY_LEN + (NODE_KEYS + 1) * POINTER_SIZE;

/// Encoded node size: body + kind (1) + key count (2) + CRC (4)
pub const NODE_SIZE: usize = BODY_SIZE + 1 + 2 + 4;

/// Leaf or internal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NodeKind {
    Leaf = 0x00,
    Internal = 0x01,
}

/// Decoded B-tree node
///
/// Holds one extra key while an overflow is being split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BTreeNode {
    pub kind: NodeKind,
    pub keys: Vec<String>,
    pub children: Vec<BlockPointer>,
}

impl BTreeNode {
    /// An empty leaf, the root of a new index
    pub fn empty_leaf() -> Self {
        Self::leaf(Vec::new(), Vec::new())
    }

    pub fn leaf(keys: Vec<String>, values: Vec<BlockPointer>) -> Self {
        Self {
            kind: NodeKind::Leaf,
            keys,
            children: values,
        }
    }

    pub fn internal(keys: Vec<String>, children: Vec<BlockPointer>) -> Self {
        Self {
            kind: NodeKind::Internal,
            keys,
            children,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.kind == NodeKind::Leaf
    }

    /// Binary search for `key` among this node's keys
    pub fn search(&self, key: &str) -> std::result::Result<usize, usize> {
        self.keys.binary_search_by(|k| k.as_str().cmp(key))
    }

    /// Index of the child to descend into for `key`
    pub fn child_index(&self, key: &str) -> usize {
        self.keys.partition_point(|k| k.as_str() <= key)
    }

    /// Split an overflowing node in half
    ///
    /// Returns the separator to insert into the parent and the new right
    /// sibling. A leaf's separator is a copy of the right sibling's first
    /// key; an internal node's median moves up.
    pub fn split(&mut self) -> (String, BTreeNode) {
        let mid = self.keys.len() / 2;
        match self.kind {
            NodeKind::Leaf => {
                let keys = self.keys.split_off(mid);
                let values = self.children.split_off(mid);
                let separator = keys[0].clone();
                (separator, BTreeNode::leaf(keys, values))
            }
            NodeKind::Internal => {
                let keys = self.keys.split_off(mid + 1);
                let children = self.children.split_off(mid + 1);
                let separator = self.keys.pop().unwrap_or_default();
                (separator, BTreeNode::internal(keys, children))
            }
        }
    }

    /// Append `right` (the next sibling) to this node
    ///
    /// Internal nodes pull the parent's `separator` down between the two
    /// halves; leaves drop it.
    pub fn merge(&mut self, separator: String, right: BTreeNode) {
        if !self.is_leaf() {
            self.keys.push(separator);
        }
        self.keys.extend(right.keys);
        self.children.extend(right.children);
    }

    /// Encode to the fixed-width record
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.keys.len() > NODE_KEYS {
            return Err(BlockError::Corruption(format!(
                "node holds {} keys, limit is {}",
                self.keys.len(),
                NODE_KEYS
            )));
        }
        let expected_children = match self.kind {
            NodeKind::Leaf => self.keys.len(),
            NodeKind::Internal => self.keys.len() + 1,
        };
        if self.children.len() != expected_children {
            return Err(BlockError::Corruption(format!(
                "node with {} keys has {} children",
                self.keys.len(),
                self.children.len()
            )));
        }

        let mut buf = BytesMut::with_capacity(NODE_SIZE);

        for i in 0..NODE_KEYS {
            let mut field = [0u8; KEY_LEN];
            if let Some(key) = self.keys.get(i) {
                validate_key(key)?;
                field[..key.len()].copy_from_slice(key.as_bytes());
            }
            buf.put_slice(&field);
        }

        for i in 0..=NODE_KEYS {
            let child = self.children.get(i).copied().unwrap_or(BlockPointer::NULL);
            child.encode_into(&mut buf);
        }

        buf.put_u8(self.kind as u8);
        buf.put_u16_le(self.keys.len() as u16);
        let crc = crc32fast::hash(&buf);
        buf.put_u32_le(crc);

        Ok(buf.to_vec())
    }

    /// Decode and structurally validate a record
    ///
    /// `bytes` may carry trailing block padding.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < NODE_SIZE {
            return Err(BlockError::Corruption(format!(
                "node record is {} bytes, expected {}",
                bytes.len(),
                NODE_SIZE
            )));
        }

        let stored_crc = u32::from_le_bytes([
            bytes[NODE_SIZE - 4],
            bytes[NODE_SIZE - 3],
            bytes[NODE_SIZE - 2],
            bytes[NODE_SIZE - 1],
        ]);
        let computed_crc = crc32fast::hash(&bytes[..NODE_SIZE - 4]);
        if stored_crc != computed_crc {
            return Err(BlockError::Corruption(format!(
                "node CRC mismatch: stored {:08x}, computed {:08x}",
                stored_crc, computed_crc
            )));
        }

        let mut trailer = &bytes[BODY_SIZE..NODE_SIZE - 4];
        let kind = match trailer.get_u8() {
            0x00 => NodeKind::Leaf,
            0x01 => NodeKind::Internal,
            other => {
                return Err(BlockError::Corruption(format!(
                    "unknown node kind: 0x{:02x}",
                    other
                )))
            }
        };
        let count = trailer.get_u16_le() as usize;
        if count > NODE_KEYS {
            return Err(BlockError::Corruption(format!(
                "node key count {} exceeds {}",
                count, NODE_KEYS
            )));
        }
        if kind == NodeKind::Internal && count == 0 {
            return Err(BlockError::Corruption(
                "internal node without keys".to_string(),
            ));
        }

        let mut keys = Vec::with_capacity(count);
        for field in bytes[..NODE_KEYS * KEY_LEN].chunks_exact(KEY_LEN).take(count) {
            let len = field.iter().position(|&b| b == 0).unwrap_or(KEY_LEN);
            if len == 0 {
                return Err(BlockError::Corruption("empty key in node".to_string()));
            }
            let key = std::str::from_utf8(&field[..len])
                .map_err(|e| BlockError::Corruption(format!("key is not UTF-8: {}", e)))?;
            keys.push(key.to_string());
        }
        if keys.windows(2).any(|w| w[0] >= w[1]) {
            return Err(BlockError::Corruption(
                "node keys out of order".to_string(),
            ));
        }

        let used = match kind {
            NodeKind::Leaf => count,
            NodeKind::Internal => count + 1,
        };
        let mut pointers = &bytes[NODE_KEYS * KEY_LEN..BODY_SIZE];
        let mut children = Vec::with_capacity(used);
        for i in 0..=NODE_KEYS {
            let child = BlockPointer::decode_from(&mut pointers)?;
            if i < used {
                if child.is_null() {
                    return Err(BlockError::Corruption(format!(
                        "null child {} in node with {} keys",
                        i, count
                    )));
                }
                children.push(child);
            } else if !child.is_null() {
                return Err(BlockError::Corruption(format!(
                    "unexpected child {} in node with {} keys",
                    i, count
                )));
            }
        }

        Ok(Self {
            kind,
            keys,
            children,
        })
    }
}

/// Check a key is storable in a node key field
///
/// Keys are single protocol tokens: non-empty, at most `KEY_LEN` bytes, no
/// NUL and no whitespace.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(BlockError::Argument("Key is empty.".to_string()));
    }
    if key.len() > KEY_LEN {
        return Err(BlockError::Argument(format!(
            "Key is {} bytes, limit is {}.",
            key.len(),
            KEY_LEN
        )));
    }
    if key.bytes().any(|b| b == 0 || b.is_ascii_whitespace()) {
        return Err(BlockError::Argument(
            "Key contains NUL or whitespace.".to_string(),
        ));
    }
    Ok(())
}
