//! Block pointers
//!
//! A `(block_offset, block_count)` pair locating a contiguous object span in
//! the `db` file.

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

use crate::error::{BlockError, Result};

use super::BLOCK_SIZE;

/// Encoded size: offset i64 (8) + count i32 (4)
pub const POINTER_SIZE: usize = 12;

/// Locates a contiguous span of blocks holding one object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BlockPointer {
    /// First block of the span
    pub block_offset: u64,
    /// Number of blocks in the span (0 only for the null pointer)
    pub block_count: u32,
}

impl BlockPointer {
    /// The null pointer `(0, 0)`, used for empty child slots
    pub const NULL: BlockPointer = BlockPointer {
        block_offset: 0,
        block_count: 0,
    };

    pub fn new(block_offset: u64, block_count: u32) -> Self {
        Self {
            block_offset,
            block_count,
        }
    }

    pub fn is_null(&self) -> bool {
        self.block_count == 0
    }

    /// Byte position of the span in the `db` file
    pub fn byte_offset(&self) -> u64 {
        self.block_offset * BLOCK_SIZE as u64
    }

    /// Length in bytes of the whole span, padding included
    pub fn byte_len(&self) -> usize {
        self.block_count as usize * BLOCK_SIZE
    }

    /// One past the last block of the span
    pub fn end(&self) -> u64 {
        self.block_offset + self.block_count as u64
    }

    /// Check the pointer names a real span inside the address space
    pub fn validate(&self, max_blocks: u64) -> Result<()> {
        if self.is_null() {
            return Err(BlockError::Corruption("null block pointer".to_string()));
        }
        if self.end() > max_blocks {
            return Err(BlockError::Corruption(format!(
                "block pointer {}+{} exceeds {} blocks",
                self.block_offset, self.block_count, max_blocks
            )));
        }
        Ok(())
    }

    /// Append the fixed-width wire form: offset i64 LE, count i32 LE
    pub fn encode_into<B: BufMut>(&self, buf: &mut B) {
        buf.put_i64_le(self.block_offset as i64);
        buf.put_i32_le(self.block_count as i32);
    }

    /// Read the fixed-width wire form
    pub fn decode_from<B: Buf>(buf: &mut B) -> Result<Self> {
        if buf.remaining() < POINTER_SIZE {
            return Err(BlockError::Corruption(format!(
                "truncated block pointer: {} bytes",
                buf.remaining()
            )));
        }
        let offset = buf.get_i64_le();
        let count = buf.get_i32_le();
        if offset < 0 || count < 0 {
            return Err(BlockError::Corruption(format!(
                "negative block pointer field: offset={}, count={}",
                offset, count
            )));
        }
        Ok(Self::new(offset as u64, count as u32))
    }
}
