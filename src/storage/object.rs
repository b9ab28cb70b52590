//! Object Store
//!
//! Byte blobs stored as whole, zero-padded block spans in the sparse `db`
//! file. An object's identity is its [`BlockPointer`].
//!
//! ## Concurrency
//! Byte I/O uses positioned reads and writes on a shared file handle and
//! takes no lock: a span returned by the allocator belongs exclusively to
//! the caller until it is released.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::Arc;

use crate::error::{BlockError, Result};

use super::{BlockAllocator, BlockPointer, BLOCK_SIZE};

/// Reads, writes and deletes objects at block granularity
pub struct ObjectStore {
    /// The block-addressed `db` file
    file: File,
    /// Space management for the file
    allocator: Arc<BlockAllocator>,
}

impl ObjectStore {
    /// Open or create the `db` file at `path`
    pub fn open(path: &Path, allocator: Arc<BlockAllocator>) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        Ok(Self { file, allocator })
    }

    /// Number of blocks needed to hold `len` bytes
    pub fn blocks_for(len: usize) -> u64 {
        len.div_ceil(BLOCK_SIZE) as u64
    }

    /// Store `bytes` in a freshly reserved span
    ///
    /// On a write failure the reservation is released again before the
    /// error is returned.
    pub fn write(&self, bytes: &[u8]) -> Result<BlockPointer> {
        if bytes.is_empty() {
            return Err(BlockError::Argument(
                "Cannot store an empty object.".to_string(),
            ));
        }
        let blocks = Self::blocks_for(bytes.len());
        let block_count = u32::try_from(blocks)
            .ok()
            .filter(|&c| c <= i32::MAX as u32)
            .ok_or(BlockError::AllocationFailure { blocks })?;

        let offset = self.allocator.reserve(blocks)?;
        let ptr = BlockPointer::new(offset, block_count);

        if let Err(e) = self.write_span(ptr, bytes) {
            tracing::warn!(
                "Write of {} bytes at block {} failed: {}",
                bytes.len(),
                offset,
                e
            );
            self.release_or_warn(ptr);
            return Err(e);
        }

        tracing::trace!("Wrote {} bytes to {:?}", bytes.len(), ptr);
        Ok(ptr)
    }

    /// Read the whole span named by `ptr`, trailing zero padding included
    pub fn read(&self, ptr: BlockPointer) -> Result<Vec<u8>> {
        ptr.validate(self.allocator.max_blocks())?;

        let mut buffer = vec![0u8; ptr.byte_len()];
        let mut filled = 0;
        while filled < buffer.len() {
            let n = self
                .file
                .read_at(&mut buffer[filled..], ptr.byte_offset() + filled as u64)?;
            if n == 0 {
                // Past the end of the sparse file; the rest reads as zeros
                break;
            }
            filled += n;
        }

        Ok(buffer)
    }

    /// Overwrite an existing span in place
    ///
    /// `bytes` must occupy exactly `ptr.block_count` blocks. The allocator
    /// is not touched.
    pub fn update(&self, ptr: BlockPointer, bytes: &[u8]) -> Result<()> {
        ptr.validate(self.allocator.max_blocks())?;
        if Self::blocks_for(bytes.len()) != ptr.block_count as u64 {
            return Err(BlockError::Argument(format!(
                "Update of {} bytes does not fit the {}-block span at {}.",
                bytes.len(),
                ptr.block_count,
                ptr.block_offset
            )));
        }
        self.write_span(ptr, bytes)
    }

    /// Zero the span named by `ptr`, then release it
    ///
    /// If zeroing fails the blocks stay reserved. A failed release is only
    /// logged as a potential leak.
    pub fn delete(&self, ptr: BlockPointer) -> Result<()> {
        ptr.validate(self.allocator.max_blocks())?;

        let zeros = vec![0u8; ptr.byte_len()];
        self.file.write_all_at(&zeros, ptr.byte_offset())?;

        self.release_or_warn(ptr);
        tracing::trace!("Deleted {:?}", ptr);
        Ok(())
    }

    /// Flush file contents to stable storage
    pub fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// The allocator backing this store
    pub fn allocator(&self) -> &Arc<BlockAllocator> {
        &self.allocator
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Write `bytes` zero-padded to the full span
    fn write_span(&self, ptr: BlockPointer, bytes: &[u8]) -> Result<()> {
        let mut buffer = vec![0u8; ptr.byte_len()];
        buffer[..bytes.len()].copy_from_slice(bytes);
        self.file.write_all_at(&buffer, ptr.byte_offset())?;
        Ok(())
    }

    fn release_or_warn(&self, ptr: BlockPointer) {
        if let Err(e) = self
            .allocator
            .release(ptr.block_offset, ptr.block_count as u64)
        {
            tracing::warn!("Potential block leak at {:?}: release failed: {}", ptr, e);
        }
    }
}
