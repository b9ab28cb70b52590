//! Block Allocator
//!
//! First-fit reservation of contiguous block runs over the [`BlockBitmap`].
//!
//! ## Concurrency
//! The bitmap sits behind a single `parking_lot::Mutex` (the bitmap lock).
//! `reserve` and `release` hold it for the scan, the bit updates and the
//! synchronous flush, and for nothing else. There is no per-range locking.

use std::path::Path;

use parking_lot::Mutex;

use crate::error::{BlockError, Result};

use super::BlockBitmap;

/// Reserves and releases contiguous block ranges
pub struct BlockAllocator {
    /// The bitmap lock; all bitmap mutation happens through this guard
    bitmap: Mutex<BlockBitmap>,
    max_blocks: u64,
}

impl BlockAllocator {
    /// Open the bitmap file at `path` and wrap it in the bitmap lock
    pub fn open(path: &Path, max_blocks: u64) -> Result<Self> {
        let bitmap = BlockBitmap::open(path, max_blocks)?;
        Ok(Self::new(bitmap))
    }

    pub fn new(bitmap: BlockBitmap) -> Self {
        let max_blocks = bitmap.max_blocks();
        Self {
            bitmap: Mutex::new(bitmap),
            max_blocks,
        }
    }

    /// Reserve the first run of `blocks` contiguous free blocks
    ///
    /// Returns the offset of the run. The bits are set and flushed before the
    /// lock is released.
    pub fn reserve(&self, blocks: u64) -> Result<u64> {
        if blocks == 0 {
            return Err(BlockError::Argument(
                "Cannot reserve zero blocks.".to_string(),
            ));
        }
        if blocks > self.max_blocks {
            return Err(BlockError::AllocationFailure { blocks });
        }

        let mut bitmap = self.bitmap.lock();
        let offset = Self::first_fit(&bitmap, blocks)
            .ok_or(BlockError::AllocationFailure { blocks })?;

        for bit in offset..offset + blocks {
            bitmap.set(bit);
        }
        if let Err(e) = bitmap.flush() {
            // Leave the bitmap as it was on disk
            for bit in offset..offset + blocks {
                bitmap.clear(bit);
            }
            return Err(e);
        }

        tracing::trace!("Reserved blocks {}..{}", offset, offset + blocks);
        Ok(offset)
    }

    /// Clear `blocks` bits starting at `offset` and flush the bitmap
    pub fn release(&self, offset: u64, blocks: u64) -> Result<()> {
        if blocks == 0 || offset + blocks > self.max_blocks {
            return Err(BlockError::Argument(format!(
                "Cannot release blocks {}+{} of {}.",
                offset, blocks, self.max_blocks
            )));
        }

        let mut bitmap = self.bitmap.lock();
        for bit in offset..offset + blocks {
            bitmap.clear(bit);
        }
        bitmap.flush()?;

        tracing::trace!("Released blocks {}..{}", offset, offset + blocks);
        Ok(())
    }

    /// Whether every block in `[offset, offset + blocks)` is in use
    pub fn is_reserved(&self, offset: u64, blocks: u64) -> bool {
        if offset + blocks > self.max_blocks {
            return false;
        }
        let bitmap = self.bitmap.lock();
        bitmap.next_clear(offset, offset + blocks).is_none()
    }

    /// Whether every block in `[offset, offset + blocks)` is free
    pub fn is_free(&self, offset: u64, blocks: u64) -> bool {
        if offset + blocks > self.max_blocks {
            return false;
        }
        let bitmap = self.bitmap.lock();
        bitmap.next_set(offset, offset + blocks).is_none()
    }

    /// Number of blocks currently in use
    pub fn used_blocks(&self) -> u64 {
        self.bitmap.lock().count_set()
    }

    /// Number of addressable blocks
    pub fn max_blocks(&self) -> u64 {
        self.max_blocks
    }

    /// Flush the bitmap (used on shutdown)
    pub fn flush(&self) -> Result<()> {
        self.bitmap.lock().flush()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// First-fit scan for `blocks` clear bits
    ///
    /// A candidate run starting at `start` that contains a used block `b`
    /// cannot succeed, and neither can any run starting in `start..=b`, so
    /// the scan resumes at the next clear bit after `b`. No block that could
    /// begin a fitting run is ever skipped.
    fn first_fit(bitmap: &BlockBitmap, blocks: u64) -> Option<u64> {
        let max = bitmap.max_blocks();
        let mut start = bitmap.next_clear(0, max)?;
        while start + blocks <= max {
            match bitmap.next_set(start, start + blocks) {
                None => return Some(start),
                Some(used) => start = bitmap.next_clear(used + 1, max)?,
            }
        }
        None
    }
}
