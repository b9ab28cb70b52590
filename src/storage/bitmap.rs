//! Block Bitmap
//!
//! Persistent bit-per-block free/used map, memory-mapped from the
//! `block_bitmap` file. Bit `n` lives in byte `n / 8` under mask
//! `1 << (n % 8)`; a set bit means the block is in use.
//!
//! The bitmap itself holds no lock. `BlockAllocator` keeps it behind the
//! bitmap lock and calls [`BlockBitmap::flush`] before releasing that lock.

use std::fs::{File, OpenOptions};
use std::path::Path;

use memmap2::MmapMut;

use crate::error::{BlockError, Result};

/// Memory-mapped block bitmap
pub struct BlockBitmap {
    /// Shared mapping of the whole bitmap file
    mmap: MmapMut,
    /// Number of addressable blocks (bits that may be used)
    max_blocks: u64,
    /// Kept open for the lifetime of the mapping
    _file: File,
}

impl BlockBitmap {
    /// Open or create the bitmap file at `path` for `max_blocks` blocks
    ///
    /// A new file is zero-extended to `ceil(max_blocks / 8)` bytes, so every
    /// block starts out free. An existing file must already have that size.
    pub fn open(path: &Path, max_blocks: u64) -> Result<Self> {
        if max_blocks == 0 {
            return Err(BlockError::Config(
                "max_blocks must be at least 1".to_string(),
            ));
        }
        let expected_len = max_blocks.div_ceil(8);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let len = file.metadata()?.len();
        if len == 0 {
            file.set_len(expected_len)?;
            file.sync_all()?;
        } else if len != expected_len {
            return Err(BlockError::Config(format!(
                "block bitmap {} is {} bytes, expected {} for {} blocks",
                path.display(),
                len,
                expected_len,
                max_blocks
            )));
        }

        // SAFETY: the file is opened read/write by this process and only ever
        // accessed through this mapping while the engine is alive.
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        tracing::debug!(
            "Mapped block bitmap {} ({} bytes, {} blocks)",
            path.display(),
            expected_len,
            max_blocks
        );

        Ok(Self {
            mmap,
            max_blocks,
            _file: file,
        })
    }

    /// Number of addressable blocks
    pub fn max_blocks(&self) -> u64 {
        self.max_blocks
    }

    /// Mark block `bit` as used
    pub fn set(&mut self, bit: u64) {
        let (byte, mask) = Self::locate(bit);
        self.mmap[byte] |= mask;
    }

    /// Whether block `bit` is used
    pub fn test(&self, bit: u64) -> bool {
        let (byte, mask) = Self::locate(bit);
        self.mmap[byte] & mask != 0
    }

    /// Mark block `bit` as free
    pub fn clear(&mut self, bit: u64) {
        let (byte, mask) = Self::locate(bit);
        self.mmap[byte] &= !mask;
    }

    /// Synchronously write the whole mapped region back to the file
    pub fn flush(&self) -> Result<()> {
        self.mmap.flush()?;
        Ok(())
    }

    /// First clear bit in `[from, limit)`
    ///
    /// Fully used bytes are skipped eight bits at a time.
    pub fn next_clear(&self, from: u64, limit: u64) -> Option<u64> {
        let mut bit = from;
        while bit < limit {
            let byte = self.mmap[(bit / 8) as usize];
            if bit % 8 == 0 && byte == 0xFF {
                bit += 8;
                continue;
            }
            if byte & (1 << (bit % 8)) == 0 {
                return Some(bit);
            }
            bit += 1;
        }
        None
    }

    /// First set bit in `[from, limit)`
    ///
    /// Fully free bytes are skipped eight bits at a time.
    pub fn next_set(&self, from: u64, limit: u64) -> Option<u64> {
        let mut bit = from;
        while bit < limit {
            let byte = self.mmap[(bit / 8) as usize];
            if bit % 8 == 0 && byte == 0 {
                bit += 8;
                continue;
            }
            if byte & (1 << (bit % 8)) != 0 {
                return Some(bit);
            }
            bit += 1;
        }
        None
    }

    /// Number of used blocks
    pub fn count_set(&self) -> u64 {
        self.mmap.iter().map(|b| b.count_ones() as u64).sum()
    }

    fn locate(bit: u64) -> (usize, u8) {
        ((bit / 8) as usize, 1u8 << (bit % 8))
    }
}
