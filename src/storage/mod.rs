//! Storage Module
//!
//! Block-granular persistence on a single flat file.
//!
//! ## Responsibilities
//! - Track free/used blocks in a memory-mapped bitmap
//! - Reserve and release contiguous block runs (first-fit)
//! - Read, write, update and delete zero-padded objects
//!
//! ## File Layout
//! ```text
//! block_bitmap (ceil(max_blocks / 8) bytes, memory-mapped)
//! ┌────────┬────────┬────────┬─────────────────────────────┐
//! │ b0..b7 │ b8..15 │  ...   │  bit n = byte n/8, 1<<(n%8) │
//! └────────┴────────┴────────┴─────────────────────────────┘
//!
//! db (sparse, BLOCK_SIZE-aligned objects)
//! ┌──────────┬──────────┬──────────┬──────────┬───────────┐
//! │ block 0  │ block 1  │ block 2  │ (hole)   │  ...      │
//! │ object A │ object B ·········· │          │           │
//! └──────────┴──────────┴──────────┴──────────┴───────────┘
//! ```

mod allocator;
mod bitmap;
mod object;
mod pointer;

pub use allocator::BlockAllocator;
pub use bitmap::BlockBitmap;
pub use object::ObjectStore;
pub use pointer::{BlockPointer, POINTER_SIZE};

/// Size of one block in bytes; the allocation granularity
pub const BLOCK_SIZE: usize = 4096;
