//! # BlockKV
//!
//! An embedded, disk-backed key-value store with:
//! - A persistent bitmap block allocator (first fit)
//! - Variable-length objects stored in whole 4 KiB blocks
//! - An on-disk B+ tree index mapping string keys to value objects
//! - A line-based TCP command protocol
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TCP Server                              │
//! │              (One Worker Thread per Client)                  │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                       Engine                                 │
//! │             (Index RwLock: Writers / Readers)                │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!                       ▼
//!                ┌─────────────┐          ┌─────────────┐
//!                │ BTreeIndex  │─────────▶│  RootSlot   │
//!                │ (B+ nodes)  │          │ (root file) │
//!                └──────┬──────┘          └─────────────┘
//!                       │
//!                       ▼
//!                ┌─────────────┐
//!                │ ObjectStore │
//!                │  (db file)  │
//!                └──────┬──────┘
//!                       │
//!                       ▼
//!                ┌─────────────┐
//!                │  Allocator  │
//!                │ (mmap bits) │
//!                └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod storage;
pub mod index;
pub mod network;
pub mod protocol;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{BlockError, Result};
pub use config::Config;
pub use engine::Engine;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of BlockKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
