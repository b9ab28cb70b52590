//! Error types for BlockKV
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using BlockError
pub type Result<T> = std::result::Result<T, BlockError>;

/// Unified error type for BlockKV operations
#[derive(Debug, Error)]
pub enum BlockError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Allocation Errors
    // -------------------------------------------------------------------------
    #[error("No contiguous run of {blocks} free blocks")]
    AllocationFailure { blocks: u64 },

    // -------------------------------------------------------------------------
    // Index Errors
    // -------------------------------------------------------------------------
    #[error("Key not found")]
    NotFound,

    #[error("Corruption detected: {0}")]
    Corruption(String),

    // -------------------------------------------------------------------------
    // Request Errors
    // -------------------------------------------------------------------------
    #[error("{0}")]
    Argument(String),

    #[error("Unknown command.")]
    UnknownCommand,

    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for BlockError {
    fn from(e: bincode::Error) -> Self {
        BlockError::Serialization(e.to_string())
    }
}
