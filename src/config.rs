//! Configuration for BlockKV
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

/// Maximum number of addressable blocks in the default layout (2^30)
pub const DEFAULT_MAX_BLOCKS: u64 = 1 << 30;

/// Main configuration for a BlockKV instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── db             (block-addressed object file)
    ///     ├── block_bitmap   (one bit per addressable block)
    ///     └── root           (persisted B-tree root pointer)
    pub data_dir: PathBuf,

    /// Number of addressable blocks; fixes the bitmap file size.
    /// Must match the value the data directory was created with.
    pub max_blocks: u64,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Connection read timeout (milliseconds, 0 = wait indefinitely)
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds, 0 = wait indefinitely)
    pub write_timeout_ms: u64,

    /// Longest accepted request line in bytes
    pub max_line_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./blockkv_data"),
            max_blocks: DEFAULT_MAX_BLOCKS,
            listen_addr: "127.0.0.1:4080".to_string(),
            max_connections: 1024,
            read_timeout_ms: 0,
            write_timeout_ms: 0,
            max_line_bytes: 1024 * 1024, // 1 MB
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Size in bytes of the block bitmap file for this config
    pub fn bitmap_bytes(&self) -> u64 {
        self.max_blocks.div_ceil(8)
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the number of addressable blocks
    pub fn max_blocks(mut self, blocks: u64) -> Self {
        self.config.max_blocks = blocks;
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    /// Set the longest accepted request line
    pub fn max_line_bytes(mut self, bytes: usize) -> Self {
        self.config.max_line_bytes = bytes;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
