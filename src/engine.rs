//! Engine Module
//!
//! The storage-engine context that ties the allocator, object store and
//! index together.
//!
//! ## Responsibilities
//! - Open (or create) the data directory files at startup
//! - Serialize index access behind the index lock
//! - Validate keys and values before they reach the index
//! - Route protocol commands to engine operations

use std::fs;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::Config;
use crate::error::{BlockError, Result};
use crate::index::{validate_key, BTreeIndex, IndexStats, RootSlot};
use crate::protocol::Command;
use crate::storage::{BlockAllocator, ObjectStore};

/// The storage engine
///
/// ## Concurrency Model
///
/// - **Index lock** (`index`): `RwLock` around the whole B-tree and its root
///   slot. `find`/`keys` share it; `insert`/`delete` hold it exclusively.
///
/// - **Bitmap lock** (inside `BlockAllocator`): held only for one
///   reserve/release plus its flush. Always taken after the index lock.
///
/// - **Object I/O**: lock-free positioned reads/writes on reserved spans.
///
/// An `Engine` is built once at startup and shared as `Arc<Engine>` by every
/// connection worker.
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Block allocator over the shared bitmap
    allocator: Arc<BlockAllocator>,

    /// Object store over the `db` file
    objects: Arc<ObjectStore>,

    /// The index lock
    index: RwLock<BTreeIndex>,
}

impl Engine {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const DB_FILENAME: &'static str = "db";
    const BITMAP_FILENAME: &'static str = "block_bitmap";

    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Create the data directory if needed
    /// 2. Map the block bitmap
    /// 3. Open the `db` file
    /// 4. Load (or create) the index root
    ///
    /// Any failure here must stop the process from serving.
    pub fn open(config: Config) -> Result<Self> {
        fs::create_dir_all(&config.data_dir)?;

        let bitmap_path = config.data_dir.join(Self::BITMAP_FILENAME);
        let db_path = config.data_dir.join(Self::DB_FILENAME);

        let allocator = Arc::new(BlockAllocator::open(&bitmap_path, config.max_blocks)?);
        let objects = Arc::new(ObjectStore::open(&db_path, Arc::clone(&allocator))?);
        let index = BTreeIndex::open(Arc::clone(&objects), RootSlot::new(&config.data_dir))?;

        tracing::info!(
            "Engine opened at {} ({} of {} blocks in use)",
            config.data_dir.display(),
            allocator.used_blocks(),
            allocator.max_blocks()
        );

        Ok(Self {
            config,
            allocator,
            objects,
            index: RwLock::new(index),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        let config = Config::builder().data_dir(path).build();
        Self::open(config)
    }

    /// Execute a command, returning the response message
    ///
    /// `Quit` is acknowledged here; closing the session is up to the caller.
    pub fn execute(&self, command: Command) -> Result<String> {
        match command {
            Command::Insert { key, value } => {
                self.insert(&key, value.as_bytes())?;
                Ok("Inserted.".to_string())
            }
            Command::Find { key } => {
                let value = self.find(&key)?;
                Ok(String::from_utf8_lossy(&value).into_owned())
            }
            Command::Delete { key } => {
                self.delete(&key)?;
                Ok("Deleted.".to_string())
            }
            Command::Keys { prefix } => Ok(self.keys(prefix.as_deref())?.join("\n")),
            Command::Quit => Ok("Bye.".to_string()),
        }
    }

    /// Store `value` under `key`, replacing any previous value
    pub fn insert(&self, key: &str, value: &[u8]) -> Result<()> {
        validate_key(key)?;
        validate_value(value)?;

        let mut index = self.index.write();
        index.insert(key, value)?;

        tracing::debug!("Inserted {:?} ({} bytes)", key, value.len());
        Ok(())
    }

    /// Value stored under `key`, without block padding
    pub fn find(&self, key: &str) -> Result<Vec<u8>> {
        validate_key(key)?;

        // Held across the read so the value cannot be freed underneath us
        let index = self.index.read();
        let ptr = index.find(key)?;
        let mut value = self.objects.read(ptr)?;

        let len = value.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        value.truncate(len);
        Ok(value)
    }

    /// Remove `key` and free its value
    pub fn delete(&self, key: &str) -> Result<()> {
        validate_key(key)?;

        let mut index = self.index.write();
        index.delete(key)?;

        tracing::debug!("Deleted {:?}", key);
        Ok(())
    }

    /// Live keys in ascending order, optionally restricted to `prefix`
    pub fn keys(&self, prefix: Option<&str>) -> Result<Vec<String>> {
        self.index.read().keys(prefix)
    }

    /// Check the index structure and report its shape
    pub fn verify(&self) -> Result<IndexStats> {
        self.index.read().verify()
    }

    /// Flush the `db` file and the bitmap
    pub fn close(self) -> Result<()> {
        let _index = self.index.write();
        self.objects.sync()?;
        self.allocator.flush()?;
        tracing::info!("Engine closed");
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Number of blocks currently reserved (index nodes and values)
    pub fn used_blocks(&self) -> u64 {
        self.allocator.used_blocks()
    }

    /// Get the block allocator
    pub fn allocator(&self) -> &Arc<BlockAllocator> {
        &self.allocator
    }

    /// Get the object store
    pub fn objects(&self) -> &Arc<ObjectStore> {
        &self.objects
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Values are stored zero-padded and read back with padding stripped, so
/// they must be non-empty and NUL-free.
fn validate_value(value: &[u8]) -> Result<()> {
    if value.is_empty() {
        return Err(BlockError::Argument("Value is empty.".to_string()));
    }
    if value.contains(&0) {
        return Err(BlockError::Argument("Value contains NUL.".to_string()));
    }
    Ok(())
}
