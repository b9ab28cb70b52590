//! Root slot
//!
//! The persisted pointer to the current root node, kept in its own file so
//! the index survives restarts.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┬───────────┐
//! │ bincode RootRecord { magic, pointer }   │ CRC32 (4) │
//! └─────────────────────────────────────────┴───────────┘
//! ```
//! Updates go to `root.tmp`, are fsynced, then renamed over `root`.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BlockError, Result};
use crate::storage::BlockPointer;

/// Magic bytes identifying a root slot file
const ROOT_MAGIC: [u8; 4] = *b"BKVR";

#[derive(Debug, Serialize, Deserialize)]
struct RootRecord {
    magic: [u8; 4],
    pointer: BlockPointer,
}

/// The on-disk location of the root pointer
#[derive(Debug, Clone)]
pub struct RootSlot {
    dir: PathBuf,
    path: PathBuf,
}

impl RootSlot {
    const FILENAME: &'static str = "root";
    const TMP_FILENAME: &'static str = "root.tmp";

    /// Root slot inside the data directory `dir`
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            path: dir.join(Self::FILENAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted root pointer, `None` if none was ever stored
    pub fn load(&self) -> Result<Option<BlockPointer>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if bytes.len() < 4 {
            return Err(BlockError::Corruption(format!(
                "root slot is {} bytes",
                bytes.len()
            )));
        }
        let (body, crc) = bytes.split_at(bytes.len() - 4);
        let stored_crc = u32::from_le_bytes([crc[0], crc[1], crc[2], crc[3]]);
        if crc32fast::hash(body) != stored_crc {
            return Err(BlockError::Corruption("root slot CRC mismatch".to_string()));
        }

        let record: RootRecord = bincode::deserialize(body)?;
        if record.magic != ROOT_MAGIC {
            return Err(BlockError::Corruption(format!(
                "invalid root slot magic: {:?}",
                record.magic
            )));
        }

        Ok(Some(record.pointer))
    }

    /// Atomically replace the persisted root pointer
    pub fn store(&self, pointer: BlockPointer) -> Result<()> {
        let record = RootRecord {
            magic: ROOT_MAGIC,
            pointer,
        };
        let mut bytes = bincode::serialize(&record)?;
        let crc = crc32fast::hash(&bytes);
        bytes.extend_from_slice(&crc.to_le_bytes());

        let tmp_path = self.dir.join(Self::TMP_FILENAME);
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        File::open(&self.dir)?.sync_all()?;

        tracing::debug!("Root pointer now {:?}", pointer);
        Ok(())
    }
}
