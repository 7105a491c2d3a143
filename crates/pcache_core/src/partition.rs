//! Workspace partition naming and locking.
//!
//! Each workspace gets its own record log inside the cache directory:
//!
//! ```text
//! <cache_dir>/
//! ├─ patients_<slug>.pclog   # Record log for one workspace
//! └─ patients_<slug>.lock    # Advisory lock held while the store is open
//! ```
//!
//! The slug keeps `[A-Za-z0-9_-]` and escapes every other byte as `~XX`,
//! so two distinct workspace ids never map to the same files.

use crate::error::{CacheError, CacheResult};
use fs2::FileExt;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const TABLE_PREFIX: &str = "patients_";
const LOG_EXTENSION: &str = "pclog";
const LOCK_EXTENSION: &str = "lock";

/// Deterministic table name for a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionName(String);

impl PartitionName {
    /// Derives the table name from a workspace id.
    pub fn for_workspace(workspace_id: &str) -> Self {
        let mut name = String::with_capacity(TABLE_PREFIX.len() + workspace_id.len());
        name.push_str(TABLE_PREFIX);
        for byte in workspace_id.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
                name.push(byte as char);
            } else {
                name.push_str(&format!("~{byte:02x}"));
            }
        }
        Self(name)
    }

    /// Returns the table name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path of the record log under `dir`.
    pub fn log_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.{LOG_EXTENSION}", self.0))
    }

    /// Path of the lock file under `dir`.
    pub fn lock_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.{LOCK_EXTENSION}", self.0))
    }
}

impl fmt::Display for PartitionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Exclusive advisory lock on one workspace partition.
///
/// Released when dropped.
#[derive(Debug)]
pub(crate) struct PartitionLock {
    _file: File,
}

impl PartitionLock {
    /// Acquires the lock without blocking.
    pub(crate) fn acquire(
        dir: &Path,
        partition: &PartitionName,
        workspace_id: &str,
    ) -> CacheResult<Self> {
        fs::create_dir_all(dir)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(partition.lock_path(dir))?;

        if file.try_lock_exclusive().is_err() {
            return Err(CacheError::Locked {
                workspace: workspace_id.to_string(),
            });
        }

        Ok(Self { _file: file })
    }
}
