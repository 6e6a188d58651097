//! Persistent case storage.
//!
//! A case directory holds one framed, checksummed file per node value plus the
//! case metadata (time map, state map, observed summary keys). The directory is
//! locked for the lifetime of the open case.

mod codec;
mod file_lock;
mod stores;

pub use file_lock::FileLock;
pub use stores::PersistentNodeStorage;

use std::path::Path;
use std::sync::Arc;

use crate::case::Case;
use crate::error::{HistmatchError, HistmatchResult};

/// Configuration for persistent storage.
#[derive(Debug, Clone)]
pub struct PersistentConfig {
    /// Whether to fsync every written file (slower but safer).
    pub sync_on_write: bool,
    /// Largest record accepted when reading (bytes).
    pub max_record_size: usize,
}

impl Default for PersistentConfig {
    fn default() -> Self {
        Self {
            sync_on_write: true,
            max_record_size: 256 * 1024 * 1024, // 256 MB
        }
    }
}

impl PersistentConfig {
    const MIN_RECORD_SIZE: usize = 4 * 1024;

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_record_size` is below 4 KiB.
    pub fn validate(self) -> HistmatchResult<Self> {
        if self.max_record_size < Self::MIN_RECORD_SIZE {
            return Err(HistmatchError::internal(format!(
                "max_record_size must be at least {} bytes (got {})",
                Self::MIN_RECORD_SIZE,
                self.max_record_size
            )));
        }
        Ok(self)
    }
}

/// Open or create the persistent case at `path`.
///
/// The time map, state map and observed summary keys of a previously synced
/// case are restored.
///
/// # Errors
/// - If the path cannot be created or accessed
/// - If another process holds the case lock
/// - If a metadata file is corrupt
///
/// # Example
/// ```rust,ignore
/// use histmatch::storage::persistent::open_case;
///
/// let case = open_case("./cases/default", None)?;
/// // ... ingest realizations ...
/// case.sync()?;
/// ```
pub fn open_case(path: impl AsRef<Path>, config: Option<PersistentConfig>) -> HistmatchResult<Case> {
    let cfg = config.unwrap_or_default().validate()?;
    let storage = PersistentNodeStorage::open(path.as_ref(), cfg)?;
    Ok(Case::open(Arc::new(storage))?)
}
