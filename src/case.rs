//! Explicit case handle.
//!
//! A [`Case`] bundles the state every realization's ingestion shares: the
//! time map, the state map, the registry of summary keys seen so far, and the
//! node storage. It is passed by reference to every operation instead of
//! living in process-wide globals.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state_map::{RealizationState, StateMap};
use crate::storage::{InMemoryNodeStorage, NodeStorage, StorageError};
use crate::time_map::{TimeMap, TimeMapSnapshot};

/// Unique identifier of a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaseId(Uuid);

impl CaseId {
    /// Generates a new random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CaseId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything about a case except its node values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseMetadata {
    pub id: CaseId,
    pub time_map: TimeMapSnapshot,
    pub states: Vec<RealizationState>,
    pub summary_keys: BTreeSet<String>,
}

/// One ensemble's shared ingestion state.
pub struct Case {
    id: CaseId,
    time_map: TimeMap,
    state_map: StateMap,
    summary_keys: RwLock<BTreeSet<String>>,
    storage: Arc<dyn NodeStorage>,
}

impl Case {
    /// Creates an empty case on top of `storage`.
    #[must_use]
    pub fn new(storage: Arc<dyn NodeStorage>) -> Self {
        Self {
            id: CaseId::new(),
            time_map: TimeMap::new(),
            state_map: StateMap::new(),
            summary_keys: RwLock::new(BTreeSet::new()),
            storage,
        }
    }

    /// Creates an empty case backed by memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryNodeStorage::new()))
    }

    /// Opens a case on `storage`, restoring previously synced metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored metadata cannot be read.
    pub fn open(storage: Arc<dyn NodeStorage>) -> Result<Self, StorageError> {
        let Some(metadata) = storage.load_metadata()? else {
            return Ok(Self::new(storage));
        };
        Ok(Self {
            id: metadata.id,
            time_map: TimeMap::from_snapshot(metadata.time_map),
            state_map: StateMap::from_states(metadata.states),
            summary_keys: RwLock::new(metadata.summary_keys),
            storage,
        })
    }

    #[must_use]
    pub fn id(&self) -> CaseId {
        self.id
    }

    #[must_use]
    pub fn time_map(&self) -> &TimeMap {
        &self.time_map
    }

    #[must_use]
    pub fn state_map(&self) -> &StateMap {
        &self.state_map
    }

    /// The node storage.
    #[must_use]
    pub fn storage(&self) -> &dyn NodeStorage {
        self.storage.as_ref()
    }

    /// Records that `key` was produced by some realization.
    pub fn record_summary_key(&self, key: &str) {
        let mut keys = self.summary_keys.write().unwrap_or_else(PoisonError::into_inner);
        if !keys.contains(key) {
            keys.insert(key.to_string());
        }
    }

    /// Summary keys produced by any realization so far, sorted.
    #[must_use]
    pub fn observed_keys(&self) -> Vec<String> {
        self.summary_keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Snapshot of the case metadata.
    #[must_use]
    pub fn metadata(&self) -> CaseMetadata {
        CaseMetadata {
            id: self.id,
            time_map: self.time_map.snapshot(),
            states: self.state_map.states(),
            summary_keys: self
                .summary_keys
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }

    /// Persists the metadata through the storage backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to write.
    pub fn sync(&self) -> Result<(), StorageError> {
        self.storage.store_metadata(&self.metadata())
    }
}

impl fmt::Debug for Case {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Case")
            .field("id", &self.id)
            .field("time_map", &self.time_map)
            .field("state_map", &self.state_map)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observed_keys_sorted_and_unique() {
        let case = Case::in_memory();
        case.record_summary_key("WOPR:OP1");
        case.record_summary_key("FOPR");
        case.record_summary_key("FOPR");
        assert_eq!(case.observed_keys(), vec!["FOPR", "WOPR:OP1"]);
    }

    #[test]
    fn test_sync_then_open_restores_metadata() {
        let storage: Arc<dyn NodeStorage> = Arc::new(InMemoryNodeStorage::new());
        let case = Case::new(Arc::clone(&storage));
        case.state_map().set(2, RealizationState::HasData);
        case.record_summary_key("FOPR");
        case.sync().unwrap();

        let reopened = Case::open(storage).unwrap();
        assert_eq!(reopened.id(), case.id());
        assert_eq!(reopened.state_map().get(2), RealizationState::HasData);
        assert_eq!(reopened.observed_keys(), vec!["FOPR"]);
    }

    #[test]
    fn test_open_without_metadata_is_fresh() {
        let case = Case::open(Arc::new(InMemoryNodeStorage::new())).unwrap();
        assert!(case.time_map().is_empty());
        assert_eq!(case.state_map().size(), 0);
    }
}
