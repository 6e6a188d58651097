//! Per-realization lifecycle tracking.

use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

/// Lifecycle state of one realization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RealizationState {
    /// Never touched.
    #[default]
    Undefined,
    /// Parameters sampled, forward model not yet loaded.
    Initialized,
    /// Results internalized successfully.
    HasData,
    /// The last internalization attempt failed.
    LoadFailure,
}

impl fmt::Display for RealizationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Undefined => "STATE_UNDEFINED",
            Self::Initialized => "STATE_INITIALIZED",
            Self::HasData => "STATE_HAS_DATA",
            Self::LoadFailure => "STATE_LOAD_FAILURE",
        };
        f.write_str(name)
    }
}

/// Thread-safe realization → state map shared across a case.
///
/// Unknown realizations read as [`RealizationState::Undefined`].
#[derive(Debug, Default)]
pub struct StateMap {
    states: RwLock<Vec<RealizationState>>,
}

impl StateMap {
    /// Creates an empty state map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores a state map from persisted states.
    #[must_use]
    pub fn from_states(states: Vec<RealizationState>) -> Self {
        Self {
            states: RwLock::new(states),
        }
    }

    // Single indexed assignments cannot leave a torn entry behind.
    fn read(&self) -> RwLockReadGuard<'_, Vec<RealizationState>> {
        self.states.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<RealizationState>> {
        self.states.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// State of realization `iens`.
    #[must_use]
    pub fn get(&self, iens: usize) -> RealizationState {
        self.read().get(iens).copied().unwrap_or_default()
    }

    /// Records the state of realization `iens`.
    pub fn set(&self, iens: usize, state: RealizationState) {
        let mut states = self.write();
        if states.len() <= iens {
            states.resize(iens + 1, RealizationState::Undefined);
        }
        states[iens] = state;
    }

    /// Marks a realization as sampled, unless it already holds data.
    ///
    /// Returns true if the state changed.
    pub fn mark_initialized(&self, iens: usize) -> bool {
        let mut states = self.write();
        if states.len() <= iens {
            states.resize(iens + 1, RealizationState::Undefined);
        }
        match states[iens] {
            RealizationState::Undefined | RealizationState::LoadFailure => {
                states[iens] = RealizationState::Initialized;
                true
            }
            RealizationState::Initialized | RealizationState::HasData => false,
        }
    }

    /// Realizations currently in `state`, ascending.
    #[must_use]
    pub fn realizations(&self, state: RealizationState) -> Vec<usize> {
        self.read()
            .iter()
            .enumerate()
            .filter_map(|(iens, s)| (*s == state).then_some(iens))
            .collect()
    }

    /// Number of realizations in `state`.
    #[must_use]
    pub fn count(&self, state: RealizationState) -> usize {
        self.read().iter().filter(|s| **s == state).count()
    }

    /// One past the highest realization ever recorded.
    #[must_use]
    pub fn size(&self) -> usize {
        self.read().len()
    }

    /// A copy of every recorded state for persistence.
    #[must_use]
    pub fn states(&self) -> Vec<RealizationState> {
        self.read().clone()
    }
}
