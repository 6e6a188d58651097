//! Active component masks.

use serde::{Deserialize, Serialize};

/// How many components of a quantity take part.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActiveMode {
    /// Every component is active; the count comes from context.
    #[default]
    AllActive,
    /// Only the components in the index list are active.
    PartlyActive,
}

/// Which components of an observation or variable are active.
///
/// Indices are kept in insertion order and duplicates are not rejected.
/// Adding an index never changes the mode; callers select
/// [`ActiveMode::PartlyActive`] themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveList {
    mode: ActiveMode,
    index_list: Vec<usize>,
}

impl ActiveList {
    /// An all-active list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A partly active list with `indices`.
    #[must_use]
    pub fn partly_active(indices: impl IntoIterator<Item = usize>) -> Self {
        Self {
            mode: ActiveMode::PartlyActive,
            index_list: indices.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn mode(&self) -> ActiveMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: ActiveMode) {
        self.mode = mode;
    }

    /// Appends `index` to the explicit index list.
    pub fn add_index(&mut self, index: usize) {
        self.index_list.push(index);
    }

    #[must_use]
    pub fn index_list(&self) -> &[usize] {
        &self.index_list
    }

    /// Number of active components: `default_size` when all are active.
    #[must_use]
    pub fn active_size(&self, default_size: usize) -> usize {
        match self.mode {
            ActiveMode::AllActive => default_size,
            ActiveMode::PartlyActive => self.index_list.len(),
        }
    }

    /// The active component indices of a quantity with `size` components.
    #[must_use]
    pub fn active_indices(&self, size: usize) -> Vec<usize> {
        match self.mode {
            ActiveMode::AllActive => (0..size).collect(),
            ActiveMode::PartlyActive => self.index_list.clone(),
        }
    }
}
