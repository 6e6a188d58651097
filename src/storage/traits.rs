//! Abstract storage traits for node values.
//!
//! These traits define the contract that case storage backends implement:
//! - In-memory backends for testing and embedded use
//! - Persistent backends for on-disk ensemble cases

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::case::CaseMetadata;
use crate::node::NodeValue;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A stored value has an unexpected kind.
    #[error("Node {key} holds {actual} data, expected {expected}")]
    KindMismatch {
        key: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// File system error.
    #[error("I/O error: {0}")]
    Io(String),
}

/// Address of one stored value: (node, realization, report step).
///
/// Summary vectors span every report step and are stored under the
/// whole-vector address where `report_step` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey {
    /// Node name.
    pub key: String,
    /// Realization.
    pub iens: usize,
    /// Report step, `None` for whole-vector values.
    pub report_step: Option<usize>,
}

impl NodeKey {
    /// Whole-vector address of `key` for realization `iens`.
    #[must_use]
    pub fn vector(key: impl Into<String>, iens: usize) -> Self {
        Self {
            key: key.into(),
            iens,
            report_step: None,
        }
    }

    /// Address of `key` for realization `iens` at `report_step`.
    #[must_use]
    pub fn step(key: impl Into<String>, iens: usize, report_step: usize) -> Self {
        Self {
            key: key.into(),
            iens,
            report_step: Some(report_step),
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.report_step {
            Some(step) => write!(f, "{}[{}]@{}", self.key, self.iens, step),
            None => write!(f, "{}[{}]", self.key, self.iens),
        }
    }
}

/// Read-merge-write callback: receives the stored value (if any) and returns
/// the value to store.
pub type MergeFn<'a> = dyn FnMut(Option<NodeValue>) -> Result<NodeValue, StorageError> + 'a;

/// Storage of node values and case metadata.
///
/// # Concurrency
/// - `merge` is atomic per key: concurrent merges of the same key never
///   interleave, different keys proceed independently
/// - All methods take `&self`; implementations synchronize internally
pub trait NodeStorage: Send + Sync {
    /// Load the value stored at `key`.
    fn load(&self, key: &NodeKey) -> Result<Option<NodeValue>, StorageError>;

    /// Store `value` at `key`, replacing any previous value.
    fn store(&self, key: &NodeKey, value: NodeValue) -> Result<(), StorageError>;

    /// Atomically load the value at `key`, pass it to `merge` and store the result.
    ///
    /// Nothing is stored if `merge` fails.
    fn merge(&self, key: &NodeKey, merge: &mut MergeFn<'_>) -> Result<(), StorageError>;

    /// Returns true if a value is stored at `key`.
    fn contains(&self, key: &NodeKey) -> Result<bool, StorageError> {
        Ok(self.load(key)?.is_some())
    }

    /// Every stored key, sorted.
    fn keys(&self) -> Result<Vec<NodeKey>, StorageError>;

    /// Load the persisted case metadata.
    fn load_metadata(&self) -> Result<Option<CaseMetadata>, StorageError>;

    /// Persist the case metadata.
    fn store_metadata(&self, metadata: &CaseMetadata) -> Result<(), StorageError>;
}
