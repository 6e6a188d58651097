//! Error types for histmatch.
//!
//! All errors are strongly typed using thiserror so callers can match on the
//! specific ingestion failure instead of parsing messages.

use thiserror::Error;

use crate::storage::StorageError;
use crate::time_map::TimeMapError;

/// Configuration errors raised while building an ensemble configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Node key cannot be empty")]
    EmptyKey,

    #[error("Invalid summary key pattern '{pattern}': {reason}")]
    InvalidPattern {
        pattern: String,
        reason: String,
    },

    #[error("Node '{key}' is already configured")]
    DuplicateNode {
        key: String,
    },

    #[error("Node '{key}' is not configured")]
    UnknownNode {
        key: String,
    },

    #[error("Node '{key}' is a {actual} node, expected {expected}")]
    KindMismatch {
        key: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue {
        field: String,
        reason: String,
    },
}

/// Failures of a single realization's internalization attempt.
///
/// Every variant except [`LoadError::PerStepLoad`] is terminal for the
/// realization. Per-step failures are collected and reported together.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Simulator output is missing or unreadable.
    #[error("{message}")]
    Structural {
        message: String,
    },

    /// The realization's report times disagree with the case time map.
    #[error(transparent)]
    Consistency(#[from] TimeMapError),

    /// Required summary keys with observations are absent from the output.
    #[error("Missing summary data for required summary keys: {}", .keys.join(", "))]
    MissingRequiredData {
        keys: Vec<String>,
    },

    /// One GEN_DATA report step could not be loaded.
    #[error("Failed load data for GEN_DATA node: {key} at step {report_step}: {reason}")]
    PerStepLoad {
        key: String,
        report_step: usize,
        reason: String,
    },

    /// One or more GEN_DATA steps failed; the others were stored.
    #[error("Failed to internalize GEN_DATA: {}", join_errors(.failures))]
    GenData {
        failures: Vec<LoadError>,
    },

    /// The forward-init collaborator failed.
    #[error("{message}")]
    ForwardInit {
        message: String,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

fn join_errors(errors: &[LoadError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl LoadError {
    /// Creates a structural error.
    #[must_use]
    pub fn structural(message: impl Into<String>) -> Self {
        Self::Structural {
            message: message.into(),
        }
    }

    /// Returns true if the failure came from the shared time map.
    #[must_use]
    pub const fn is_consistency(&self) -> bool {
        matches!(self, Self::Consistency(_))
    }
}

/// Errors raised while measuring simulated responses for an observation.
#[derive(Debug, Error)]
pub enum MeasureError {
    #[error("No stored data for '{key}' realization {iens} at report step {report_step}")]
    MissingData {
        key: String,
        iens: usize,
        report_step: usize,
    },

    #[error("Index {index} out of range for '{key}' with {size} elements")]
    IndexOutOfRange {
        key: String,
        index: usize,
        size: usize,
    },

    #[error("Stored value for '{key}' is a {actual} node, expected {expected}")]
    UnexpectedValue {
        key: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Top-level error type for histmatch.
#[derive(Debug, Error)]
pub enum HistmatchError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("Measure error: {0}")]
    Measure(#[from] MeasureError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl HistmatchError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true if this is a storage error.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Returns true if this is a load error.
    #[must_use]
    pub const fn is_load(&self) -> bool {
        matches!(self, Self::Load(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }
}

/// Result type alias for histmatch operations.
pub type HistmatchResult<T> = Result<T, HistmatchError>;
