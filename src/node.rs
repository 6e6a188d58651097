//! Stored node values.
//!
//! Every configured variable stores one closed set of value shapes. Summary
//! variables keep one vector per realization spanning all report steps;
//! GEN_DATA and parameters keep one value per (realization, report step).

use std::fs;
use std::io::{Error as IoError, ErrorKind, Result as IoResult};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A summary variable's values indexed by case-wide report step.
///
/// Steps that were never loaded hold `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryVector {
    values: Vec<Option<f64>>,
}

impl SummaryVector {
    /// Creates an empty vector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Value at `report_step`.
    #[must_use]
    pub fn get(&self, report_step: usize) -> Option<f64> {
        self.values.get(report_step).copied().flatten()
    }

    /// Sets the value at `report_step`, growing the vector as needed.
    pub fn set(&mut self, report_step: usize, value: f64) {
        if self.values.len() <= report_step {
            self.values.resize(report_step + 1, None);
        }
        self.values[report_step] = Some(value);
    }

    /// Writes `series[k]` to step `indices[k]` for every ordinal with an index.
    ///
    /// Steps outside `indices` keep their previous value.
    pub fn overlay(&mut self, series: &[f64], indices: &[Option<usize>]) {
        for (ordinal, index) in indices.iter().enumerate() {
            if let (Some(step), Some(value)) = (index, series.get(ordinal)) {
                self.set(*step, *value);
            }
        }
    }

    /// One past the highest step slot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no step has a slot.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Generic data produced by the forward model for one report step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenData {
    /// Data values.
    pub data: Vec<f64>,
    /// Optional per-element active mask written next to the data file.
    pub active: Option<Vec<bool>>,
}

impl GenData {
    /// Loads a data file and, if present, its `<file>_active` mask.
    ///
    /// # Errors
    ///
    /// Returns an error if the data file is missing or unparsable, or if the
    /// mask does not have one entry per value.
    pub fn forward_load(path: &Path) -> IoResult<Self> {
        let data = read_ascii_values(path)?;

        let mask_path = active_mask_path(path);
        let active = if mask_path.is_file() {
            let mask = read_ascii_values(&mask_path)?;
            if mask.len() != data.len() {
                return Err(IoError::new(
                    ErrorKind::InvalidData,
                    format!(
                        "active mask {} has {} entries for {} values",
                        mask_path.display(),
                        mask.len(),
                        data.len()
                    ),
                ));
            }
            Some(mask.into_iter().map(|v| v != 0.0).collect())
        } else {
            None
        };

        Ok(Self { data, active })
    }

    /// Number of values.
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Returns true if element `index` is active. Elements are active without a mask.
    #[must_use]
    pub fn is_active(&self, index: usize) -> bool {
        self.active
            .as_ref()
            .map_or(index < self.data.len(), |m| m.get(index).copied().unwrap_or(false))
    }
}

/// Parameter values, either sampled or loaded by forward init.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterValues {
    /// Values in file order.
    pub values: Vec<f64>,
}

impl ParameterValues {
    /// Loads parameter values from a whitespace separated ASCII file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or unparsable.
    pub fn forward_load(path: &Path) -> IoResult<Self> {
        Ok(Self {
            values: read_ascii_values(path)?,
        })
    }
}

/// A stored value of any node kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeValue {
    /// Whole summary vector of one realization.
    Summary(SummaryVector),
    /// GEN_DATA values of one realization and report step.
    GenData(GenData),
    /// Parameter values of one realization.
    Parameter(ParameterValues),
}

impl NodeValue {
    /// Kind name used in diagnostics.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Summary(_) => "SUMMARY",
            Self::GenData(_) => "GEN_DATA",
            Self::Parameter(_) => "PARAMETER",
        }
    }

    /// The summary vector, if this is one.
    #[must_use]
    pub fn as_summary(&self) -> Option<&SummaryVector> {
        match self {
            Self::Summary(v) => Some(v),
            _ => None,
        }
    }

    /// The GEN_DATA values, if this is one.
    #[must_use]
    pub fn as_gen_data(&self) -> Option<&GenData> {
        match self {
            Self::GenData(v) => Some(v),
            _ => None,
        }
    }

    /// The parameter values, if this is one.
    #[must_use]
    pub fn as_parameter(&self) -> Option<&ParameterValues> {
        match self {
            Self::Parameter(v) => Some(v),
            _ => None,
        }
    }
}

fn active_mask_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push("_active");
    PathBuf::from(name)
}

/// Reads whitespace separated floating point values.
pub(crate) fn read_ascii_values(path: &Path) -> IoResult<Vec<f64>> {
    let text = fs::read_to_string(path)?;
    text.split_whitespace()
        .enumerate()
        .map(|(i, token)| {
            token.parse::<f64>().map_err(|e| {
                IoError::new(
                    ErrorKind::InvalidData,
                    format!("{}: value {i} '{token}': {e}", path.display()),
                )
            })
        })
        .collect()
}
