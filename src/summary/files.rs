//! Summary artifacts on disk.
//!
//! A realization writes two artifacts into its run path, both named after the
//! job's base name:
//!
//! ```text
//! <run_path>/<BASE>.SMSPEC   header: start time and key list (JSON)
//! <run_path>/<BASE>.UNSMRY   unified data: every report step (JSON)
//! ```
//!
//! Both must be present; a run that produced only one of them is treated as
//! having no summary output at all.

use std::collections::HashMap;
use std::fs;
use std::io::{Error as IoError, ErrorKind, Result as IoResult};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LoadError;

use super::{ParsedSummary, ReportStep};

/// Header artifact extension.
pub const HEADER_EXTENSION: &str = "SMSPEC";

/// Unified data artifact extension.
pub const UNIFIED_EXTENSION: &str = "UNSMRY";

/// Reads a realization's summary output.
///
/// Implementations translate every I/O or format failure into
/// [`LoadError::Structural`], keeping the underlying message.
pub trait SummaryReader: Send + Sync {
    /// Reads the summary written under `run_path` for `base_name`.
    fn read(&self, run_path: &Path, base_name: &str) -> Result<ParsedSummary, LoadError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct SummaryHeader {
    start_time: DateTime<Utc>,
    keys: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SummaryData {
    report_steps: Vec<ReportStep>,
}

/// Paths of the two summary artifacts of one realization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryArtifacts {
    /// Header file.
    pub header: PathBuf,
    /// Unified data file.
    pub data: PathBuf,
}

impl SummaryArtifacts {
    /// Expected artifact paths, whether or not they exist.
    #[must_use]
    pub fn expected(run_path: &Path, base_name: &str) -> Self {
        Self {
            header: run_path.join(format!("{base_name}.{HEADER_EXTENSION}")),
            data: run_path.join(format!("{base_name}.{UNIFIED_EXTENSION}")),
        }
    }

    /// Locates both artifacts.
    ///
    /// # Errors
    ///
    /// Returns a structural error if either file is missing.
    pub fn locate(run_path: &Path, base_name: &str) -> Result<Self, LoadError> {
        let artifacts = Self::expected(run_path, base_name);
        if artifacts.header.is_file() && artifacts.data.is_file() {
            Ok(artifacts)
        } else {
            Err(LoadError::structural(
                "Could not find SUMMARY file or using non unified SUMMARY file",
            ))
        }
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, LoadError> {
    let bytes = fs::read(path).map_err(|e| {
        LoadError::structural(format!("failed to read {}: {e}", path.display()))
    })?;
    serde_json::from_slice(&bytes).map_err(|e| {
        LoadError::structural(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Reads the JSON encoded header/unified data pair.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileSummaryReader;

impl FileSummaryReader {
    /// Creates a new reader.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl SummaryReader for FileSummaryReader {
    fn read(&self, run_path: &Path, base_name: &str) -> Result<ParsedSummary, LoadError> {
        let artifacts = SummaryArtifacts::locate(run_path, base_name)?;
        let header: SummaryHeader = read_json(&artifacts.header)?;
        let data: SummaryData = read_json(&artifacts.data)?;

        if let Some(first) = data.report_steps.first() {
            if first.sim_time < header.start_time {
                return Err(LoadError::structural(format!(
                    "report step {} at {} precedes simulation start {}",
                    first.report_step, first.sim_time, header.start_time
                )));
            }
        }

        ParsedSummary::new(header.keys, data.report_steps)
    }
}

/// Writes summary artifacts, used by tooling and tests to fake a simulator run.
///
/// Report step 0 is created at the start time; every later step gets the next
/// step number. Keys without an explicit value are written as 0.0.
#[derive(Debug, Clone)]
pub struct SummaryWriter {
    base_name: String,
    start_time: DateTime<Utc>,
    keys: Vec<String>,
    steps: Vec<(DateTime<Utc>, HashMap<String, f64>)>,
}

impl SummaryWriter {
    /// Starts a summary for `base_name` beginning at `start_time`.
    #[must_use]
    pub fn new(base_name: impl Into<String>, start_time: DateTime<Utc>) -> Self {
        Self {
            base_name: base_name.into(),
            start_time,
            keys: Vec::new(),
            steps: vec![(start_time, HashMap::new())],
        }
    }

    /// Declares a summary variable.
    pub fn add_variable(&mut self, key: impl Into<String>) -> &mut Self {
        let key = key.into();
        if !self.keys.contains(&key) {
            self.keys.push(key);
        }
        self
    }

    /// Appends a report step and returns its number.
    pub fn add_report_step(&mut self, sim_time: DateTime<Utc>, values: &[(&str, f64)]) -> usize {
        let values = values
            .iter()
            .map(|(key, value)| ((*key).to_string(), *value))
            .collect();
        self.steps.push((sim_time, values));
        self.steps.len() - 1
    }

    /// Writes both artifacts into `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if a value names an undeclared key or if writing fails.
    pub fn write(&self, dir: &Path) -> IoResult<SummaryArtifacts> {
        let mut report_steps = Vec::with_capacity(self.steps.len());
        for (report_step, (sim_time, values)) in self.steps.iter().enumerate() {
            if let Some(unknown) = values.keys().find(|k| !self.keys.contains(*k)) {
                return Err(IoError::new(
                    ErrorKind::InvalidInput,
                    format!("value for undeclared summary key '{unknown}'"),
                ));
            }
            report_steps.push(ReportStep {
                report_step,
                sim_time: *sim_time,
                values: self
                    .keys
                    .iter()
                    .map(|k| values.get(k).copied().unwrap_or(0.0))
                    .collect(),
            });
        }

        let header = SummaryHeader {
            start_time: self.start_time,
            keys: self.keys.clone(),
        };
        let data = SummaryData { report_steps };

        let artifacts = SummaryArtifacts::expected(dir, &self.base_name);
        let to_io = |e: serde_json::Error| IoError::new(ErrorKind::InvalidData, e.to_string());
        fs::write(&artifacts.header, serde_json::to_vec(&header).map_err(to_io)?)?;
        fs::write(&artifacts.data, serde_json::to_vec(&data).map_err(to_io)?)?;
        Ok(artifacts)
    }
}
