//! Parsed simulator summary output.
//!
//! A realization's summary output is a set of scalar time series sampled at
//! report steps. [`ParsedSummary`] is the in-memory form every reader produces;
//! the ingestion pipeline never looks at the files themselves.

mod files;

pub use files::{FileSummaryReader, SummaryArtifacts, SummaryReader, SummaryWriter};

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LoadError;

/// Values of every summary key at the end of one report step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportStep {
    /// Report step number reported by the simulator.
    pub report_step: usize,
    /// Simulated time at the end of the step.
    pub sim_time: DateTime<Utc>,
    /// One value per summary key, in key order.
    pub values: Vec<f64>,
}

/// A realization's summary series keyed by variable name.
///
/// Report steps are strictly increasing. Ordinal `k` refers to the k-th entry,
/// which is usually but not necessarily report step `k`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSummary {
    keys: Vec<String>,
    key_index: HashMap<String, usize>,
    steps: Vec<ReportStep>,
}

impl ParsedSummary {
    /// Builds a summary from its keys and report steps.
    ///
    /// # Errors
    ///
    /// Returns a structural error when there are no report steps, when step
    /// numbers or simulated times are not strictly increasing, when a key is
    /// duplicated, or when a step carries the wrong number of values.
    pub fn new(keys: Vec<String>, steps: Vec<ReportStep>) -> Result<Self, LoadError> {
        if steps.is_empty() {
            return Err(LoadError::structural("summary contains no report steps"));
        }

        let mut key_index = HashMap::with_capacity(keys.len());
        for (i, key) in keys.iter().enumerate() {
            if key_index.insert(key.clone(), i).is_some() {
                return Err(LoadError::structural(format!(
                    "summary key '{key}' is defined more than once"
                )));
            }
        }

        for pair in steps.windows(2) {
            if pair[1].report_step <= pair[0].report_step {
                return Err(LoadError::structural(format!(
                    "report steps out of order: {} follows {}",
                    pair[1].report_step, pair[0].report_step
                )));
            }
            if pair[1].sim_time <= pair[0].sim_time {
                return Err(LoadError::structural(format!(
                    "report step {} at {} does not come after report step {} at {}",
                    pair[1].report_step, pair[1].sim_time, pair[0].report_step, pair[0].sim_time
                )));
            }
        }

        if let Some(bad) = steps.iter().find(|s| s.values.len() != keys.len()) {
            return Err(LoadError::structural(format!(
                "report step {} has {} values for {} keys",
                bad.report_step,
                bad.values.len(),
                keys.len()
            )));
        }

        Ok(Self {
            keys,
            key_index,
            steps,
        })
    }

    /// Summary keys in file order.
    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Returns true if the simulator produced `key`.
    #[must_use]
    pub fn has_key(&self, key: &str) -> bool {
        self.key_index.contains_key(key)
    }

    /// All report steps in order.
    #[must_use]
    pub fn report_steps(&self) -> &[ReportStep] {
        &self.steps
    }

    /// (report step, simulated time) pairs in order.
    pub fn report_times(&self) -> impl Iterator<Item = (usize, DateTime<Utc>)> + '_ {
        self.steps.iter().map(|s| (s.report_step, s.sim_time))
    }

    /// Simulation start, the time of the first report step.
    #[must_use]
    pub fn start_time(&self) -> DateTime<Utc> {
        self.steps[0].sim_time
    }

    /// The last report step the simulator wrote.
    #[must_use]
    pub fn last_report_step(&self) -> usize {
        self.steps.last().map_or(0, |s| s.report_step)
    }

    /// The series for `key`, one value per report step ordinal.
    #[must_use]
    pub fn series(&self, key: &str) -> Option<Vec<f64>> {
        let idx = *self.key_index.get(key)?;
        Some(self.steps.iter().map(|s| s.values[idx]).collect())
    }
}
