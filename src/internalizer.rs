//! Internalization of one realization's forward model results.
//!
//! The [`Internalizer`] runs once per completed realization. It optionally
//! forward-initializes nodes, merges the simulator summary into the case,
//! loads GEN_DATA files and finally records the realization's state.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::case::Case;
use crate::config::EnsembleConfig;
use crate::error::LoadError;
use crate::forward_init::{FileForwardInit, ForwardInitializer};
use crate::node::{GenData, NodeValue, SummaryVector};
use crate::state_map::RealizationState;
use crate::storage::{NodeKey, StorageError};
use crate::summary::{FileSummaryReader, ParsedSummary, SummaryReader};

/// Message of a successful internalization.
pub const LOAD_SUCCESS_MESSAGE: &str = "Results loaded successfully.";

/// Terminal status of one internalization attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoadStatus {
    LoadSuccessful,
    LoadFailure,
    /// The realization's report times conflict with the case time map.
    TimeMapFailure,
}

/// Status plus human readable message of one internalization attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutcome {
    pub status: LoadStatus,
    pub message: String,
}

impl LoadOutcome {
    fn success() -> Self {
        Self {
            status: LoadStatus::LoadSuccessful,
            message: LOAD_SUCCESS_MESSAGE.to_string(),
        }
    }

    fn failure(err: &LoadError) -> Self {
        let status = if err.is_consistency() {
            LoadStatus::TimeMapFailure
        } else {
            LoadStatus::LoadFailure
        };
        Self {
            status,
            message: err.to_string(),
        }
    }

    /// Returns true if the realization was loaded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == LoadStatus::LoadSuccessful
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct MissingKeys {
    observed: Vec<String>,
    unobserved: Vec<String>,
}

/// Loads forward model results of single realizations into a case.
pub struct Internalizer {
    config: Arc<EnsembleConfig>,
    reader: Arc<dyn SummaryReader>,
    forward_init: Arc<dyn ForwardInitializer>,
}

impl Internalizer {
    /// Creates an internalizer reading summary and init files from disk.
    #[must_use]
    pub fn new(config: Arc<EnsembleConfig>) -> Self {
        Self {
            config,
            reader: Arc::new(FileSummaryReader::new()),
            forward_init: Arc::new(FileForwardInit::new()),
        }
    }

    /// Replaces the simulator output reader.
    #[must_use]
    pub fn with_summary_reader(mut self, reader: Arc<dyn SummaryReader>) -> Self {
        self.reader = reader;
        self
    }

    /// Replaces the forward-init collaborator.
    #[must_use]
    pub fn with_forward_init(mut self, forward_init: Arc<dyn ForwardInitializer>) -> Self {
        self.forward_init = forward_init;
        self
    }

    #[must_use]
    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    /// Internalizes the results of realization `iens` found in `run_path`.
    ///
    /// `job_name` is the simulator base name of the summary files. `num_steps`
    /// bounds GEN_DATA loading when the case time map is still empty.
    ///
    /// Values stored before a failure are kept. The state map entry for `iens`
    /// becomes `HasData` on success and `LoadFailure` otherwise. Running the
    /// same realization again yields the same storage contents.
    pub fn ingest(
        &self,
        case: &Case,
        iens: usize,
        run_path: &Path,
        job_name: &str,
        num_steps: usize,
    ) -> LoadOutcome {
        match self.run(case, iens, run_path, job_name, num_steps) {
            Ok(()) => {
                case.state_map().set(iens, RealizationState::HasData);
                debug!(iens, "realization loaded");
                LoadOutcome::success()
            }
            Err(outcome) => {
                case.state_map().set(iens, RealizationState::LoadFailure);
                outcome
            }
        }
    }

    fn run(
        &self,
        case: &Case,
        iens: usize,
        run_path: &Path,
        job_name: &str,
        num_steps: usize,
    ) -> Result<(), LoadOutcome> {
        if self.config.have_forward_init() {
            self.forward_init
                .initialize(case, &self.config, iens, run_path)
                .map_err(|e| LoadOutcome::failure(&e))?;
        }

        if self.config.expects_summary() {
            self.internalize_summary(case, iens, run_path, job_name)
                .map_err(|e| {
                    let mut outcome = LoadOutcome::failure(&e);
                    outcome.message.push_str(&format!(
                        " from: {}/{job_name}.UNSMRY",
                        run_path.display()
                    ));
                    outcome
                })?;
        }

        self.internalize_gen_data(case, iens, run_path, num_steps)
            .map_err(|e| LoadOutcome::failure(&e))
    }

    fn internalize_summary(
        &self,
        case: &Case,
        iens: usize,
        run_path: &Path,
        job_name: &str,
    ) -> Result<(), LoadError> {
        let summary = self.reader.read(run_path, job_name)?;
        case.time_map().summary_update(&summary)?;
        let indices = case.time_map().indices(&summary);

        for key in summary.keys() {
            if !self.should_load(key) {
                continue;
            }
            case.record_summary_key(key);
            self.config
                .get_or_create_summary_node(key)
                .map_err(|e| LoadError::structural(e.to_string()))?;

            let Some(series) = summary.series(key) else {
                continue;
            };
            let node_key = NodeKey::vector(key.as_str(), iens);
            case.storage().merge(&node_key, &mut |existing| {
                let mut vector = match existing {
                    None => SummaryVector::new(),
                    Some(NodeValue::Summary(vector)) => vector,
                    Some(other) => {
                        return Err(StorageError::KindMismatch {
                            key: node_key.to_string(),
                            expected: "SUMMARY",
                            actual: other.kind_name(),
                        })
                    }
                };
                vector.overlay(&series, &indices);
                Ok(NodeValue::Summary(vector))
            })?;
        }

        self.check_required_keys(&summary)
    }

    fn should_load(&self, key: &str) -> bool {
        self.config.matcher().matches(key)
    }

    fn check_required_keys(&self, summary: &ParsedSummary) -> Result<(), LoadError> {
        let missing = self.missing_required_keys(summary);
        for key in &missing.unobserved {
            info!(
                "Unable to find data for summary key: {key}, but have no observations either, so will continue."
            );
        }

        if missing.observed.is_empty() {
            Ok(())
        } else {
            Err(LoadError::MissingRequiredData {
                keys: missing.observed,
            })
        }
    }

    /// Required keys the summary lacks, split by whether their node carries
    /// observations. Keys without a configured node are in neither list.
    fn missing_required_keys(&self, summary: &ParsedSummary) -> MissingKeys {
        let matcher = self.config.matcher();
        let mut missing = MissingKeys::default();
        for key in matcher.registered_keys() {
            if !matcher.is_required(&key) || summary.has_key(&key) {
                continue;
            }
            match self.config.get_node(&key) {
                Some(node) if node.has_observations() => missing.observed.push(key),
                Some(_) => missing.unobserved.push(key),
                None => {}
            }
        }
        missing
    }

    fn internalize_gen_data(
        &self,
        case: &Case,
        iens: usize,
        run_path: &Path,
        num_steps: usize,
    ) -> Result<(), LoadError> {
        let num_reports = if case.time_map().is_empty() {
            num_steps
        } else {
            case.time_map().size()
        };

        let mut failures = Vec::new();
        for node in self.config.gen_data_nodes() {
            let Some(config) = node.gen_data_config() else {
                continue;
            };
            for report_step in (0..=num_reports).filter(|s| config.should_internalize(*s)) {
                let path = config.result_path(run_path, report_step);
                let stored = GenData::forward_load(&path)
                    .map_err(|e| e.to_string())
                    .and_then(|data| {
                        let size = data.size();
                        case.storage()
                            .store(
                                &NodeKey::step(node.name(), iens, report_step),
                                NodeValue::GenData(data),
                            )
                            .map(|()| size)
                            .map_err(|e| e.to_string())
                    });

                match stored {
                    Ok(size) => info!(
                        "Loaded GEN_DATA: {} instance for step: {report_step} from file: {} size: {size}",
                        node.name(),
                        path.display()
                    ),
                    Err(reason) => {
                        error!(
                            %reason,
                            "[{iens:03}:{report_step:04}] Failed load data for GEN_DATA node:{}",
                            node.name()
                        );
                        failures.push(LoadError::PerStepLoad {
                            key: node.name().to_string(),
                            report_step,
                            reason,
                        });
                    }
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(LoadError::GenData { failures })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigNode, GenDataConfig};
    use crate::summary::{ReportStep, SummaryWriter};
    use chrono::{Duration, TimeZone, Utc};
    use std::fs;
    use tempfile::tempdir;

    fn write_summary(dir: &Path, days: &[i64], fopr: f64) {
        let start = Utc.with_ymd_and_hms(2010, 1, 1, 0, 0, 0).unwrap();
        let mut writer = SummaryWriter::new("ECLBASE", start);
        writer.add_variable("FOPR");
        for day in days {
            writer.add_report_step(start + Duration::days(*day), &[("FOPR", fopr)]);
        }
        writer.write(dir).unwrap();
    }

    fn summary_config() -> Arc<EnsembleConfig> {
        let mut config = EnsembleConfig::new();
        config.add_summary_key("FOPR", false).unwrap();
        Arc::new(config)
    }

    #[test]
    fn test_missing_summary_is_structural() {
        let run_path = tempdir().unwrap();
        let case = Case::in_memory();
        let outcome = Internalizer::new(summary_config()).ingest(&case, 0, run_path.path(), "ECLBASE", 0);

        assert_eq!(outcome.status, LoadStatus::LoadFailure);
        assert!(outcome.message.contains("Could not find SUMMARY file"));
        assert!(outcome.message.ends_with("ECLBASE.UNSMRY"));
        assert_eq!(case.state_map().get(0), RealizationState::LoadFailure);
    }

    #[test]
    fn test_time_conflict_reports_time_map_failure() {
        let case = Case::in_memory();
        let internalizer = Internalizer::new(summary_config());

        let first = tempdir().unwrap();
        write_summary(first.path(), &[10, 20], 1.0);
        assert!(internalizer.ingest(&case, 0, first.path(), "ECLBASE", 0).is_success());

        let second = tempdir().unwrap();
        write_summary(second.path(), &[10, 25], 1.0);
        let outcome = internalizer.ingest(&case, 1, second.path(), "ECLBASE", 0);
        assert_eq!(outcome.status, LoadStatus::TimeMapFailure);
        assert!(outcome.message.contains("Time mismatch for step: 2"));
        assert_eq!(case.time_map().size(), 3);
    }

    #[test]
    fn test_summary_values_stored_at_case_steps() {
        let run_path = tempdir().unwrap();
        write_summary(run_path.path(), &[10, 20], 7.5);

        let case = Case::in_memory();
        let config = summary_config();
        let outcome = Internalizer::new(Arc::clone(&config)).ingest(&case, 3, run_path.path(), "ECLBASE", 0);
        assert_eq!(outcome.message, LOAD_SUCCESS_MESSAGE);

        let stored = case.storage().load(&NodeKey::vector("FOPR", 3)).unwrap().unwrap();
        let vector = stored.as_summary().unwrap();
        assert_eq!(vector.get(0), None);
        assert_eq!(vector.get(1), Some(7.5));
        assert_eq!(vector.get(2), Some(7.5));
        assert_eq!(case.observed_keys(), vec!["FOPR"]);
    }

    #[test]
    fn test_only_matched_keys_are_loaded() {
        let run_path = tempdir().unwrap();
        let start = Utc.with_ymd_and_hms(2010, 1, 1, 0, 0, 0).unwrap();
        let mut writer = SummaryWriter::new("ECLBASE", start);
        writer.add_variable("FOPR").add_variable("FGPT");
        writer.add_report_step(start + Duration::days(10), &[("FOPR", 1.0), ("FGPT", 2.0)]);
        writer.write(run_path.path()).unwrap();

        // A SUMMARY node alone does not make a key loadable.
        let mut config = EnsembleConfig::new();
        config.add_summary_key("FOPR", false).unwrap();
        config.add_node(ConfigNode::summary("FGPT").unwrap()).unwrap();

        let case = Case::in_memory();
        let outcome = Internalizer::new(Arc::new(config)).ingest(&case, 0, run_path.path(), "ECLBASE", 0);
        assert!(outcome.is_success(), "{}", outcome.message);
        assert!(case.storage().contains(&NodeKey::vector("FOPR", 0)).unwrap());
        assert!(!case.storage().contains(&NodeKey::vector("FGPT", 0)).unwrap());
        assert_eq!(case.observed_keys(), vec!["FOPR"]);
    }

    #[test]
    fn test_missing_required_keys_split_by_observations() {
        let mut config = EnsembleConfig::new();
        config.add_summary_key("FOPR", false).unwrap();
        config.add_summary_key("WWCT:*", true).unwrap();
        config.add_summary_key("WGPR:W1", true).unwrap();
        config.add_summary_key("WWCT:WELL1", true).unwrap();
        config.add_obs_key("WWCT:WELL1", "WWCT_OBS").unwrap();
        let internalizer = Internalizer::new(Arc::new(config));

        let start = Utc.with_ymd_and_hms(2010, 1, 1, 0, 0, 0).unwrap();
        let summary = ParsedSummary::new(
            vec!["FOPR".to_string()],
            vec![ReportStep {
                report_step: 0,
                sim_time: start,
                values: vec![1.0],
            }],
        )
        .unwrap();

        // The wildcard pattern has no node, so it is neither failed nor reported.
        assert_eq!(
            internalizer.missing_required_keys(&summary),
            MissingKeys {
                observed: vec!["WWCT:WELL1".to_string()],
                unobserved: vec!["WGPR:W1".to_string()],
            }
        );
    }

    #[test]
    fn test_gen_data_uses_num_steps_without_time_map() {
        let run_path = tempdir().unwrap();
        fs::write(run_path.path().join("wpr_1.txt"), "1 2 3").unwrap();

        let config = EnsembleConfig::new();
        config
            .add_node(ConfigNode::gen_data("WPR", GenDataConfig::new("wpr_%d.txt", [1]).unwrap()).unwrap())
            .unwrap();
        let case = Case::in_memory();
        let outcome = Internalizer::new(Arc::new(config)).ingest(&case, 0, run_path.path(), "ECLBASE", 1);

        assert!(outcome.is_success(), "{}", outcome.message);
        let stored = case.storage().load(&NodeKey::step("WPR", 0, 1)).unwrap().unwrap();
        assert_eq!(stored.as_gen_data().unwrap().size(), 3);
    }
}
