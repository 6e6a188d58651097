//! Loading a batch of realizations.
//!
//! Each realization is an independent unit of work. [`ForwardModelLoader`]
//! fans the active realizations of a batch out to a small pool of named
//! worker threads over a bounded channel and collects every outcome.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::thread;

use crossbeam_channel::{bounded, unbounded};
use tracing::{error, info};

use crate::case::Case;
use crate::error::{ConfigError, HistmatchError, HistmatchResult};
use crate::internalizer::{Internalizer, LoadOutcome};

/// Loader configuration.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Number of worker threads.
    pub workers: usize,
    /// Maximum queued realizations.
    pub queue_capacity: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            workers: thread::available_parallelism().map_or(2, usize::from),
            queue_capacity: 64,
        }
    }
}

impl LoaderConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `workers` or `queue_capacity` is zero.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::InvalidValue {
                field: "workers".to_string(),
                reason: "at least one worker is required".to_string(),
            });
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "queue_capacity".to_string(),
                reason: "queue capacity must be positive".to_string(),
            });
        }
        Ok(self)
    }
}

/// Where the forward model of one realization wrote its results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunArg {
    pub iens: usize,
    pub run_path: PathBuf,
    /// Simulator base name of the summary files.
    pub job_name: String,
}

impl RunArg {
    #[must_use]
    pub fn new(iens: usize, run_path: impl Into<PathBuf>, job_name: impl Into<String>) -> Self {
        Self {
            iens,
            run_path: run_path.into(),
            job_name: job_name.into(),
        }
    }
}

/// Runs an [`Internalizer`] over many realizations concurrently.
pub struct ForwardModelLoader<'a> {
    internalizer: &'a Internalizer,
    config: LoaderConfig,
}

impl<'a> ForwardModelLoader<'a> {
    /// Creates a loader.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid.
    pub fn new(internalizer: &'a Internalizer, config: LoaderConfig) -> HistmatchResult<Self> {
        Ok(Self {
            internalizer,
            config: config.validate()?,
        })
    }

    /// Loads every run whose realization is set in `active`.
    ///
    /// Realizations beyond the end of `active` are skipped. Returns the
    /// outcome of every loaded realization keyed by realization.
    ///
    /// # Errors
    ///
    /// Returns an error if a worker cannot be spawned or panics. Load
    /// failures of single realizations are reported in their outcome.
    pub fn load(
        &self,
        case: &Case,
        runs: &[RunArg],
        active: &[bool],
        num_steps: usize,
    ) -> HistmatchResult<BTreeMap<usize, LoadOutcome>> {
        let internalizer = self.internalizer;
        let workers = self.config.workers;
        let queue_capacity = self.config.queue_capacity;

        let outcomes = thread::scope(|scope| -> HistmatchResult<BTreeMap<usize, LoadOutcome>> {
            let (job_tx, job_rx) = bounded::<&RunArg>(queue_capacity);
            let (result_tx, result_rx) = unbounded::<(usize, LoadOutcome)>();

            let mut handles = Vec::with_capacity(workers);
            for idx in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                let handle = thread::Builder::new()
                    .name(format!("histmatch-load-{idx}"))
                    .spawn_scoped(scope, move || {
                        for run in job_rx {
                            let outcome = internalizer.ingest(
                                case,
                                run.iens,
                                &run.run_path,
                                &run.job_name,
                                num_steps,
                            );
                            if result_tx.send((run.iens, outcome)).is_err() {
                                break;
                            }
                        }
                    })
                    .map_err(|e| HistmatchError::internal(format!("failed to spawn loader worker: {e}")))?;
                handles.push(handle);
            }
            drop(job_rx);
            drop(result_tx);

            let selected = runs
                .iter()
                .filter(|run| active.get(run.iens).copied().unwrap_or(false));
            for run in selected {
                if job_tx.send(run).is_err() {
                    break;
                }
            }
            // Close the queue: workers drain what is left, then exit.
            drop(job_tx);

            for handle in handles {
                handle
                    .join()
                    .map_err(|_| HistmatchError::internal("loader worker panicked"))?;
            }
            Ok(result_rx.try_iter().collect())
        })?;

        for (iens, outcome) in &outcomes {
            if !outcome.is_success() {
                error!("Realization: {iens}, load failure: {}", outcome.message);
            }
        }
        Ok(outcomes)
    }
}

/// Loads the active realizations of `runs` with the default loader
/// configuration and returns how many were loaded successfully.
///
/// Call [`Case::sync`] afterwards to persist the updated case metadata.
///
/// # Errors
///
/// Returns an error if the worker pool fails.
pub fn load_from_forward_model(
    internalizer: &Internalizer,
    case: &Case,
    runs: &[RunArg],
    active: &[bool],
    num_steps: usize,
) -> HistmatchResult<usize> {
    let outcomes = ForwardModelLoader::new(internalizer, LoaderConfig::default())?
        .load(case, runs, active, num_steps)?;
    let loaded = outcomes.values().filter(|o| o.is_success()).count();
    info!(loaded, requested = outcomes.len(), "Loaded realizations from forward model");
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnsembleConfig;
    use crate::state_map::RealizationState;
    use crate::summary::SummaryWriter;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn test_config_validation() {
        assert!(LoaderConfig::default().validate().is_ok());
        let no_workers = LoaderConfig {
            workers: 0,
            queue_capacity: 4,
        };
        assert!(no_workers.validate().is_err());
    }

    #[test]
    fn test_only_active_realizations_loaded() {
        let start = Utc.with_ymd_and_hms(2010, 1, 1, 0, 0, 0).unwrap();
        let root = tempdir().unwrap();
        let runs: Vec<RunArg> = (0..4)
            .map(|iens| {
                let run_path = root.path().join(format!("realization-{iens}"));
                std::fs::create_dir_all(&run_path).unwrap();
                let mut writer = SummaryWriter::new("ECLBASE", start);
                writer.add_variable("FOPR");
                writer.add_report_step(start + Duration::days(30), &[("FOPR", iens as f64)]);
                writer.write(&run_path).unwrap();
                RunArg::new(iens, run_path, "ECLBASE")
            })
            .collect();

        let mut config = EnsembleConfig::new();
        config.add_summary_key("FOPR", true).unwrap();
        let internalizer = Internalizer::new(Arc::new(config));
        let case = Case::in_memory();

        let loader = ForwardModelLoader::new(
            &internalizer,
            LoaderConfig {
                workers: 2,
                queue_capacity: 1,
            },
        )
        .unwrap();
        let outcomes = loader
            .load(&case, &runs, &[true, false, true, true], 0)
            .unwrap();

        assert_eq!(outcomes.keys().copied().collect::<Vec<_>>(), vec![0, 2, 3]);
        assert!(outcomes.values().all(LoadOutcome::is_success));
        assert_eq!(case.state_map().realizations(RealizationState::HasData), vec![0, 2, 3]);
        assert_eq!(case.state_map().get(1), RealizationState::Undefined);
    }

    #[test]
    fn test_load_from_forward_model_counts_successes() {
        let root = tempdir().unwrap();
        let mut config = EnsembleConfig::new();
        config.add_summary_key("FOPR", false).unwrap();
        let internalizer = Internalizer::new(Arc::new(config));
        let case = Case::in_memory();

        // No summary files were written, so every realization fails.
        let runs = vec![RunArg::new(0, root.path(), "ECLBASE")];
        let loaded = load_from_forward_model(&internalizer, &case, &runs, &[true], 0).unwrap();
        assert_eq!(loaded, 0);
        assert_eq!(case.state_map().get(0), RealizationState::LoadFailure);
    }
}
