//! The case-wide report step → simulated time registry.
//!
//! Every realization of a case must agree on when each report step happens.
//! The first realization to report a step fixes its time; later realizations
//! may add new steps but never move an existing one.

use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::summary::ParsedSummary;

/// Where the time a realization disagreed with came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeSource {
    /// Committed earlier by another realization.
    TimeMap,
    /// The attached reference case.
    ReferenceCase,
}

impl fmt::Display for TimeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimeMap => write!(f, "time map"),
            Self::ReferenceCase => write!(f, "reference case"),
        }
    }
}

/// One report step whose time disagrees with the committed map.
///
/// Either the step already holds another time, or the claimed time is already
/// held by a different step (`existing_step != report_step`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeConflict {
    /// Report step in conflict.
    pub report_step: usize,
    /// Time claimed by the realization.
    pub response_time: DateTime<Utc>,
    /// Step holding `existing_time`.
    pub existing_step: usize,
    /// Time already committed.
    pub existing_time: DateTime<Utc>,
    /// Origin of the committed time.
    pub source: TimeSource,
}

impl TimeConflict {
    /// Returns true if the claimed time is committed at another step.
    #[must_use]
    pub fn is_duplicate_time(&self) -> bool {
        self.existing_step != self.report_step
    }
}

impl fmt::Display for TimeConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_duplicate_time() {
            return write!(
                f,
                "Time mismatch for step: {}, response time: {} already used by step: {} in {}",
                self.report_step,
                self.response_time.format("%Y-%m-%d"),
                self.existing_step,
                self.source
            );
        }
        write!(
            f,
            "Time mismatch for step: {}, response time: {}, {}: {}",
            self.report_step,
            self.response_time.format("%Y-%m-%d"),
            self.source,
            self.existing_time.format("%Y-%m-%d")
        )
    }
}

fn describe_conflicts(conflicts: &[TimeConflict]) -> String {
    match conflicts {
        [] => "time map is consistent".to_string(),
        [only] => only.to_string(),
        [first, .., last] => format!(
            "{} inconsistencies in time_map, first: {first}, last: {last}",
            conflicts.len()
        ),
    }
}

/// A realization's report times conflict with the committed time map.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", describe_conflicts(.conflicts))]
pub struct TimeMapError {
    conflicts: Vec<TimeConflict>,
}

impl TimeMapError {
    /// Every conflicting step, in step order.
    #[must_use]
    pub fn conflicts(&self) -> &[TimeConflict] {
        &self.conflicts
    }
}

/// Serializable state of a [`TimeMap`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeMapSnapshot {
    /// Committed time per report step, `None` for gaps.
    pub steps: Vec<Option<DateTime<Utc>>>,
    /// Reference case report times, if attached.
    pub refcase: Option<Vec<DateTime<Utc>>>,
}

/// Thread-safe report step → time registry shared by all realizations of a case.
///
/// Writers are serialized: [`TimeMap::summary_update`] holds the write lock for
/// the whole check-then-insert, so two realizations racing for the same unset
/// step resolve first committer wins.
#[derive(Debug, Default)]
pub struct TimeMap {
    state: RwLock<TimeMapSnapshot>,
}

impl TimeMap {
    /// Creates an empty time map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores a time map from a snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: TimeMapSnapshot) -> Self {
        Self {
            state: RwLock::new(snapshot),
        }
    }

    // The map is only mutated after every check has passed, so a poisoned
    // lock still guards consistent data.
    fn read(&self) -> RwLockReadGuard<'_, TimeMapSnapshot> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, TimeMapSnapshot> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// A copy of the current state for persistence.
    #[must_use]
    pub fn snapshot(&self) -> TimeMapSnapshot {
        self.read().clone()
    }

    /// Attaches a reference case whose report times every realization must match.
    pub fn attach_refcase(&self, times: Vec<DateTime<Utc>>) {
        self.write().refcase = Some(times);
    }

    /// Returns true if a reference case is attached.
    #[must_use]
    pub fn has_refcase(&self) -> bool {
        self.read().refcase.is_some()
    }

    /// Number of report steps, including gaps below the last known step.
    #[must_use]
    pub fn size(&self) -> usize {
        self.read().steps.len()
    }

    /// Returns true if no step has been committed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Committed time of `report_step`.
    #[must_use]
    pub fn get(&self, report_step: usize) -> Option<DateTime<Utc>> {
        self.read().steps.get(report_step).copied().flatten()
    }

    /// Highest report step with a slot in the map.
    #[must_use]
    pub fn last_step(&self) -> Option<usize> {
        self.size().checked_sub(1)
    }

    /// Report step committed at exactly `time`.
    #[must_use]
    pub fn lookup_time(&self, time: DateTime<Utc>) -> Option<usize> {
        self.read().steps.iter().position(|t| *t == Some(time))
    }

    /// Merges a realization's report times into the map.
    ///
    /// Unset steps are inserted, equal times are a no-op. If any step disagrees
    /// with the committed time (or the reference case), or claims a time another
    /// step already holds, nothing is inserted and every conflict is returned.
    ///
    /// # Errors
    ///
    /// Returns [`TimeMapError`] describing the conflicting steps.
    pub fn summary_update(&self, summary: &ParsedSummary) -> Result<(), TimeMapError> {
        let mut state = self.write();
        let by_time = committed_steps_by_time(&state.steps);

        let mut conflicts = Vec::new();
        for (report_step, response_time) in summary.report_times() {
            let committed = match state.refcase.as_ref().and_then(|r| r.get(report_step)) {
                Some(reference) => Some((*reference, TimeSource::ReferenceCase)),
                None => state
                    .steps
                    .get(report_step)
                    .copied()
                    .flatten()
                    .map(|t| (t, TimeSource::TimeMap)),
            };

            match committed {
                Some((existing_time, source)) if existing_time != response_time => {
                    conflicts.push(TimeConflict {
                        report_step,
                        response_time,
                        existing_step: report_step,
                        existing_time,
                        source,
                    });
                }
                Some(_) => {}
                None => {
                    if let Some(&other) = by_time.get(&response_time) {
                        conflicts.push(TimeConflict {
                            report_step,
                            response_time,
                            existing_step: other,
                            existing_time: response_time,
                            source: TimeSource::TimeMap,
                        });
                    }
                }
            }
        }

        if !conflicts.is_empty() {
            let err = TimeMapError { conflicts };
            warn!(error = %err, "Rejected summary report times");
            return Err(err);
        }

        for (report_step, response_time) in summary.report_times() {
            if state.steps.len() <= report_step {
                state.steps.resize(report_step + 1, None);
            }
            state.steps[report_step].get_or_insert(response_time);
        }
        Ok(())
    }

    /// Storage index for every report step ordinal of `summary`.
    ///
    /// Entry `k` is the case-wide step whose time equals the summary's k-th
    /// report time. `None` means "do not store"; ordinal 0 is always `None`
    /// because it is the pre-simulation state. The result is padded with `None`
    /// up to the summary's last report step.
    #[must_use]
    pub fn indices(&self, summary: &ParsedSummary) -> Vec<Option<usize>> {
        let state = self.read();
        let by_time = committed_steps_by_time(&state.steps);

        let mut indices: Vec<Option<usize>> = summary
            .report_times()
            .map(|(_, time)| by_time.get(&time).copied())
            .collect();

        if let Some(first) = indices.first_mut() {
            *first = None;
        }
        let padded = summary.last_report_step() + 1;
        if indices.len() < padded {
            indices.resize(padded, None);
        }
        indices
    }
}

// Committed times are unique per step, so the map is one to one.
fn committed_steps_by_time(steps: &[Option<DateTime<Utc>>]) -> HashMap<DateTime<Utc>, usize> {
    steps
        .iter()
        .enumerate()
        .filter_map(|(step, t)| t.map(|t| (t, step)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::ReportStep;
    use chrono::{Duration, TimeZone};
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2010, 1, 1, 0, 0, 0).unwrap()
    }

    fn summary_with_days(days: &[i64]) -> ParsedSummary {
        let steps = days
            .iter()
            .enumerate()
            .map(|(report_step, day)| ReportStep {
                report_step,
                sim_time: start() + Duration::days(*day),
                values: vec![0.0],
            })
            .collect();
        ParsedSummary::new(vec!["FOPR".to_string()], steps).unwrap()
    }

    #[test]
    fn test_update_inserts_unset_steps() {
        let map = TimeMap::new();
        map.summary_update(&summary_with_days(&[0, 10, 20])).unwrap();
        assert_eq!(map.size(), 3);
        assert_eq!(map.get(2), Some(start() + Duration::days(20)));
        assert_eq!(map.lookup_time(start() + Duration::days(10)), Some(1));
    }

    #[test]
    fn test_matching_update_is_noop() {
        let map = TimeMap::new();
        map.summary_update(&summary_with_days(&[0, 10])).unwrap();
        let before = map.snapshot();
        map.summary_update(&summary_with_days(&[0, 10])).unwrap();
        assert_eq!(map.snapshot(), before);
    }

    #[test]
    fn test_conflict_leaves_map_untouched() {
        let map = TimeMap::new();
        map.summary_update(&summary_with_days(&[0, 10, 20, 30])).unwrap();

        // Step 3 moves and step 4 is new; neither may be committed.
        let err = map
            .summary_update(&summary_with_days(&[0, 10, 20, 31, 40]))
            .unwrap_err();
        assert_eq!(err.conflicts().len(), 1);
        assert_eq!(err.conflicts()[0].report_step, 3);
        assert!(err.to_string().contains("Time mismatch for step: 3"));
        assert_eq!(map.get(3), Some(start() + Duration::days(30)));
        assert_eq!(map.size(), 4);
    }

    #[test]
    fn test_time_held_by_other_step_is_rejected() {
        let map = TimeMap::new();
        map.summary_update(&summary_with_days(&[0, 10])).unwrap();
        let before = map.snapshot();

        // Step 2 claims the time of step 1, step 3 would be new.
        let shifted = ParsedSummary::new(
            vec!["FOPR".to_string()],
            vec![
                ReportStep {
                    report_step: 2,
                    sim_time: start() + Duration::days(10),
                    values: vec![0.0],
                },
                ReportStep {
                    report_step: 3,
                    sim_time: start() + Duration::days(30),
                    values: vec![0.0],
                },
            ],
        )
        .unwrap();
        let err = map.summary_update(&shifted).unwrap_err();
        assert_eq!(err.conflicts().len(), 1);
        assert!(err.conflicts()[0].is_duplicate_time());
        assert_eq!(err.conflicts()[0].existing_step, 1);
        assert!(err.to_string().contains("already used by step: 1"));
        assert_eq!(map.snapshot(), before);

        // Nothing was committed, so step 1 still resolves to itself.
        let summary = summary_with_days(&[0, 10]);
        assert_eq!(map.indices(&summary), vec![None, Some(1)]);
    }

    #[test]
    fn test_concurrent_updates_first_committer_wins() {
        const WRITERS: usize = 8;

        let map = Arc::new(TimeMap::new());
        let barrier = Arc::new(Barrier::new(WRITERS));
        let handles: Vec<_> = (0..WRITERS)
            .map(|i| {
                let map = Arc::clone(&map);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    // Every writer agrees on step 0 and claims its own time for step 1.
                    let summary = summary_with_days(&[0, 10 + i as i64]);
                    barrier.wait();
                    map.summary_update(&summary).map(|()| i)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners: Vec<usize> = results.iter().filter_map(|r| r.as_ref().ok().copied()).collect();
        assert_eq!(winners.len(), 1);

        let winner = winners[0];
        assert_eq!(map.get(1), Some(start() + Duration::days(10 + winner as i64)));
        assert_eq!(map.size(), 2);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert_eq!(err.conflicts().len(), 1);
            assert_eq!(err.conflicts()[0].report_step, 1);
            assert_eq!(err.conflicts()[0].existing_time, start() + Duration::days(10 + winner as i64));
        }
    }

    #[test]
    fn test_several_conflicts_reported_first_and_last() {
        let map = TimeMap::new();
        map.summary_update(&summary_with_days(&[0, 10, 20])).unwrap();
        let err = map.summary_update(&summary_with_days(&[1, 11, 20])).unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("2 inconsistencies in time_map, first: Time mismatch for step: 0"));
        assert!(msg.contains("last: Time mismatch for step: 1"));
    }

    #[test]
    fn test_refcase_conflict_names_reference_case() {
        let map = TimeMap::new();
        map.attach_refcase(vec![start(), start() + Duration::days(9)]);
        let err = map.summary_update(&summary_with_days(&[0, 10])).unwrap_err();
        assert_eq!(err.conflicts()[0].source, TimeSource::ReferenceCase);
        assert!(err.to_string().contains("reference case: 2010-01-10"));
        assert!(map.is_empty());
    }

    #[test]
    fn test_indices_skip_initial_step() {
        let map = TimeMap::new();
        let summary = summary_with_days(&[0, 10, 20]);
        map.summary_update(&summary).unwrap();
        assert_eq!(map.indices(&summary), vec![None, Some(1), Some(2)]);
    }

    #[test]
    fn test_indices_for_restarted_summary() {
        let map = TimeMap::new();
        map.summary_update(&summary_with_days(&[0, 10, 20, 30])).unwrap();

        let restart = ParsedSummary::new(
            vec!["FOPR".to_string()],
            vec![
                ReportStep {
                    report_step: 2,
                    sim_time: start() + Duration::days(20),
                    values: vec![0.0],
                },
                ReportStep {
                    report_step: 3,
                    sim_time: start() + Duration::days(30),
                    values: vec![0.0],
                },
            ],
        )
        .unwrap();
        assert_eq!(map.indices(&restart), vec![None, Some(3), None, None]);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let map = TimeMap::new();
        map.summary_update(&summary_with_days(&[0, 5])).unwrap();
        let restored = TimeMap::from_snapshot(map.snapshot());
        assert_eq!(restored.get(1), map.get(1));
        assert_eq!(restored.size(), 2);
    }
}
