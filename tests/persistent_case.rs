//! Persistence tests for on-disk cases.
//!
//! These tests verify that a synced case survives a reopen and that the
//! stored files detect corruption.

#![cfg(feature = "persistent")]

use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use histmatch::storage::persistent::{open_case, PersistentConfig};
use histmatch::{
    EnsembleConfig, Internalizer, NodeKey, NodeStorage, RealizationState, StorageError,
    SummaryWriter,
};
use tempfile::tempdir;

fn config() -> Option<PersistentConfig> {
    Some(PersistentConfig {
        sync_on_write: false,
        ..PersistentConfig::default()
    })
}

fn write_run(run_path: &Path, steps: usize) {
    let start = Utc.with_ymd_and_hms(2020, 6, 1, 0, 0, 0).unwrap();
    let mut writer = SummaryWriter::new("ECLBASE", start);
    writer.add_variable("FOPR");
    for step in 1..=steps {
        writer.add_report_step(start + Duration::days(step as i64), &[("FOPR", step as f64)]);
    }
    writer.write(run_path).unwrap();
}

fn internalizer() -> Internalizer {
    let mut config = EnsembleConfig::new();
    config.add_summary_key("FOPR", true).unwrap();
    Internalizer::new(Arc::new(config))
}

#[test]
fn test_case_survives_reopen() {
    let case_dir = tempdir().unwrap();
    let run = tempdir().unwrap();
    write_run(run.path(), 4);

    let id = {
        let case = open_case(case_dir.path(), config()).unwrap();
        let outcome = internalizer().ingest(&case, 3, run.path(), "ECLBASE", 0);
        assert!(outcome.is_success(), "{}", outcome.message);
        case.sync().unwrap();
        case.id()
    };

    let case = open_case(case_dir.path(), config()).unwrap();
    assert_eq!(case.id(), id);
    assert_eq!(case.time_map().size(), 5);
    assert_eq!(case.state_map().get(3), RealizationState::HasData);
    assert_eq!(case.observed_keys(), vec!["FOPR"]);

    let stored = case.storage().load(&NodeKey::vector("FOPR", 3)).unwrap().unwrap();
    assert_eq!(stored.as_summary().unwrap().get(4), Some(4.0));
}

#[test]
fn test_unsynced_metadata_is_not_restored() {
    let case_dir = tempdir().unwrap();
    let run = tempdir().unwrap();
    write_run(run.path(), 2);

    {
        let case = open_case(case_dir.path(), config()).unwrap();
        assert!(internalizer().ingest(&case, 0, run.path(), "ECLBASE", 0).is_success());
    }

    let case = open_case(case_dir.path(), config()).unwrap();
    assert!(case.time_map().is_empty());
    assert_eq!(case.state_map().get(0), RealizationState::Undefined);
    // Node values are written through immediately.
    assert!(case.storage().contains(&NodeKey::vector("FOPR", 0)).unwrap());
}

#[test]
fn test_second_open_is_rejected() {
    let case_dir = tempdir().unwrap();
    let _case = open_case(case_dir.path(), config()).unwrap();

    let err = open_case(case_dir.path(), config()).unwrap_err();
    assert!(err.is_storage());
}

#[test]
fn test_corrupt_node_file_detected() {
    let case_dir = tempdir().unwrap();
    let run = tempdir().unwrap();
    write_run(run.path(), 2);

    {
        let case = open_case(case_dir.path(), config()).unwrap();
        assert!(internalizer().ingest(&case, 0, run.path(), "ECLBASE", 0).is_success());
    }

    let node_file = fs::read_dir(case_dir.path().join("nodes"))
        .unwrap()
        .flat_map(|shard| fs::read_dir(shard.unwrap().path()).unwrap())
        .map(|entry| entry.unwrap().path())
        .find(|path| path.extension().is_some_and(|e| e == "node"))
        .unwrap();
    let mut bytes = fs::read(&node_file).unwrap();
    let middle = bytes.len() / 2;
    bytes[middle] ^= 0xFF;
    fs::write(&node_file, bytes).unwrap();

    let case = open_case(case_dir.path(), config()).unwrap();
    let err = case.storage().load(&NodeKey::vector("FOPR", 0)).unwrap_err();
    assert!(matches!(err, StorageError::SerializationError(_)));
}
