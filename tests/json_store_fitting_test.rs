//! Fitting from results persisted by the JSON file store

mod common;

use std::sync::Arc;

use hearing_amp::audio::StubBackend;
use hearing_amp::audiometry::{Ear, FrequencyResult, RecordHeader, TestResultRecord, TestType};
use hearing_amp::fitting::EarSelection;
use hearing_amp::storage::{JsonFileRepository, ProfileRepository};

fn record(test_id: u64, patient: &str, test_type: TestType, levels: &[(f32, Ear, f32)]) -> TestResultRecord {
    TestResultRecord {
        header: RecordHeader {
            test_id,
            group: "clinic".to_string(),
            patient_name: patient.to_string(),
        },
        test_type,
        results: levels
            .iter()
            .map(|&(frequency_hz, ear, final_level)| FrequencyResult {
                frequency_hz,
                ear,
                final_level,
                level_history: vec![final_level],
            })
            .collect(),
    }
}

fn seed(repository: &JsonFileRepository) {
    let records = [
        record(1, "P-1", TestType::Threshold, &[(500.0, Ear::Left, 30.0), (4_000.0, Ear::Right, 50.0)]),
        record(2, "P-1", TestType::Mcl, &[(500.0, Ear::Left, 65.0), (4_000.0, Ear::Right, 75.0)]),
        record(3, "P-2", TestType::Threshold, &[(500.0, Ear::Left, 10.0)]),
        record(4, "P-2", TestType::Mcl, &[(500.0, Ear::Left, 40.0)]),
    ];
    for r in &records {
        repository.save_test_result(r).unwrap();
    }
}

#[test]
fn test_fitting_reads_back_stored_results() {
    let dir = tempfile::tempdir().unwrap();
    seed(&JsonFileRepository::new(dir.path()));

    // A fresh repository over the same directory sees every record
    let repository = Arc::new(JsonFileRepository::new(dir.path()));
    let (ctx, _clock) = common::context(&StubBackend::new(), repository);
    assert_eq!(ctx.records_for(None).len(), 4);
    assert_eq!(ctx.records_for(Some("P-1")).len(), 2);

    let params = ctx.apply_fitting(Some("P-1"), EarSelection::Combined).unwrap();
    assert_eq!(params.bands[0].threshold_db, 30.0);
    assert_eq!(params.bands[0].gain_db, 35.0);
    assert_eq!(params.bands[3].threshold_db, 50.0);
    assert_eq!(params.bands[3].gain_db, 25.0);
    assert_eq!(params.bands[1].gain_db, 0.0);

    // Every patient together averages band 0
    let all = ctx.apply_fitting(None, EarSelection::Combined).unwrap();
    assert_eq!(all.bands[0].threshold_db, 20.0);
    assert_eq!(all.bands[0].gain_db, 32.5);

    let left = ctx.apply_fitting(Some("P-1"), EarSelection::Left).unwrap();
    assert_eq!(left.bands[3].gain_db, 0.0);
}

#[test]
fn test_empty_store_fits_zero_parameters() {
    let dir = tempfile::tempdir().unwrap();
    let repository = Arc::new(JsonFileRepository::new(dir.path()));
    let (ctx, _clock) = common::context(&StubBackend::new(), repository);

    let params = ctx.apply_fitting(None, EarSelection::Combined).unwrap();
    assert_eq!(params.len(), 4);
    assert!(params.gain_db().iter().all(|g| *g == 0.0));
}
