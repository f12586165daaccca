//! Storage module - typed persistence for calibration profiles and results
//!
//! The core never sees a storage format. It talks to a [`ProfileRepository`]
//! and two implementations ship with the crate:
//! - `MemoryRepository` for tests and the embedded app layer
//! - `JsonFileRepository` for the CLI, one JSON document per entry

mod json;
mod memory;

pub use json::JsonFileRepository;
pub use memory::MemoryRepository;

use crate::audiometry::TestResultRecord;
use crate::calibration::CalibrationTable;
use crate::error::{log_storage_error, StorageError};

/// Persistence seam for calibration profiles and test records
pub trait ProfileRepository: Send + Sync {
    /// # Errors
    /// `NotFound` when no profile with `setting_name` exists
    fn load_calibration(&self, setting_name: &str) -> Result<CalibrationTable, StorageError>;

    fn save_calibration(&self, table: &CalibrationTable) -> Result<(), StorageError>;

    /// # Errors
    /// `NotFound` when no profile with `setting_name` exists
    fn delete_calibration(&self, setting_name: &str) -> Result<(), StorageError>;

    /// Names of every stored profile, sorted
    fn list_calibrations(&self) -> Result<Vec<String>, StorageError>;

    fn save_test_result(&self, record: &TestResultRecord) -> Result<(), StorageError>;

    /// # Errors
    /// `NotFound` when no record with `test_id` exists
    fn load_test_result(&self, test_id: u64) -> Result<TestResultRecord, StorageError>;

    /// Every stored record ordered by test id
    fn load_test_results(&self) -> Result<Vec<TestResultRecord>, StorageError>;
}

/// Save a finished record, logging instead of failing
///
/// A test that completed is still valid when the store is unavailable, so
/// callers keep the record either way.
pub fn save_test_result_or_log(repository: &dyn ProfileRepository, record: &TestResultRecord) -> bool {
    match repository.save_test_result(record) {
        Ok(()) => {
            tracing::info!(
                "[Storage] Saved {} record {}",
                record.test_type.as_str(),
                record.test_id()
            );
            true
        }
        Err(err) => {
            log_storage_error(&err, "save_test_result");
            false
        }
    }
}

/// Stored records, or an empty list with the failure logged
pub fn load_test_results_or_log(repository: &dyn ProfileRepository) -> Vec<TestResultRecord> {
    repository.load_test_results().unwrap_or_else(|err| {
        log_storage_error(&err, "load_test_results");
        Vec::new()
    })
}
