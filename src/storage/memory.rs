use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::ProfileRepository;
use crate::audiometry::TestResultRecord;
use crate::calibration::CalibrationTable;
use crate::error::StorageError;

/// Process-local repository; contents vanish with the process
#[derive(Default)]
pub struct MemoryRepository {
    calibrations: RwLock<BTreeMap<String, CalibrationTable>>,
    results: RwLock<BTreeMap<u64, TestResultRecord>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_calibrations(
        &self,
    ) -> Result<RwLockReadGuard<'_, BTreeMap<String, CalibrationTable>>, StorageError> {
        self.calibrations
            .read()
            .map_err(|_| StorageError::LockPoisoned {
                component: "calibrations".to_string(),
            })
    }

    fn write_calibrations(
        &self,
    ) -> Result<RwLockWriteGuard<'_, BTreeMap<String, CalibrationTable>>, StorageError> {
        self.calibrations
            .write()
            .map_err(|_| StorageError::LockPoisoned {
                component: "calibrations".to_string(),
            })
    }

    fn read_results(&self) -> Result<RwLockReadGuard<'_, BTreeMap<u64, TestResultRecord>>, StorageError> {
        self.results.read().map_err(|_| StorageError::LockPoisoned {
            component: "results".to_string(),
        })
    }

    fn write_results(
        &self,
    ) -> Result<RwLockWriteGuard<'_, BTreeMap<u64, TestResultRecord>>, StorageError> {
        self.results.write().map_err(|_| StorageError::LockPoisoned {
            component: "results".to_string(),
        })
    }
}

impl ProfileRepository for MemoryRepository {
    fn load_calibration(&self, setting_name: &str) -> Result<CalibrationTable, StorageError> {
        self.read_calibrations()?
            .get(setting_name)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                key: setting_name.to_string(),
            })
    }

    fn save_calibration(&self, table: &CalibrationTable) -> Result<(), StorageError> {
        self.write_calibrations()?
            .insert(table.setting_name.clone(), table.clone());
        Ok(())
    }

    fn delete_calibration(&self, setting_name: &str) -> Result<(), StorageError> {
        self.write_calibrations()?
            .remove(setting_name)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound {
                key: setting_name.to_string(),
            })
    }

    fn list_calibrations(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.read_calibrations()?.keys().cloned().collect())
    }

    fn save_test_result(&self, record: &TestResultRecord) -> Result<(), StorageError> {
        self.write_results()?.insert(record.test_id(), record.clone());
        Ok(())
    }

    fn load_test_result(&self, test_id: u64) -> Result<TestResultRecord, StorageError> {
        self.read_results()?
            .get(&test_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                key: test_id.to_string(),
            })
    }

    fn load_test_results(&self) -> Result<Vec<TestResultRecord>, StorageError> {
        Ok(self.read_results()?.values().cloned().collect())
    }
}
