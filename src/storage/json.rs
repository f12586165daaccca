use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::ProfileRepository;
use crate::audiometry::TestResultRecord;
use crate::calibration::CalibrationTable;
use crate::error::StorageError;

const CALIBRATION_DIR: &str = "calibrations";
const RESULTS_DIR: &str = "results";

/// Repository writing one pretty-printed JSON document per entry
///
/// Layout under `root`:
/// - `calibrations/<setting name>.json`
/// - `results/<test id>.json`
#[derive(Debug, Clone)]
pub struct JsonFileRepository {
    root: PathBuf,
}

impl JsonFileRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn calibration_path(&self, setting_name: &str) -> PathBuf {
        // Setting names are free text; keep file names portable
        let file: String = setting_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.root.join(CALIBRATION_DIR).join(format!("{file}.json"))
    }

    fn result_path(&self, test_id: u64) -> PathBuf {
        self.root.join(RESULTS_DIR).join(format!("{test_id}.json"))
    }

    fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(value)?;
        fs::write(path, json)?;
        tracing::debug!("[JsonFileRepository] Wrote {:?}", path);
        Ok(())
    }

    fn read_json<T: DeserializeOwned>(path: &Path, key: &str) -> Result<T, StorageError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound {
                    key: key.to_string(),
                })
            }
            Err(err) => return Err(err.into()),
        };
        Ok(serde_json::from_str(&contents)?)
    }

    fn json_files(&self, dir: &str) -> Result<Vec<PathBuf>, StorageError> {
        let dir = self.root.join(dir);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

impl ProfileRepository for JsonFileRepository {
    fn load_calibration(&self, setting_name: &str) -> Result<CalibrationTable, StorageError> {
        Self::read_json(&self.calibration_path(setting_name), setting_name)
    }

    fn save_calibration(&self, table: &CalibrationTable) -> Result<(), StorageError> {
        Self::write_json(&self.calibration_path(&table.setting_name), table)
    }

    fn delete_calibration(&self, setting_name: &str) -> Result<(), StorageError> {
        let path = self.calibration_path(setting_name);
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!("[JsonFileRepository] Removed {:?}", path);
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Err(StorageError::NotFound {
                key: setting_name.to_string(),
            }),
            Err(err) => Err(err.into()),
        }
    }

    fn list_calibrations(&self) -> Result<Vec<String>, StorageError> {
        let mut names = Vec::new();
        for path in self.json_files(CALIBRATION_DIR)? {
            let table: CalibrationTable = Self::read_json(&path, &path.display().to_string())?;
            names.push(table.setting_name);
        }
        names.sort();
        Ok(names)
    }

    fn save_test_result(&self, record: &TestResultRecord) -> Result<(), StorageError> {
        Self::write_json(&self.result_path(record.test_id()), record)
    }

    fn load_test_result(&self, test_id: u64) -> Result<TestResultRecord, StorageError> {
        Self::read_json(&self.result_path(test_id), &test_id.to_string())
    }

    fn load_test_results(&self) -> Result<Vec<TestResultRecord>, StorageError> {
        let mut records = Vec::new();
        for path in self.json_files(RESULTS_DIR)? {
            records.push(Self::read_json::<TestResultRecord>(
                &path,
                &path.display().to_string(),
            )?);
        }
        records.sort_by_key(|r| r.test_id());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audiometry::{Ear, FrequencyResult, RecordHeader, TestType};

    fn record(test_id: u64) -> TestResultRecord {
        TestResultRecord {
            header: RecordHeader {
                test_id,
                group: "clinic".to_string(),
                patient_name: "P-7".to_string(),
            },
            test_type: TestType::Mcl,
            results: vec![FrequencyResult {
                frequency_hz: 2_000.0,
                ear: Ear::Left,
                final_level: 62.5,
                level_history: vec![50.0, 55.0, 60.0, 62.5, 62.5],
            }],
        }
    }

    #[test]
    fn test_calibration_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let table = CalibrationTable::er3a_default("Booth A/left");
        JsonFileRepository::new(dir.path())
            .save_calibration(&table)
            .unwrap();

        let reopened = JsonFileRepository::new(dir.path());
        assert_eq!(reopened.load_calibration("Booth A/left").unwrap(), table);
        assert_eq!(
            reopened.list_calibrations().unwrap(),
            vec!["Booth A/left".to_string()]
        );
        assert!(dir.path().join("calibrations/Booth_A_left.json").exists());
    }

    #[test]
    fn test_deleted_calibration_is_gone_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonFileRepository::new(dir.path());
        repo.save_calibration(&CalibrationTable::er3a_default("Booth A"))
            .unwrap();
        repo.save_calibration(&CalibrationTable::er3a_default("Booth B"))
            .unwrap();

        repo.delete_calibration("Booth A").unwrap();
        let reopened = JsonFileRepository::new(dir.path());
        assert_eq!(reopened.list_calibrations().unwrap(), vec!["Booth B".to_string()]);
        assert!(!dir.path().join("calibrations/Booth_A.json").exists());
        assert!(matches!(
            reopened.delete_calibration("Booth A"),
            Err(StorageError::NotFound { .. })
        ));
    }

    #[test]
    fn test_results_load_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonFileRepository::new(dir.path());
        repo.save_test_result(&record(200)).unwrap();
        repo.save_test_result(&record(100)).unwrap();

        let records = repo.load_test_results().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].test_id(), 100);
        assert_eq!(records[1], record(200));
    }

    #[test]
    fn test_missing_entries() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonFileRepository::new(dir.path());
        assert!(repo.load_test_results().unwrap().is_empty());
        assert!(matches!(
            repo.load_test_result(1),
            Err(StorageError::NotFound { .. })
        ));
        assert!(matches!(
            repo.load_calibration("none"),
            Err(StorageError::NotFound { .. })
        ));
    }

    #[test]
    fn test_corrupt_file_is_a_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonFileRepository::new(dir.path());
        fs::create_dir_all(dir.path().join(RESULTS_DIR)).unwrap();
        fs::write(dir.path().join("results/5.json"), "{ not json").unwrap();
        assert!(matches!(
            repo.load_test_result(5),
            Err(StorageError::Serialization { .. })
        ));
    }
}
