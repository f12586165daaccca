// AppContext: Dependency Injection Container
// Centralizes all state behind the control surface for testability

use std::sync::Arc;

use anyhow::Result;

use crate::audio::{platform_backend, AudioBackend};
use crate::audiometry::TestResultRecord;
use crate::calibration::{CalibrationTable, CalibrationTone, SplCalibrator};
use crate::config::AppConfig;
use crate::dsp::CompressorParams;
use crate::error::{
    log_audio_error, log_calibration_error, log_storage_error, AudioError, CalibrationError,
    StorageError,
};
use crate::fitting::{BandParameterDeriver, EarSelection};
use crate::managers::{BroadcastChannelManager, PipelineManager, TestSessionManager};
use crate::scheduler::{SystemTimeSource, TimeSource};
use crate::storage::{load_test_results_or_log, ProfileRepository};

/// Everything the api functions operate on
///
/// Built once for the process by the api layer, or directly in tests with a
/// stub backend, an in-memory repository and a manual clock.
pub struct AppContext {
    config: AppConfig,
    pipeline: PipelineManager,
    sessions: TestSessionManager,
    broadcasts: Arc<BroadcastChannelManager>,
    repository: Arc<dyn ProfileRepository>,
    deriver: BandParameterDeriver,
}

impl AppContext {
    pub fn new(
        config: AppConfig,
        backend: Arc<dyn AudioBackend>,
        repository: Arc<dyn ProfileRepository>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        let deriver = BandParameterDeriver::new(&config.fitting).unwrap_or_else(|err| {
            log_audio_error(&err, "fitting_config");
            tracing::warn!("[AppContext] Invalid fitting bands, using defaults");
            BandParameterDeriver::default()
        });
        let broadcasts = Arc::new(BroadcastChannelManager::new());

        Self {
            pipeline: PipelineManager::new(
                backend,
                config.audio.clone(),
                deriver.crossover_points(),
                Arc::clone(&clock),
            ),
            sessions: TestSessionManager::new(
                Arc::clone(&repository),
                Arc::clone(&broadcasts),
                clock,
                config.procedure.clone(),
                config.audio.sample_rate,
            ),
            broadcasts,
            repository,
            deriver,
            config,
        }
    }

    /// Context for the running platform: device backend, on-disk store
    /// (in-memory on Android) and the system clock
    pub fn for_platform() -> Self {
        #[cfg(target_os = "android")]
        let (config, repository): (AppConfig, Arc<dyn ProfileRepository>) = (
            AppConfig::load_android(),
            Arc::new(crate::storage::MemoryRepository::new()),
        );
        #[cfg(not(target_os = "android"))]
        let (config, repository): (AppConfig, Arc<dyn ProfileRepository>) = {
            let config = AppConfig::load();
            let repository = Arc::new(crate::storage::JsonFileRepository::new(
                config.storage.root.clone(),
            ));
            (config, repository)
        };

        Self::new(
            config,
            platform_backend(),
            repository,
            Arc::new(SystemTimeSource::default()),
        )
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &PipelineManager {
        &self.pipeline
    }

    pub fn sessions(&self) -> &TestSessionManager {
        &self.sessions
    }

    pub fn broadcasts(&self) -> &BroadcastChannelManager {
        &self.broadcasts
    }

    pub fn repository(&self) -> &dyn ProfileRepository {
        self.repository.as_ref()
    }

    /// Validate and store a calibration profile
    pub fn save_calibration(&self, table: &CalibrationTable) -> Result<()> {
        if let Err(err) = table.validate() {
            log_calibration_error(&err, "save_calibration");
            return Err(err.into());
        }
        self.repository.save_calibration(table)?;
        tracing::info!("[AppContext] Saved calibration '{}'", table.setting_name);
        Ok(())
    }

    pub fn load_calibration(&self, setting_name: &str) -> Result<CalibrationTable, StorageError> {
        self.repository.load_calibration(setting_name)
    }

    /// Remove a stored profile
    pub fn delete_calibration(&self, setting_name: &str) -> Result<(), StorageError> {
        self.repository.delete_calibration(setting_name).map_err(|err| {
            log_storage_error(&err, "delete_calibration");
            err
        })?;
        tracing::info!("[AppContext] Deleted calibration '{}'", setting_name);
        Ok(())
    }

    /// Loop row `freq_index` of `table` on both ears at its desired SPL
    ///
    /// `table` is the profile being edited, so the clinician can check the
    /// corrected levels before saving. Starting another tone replaces the
    /// current one on the presentation layer.
    pub fn play_calibration_tone(
        &self,
        table: &CalibrationTable,
        freq_index: usize,
    ) -> Result<CalibrationTone, CalibrationError> {
        let tone = SplCalibrator::new(table)
            .and_then(|calibrator| {
                CalibrationTone::render(&calibrator, freq_index, self.config.audio.sample_rate)
            })
            .map_err(|err| {
                log_calibration_error(&err, "play_calibration_tone");
                err
            })?;
        self.broadcasts.loop_calibration_tone(&tone);
        tracing::info!(
            "[AppContext] Calibration tone {} Hz (L {:.4}, R {:.4})",
            tone.frequency_hz,
            tone.left_amplitude,
            tone.right_amplitude
        );
        Ok(tone)
    }

    pub fn stop_calibration_tone(&self) {
        self.broadcasts.stop_tone();
    }

    /// Stored records for one patient, or all records for `None`
    pub fn records_for(&self, patient_name: Option<&str>) -> Vec<TestResultRecord> {
        load_test_results_or_log(self.repository.as_ref())
            .into_iter()
            .filter(|r| patient_name.map_or(true, |name| r.header.patient_name == name))
            .collect()
    }

    /// Derive band parameters from stored records and install them
    pub fn apply_fitting(
        &self,
        patient_name: Option<&str>,
        ear_selection: EarSelection,
    ) -> Result<CompressorParams, AudioError> {
        let records = self.records_for(patient_name);
        let params = self
            .deriver
            .clone()
            .with_ear_selection(ear_selection)
            .derive(&records);
        self.pipeline.update_params(params.clone())?;
        tracing::info!(
            "[AppContext] Fitting applied from {} record(s): gains {:?}",
            records.len(),
            params.gain_db()
        );
        Ok(params)
    }

    /// Stop everything that holds a device or a timer
    pub fn shutdown(&self) {
        self.sessions.cancel();
        if let Err(err) = self.pipeline.stop() {
            log_audio_error(&err, "shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::StubBackend;
    use crate::audiometry::{Ear, FrequencyResult, RecordHeader, TestType};
    use crate::managers::ToneCommand;
    use crate::scheduler::ManualClock;
    use crate::storage::MemoryRepository;

    fn context() -> (AppContext, Arc<MemoryRepository>) {
        let repository = Arc::new(MemoryRepository::new());
        let context = AppContext::new(
            AppConfig::default(),
            Arc::new(StubBackend::new()),
            repository.clone(),
            Arc::new(ManualClock::new()),
        );
        (context, repository)
    }

    fn record(test_id: u64, patient: &str, test_type: TestType, level: f32) -> TestResultRecord {
        TestResultRecord {
            header: RecordHeader {
                test_id,
                group: "clinic".to_string(),
                patient_name: patient.to_string(),
            },
            test_type,
            results: vec![FrequencyResult {
                frequency_hz: 500.0,
                ear: Ear::Left,
                final_level: level,
                level_history: vec![level],
            }],
        }
    }

    #[test]
    fn test_apply_fitting_installs_derived_params() {
        let (context, repository) = context();
        repository
            .save_test_result(&record(1, "ann", TestType::Threshold, 30.0))
            .unwrap();
        repository
            .save_test_result(&record(2, "ann", TestType::Mcl, 65.0))
            .unwrap();
        repository
            .save_test_result(&record(3, "bob", TestType::Threshold, 60.0))
            .unwrap();

        let params = context
            .apply_fitting(Some("ann"), EarSelection::Combined)
            .unwrap();
        assert_eq!(params.bands[0].threshold_db, 30.0);
        assert_eq!(params.bands[0].gain_db, 35.0);

        let active = context.pipeline().active_params().unwrap();
        assert_eq!(active.compressor().unwrap(), &params);
    }

    #[test]
    fn test_records_for_filters_by_patient() {
        let (context, repository) = context();
        repository
            .save_test_result(&record(1, "ann", TestType::Threshold, 30.0))
            .unwrap();
        repository
            .save_test_result(&record(2, "bob", TestType::Threshold, 40.0))
            .unwrap();
        assert_eq!(context.records_for(Some("bob")).len(), 1);
        assert_eq!(context.records_for(None).len(), 2);
    }

    #[test]
    fn test_save_calibration_validates() {
        let (context, _) = context();
        let mut table = CalibrationTable::er3a_default("booth");
        context.save_calibration(&table).unwrap();
        assert_eq!(context.load_calibration("booth").unwrap(), table);

        table.entries.clear();
        assert!(context.save_calibration(&table).is_err());
    }

    #[test]
    fn test_delete_calibration() {
        let (context, _) = context();
        context
            .save_calibration(&CalibrationTable::er3a_default("booth"))
            .unwrap();
        context.delete_calibration("booth").unwrap();
        assert!(matches!(
            context.load_calibration("booth"),
            Err(StorageError::NotFound { .. })
        ));
        assert!(context.delete_calibration("booth").is_err());
    }

    #[test]
    fn test_calibration_tone_loops_until_stopped() {
        let (context, _) = context();
        let mut tones = context.broadcasts().subscribe_tones();
        let table = CalibrationTable::er3a_default("booth");

        let tone = context.play_calibration_tone(&table, 4).unwrap();
        assert_eq!(tone.frequency_hz, table.entries[4].frequency_hz);
        match tones.try_recv().unwrap() {
            ToneCommand::Loop {
                frequency_hz,
                left_amplitude,
                samples,
                ..
            } => {
                assert_eq!(frequency_hz, tone.frequency_hz);
                assert_eq!(left_amplitude, tone.left_amplitude);
                assert_eq!(samples.len(), tone.samples().len());
            }
            other => panic!("expected a looping tone, got {:?}", other),
        }

        context.stop_calibration_tone();
        assert_eq!(tones.try_recv().unwrap(), ToneCommand::Stop);

        assert_eq!(
            context.play_calibration_tone(&table, 10),
            Err(CalibrationError::FrequencyIndexOutOfRange { index: 10, len: 10 })
        );
        assert!(tones.try_recv().is_err());
    }
}
