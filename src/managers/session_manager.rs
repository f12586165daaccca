// TestSessionManager: owns the one active threshold or MCL session
//
// Single Responsibility: test session lifecycle and result persistence.
// Completed records are saved through the repository; a failed save is
// logged and the record is still returned to the caller.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;

use super::broadcast_manager::{BroadcastChannelManager, BroadcastToneSink, SessionNotice};
use crate::audiometry::{
    ComfortLevelProcedure, ComfortOutcome, ComfortResponse, RecordHeader, SessionEvent,
    StaircaseOutcome, StaircaseThresholdProcedure, TestResultRecord, TestType, ThresholdResponse,
    Trial, TrialSession,
};
use crate::calibration::{CalibrationTable, SplCalibrator, DEFAULT_REFERENCE_DB_SPL};
use crate::config::{ProcedureConfig, TestOptions};
use crate::error::{log_procedure_error, ErrorCode, ProcedureError, StorageError};
use crate::scheduler::TimeSource;
use crate::storage::{save_test_result_or_log, ProfileRepository};

type ThresholdSession = TrialSession<StaircaseThresholdProcedure, BroadcastToneSink>;
type ComfortSession = TrialSession<ComfortLevelProcedure, BroadcastToneSink>;

enum ActiveTest {
    Threshold(ThresholdSession),
    Comfort(ComfortSession),
}

impl ActiveTest {
    fn test_type(&self) -> TestType {
        match self {
            ActiveTest::Threshold(_) => TestType::Threshold,
            ActiveTest::Comfort(_) => TestType::Mcl,
        }
    }

    fn begin_trial(&mut self) -> Result<Trial, ProcedureError> {
        match self {
            ActiveTest::Threshold(s) => s.begin_trial(),
            ActiveTest::Comfort(s) => s.begin_trial(),
        }
    }

    fn repeat_trial(&mut self) -> Result<Trial, ProcedureError> {
        match self {
            ActiveTest::Threshold(s) => s.repeat_trial(),
            ActiveTest::Comfort(s) => s.repeat_trial(),
        }
    }

    fn pump(&mut self) -> Vec<SessionEvent> {
        match self {
            ActiveTest::Threshold(s) => s.pump(),
            ActiveTest::Comfort(s) => s.pump(),
        }
    }

    fn pause(&mut self) -> Result<(), ProcedureError> {
        match self {
            ActiveTest::Threshold(s) => s.pause(),
            ActiveTest::Comfort(s) => s.pause(),
        }
    }

    fn resume(&mut self) -> Result<Option<Trial>, ProcedureError> {
        match self {
            ActiveTest::Threshold(s) => s.resume(),
            ActiveTest::Comfort(s) => s.resume(),
        }
    }

    fn cancel(&mut self) {
        match self {
            ActiveTest::Threshold(s) => s.cancel(),
            ActiveTest::Comfort(s) => s.cancel(),
        }
    }

    fn status(&self) -> SessionStatus {
        match self {
            ActiveTest::Threshold(s) => SessionStatus {
                test_type: TestType::Threshold,
                in_progress: s.in_progress(),
                paused: s.is_paused(),
                complete: s.is_complete(),
                progress: s.procedure().progress(),
                next_event_in: s.time_until_next(),
            },
            ActiveTest::Comfort(s) => SessionStatus {
                test_type: TestType::Mcl,
                in_progress: s.in_progress(),
                paused: s.is_paused(),
                complete: s.is_complete(),
                progress: s.procedure().progress(),
                next_event_in: s.time_until_next(),
            },
        }
    }
}

/// Snapshot of the active session for polling callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub test_type: TestType,
    pub in_progress: bool,
    pub paused: bool,
    pub complete: bool,
    /// Fraction of frequency/ear pairs finished, 0.0..=1.0
    pub progress: f32,
    pub next_event_in: Option<Duration>,
}

pub struct TestSessionManager {
    active: Arc<Mutex<Option<ActiveTest>>>,
    repository: Arc<dyn ProfileRepository>,
    broadcasts: Arc<BroadcastChannelManager>,
    clock: Arc<dyn TimeSource>,
    config: ProcedureConfig,
    sample_rate: u32,
}

impl TestSessionManager {
    pub fn new(
        repository: Arc<dyn ProfileRepository>,
        broadcasts: Arc<BroadcastChannelManager>,
        clock: Arc<dyn TimeSource>,
        config: ProcedureConfig,
        sample_rate: u32,
    ) -> Self {
        Self {
            active: Arc::new(Mutex::new(None)),
            repository,
            broadcasts,
            clock,
            config,
            sample_rate,
        }
    }

    /// A panicking holder leaves the session in a consistent state between
    /// calls, so the guard is recovered rather than surfaced
    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveTest>> {
        self.active.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("[TestSessionManager] Session lock was poisoned, recovering");
            PoisonError::into_inner(poisoned)
        })
    }

    /// Calibration profile by name, or ER-3A defaults when none is stored
    ///
    /// A stored profile that cannot be read is an error; testing at
    /// uncalibrated levels would go unnoticed.
    fn calibrator(&self, setting_name: &str) -> Result<SplCalibrator, ProcedureError> {
        let table = match self.repository.load_calibration(setting_name) {
            Ok(table) => table,
            Err(StorageError::NotFound { .. }) => {
                tracing::warn!(
                    "[TestSessionManager] No calibration '{}', using ER-3A defaults",
                    setting_name
                );
                CalibrationTable::er3a_default(setting_name)
            }
            Err(err) => {
                crate::error::log_storage_error(&err, "load_calibration");
                return Err(ProcedureError::InvalidConfiguration {
                    reason: format!(
                        "calibration '{}' unreadable: {}",
                        setting_name,
                        err.message()
                    ),
                });
            }
        };

        SplCalibrator::new(&table)
            .map(|c| c.with_references(DEFAULT_REFERENCE_DB_SPL, self.config.hl_reference_db))
            .map_err(|err| ProcedureError::InvalidConfiguration {
                reason: err.to_string(),
            })
    }

    fn install(&self, test: ActiveTest) {
        let test_type = test.test_type();
        let mut guard = self.lock_active();
        if let Some(previous) = guard.as_mut() {
            previous.cancel();
        }
        *guard = Some(test);
        tracing::info!("[TestSessionManager] {} test started", test_type.as_str());
        self.broadcasts.notify(SessionNotice::Started {
            test_type: test_type.as_str().to_string(),
        });
    }

    /// Replace any active session with a new threshold test
    pub fn start_threshold(
        &self,
        setting_name: &str,
        header: RecordHeader,
        options: &TestOptions,
    ) -> Result<(), ProcedureError> {
        let calibrator = self.calibrator(setting_name)?;
        let config = self.config.with_options(options);
        let procedure = StaircaseThresholdProcedure::new(&config, header).map_err(|err| {
            log_procedure_error(&err, "start_threshold");
            err
        })?;
        self.install(ActiveTest::Threshold(TrialSession::new(
            procedure,
            self.broadcasts.tone_sink(),
            calibrator,
            Arc::clone(&self.clock),
            self.sample_rate,
        )));
        Ok(())
    }

    /// Replace any active session with a new MCL test
    ///
    /// The MCL test always uses single tones, so only the frequency list and
    /// ear order of `options` apply.
    pub fn start_comfort(
        &self,
        setting_name: &str,
        header: RecordHeader,
        options: &TestOptions,
    ) -> Result<(), ProcedureError> {
        let calibrator = self.calibrator(setting_name)?;
        let config = self.config.with_options(options);
        let procedure = ComfortLevelProcedure::new(&config, header).map_err(|err| {
            log_procedure_error(&err, "start_comfort");
            err
        })?;
        self.install(ActiveTest::Comfort(TrialSession::new(
            procedure,
            self.broadcasts.tone_sink(),
            calibrator,
            Arc::clone(&self.clock),
            self.sample_rate,
        )));
        Ok(())
    }

    fn with_active<T>(
        &self,
        context: &str,
        f: impl FnOnce(&mut ActiveTest) -> Result<T, ProcedureError>,
    ) -> Result<T, ProcedureError> {
        let mut guard = self.lock_active();
        let result = match guard.as_mut() {
            Some(active) => f(active),
            None => Err(ProcedureError::NoActiveSession),
        };
        if let Err(err) = &result {
            log_procedure_error(err, context);
        }
        result
    }

    pub fn begin_trial(&self) -> Result<Trial, ProcedureError> {
        self.with_active("begin_trial", ActiveTest::begin_trial)
    }

    pub fn repeat_trial(&self) -> Result<Trial, ProcedureError> {
        self.with_active("repeat_trial", ActiveTest::repeat_trial)
    }

    /// Fire due presentation events
    pub fn pump(&self) -> Result<Vec<SessionEvent>, ProcedureError> {
        let events = self.with_active("pump", |active| Ok(active.pump()))?;
        if events.contains(&SessionEvent::PresentationComplete) {
            self.broadcasts.notify(SessionNotice::PresentationComplete);
        }
        Ok(events)
    }

    /// Pause the active test, cutting short any running presentation
    pub fn pause(&self) -> Result<(), ProcedureError> {
        self.with_active("pause", ActiveTest::pause)?;
        self.broadcasts.notify(SessionNotice::Paused);
        Ok(())
    }

    /// Resume the active test; returns the trial presented again, if any
    pub fn resume(&self) -> Result<Option<Trial>, ProcedureError> {
        let replayed = self.with_active("resume", ActiveTest::resume)?;
        self.broadcasts.notify(SessionNotice::Resumed);
        Ok(replayed)
    }

    pub fn submit_threshold_response(
        &self,
        response: ThresholdResponse,
    ) -> Result<StaircaseOutcome, ProcedureError> {
        let outcome = self.with_active("submit_threshold_response", |active| match active {
            ActiveTest::Threshold(session) => session.respond(response),
            ActiveTest::Comfort(_) => Err(ProcedureError::InvalidConfiguration {
                reason: "the active session is an MCL test".to_string(),
            }),
        })?;

        match &outcome {
            StaircaseOutcome::Terminated {
                point,
                threshold_db_hl,
                ..
            } => self.broadcasts.notify(SessionNotice::PairFinished {
                frequency_hz: point.frequency_hz,
                ear: point.ear,
                level_db_hl: *threshold_db_hl as f32,
            }),
            StaircaseOutcome::Completed {
                point,
                threshold_db_hl,
                record,
            } => {
                self.broadcasts.notify(SessionNotice::PairFinished {
                    frequency_hz: point.frequency_hz,
                    ear: point.ear,
                    level_db_hl: *threshold_db_hl as f32,
                });
                self.finish(record);
            }
            _ => {}
        }
        Ok(outcome)
    }

    pub fn submit_comfort_response(
        &self,
        response: ComfortResponse,
    ) -> Result<ComfortOutcome, ProcedureError> {
        let outcome = self.with_active("submit_comfort_response", |active| match active {
            ActiveTest::Comfort(session) => session.respond(response),
            ActiveTest::Threshold(_) => Err(ProcedureError::InvalidConfiguration {
                reason: "the active session is a threshold test".to_string(),
            }),
        })?;

        match &outcome {
            ComfortOutcome::Finalized {
                point, mcl_db_hl, ..
            } => self.broadcasts.notify(SessionNotice::PairFinished {
                frequency_hz: point.frequency_hz,
                ear: point.ear,
                level_db_hl: *mcl_db_hl,
            }),
            ComfortOutcome::Completed {
                point,
                mcl_db_hl,
                record,
            } => {
                self.broadcasts.notify(SessionNotice::PairFinished {
                    frequency_hz: point.frequency_hz,
                    ear: point.ear,
                    level_db_hl: *mcl_db_hl,
                });
                self.finish(record);
            }
            _ => {}
        }
        Ok(outcome)
    }

    fn finish(&self, record: &TestResultRecord) {
        let saved = save_test_result_or_log(self.repository.as_ref(), record);
        self.broadcasts.notify(SessionNotice::Completed {
            test_id: record.test_id(),
            saved,
        });
    }

    /// Cancel and drop the active session; a no-op without one
    pub fn cancel(&self) {
        let mut guard = self.lock_active();
        if let Some(mut active) = guard.take() {
            active.cancel();
            self.broadcasts.notify(SessionNotice::Cancelled);
        }
    }

    pub fn status(&self) -> Option<SessionStatus> {
        self.lock_active().as_ref().map(ActiveTest::status)
    }
}
