// Public API for flutter_rust_bridge integration
// These functions are the control surface the UI and native layers call

#![allow(dead_code)] // FFI functions are called from Dart, not detected by Rust analyzer

use anyhow::Result;
use once_cell::sync::Lazy;

use crate::audiometry::{
    ComfortOutcome, ComfortResponse, RecordHeader, SessionEvent, StaircaseOutcome,
    ThresholdResponse, Trial,
};
use crate::calibration::CalibrationTable;
use crate::config::TestOptions;
use crate::context::AppContext;
use crate::error::{
    log_audio_error, AudioError, CalibrationError, ErrorCode, ProcedureError, StorageError,
};
use crate::fitting::EarSelection;
use crate::managers::{SessionStatus, ToggleOutcome};

mod streams;
mod types;

pub use streams::{pipeline_stats_stream, session_notice_stream, tone_command_stream};
pub use types::ActiveParams;

// Re-export error code constants for FFI exposure
pub use crate::error::{AudioErrorCodes, CalibrationErrorCodes, ProcedureErrorCodes, StorageErrorCodes};

/// Process-wide context, built on first use
static APP_CONTEXT: Lazy<AppContext> = Lazy::new(AppContext::for_platform);

/// Get the version of the native library
#[flutter_rust_bridge::frb(sync)]
pub fn get_version() -> Result<String> {
    Ok(env!("CARGO_PKG_VERSION").to_string())
}

// ============================================================================
// AUDIO PIPELINE
// ============================================================================

/// Start capture, processing and playback
///
/// # Returns
/// 0 on success, otherwise one of the [`AudioErrorCodes`]
#[flutter_rust_bridge::frb]
pub fn start_audio_processing() -> i32 {
    match APP_CONTEXT.pipeline().start() {
        Ok(()) => 0,
        Err(err) => err.code(),
    }
}

/// Stop streaming and release the devices; safe when already stopped
#[flutter_rust_bridge::frb]
pub fn stop_audio_processing() -> Result<(), AudioError> {
    APP_CONTEXT.pipeline().stop()
}

/// Start when stopped, stop when running
///
/// Calls within 500 ms of the previous toggle are ignored.
#[flutter_rust_bridge::frb]
pub fn toggle_audio_processing() -> Result<ToggleOutcome, AudioError> {
    APP_CONTEXT.pipeline().toggle()
}

#[flutter_rust_bridge::frb(sync)]
pub fn is_audio_processing() -> bool {
    APP_CONTEXT.pipeline().is_running()
}

/// Report the platform microphone permission state
///
/// `start_audio_processing` fails with `PERMISSION_DENIED` until this is
/// called with `true` on platforms that gate microphone access.
#[flutter_rust_bridge::frb(sync)]
pub fn set_microphone_permission(granted: bool) {
    APP_CONTEXT.pipeline().set_permission_granted(granted);
}

/// Install per-band compressor parameters
///
/// All five arrays must have one entry per band. On error the previous
/// parameters stay active.
#[flutter_rust_bridge::frb]
pub fn update_audio_params(
    threshold_db: Vec<f32>,
    ratio: Vec<f32>,
    attack_seconds: Vec<f32>,
    release_seconds: Vec<f32>,
    gain_db: Vec<f32>,
) -> Result<(), AudioError> {
    APP_CONTEXT.pipeline().update_params_from_arrays(
        &threshold_db,
        &ratio,
        &attack_seconds,
        &release_seconds,
        &gain_db,
    )
}

/// Replace band compression with one global multiplier
#[flutter_rust_bridge::frb]
pub fn set_amplification(factor: f32) -> Result<(), AudioError> {
    APP_CONTEXT.pipeline().set_amplification(factor)
}

/// Parameters the audio thread is using right now
#[flutter_rust_bridge::frb]
pub fn get_active_params() -> Result<ActiveParams, AudioError> {
    let params = APP_CONTEXT.pipeline().active_params()?;
    Ok(ActiveParams::from(params.as_ref()))
}

// ============================================================================
// CALIBRATION PROFILES
// ============================================================================

#[flutter_rust_bridge::frb]
pub fn save_calibration(table: CalibrationTable) -> Result<()> {
    APP_CONTEXT.save_calibration(&table)
}

#[flutter_rust_bridge::frb]
pub fn load_calibration(setting_name: String) -> Result<CalibrationTable, StorageError> {
    APP_CONTEXT.load_calibration(&setting_name)
}

#[flutter_rust_bridge::frb]
pub fn list_calibrations() -> Result<Vec<String>, StorageError> {
    APP_CONTEXT.repository().list_calibrations()
}

#[flutter_rust_bridge::frb]
pub fn delete_calibration(setting_name: String) -> Result<(), StorageError> {
    APP_CONTEXT.delete_calibration(&setting_name)
}

/// Loop one row's frequency on both ears at its corrected level
///
/// `table` is the profile as currently edited; it need not be saved.
#[flutter_rust_bridge::frb]
pub fn play_calibration_tone(
    table: CalibrationTable,
    freq_index: usize,
) -> Result<(), CalibrationError> {
    APP_CONTEXT.play_calibration_tone(&table, freq_index).map(|_| ())
}

#[flutter_rust_bridge::frb]
pub fn stop_calibration_tone() {
    APP_CONTEXT.stop_calibration_tone();
}

/// ER-3A reference table, the starting point for a new profile
#[flutter_rust_bridge::frb(sync)]
pub fn default_calibration(setting_name: String) -> CalibrationTable {
    CalibrationTable::er3a_default(setting_name)
}

// ============================================================================
// TEST SESSIONS
// ============================================================================

/// Start a threshold test, replacing any active session
///
/// `options` picks this test's frequencies, ear order and presentation
/// mode; unset fields keep the configured defaults.
#[flutter_rust_bridge::frb]
pub fn start_threshold_test(
    setting_name: String,
    group: String,
    patient_name: String,
    options: TestOptions,
) -> Result<(), ProcedureError> {
    APP_CONTEXT.sessions().start_threshold(
        &setting_name,
        RecordHeader::now(group, patient_name),
        &options,
    )
}

/// Start an MCL test, replacing any active session
#[flutter_rust_bridge::frb]
pub fn start_comfort_test(
    setting_name: String,
    group: String,
    patient_name: String,
    options: TestOptions,
) -> Result<(), ProcedureError> {
    APP_CONTEXT.sessions().start_comfort(
        &setting_name,
        RecordHeader::now(group, patient_name),
        &options,
    )
}

/// Start presenting the next trial
#[flutter_rust_bridge::frb]
pub fn begin_trial() -> Result<Trial, ProcedureError> {
    APP_CONTEXT.sessions().begin_trial()
}

/// Present the pending trial again
#[flutter_rust_bridge::frb]
pub fn repeat_trial() -> Result<Trial, ProcedureError> {
    APP_CONTEXT.sessions().repeat_trial()
}

/// Fire due presentation events; call on a UI timer
#[flutter_rust_bridge::frb]
pub fn pump_test_session() -> Result<Vec<SessionEvent>, ProcedureError> {
    APP_CONTEXT.sessions().pump()
}

#[flutter_rust_bridge::frb]
pub fn submit_threshold_response(
    response: ThresholdResponse,
) -> Result<StaircaseOutcome, ProcedureError> {
    APP_CONTEXT.sessions().submit_threshold_response(response)
}

#[flutter_rust_bridge::frb]
pub fn submit_comfort_response(response: ComfortResponse) -> Result<ComfortOutcome, ProcedureError> {
    APP_CONTEXT.sessions().submit_comfort_response(response)
}

/// Pause the active test; a running presentation stops
#[flutter_rust_bridge::frb]
pub fn pause_test() -> Result<(), ProcedureError> {
    APP_CONTEXT.sessions().pause()
}

/// Resume a paused test, presenting an interrupted trial again
#[flutter_rust_bridge::frb]
pub fn resume_test() -> Result<Option<Trial>, ProcedureError> {
    APP_CONTEXT.sessions().resume()
}

/// Cancel the active test; nothing plays afterwards
#[flutter_rust_bridge::frb]
pub fn cancel_test() {
    APP_CONTEXT.sessions().cancel();
}

#[flutter_rust_bridge::frb(sync)]
pub fn test_session_status() -> Option<SessionStatus> {
    APP_CONTEXT.sessions().status()
}

// ============================================================================
// FITTING
// ============================================================================

/// Derive band parameters from stored results and install them
///
/// # Arguments
/// * `patient_name` - records of this patient only; empty uses every record
#[flutter_rust_bridge::frb]
pub fn apply_fitting(patient_name: String) -> Result<ActiveParams, AudioError> {
    let patient = (!patient_name.is_empty()).then_some(patient_name.as_str());
    let params = APP_CONTEXT
        .apply_fitting(patient, EarSelection::Combined)
        .map_err(|err| {
            log_audio_error(&err, "apply_fitting");
            err
        })?;
    Ok(ActiveParams::from_compressor(&params))
}

/// Cancel the active test and stop the pipeline
#[flutter_rust_bridge::frb]
pub fn shutdown() {
    APP_CONTEXT.shutdown();
}
