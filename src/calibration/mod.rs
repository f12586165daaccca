// Calibration module - SPL correction tables and amplitude conversion
//
// This module provides two main components:
// 1. CalibrationTable: expected vs. measured SPL per test frequency
// 2. SplCalibrator: desired-SPL table plus the dB SPL -> amplitude bridge
//
// The calibration flow:
// 1. An external workflow measures each test tone on each ear
// 2. The resulting CalibrationTable is stored under a setting name
// 3. Test sessions build an SplCalibrator from it to render calibrated tones
//
// While measuring, a CalibrationTone loops each row's frequency on both ears
// at the row's desired SPL.

pub mod spl;
pub mod state;
pub mod tone;

pub use spl::{amplitude, SplCalibrator, DEFAULT_HL_REFERENCE_DB, DEFAULT_REFERENCE_DB_SPL};
pub use state::{CalibrationEntry, CalibrationTable, ER3A_EXPECTED_SPL, TEST_FREQUENCIES_HZ};
pub use tone::{CalibrationTone, CALIBRATION_TONE_MS};
