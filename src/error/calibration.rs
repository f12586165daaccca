// SPL calibration error types and constants

use crate::error::ErrorCode;
use flutter_rust_bridge::frb;
use log::error;
use std::fmt;

/// Calibration error code constants exposed via FFI
///
/// Error code range: 2001-2003
#[frb(unignore)]
pub struct CalibrationErrorCodes {}

#[frb]
impl CalibrationErrorCodes {
    /// No calibration entries were supplied
    pub const EMPTY_TABLE: i32 = 2001;

    /// Requested test frequency index is not in the table
    pub const FREQUENCY_INDEX_OUT_OF_RANGE: i32 = 2002;

    /// An expected or measured SPL value was NaN or infinite
    pub const NON_FINITE_LEVEL: i32 = 2003;

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn empty_table() -> i32 {
        Self::EMPTY_TABLE
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn frequency_index_out_of_range() -> i32 {
        Self::FREQUENCY_INDEX_OUT_OF_RANGE
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn non_finite_level() -> i32 {
        Self::NON_FINITE_LEVEL
    }
}

/// Log a calibration error with structured context
pub fn log_calibration_error(err: &CalibrationError, context: &str) {
    error!(
        "Calibration error in {}: code={}, component=SplCalibrator, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// SPL calibration errors
///
/// Error code ranges: 2001-2003
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// No calibration entries were supplied
    EmptyTable,

    /// Requested test frequency index is not in the table
    FrequencyIndexOutOfRange { index: usize, len: usize },

    /// An expected or measured SPL value was NaN or infinite
    NonFiniteLevel { frequency_hz: f32 },
}

impl ErrorCode for CalibrationError {
    fn code(&self) -> i32 {
        match self {
            CalibrationError::EmptyTable => CalibrationErrorCodes::EMPTY_TABLE,
            CalibrationError::FrequencyIndexOutOfRange { .. } => {
                CalibrationErrorCodes::FREQUENCY_INDEX_OUT_OF_RANGE
            }
            CalibrationError::NonFiniteLevel { .. } => CalibrationErrorCodes::NON_FINITE_LEVEL,
        }
    }

    fn message(&self) -> String {
        match self {
            CalibrationError::EmptyTable => {
                "Calibration table is empty. Load or enter calibration levels first.".to_string()
            }
            CalibrationError::FrequencyIndexOutOfRange { index, len } => {
                format!(
                    "Frequency index {} out of range (table has {} entries)",
                    index, len
                )
            }
            CalibrationError::NonFiniteLevel { frequency_hz } => {
                format!("Calibration level at {} Hz is not a finite number", frequency_hz)
            }
        }
    }
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CalibrationError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for CalibrationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calibration_error_codes() {
        assert_eq!(
            CalibrationError::EmptyTable.code(),
            CalibrationErrorCodes::EMPTY_TABLE
        );
        assert_eq!(
            CalibrationError::FrequencyIndexOutOfRange { index: 12, len: 10 }.code(),
            CalibrationErrorCodes::FREQUENCY_INDEX_OUT_OF_RANGE
        );
        assert_eq!(
            CalibrationError::NonFiniteLevel {
                frequency_hz: 250.0
            }
            .code(),
            CalibrationErrorCodes::NON_FINITE_LEVEL
        );
    }

    #[test]
    fn test_calibration_error_messages() {
        let err = CalibrationError::FrequencyIndexOutOfRange { index: 12, len: 10 };
        assert_eq!(
            err.message(),
            "Frequency index 12 out of range (table has 10 entries)"
        );
        assert!(format!("{}", err).contains("2002"));
    }

    #[test]
    fn test_error_code_getters() {
        assert_eq!(CalibrationErrorCodes::empty_table(), 2001);
        assert_eq!(CalibrationErrorCodes::frequency_index_out_of_range(), 2002);
        assert_eq!(CalibrationErrorCodes::non_finite_level(), 2003);
    }
}
