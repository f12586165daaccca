// Error types for the hearing amplifier core
//
// This module defines custom error types for the audio pipeline, SPL calibration,
// audiometric test procedures and profile storage, providing structured error
// handling with error codes suitable for FFI communication.

mod audio;
mod calibration;
mod procedure;
mod storage;

pub use audio::{log_audio_error, AudioError, AudioErrorCodes};
pub use calibration::{log_calibration_error, CalibrationError, CalibrationErrorCodes};
pub use procedure::{log_procedure_error, ProcedureError, ProcedureErrorCodes};
pub use storage::{log_storage_error, StorageError, StorageErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// the FFI boundary.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
