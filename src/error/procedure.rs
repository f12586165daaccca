// Audiometric procedure error types and constants
//
// Out-of-range responses never produce these errors; levels are clamped
// instead. These only cover protocol misuse by the caller.

use crate::error::ErrorCode;
use flutter_rust_bridge::frb;
use log::error;
use std::fmt;

/// Procedure error code constants exposed via FFI
///
/// Error code range: 3001-3007
#[frb(unignore)]
pub struct ProcedureErrorCodes {}

#[frb]
impl ProcedureErrorCodes {
    /// A response arrived with no trial awaiting one
    pub const NO_PENDING_TRIAL: i32 = 3001;

    /// A trial presentation is still in progress
    pub const TRIAL_IN_PROGRESS: i32 = 3002;

    /// Every (frequency, ear) pair has already been tested
    pub const ALREADY_COMPLETE: i32 = 3003;

    /// The session was cancelled
    pub const CANCELLED: i32 = 3004;

    /// Procedure configuration is unusable
    pub const INVALID_CONFIGURATION: i32 = 3005;

    /// No test session is active
    pub const NO_ACTIVE_SESSION: i32 = 3006;

    /// The session is paused; resume it first
    pub const PAUSED: i32 = 3007;

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn no_pending_trial() -> i32 {
        Self::NO_PENDING_TRIAL
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn trial_in_progress() -> i32 {
        Self::TRIAL_IN_PROGRESS
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn already_complete() -> i32 {
        Self::ALREADY_COMPLETE
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn cancelled() -> i32 {
        Self::CANCELLED
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn invalid_configuration() -> i32 {
        Self::INVALID_CONFIGURATION
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn no_active_session() -> i32 {
        Self::NO_ACTIVE_SESSION
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn paused() -> i32 {
        Self::PAUSED
    }
}

/// Log a procedure error with structured context
pub fn log_procedure_error(err: &ProcedureError, context: &str) {
    error!(
        "Procedure error in {}: code={}, component=TestSession, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Threshold/MCL procedure and session errors
///
/// Error code ranges: 3001-3007
#[derive(Debug, Clone, PartialEq)]
pub enum ProcedureError {
    /// A response arrived with no trial awaiting one
    NoPendingTrial,

    /// A trial presentation is still in progress
    TrialInProgress,

    /// Every (frequency, ear) pair has already been tested
    AlreadyComplete,

    /// The session was cancelled
    Cancelled,

    /// Procedure configuration is unusable
    InvalidConfiguration { reason: String },

    /// No test session is active
    NoActiveSession,

    /// The session is paused; resume it first
    Paused,
}

impl ErrorCode for ProcedureError {
    fn code(&self) -> i32 {
        match self {
            ProcedureError::NoPendingTrial => ProcedureErrorCodes::NO_PENDING_TRIAL,
            ProcedureError::TrialInProgress => ProcedureErrorCodes::TRIAL_IN_PROGRESS,
            ProcedureError::AlreadyComplete => ProcedureErrorCodes::ALREADY_COMPLETE,
            ProcedureError::Cancelled => ProcedureErrorCodes::CANCELLED,
            ProcedureError::InvalidConfiguration { .. } => {
                ProcedureErrorCodes::INVALID_CONFIGURATION
            }
            ProcedureError::NoActiveSession => ProcedureErrorCodes::NO_ACTIVE_SESSION,
            ProcedureError::Paused => ProcedureErrorCodes::PAUSED,
        }
    }

    fn message(&self) -> String {
        match self {
            ProcedureError::NoPendingTrial => {
                "No trial is awaiting a response. Present a trial first.".to_string()
            }
            ProcedureError::TrialInProgress => {
                "A trial is still being presented. Wait for it to finish.".to_string()
            }
            ProcedureError::AlreadyComplete => "All frequencies have been tested.".to_string(),
            ProcedureError::Cancelled => "The test session was cancelled.".to_string(),
            ProcedureError::InvalidConfiguration { reason } => {
                format!("Invalid procedure configuration: {}", reason)
            }
            ProcedureError::NoActiveSession => {
                "No test session is active. Start a test first.".to_string()
            }
            ProcedureError::Paused => "The test is paused. Resume it first.".to_string(),
        }
    }
}

impl fmt::Display for ProcedureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ProcedureError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for ProcedureError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_procedure_error_codes() {
        assert_eq!(
            ProcedureError::NoPendingTrial.code(),
            ProcedureErrorCodes::NO_PENDING_TRIAL
        );
        assert_eq!(
            ProcedureError::TrialInProgress.code(),
            ProcedureErrorCodes::TRIAL_IN_PROGRESS
        );
        assert_eq!(
            ProcedureError::InvalidConfiguration {
                reason: "no frequencies".to_string()
            }
            .code(),
            ProcedureErrorCodes::INVALID_CONFIGURATION
        );
        assert_eq!(ProcedureError::Paused.code(), ProcedureErrorCodes::PAUSED);
    }

    #[test]
    fn test_procedure_error_display() {
        let err = ProcedureError::InvalidConfiguration {
            reason: "no frequencies".to_string(),
        };
        let display = format!("{}", err);
        assert!(display.contains("ProcedureError"));
        assert!(display.contains("3005"));
        assert!(display.contains("no frequencies"));
    }

    #[test]
    fn test_error_code_getters() {
        assert_eq!(ProcedureErrorCodes::no_pending_trial(), 3001);
        assert_eq!(ProcedureErrorCodes::trial_in_progress(), 3002);
        assert_eq!(ProcedureErrorCodes::already_complete(), 3003);
        assert_eq!(ProcedureErrorCodes::cancelled(), 3004);
        assert_eq!(ProcedureErrorCodes::invalid_configuration(), 3005);
        assert_eq!(ProcedureErrorCodes::no_active_session(), 3006);
        assert_eq!(ProcedureErrorCodes::paused(), 3007);
    }
}
