// Profile storage error types and constants

use crate::error::ErrorCode;
use flutter_rust_bridge::frb;
use log::error;
use std::fmt;

/// Storage error code constants exposed via FFI
///
/// Error code range: 4001-4004
#[frb(unignore)]
pub struct StorageErrorCodes {}

#[frb]
impl StorageErrorCodes {
    /// Requested calibration profile or record does not exist
    pub const NOT_FOUND: i32 = 4001;

    /// Underlying file system operation failed
    pub const IO: i32 = 4002;

    /// Stored payload could not be encoded or decoded
    pub const SERIALIZATION: i32 = 4003;

    /// In-memory store lock was poisoned
    pub const LOCK_POISONED: i32 = 4004;

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn not_found() -> i32 {
        Self::NOT_FOUND
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn io() -> i32 {
        Self::IO
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn serialization() -> i32 {
        Self::SERIALIZATION
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn lock_poisoned() -> i32 {
        Self::LOCK_POISONED
    }
}

/// Log a storage error with structured context
///
/// Persistence failures are reported and then swallowed by callers that
/// must keep an active test or audio stream alive.
pub fn log_storage_error(err: &StorageError, context: &str) {
    error!(
        "Storage error in {}: code={}, component=ProfileRepository, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Profile repository errors
///
/// Error code ranges: 4001-4004
#[derive(Debug, Clone, PartialEq)]
pub enum StorageError {
    /// Requested calibration profile or record does not exist
    NotFound { key: String },

    /// Underlying file system operation failed
    Io { reason: String },

    /// Stored payload could not be encoded or decoded
    Serialization { reason: String },

    /// In-memory store lock was poisoned
    LockPoisoned { component: String },
}

impl ErrorCode for StorageError {
    fn code(&self) -> i32 {
        match self {
            StorageError::NotFound { .. } => StorageErrorCodes::NOT_FOUND,
            StorageError::Io { .. } => StorageErrorCodes::IO,
            StorageError::Serialization { .. } => StorageErrorCodes::SERIALIZATION,
            StorageError::LockPoisoned { .. } => StorageErrorCodes::LOCK_POISONED,
        }
    }

    fn message(&self) -> String {
        match self {
            StorageError::NotFound { key } => format!("No stored entry for '{}'", key),
            StorageError::Io { reason } => format!("Storage I/O failed: {}", reason),
            StorageError::Serialization { reason } => {
                format!("Stored data could not be (de)serialized: {}", reason)
            }
            StorageError::LockPoisoned { component } => {
                format!("Lock poisoned on {}", component)
            }
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StorageError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io {
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_codes() {
        assert_eq!(
            StorageError::NotFound {
                key: "clinic".to_string()
            }
            .code(),
            StorageErrorCodes::NOT_FOUND
        );
        assert_eq!(
            StorageError::Io {
                reason: "disk".to_string()
            }
            .code(),
            StorageErrorCodes::IO
        );
    }

    #[test]
    fn test_from_serde_error() {
        let err = serde_json::from_str::<Vec<f32>>("not json").unwrap_err();
        let storage: StorageError = err.into();
        assert!(matches!(storage, StorageError::Serialization { .. }));
    }

    #[test]
    fn test_not_found_message_names_key() {
        let err = StorageError::NotFound {
            key: "clinic".to_string(),
        };
        assert_eq!(err.message(), "No stored entry for 'clinic'");
    }
}
