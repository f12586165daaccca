// Audio pipeline error types and constants

use crate::error::ErrorCode;
use flutter_rust_bridge::frb;
use log::error;
use std::fmt;

/// Audio error code constants exposed to the UI layer via FFI
///
/// `start_audio_processing()` returns one of these codes (or 0 on success),
/// so they are the contract between the native layer and the UI.
///
/// Error code range: 1001-1010 (1007 is retired)
#[frb(unignore)]
pub struct AudioErrorCodes {}

#[frb]
impl AudioErrorCodes {
    /// Capture or playback device failed to reach a ready state
    pub const DEVICE_INIT_FAILED: i32 = 1001;

    /// Microphone permission has not been granted
    pub const PERMISSION_DENIED: i32 = 1002;

    /// Compressor parameter arrays were malformed or mismatched
    pub const INVALID_PARAMETERS: i32 = 1003;

    /// Playback write failed for a single frame
    pub const STREAM_WRITE_FAILED: i32 = 1004;

    /// Streaming worker did not exit within the shutdown bound
    pub const SHUTDOWN_TIMEOUT: i32 = 1005;

    /// Pipeline is already running
    pub const ALREADY_RUNNING: i32 = 1006;

    /// Device-reported minimum buffer or buffer factor is unusable
    pub const INVALID_BUFFER_SIZE: i32 = 1008;

    /// Mutex/RwLock was poisoned
    pub const LOCK_POISONED: i32 = 1009;

    /// Capture stream disconnected or failed to deliver samples
    pub const STREAM_READ_FAILED: i32 = 1010;

    // Getter methods for FFI exposure (flutter_rust_bridge requires methods not const)

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn device_init_failed() -> i32 {
        Self::DEVICE_INIT_FAILED
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn permission_denied() -> i32 {
        Self::PERMISSION_DENIED
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn invalid_parameters() -> i32 {
        Self::INVALID_PARAMETERS
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn stream_write_failed() -> i32 {
        Self::STREAM_WRITE_FAILED
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn shutdown_timeout() -> i32 {
        Self::SHUTDOWN_TIMEOUT
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn already_running() -> i32 {
        Self::ALREADY_RUNNING
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn invalid_buffer_size() -> i32 {
        Self::INVALID_BUFFER_SIZE
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn lock_poisoned() -> i32 {
        Self::LOCK_POISONED
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn stream_read_failed() -> i32 {
        Self::STREAM_READ_FAILED
    }
}

/// Log an audio error with structured context
///
/// The logging is non-blocking and will not panic on failure.
pub fn log_audio_error(err: &AudioError, context: &str) {
    error!(
        "Audio error in {}: code={}, component=AudioPipeline, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Audio pipeline errors
///
/// Error code ranges: 1001-1010
#[derive(Debug, Clone, PartialEq)]
pub enum AudioError {
    /// Capture or playback device failed to reach a ready state
    DeviceInit { reason: String },

    /// Microphone permission has not been granted
    PermissionDenied,

    /// Compressor parameter arrays were malformed or mismatched
    InvalidParameters { reason: String },

    /// Playback write failed for a single frame
    StreamWrite { reason: String },

    /// Streaming worker did not exit within the shutdown bound
    ShutdownTimeout { timeout_ms: u64 },

    /// Pipeline is already running
    AlreadyRunning,

    /// Device-reported minimum buffer or buffer factor is unusable
    InvalidBufferSize { min_frames: usize, factor: usize },

    /// Mutex/RwLock was poisoned
    LockPoisoned { component: String },

    /// Capture stream disconnected or failed to deliver samples
    StreamRead { reason: String },
}

impl AudioError {
    /// Whether the streaming loop can keep running after this error
    pub fn is_transient(&self) -> bool {
        matches!(self, AudioError::StreamWrite { .. })
    }
}

impl ErrorCode for AudioError {
    fn code(&self) -> i32 {
        match self {
            AudioError::DeviceInit { .. } => AudioErrorCodes::DEVICE_INIT_FAILED,
            AudioError::PermissionDenied => AudioErrorCodes::PERMISSION_DENIED,
            AudioError::InvalidParameters { .. } => AudioErrorCodes::INVALID_PARAMETERS,
            AudioError::StreamWrite { .. } => AudioErrorCodes::STREAM_WRITE_FAILED,
            AudioError::ShutdownTimeout { .. } => AudioErrorCodes::SHUTDOWN_TIMEOUT,
            AudioError::AlreadyRunning => AudioErrorCodes::ALREADY_RUNNING,
            AudioError::InvalidBufferSize { .. } => AudioErrorCodes::INVALID_BUFFER_SIZE,
            AudioError::LockPoisoned { .. } => AudioErrorCodes::LOCK_POISONED,
            AudioError::StreamRead { .. } => AudioErrorCodes::STREAM_READ_FAILED,
        }
    }

    fn message(&self) -> String {
        match self {
            AudioError::DeviceInit { reason } => {
                format!("Audio device failed to initialize: {}", reason)
            }
            AudioError::PermissionDenied => {
                "Microphone permission denied. Please grant microphone access.".to_string()
            }
            AudioError::InvalidParameters { reason } => {
                format!("Invalid compressor parameters: {}", reason)
            }
            AudioError::StreamWrite { reason } => {
                format!("Playback write failed: {}", reason)
            }
            AudioError::ShutdownTimeout { timeout_ms } => {
                format!(
                    "Streaming worker did not stop within {} ms; devices stay held until it exits",
                    timeout_ms
                )
            }
            AudioError::AlreadyRunning => {
                "Audio pipeline already running. Call stop_audio_processing() first.".to_string()
            }
            AudioError::InvalidBufferSize { min_frames, factor } => {
                format!(
                    "Invalid buffer size: device minimum {} frames x factor {}",
                    min_frames, factor
                )
            }
            AudioError::LockPoisoned { component } => {
                format!("Lock poisoned on {}", component)
            }
            AudioError::StreamRead { reason } => {
                format!("Capture stream failed: {}", reason)
            }
        }
    }
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AudioError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for AudioError {}

impl From<std::io::Error> for AudioError {
    fn from(err: std::io::Error) -> Self {
        AudioError::DeviceInit {
            reason: err.to_string(),
        }
    }
}
