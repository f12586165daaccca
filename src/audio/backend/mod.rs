//! Device backends for the streaming pipeline
//!
//! A backend only knows how to open devices. The pipeline owns the worker
//! thread and calls `open_capture`/`open_playback` from it, so the returned
//! streams never cross threads and need not be `Send`.

use std::time::Duration;

use crate::error::AudioError;

#[cfg(target_os = "android")]
mod oboe;
#[cfg(target_os = "android")]
pub use self::oboe::OboeBackend;

#[cfg(not(target_os = "android"))]
mod cpal;
#[cfg(not(target_os = "android"))]
pub use self::cpal::CpalBackend;

mod stub;
pub use stub::StubBackend;

/// Negotiated stream shape handed to a backend when opening devices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSpec {
    pub sample_rate: u32,
    /// Mono samples per frame
    pub frame_size: usize,
    /// Playback channels; capture is always mono
    pub playback_channels: u16,
    /// Frames the capture side may queue ahead of the worker
    pub buffer_count: usize,
    /// Longest a single read blocks before returning 0
    pub read_timeout: Duration,
}

/// Mono PCM source
pub trait CaptureStream {
    /// Fill `frame` with the next frame of samples
    ///
    /// Returns the number of samples written, 0 when nothing arrived within
    /// the read timeout.
    fn read(&mut self, frame: &mut [i16]) -> Result<usize, AudioError>;
}

/// Interleaved PCM sink
pub trait PlaybackStream {
    /// Queue one frame of interleaved samples
    fn write(&mut self, samples: &[i16]) -> Result<(), AudioError>;
}

/// Trait implemented by platform-specific audio backends
pub trait AudioBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Device minimum buffer in frames, `None` when the device does not say
    fn min_buffer_frames(&self, sample_rate: u32) -> Option<usize>;

    fn open_capture(&self, spec: &StreamSpec) -> Result<Box<dyn CaptureStream>, AudioError>;

    fn open_playback(&self, spec: &StreamSpec) -> Result<Box<dyn PlaybackStream>, AudioError>;
}

/// Backend for the platform the crate was built for
#[cfg(target_os = "android")]
pub fn platform_backend() -> std::sync::Arc<dyn AudioBackend> {
    std::sync::Arc::new(OboeBackend::new())
}

/// Backend for the platform the crate was built for
#[cfg(not(target_os = "android"))]
pub fn platform_backend() -> std::sync::Arc<dyn AudioBackend> {
    std::sync::Arc::new(CpalBackend::new())
}
