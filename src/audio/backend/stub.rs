//! In-process backend for tests and headless runs
//!
//! Capture replays a fixed sample buffer and playback records everything
//! written. Failure modes are switched on per instance.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use super::{AudioBackend, CaptureStream, PlaybackStream, StreamSpec};
use crate::error::AudioError;

#[derive(Default)]
struct StubShared {
    input: Vec<i16>,
    looping: bool,
    position: AtomicUsize,
    output: Mutex<Vec<i16>>,
    failing_writes: AtomicUsize,
    hang_reads: AtomicBool,
    open_streams: AtomicUsize,
    frames_read: AtomicUsize,
}

/// Scriptable backend with shared observation handles
#[derive(Clone, Default)]
pub struct StubBackend {
    shared: Arc<StubShared>,
    min_buffer_frames: Option<usize>,
    fail_capture: bool,
    fail_playback: bool,
    open_delay: Option<Duration>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture replays `input` once, then reports empty reads
    pub fn with_input(input: Vec<i16>) -> Self {
        Self::with_shared(StubShared {
            input,
            ..StubShared::default()
        })
    }

    /// Capture replays `input` forever
    pub fn looping(input: Vec<i16>) -> Self {
        Self::with_shared(StubShared {
            input,
            looping: true,
            ..StubShared::default()
        })
    }

    fn with_shared(shared: StubShared) -> Self {
        Self {
            shared: Arc::new(shared),
            ..Self::default()
        }
    }

    pub fn with_min_buffer_frames(mut self, frames: usize) -> Self {
        self.min_buffer_frames = Some(frames);
        self
    }

    pub fn failing_capture(mut self) -> Self {
        self.fail_capture = true;
        self
    }

    pub fn failing_playback(mut self) -> Self {
        self.fail_playback = true;
        self
    }

    /// Delay every device open, simulating a device that never gets ready
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    /// Fail the next `count` playback writes
    pub fn fail_next_writes(&self, count: usize) {
        self.shared.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Block capture reads until cleared
    pub fn set_hang_reads(&self, hang: bool) {
        self.shared.hang_reads.store(hang, Ordering::SeqCst);
    }

    /// Everything written to playback so far
    pub fn output(&self) -> Vec<i16> {
        self.shared
            .output
            .lock()
            .map(|output| output.clone())
            .unwrap_or_default()
    }

    /// Streams currently held open
    pub fn open_streams(&self) -> usize {
        self.shared.open_streams.load(Ordering::SeqCst)
    }

    pub fn frames_read(&self) -> usize {
        self.shared.frames_read.load(Ordering::SeqCst)
    }

    fn delay_open(&self) {
        if let Some(delay) = self.open_delay {
            thread::sleep(delay);
        }
    }
}

impl AudioBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn min_buffer_frames(&self, _sample_rate: u32) -> Option<usize> {
        self.min_buffer_frames
    }

    fn open_capture(&self, spec: &StreamSpec) -> Result<Box<dyn CaptureStream>, AudioError> {
        self.delay_open();
        if self.fail_capture {
            return Err(AudioError::DeviceInit {
                reason: "stub capture device unavailable".to_string(),
            });
        }
        self.shared.open_streams.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubCapture {
            shared: Arc::clone(&self.shared),
            read_timeout: spec.read_timeout,
        }))
    }

    fn open_playback(&self, _spec: &StreamSpec) -> Result<Box<dyn PlaybackStream>, AudioError> {
        self.delay_open();
        if self.fail_playback {
            return Err(AudioError::DeviceInit {
                reason: "stub playback device unavailable".to_string(),
            });
        }
        self.shared.open_streams.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubPlayback {
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct StubCapture {
    shared: Arc<StubShared>,
    read_timeout: Duration,
}

impl CaptureStream for StubCapture {
    fn read(&mut self, frame: &mut [i16]) -> Result<usize, AudioError> {
        while self.shared.hang_reads.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(1));
        }

        let input = &self.shared.input;
        let start = self.shared.position.load(Ordering::SeqCst);
        if input.is_empty() || (!self.shared.looping && start >= input.len()) {
            thread::sleep(self.read_timeout.min(Duration::from_millis(5)));
            return Ok(0);
        }

        let mut written = 0;
        let mut position = start;
        while written < frame.len() {
            if position >= input.len() {
                if !self.shared.looping {
                    break;
                }
                position = 0;
            }
            frame[written] = input[position];
            written += 1;
            position += 1;
        }
        self.shared.position.store(position, Ordering::SeqCst);
        self.shared.frames_read.fetch_add(1, Ordering::SeqCst);

        if self.shared.looping {
            // Pace looping input roughly like a device would
            thread::sleep(Duration::from_millis(1));
        }
        Ok(written)
    }
}

impl Drop for StubCapture {
    fn drop(&mut self) {
        self.shared.open_streams.fetch_sub(1, Ordering::SeqCst);
    }
}

struct StubPlayback {
    shared: Arc<StubShared>,
}

impl PlaybackStream for StubPlayback {
    fn write(&mut self, samples: &[i16]) -> Result<(), AudioError> {
        let failing = &self.shared.failing_writes;
        if failing
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(AudioError::StreamWrite {
                reason: "stub playback rejected frame".to_string(),
            });
        }

        let mut output = self.shared.output.lock().map_err(|_| AudioError::LockPoisoned {
            component: "stub_output".to_string(),
        })?;
        output.extend_from_slice(samples);
        Ok(())
    }
}

impl Drop for StubPlayback {
    fn drop(&mut self) {
        self.shared.open_streams.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> StreamSpec {
        StreamSpec {
            sample_rate: 44_100,
            frame_size: 4,
            playback_channels: 1,
            buffer_count: 4,
            read_timeout: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_capture_replays_input_once() {
        let backend = StubBackend::with_input(vec![1, 2, 3, 4, 5, 6]);
        let mut capture = backend.open_capture(&spec()).unwrap();
        let mut frame = [0i16; 4];

        assert_eq!(capture.read(&mut frame).unwrap(), 4);
        assert_eq!(frame, [1, 2, 3, 4]);
        assert_eq!(capture.read(&mut frame).unwrap(), 2);
        assert_eq!(&frame[..2], &[5, 6]);
        assert_eq!(capture.read(&mut frame).unwrap(), 0);
    }

    #[test]
    fn test_playback_records_and_fails_on_demand() {
        let backend = StubBackend::new();
        let mut playback = backend.open_playback(&spec()).unwrap();

        backend.fail_next_writes(1);
        assert!(matches!(
            playback.write(&[1, 2]),
            Err(AudioError::StreamWrite { .. })
        ));
        playback.write(&[3, 4]).unwrap();
        assert_eq!(backend.output(), vec![3, 4]);
    }

    #[test]
    fn test_open_streams_tracks_drops() {
        let backend = StubBackend::new();
        let capture = backend.open_capture(&spec()).unwrap();
        let playback = backend.open_playback(&spec()).unwrap();
        assert_eq!(backend.open_streams(), 2);
        drop(capture);
        drop(playback);
        assert_eq!(backend.open_streams(), 0);
    }

    #[test]
    fn test_failing_devices() {
        assert!(StubBackend::new().failing_capture().open_capture(&spec()).is_err());
        assert!(StubBackend::new().failing_playback().open_playback(&spec()).is_err());
    }
}
