//! Oboe backend for Android (AAudio/OpenSL ES)
//!
//! Uses blocking sync streams so the pipeline worker drives both reads and
//! writes; no callback thread is involved.

use oboe::{
    AudioInputStreamSync, AudioOutputStreamSync, AudioStream, AudioStreamBuilder,
    AudioStreamSync, DefaultStreamValues, Input, Mono, Output, PerformanceMode, SharingMode,
    Stereo,
};

use super::{AudioBackend, CaptureStream, PlaybackStream, StreamSpec};
use crate::error::AudioError;

/// Write timeout per frame; a late device drops the frame instead of stalling
const WRITE_TIMEOUT_NANOS: i64 = 20_000_000;

#[derive(Debug, Default)]
pub struct OboeBackend {
    _unit: (),
}

impl OboeBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

fn device_error(what: &str, err: impl std::fmt::Debug) -> AudioError {
    AudioError::DeviceInit {
        reason: format!("{}: {:?}", what, err),
    }
}

impl AudioBackend for OboeBackend {
    fn name(&self) -> &'static str {
        "oboe"
    }

    fn min_buffer_frames(&self, _sample_rate: u32) -> Option<usize> {
        let burst = DefaultStreamValues::get_frames_per_burst();
        (burst > 0).then_some(burst as usize)
    }

    fn open_capture(&self, spec: &StreamSpec) -> Result<Box<dyn CaptureStream>, AudioError> {
        let mut stream = AudioStreamBuilder::default()
            .set_performance_mode(PerformanceMode::LowLatency)
            .set_sharing_mode(SharingMode::Shared)
            .set_direction::<Input>()
            .set_sample_rate(spec.sample_rate as i32)
            .set_channel_count::<Mono>()
            .set_format::<i16>()
            .open_stream()
            .map_err(|e| device_error("input stream", e))?;
        stream.start().map_err(|e| device_error("input start", e))?;

        Ok(Box::new(OboeCapture {
            stream,
            timeout_nanos: spec.read_timeout.as_nanos() as i64,
        }))
    }

    fn open_playback(&self, spec: &StreamSpec) -> Result<Box<dyn PlaybackStream>, AudioError> {
        let builder = AudioStreamBuilder::default()
            .set_performance_mode(PerformanceMode::LowLatency)
            .set_sharing_mode(SharingMode::Shared)
            .set_direction::<Output>()
            .set_sample_rate(spec.sample_rate as i32)
            .set_format::<i16>();

        if spec.playback_channels >= 2 {
            let mut stream = builder
                .set_channel_count::<Stereo>()
                .open_stream()
                .map_err(|e| device_error("output stream", e))?;
            stream.start().map_err(|e| device_error("output start", e))?;
            Ok(Box::new(OboeStereoPlayback {
                stream,
                scratch: Vec::with_capacity(spec.frame_size),
            }))
        } else {
            let mut stream = builder
                .set_channel_count::<Mono>()
                .open_stream()
                .map_err(|e| device_error("output stream", e))?;
            stream.start().map_err(|e| device_error("output start", e))?;
            Ok(Box::new(OboeMonoPlayback { stream }))
        }
    }
}

struct OboeCapture {
    stream: AudioStreamSync<Input, (i16, Mono)>,
    timeout_nanos: i64,
}

impl CaptureStream for OboeCapture {
    fn read(&mut self, frame: &mut [i16]) -> Result<usize, AudioError> {
        let read = self
            .stream
            .read(frame, self.timeout_nanos)
            .map_err(|e| AudioError::StreamRead {
                reason: format!("{:?}", e),
            })?;
        Ok(read.max(0) as usize)
    }
}

fn write_error(err: impl std::fmt::Debug) -> AudioError {
    AudioError::StreamWrite {
        reason: format!("{:?}", err),
    }
}

struct OboeMonoPlayback {
    stream: AudioStreamSync<Output, (i16, Mono)>,
}

impl PlaybackStream for OboeMonoPlayback {
    fn write(&mut self, samples: &[i16]) -> Result<(), AudioError> {
        self.stream
            .write(samples, WRITE_TIMEOUT_NANOS)
            .map(|_| ())
            .map_err(write_error)
    }
}

struct OboeStereoPlayback {
    stream: AudioStreamSync<Output, (i16, Stereo)>,
    scratch: Vec<(i16, i16)>,
}

impl PlaybackStream for OboeStereoPlayback {
    fn write(&mut self, samples: &[i16]) -> Result<(), AudioError> {
        self.scratch.clear();
        self.scratch
            .extend(samples.chunks_exact(2).map(|pair| (pair[0], pair[1])));
        self.stream
            .write(&self.scratch, WRITE_TIMEOUT_NANOS)
            .map(|_| ())
            .map_err(write_error)
    }
}
