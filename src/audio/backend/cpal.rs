//! CPAL backend for desktop platforms (Linux, macOS, Windows)
//!
//! Capture frames travel from the input callback through the frame pool;
//! playback samples travel to the output callback through an rtrb ring.
//! Both callbacks stay allocation-free.

use std::thread;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use rtrb::{Consumer, Producer, RingBuffer};

use super::{AudioBackend, CaptureStream, PlaybackStream, StreamSpec};
use crate::audio::buffer_pool::{FrameAssembler, FramePool, WorkerChannels};
use crate::error::AudioError;

/// Playback ring holds this many frames of headroom
const PLAYBACK_RING_FRAMES: usize = 4;

#[derive(Debug, Default)]
pub struct CpalBackend {
    _unit: (),
}

impl CpalBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

fn device_error(what: &str, err: impl std::fmt::Debug) -> AudioError {
    AudioError::DeviceInit {
        reason: format!("{}: {:?}", what, err),
    }
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn min_buffer_frames(&self, _sample_rate: u32) -> Option<usize> {
        let device = cpal::default_host().default_output_device()?;
        let config = device.default_output_config().ok()?;
        match config.buffer_size() {
            cpal::SupportedBufferSize::Range { min, .. } if *min > 0 => Some(*min as usize),
            _ => None,
        }
    }

    fn open_capture(&self, spec: &StreamSpec) -> Result<Box<dyn CaptureStream>, AudioError> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| device_error("input device", "none found"))?;
        let supported = device
            .default_input_config()
            .map_err(|e| device_error("input config", e))?;

        let config = cpal::StreamConfig {
            channels: supported.channels(),
            sample_rate: cpal::SampleRate(spec.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let (callback, worker) = FramePool::new(spec.buffer_count, spec.frame_size)?.split();
        let assembler = FrameAssembler::new(callback);

        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => build_input::<f32>(&device, &config, assembler),
            cpal::SampleFormat::I16 => build_input::<i16>(&device, &config, assembler),
            other => {
                return Err(device_error("input sample format", other));
            }
        }?;
        stream.play().map_err(|e| device_error("input start", e))?;

        tracing::info!(
            "[CpalBackend] Capture open: {} Hz, {} device channel(s), frame {}",
            spec.sample_rate,
            config.channels,
            spec.frame_size
        );
        Ok(Box::new(CpalCapture {
            _stream: stream,
            worker,
            read_timeout: spec.read_timeout,
        }))
    }

    fn open_playback(&self, spec: &StreamSpec) -> Result<Box<dyn PlaybackStream>, AudioError> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| device_error("output device", "none found"))?;
        let supported = device
            .default_output_config()
            .map_err(|e| device_error("output config", e))?;

        let config = cpal::StreamConfig {
            channels: spec.playback_channels,
            sample_rate: cpal::SampleRate(spec.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let capacity = spec.frame_size * spec.playback_channels as usize * PLAYBACK_RING_FRAMES;
        let (producer, consumer) = RingBuffer::<i16>::new(capacity);

        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => build_output::<f32>(&device, &config, consumer),
            cpal::SampleFormat::I16 => build_output::<i16>(&device, &config, consumer),
            other => {
                return Err(device_error("output sample format", other));
            }
        }?;
        stream.play().map_err(|e| device_error("output start", e))?;

        tracing::info!(
            "[CpalBackend] Playback open: {} Hz, {} channel(s)",
            spec.sample_rate,
            config.channels
        );
        Ok(Box::new(CpalPlayback {
            _stream: stream,
            producer,
        }))
    }
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut assembler: FrameAssembler,
) -> Result<cpal::Stream, AudioError>
where
    T: SizedSample,
    i16: FromSample<T>,
{
    let channels = config.channels.max(1) as usize;
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                // Keep the first channel only
                for frame in data.chunks(channels) {
                    assembler.push_sample(frame[0].to_sample::<i16>());
                }
            },
            |err| tracing::warn!("[CpalBackend] Input stream error: {}", err),
            None,
        )
        .map_err(|e| device_error("build input stream", e))
}

fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut consumer: Consumer<i16>,
) -> Result<cpal::Stream, AudioError>
where
    T: SizedSample + FromSample<i16>,
{
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                for out in data.iter_mut() {
                    // Underrun plays silence
                    let sample = consumer.pop().unwrap_or(0);
                    *out = T::from_sample(sample);
                }
            },
            |err| tracing::warn!("[CpalBackend] Output stream error: {}", err),
            None,
        )
        .map_err(|e| device_error("build output stream", e))
}

struct CpalCapture {
    _stream: cpal::Stream,
    worker: WorkerChannels,
    read_timeout: Duration,
}

impl CaptureStream for CpalCapture {
    fn read(&mut self, frame: &mut [i16]) -> Result<usize, AudioError> {
        let deadline = Instant::now() + self.read_timeout;
        loop {
            match self.worker.data_consumer.pop() {
                Ok(full) => {
                    let n = full.len().min(frame.len());
                    frame[..n].copy_from_slice(&full[..n]);
                    // Pool capacity matches the frame count, so this cannot fail
                    let _ = self.worker.pool_producer.push(full);
                    return Ok(n);
                }
                Err(rtrb::PopError::Empty) => {
                    if Instant::now() >= deadline {
                        return Ok(0);
                    }
                    thread::sleep(Duration::from_millis(1));
                }
            }
        }
    }
}

struct CpalPlayback {
    _stream: cpal::Stream,
    producer: Producer<i16>,
}

impl PlaybackStream for CpalPlayback {
    fn write(&mut self, samples: &[i16]) -> Result<(), AudioError> {
        if self.producer.slots() < samples.len() {
            return Err(AudioError::StreamWrite {
                reason: format!(
                    "playback ring has {} free slots for {} samples",
                    self.producer.slots(),
                    samples.len()
                ),
            });
        }
        for &sample in samples {
            let _ = self.producer.push(sample);
        }
        Ok(())
    }
}
