//! AudioPipeline - capture, process and play back on a dedicated worker
//!
//! Lifecycle:
//! - `start()` checks microphone permission, sizes the frame from the device
//!   minimum buffer, spawns the worker and waits for both devices to report
//!   ready
//! - the worker streams until its shutdown flag is raised, then drops the
//!   devices itself
//! - `stop()` raises the flag and waits a bounded time for the worker
//! - a worker that misses its deadline stays in the slot until it exits, and
//!   `start()` refuses to open a second device pair meanwhile
//!
//! Parameters are hot-swapped through [`ParamStore`] and may be updated
//! whether or not the pipeline is running.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::broadcast;

use super::backend::{AudioBackend, CaptureStream, PlaybackStream, StreamSpec};
use super::params::{ParamStore, PipelineParams};
use crate::config::AudioConfig;
use crate::dsp::{amplify, BandCompressorParams, CompressorParams, MultiBandCompressor};
use crate::error::{log_audio_error, AudioError};

const STATS_CHANNEL_CAPACITY: usize = 32;

/// Periodic streaming counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PipelineStats {
    pub frames_processed: u64,
    pub frames_dropped: u64,
    pub read_timeouts: u64,
    pub frame_size: usize,
    pub params_generation: u64,
}

/// Frame size from the device minimum and the configured factor
///
/// # Errors
/// `InvalidBufferSize` when either input is 0
pub fn frame_size(min_frames: usize, factor: usize) -> Result<usize, AudioError> {
    match min_frames.checked_mul(factor) {
        Some(size) if size > 0 => Ok(size),
        _ => Err(AudioError::InvalidBufferSize { min_frames, factor }),
    }
}

struct Worker {
    handle: JoinHandle<()>,
    shutdown: Arc<AtomicBool>,
}

impl Worker {
    fn is_streaming(&self) -> bool {
        !self.handle.is_finished() && !self.shutdown.load(Ordering::SeqCst)
    }

    /// Told to stop but still inside a device call
    fn is_draining(&self) -> bool {
        !self.handle.is_finished() && self.shutdown.load(Ordering::SeqCst)
    }
}

pub struct AudioPipeline {
    backend: Arc<dyn AudioBackend>,
    config: AudioConfig,
    split_hz: Vec<f32>,
    params: Arc<ParamStore>,
    permission_granted: AtomicBool,
    worker: Arc<Mutex<Option<Worker>>>,
    stats_tx: broadcast::Sender<PipelineStats>,
}

impl AudioPipeline {
    /// Build a stopped pipeline
    ///
    /// Starts with unity passthrough parameters for `split_hz.len() + 1`
    /// bands. The crossover points are fixed for the lifetime of the pipeline.
    pub fn new(backend: Arc<dyn AudioBackend>, config: AudioConfig, split_hz: Vec<f32>) -> Self {
        let initial = CompressorParams {
            bands: vec![BandCompressorParams::passthrough(); split_hz.len() + 1],
        };
        let (stats_tx, _) = broadcast::channel(STATS_CHANNEL_CAPACITY);

        Self {
            backend,
            permission_granted: AtomicBool::new(config.assume_permission_granted),
            config,
            split_hz,
            params: Arc::new(ParamStore::new(PipelineParams::Compressor(initial))),
            worker: Arc::new(Mutex::new(None)),
            stats_tx,
        }
    }

    pub fn set_permission_granted(&self, granted: bool) {
        self.permission_granted.store(granted, Ordering::SeqCst);
    }

    pub fn permission_granted(&self) -> bool {
        self.permission_granted.load(Ordering::SeqCst)
    }

    pub fn band_count(&self) -> usize {
        self.split_hz.len() + 1
    }

    pub fn subscribe_stats(&self) -> broadcast::Receiver<PipelineStats> {
        self.stats_tx.subscribe()
    }

    fn lock_worker(&self) -> Result<MutexGuard<'_, Option<Worker>>, AudioError> {
        self.worker.lock().map_err(|_| {
            let err = AudioError::LockPoisoned {
                component: "pipeline_worker".to_string(),
            };
            log_audio_error(&err, "lock_worker");
            err
        })
    }

    /// Whether a worker is alive and streaming
    pub fn is_running(&self) -> bool {
        self.lock_worker()
            .map(|guard| guard.as_ref().is_some_and(Worker::is_streaming))
            .unwrap_or(false)
    }

    /// Start streaming
    ///
    /// # Errors
    /// - `PermissionDenied` before any device is touched
    /// - `AlreadyRunning` when a live worker exists
    /// - `InvalidBufferSize` for a zero device minimum or factor
    /// - `DeviceInit` when a device fails, readiness times out, or a previous
    ///   worker that missed its stop deadline still holds the devices
    pub fn start(&self) -> Result<(), AudioError> {
        if !self.permission_granted() {
            let err = AudioError::PermissionDenied;
            log_audio_error(&err, "start");
            return Err(err);
        }

        let mut guard = self.lock_worker()?;
        if let Some(worker) = guard.take() {
            if worker.is_draining() {
                *guard = Some(worker);
                let err = AudioError::DeviceInit {
                    reason: "previous streaming worker has not released the devices".to_string(),
                };
                log_audio_error(&err, "start");
                return Err(err);
            }
            if !worker.handle.is_finished() {
                *guard = Some(worker);
                return Err(AudioError::AlreadyRunning);
            }
            // Worker exited on its own (device lost); reap it
            let _ = worker.handle.join();
        }

        let min_frames = self
            .backend
            .min_buffer_frames(self.config.sample_rate)
            .unwrap_or(self.config.fallback_min_buffer_frames);
        let frame_size = frame_size(min_frames, self.config.buffer_size_factor).map_err(|err| {
            log_audio_error(&err, "start");
            err
        })?;

        let processor = self.build_processor()?;
        let spec = StreamSpec {
            sample_rate: self.config.sample_rate,
            frame_size,
            playback_channels: self.config.playback_channels.clamp(1, 2),
            buffer_count: self.config.buffer_pool_size.max(1),
            read_timeout: Duration::from_millis(self.config.read_timeout_ms.max(1)),
        };

        let shutdown = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel();
        let context = WorkerContext {
            backend: Arc::clone(&self.backend),
            spec,
            params: Arc::clone(&self.params),
            processor,
            shutdown: Arc::clone(&shutdown),
            stats_tx: self.stats_tx.clone(),
            stats_every: self.config.stats_every_n_frames,
        };

        let handle = thread::Builder::new()
            .name("hearing-amp-stream".to_string())
            .spawn(move || run_worker(context, ready_tx))
            .map_err(|e| AudioError::DeviceInit {
                reason: format!("failed to spawn streaming worker: {}", e),
            })?;

        let timeout = Duration::from_millis(self.config.start_timeout_ms);
        let ready = ready_rx.recv_timeout(timeout);
        let result = match ready {
            Ok(Ok(())) => {
                tracing::info!(
                    "[AudioPipeline] Started on {} backend: {} Hz, frame {} ({} x {})",
                    self.backend.name(),
                    spec.sample_rate,
                    frame_size,
                    min_frames,
                    self.config.buffer_size_factor
                );
                *guard = Some(Worker { handle, shutdown });
                return Ok(());
            }
            Ok(Err(err)) => {
                let _ = handle.join();
                err
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                // The worker sees the flag once its device call returns and
                // drops whatever it opened; keep it until then
                shutdown.store(true, Ordering::SeqCst);
                *guard = Some(Worker { handle, shutdown });
                AudioError::DeviceInit {
                    reason: format!("devices not ready within {} ms", timeout.as_millis()),
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                let _ = handle.join();
                AudioError::DeviceInit {
                    reason: "streaming worker exited before reporting readiness".to_string(),
                }
            }
        };

        log_audio_error(&result, "start");
        Err(result)
    }

    /// Stop streaming; a no-op when already stopped
    ///
    /// # Errors
    /// `ShutdownTimeout` when the worker does not exit in time. The worker
    /// stays in the slot, releases its devices when its blocking call
    /// returns, and blocks `start()` until then. Calling `stop()` again
    /// waits for it once more.
    pub fn stop(&self) -> Result<(), AudioError> {
        // Held across the wait so no start() can slip in a second worker
        let mut guard = self.lock_worker()?;
        let Some(worker) = guard.take() else {
            return Ok(());
        };

        worker.shutdown.store(true, Ordering::SeqCst);
        let timeout_ms = self.config.shutdown_timeout_ms;
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        while !worker.handle.is_finished() {
            if Instant::now() >= deadline {
                *guard = Some(worker);
                let err = AudioError::ShutdownTimeout { timeout_ms };
                log_audio_error(&err, "stop");
                return Err(err);
            }
            thread::sleep(Duration::from_millis(2));
        }

        if worker.handle.join().is_err() {
            tracing::warn!("[AudioPipeline] Streaming worker panicked");
        }
        tracing::info!("[AudioPipeline] Stopped");
        Ok(())
    }

    /// Install new per-band compressor parameters
    ///
    /// # Errors
    /// `InvalidParameters` for non-finite values or a band count that does
    /// not match the crossover; the previous snapshot stays active.
    pub fn update_params(&self, params: CompressorParams) -> Result<(), AudioError> {
        let checked = params.validate().and_then(|()| {
            if params.len() == self.band_count() {
                Ok(())
            } else {
                Err(AudioError::InvalidParameters {
                    reason: format!(
                        "expected {} bands, got {}",
                        self.band_count(),
                        params.len()
                    ),
                })
            }
        });
        if let Err(err) = checked {
            log_audio_error(&err, "update_params");
            return Err(err);
        }

        let generation = self.params.install(PipelineParams::Compressor(params))?;
        tracing::debug!("[AudioPipeline] Compressor params installed (gen {})", generation);
        Ok(())
    }

    /// Switch to a single global multiplier
    ///
    /// # Errors
    /// `InvalidParameters` unless `factor` is finite and >= 0
    pub fn set_amplification(&self, factor: f32) -> Result<(), AudioError> {
        if !factor.is_finite() || factor < 0.0 {
            let err = AudioError::InvalidParameters {
                reason: format!("amplification factor {} must be finite and >= 0", factor),
            };
            log_audio_error(&err, "set_amplification");
            return Err(err);
        }
        let generation = self.params.install(PipelineParams::Amplify { factor })?;
        tracing::debug!("[AudioPipeline] Amplification {} installed (gen {})", factor, generation);
        Ok(())
    }

    pub fn active_params(&self) -> Result<Arc<PipelineParams>, AudioError> {
        self.params.snapshot()
    }

    fn build_processor(&self) -> Result<FrameProcessor, AudioError> {
        let (generation, snapshot) = match self.params.try_snapshot() {
            Some(current) => current,
            None => (self.params.generation(), self.params.snapshot()?),
        };
        // Compressor state survives mode switches, so seed it with
        // passthrough when the active mode is amplification
        let seed = snapshot.compressor().cloned().unwrap_or_else(|| CompressorParams {
            bands: vec![BandCompressorParams::passthrough(); self.band_count()],
        });
        let compressor = MultiBandCompressor::new(
            self.config.sample_rate,
            &self.split_hz,
            &seed,
            self.config.reference_db,
        )
        .map_err(|err| {
            log_audio_error(&err, "build_processor");
            err
        })?
        .with_noise_gate(self.config.noise_gate_threshold);

        Ok(FrameProcessor {
            compressor,
            active: snapshot,
            generation,
        })
    }
}

impl Drop for AudioPipeline {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log_audio_error(&err, "drop");
        }
    }
}

/// Worker-side view of the active parameters
struct FrameProcessor {
    compressor: MultiBandCompressor,
    active: Arc<PipelineParams>,
    generation: u64,
}

impl FrameProcessor {
    fn reload(&mut self, store: &ParamStore) {
        if store.generation() == self.generation {
            return;
        }
        let Some((generation, snapshot)) = store.try_snapshot() else {
            return;
        };
        if let Some(params) = snapshot.compressor() {
            if let Err(err) = self.compressor.set_params(params) {
                log_audio_error(&err, "reload_params");
            }
        }
        self.active = snapshot;
        self.generation = generation;
    }

    fn process(&mut self, input: &[i16], output: &mut [i16]) {
        match *self.active {
            PipelineParams::Compressor(_) => self.compressor.process(input, output),
            PipelineParams::Amplify { factor } => amplify(input, output, factor),
        }
    }
}

struct WorkerContext {
    backend: Arc<dyn AudioBackend>,
    spec: StreamSpec,
    params: Arc<ParamStore>,
    processor: FrameProcessor,
    shutdown: Arc<AtomicBool>,
    stats_tx: broadcast::Sender<PipelineStats>,
    stats_every: u64,
}

fn open_devices(
    ctx: &WorkerContext,
) -> Result<(Box<dyn CaptureStream>, Box<dyn PlaybackStream>), AudioError> {
    let capture = ctx.backend.open_capture(&ctx.spec)?;
    let playback = ctx.backend.open_playback(&ctx.spec)?;
    Ok((capture, playback))
}

fn run_worker(mut ctx: WorkerContext, ready_tx: mpsc::Sender<Result<(), AudioError>>) {
    let (mut capture, mut playback) = match open_devices(&ctx) {
        Ok(devices) => devices,
        Err(err) => {
            let _ = ready_tx.send(Err(err));
            return;
        }
    };
    if ctx.shutdown.load(Ordering::SeqCst) || ready_tx.send(Ok(())).is_err() {
        // start() already gave up on us
        return;
    }

    let frame_size = ctx.spec.frame_size;
    let channels = ctx.spec.playback_channels as usize;
    let mut input = vec![0_i16; frame_size];
    let mut processed = vec![0_i16; frame_size];
    let mut output = vec![0_i16; frame_size * channels];
    let mut stats = PipelineStats {
        frame_size,
        ..PipelineStats::default()
    };

    while !ctx.shutdown.load(Ordering::Acquire) {
        let n = match capture.read(&mut input) {
            Ok(0) => {
                stats.read_timeouts += 1;
                continue;
            }
            Ok(n) => n,
            Err(err) => {
                log_audio_error(&err, "stream_read");
                break;
            }
        };

        ctx.processor.reload(&ctx.params);
        ctx.processor.process(&input[..n], &mut processed[..n]);

        let samples = if channels == 1 {
            &processed[..n]
        } else {
            for (pair, &sample) in output.chunks_exact_mut(channels).zip(&processed[..n]) {
                pair.fill(sample);
            }
            &output[..n * channels]
        };

        match playback.write(samples) {
            Ok(()) => stats.frames_processed += 1,
            Err(err) => {
                log_audio_error(&err, "stream_write");
                stats.frames_dropped += 1;
                if !err.is_transient() {
                    break;
                }
            }
        }

        let total = stats.frames_processed + stats.frames_dropped;
        if ctx.stats_every > 0 && total % ctx.stats_every == 0 {
            stats.params_generation = ctx.processor.generation;
            // No subscribers is fine
            let _ = ctx.stats_tx.send(stats);
        }
    }

    stats.params_generation = ctx.processor.generation;
    let _ = ctx.stats_tx.send(stats);
    tracing::info!(
        "[AudioPipeline] Worker exiting: {} frames processed, {} dropped",
        stats.frames_processed,
        stats.frames_dropped
    );
    // Devices are released here, after the loop, even when stop() timed out
    drop(playback);
    drop(capture);
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
