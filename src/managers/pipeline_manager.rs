// PipelineManager: control-surface wrapper around the AudioPipeline
//
// Single Responsibility: start/stop/toggle and parameter installation.
// The toggle is debounced so a double tap in the UI does not start and
// immediately stop the devices.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

use crate::audio::{AudioBackend, AudioPipeline, PipelineParams, PipelineStats};
use crate::config::AudioConfig;
use crate::dsp::CompressorParams;
use crate::error::{log_audio_error, AudioError};
use crate::scheduler::TimeSource;

/// Toggle calls closer together than this are ignored
pub const TOGGLE_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Started,
    Stopped,
    /// Within the debounce window of the previous toggle
    Ignored,
}

pub struct PipelineManager {
    pipeline: AudioPipeline,
    clock: Arc<dyn TimeSource>,
    last_toggle: Mutex<Option<Instant>>,
}

impl PipelineManager {
    pub fn new(
        backend: Arc<dyn AudioBackend>,
        config: AudioConfig,
        split_hz: Vec<f32>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            pipeline: AudioPipeline::new(backend, config, split_hz),
            clock,
            last_toggle: Mutex::new(None),
        }
    }

    fn lock_last_toggle(&self) -> Result<MutexGuard<'_, Option<Instant>>, AudioError> {
        self.last_toggle.lock().map_err(|_| AudioError::LockPoisoned {
            component: "toggle_debounce".to_string(),
        })
    }

    pub fn start(&self) -> Result<(), AudioError> {
        self.pipeline.start()
    }

    pub fn stop(&self) -> Result<(), AudioError> {
        self.pipeline.stop()
    }

    pub fn is_running(&self) -> bool {
        self.pipeline.is_running()
    }

    /// Start when stopped, stop when running; debounced
    pub fn toggle(&self) -> Result<ToggleOutcome, AudioError> {
        {
            let now = self.clock.now();
            let mut last = self.lock_last_toggle()?;
            if let Some(previous) = *last {
                if now.saturating_duration_since(previous) < TOGGLE_DEBOUNCE {
                    tracing::debug!("[PipelineManager] Toggle ignored (debounce)");
                    return Ok(ToggleOutcome::Ignored);
                }
            }
            *last = Some(now);
        }

        if self.pipeline.is_running() {
            self.pipeline.stop()?;
            Ok(ToggleOutcome::Stopped)
        } else {
            self.pipeline.start()?;
            Ok(ToggleOutcome::Started)
        }
    }

    pub fn set_permission_granted(&self, granted: bool) {
        tracing::info!("[PipelineManager] Microphone permission granted: {}", granted);
        self.pipeline.set_permission_granted(granted);
    }

    /// Install parameters given as the five parallel per-band arrays
    pub fn update_params_from_arrays(
        &self,
        threshold_db: &[f32],
        ratio: &[f32],
        attack_seconds: &[f32],
        release_seconds: &[f32],
        gain_db: &[f32],
    ) -> Result<(), AudioError> {
        let params = CompressorParams::from_arrays(
            threshold_db,
            ratio,
            attack_seconds,
            release_seconds,
            gain_db,
        )
        .map_err(|err| {
            log_audio_error(&err, "update_params");
            err
        })?;
        self.pipeline.update_params(params)
    }

    pub fn update_params(&self, params: CompressorParams) -> Result<(), AudioError> {
        self.pipeline.update_params(params)
    }

    pub fn set_amplification(&self, factor: f32) -> Result<(), AudioError> {
        self.pipeline.set_amplification(factor)
    }

    pub fn active_params(&self) -> Result<Arc<PipelineParams>, AudioError> {
        self.pipeline.active_params()
    }

    pub fn band_count(&self) -> usize {
        self.pipeline.band_count()
    }

    pub fn subscribe_stats(&self) -> broadcast::Receiver<PipelineStats> {
        self.pipeline.subscribe_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::StubBackend;
    use crate::scheduler::ManualClock;

    fn manager(clock: Arc<ManualClock>) -> PipelineManager {
        let config = AudioConfig {
            fallback_min_buffer_frames: 8,
            buffer_size_factor: 2,
            read_timeout_ms: 2,
            assume_permission_granted: true,
            ..AudioConfig::default()
        };
        PipelineManager::new(
            Arc::new(StubBackend::looping(vec![0; 64])),
            config,
            vec![1_000.0],
            clock,
        )
    }

    #[test]
    fn test_toggle_is_debounced() {
        let clock = Arc::new(ManualClock::new());
        let manager = manager(clock.clone());

        assert_eq!(manager.toggle().unwrap(), ToggleOutcome::Started);
        clock.advance(Duration::from_millis(100));
        assert_eq!(manager.toggle().unwrap(), ToggleOutcome::Ignored);
        assert!(manager.is_running());

        clock.advance(Duration::from_millis(500));
        assert_eq!(manager.toggle().unwrap(), ToggleOutcome::Stopped);
        assert!(!manager.is_running());
    }

    #[test]
    fn test_update_params_from_arrays() {
        let manager = manager(Arc::new(ManualClock::new()));
        manager
            .update_params_from_arrays(
                &[50.0, 60.0],
                &[2.0, 3.0],
                &[0.01, 0.01],
                &[0.1, 0.1],
                &[10.0, 20.0],
            )
            .unwrap();
        let active = manager.active_params().unwrap();
        let params = active.compressor().unwrap();
        assert_eq!(params.threshold_db(), vec![50.0, 60.0]);
        assert_eq!(params.ratio(), vec![2.0, 3.0]);
        assert_eq!(params.attack_seconds(), vec![0.01, 0.01]);
        assert_eq!(params.release_seconds(), vec![0.1, 0.1]);
        assert_eq!(params.gain_db(), vec![10.0, 20.0]);

        // Mismatched lengths keep the previous snapshot
        assert!(manager
            .update_params_from_arrays(&[1.0], &[1.0, 2.0], &[0.0], &[0.0], &[0.0])
            .is_err());
        assert_eq!(
            manager.active_params().unwrap().compressor().unwrap().gain_db(),
            vec![10.0, 20.0]
        );
    }

    #[test]
    fn test_permission_gates_start() {
        let manager = manager(Arc::new(ManualClock::new()));
        manager.set_permission_granted(false);
        assert_eq!(manager.start(), Err(AudioError::PermissionDenied));
        assert_eq!(manager.toggle(), Err(AudioError::PermissionDenied));
    }
}
