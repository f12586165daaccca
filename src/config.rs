//! Configuration management for the hearing amplifier
//!
//! This module provides runtime configuration loading from JSON files so
//! clinicians can adjust audio buffering, test pacing and fitting defaults
//! without recompiling. Every section has defaults; a missing or broken file
//! falls back to them.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::audiometry::{EarOrder, PresentationMode, ReversalRule};
use crate::calibration::TEST_FREQUENCIES_HZ;
use crate::fitting::{EarSelection, FrequencyBand};

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub procedure: ProcedureConfig,
    pub fitting: FittingConfig,
    pub storage: StorageConfig,
}

/// Audio pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Capture and playback sample rate in Hz
    pub sample_rate: u32,
    /// Frame size = device minimum buffer x this factor
    pub buffer_size_factor: usize,
    /// Minimum buffer used when the device does not report one
    pub fallback_min_buffer_frames: usize,
    /// 1 = mono playback, 2 = stereo (mono signal duplicated)
    pub playback_channels: u16,
    /// Pre-allocated capture buffers shared with the device callback
    pub buffer_pool_size: usize,
    /// How long `start()` waits for both devices to report ready
    pub start_timeout_ms: u64,
    /// Bound on joining the streaming worker in `stop()`
    pub shutdown_timeout_ms: u64,
    /// Longest a single capture read may wait before the loop re-checks shutdown
    pub read_timeout_ms: u64,
    /// Publish pipeline stats every N frames (0 disables)
    pub stats_every_n_frames: u64,
    /// Samples below this normalized magnitude are zeroed (0 disables)
    pub noise_gate_threshold: f32,
    /// dB value of a full-scale envelope
    pub reference_db: f32,
    /// Whether microphone access is assumed granted at startup
    pub assume_permission_granted: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            buffer_size_factor: 8,
            fallback_min_buffer_frames: 256,
            playback_channels: 1,
            buffer_pool_size: 16,
            start_timeout_ms: 2_000,
            shutdown_timeout_ms: 1_000,
            read_timeout_ms: 50,
            stats_every_n_frames: 100,
            noise_gate_threshold: 0.0,
            reference_db: 100.0,
            // Android grants the permission through the UI layer
            assume_permission_granted: !cfg!(target_os = "android"),
        }
    }
}

/// Threshold and MCL procedure configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcedureConfig {
    /// Test frequencies in presentation order
    pub frequencies_hz: Vec<f32>,
    pub ear_order: EarOrder,
    pub presentation_mode: PresentationMode,
    /// Staircase starting level (dB HL)
    pub start_level_db_hl: i32,
    /// Step size per scored response; the last entry repeats
    pub step_sizes_db: Vec<i32>,
    /// Reversals needed before the threshold is averaged
    pub reversals_required: usize,
    pub reversal_rule: ReversalRule,
    pub min_level_db_hl: i32,
    pub max_level_db_hl: i32,
    /// HL level presented exactly at the calibrated desired SPL
    pub hl_reference_db: f32,
    /// Duration of one shape/tone segment in a threshold trial
    pub tone_segment_ms: u64,
    /// MCL starting level (dB HL)
    pub comfort_start_level_db_hl: f32,
    /// Same-level "most comfortable" answers needed to finalize
    pub comfort_consistency_count: u32,
    pub comfort_tone_ms: u64,
    /// Number of tone bursts per MCL presentation
    pub comfort_tone_repeats: u32,
    /// Fixed RNG seed for reproducible stimulus order
    pub seed: Option<u64>,
}

impl Default for ProcedureConfig {
    fn default() -> Self {
        Self {
            frequencies_hz: TEST_FREQUENCIES_HZ.to_vec(),
            ear_order: EarOrder::LeftThenRight,
            presentation_mode: PresentationMode::DualShape,
            start_level_db_hl: 50,
            step_sizes_db: vec![20, 10, 5],
            reversals_required: 4,
            reversal_rule: ReversalRule::NotFirstTrial,
            min_level_db_hl: 0,
            max_level_db_hl: 100,
            hl_reference_db: 70.0,
            tone_segment_ms: 2_000,
            comfort_start_level_db_hl: 50.0,
            comfort_consistency_count: 3,
            comfort_tone_ms: 1_000,
            comfort_tone_repeats: 3,
            seed: None,
        }
    }
}

/// Per-test choices made by the clinician when a test starts
///
/// Anything left unset keeps the [`ProcedureConfig`] value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestOptions {
    /// Frequencies to test in order; empty keeps the configured list
    pub frequencies_hz: Vec<f32>,
    pub ear_order: Option<EarOrder>,
    pub presentation_mode: Option<PresentationMode>,
}

impl ProcedureConfig {
    /// Copy of this configuration with one test's overrides applied
    pub fn with_options(&self, options: &TestOptions) -> ProcedureConfig {
        let mut config = self.clone();
        if !options.frequencies_hz.is_empty() {
            config.frequencies_hz = options.frequencies_hz.clone();
        }
        if let Some(ear_order) = options.ear_order {
            config.ear_order = ear_order;
        }
        if let Some(mode) = options.presentation_mode {
            config.presentation_mode = mode;
        }
        config
    }
}

/// Band parameter derivation defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FittingConfig {
    pub bands: Vec<FrequencyBand>,
    pub ratio: f32,
    pub attack_seconds: f32,
    pub release_seconds: f32,
    pub ear_selection: EarSelection,
}

impl Default for FittingConfig {
    fn default() -> Self {
        Self {
            bands: FrequencyBand::default_bands(),
            ratio: 2.0,
            attack_seconds: 0.005,
            release_seconds: 0.05,
            ear_selection: EarSelection::Combined,
        }
    }
}

/// Profile store location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("hearing_amp_data"),
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The parsed configuration, or defaults if the file is missing or invalid
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration on Android
    ///
    /// Bundled assets are only reachable through the AssetManager, so the
    /// defaults are used until the UI layer pushes overrides.
    #[cfg(target_os = "android")]
    pub fn load_android() -> Self {
        log::info!("[Config] Using default configuration on Android");
        Self::default()
    }

    /// Load configuration for non-Android platforms
    #[cfg(not(target_os = "android"))]
    pub fn load() -> Self {
        Self::load_from_file("assets/hearing_amp_config.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.audio.sample_rate, 44_100);
        assert_eq!(config.audio.buffer_size_factor, 8);
        assert_eq!(config.procedure.start_level_db_hl, 50);
        assert_eq!(config.procedure.step_sizes_db, vec![20, 10, 5]);
        assert_eq!(config.procedure.frequencies_hz.len(), 10);
        assert_eq!(config.fitting.bands.len(), 4);
        assert_eq!(config.fitting.ratio, 2.0);
    }

    #[test]
    fn test_options_override_only_what_they_set() {
        let base = ProcedureConfig::default();
        assert_eq!(
            base.with_options(&TestOptions::default()).frequencies_hz,
            base.frequencies_hz
        );

        let config = base.with_options(&TestOptions {
            frequencies_hz: vec![4_000.0, 500.0],
            ear_order: Some(EarOrder::RightOnly),
            presentation_mode: None,
        });
        assert_eq!(config.frequencies_hz, vec![4_000.0, 500.0]);
        assert_eq!(config.ear_order, EarOrder::RightOnly);
        assert_eq!(config.presentation_mode, base.presentation_mode);
        assert_eq!(config.step_sizes_db, base.step_sizes_db);
    }

    #[test]
    fn test_json_roundtrip() {
        let config = AppConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.audio.shutdown_timeout_ms, config.audio.shutdown_timeout_ms);
        assert_eq!(parsed.procedure.reversal_rule, config.procedure.reversal_rule);
        assert_eq!(parsed.fitting.bands, config.fitting.bands);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let parsed: AppConfig =
            serde_json::from_str(r#"{"procedure": {"ear_order": "RightOnly"}}"#).unwrap();
        assert_eq!(parsed.procedure.ear_order, EarOrder::RightOnly);
        assert_eq!(parsed.procedure.start_level_db_hl, 50);
        assert_eq!(parsed.audio.sample_rate, 44_100);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = AppConfig::load_from_file("/nonexistent/hearing_amp_config.json");
        assert_eq!(config.audio.playback_channels, 1);
    }
}
