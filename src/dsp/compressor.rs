//! MultiBandCompressor - per-band wide dynamic range compression
//!
//! Each captured sample is optionally gated, split into bands by the
//! [`Crossover`], and every band is scaled by
//!
//! ```text
//! gain = 10^((gain_db - reduction) / 20)
//! reduction = (env_db - threshold_db) * (1 - 1/ratio)   when env_db > threshold_db
//! env_db = reference_db + 20 log10(envelope)
//! ```
//!
//! The bands are summed and hard-clipped to 16-bit. All state lives in the
//! instance; two compressors fed the same parameters and input produce the
//! same output.

use super::crossover::Crossover;
use super::envelope::EnvelopeFollower;
use super::params::{BandCompressorParams, CompressorParams};
use crate::error::AudioError;

/// Scale between i16 samples and normalized floats
const PCM_SCALE: f32 = 32_768.0;

#[derive(Debug, Clone)]
struct BandState {
    params: BandCompressorParams,
    follower: EnvelopeFollower,
}

impl BandState {
    fn new(sample_rate: f32, params: BandCompressorParams) -> Self {
        Self {
            follower: EnvelopeFollower::new(sample_rate, params.attack_seconds, params.release_seconds),
            params,
        }
    }

    #[inline]
    fn process(&mut self, sample: f32, reference_db: f32) -> f32 {
        let envelope = self.follower.process(sample);
        let envelope_db = reference_db + 20.0 * envelope.log10();
        let ratio = if self.params.ratio > 0.0 {
            self.params.ratio
        } else {
            1.0
        };

        let reduction = if envelope_db > self.params.threshold_db {
            (envelope_db - self.params.threshold_db) * (1.0 - 1.0 / ratio)
        } else {
            0.0
        };
        sample * db_to_linear(self.params.gain_db - reduction)
    }
}

#[inline]
fn db_to_linear(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// Convert a normalized sample back to 16-bit with hard clipping
#[inline]
pub fn to_pcm(sample: f32) -> i16 {
    (sample * PCM_SCALE).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

#[inline]
pub fn from_pcm(sample: i16) -> f32 {
    sample as f32 / PCM_SCALE
}

/// Global-multiplier processing used when no per-band fitting is active
pub fn amplify(input: &[i16], output: &mut [i16], factor: f32) {
    for (out, &sample) in output.iter_mut().zip(input) {
        *out = to_pcm((from_pcm(sample) * factor).clamp(-1.0, 1.0));
    }
}

pub struct MultiBandCompressor {
    sample_rate: f32,
    reference_db: f32,
    noise_gate: f32,
    crossover: Crossover,
    bands: Vec<BandState>,
    split: Vec<f32>,
}

impl MultiBandCompressor {
    /// # Arguments
    /// * `split_hz` - crossover points; `params` must hold one more band
    /// * `reference_db` - dB value of a full-scale envelope
    ///
    /// # Errors
    /// `InvalidParameters` for invalid crossover points or a band count that
    /// does not match them.
    pub fn new(
        sample_rate: u32,
        split_hz: &[f32],
        params: &CompressorParams,
        reference_db: f32,
    ) -> Result<Self, AudioError> {
        let sample_rate = sample_rate as f32;
        let crossover = Crossover::new(sample_rate, split_hz)?;
        params.validate()?;
        if params.len() != crossover.bands() {
            return Err(AudioError::InvalidParameters {
                reason: format!(
                    "{} band parameters for {} crossover bands",
                    params.len(),
                    crossover.bands()
                ),
            });
        }

        Ok(Self {
            split: vec![0.0; crossover.bands()],
            bands: params
                .bands
                .iter()
                .map(|p| BandState::new(sample_rate, *p))
                .collect(),
            crossover,
            sample_rate,
            reference_db,
            noise_gate: 0.0,
        })
    }

    /// Zero samples whose normalized magnitude is below `threshold`
    pub fn with_noise_gate(mut self, threshold: f32) -> Self {
        self.noise_gate = threshold.max(0.0);
        self
    }

    pub fn bands(&self) -> usize {
        self.bands.len()
    }

    /// Install new band parameters, keeping filter and envelope state
    ///
    /// # Errors
    /// `InvalidParameters` when the band count differs; the old parameters stay.
    pub fn set_params(&mut self, params: &CompressorParams) -> Result<(), AudioError> {
        params.validate()?;
        if params.len() != self.bands.len() {
            return Err(AudioError::InvalidParameters {
                reason: format!(
                    "expected {} bands, got {}",
                    self.bands.len(),
                    params.len()
                ),
            });
        }
        for (state, new) in self.bands.iter_mut().zip(&params.bands) {
            state
                .follower
                .set_times(self.sample_rate, new.attack_seconds, new.release_seconds);
            state.params = *new;
        }
        Ok(())
    }

    pub fn params(&self) -> CompressorParams {
        CompressorParams {
            bands: self.bands.iter().map(|b| b.params).collect(),
        }
    }

    /// Process one normalized sample
    #[inline]
    pub fn process_sample(&mut self, sample: f32) -> f32 {
        let sample = if sample.abs() < self.noise_gate {
            0.0
        } else {
            sample
        };

        self.crossover.split(sample, &mut self.split);
        let mut sum = 0.0;
        for (band, component) in self.bands.iter_mut().zip(&self.split) {
            sum += band.process(*component, self.reference_db);
        }
        sum
    }

    /// Process a 16-bit frame; `output` must be at least as long as `input`
    pub fn process(&mut self, input: &[i16], output: &mut [i16]) {
        for (out, &sample) in output.iter_mut().zip(input) {
            *out = to_pcm(self.process_sample(from_pcm(sample)));
        }
    }

    /// Clear filter and envelope history
    pub fn reset(&mut self) {
        self.crossover.reset();
        for band in &mut self.bands {
            band.follower.reset();
        }
    }
}

#[cfg(test)]
#[path = "compressor_tests.rs"]
mod tests;
