// ToneBuffer - calibrated pure tone routed to one ear

use std::f32::consts::PI;

use super::traversal::Ear;

/// Interleaved stereo 16-bit sine tone with the silent ear zeroed
#[derive(Debug, Clone, PartialEq)]
pub struct ToneBuffer {
    pub frequency_hz: f32,
    pub amplitude: f32,
    pub ear: Ear,
    pub sample_rate: u32,
    samples: Vec<i16>,
}

impl ToneBuffer {
    /// Render `duration_ms` of a sine at `frequency_hz` scaled by `amplitude`
    ///
    /// `amplitude` is the linear gain from `calibration::amplitude` and is
    /// clamped to 0.0..=1.0.
    pub fn new(
        frequency_hz: f32,
        amplitude: f32,
        ear: Ear,
        duration_ms: u64,
        sample_rate: u32,
    ) -> Self {
        let amplitude = if amplitude.is_finite() {
            amplitude.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let frames = (sample_rate as u64 * duration_ms / 1000) as usize;
        let channel = ear.channel();
        let step = 2.0 * PI * frequency_hz / sample_rate as f32;

        let mut samples = vec![0i16; frames * 2];
        for (i, frame) in samples.chunks_exact_mut(2).enumerate() {
            let value = (step * i as f32).sin() * amplitude * i16::MAX as f32;
            frame[channel] = value.round() as i16;
        }

        Self {
            frequency_hz,
            amplitude,
            ear,
            sample_rate,
            samples,
        }
    }

    /// Interleaved L/R samples
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    pub fn duration_ms(&self) -> u64 {
        self.frames() as u64 * 1000 / self.sample_rate.max(1) as u64
    }

    /// Largest absolute sample on the tone's channel
    pub fn peak(&self) -> i16 {
        self.samples
            .iter()
            .skip(self.ear.channel())
            .step_by(2)
            .map(|s| s.saturating_abs())
            .max()
            .unwrap_or(0)
    }
}
