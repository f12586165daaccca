// CalibrationTone - looping reference tone for SPL measurement

use crate::audiometry::{Ear, ToneBuffer};
use crate::calibration::spl::SplCalibrator;
use crate::error::CalibrationError;

/// Length of one loop of the calibration tone
pub const CALIBRATION_TONE_MS: u64 = 1_000;

/// Stereo sine for one table row, each ear at its own desired SPL
///
/// The player loops the buffer until told to stop, so the clinician can hold
/// a sound level meter to each earphone.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationTone {
    pub frequency_hz: f32,
    pub left_amplitude: f32,
    pub right_amplitude: f32,
    pub sample_rate: u32,
    samples: Vec<i16>,
}

impl CalibrationTone {
    /// # Errors
    /// `FrequencyIndexOutOfRange` when the profile has no row `freq_index`
    pub fn render(
        calibrator: &SplCalibrator,
        freq_index: usize,
        sample_rate: u32,
    ) -> Result<Self, CalibrationError> {
        let frequency_hz = calibrator.frequency_hz(freq_index)?;
        let left_amplitude = calibrator.calibration_amplitude(Ear::Left, freq_index)?;
        let right_amplitude = calibrator.calibration_amplitude(Ear::Right, freq_index)?;

        // Each ear's buffer is silent on the other channel, so they add up
        let left = ToneBuffer::new(
            frequency_hz,
            left_amplitude,
            Ear::Left,
            CALIBRATION_TONE_MS,
            sample_rate,
        );
        let right = ToneBuffer::new(
            frequency_hz,
            right_amplitude,
            Ear::Right,
            CALIBRATION_TONE_MS,
            sample_rate,
        );
        let samples = left
            .samples()
            .iter()
            .zip(right.samples())
            .map(|(l, r)| l.saturating_add(*r))
            .collect();

        Ok(Self {
            frequency_hz,
            left_amplitude: left.amplitude,
            right_amplitude: right.amplitude,
            sample_rate,
            samples,
        })
    }

    /// Interleaved L/R samples for one loop
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Largest absolute sample on `ear`'s channel
    pub fn peak(&self, ear: Ear) -> i16 {
        self.samples
            .iter()
            .skip(ear.channel())
            .step_by(2)
            .map(|s| s.saturating_abs())
            .max()
            .unwrap_or(0)
    }
}
