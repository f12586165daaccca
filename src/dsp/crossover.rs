//! Complementary band splitter.
//!
//! Each split point gets a 4th-order Linkwitz-Riley lowpass (two cascaded
//! Butterworth biquads). Bands are formed by subtraction:
//!
//! ```text
//! band[0]   = LP_0(x)
//! band[k]   = LP_k(x) - LP_{k-1}(x)
//! band[n-1] = x - LP_{n-2}(x)
//! ```
//!
//! so the bands always sum back to the input exactly.

use biquad::{Biquad, Coefficients, DirectForm1, ToHertz, Type, Q_BUTTERWORTH_F32};

use crate::error::AudioError;

#[derive(Debug, Clone)]
struct LinkwitzRiley {
    stages: [DirectForm1<f32>; 2],
}

impl LinkwitzRiley {
    fn lowpass(sample_rate: f32, cutoff_hz: f32) -> Result<Self, AudioError> {
        let coeffs = Coefficients::<f32>::from_params(
            Type::LowPass,
            sample_rate.hz(),
            cutoff_hz.hz(),
            Q_BUTTERWORTH_F32,
        )
        .map_err(|err| AudioError::InvalidParameters {
            reason: format!("crossover at {} Hz: {:?}", cutoff_hz, err),
        })?;

        Ok(Self {
            stages: [DirectForm1::<f32>::new(coeffs), DirectForm1::<f32>::new(coeffs)],
        })
    }

    #[inline]
    fn run(&mut self, input: f32) -> f32 {
        let first = self.stages[0].run(input);
        self.stages[1].run(first)
    }

    fn reset(&mut self) {
        for stage in &mut self.stages {
            stage.reset_state();
        }
    }
}

/// Splits a mono stream into `split_hz.len() + 1` bands
#[derive(Debug, Clone)]
pub struct Crossover {
    lowpasses: Vec<LinkwitzRiley>,
}

impl Crossover {
    /// # Errors
    /// `InvalidParameters` when split points are not strictly ascending or do
    /// not lie below Nyquist.
    pub fn new(sample_rate: f32, split_hz: &[f32]) -> Result<Self, AudioError> {
        let nyquist = sample_rate / 2.0;
        let mut previous = 0.0;
        for &hz in split_hz {
            if !(hz > previous && hz < nyquist) {
                return Err(AudioError::InvalidParameters {
                    reason: format!(
                        "crossover points must ascend below {} Hz, got {:?}",
                        nyquist, split_hz
                    ),
                });
            }
            previous = hz;
        }

        let lowpasses = split_hz
            .iter()
            .map(|&hz| LinkwitzRiley::lowpass(sample_rate, hz))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { lowpasses })
    }

    pub fn bands(&self) -> usize {
        self.lowpasses.len() + 1
    }

    /// Write one sample's band components into `out` (length `bands()`)
    #[inline]
    pub fn split(&mut self, input: f32, out: &mut [f32]) {
        let mut below = 0.0;
        for (band, lowpass) in self.lowpasses.iter_mut().enumerate() {
            let low = lowpass.run(input);
            out[band] = low - below;
            below = low;
        }
        out[self.lowpasses.len()] = input - below;
    }

    pub fn reset(&mut self) {
        for lowpass in &mut self.lowpasses {
            lowpass.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn test_bands_sum_to_input() {
        let mut crossover = Crossover::new(44_100.0, &[750.0, 1_500.0, 3_000.0]).unwrap();
        let mut bands = [0.0f32; 4];
        for i in 0..2_000 {
            let x = ((i * 7919) % 200) as f32 / 100.0 - 1.0;
            crossover.split(x, &mut bands);
            let sum: f32 = bands.iter().sum();
            assert!((sum - x).abs() < 1e-5, "sample {}: {} vs {}", i, sum, x);
        }
    }

    #[test]
    fn test_low_tone_lands_in_first_band() {
        let mut crossover = Crossover::new(44_100.0, &[750.0, 1_500.0, 3_000.0]).unwrap();
        let mut bands = [0.0f32; 4];
        let mut low = Vec::new();
        let mut high = Vec::new();
        for i in 0..8_820 {
            let x = (2.0 * PI * 100.0 * i as f32 / 44_100.0).sin();
            crossover.split(x, &mut bands);
            if i > 4_410 {
                low.push(bands[0]);
                high.push(bands[3]);
            }
        }
        assert!(rms(&low) > 0.6);
        // Subtraction leaks a little through phase shift, but the bulk stays low
        assert!(rms(&high) < 0.1);
    }

    #[test]
    fn test_single_band_passes_through() {
        let mut crossover = Crossover::new(44_100.0, &[]).unwrap();
        let mut bands = [0.0f32; 1];
        crossover.split(0.25, &mut bands);
        assert_eq!(bands[0], 0.25);
    }

    #[test]
    fn test_rejects_unordered_or_out_of_range_points() {
        assert!(Crossover::new(44_100.0, &[1_500.0, 750.0]).is_err());
        assert!(Crossover::new(44_100.0, &[30_000.0]).is_err());
        assert!(Crossover::new(44_100.0, &[0.0]).is_err());
    }
}
