// Compressor parameter snapshots

use serde::{Deserialize, Serialize};

use crate::error::AudioError;

/// Dynamics settings for one frequency band
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct BandCompressorParams {
    /// Envelope level (dB, full scale = reference) above which compression starts
    pub threshold_db: f32,
    pub ratio: f32,
    pub attack_seconds: f32,
    pub release_seconds: f32,
    /// Static make-up gain applied regardless of level
    pub gain_db: f32,
}

impl BandCompressorParams {
    /// Degenerate band: unity gain, no compression
    pub fn passthrough() -> Self {
        Self {
            ratio: 1.0,
            ..Self::default()
        }
    }

    fn validate(&self, band: usize) -> Result<(), AudioError> {
        let fields = [
            self.threshold_db,
            self.ratio,
            self.attack_seconds,
            self.release_seconds,
            self.gain_db,
        ];
        if fields.iter().any(|v| !v.is_finite()) {
            return Err(AudioError::InvalidParameters {
                reason: format!("band {} has a non-finite value", band),
            });
        }
        if self.attack_seconds < 0.0 || self.release_seconds < 0.0 {
            return Err(AudioError::InvalidParameters {
                reason: format!("band {} has a negative time constant", band),
            });
        }
        Ok(())
    }
}

/// Immutable per-band parameter set installed as one unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CompressorParams {
    pub bands: Vec<BandCompressorParams>,
}

impl CompressorParams {
    /// Build from the five parallel per-band arrays of the control surface
    ///
    /// # Errors
    /// `InvalidParameters` when the arrays are empty, differ in length, or
    /// hold non-finite or negative-time values.
    pub fn from_arrays(
        threshold_db: &[f32],
        ratio: &[f32],
        attack_seconds: &[f32],
        release_seconds: &[f32],
        gain_db: &[f32],
    ) -> Result<Self, AudioError> {
        let len = threshold_db.len();
        let lengths = [
            ratio.len(),
            attack_seconds.len(),
            release_seconds.len(),
            gain_db.len(),
        ];
        if len == 0 || lengths.iter().any(|l| *l != len) {
            return Err(AudioError::InvalidParameters {
                reason: format!(
                    "band arrays must be non-empty and equal length, got {} / {:?}",
                    len, lengths
                ),
            });
        }

        let params = Self {
            bands: (0..len)
                .map(|i| BandCompressorParams {
                    threshold_db: threshold_db[i],
                    ratio: ratio[i],
                    attack_seconds: attack_seconds[i],
                    release_seconds: release_seconds[i],
                    gain_db: gain_db[i],
                })
                .collect(),
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), AudioError> {
        if self.bands.is_empty() {
            return Err(AudioError::InvalidParameters {
                reason: "no bands".to_string(),
            });
        }
        for (i, band) in self.bands.iter().enumerate() {
            band.validate(i)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    pub fn threshold_db(&self) -> Vec<f32> {
        self.bands.iter().map(|b| b.threshold_db).collect()
    }

    pub fn ratio(&self) -> Vec<f32> {
        self.bands.iter().map(|b| b.ratio).collect()
    }

    pub fn attack_seconds(&self) -> Vec<f32> {
        self.bands.iter().map(|b| b.attack_seconds).collect()
    }

    pub fn release_seconds(&self) -> Vec<f32> {
        self.bands.iter().map(|b| b.release_seconds).collect()
    }

    pub fn gain_db(&self) -> Vec<f32> {
        self.bands.iter().map(|b| b.gain_db).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arrays_round_trip_exactly() {
        let params = CompressorParams::from_arrays(
            &[40.0, 45.5, 50.0],
            &[2.0, 2.0, 3.0],
            &[0.005, 0.005, 0.01],
            &[0.05, 0.05, 0.1],
            &[10.0, 12.5, 15.0],
        )
        .unwrap();

        assert_eq!(params.threshold_db(), vec![40.0, 45.5, 50.0]);
        assert_eq!(params.ratio(), vec![2.0, 2.0, 3.0]);
        assert_eq!(params.attack_seconds(), vec![0.005, 0.005, 0.01]);
        assert_eq!(params.release_seconds(), vec![0.05, 0.05, 0.1]);
        assert_eq!(params.gain_db(), vec![10.0, 12.5, 15.0]);
    }

    #[test]
    fn test_mismatched_lengths_rejected() {
        let err = CompressorParams::from_arrays(&[1.0, 2.0], &[2.0], &[0.0, 0.0], &[0.0, 0.0], &[0.0, 0.0])
            .unwrap_err();
        assert!(matches!(err, AudioError::InvalidParameters { .. }));
        assert!(CompressorParams::from_arrays(&[], &[], &[], &[], &[]).is_err());
    }

    #[test]
    fn test_non_finite_or_negative_values_rejected() {
        assert!(CompressorParams::from_arrays(&[f32::NAN], &[2.0], &[0.0], &[0.0], &[0.0]).is_err());
        assert!(CompressorParams::from_arrays(&[0.0], &[2.0], &[-0.1], &[0.0], &[0.0]).is_err());
    }
}
