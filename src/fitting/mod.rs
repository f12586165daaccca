//! Fitting module - turns audiometry results into compressor settings
//!
//! Test frequencies are grouped into a small number of aggregation bands.
//! For each band the deriver averages the hearing thresholds and, separately,
//! the most comfortable levels that fall inside it; the gap between the two
//! becomes the band's make-up gain.

use serde::{Deserialize, Serialize};

use crate::audiometry::{Ear, TestResultRecord, TestType};
use crate::config::FittingConfig;
use crate::dsp::{BandCompressorParams, CompressorParams};
use crate::error::AudioError;

/// Aggregation band with inclusive bounds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyBand {
    pub index: usize,
    pub low_hz: f32,
    pub high_hz: f32,
}

impl FrequencyBand {
    pub fn contains(&self, frequency_hz: f32) -> bool {
        frequency_hz >= self.low_hz && frequency_hz <= self.high_hz
    }

    /// 250-750, 751-1500, 1501-3000 and 3001-8000 Hz
    pub fn default_bands() -> Vec<Self> {
        [(250.0, 750.0), (751.0, 1_500.0), (1_501.0, 3_000.0), (3_001.0, 8_000.0)]
            .iter()
            .enumerate()
            .map(|(index, &(low_hz, high_hz))| Self {
                index,
                low_hz,
                high_hz,
            })
            .collect()
    }
}

/// Which ears contribute to a band average
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EarSelection {
    #[default]
    Combined,
    Left,
    Right,
}

impl EarSelection {
    pub fn includes(&self, ear: Ear) -> bool {
        match self {
            EarSelection::Combined => true,
            EarSelection::Left => ear == Ear::Left,
            EarSelection::Right => ear == Ear::Right,
        }
    }
}

/// Aggregates threshold and MCL records into per-band compressor parameters
#[derive(Debug, Clone)]
pub struct BandParameterDeriver {
    bands: Vec<FrequencyBand>,
    ratio: f32,
    attack_seconds: f32,
    release_seconds: f32,
    ear_selection: EarSelection,
}

impl Default for BandParameterDeriver {
    /// Default bands with the default dynamics
    fn default() -> Self {
        let config = FittingConfig::default();
        Self {
            bands: config.bands,
            ratio: config.ratio,
            attack_seconds: config.attack_seconds,
            release_seconds: config.release_seconds,
            ear_selection: config.ear_selection,
        }
    }
}

impl BandParameterDeriver {
    /// # Errors
    /// `InvalidParameters` when bands are empty, inverted or overlapping, or
    /// the dynamics defaults are not finite.
    pub fn new(config: &FittingConfig) -> Result<Self, AudioError> {
        let invalid = |reason: String| AudioError::InvalidParameters { reason };

        if config.bands.is_empty() {
            return Err(invalid("no fitting bands configured".to_string()));
        }
        for band in &config.bands {
            if !(band.low_hz.is_finite() && band.high_hz.is_finite() && band.low_hz <= band.high_hz)
            {
                return Err(invalid(format!("band {} has inverted bounds", band.index)));
            }
        }
        for pair in config.bands.windows(2) {
            if pair[1].low_hz <= pair[0].high_hz {
                return Err(invalid(format!(
                    "bands {} and {} overlap or are out of order",
                    pair[0].index, pair[1].index
                )));
            }
        }
        let dynamics = [config.ratio, config.attack_seconds, config.release_seconds];
        if dynamics.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(invalid("ratio and time constants must be finite and >= 0".to_string()));
        }

        Ok(Self {
            bands: config.bands.clone(),
            ratio: config.ratio,
            attack_seconds: config.attack_seconds,
            release_seconds: config.release_seconds,
            ear_selection: config.ear_selection,
        })
    }

    pub fn with_ear_selection(mut self, ear_selection: EarSelection) -> Self {
        self.ear_selection = ear_selection;
        self
    }

    pub fn bands(&self) -> &[FrequencyBand] {
        &self.bands
    }

    /// Crossover frequencies separating adjacent bands
    pub fn crossover_points(&self) -> Vec<f32> {
        self.bands
            .windows(2)
            .map(|pair| (pair[0].high_hz + pair[1].low_hz) / 2.0)
            .collect()
    }

    /// Derive one parameter set from every threshold and MCL record given
    ///
    /// Bands without at least one threshold and one MCL sample come out as
    /// all-zero parameters.
    pub fn derive(&self, records: &[TestResultRecord]) -> CompressorParams {
        CompressorParams {
            bands: self
                .bands
                .iter()
                .map(|band| self.derive_band(band, records))
                .collect(),
        }
    }

    fn derive_band(&self, band: &FrequencyBand, records: &[TestResultRecord]) -> BandCompressorParams {
        let threshold = self.band_mean(band, records, TestType::Threshold);
        let mcl = self.band_mean(band, records, TestType::Mcl);

        match (threshold, mcl) {
            (Some(threshold_db), Some(mcl_db)) => BandCompressorParams {
                threshold_db,
                ratio: self.ratio,
                attack_seconds: self.attack_seconds,
                release_seconds: self.release_seconds,
                gain_db: mcl_db - threshold_db,
            },
            _ => {
                tracing::debug!(
                    "[Fitting] Band {} ({}-{} Hz) has no samples, using zero parameters",
                    band.index,
                    band.low_hz,
                    band.high_hz
                );
                BandCompressorParams::default()
            }
        }
    }

    fn band_mean(
        &self,
        band: &FrequencyBand,
        records: &[TestResultRecord],
        test_type: TestType,
    ) -> Option<f32> {
        let levels: Vec<f32> = records
            .iter()
            .filter(|r| r.test_type == test_type)
            .flat_map(|r| r.results.iter())
            .filter(|r| self.ear_selection.includes(r.ear) && band.contains(r.frequency_hz))
            .map(|r| r.final_level)
            .collect();

        if levels.is_empty() {
            None
        } else {
            Some(levels.iter().sum::<f32>() / levels.len() as f32)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audiometry::{FrequencyResult, RecordHeader};

    fn record(test_type: TestType, levels: &[(f32, Ear, f32)]) -> TestResultRecord {
        TestResultRecord {
            header: RecordHeader::default(),
            test_type,
            results: levels
                .iter()
                .map(|&(frequency_hz, ear, final_level)| FrequencyResult {
                    frequency_hz,
                    ear,
                    final_level,
                    level_history: vec![final_level],
                })
                .collect(),
        }
    }

    fn deriver() -> BandParameterDeriver {
        BandParameterDeriver::new(&FittingConfig::default()).unwrap()
    }

    #[test]
    fn test_gain_is_mcl_minus_threshold_per_band() {
        let thresholds = record(
            TestType::Threshold,
            &[
                (250.0, Ear::Left, 20.0),
                (500.0, Ear::Left, 30.0),
                (1_000.0, Ear::Left, 40.0),
            ],
        );
        let mcls = record(
            TestType::Mcl,
            &[
                (250.0, Ear::Left, 60.0),
                (750.0, Ear::Left, 70.0),
                (1_000.0, Ear::Left, 65.0),
            ],
        );

        let params = deriver().derive(&[thresholds, mcls]);
        assert_eq!(params.len(), 4);

        let low = params.bands[0];
        assert_eq!(low.threshold_db, 25.0);
        assert_eq!(low.gain_db, 40.0);
        assert_eq!(low.ratio, 2.0);
        assert_eq!(low.attack_seconds, 0.005);
        assert_eq!(low.release_seconds, 0.05);

        assert_eq!(params.bands[1].threshold_db, 40.0);
        assert_eq!(params.bands[1].gain_db, 25.0);
    }

    #[test]
    fn test_band_without_samples_is_all_zero() {
        let thresholds = record(TestType::Threshold, &[(4_000.0, Ear::Right, 50.0)]);
        let params = deriver().derive(&[thresholds]);
        assert!(params
            .bands
            .iter()
            .all(|b| *b == BandCompressorParams::default()));
    }

    #[test]
    fn test_ear_selection_filters_samples() {
        let thresholds = record(
            TestType::Threshold,
            &[(2_000.0, Ear::Left, 10.0), (2_000.0, Ear::Right, 30.0)],
        );
        let mcls = record(
            TestType::Mcl,
            &[(2_000.0, Ear::Left, 50.0), (2_000.0, Ear::Right, 70.0)],
        );
        let records = [thresholds, mcls];

        let combined = deriver().derive(&records);
        assert_eq!(combined.bands[2].threshold_db, 20.0);
        assert_eq!(combined.bands[2].gain_db, 40.0);

        let right = deriver().with_ear_selection(EarSelection::Right).derive(&records);
        assert_eq!(right.bands[2].threshold_db, 30.0);
        assert_eq!(right.bands[2].gain_db, 40.0);
    }

    #[test]
    fn test_band_bounds_are_inclusive() {
        let bands = FrequencyBand::default_bands();
        assert!(bands[0].contains(750.0));
        assert!(!bands[1].contains(750.0));
        assert!(bands[3].contains(8_000.0));
        assert!(!bands[3].contains(8_001.0));
    }

    #[test]
    fn test_crossover_points_sit_between_bands() {
        assert_eq!(deriver().crossover_points(), vec![750.5, 1_500.5, 3_000.5]);
    }

    #[test]
    fn test_default_matches_default_config() {
        let default = BandParameterDeriver::default();
        assert_eq!(default.bands(), deriver().bands());
        assert_eq!(default.crossover_points(), deriver().crossover_points());
    }

    #[test]
    fn test_overlapping_bands_rejected() {
        let config = FittingConfig {
            bands: vec![
                FrequencyBand {
                    index: 0,
                    low_hz: 250.0,
                    high_hz: 1_000.0,
                },
                FrequencyBand {
                    index: 1,
                    low_hz: 900.0,
                    high_hz: 2_000.0,
                },
            ],
            ..FittingConfig::default()
        };
        assert!(BandParameterDeriver::new(&config).is_err());
    }
}
