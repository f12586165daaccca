// SplCalibrator - dB SPL targets to linear playback gain
//
// The calibrator precomputes the desired-SPL table once per calibration
// profile and converts test levels (dB HL) into playback amplitudes.
// Every tone the crate renders goes through `amplitude()` so calibration,
// threshold and MCL tones share one conversion.

use crate::audiometry::Ear;
use crate::calibration::state::CalibrationTable;
use crate::error::CalibrationError;

/// SPL that maps to full-scale (amplitude 1.0) playback
pub const DEFAULT_REFERENCE_DB_SPL: f32 = 100.0;

/// HL level at which a tone is played exactly at the desired SPL
pub const DEFAULT_HL_REFERENCE_DB: f32 = 70.0;

/// Desired SPL used for frequencies missing from the profile
pub const FALLBACK_DESIRED_SPL: f32 = 70.0;

/// Convert a dB SPL target into a linear gain relative to `reference_db_spl`
///
/// Returns `clamp(10^((desired - reference) / 20), 0, 1)`.
pub fn amplitude(desired_db_spl: f32, reference_db_spl: f32) -> f32 {
    let gain = 10f32.powf((desired_db_spl - reference_db_spl) / 20.0);
    if gain.is_nan() {
        return 0.0;
    }
    gain.clamp(0.0, 1.0)
}

/// Precomputed desired-SPL table for one calibration profile
#[derive(Debug, Clone)]
pub struct SplCalibrator {
    setting_name: String,
    frequencies_hz: Vec<f32>,
    desired_left: Vec<f32>,
    desired_right: Vec<f32>,
    reference_db_spl: f32,
    hl_reference_db: f32,
}

impl SplCalibrator {
    /// Build the calibrator from a validated table
    ///
    /// # Errors
    /// Propagates [`CalibrationTable::validate`] failures.
    pub fn new(table: &CalibrationTable) -> Result<Self, CalibrationError> {
        table.validate()?;

        Ok(Self {
            setting_name: table.setting_name.clone(),
            frequencies_hz: table.entries.iter().map(|e| e.frequency_hz).collect(),
            desired_left: table
                .entries
                .iter()
                .map(|e| e.desired_spl(Ear::Left))
                .collect(),
            desired_right: table
                .entries
                .iter()
                .map(|e| e.desired_spl(Ear::Right))
                .collect(),
            reference_db_spl: DEFAULT_REFERENCE_DB_SPL,
            hl_reference_db: DEFAULT_HL_REFERENCE_DB,
        })
    }

    pub fn with_references(mut self, reference_db_spl: f32, hl_reference_db: f32) -> Self {
        self.reference_db_spl = reference_db_spl;
        self.hl_reference_db = hl_reference_db;
        self
    }

    pub fn setting_name(&self) -> &str {
        &self.setting_name
    }

    pub fn len(&self) -> usize {
        self.frequencies_hz.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies_hz.is_empty()
    }

    /// Desired SPL for `ear` at table row `freq_index`
    pub fn desired_spl(&self, ear: Ear, freq_index: usize) -> Result<f32, CalibrationError> {
        let column = match ear {
            Ear::Left => &self.desired_left,
            Ear::Right => &self.desired_right,
        };
        column
            .get(freq_index)
            .copied()
            .ok_or(CalibrationError::FrequencyIndexOutOfRange {
                index: freq_index,
                len: column.len(),
            })
    }

    /// Test frequency of table row `freq_index`
    pub fn frequency_hz(&self, freq_index: usize) -> Result<f32, CalibrationError> {
        self.frequencies_hz
            .get(freq_index)
            .copied()
            .ok_or(CalibrationError::FrequencyIndexOutOfRange {
                index: freq_index,
                len: self.frequencies_hz.len(),
            })
    }

    /// Linear gain that plays row `freq_index` at its desired SPL on `ear`
    pub fn calibration_amplitude(
        &self,
        ear: Ear,
        freq_index: usize,
    ) -> Result<f32, CalibrationError> {
        let desired = self.desired_spl(ear, freq_index)?;
        Ok(amplitude(desired, self.reference_db_spl))
    }

    /// Row index of `frequency_hz`, if the profile covers it
    pub fn index_of(&self, frequency_hz: f32) -> Option<usize> {
        self.frequencies_hz
            .iter()
            .position(|&hz| (hz - frequency_hz).abs() < 0.5)
    }

    /// dB SPL at which a tone of `level_db_hl` is presented
    ///
    /// `desired + (level_hl - hl_reference)`. Frequencies outside the profile
    /// fall back to [`FALLBACK_DESIRED_SPL`].
    pub fn presentation_spl(&self, ear: Ear, frequency_hz: f32, level_db_hl: f32) -> f32 {
        let desired = match self.index_of(frequency_hz) {
            Some(index) => self
                .desired_spl(ear, index)
                .unwrap_or(FALLBACK_DESIRED_SPL),
            None => {
                tracing::warn!(
                    "[SplCalibrator] {} Hz not in profile '{}', using {} dB SPL",
                    frequency_hz,
                    self.setting_name,
                    FALLBACK_DESIRED_SPL
                );
                FALLBACK_DESIRED_SPL
            }
        };
        desired + (level_db_hl - self.hl_reference_db)
    }

    /// Linear playback gain for a tone of `level_db_hl` on `ear`
    pub fn presentation_amplitude(&self, ear: Ear, frequency_hz: f32, level_db_hl: f32) -> f32 {
        amplitude(
            self.presentation_spl(ear, frequency_hz, level_db_hl),
            self.reference_db_spl,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::state::{CalibrationEntry, CalibrationTable};

    fn table() -> CalibrationTable {
        CalibrationTable::new(
            "booth",
            vec![
                CalibrationEntry {
                    frequency_hz: 250.0,
                    expected_spl: 84.0,
                    measured_spl_left: 83.9,
                    measured_spl_right: 86.0,
                },
                CalibrationEntry {
                    frequency_hz: 500.0,
                    expected_spl: 75.5,
                    measured_spl_left: 86.9,
                    measured_spl_right: 75.5,
                },
            ],
        )
    }

    #[test]
    fn test_amplitude_reference_points() {
        assert_eq!(amplitude(100.0, 100.0), 1.0);
        assert!((amplitude(0.0, 100.0) - 1e-5).abs() < 1e-9);
        assert!((amplitude(80.0, 100.0) - 0.1).abs() < 1e-6);
        assert_eq!(amplitude(160.0, 100.0), 1.0);
        assert_eq!(amplitude(f32::NAN, 100.0), 0.0);
    }

    #[test]
    fn test_amplitude_is_bounded_and_monotonic() {
        let mut previous = 0.0;
        for step in -200..=400 {
            let db = step as f32 * 0.5;
            let value = amplitude(db, 100.0);
            assert!((0.0..=1.0).contains(&value));
            assert!(value >= previous, "not monotonic at {} dB", db);
            previous = value;
        }
    }

    #[test]
    fn test_desired_spl_precomputed_per_ear() {
        let calibrator = SplCalibrator::new(&table()).unwrap();
        assert!((calibrator.desired_spl(Ear::Left, 0).unwrap() - 84.1).abs() < 1e-4);
        assert!((calibrator.desired_spl(Ear::Right, 0).unwrap() - 82.0).abs() < 1e-4);
        assert!((calibrator.desired_spl(Ear::Left, 1).unwrap() - 64.1).abs() < 1e-4);
        assert_eq!(
            calibrator.desired_spl(Ear::Left, 2),
            Err(CalibrationError::FrequencyIndexOutOfRange { index: 2, len: 2 })
        );
    }

    #[test]
    fn test_presentation_spl_offsets_from_hl_reference() {
        let calibrator = SplCalibrator::new(&table()).unwrap();
        let spl = calibrator.presentation_spl(Ear::Right, 500.0, 50.0);
        assert!((spl - (75.5 - 20.0)).abs() < 1e-4);

        let fallback = calibrator.presentation_spl(Ear::Left, 4000.0, 70.0);
        assert_eq!(fallback, FALLBACK_DESIRED_SPL);
    }

    #[test]
    fn test_presentation_amplitude_uses_shared_conversion() {
        let calibrator = SplCalibrator::new(&table()).unwrap();
        let spl = calibrator.presentation_spl(Ear::Left, 250.0, 40.0);
        assert_eq!(
            calibrator.presentation_amplitude(Ear::Left, 250.0, 40.0),
            amplitude(spl, DEFAULT_REFERENCE_DB_SPL)
        );
    }

    #[test]
    fn test_calibration_amplitude_plays_desired_spl() {
        let calibrator = SplCalibrator::new(&table()).unwrap();
        assert_eq!(calibrator.frequency_hz(1).unwrap(), 500.0);
        // Right 250 Hz desired 82 dB SPL against the 100 dB full scale
        let right = calibrator.calibration_amplitude(Ear::Right, 0).unwrap();
        assert!((right - amplitude(82.0, 100.0)).abs() < 1e-5);
        assert!(calibrator.calibration_amplitude(Ear::Left, 0).unwrap() > right);
        assert!(matches!(
            calibrator.frequency_hz(9),
            Err(CalibrationError::FrequencyIndexOutOfRange { index: 9, len: 2 })
        ));
    }

    #[test]
    fn test_new_rejects_empty_table() {
        let empty = CalibrationTable::new("none", Vec::new());
        assert_eq!(
            SplCalibrator::new(&empty).unwrap_err(),
            CalibrationError::EmptyTable
        );
    }
}
