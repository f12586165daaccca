// CalibrationTable - per-frequency expected/measured SPL readings
//
// A calibration profile pairs, for every test frequency, the SPL the
// transducer is expected to produce for a reference tone with the SPL a sound
// level meter actually measured on each ear. Profiles are created by an
// external calibration workflow and are read-only once handed to the core.
//
// Default expected levels are the ER-3A insert earphone reference levels.

use serde::{Deserialize, Serialize};

use crate::audiometry::Ear;
use crate::error::CalibrationError;

/// Canonical audiometric test frequencies in Hz
pub const TEST_FREQUENCIES_HZ: [f32; 10] = [
    250.0, 500.0, 750.0, 1000.0, 1500.0, 2000.0, 3000.0, 4000.0, 6000.0, 8000.0,
];

/// ER-3A reference expected levels (dB SPL), aligned with [`TEST_FREQUENCIES_HZ`]
pub const ER3A_EXPECTED_SPL: [f32; 10] = [84.0, 75.5, 72.0, 70.0, 72.0, 73.0, 73.5, 75.5, 72.0, 70.0];

/// One row of a calibration profile
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationEntry {
    pub frequency_hz: f32,
    pub expected_spl: f32,
    pub measured_spl_left: f32,
    pub measured_spl_right: f32,
}

impl CalibrationEntry {
    /// Entry whose measurements match the expectation on both ears
    pub fn uncorrected(frequency_hz: f32, expected_spl: f32) -> Self {
        Self {
            frequency_hz,
            expected_spl,
            measured_spl_left: expected_spl,
            measured_spl_right: expected_spl,
        }
    }

    pub fn measured(&self, ear: Ear) -> f32 {
        match ear {
            Ear::Left => self.measured_spl_left,
            Ear::Right => self.measured_spl_right,
        }
    }

    /// Desired SPL for `ear`: the expected level mirrored around the measurement
    ///
    /// `desired = expected + (expected - measured)`
    pub fn desired_spl(&self, ear: Ear) -> f32 {
        self.expected_spl + (self.expected_spl - self.measured(ear))
    }

    fn validate(&self) -> Result<(), CalibrationError> {
        let levels = [
            self.frequency_hz,
            self.expected_spl,
            self.measured_spl_left,
            self.measured_spl_right,
        ];
        if levels.iter().all(|v| v.is_finite()) {
            Ok(())
        } else {
            Err(CalibrationError::NonFiniteLevel {
                frequency_hz: self.frequency_hz,
            })
        }
    }
}

/// Named calibration profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationTable {
    /// Opaque profile identifier chosen by the calibration workflow
    pub setting_name: String,
    /// Rows ordered by frequency index
    pub entries: Vec<CalibrationEntry>,
}

impl CalibrationTable {
    pub fn new(setting_name: impl Into<String>, entries: Vec<CalibrationEntry>) -> Self {
        Self {
            setting_name: setting_name.into(),
            entries,
        }
    }

    /// ER-3A profile with no measured deviation
    pub fn er3a_default(setting_name: impl Into<String>) -> Self {
        let entries = TEST_FREQUENCIES_HZ
            .iter()
            .zip(ER3A_EXPECTED_SPL.iter())
            .map(|(&hz, &spl)| CalibrationEntry::uncorrected(hz, spl))
            .collect();
        Self::new(setting_name, entries)
    }

    /// Check the table is usable before it is precomputed
    ///
    /// # Errors
    /// - `EmptyTable` when there are no rows
    /// - `NonFiniteLevel` for the first row holding NaN/inf
    pub fn validate(&self) -> Result<(), CalibrationError> {
        if self.entries.is_empty() {
            return Err(CalibrationError::EmptyTable);
        }
        self.entries.iter().try_for_each(CalibrationEntry::validate)
    }
}
