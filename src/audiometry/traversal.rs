// Ear/frequency traversal shared by the threshold and comfort procedures

use serde::{Deserialize, Serialize};

use crate::error::ProcedureError;

/// Test ear
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Ear {
    Left,
    Right,
}

impl Ear {
    /// Short label used in record keys ("L" / "R")
    pub fn label(&self) -> &'static str {
        match self {
            Ear::Left => "L",
            Ear::Right => "R",
        }
    }

    /// Interleaved stereo channel carrying this ear
    pub fn channel(&self) -> usize {
        match self {
            Ear::Left => 0,
            Ear::Right => 1,
        }
    }
}

/// Order in which ears are visited for each frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EarOrder {
    LeftOnly,
    RightOnly,
    /// Left then right at each frequency before moving on
    #[default]
    LeftThenRight,
    /// Right then left at each frequency before moving on
    RightThenLeft,
}

impl EarOrder {
    pub fn ears(&self) -> &'static [Ear] {
        match self {
            EarOrder::LeftOnly => &[Ear::Left],
            EarOrder::RightOnly => &[Ear::Right],
            EarOrder::LeftThenRight => &[Ear::Left, Ear::Right],
            EarOrder::RightThenLeft => &[Ear::Right, Ear::Left],
        }
    }
}

/// One (frequency, ear) pair under test
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestPoint {
    /// Position in the procedure's frequency list
    pub frequency_index: usize,
    pub frequency_hz: f32,
    pub ear: Ear,
}

/// Cursor over every (frequency, ear) pair in test order
#[derive(Debug, Clone)]
pub struct Traversal {
    frequencies_hz: Vec<f32>,
    ears: &'static [Ear],
    frequency_pos: usize,
    ear_pos: usize,
}

impl Traversal {
    /// # Errors
    /// `InvalidConfiguration` when no frequencies are given or one is not positive.
    pub fn new(frequencies_hz: Vec<f32>, order: EarOrder) -> Result<Self, ProcedureError> {
        if frequencies_hz.is_empty() {
            return Err(ProcedureError::InvalidConfiguration {
                reason: "frequency list is empty".to_string(),
            });
        }
        if let Some(bad) = frequencies_hz.iter().find(|hz| !(hz.is_finite() && **hz > 0.0)) {
            return Err(ProcedureError::InvalidConfiguration {
                reason: format!("frequency {} Hz is not a positive number", bad),
            });
        }

        Ok(Self {
            frequencies_hz,
            ears: order.ears(),
            frequency_pos: 0,
            ear_pos: 0,
        })
    }

    /// Pair currently under test, `None` once every pair is done
    pub fn current(&self) -> Option<TestPoint> {
        let frequency_hz = *self.frequencies_hz.get(self.frequency_pos)?;
        Some(TestPoint {
            frequency_index: self.frequency_pos,
            frequency_hz,
            ear: self.ears[self.ear_pos],
        })
    }

    /// Move to the next pair: the other ear first, then the next frequency
    pub fn advance(&mut self) -> Option<TestPoint> {
        if self.current().is_none() {
            return None;
        }
        self.ear_pos += 1;
        if self.ear_pos >= self.ears.len() {
            self.ear_pos = 0;
            self.frequency_pos += 1;
        }
        self.current()
    }

    pub fn total_points(&self) -> usize {
        self.frequencies_hz.len() * self.ears.len()
    }

    pub fn completed_points(&self) -> usize {
        (self.frequency_pos * self.ears.len() + self.ear_pos).min(self.total_points())
    }
}
