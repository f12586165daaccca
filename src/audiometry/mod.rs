//! Audiometry module - adaptive hearing tests
//!
//! Two procedures share one traversal and one presentation model:
//! - `threshold`: staircase search for the quietest audible level
//! - `comfort`: categorical search for the most comfortable loudness
//!
//! `session` drives either procedure through timed tone presentations.

pub mod comfort;
pub mod record;
pub mod session;
pub mod stimulus;
pub mod threshold;
pub mod tone;
pub mod traversal;

pub use comfort::{ComfortLevelProcedure, ComfortOutcome, ComfortResponse, ComfortState};
pub use record::{next_test_id, FrequencyResult, RecordHeader, TestResultRecord, TestType};
pub use session::{SessionEvent, ToneSink, TrialSession};
pub use stimulus::{PresentationMode, Stimulus, StimulusSelector, ThresholdResponse};
pub use threshold::{ReversalRule, StaircaseOutcome, StaircaseState, StaircaseThresholdProcedure};
pub use tone::ToneBuffer;
pub use traversal::{Ear, EarOrder, TestPoint, Traversal};

use crate::error::ProcedureError;

/// One presentation: where, how loud and which condition
#[derive(Debug, Clone, PartialEq)]
pub struct Trial {
    pub point: TestPoint,
    pub level_db_hl: f32,
    pub stimulus: Stimulus,
}

/// Visual cue shown alongside a dual-shape segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    A,
    B,
}

/// Timed slice of a presentation, relative to the start of the trial
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub start_ms: u64,
    pub duration_ms: u64,
    pub shape: Option<Shape>,
    /// Whether the tone plays during this segment
    pub tone: bool,
}

impl Segment {
    pub fn end_ms(&self) -> u64 {
        self.start_ms + self.duration_ms
    }
}

/// Common surface of the threshold and comfort procedures
///
/// `next_trial` is idempotent until the pending trial is answered, so a
/// presentation can be repeated without changing the procedure state.
pub trait AdaptiveProcedure {
    type Response: Copy;
    type Outcome;

    fn next_trial(&mut self) -> Result<Trial, ProcedureError>;
    fn respond(&mut self, response: Self::Response) -> Result<Self::Outcome, ProcedureError>;
    fn is_complete(&self) -> bool;
    /// Timeline of one presentation of `trial`
    fn segments(&self, trial: &Trial) -> Vec<Segment>;
}
