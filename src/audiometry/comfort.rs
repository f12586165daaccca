// ComfortLevelProcedure - most-comfortable-loudness (MCL) search
//
// The listener rates each tone; the level moves by a fixed delta per rating
// until "most comfortable" is chosen at the same level enough times in a row.

use serde::{Deserialize, Serialize};

use super::record::{FrequencyResult, RecordHeader, TestResultRecord, TestType};
use super::stimulus::Stimulus;
use super::traversal::{Ear, TestPoint, Traversal};
use super::{AdaptiveProcedure, Segment, Trial};
use crate::config::ProcedureConfig;
use crate::error::ProcedureError;

/// Categorical loudness rating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComfortResponse {
    TooSoft,
    SlightlySoft,
    MostComfortable,
    TooLoud,
}

impl ComfortResponse {
    /// Level change in dB applied for this rating
    pub fn level_delta(&self) -> f32 {
        match self {
            ComfortResponse::TooSoft => 5.0,
            ComfortResponse::SlightlySoft => 2.5,
            ComfortResponse::MostComfortable => 0.0,
            ComfortResponse::TooLoud => -5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComfortState {
    pub frequency_index: usize,
    pub ear: Ear,
    pub current_level_db_hl: f32,
    /// Length of the current run of "most comfortable" at one level
    pub consecutive_same_response_count: u32,
    /// Level the current run was chosen at
    pub candidate_level_db_hl: Option<f32>,
    pub finalized: bool,
}

impl ComfortState {
    fn start(point: TestPoint, level: f32) -> Self {
        Self {
            frequency_index: point.frequency_index,
            ear: point.ear,
            current_level_db_hl: level,
            consecutive_same_response_count: 0,
            candidate_level_db_hl: None,
            finalized: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ComfortOutcome {
    /// Level moved; keep presenting
    Adjusted { level_db_hl: f32 },
    /// "Most comfortable" recorded but not yet consistent
    Candidate { level_db_hl: f32, run: u32 },
    /// MCL found for this pair; the next pair is now active
    Finalized {
        point: TestPoint,
        mcl_db_hl: f32,
        next: TestPoint,
    },
    /// Last pair finalized
    Completed {
        point: TestPoint,
        mcl_db_hl: f32,
        record: TestResultRecord,
    },
}

pub struct ComfortLevelProcedure {
    traversal: Traversal,
    state: ComfortState,
    start_level: f32,
    min_level: f32,
    max_level: f32,
    consistency_count: u32,
    tone_ms: u64,
    tone_repeats: u32,
    awaiting_response: bool,
    history: Vec<f32>,
    results: Vec<FrequencyResult>,
    header: RecordHeader,
    complete: bool,
}

impl ComfortLevelProcedure {
    /// # Errors
    /// `InvalidConfiguration` for an empty frequency list, a zero consistency
    /// count, or a start level outside the level bounds.
    pub fn new(config: &ProcedureConfig, header: RecordHeader) -> Result<Self, ProcedureError> {
        let min_level = config.min_level_db_hl as f32;
        let max_level = config.max_level_db_hl as f32;
        let start_level = config.comfort_start_level_db_hl;
        if config.comfort_consistency_count == 0 {
            return Err(ProcedureError::InvalidConfiguration {
                reason: "consistency count must be at least 1".to_string(),
            });
        }
        if !(min_level..=max_level).contains(&start_level) {
            return Err(ProcedureError::InvalidConfiguration {
                reason: "comfort start level outside level bounds".to_string(),
            });
        }

        let traversal = Traversal::new(config.frequencies_hz.clone(), config.ear_order)?;
        let first = traversal
            .current()
            .ok_or(ProcedureError::InvalidConfiguration {
                reason: "no test points".to_string(),
            })?;

        Ok(Self {
            state: ComfortState::start(first, start_level),
            traversal,
            start_level,
            min_level,
            max_level,
            consistency_count: config.comfort_consistency_count,
            tone_ms: config.comfort_tone_ms,
            tone_repeats: config.comfort_tone_repeats.max(1),
            awaiting_response: false,
            history: Vec::new(),
            results: Vec::new(),
            header,
            complete: false,
        })
    }

    pub fn state(&self) -> &ComfortState {
        &self.state
    }

    pub fn current_point(&self) -> Option<TestPoint> {
        if self.complete {
            None
        } else {
            self.traversal.current()
        }
    }

    pub fn results(&self) -> &[FrequencyResult] {
        &self.results
    }

    pub fn progress(&self) -> f32 {
        self.results.len() as f32 / self.traversal.total_points() as f32
    }

    /// Apply a rating to the tone just presented
    ///
    /// # Errors
    /// - `AlreadyComplete` once every pair is done
    /// - `NoPendingTrial` when no tone was presented
    pub fn respond(&mut self, response: ComfortResponse) -> Result<ComfortOutcome, ProcedureError> {
        let point = self.current_point().ok_or(ProcedureError::AlreadyComplete)?;
        if !self.awaiting_response {
            return Err(ProcedureError::NoPendingTrial);
        }
        self.awaiting_response = false;

        let level = self.state.current_level_db_hl;
        if response == ComfortResponse::MostComfortable {
            if self.state.candidate_level_db_hl == Some(level) {
                self.state.consecutive_same_response_count += 1;
            } else {
                self.state.candidate_level_db_hl = Some(level);
                self.state.consecutive_same_response_count = 1;
            }

            let run = self.state.consecutive_same_response_count;
            if run >= self.consistency_count {
                return Ok(self.finalize(point, level));
            }
            return Ok(ComfortOutcome::Candidate {
                level_db_hl: level,
                run,
            });
        }

        // Any other rating breaks the run
        self.state.candidate_level_db_hl = None;
        self.state.consecutive_same_response_count = 0;

        let target = level + response.level_delta();
        if target < self.min_level || target > self.max_level {
            let bound = target.clamp(self.min_level, self.max_level);
            self.state.current_level_db_hl = bound;
            tracing::debug!(
                "[Comfort] {} Hz {:?} clamped at {} dB HL",
                point.frequency_hz,
                point.ear,
                bound
            );
            return Ok(self.finalize(point, bound));
        }

        self.state.current_level_db_hl = target;
        Ok(ComfortOutcome::Adjusted {
            level_db_hl: target,
        })
    }

    fn finalize(&mut self, point: TestPoint, mcl: f32) -> ComfortOutcome {
        self.state.finalized = true;
        self.history.push(mcl);
        self.results.push(FrequencyResult {
            frequency_hz: point.frequency_hz,
            ear: point.ear,
            final_level: mcl,
            level_history: std::mem::take(&mut self.history),
        });
        tracing::info!(
            "[Comfort] MCL {} dB HL at {} Hz ({:?})",
            mcl,
            point.frequency_hz,
            point.ear
        );

        match self.traversal.advance() {
            Some(next) => {
                self.state = ComfortState::start(next, self.start_level);
                ComfortOutcome::Finalized {
                    point,
                    mcl_db_hl: mcl,
                    next,
                }
            }
            None => {
                self.complete = true;
                ComfortOutcome::Completed {
                    point,
                    mcl_db_hl: mcl,
                    record: TestResultRecord {
                        header: self.header.clone(),
                        test_type: TestType::Mcl,
                        results: self.results.clone(),
                    },
                }
            }
        }
    }
}

impl AdaptiveProcedure for ComfortLevelProcedure {
    type Response = ComfortResponse;
    type Outcome = ComfortOutcome;

    fn next_trial(&mut self) -> Result<Trial, ProcedureError> {
        let point = self.current_point().ok_or(ProcedureError::AlreadyComplete)?;
        if !self.awaiting_response {
            self.history.push(self.state.current_level_db_hl);
            self.awaiting_response = true;
        }
        Ok(Trial {
            point,
            level_db_hl: self.state.current_level_db_hl,
            stimulus: Stimulus::ToneA,
        })
    }

    fn respond(&mut self, response: ComfortResponse) -> Result<ComfortOutcome, ProcedureError> {
        ComfortLevelProcedure::respond(self, response)
    }

    fn is_complete(&self) -> bool {
        self.complete
    }

    /// The tone repeats as bursts separated by equal-length gaps
    fn segments(&self, _trial: &Trial) -> Vec<Segment> {
        (0..self.tone_repeats as u64)
            .map(|i| Segment {
                start_ms: i * self.tone_ms * 2,
                duration_ms: self.tone_ms,
                shape: None,
                tone: true,
            })
            .collect()
    }
}
