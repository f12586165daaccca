// StaircaseThresholdProcedure - adaptive hearing threshold search
//
// The procedure walks every (frequency, ear) pair in traversal order and, for
// each one, runs a descending staircase:
// 1. Start at 50 dB HL
// 2. Correct answer with a tone -> level down by the current step
// 3. Wrong answer -> level up by the current step
// 4. Correct catch-trial answer -> level unchanged
// 5. Steps shrink 20 -> 10 -> 5 dB as responses accumulate
//
// A pair terminates when the level hits a bound (threshold = bound) or after
// four reversals (threshold = rounded mean of the last four reversal levels).

use serde::{Deserialize, Serialize};

use super::record::{FrequencyResult, RecordHeader, TestResultRecord, TestType};
use super::stimulus::{PresentationMode, Stimulus, StimulusSelector, ThresholdResponse};
use super::traversal::{Ear, TestPoint, Traversal};
use super::{AdaptiveProcedure, Segment, Trial};
use crate::config::ProcedureConfig;
use crate::error::ProcedureError;

/// When a direction change may count as a reversal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ReversalRule {
    /// Any scored response after the first
    #[default]
    NotFirstTrial,
    /// Only once at least this many responses were scored before the current one
    MinStepCount(u32),
}

impl ReversalRule {
    fn allows(&self, scored_before: u32) -> bool {
        match self {
            ReversalRule::NotFirstTrial => scored_before > 0,
            ReversalRule::MinStepCount(min) => scored_before >= *min,
        }
    }
}

/// Per-pair staircase state
#[derive(Debug, Clone, PartialEq)]
pub struct StaircaseState {
    pub frequency_index: usize,
    pub ear: Ear,
    pub current_level_db_hl: i32,
    /// Scored responses so far for this pair
    pub step_count: u32,
    pub last_direction_up: Option<bool>,
    /// Level before each recorded direction flip
    pub reversal_levels: Vec<i32>,
    pub terminated: bool,
}

impl StaircaseState {
    fn start(point: TestPoint, level: i32) -> Self {
        Self {
            frequency_index: point.frequency_index,
            ear: point.ear,
            current_level_db_hl: level,
            step_count: 0,
            last_direction_up: None,
            reversal_levels: Vec::new(),
            terminated: false,
        }
    }
}

/// Result of scoring one response
#[derive(Debug, Clone, PartialEq)]
pub enum StaircaseOutcome {
    /// Level updated (or unchanged), no reversal
    Continuing { level_db_hl: i32 },
    /// Direction flipped; the prior level was recorded
    Reversed { level_db_hl: i32, reversals: usize },
    /// Pair finished; the next pair is now active
    Terminated {
        point: TestPoint,
        threshold_db_hl: i32,
        next: TestPoint,
    },
    /// Last pair finished
    Completed {
        point: TestPoint,
        threshold_db_hl: i32,
        record: TestResultRecord,
    },
}

#[derive(Debug, Clone)]
struct StaircaseSettings {
    start_level: i32,
    step_sizes: Vec<i32>,
    reversals_required: usize,
    reversal_rule: ReversalRule,
    min_level: i32,
    max_level: i32,
    mode: PresentationMode,
    segment_ms: u64,
}

impl StaircaseSettings {
    fn from_config(config: &ProcedureConfig) -> Result<Self, ProcedureError> {
        let invalid = |reason: &str| ProcedureError::InvalidConfiguration {
            reason: reason.to_string(),
        };

        if config.step_sizes_db.is_empty() || config.step_sizes_db.iter().any(|s| *s <= 0) {
            return Err(invalid("step sizes must be positive and non-empty"));
        }
        if config.reversals_required == 0 {
            return Err(invalid("at least one reversal is required"));
        }
        if config.min_level_db_hl >= config.max_level_db_hl {
            return Err(invalid("minimum level must be below maximum level"));
        }
        if !(config.min_level_db_hl..=config.max_level_db_hl).contains(&config.start_level_db_hl) {
            return Err(invalid("start level outside level bounds"));
        }

        Ok(Self {
            start_level: config.start_level_db_hl,
            step_sizes: config.step_sizes_db.clone(),
            reversals_required: config.reversals_required,
            reversal_rule: config.reversal_rule,
            min_level: config.min_level_db_hl,
            max_level: config.max_level_db_hl,
            mode: config.presentation_mode,
            segment_ms: config.tone_segment_ms,
        })
    }

    fn step_size(&self, step_count: u32) -> i32 {
        let index = (step_count as usize).min(self.step_sizes.len() - 1);
        self.step_sizes[index]
    }
}

/// Adaptive threshold procedure over every configured (frequency, ear) pair
pub struct StaircaseThresholdProcedure {
    settings: StaircaseSettings,
    traversal: Traversal,
    state: StaircaseState,
    selector: StimulusSelector,
    pending: Option<Stimulus>,
    history: Vec<f32>,
    results: Vec<FrequencyResult>,
    header: RecordHeader,
    complete: bool,
}

impl StaircaseThresholdProcedure {
    /// Create a procedure positioned on the first (frequency, ear) pair
    ///
    /// # Errors
    /// `InvalidConfiguration` for empty frequency lists, non-positive steps or
    /// inconsistent level bounds.
    pub fn new(config: &ProcedureConfig, header: RecordHeader) -> Result<Self, ProcedureError> {
        let settings = StaircaseSettings::from_config(config)?;
        let traversal = Traversal::new(config.frequencies_hz.clone(), config.ear_order)?;
        let first = traversal
            .current()
            .ok_or(ProcedureError::InvalidConfiguration {
                reason: "no test points".to_string(),
            })?;
        let selector = match config.seed {
            Some(seed) => StimulusSelector::with_seed(settings.mode, seed),
            None => StimulusSelector::new(settings.mode),
        };

        Ok(Self {
            state: StaircaseState::start(first, settings.start_level),
            settings,
            traversal,
            selector,
            pending: None,
            history: Vec::new(),
            results: Vec::new(),
            header,
            complete: false,
        })
    }

    pub fn state(&self) -> &StaircaseState {
        &self.state
    }

    pub fn current_point(&self) -> Option<TestPoint> {
        if self.complete {
            None
        } else {
            self.traversal.current()
        }
    }

    pub fn pending_stimulus(&self) -> Option<Stimulus> {
        self.pending
    }

    pub fn results(&self) -> &[FrequencyResult] {
        &self.results
    }

    /// Fraction of (frequency, ear) pairs finished, 0.0..=1.0
    pub fn progress(&self) -> f32 {
        self.traversal.completed_points() as f32 / self.traversal.total_points() as f32
    }

    /// Present a specific condition at the current level
    ///
    /// A trial that is already awaiting a response is returned unchanged so a
    /// repeated presentation never re-rolls the stimulus.
    pub fn present(&mut self, stimulus: Stimulus) -> Result<Trial, ProcedureError> {
        let point = self.current_point().ok_or(ProcedureError::AlreadyComplete)?;
        let stimulus = match self.pending {
            Some(pending) => pending,
            None => {
                self.history.push(self.state.current_level_db_hl as f32);
                self.pending = Some(stimulus);
                stimulus
            }
        };

        Ok(Trial {
            point,
            level_db_hl: self.state.current_level_db_hl as f32,
            stimulus,
        })
    }

    /// Score the listener's answer to the pending trial
    ///
    /// # Errors
    /// - `AlreadyComplete` once every pair is done
    /// - `NoPendingTrial` when no trial was presented
    pub fn respond(
        &mut self,
        response: ThresholdResponse,
    ) -> Result<StaircaseOutcome, ProcedureError> {
        let point = self.current_point().ok_or(ProcedureError::AlreadyComplete)?;
        let stimulus = self.pending.take().ok_or(ProcedureError::NoPendingTrial)?;

        let correct = response.is_correct_for(stimulus);
        let prior = self.state.current_level_db_hl;
        let step = self.settings.step_size(self.state.step_count);

        let candidate = if !correct {
            prior + step
        } else if stimulus.has_tone() {
            prior - step
        } else {
            prior
        };
        // One step past a bound is enough to detect it.
        let candidate = candidate.clamp(self.settings.min_level - 1, self.settings.max_level + 1);

        let eligible = self.settings.reversal_rule.allows(self.state.step_count);
        self.state.step_count += 1;

        let mut reversed = false;
        if candidate != prior {
            let up = candidate > prior;
            if eligible && self.state.last_direction_up.is_some_and(|last| last != up) {
                self.state.reversal_levels.push(prior);
                reversed = true;
            }
            self.state.last_direction_up = Some(up);
        }

        if candidate <= self.settings.min_level || candidate >= self.settings.max_level {
            let bound = candidate.clamp(self.settings.min_level, self.settings.max_level);
            self.state.current_level_db_hl = bound;
            tracing::debug!(
                "[Staircase] {} Hz {:?} reached bound {} dB HL",
                point.frequency_hz,
                point.ear,
                bound
            );
            return Ok(self.terminate(point, bound));
        }

        self.state.current_level_db_hl = candidate;

        let reversals = self.state.reversal_levels.len();
        if reversals >= self.settings.reversals_required {
            let threshold = self.averaged_threshold();
            return Ok(self.terminate(point, threshold));
        }

        Ok(if reversed {
            StaircaseOutcome::Reversed {
                level_db_hl: candidate,
                reversals,
            }
        } else {
            StaircaseOutcome::Continuing {
                level_db_hl: candidate,
            }
        })
    }

    fn averaged_threshold(&self) -> i32 {
        let levels = &self.state.reversal_levels;
        let tail = &levels[levels.len() - self.settings.reversals_required..];
        let mean = tail.iter().map(|&l| l as f64).sum::<f64>() / tail.len() as f64;
        mean.round() as i32
    }

    fn terminate(&mut self, point: TestPoint, threshold: i32) -> StaircaseOutcome {
        self.state.terminated = true;
        self.history.push(threshold as f32);

        self.results.push(FrequencyResult {
            frequency_hz: point.frequency_hz,
            ear: point.ear,
            final_level: threshold as f32,
            level_history: std::mem::take(&mut self.history),
        });
        tracing::info!(
            "[Staircase] Threshold {} dB HL at {} Hz ({:?})",
            threshold,
            point.frequency_hz,
            point.ear
        );

        match self.traversal.advance() {
            Some(next) => {
                self.state = StaircaseState::start(next, self.settings.start_level);
                StaircaseOutcome::Terminated {
                    point,
                    threshold_db_hl: threshold,
                    next,
                }
            }
            None => {
                self.complete = true;
                StaircaseOutcome::Completed {
                    point,
                    threshold_db_hl: threshold,
                    record: TestResultRecord {
                        header: self.header.clone(),
                        test_type: TestType::Threshold,
                        results: self.results.clone(),
                    },
                }
            }
        }
    }
}

impl AdaptiveProcedure for StaircaseThresholdProcedure {
    type Response = ThresholdResponse;
    type Outcome = StaircaseOutcome;

    fn next_trial(&mut self) -> Result<Trial, ProcedureError> {
        if let Some(pending) = self.pending {
            return self.present(pending);
        }
        if self.complete {
            return Err(ProcedureError::AlreadyComplete);
        }
        let stimulus = self.selector.next_stimulus();
        self.present(stimulus)
    }

    fn respond(&mut self, response: ThresholdResponse) -> Result<StaircaseOutcome, ProcedureError> {
        StaircaseThresholdProcedure::respond(self, response)
    }

    fn is_complete(&self) -> bool {
        self.complete
    }

    fn segments(&self, trial: &Trial) -> Vec<Segment> {
        let duration_ms = self.settings.segment_ms;
        match self.settings.mode {
            PresentationMode::SingleTone => vec![Segment {
                start_ms: 0,
                duration_ms,
                shape: None,
                tone: trial.stimulus.has_tone(),
            }],
            PresentationMode::DualShape => vec![
                Segment {
                    start_ms: 0,
                    duration_ms,
                    shape: Some(super::Shape::A),
                    tone: trial.stimulus == Stimulus::ToneA,
                },
                Segment {
                    start_ms: duration_ms,
                    duration_ms,
                    shape: Some(super::Shape::B),
                    tone: trial.stimulus == Stimulus::ToneB,
                },
            ],
        }
    }
}

#[cfg(test)]
#[path = "threshold_tests.rs"]
mod tests;
