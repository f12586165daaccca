// Stimulus selection for threshold trials
//
// Catch trials (no tone) keep the listener honest, but they are rationed:
// - never more than two no-tone trials in a row
// - tone trials never fall behind no-tone trials

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Longest allowed run of consecutive no-tone trials
pub const MAX_NO_TONE_STREAK: u32 = 2;

/// What a single trial presents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stimulus {
    /// Tone plays during the first shape (or the only segment in single-tone mode)
    ToneA,
    /// Tone plays during the second shape
    ToneB,
    /// Catch trial, nothing plays
    NoTone,
}

impl Stimulus {
    pub fn has_tone(&self) -> bool {
        !matches!(self, Stimulus::NoTone)
    }
}

/// How a trial is presented to the listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PresentationMode {
    /// One tone segment; the listener answers heard / not heard
    SingleTone,
    /// Two shapes shown in sequence; the listener picks the shape the tone
    /// accompanied, or answers that nothing played
    #[default]
    DualShape,
}

impl PresentationMode {
    /// Number of timed segments in one presentation
    pub fn segments(&self) -> u32 {
        match self {
            PresentationMode::SingleTone => 1,
            PresentationMode::DualShape => 2,
        }
    }
}

/// Listener answer to a threshold trial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThresholdResponse {
    /// Tone heard with shape A (single-tone mode: "heard")
    IndicatedA,
    /// Tone heard with shape B
    IndicatedB,
    /// Nothing heard
    IndicatedNoSound,
}

impl ThresholdResponse {
    /// A response is correct when it names the condition that was presented
    pub fn is_correct_for(&self, stimulus: Stimulus) -> bool {
        matches!(
            (self, stimulus),
            (ThresholdResponse::IndicatedA, Stimulus::ToneA)
                | (ThresholdResponse::IndicatedB, Stimulus::ToneB)
                | (ThresholdResponse::IndicatedNoSound, Stimulus::NoTone)
        )
    }
}

/// Random stimulus picker honouring the catch-trial rationing rules
#[derive(Debug)]
pub struct StimulusSelector {
    rng: StdRng,
    mode: PresentationMode,
    no_tone_streak: u32,
    tone_count: u32,
    no_tone_count: u32,
}

impl StimulusSelector {
    pub fn new(mode: PresentationMode) -> Self {
        Self::with_rng(mode, StdRng::from_entropy())
    }

    /// Deterministic selector for tests and simulations
    pub fn with_seed(mode: PresentationMode, seed: u64) -> Self {
        Self::with_rng(mode, StdRng::seed_from_u64(seed))
    }

    fn with_rng(mode: PresentationMode, rng: StdRng) -> Self {
        Self {
            rng,
            mode,
            no_tone_streak: 0,
            tone_count: 0,
            no_tone_count: 0,
        }
    }

    pub fn mode(&self) -> PresentationMode {
        self.mode
    }

    /// Pick the condition for the next trial
    pub fn next_stimulus(&mut self) -> Stimulus {
        // A no-tone pick must leave tone trials >= no-tone trials.
        let forced_tone =
            self.no_tone_streak >= MAX_NO_TONE_STREAK || self.tone_count <= self.no_tone_count;

        let stimulus = if forced_tone {
            self.random_tone()
        } else {
            let choices = self.mode.segments() + 1;
            match self.rng.gen_range(0..choices) {
                0 => Stimulus::NoTone,
                1 => Stimulus::ToneA,
                _ => Stimulus::ToneB,
            }
        };

        if stimulus.has_tone() {
            self.tone_count += 1;
            self.no_tone_streak = 0;
        } else {
            self.no_tone_count += 1;
            self.no_tone_streak += 1;
        }
        stimulus
    }

    fn random_tone(&mut self) -> Stimulus {
        match self.mode {
            PresentationMode::SingleTone => Stimulus::ToneA,
            PresentationMode::DualShape => {
                if self.rng.gen_bool(0.5) {
                    Stimulus::ToneA
                } else {
                    Stimulus::ToneB
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_tone_never_more_than_twice_in_a_row() {
        let mut selector = StimulusSelector::with_seed(PresentationMode::DualShape, 7);
        let mut streak = 0;
        for _ in 0..5_000 {
            if selector.next_stimulus() == Stimulus::NoTone {
                streak += 1;
                assert!(streak <= MAX_NO_TONE_STREAK);
            } else {
                streak = 0;
            }
        }
    }

    #[test]
    fn test_tone_trials_never_fall_behind() {
        for seed in 0..20 {
            let mut selector = StimulusSelector::with_seed(PresentationMode::DualShape, seed);
            let (mut tones, mut silent) = (0, 0);
            for _ in 0..500 {
                match selector.next_stimulus() {
                    Stimulus::NoTone => silent += 1,
                    _ => tones += 1,
                }
                assert!(tones >= silent, "seed {} broke the ratio", seed);
            }
        }
    }

    #[test]
    fn test_first_trial_always_has_tone() {
        for seed in 0..50 {
            let mut selector = StimulusSelector::with_seed(PresentationMode::DualShape, seed);
            assert!(selector.next_stimulus().has_tone());
        }
    }

    #[test]
    fn test_single_tone_mode_never_picks_shape_b() {
        let mut selector = StimulusSelector::with_seed(PresentationMode::SingleTone, 3);
        for _ in 0..1_000 {
            assert_ne!(selector.next_stimulus(), Stimulus::ToneB);
        }
    }

    #[test]
    fn test_response_correctness() {
        assert!(ThresholdResponse::IndicatedA.is_correct_for(Stimulus::ToneA));
        assert!(ThresholdResponse::IndicatedNoSound.is_correct_for(Stimulus::NoTone));
        assert!(!ThresholdResponse::IndicatedB.is_correct_for(Stimulus::ToneA));
        assert!(!ThresholdResponse::IndicatedNoSound.is_correct_for(Stimulus::ToneB));
    }
}
