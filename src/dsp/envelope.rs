// Envelope follower with separate attack and release smoothing

/// One-pole smoothing coefficient `exp(-1 / (sample_rate * seconds))`
///
/// A zero (or invalid) time constant yields 0.0, meaning the envelope jumps
/// straight to the input level.
pub fn time_coefficient(sample_rate: f32, seconds: f32) -> f32 {
    let samples = sample_rate * seconds;
    if !samples.is_finite() || samples <= 0.0 {
        return 0.0;
    }
    (-1.0 / samples).exp()
}

/// Peak envelope tracker
///
/// `env = coef * env + (1 - coef) * |x|`, using the attack coefficient while
/// the input is above the envelope and the release coefficient otherwise.
#[derive(Debug, Clone)]
pub struct EnvelopeFollower {
    attack_coef: f32,
    release_coef: f32,
    envelope: f32,
}

impl EnvelopeFollower {
    pub fn new(sample_rate: f32, attack_seconds: f32, release_seconds: f32) -> Self {
        Self {
            attack_coef: time_coefficient(sample_rate, attack_seconds),
            release_coef: time_coefficient(sample_rate, release_seconds),
            envelope: 0.0,
        }
    }

    /// Change time constants without disturbing the tracked level
    pub fn set_times(&mut self, sample_rate: f32, attack_seconds: f32, release_seconds: f32) {
        self.attack_coef = time_coefficient(sample_rate, attack_seconds);
        self.release_coef = time_coefficient(sample_rate, release_seconds);
    }

    #[inline]
    pub fn process(&mut self, sample: f32) -> f32 {
        let level = sample.abs();
        let coef = if level > self.envelope {
            self.attack_coef
        } else {
            self.release_coef
        };
        self.envelope = coef * self.envelope + (1.0 - coef) * level;
        self.envelope
    }

    pub fn value(&self) -> f32 {
        self.envelope
    }

    pub fn reset(&mut self) {
        self.envelope = 0.0;
    }
}
