//! Shared fixtures for the integration tests
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use hearing_amp::audio::StubBackend;
use hearing_amp::audiometry::{
    ComfortResponse, EarOrder, SessionEvent, Stimulus, ThresholdResponse, Trial,
};
use hearing_amp::config::{AppConfig, AudioConfig, ProcedureConfig};
use hearing_amp::context::AppContext;
use hearing_amp::scheduler::ManualClock;
use hearing_amp::storage::ProfileRepository;

pub const FREQUENCIES_HZ: [f32; 2] = [500.0, 2_000.0];

pub fn config() -> AppConfig {
    AppConfig {
        audio: AudioConfig {
            fallback_min_buffer_frames: 16,
            buffer_size_factor: 2,
            start_timeout_ms: 500,
            shutdown_timeout_ms: 500,
            read_timeout_ms: 2,
            stats_every_n_frames: 1,
            assume_permission_granted: false,
            ..AudioConfig::default()
        },
        procedure: ProcedureConfig {
            frequencies_hz: FREQUENCIES_HZ.to_vec(),
            ear_order: EarOrder::LeftOnly,
            seed: Some(7),
            ..ProcedureConfig::default()
        },
        ..AppConfig::default()
    }
}

pub fn signal(len: usize) -> Vec<i16> {
    (0..len)
        .map(|i| ((i as f32 * 0.07).sin() * 4_000.0) as i16)
        .collect()
}

pub fn context(
    backend: &StubBackend,
    repository: Arc<dyn ProfileRepository>,
) -> (AppContext, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let context = AppContext::new(
        config(),
        Arc::new(backend.clone()),
        repository,
        clock.clone(),
    );
    (context, clock)
}

/// Begin a trial and advance the clock until its presentation completes
pub fn present(context: &AppContext, clock: &ManualClock) -> Trial {
    let trial = context.sessions().begin_trial().unwrap();
    for _ in 0..1_000 {
        let wait = context
            .sessions()
            .status()
            .and_then(|status| status.next_event_in)
            .unwrap_or(Duration::from_millis(10));
        clock.advance(wait);
        if context
            .sessions()
            .pump()
            .unwrap()
            .contains(&SessionEvent::PresentationComplete)
        {
            return trial;
        }
    }
    panic!("presentation never completed");
}

/// Listener who hears every tone at or above `threshold_db_hl`
pub fn threshold_answer(trial: &Trial, threshold_db_hl: f32) -> ThresholdResponse {
    if trial.level_db_hl < threshold_db_hl {
        return ThresholdResponse::IndicatedNoSound;
    }
    match trial.stimulus {
        Stimulus::ToneA => ThresholdResponse::IndicatedA,
        Stimulus::ToneB => ThresholdResponse::IndicatedB,
        Stimulus::NoTone => ThresholdResponse::IndicatedNoSound,
    }
}

/// Listener whose comfortable window is `[mcl_db_hl, mcl_db_hl + 2.5]`
pub fn comfort_answer(trial: &Trial, mcl_db_hl: f32) -> ComfortResponse {
    let offset = trial.level_db_hl - mcl_db_hl;
    if offset < -5.0 {
        ComfortResponse::TooSoft
    } else if offset < 0.0 {
        ComfortResponse::SlightlySoft
    } else if offset > 2.5 {
        ComfortResponse::TooLoud
    } else {
        ComfortResponse::MostComfortable
    }
}
