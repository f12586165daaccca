// TrialSession - timed presentation of adaptive procedure trials
//
// A session owns one procedure and paces each trial through the scheduler:
// - `begin_trial` sets the in-progress flag, then schedules the segments
// - `pump` fires due segments into the tone sink
// - the completion task clears the flag; only then is a response accepted
//
// `cancel` drops every pending task and the rendered tone, so nothing plays
// after a listener leaves mid-test. `pause` drops the pending tasks but keeps
// the trial; `resume` presents an interrupted trial again from the start.

use std::sync::Arc;
use std::time::Duration;

use super::tone::ToneBuffer;
use super::{AdaptiveProcedure, Segment, Shape, Trial};
use crate::calibration::SplCalibrator;
use crate::error::ProcedureError;
use crate::scheduler::{TimeSource, TrialScheduler};

/// Output side of a presentation (speaker plus on-screen cue)
pub trait ToneSink {
    /// Show a shape cue, or clear it with `None`
    fn show_shape(&mut self, shape: Option<Shape>);
    fn play(&mut self, tone: &ToneBuffer);
    fn stop(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionTask {
    SegmentStart(usize),
    SegmentEnd(usize),
    Complete,
}

/// What `pump` observed, in firing order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SegmentStarted {
        index: usize,
        shape: Option<Shape>,
        tone: bool,
    },
    SegmentEnded {
        index: usize,
    },
    /// Presentation finished; a response is now accepted
    PresentationComplete,
}

pub struct TrialSession<P: AdaptiveProcedure, S: ToneSink> {
    procedure: P,
    sink: S,
    calibrator: SplCalibrator,
    scheduler: TrialScheduler<SessionTask>,
    sample_rate: u32,
    in_progress: bool,
    cancelled: bool,
    paused: bool,
    /// Pause cut a presentation short; resume replays it
    interrupted: bool,
    current: Option<Trial>,
    segments: Vec<Segment>,
    tone: Option<ToneBuffer>,
}

impl<P: AdaptiveProcedure, S: ToneSink> TrialSession<P, S> {
    pub fn new(
        procedure: P,
        sink: S,
        calibrator: SplCalibrator,
        clock: Arc<dyn TimeSource>,
        sample_rate: u32,
    ) -> Self {
        Self {
            procedure,
            sink,
            calibrator,
            scheduler: TrialScheduler::new(clock),
            sample_rate,
            in_progress: false,
            cancelled: false,
            paused: false,
            interrupted: false,
            current: None,
            segments: Vec::new(),
            tone: None,
        }
    }

    pub fn procedure(&self) -> &P {
        &self.procedure
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn in_progress(&self) -> bool {
        self.in_progress
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_complete(&self) -> bool {
        self.procedure.is_complete()
    }

    /// Trial awaiting (or being presented for) a response
    pub fn current_trial(&self) -> Option<&Trial> {
        self.current.as_ref()
    }

    /// Delay until the next segment event, `None` when idle
    pub fn time_until_next(&self) -> Option<Duration> {
        self.scheduler.time_until_next()
    }

    /// Start presenting the next trial
    ///
    /// # Errors
    /// - `Cancelled` after `cancel()`
    /// - `Paused` between `pause()` and `resume()`
    /// - `TrialInProgress` while a presentation is still running
    /// - `AlreadyComplete` when the procedure has finished
    pub fn begin_trial(&mut self) -> Result<Trial, ProcedureError> {
        self.ensure_idle()?;
        let trial = self.procedure.next_trial()?;
        self.present(trial.clone());
        Ok(trial)
    }

    /// Present the pending trial again without changing procedure state
    ///
    /// # Errors
    /// As `begin_trial`, plus `NoPendingTrial` when nothing awaits a response.
    pub fn repeat_trial(&mut self) -> Result<Trial, ProcedureError> {
        self.ensure_idle()?;
        if self.current.is_none() {
            return Err(ProcedureError::NoPendingTrial);
        }
        let trial = self.procedure.next_trial()?;
        tracing::debug!("[TrialSession] Repeating trial at {} dB HL", trial.level_db_hl);
        self.present(trial.clone());
        Ok(trial)
    }

    /// Fire every segment task that is due
    pub fn pump(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        for task in self.scheduler.poll_due() {
            match task {
                SessionTask::SegmentStart(index) => {
                    let Some(segment) = self.segments.get(index) else {
                        continue;
                    };
                    self.sink.show_shape(segment.shape);
                    if segment.tone {
                        if let Some(tone) = &self.tone {
                            self.sink.play(tone);
                        }
                    }
                    events.push(SessionEvent::SegmentStarted {
                        index,
                        shape: segment.shape,
                        tone: segment.tone,
                    });
                }
                SessionTask::SegmentEnd(index) => {
                    if self.segments.get(index).is_some_and(|s| s.tone) {
                        self.sink.stop();
                    }
                    self.sink.show_shape(None);
                    events.push(SessionEvent::SegmentEnded { index });
                }
                SessionTask::Complete => {
                    self.in_progress = false;
                    events.push(SessionEvent::PresentationComplete);
                }
            }
        }
        events
    }

    /// Score the listener's answer once the presentation has finished
    ///
    /// # Errors
    /// - `Cancelled` after `cancel()`
    /// - `Paused` between `pause()` and `resume()`
    /// - `TrialInProgress` before the completion event fired
    /// - `NoPendingTrial` when no trial was presented
    pub fn respond(&mut self, response: P::Response) -> Result<P::Outcome, ProcedureError> {
        self.ensure_idle()?;
        if self.current.is_none() {
            return Err(ProcedureError::NoPendingTrial);
        }
        let outcome = self.procedure.respond(response)?;
        self.current = None;
        self.tone = None;
        self.segments.clear();
        Ok(outcome)
    }

    /// Halt the session without losing the pending trial
    ///
    /// A running presentation is cut short: its tasks are dropped, playback
    /// stops and the cue is cleared. Pausing twice is a no-op.
    ///
    /// # Errors
    /// `Cancelled` after `cancel()`
    pub fn pause(&mut self) -> Result<(), ProcedureError> {
        if self.cancelled {
            return Err(ProcedureError::Cancelled);
        }
        if self.paused {
            return Ok(());
        }
        if self.in_progress {
            let dropped = self.scheduler.cancel_all();
            self.sink.stop();
            self.sink.show_shape(None);
            self.in_progress = false;
            self.interrupted = true;
            tracing::debug!("[TrialSession] Paused mid-presentation ({} tasks dropped)", dropped);
        }
        self.paused = true;
        tracing::info!("[TrialSession] Paused");
        Ok(())
    }

    /// Leave the paused state
    ///
    /// Returns the trial being presented again when the pause interrupted
    /// one; a trial that had already finished presenting waits for its
    /// response as before.
    ///
    /// # Errors
    /// `Cancelled` after `cancel()`
    pub fn resume(&mut self) -> Result<Option<Trial>, ProcedureError> {
        if self.cancelled {
            return Err(ProcedureError::Cancelled);
        }
        if !self.paused {
            return Ok(None);
        }
        self.paused = false;
        tracing::info!("[TrialSession] Resumed");

        if !std::mem::take(&mut self.interrupted) {
            return Ok(None);
        }
        match self.current.clone() {
            Some(trial) => {
                self.present(trial.clone());
                Ok(Some(trial))
            }
            None => Ok(None),
        }
    }

    /// Stop playback and drop every pending task and buffer
    pub fn cancel(&mut self) {
        let dropped = self.scheduler.cancel_all();
        self.sink.stop();
        self.sink.show_shape(None);
        self.tone = None;
        self.current = None;
        self.segments.clear();
        self.in_progress = false;
        self.paused = false;
        self.interrupted = false;
        self.cancelled = true;
        tracing::info!("[TrialSession] Cancelled ({} pending tasks dropped)", dropped);
    }

    fn ensure_idle(&self) -> Result<(), ProcedureError> {
        if self.cancelled {
            return Err(ProcedureError::Cancelled);
        }
        if self.paused {
            return Err(ProcedureError::Paused);
        }
        if self.in_progress {
            return Err(ProcedureError::TrialInProgress);
        }
        Ok(())
    }

    fn present(&mut self, trial: Trial) {
        let segments = self.procedure.segments(&trial);
        let tone_ms = segments
            .iter()
            .filter(|s| s.tone)
            .map(|s| s.duration_ms)
            .max();

        self.tone = tone_ms.map(|duration_ms| {
            let point = &trial.point;
            let amplitude = self.calibrator.presentation_amplitude(
                point.ear,
                point.frequency_hz,
                trial.level_db_hl,
            );
            ToneBuffer::new(
                point.frequency_hz,
                amplitude,
                point.ear,
                duration_ms,
                self.sample_rate,
            )
        });

        // The flag must be up before any segment can fire.
        self.in_progress = true;

        let end_ms = segments.iter().map(Segment::end_ms).max().unwrap_or(0);
        for (index, segment) in segments.iter().enumerate() {
            self.scheduler.schedule(
                Duration::from_millis(segment.start_ms),
                SessionTask::SegmentStart(index),
            );
            self.scheduler.schedule(
                Duration::from_millis(segment.end_ms()),
                SessionTask::SegmentEnd(index),
            );
        }
        self.scheduler
            .schedule(Duration::from_millis(end_ms), SessionTask::Complete);

        self.segments = segments;
        self.current = Some(trial);
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
