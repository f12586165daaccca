// BroadcastChannelManager: tokio broadcast channels for UI subscribers
//
// Two feeds leave the core:
// - tone commands from the active test session or the calibration screen
//   (what to show and play)
// - session notifications (trial lifecycle and results)
// Pipeline stats are owned by the pipeline itself.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::audiometry::{Ear, Shape, ToneBuffer, ToneSink};
use crate::calibration::CalibrationTone;

const TONE_CHANNEL_CAPACITY: usize = 64;
const SESSION_CHANNEL_CAPACITY: usize = 64;

/// Instruction for the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub enum ToneCommand {
    ShowShape(Option<Shape>),
    Play {
        frequency_hz: f32,
        ear: Ear,
        amplitude: f32,
        sample_rate: u32,
        /// Interleaved stereo PCM
        samples: Arc<Vec<i16>>,
    },
    /// Repeat `samples` until the next `Stop`
    Loop {
        frequency_hz: f32,
        left_amplitude: f32,
        right_amplitude: f32,
        sample_rate: u32,
        /// Interleaved stereo PCM, one loop
        samples: Arc<Vec<i16>>,
    },
    Stop,
}

/// Lifecycle notification for the active test
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SessionNotice {
    Started { test_type: String },
    PresentationComplete,
    PairFinished { frequency_hz: f32, ear: Ear, level_db_hl: f32 },
    Completed { test_id: u64, saved: bool },
    Paused,
    Resumed,
    Cancelled,
}

/// Owns the senders; subscribers come and go freely
pub struct BroadcastChannelManager {
    tones: broadcast::Sender<ToneCommand>,
    session: broadcast::Sender<SessionNotice>,
}

impl BroadcastChannelManager {
    pub fn new() -> Self {
        let (tones, _) = broadcast::channel(TONE_CHANNEL_CAPACITY);
        let (session, _) = broadcast::channel(SESSION_CHANNEL_CAPACITY);
        Self { tones, session }
    }

    /// Sink publishing every presentation step as a [`ToneCommand`]
    pub fn tone_sink(&self) -> BroadcastToneSink {
        BroadcastToneSink {
            tx: self.tones.clone(),
        }
    }

    pub fn subscribe_tones(&self) -> broadcast::Receiver<ToneCommand> {
        self.tones.subscribe()
    }

    pub fn subscribe_session(&self) -> broadcast::Receiver<SessionNotice> {
        self.session.subscribe()
    }

    /// Start looping a calibration tone on the presentation layer
    pub fn loop_calibration_tone(&self, tone: &CalibrationTone) {
        self.tone_sink().send(ToneCommand::Loop {
            frequency_hz: tone.frequency_hz,
            left_amplitude: tone.left_amplitude,
            right_amplitude: tone.right_amplitude,
            sample_rate: tone.sample_rate,
            samples: Arc::new(tone.samples().to_vec()),
        });
    }

    pub fn stop_tone(&self) {
        self.tone_sink().send(ToneCommand::Stop);
    }

    /// Publish a notice; having no subscribers is not an error
    pub fn notify(&self, notice: SessionNotice) {
        let _ = self.session.send(notice);
    }
}

impl Default for BroadcastChannelManager {
    fn default() -> Self {
        Self::new()
    }
}

/// [`ToneSink`] that forwards to a broadcast channel
#[derive(Clone)]
pub struct BroadcastToneSink {
    tx: broadcast::Sender<ToneCommand>,
}

impl BroadcastToneSink {
    fn send(&self, command: ToneCommand) {
        if self.tx.send(command).is_err() {
            tracing::debug!("[BroadcastToneSink] No tone subscribers");
        }
    }
}

impl ToneSink for BroadcastToneSink {
    fn show_shape(&mut self, shape: Option<Shape>) {
        self.send(ToneCommand::ShowShape(shape));
    }

    fn play(&mut self, tone: &ToneBuffer) {
        self.send(ToneCommand::Play {
            frequency_hz: tone.frequency_hz,
            ear: tone.ear,
            amplitude: tone.amplitude,
            sample_rate: tone.sample_rate,
            samples: Arc::new(tone.samples().to_vec()),
        });
    }

    fn stop(&mut self) {
        self.send(ToneCommand::Stop);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tone_sink_publishes_commands() {
        let manager = BroadcastChannelManager::new();
        let mut rx = manager.subscribe_tones();
        let mut sink = manager.tone_sink();

        let tone = ToneBuffer::new(1_000.0, 0.5, Ear::Right, 10, 44_100);
        sink.show_shape(Some(Shape::A));
        sink.play(&tone);
        sink.stop();

        assert_eq!(rx.try_recv().unwrap(), ToneCommand::ShowShape(Some(Shape::A)));
        match rx.try_recv().unwrap() {
            ToneCommand::Play {
                frequency_hz,
                ear,
                samples,
                ..
            } => {
                assert_eq!(frequency_hz, 1_000.0);
                assert_eq!(ear, Ear::Right);
                assert_eq!(samples.len(), tone.samples().len());
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(rx.try_recv().unwrap(), ToneCommand::Stop);
    }

    #[test]
    fn test_sink_without_subscribers_is_silent() {
        let manager = BroadcastChannelManager::new();
        let mut sink = manager.tone_sink();
        sink.stop();
        manager.notify(SessionNotice::Cancelled);
    }

    #[test]
    fn test_multiple_session_subscribers() {
        let manager = BroadcastChannelManager::new();
        let mut a = manager.subscribe_session();
        let mut b = manager.subscribe_session();
        manager.notify(SessionNotice::PresentationComplete);
        assert_eq!(a.try_recv().unwrap(), SessionNotice::PresentationComplete);
        assert_eq!(b.try_recv().unwrap(), SessionNotice::PresentationComplete);
    }
}
