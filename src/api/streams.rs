use futures::{Stream, StreamExt};
use tokio_stream::wrappers::BroadcastStream;

use super::APP_CONTEXT;
use crate::audio::PipelineStats;
use crate::managers::{SessionNotice, ToneCommand};

/// Periodic pipeline counters
///
/// Lagged items are skipped; the next item carries current totals anyway.
#[flutter_rust_bridge::frb(ignore)]
pub fn pipeline_stats_stream() -> impl Stream<Item = PipelineStats> {
    BroadcastStream::new(APP_CONTEXT.pipeline().subscribe_stats())
        .filter_map(|item| async move { item.ok() })
}

/// Shapes to show and tones to play for the active test
#[flutter_rust_bridge::frb(ignore)]
pub fn tone_command_stream() -> impl Stream<Item = ToneCommand> {
    BroadcastStream::new(APP_CONTEXT.broadcasts().subscribe_tones())
        .filter_map(|item| async move { item.ok() })
}

/// Test lifecycle notices (started, pair finished, completed, cancelled)
#[flutter_rust_bridge::frb(ignore)]
pub fn session_notice_stream() -> impl Stream<Item = SessionNotice> {
    BroadcastStream::new(APP_CONTEXT.broadcasts().subscribe_session())
        .filter_map(|item| async move { item.ok() })
}
