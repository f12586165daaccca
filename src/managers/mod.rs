// Managers Module
//
// Focused managers behind AppContext, one concern each:
// - PipelineManager: audio pipeline lifecycle and parameter installation
// - TestSessionManager: active threshold/MCL session and result persistence
// - BroadcastChannelManager: tone command and session notice channels

pub mod broadcast_manager;
pub mod pipeline_manager;
pub mod session_manager;

pub use broadcast_manager::{BroadcastChannelManager, BroadcastToneSink, SessionNotice, ToneCommand};
pub use pipeline_manager::{PipelineManager, ToggleOutcome, TOGGLE_DEBOUNCE};
pub use session_manager::{SessionStatus, TestSessionManager};
