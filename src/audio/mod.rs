// Audio module - real-time capture, processing and playback
//
// - buffer_pool: allocation-free frame hand-off from device callbacks
// - params: generation-tagged parameter snapshots
// - pipeline: streaming worker lifecycle
// - backend: cpal (desktop), oboe (Android) and an in-process stub

pub mod backend;
pub mod buffer_pool;
pub mod params;
pub mod pipeline;

pub use backend::{platform_backend, AudioBackend, StreamSpec, StubBackend};
pub use params::{ParamStore, PipelineParams};
pub use pipeline::{frame_size, AudioPipeline, PipelineStats};
