//! Parameter hot-swap between control calls and the streaming worker
//!
//! Control threads publish a fresh immutable snapshot and bump a generation
//! counter. The worker compares generations once per frame and only then
//! takes the read lock, with `try_read`, so a writer holding the lock never
//! stalls audio.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::dsp::CompressorParams;
use crate::error::AudioError;

/// What the pipeline does to each frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PipelineParams {
    /// Per-band compression with make-up gain
    Compressor(CompressorParams),
    /// One global multiplier, `clamp(x * factor, -1, 1)`
    Amplify { factor: f32 },
}

impl PipelineParams {
    pub fn compressor(&self) -> Option<&CompressorParams> {
        match self {
            PipelineParams::Compressor(params) => Some(params),
            PipelineParams::Amplify { .. } => None,
        }
    }
}

/// Generation-tagged snapshot store
pub struct ParamStore {
    current: RwLock<(u64, Arc<PipelineParams>)>,
    generation: AtomicU64,
}

impl ParamStore {
    pub fn new(initial: PipelineParams) -> Self {
        Self {
            current: RwLock::new((0, Arc::new(initial))),
            generation: AtomicU64::new(0),
        }
    }

    /// Replace the snapshot; returns the new generation
    pub fn install(&self, params: PipelineParams) -> Result<u64, AudioError> {
        let mut current = self.current.write().map_err(|_| AudioError::LockPoisoned {
            component: "param_store".to_string(),
        })?;
        let generation = current.0 + 1;
        *current = (generation, Arc::new(params));
        // Published while the write lock is held so readers never see a
        // generation ahead of its snapshot
        self.generation.store(generation, Ordering::Release);
        Ok(generation)
    }

    /// Blocking read for control threads
    pub fn snapshot(&self) -> Result<Arc<PipelineParams>, AudioError> {
        self.current
            .read()
            .map(|current| Arc::clone(&current.1))
            .map_err(|_| AudioError::LockPoisoned {
                component: "param_store".to_string(),
            })
    }

    /// Non-blocking read for the streaming worker
    ///
    /// `None` while a writer holds the lock; the worker retries next frame.
    pub fn try_snapshot(&self) -> Option<(u64, Arc<PipelineParams>)> {
        self.current
            .try_read()
            .ok()
            .map(|current| (current.0, Arc::clone(&current.1)))
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}
