// DSP module - signal processing for the amplification path
//
// This module provides the per-sample building blocks used by the audio
// pipeline and the offline WAV tool:
// - Envelope following with attack/release smoothing
// - Complementary Linkwitz-Riley band splitting
// - Multi-band compression with static make-up gain

pub mod compressor;
pub mod crossover;
pub mod envelope;
pub mod params;

pub use compressor::{amplify, from_pcm, to_pcm, MultiBandCompressor};
pub use crossover::Crossover;
pub use envelope::{time_coefficient, EnvelopeFollower};
pub use params::{BandCompressorParams, CompressorParams};
