use crate::audio::PipelineParams;
use crate::dsp::CompressorParams;

/// Flat view of the active pipeline parameters for the UI
///
/// In amplification mode the band arrays are empty and `amplification`
/// holds the factor.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ActiveParams {
    pub amplification: Option<f32>,
    pub threshold_db: Vec<f32>,
    pub ratio: Vec<f32>,
    pub attack_seconds: Vec<f32>,
    pub release_seconds: Vec<f32>,
    pub gain_db: Vec<f32>,
}

impl ActiveParams {
    pub fn from_compressor(params: &CompressorParams) -> Self {
        Self {
            amplification: None,
            threshold_db: params.threshold_db(),
            ratio: params.ratio(),
            attack_seconds: params.attack_seconds(),
            release_seconds: params.release_seconds(),
            gain_db: params.gain_db(),
        }
    }
}

impl From<&PipelineParams> for ActiveParams {
    fn from(params: &PipelineParams) -> Self {
        match params {
            PipelineParams::Compressor(compressor) => Self::from_compressor(compressor),
            PipelineParams::Amplify { factor } => Self {
                amplification: Some(*factor),
                threshold_db: Vec::new(),
                ratio: Vec::new(),
                attack_seconds: Vec::new(),
                release_seconds: Vec::new(),
                gain_db: Vec::new(),
            },
        }
    }
}
