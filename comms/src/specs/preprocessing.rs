use serde::{Deserialize, Serialize};

/// The fitted state of a standard scaler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScalerSpec {
    pub features: Vec<String>,
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
    pub samples_seen: usize,
}

/// The fitted state of a label encoder, `classes` is sorted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EncoderSpec {
    pub feature: String,
    pub classes: Vec<String>,
}

/// The three fitted preprocessors that travel with a model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundleSpec {
    pub env_scaler: ScalerSpec,
    pub wearable_scaler: ScalerSpec,
    pub text_encoder: EncoderSpec,
}
