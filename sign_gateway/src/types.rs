use serde::{Deserialize, Serialize};
use sign_core::{validate_features, validate_landmarks, Handedness, LandmarkError, LandmarkPoint};

/// Single-frame request body: one hand's landmarks, or precomputed features.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FrameInput {
    Landmarks {
        #[serde(alias = "handed")]
        handedness: Handedness,
        landmarks: Vec<LandmarkPoint>,
    },
    Features {
        features: Vec<f32>,
    },
}

impl FrameInput {
    pub fn validate(&self) -> Result<(), LandmarkError> {
        match self {
            FrameInput::Landmarks { landmarks, .. } => validate_landmarks(landmarks),
            FrameInput::Features { features } => validate_features(features),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FrameInput::Landmarks { .. } => "landmarks",
            FrameInput::Features { .. } => "features",
        }
    }
}

/// What the inference service answers for one frame. The raw `/predict*`
/// routes pass it through with the service's own keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub label: String,
    pub confidence: f32,
    pub class_index: usize,
    #[serde(rename = "raw_proba", default)]
    pub raw_probabilities: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StabilizedResult {
    pub label: String,
    pub confidence: f32,
    pub class_index: usize,
    pub raw_probabilities: Vec<f32>,
    pub final_label: Option<String>,
    pub is_stable: bool,
    pub history_length: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub classes: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SmoothParams {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}
