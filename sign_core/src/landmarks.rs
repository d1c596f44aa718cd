use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Points per hand produced by the landmark model.
pub const NUM_LANDMARKS: usize = 21;

/// Flattened (x, y, z) features for one hand.
pub const HAND_FEATURES: usize = NUM_LANDMARKS * 3;

/// Features per sequence time step: left hand then right hand.
pub const STEP_FEATURES: usize = HAND_FEATURES * 2;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LandmarkPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Handedness {
    Left,
    Right,
}

/// One detected hand at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hand {
    pub handedness: Handedness,
    pub landmarks: Vec<LandmarkPoint>,
}

/// Everything the landmark source reported for one camera frame (zero, one or two hands).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HandsFrame {
    #[serde(default)]
    pub hands: Vec<Hand>,
}

impl HandsFrame {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_hand(hand: Hand) -> Self {
        Self { hands: vec![hand] }
    }

    pub fn has_hand(&self) -> bool {
        !self.hands.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LandmarkError {
    #[error("expected {NUM_LANDMARKS} landmarks, got {0}")]
    LandmarkCount(usize),
    #[error("expected {HAND_FEATURES} features, got {0}")]
    FeatureCount(usize),
    #[error("non-finite value at index {0}")]
    NonFinite(usize),
}

pub fn validate_landmarks(points: &[LandmarkPoint]) -> Result<(), LandmarkError> {
    if points.len() != NUM_LANDMARKS {
        return Err(LandmarkError::LandmarkCount(points.len()));
    }
    if let Some(i) = points
        .iter()
        .position(|p| !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()))
    {
        return Err(LandmarkError::NonFinite(i));
    }
    Ok(())
}

pub fn validate_features(features: &[f32]) -> Result<(), LandmarkError> {
    if features.len() != HAND_FEATURES {
        return Err(LandmarkError::FeatureCount(features.len()));
    }
    if let Some(i) = features.iter().position(|v| !v.is_finite()) {
        return Err(LandmarkError::NonFinite(i));
    }
    Ok(())
}

/// Flattens one hand into 63 floats, or `None` if the hand is incomplete.
pub fn hand_features(points: &[LandmarkPoint]) -> Option<Vec<f32>> {
    if points.len() != NUM_LANDMARKS {
        return None;
    }
    let mut out = Vec::with_capacity(HAND_FEATURES);
    for p in points {
        out.extend_from_slice(&[p.x, p.y, p.z]);
    }
    Some(out)
}

/// Builds one 126-float sequence step. Missing or incomplete hands are zero-filled
/// so every step has the same shape.
pub fn sequence_step(frame: &HandsFrame) -> Vec<f32> {
    let mut left: Option<Vec<f32>> = None;
    let mut right: Option<Vec<f32>> = None;

    for hand in &frame.hands {
        let feats = hand_features(&hand.landmarks);
        match hand.handedness {
            Handedness::Left => left = feats,
            Handedness::Right => right = feats,
        }
    }

    let mut step = Vec::with_capacity(STEP_FEATURES);
    step.extend(left.unwrap_or_else(|| vec![0.0; HAND_FEATURES]));
    step.extend(right.unwrap_or_else(|| vec![0.0; HAND_FEATURES]));
    step
}
