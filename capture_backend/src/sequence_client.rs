use std::time::Duration;

use serde::{Deserialize, Serialize};
use sign_core::{SequenceOutcome, SEQ_LEN, STEP_FEATURES};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SequenceError {
    #[error("expected {SEQ_LEN} frames of {STEP_FEATURES} features")]
    Shape,
    #[error("sequence service unreachable: {0}")]
    Unavailable(String),
    #[error("sequence service returned {0}")]
    Status(u16),
    #[error("bad sequence response: {0}")]
    Decode(String),
}

#[derive(Serialize)]
struct SequenceBody<'a> {
    frames: &'a [Vec<f32>],
}

#[derive(Debug, Deserialize)]
pub struct SequenceResponse {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub confidence: f32,
    pub success: bool,
}

impl SequenceResponse {
    pub fn into_outcome(self) -> SequenceOutcome {
        match self.label {
            Some(label) if self.success && !label.is_empty() => SequenceOutcome::Recognized {
                label,
                confidence: self.confidence,
            },
            _ => SequenceOutcome::NotRecognized {
                confidence: self.confidence,
            },
        }
    }
}

/// Client for the sequence inference endpoint.
#[derive(Clone)]
pub struct SequenceClient {
    client: reqwest::Client,
    url: String,
}

impl SequenceClient {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: format!("{}/sequence/predict-raw", base_url.trim_end_matches('/')),
        })
    }

    pub async fn predict(&self, frames: &[Vec<f32>]) -> Result<SequenceResponse, SequenceError> {
        if frames.len() != SEQ_LEN || frames.iter().any(|f| f.len() != STEP_FEATURES) {
            return Err(SequenceError::Shape);
        }
        let resp = self
            .client
            .post(&self.url)
            .json(&SequenceBody { frames })
            .send()
            .await
            .map_err(|e| SequenceError::Unavailable(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(SequenceError::Status(resp.status().as_u16()));
        }
        resp.json()
            .await
            .map_err(|e| SequenceError::Decode(e.to_string()))
    }

    /// Like `predict`, but folds every failure into `SequenceOutcome::Failed`
    /// so the capture loop always advances.
    pub async fn outcome(&self, frames: &[Vec<f32>]) -> SequenceOutcome {
        match self.predict(frames).await {
            Ok(resp) => resp.into_outcome(),
            Err(e) => {
                tracing::warn!("sequence prediction failed: {}", e);
                SequenceOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}
