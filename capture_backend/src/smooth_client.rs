use std::time::Duration;

use serde::{Deserialize, Serialize};
use sign_core::{Hand, Handedness, LandmarkPoint};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SmoothError {
    #[error("stabilization gateway unreachable: {0}")]
    Unavailable(String),
    #[error("stabilization gateway returned {0}")]
    Status(u16),
    #[error("bad stabilization response: {0}")]
    Decode(String),
}

#[derive(Serialize)]
struct FrameBody<'a> {
    handedness: Handedness,
    landmarks: &'a [LandmarkPoint],
}

/// The part of the gateway's stabilized answer the capture side reads.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmoothedReply {
    pub label: String,
    pub confidence: f32,
    #[serde(default)]
    pub final_label: Option<String>,
    #[serde(default)]
    pub is_stable: bool,
    #[serde(default)]
    pub history_length: usize,
}

/// Client for the gateway's `/api/sign` smoothing routes.
#[derive(Clone)]
pub struct SmoothClient {
    client: reqwest::Client,
    base: String,
}

impl SmoothClient {
    pub fn new(gateway_base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base: format!("{}/api/sign", gateway_base_url.trim_end_matches('/')),
        })
    }

    pub async fn predict(&self, session_id: &str, hand: &Hand) -> Result<SmoothedReply, SmoothError> {
        let resp = self
            .client
            .post(format!("{}/predict/smooth", self.base))
            .query(&[("sessionId", session_id)])
            .json(&FrameBody {
                handedness: hand.handedness,
                landmarks: &hand.landmarks,
            })
            .send()
            .await
            .map_err(|e| SmoothError::Unavailable(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(SmoothError::Status(resp.status().as_u16()));
        }
        resp.json().await.map_err(|e| SmoothError::Decode(e.to_string()))
    }

    /// Drops the gateway's history for `session_id`.
    pub async fn reset(&self, session_id: &str) -> Result<(), SmoothError> {
        let resp = self
            .client
            .delete(format!("{}/session/{}", self.base, session_id))
            .send()
            .await
            .map_err(|e| SmoothError::Unavailable(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(SmoothError::Status(resp.status().as_u16()));
        }
        Ok(())
    }
}
