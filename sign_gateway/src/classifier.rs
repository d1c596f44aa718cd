use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use sign_core::{Handedness, LandmarkPoint};

use crate::error::GatewayError;
use crate::types::{FrameInput, HealthStatus, PredictionResult};

/// Single-frame inference backend.
#[async_trait]
pub trait FrameClassifier: Send + Sync {
    async fn classify(&self, input: &FrameInput) -> Result<PredictionResult, GatewayError>;
    async fn health(&self) -> Result<HealthStatus, GatewayError>;
}

#[derive(Serialize)]
struct LandmarksBody<'a> {
    handed: Handedness,
    landmarks: &'a [LandmarkPoint],
}

#[derive(Serialize)]
struct FeaturesBody<'a> {
    features: &'a [f32],
}

#[derive(Deserialize)]
struct HealthJson {
    status: String,
    #[serde(default)]
    available_classes: Vec<String>,
}

#[derive(Deserialize)]
struct ErrorJson {
    detail: Option<serde_json::Value>,
}

/// Talks to the Python inference service over HTTP.
pub struct HttpClassifier {
    client: reqwest::Client,
    base_url: String,
}

impl HttpClassifier {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<PredictionResult, GatewayError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(map_transport)?;
        let resp = check_status(resp).await?;
        resp.json::<PredictionResult>()
            .await
            .map_err(|e| GatewayError::Internal(format!("bad inference response: {}", e)))
    }
}

#[async_trait]
impl FrameClassifier for HttpClassifier {
    async fn classify(&self, input: &FrameInput) -> Result<PredictionResult, GatewayError> {
        match input {
            FrameInput::Landmarks {
                handedness,
                landmarks,
            } => {
                let body = LandmarksBody {
                    handed: *handedness,
                    landmarks,
                };
                self.post("/predict/landmarks", &body).await
            }
            FrameInput::Features { features } => {
                self.post("/predict/features", &FeaturesBody { features }).await
            }
        }
    }

    async fn health(&self) -> Result<HealthStatus, GatewayError> {
        let url = format!("{}/health", self.base_url);
        let resp = self.client.get(&url).send().await.map_err(|e| {
            tracing::error!("inference health check failed: {}", e);
            GatewayError::ServiceUnavailable
        })?;
        if !resp.status().is_success() {
            return Err(GatewayError::ServiceUnavailable);
        }
        let h: HealthJson = resp
            .json()
            .await
            .map_err(|_| GatewayError::ServiceUnavailable)?;
        Ok(HealthStatus {
            status: h.status,
            classes: h.available_classes,
        })
    }
}

fn map_transport(e: reqwest::Error) -> GatewayError {
    if e.is_connect() || e.is_timeout() {
        tracing::warn!("inference service unreachable: {}", e);
        GatewayError::ServiceUnavailable
    } else {
        GatewayError::Internal(e.to_string())
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == StatusCode::BAD_REQUEST || status == StatusCode::UNPROCESSABLE_ENTITY {
        let detail = match resp.json::<ErrorJson>().await {
            Ok(ErrorJson {
                detail: Some(serde_json::Value::String(s)),
            }) => s,
            Ok(ErrorJson { detail: Some(v) }) => v.to_string(),
            _ => status.to_string(),
        };
        return Err(GatewayError::InvalidInput(detail));
    }
    if status.is_server_error() {
        tracing::warn!(%status, "inference service returned an error");
        return Err(GatewayError::BadGateway);
    }
    Err(GatewayError::Internal(format!("unexpected status {}", status)))
}
