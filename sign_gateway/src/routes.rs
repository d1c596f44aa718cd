use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    routing::{delete, get, post},
    Json, Router,
};

use crate::error::GatewayError;
use crate::service::StabilizationService;
use crate::types::{FrameInput, HealthStatus, PredictionResult, SmoothParams, StabilizedResult};

pub const SESSION_HEADER: &str = "x-session-id";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<StabilizationService>,
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/predict", post(predict))
        .route("/predict/landmarks", post(predict_landmarks))
        .route("/predict/features", post(predict_features))
        .route("/predict/smooth", post(predict_smooth))
        .route("/session/:session_id", delete(reset_session));

    Router::new().nest("/api/sign", api).with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<Json<HealthStatus>, GatewayError> {
    Ok(Json(state.service.health().await?))
}

async fn predict(
    State(state): State<AppState>,
    payload: Result<Json<FrameInput>, JsonRejection>,
) -> Result<Json<PredictionResult>, GatewayError> {
    let Json(input) = payload?;
    tracing::debug!(kind = input.kind(), "raw prediction request");
    Ok(Json(state.service.predict_raw(&input).await?))
}

async fn predict_landmarks(
    state: State<AppState>,
    payload: Result<Json<FrameInput>, JsonRejection>,
) -> Result<Json<PredictionResult>, GatewayError> {
    predict(state, Ok(expect_kind(payload?, "landmarks")?)).await
}

async fn predict_features(
    state: State<AppState>,
    payload: Result<Json<FrameInput>, JsonRejection>,
) -> Result<Json<PredictionResult>, GatewayError> {
    predict(state, Ok(expect_kind(payload?, "features")?)).await
}

/// Rejects a body of the other kind on the kind-specific routes.
fn expect_kind(
    Json(input): Json<FrameInput>,
    kind: &'static str,
) -> Result<Json<FrameInput>, GatewayError> {
    if input.kind() != kind {
        return Err(GatewayError::InvalidInput(format!(
            "expected a {} body, got {}",
            kind,
            input.kind()
        )));
    }
    Ok(Json(input))
}

async fn predict_smooth(
    State(state): State<AppState>,
    Query(params): Query<SmoothParams>,
    payload: Result<Json<FrameInput>, JsonRejection>,
) -> Result<(HeaderMap, Json<StabilizedResult>), GatewayError> {
    let Json(input) = payload?;
    let session_id = match params.session_id {
        Some(id) if !id.is_empty() => id,
        _ => generate_session_id(),
    };

    let result = state.service.predict(&session_id, &input).await?;

    let mut headers = HeaderMap::new();
    if let Ok(v) = HeaderValue::from_str(&session_id) {
        headers.insert(SESSION_HEADER, v);
    }
    Ok((headers, Json(result)))
}

async fn reset_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> StatusCode {
    state.service.reset(&session_id);
    StatusCode::NO_CONTENT
}

fn generate_session_id() -> String {
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("session_{}_{}", now_ms, uuid::Uuid::new_v4().simple())
}
