//! In-process fakes of the sequence inference service and the stabilization
//! gateway, bound on ephemeral ports.

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, post},
    Json, Router,
};
use serde_json::{json, Value};
use sign_core::{SEQ_LEN, STEP_FEATURES};
use tokio::net::TcpListener;

/// Stabilized after this many frames in one session.
pub const FAKE_STABLE_AFTER: usize = 3;

async fn spawn(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Sequence service answering every well-formed request with `status`
/// (label "A" on success).
pub async fn spawn_sequence_service(status: StatusCode) -> String {
    let app = Router::new()
        .route(
            "/sequence/predict-raw",
            post(|State(status): State<StatusCode>, Json(body): Json<Value>| async move {
                let frames = body["frames"].as_array().cloned().unwrap_or_default();
                let well_formed = frames.len() == SEQ_LEN
                    && frames
                        .iter()
                        .all(|f| f.as_array().map(Vec::len) == Some(STEP_FEATURES));
                if !well_formed {
                    return (StatusCode::BAD_REQUEST, Json(json!({ "detail": "bad shape" })));
                }
                if !status.is_success() {
                    return (status, Json(json!({ "detail": "boom" })));
                }
                (
                    StatusCode::OK,
                    Json(json!({ "label": "A", "confidence": 0.93, "success": true })),
                )
            }),
        )
        .with_state(status);
    format!("http://{}", spawn(app).await)
}

#[derive(Clone, Default)]
struct GatewayState {
    counts: Arc<Mutex<HashMap<String, usize>>>,
    deleted: Arc<Mutex<Vec<String>>>,
}

pub struct FakeGateway {
    addr: SocketAddr,
    state: GatewayState,
}

impl FakeGateway {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.deleted.lock().unwrap().clone()
    }
}

async fn fake_smooth(
    State(state): State<GatewayState>,
    Query(params): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let landmarks = body["landmarks"].as_array().map(Vec::len).unwrap_or(0);
    if body.get("handedness").is_none() || landmarks != 21 {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "bad body" })));
    }
    let session = params.get("sessionId").cloned().unwrap_or_default();
    let n = {
        let mut counts = state.counts.lock().unwrap();
        let n = counts.entry(session).or_default();
        *n = (*n + 1).min(7);
        *n
    };
    let stable = n >= FAKE_STABLE_AFTER;
    let confidence = if stable { 0.9 } else { 0.7 };
    let final_label = stable.then_some("A");
    (
        StatusCode::OK,
        Json(json!({
            "label": "a",
            "confidence": confidence,
            "classIndex": 0,
            "rawProbabilities": [0.9, 0.1],
            "finalLabel": final_label,
            "isStable": stable,
            "historyLength": n,
        })),
    )
}

async fn fake_reset(State(state): State<GatewayState>, Path(session): Path<String>) -> StatusCode {
    state.counts.lock().unwrap().remove(&session);
    state.deleted.lock().unwrap().push(session);
    StatusCode::NO_CONTENT
}

/// Gateway that always sees label "a" and stabilizes it after
/// `FAKE_STABLE_AFTER` frames per session. Confidence is 0.7 before that and
/// 0.9 once stable.
pub async fn spawn_gateway() -> FakeGateway {
    let state = GatewayState::default();
    let app = Router::new()
        .route("/api/sign/predict/smooth", post(fake_smooth))
        .route("/api/sign/session/:session_id", delete(fake_reset))
        .with_state(state.clone());
    FakeGateway {
        addr: spawn(app).await,
        state,
    }
}
