use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::task::JoinHandle;

use crate::classifier::FrameClassifier;
use crate::config::SESSION_TTL;
use crate::error::GatewayError;
use crate::sessions::SessionStore;
use crate::types::{FrameInput, HealthStatus, PredictionResult, StabilizedResult};

/// Wraps the single-frame classifier with per-session temporal smoothing.
pub struct StabilizationService {
    classifier: Arc<dyn FrameClassifier>,
    sessions: SessionStore,
    ttl: Duration,
}

impl StabilizationService {
    pub fn new(classifier: Arc<dyn FrameClassifier>) -> Self {
        Self::with_ttl(classifier, SESSION_TTL)
    }

    pub fn with_ttl(classifier: Arc<dyn FrameClassifier>, ttl: Duration) -> Self {
        Self {
            classifier,
            sessions: SessionStore::new(),
            ttl,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Classifies one frame and folds it into the session's history. A failed
    /// classification leaves the history untouched.
    pub async fn predict(
        &self,
        session_id: &str,
        input: &FrameInput,
    ) -> Result<StabilizedResult, GatewayError> {
        let prediction = self.predict_raw(input).await?;
        let result = self.sessions.record(session_id, prediction, Instant::now());
        tracing::debug!(
            session_id,
            label = %result.label,
            confidence = result.confidence,
            history = result.history_length,
            stable = result.is_stable,
            "smoothed prediction"
        );
        Ok(result)
    }

    /// Classifies one frame without touching any session.
    pub async fn predict_raw(&self, input: &FrameInput) -> Result<PredictionResult, GatewayError> {
        input.validate()?;
        self.classifier.classify(input).await
    }

    pub fn reset(&self, session_id: &str) {
        if self.sessions.remove(session_id) {
            tracing::debug!(session_id, "session history reset");
        }
    }

    pub async fn health(&self) -> Result<HealthStatus, GatewayError> {
        self.classifier.health().await
    }

    pub fn evict_stale(&self, now: Instant) -> usize {
        let cleaned = self.sessions.evict_stale(now, self.ttl);
        if cleaned > 0 {
            tracing::debug!("cleaned up {} stale sessions", cleaned);
        }
        cleaned
    }

    /// Runs the eviction sweep every `period` until the task is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // first tick fires immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                service.evict_stale(Instant::now());
            }
        })
    }
}
