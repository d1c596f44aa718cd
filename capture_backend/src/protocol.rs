use serde::{Deserialize, Serialize};
use sign_core::{Hand, SequenceOutcome};

use crate::smooth_client::SmoothedReply;

pub const RETRY_MESSAGE: &str = "Not recognized, please try again";
pub const HOLD_MESSAGE: &str = "Hold the sign steady";

/// Single-frame answers only count as correct at or above this confidence.
pub const CORRECT_CONFIDENCE: f32 = 0.85;

/// How a connection turns landmarks into a verdict: one 60-step sequence per
/// attempt, or a stream of throttled single-frame calls through the
/// stabilization gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    #[default]
    Sequence,
    SingleFrame,
}

/// Messages from the landmark source (the browser page running the hand model).
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Frame {
        #[serde(default)]
        hands: Vec<Hand>,
    },
    SetTarget {
        target: String,
        /// Keeps the connection's current mode when absent.
        #[serde(default)]
        mode: Option<CaptureMode>,
    },
    Reset,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    State {
        state: &'static str,
        frame_count: usize,
    },
    #[serde(rename_all = "camelCase")]
    Result {
        label: Option<String>,
        confidence: f32,
        success: bool,
        matches_target: bool,
        message: String,
    },
}

impl ServerMessage {
    pub fn from_outcome(outcome: &SequenceOutcome, target: Option<&str>) -> Self {
        match outcome {
            SequenceOutcome::Recognized { label, confidence } => {
                let matches_target = target.is_some_and(|t| t.eq_ignore_ascii_case(label));
                ServerMessage::Result {
                    label: Some(label.clone()),
                    confidence: *confidence,
                    success: true,
                    matches_target,
                    message: if matches_target {
                        "Correct!".to_string()
                    } else {
                        format!("Recognized {}", label)
                    },
                }
            }
            SequenceOutcome::NotRecognized { confidence } => ServerMessage::Result {
                label: None,
                confidence: *confidence,
                success: false,
                matches_target: false,
                message: RETRY_MESSAGE.to_string(),
            },
            SequenceOutcome::Failed { .. } => ServerMessage::Result {
                label: None,
                confidence: 0.0,
                success: false,
                matches_target: false,
                message: RETRY_MESSAGE.to_string(),
            },
        }
    }

    /// Builds the verdict for one stabilized single-frame answer. The
    /// stabilized label is preferred over the raw one; either only matches
    /// the target at `CORRECT_CONFIDENCE` or above.
    pub fn from_smoothed(reply: &SmoothedReply, target: Option<&str>) -> Self {
        let label = reply.final_label.as_deref().unwrap_or(&reply.label);
        let matches_target = reply.confidence >= CORRECT_CONFIDENCE
            && target.is_some_and(|t| t.eq_ignore_ascii_case(label));
        let message = if matches_target {
            "Correct!".to_string()
        } else if reply.is_stable {
            format!("Recognized {}", label)
        } else {
            HOLD_MESSAGE.to_string()
        };
        ServerMessage::Result {
            label: (!label.is_empty()).then(|| label.to_string()),
            confidence: reply.confidence,
            success: reply.is_stable,
            matches_target,
            message,
        }
    }
}
