//! Frame capture and sequencing state machine.
//!
//! Brackets one gesture attempt into exactly one `SEQ_LEN`-step sequence
//! without the caller marking start/stop: a hand has to be present for
//! `PRESENCE_START_FRAMES` frames to start recording, and absent for
//! `ABSENCE_END_FRAMES` frames after a prediction before the machine re-arms.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::landmarks::{sequence_step, HandsFrame};
use crate::throttle::FrameThrottle;

/// Steps per submitted sequence.
pub const SEQ_LEN: usize = 60;
/// Consecutive frames with a hand needed to leave `Idle`.
pub const PRESENCE_START_FRAMES: u32 = 5;
/// Consecutive frames without a hand needed to leave `WaitAbsence`.
pub const ABSENCE_END_FRAMES: u32 = 10;
/// Accepted frames per second.
pub const TARGET_FPS: u32 = 30;

/// Result of one sequence inference attempt, as the capture loop sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SequenceOutcome {
    Recognized { label: String, confidence: f32 },
    NotRecognized { confidence: f32 },
    Failed { reason: String },
}

impl SequenceOutcome {
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Recognized { label, .. } => Some(label),
            _ => None,
        }
    }

    pub fn confidence(&self) -> f32 {
        match self {
            Self::Recognized { confidence, .. } | Self::NotRecognized { confidence } => *confidence,
            Self::Failed { .. } => 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureState {
    Idle { presence: u32 },
    Recording { buffer: Vec<Vec<f32>> },
    Predicting { attempt: u64 },
    WaitAbsence {
        absence: u32,
        last_outcome: Option<SequenceOutcome>,
    },
}

impl CaptureState {
    pub fn idle() -> Self {
        Self::Idle { presence: 0 }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle { .. } => "idle",
            Self::Recording { .. } => "recording",
            Self::Predicting { .. } => "predicting",
            Self::WaitAbsence { .. } => "wait_absence",
        }
    }

    /// Steps buffered so far; only non-zero while recording.
    pub fn frame_count(&self) -> usize {
        match self {
            Self::Recording { buffer } => buffer.len(),
            _ => 0,
        }
    }

    pub fn last_outcome(&self) -> Option<&SequenceOutcome> {
        match self {
            Self::WaitAbsence { last_outcome, .. } => last_outcome.as_ref(),
            _ => None,
        }
    }
}

impl Default for CaptureState {
    fn default() -> Self {
        Self::idle()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    Frame(HandsFrame),
    InferenceCompleted { attempt: u64, outcome: SequenceOutcome },
    Reset,
}

/// Side effect requested by a transition. The caller owns the I/O.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEffect {
    SubmitSequence { attempt: u64, frames: Vec<Vec<f32>> },
}

/// Pure transition function. `next_attempt` is the id handed out if this
/// step completes a sequence.
pub fn step(
    state: CaptureState,
    event: CaptureEvent,
    next_attempt: u64,
) -> (CaptureState, Option<CaptureEffect>) {
    match (state, event) {
        (_, CaptureEvent::Reset) => (CaptureState::idle(), None),

        (CaptureState::Idle { presence }, CaptureEvent::Frame(frame)) => {
            let presence = if frame.has_hand() { presence + 1 } else { 0 };
            if presence >= PRESENCE_START_FRAMES {
                (
                    CaptureState::Recording {
                        buffer: Vec::with_capacity(SEQ_LEN),
                    },
                    None,
                )
            } else {
                (CaptureState::Idle { presence }, None)
            }
        }

        // Occlusion mid-gesture does not abort: every frame is buffered.
        (CaptureState::Recording { mut buffer }, CaptureEvent::Frame(frame)) => {
            buffer.push(sequence_step(&frame));
            if buffer.len() == SEQ_LEN {
                let frames = std::mem::take(&mut buffer);
                (
                    CaptureState::Predicting {
                        attempt: next_attempt,
                    },
                    Some(CaptureEffect::SubmitSequence {
                        attempt: next_attempt,
                        frames,
                    }),
                )
            } else {
                (CaptureState::Recording { buffer }, None)
            }
        }

        (state @ CaptureState::Predicting { .. }, CaptureEvent::Frame(_)) => (state, None),

        (CaptureState::Predicting { attempt }, CaptureEvent::InferenceCompleted { attempt: done, outcome })
            if attempt == done =>
        {
            (
                CaptureState::WaitAbsence {
                    absence: 0,
                    last_outcome: Some(outcome),
                },
                None,
            )
        }

        (CaptureState::WaitAbsence { absence, last_outcome }, CaptureEvent::Frame(frame)) => {
            let absence = if frame.has_hand() { 0 } else { absence + 1 };
            if absence >= ABSENCE_END_FRAMES {
                (CaptureState::idle(), None)
            } else {
                (CaptureState::WaitAbsence { absence, last_outcome }, None)
            }
        }

        // Completion for an attempt that was reset or superseded.
        (state, CaptureEvent::InferenceCompleted { .. }) => (state, None),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameStep {
    Throttled,
    Accepted,
    Submit(CaptureEffect),
}

/// Drives `step` for one camera stream: owns the throttle, the target gesture
/// and the attempt counter.
#[derive(Debug)]
pub struct CaptureMachine {
    state: CaptureState,
    throttle: FrameThrottle,
    target: Option<String>,
    next_attempt: u64,
}

impl CaptureMachine {
    pub fn new() -> Self {
        Self {
            state: CaptureState::idle(),
            throttle: FrameThrottle::new(TARGET_FPS),
            target: None,
            next_attempt: 1,
        }
    }

    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn frame_count(&self) -> usize {
        self.state.frame_count()
    }

    /// Changing the target discards any in-flight capture.
    pub fn set_target(&mut self, target: impl Into<String>) {
        let target = target.into();
        if self.target.as_deref() != Some(target.as_str()) {
            debug!(%target, "target changed, resetting capture");
            self.target = Some(target);
            self.reset();
        }
    }

    pub fn reset(&mut self) {
        self.throttle.reset();
        self.apply(CaptureEvent::Reset);
    }

    /// Feeds one landmark callback. Frames dropped by the throttle leave the
    /// state untouched.
    pub fn on_frame(&mut self, now: Instant, frame: HandsFrame) -> FrameStep {
        if !self.throttle.accept(now) {
            return FrameStep::Throttled;
        }
        match self.apply(CaptureEvent::Frame(frame)) {
            Some(effect) => FrameStep::Submit(effect),
            None => FrameStep::Accepted,
        }
    }

    pub fn on_inference(&mut self, attempt: u64, outcome: SequenceOutcome) {
        self.apply(CaptureEvent::InferenceCompleted { attempt, outcome });
    }

    fn apply(&mut self, event: CaptureEvent) -> Option<CaptureEffect> {
        let before = self.state.name();
        let state = std::mem::take(&mut self.state);
        let (next, effect) = step(state, event, self.next_attempt);
        if effect.is_some() {
            self.next_attempt += 1;
        }
        if next.name() != before {
            debug!(from = before, to = next.name(), "capture transition");
        }
        self.state = next;
        effect
    }
}

impl Default for CaptureMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::{Hand, Handedness, LandmarkPoint, NUM_LANDMARKS, STEP_FEATURES};

    fn hand_frame() -> HandsFrame {
        HandsFrame::with_hand(Hand {
            handedness: Handedness::Right,
            landmarks: vec![LandmarkPoint { x: 0.5, y: 0.5, z: 0.0 }; NUM_LANDMARKS],
        })
    }

    fn feed(
        mut state: CaptureState,
        frame: &HandsFrame,
        n: usize,
    ) -> (CaptureState, Vec<CaptureEffect>) {
        let mut effects = vec![];
        for _ in 0..n {
            let (next, effect) = step(state, CaptureEvent::Frame(frame.clone()), 1);
            state = next;
            effects.extend(effect);
        }
        (state, effects)
    }

    #[test]
    fn test_four_frames_do_not_start_recording() {
        let (state, _) = feed(CaptureState::idle(), &hand_frame(), 4);
        assert_eq!(state, CaptureState::Idle { presence: 4 });
        let (state, _) = feed(state, &HandsFrame::empty(), 1);
        assert_eq!(state, CaptureState::Idle { presence: 0 });
    }

    #[test]
    fn test_fifth_frame_starts_recording() {
        let (state, _) = feed(CaptureState::idle(), &hand_frame(), 5);
        assert_eq!(state.name(), "recording");
        assert_eq!(state.frame_count(), 0);
    }

    #[test]
    fn test_submits_exactly_seq_len() {
        let (state, _) = feed(CaptureState::idle(), &hand_frame(), 5);
        let (state, effects) = feed(state, &hand_frame(), SEQ_LEN - 1);
        assert!(effects.is_empty());
        assert_eq!(state.frame_count(), SEQ_LEN - 1);

        let (state, effects) = feed(state, &HandsFrame::empty(), 1);
        assert_eq!(state, CaptureState::Predicting { attempt: 1 });
        match &effects[..] {
            [CaptureEffect::SubmitSequence { frames, .. }] => assert_eq!(frames.len(), SEQ_LEN),
            other => panic!("unexpected effects {:?}", other),
        }
    }

    #[test]
    fn test_completed_sequence_takes_next_attempt_id() {
        let state = CaptureState::Recording {
            buffer: vec![vec![0.0; STEP_FEATURES]; SEQ_LEN - 1],
        };
        let (state, effect) = step(state, CaptureEvent::Frame(hand_frame()), 42);
        assert_eq!(state, CaptureState::Predicting { attempt: 42 });
        match effect {
            Some(CaptureEffect::SubmitSequence { attempt, frames }) => {
                assert_eq!(attempt, 42);
                assert_eq!(frames.len(), SEQ_LEN);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_failed_inference_still_advances() {
        let (state, _) = step(
            CaptureState::Predicting { attempt: 3 },
            CaptureEvent::InferenceCompleted {
                attempt: 3,
                outcome: SequenceOutcome::Failed { reason: "timeout".into() },
            },
            4,
        );
        assert_eq!(state.name(), "wait_absence");
    }

    #[test]
    fn test_stale_completion_ignored() {
        let (state, _) = step(
            CaptureState::Predicting { attempt: 3 },
            CaptureEvent::InferenceCompleted {
                attempt: 2,
                outcome: SequenceOutcome::NotRecognized { confidence: 0.1 },
            },
            4,
        );
        assert_eq!(state, CaptureState::Predicting { attempt: 3 });

        let (state, _) = step(
            CaptureState::idle(),
            CaptureEvent::InferenceCompleted {
                attempt: 3,
                outcome: SequenceOutcome::NotRecognized { confidence: 0.1 },
            },
            4,
        );
        assert_eq!(state, CaptureState::idle());
    }

    #[test]
    fn test_wait_absence_requires_consecutive_absence() {
        let start = CaptureState::WaitAbsence { absence: 0, last_outcome: None };
        let (state, _) = feed(start, &HandsFrame::empty(), 9);
        let (state, _) = feed(state, &hand_frame(), 1);
        assert_eq!(state, CaptureState::WaitAbsence { absence: 0, last_outcome: None });
        let (state, _) = feed(state, &HandsFrame::empty(), 10);
        assert_eq!(state, CaptureState::idle());
    }

    #[test]
    fn test_predicting_ignores_frames() {
        let (state, effects) = feed(CaptureState::Predicting { attempt: 1 }, &hand_frame(), 30);
        assert_eq!(state, CaptureState::Predicting { attempt: 1 });
        assert!(effects.is_empty());
    }

    #[test]
    fn test_target_change_resets_machine() {
        let mut m = CaptureMachine::new();
        m.set_target("A");
        m.state = CaptureState::Recording { buffer: vec![vec![0.0; 126]; 12] };
        m.set_target("A");
        assert_eq!(m.frame_count(), 12);
        m.set_target("B");
        assert_eq!(m.state(), &CaptureState::idle());
        assert_eq!(m.target(), Some("B"));
    }
}
