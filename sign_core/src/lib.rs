//! Landmark data model and the client-side capture state machine shared by
//! the gateway and the capture backend.

pub mod capture;
pub mod landmarks;
pub mod throttle;

pub use capture::{
    step, CaptureEffect, CaptureEvent, CaptureMachine, CaptureState, FrameStep, SequenceOutcome,
    ABSENCE_END_FRAMES, PRESENCE_START_FRAMES, SEQ_LEN, TARGET_FPS,
};
pub use landmarks::{
    hand_features, sequence_step, validate_features, validate_landmarks, Hand, HandsFrame,
    Handedness, LandmarkError, LandmarkPoint, HAND_FEATURES, NUM_LANDMARKS, STEP_FEATURES,
};
pub use throttle::FrameThrottle;
