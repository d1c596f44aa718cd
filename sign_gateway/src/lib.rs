//! Sign recognition gateway: temporal stabilization in front of the
//! single-frame inference service.

pub mod classifier;
pub mod config;
pub mod error;
pub mod routes;
pub mod service;
pub mod sessions;
pub mod smoothing;
pub mod types;

pub use classifier::{FrameClassifier, HttpClassifier};
pub use error::GatewayError;
pub use routes::{router, AppState};
pub use service::StabilizationService;
