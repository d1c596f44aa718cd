use std::time::Duration;

use anyhow::{Context, Result};

/// Idle time after which a session's history is dropped.
pub const SESSION_TTL: Duration = Duration::from_secs(5 * 60);
/// How often the eviction sweep runs.
pub const SWEEP_PERIOD: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub infer_base_url: String,
    pub port: u16,
    pub infer_timeout: Duration,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        let infer_base_url = std::env::var("INFER_BASE_URL")
            .or_else(|_| std::env::var("PYTHON_INFER_BASE_URL"))
            .unwrap_or_else(|_| "http://localhost:8000".to_string());
        let port = match std::env::var("PORT") {
            Ok(s) => s.parse().with_context(|| format!("invalid PORT {:?}", s))?,
            Err(_) => 3001,
        };
        let timeout_ms: u64 = match std::env::var("INFER_TIMEOUT_MS") {
            Ok(s) => s
                .parse()
                .with_context(|| format!("invalid INFER_TIMEOUT_MS {:?}", s))?,
            Err(_) => 5000,
        };
        Ok(Self {
            infer_base_url,
            port,
            infer_timeout: Duration::from_millis(timeout_ms),
        })
    }
}
