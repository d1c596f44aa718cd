use std::{path::Path, time::Duration};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::protocol::CaptureMode;

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CaptureConfig {
    pub bind_addr: String,
    pub sequence_base_url: String,
    pub gateway_base_url: String,
    /// Mode a new connection starts in; `set_target` can switch it.
    pub mode: CaptureMode,
    pub timeout_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8765".to_string(),
            sequence_base_url: "http://localhost:8000".to_string(),
            gateway_base_url: "http://localhost:3001".to_string(),
            mode: CaptureMode::Sequence,
            timeout_ms: 5000,
        }
    }
}

impl CaptureConfig {
    /// Reads the JSON config at `path`. A missing file yields the defaults;
    /// an unreadable or malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&data).with_context(|| format!("invalid config JSON in {}", path.display()))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let cfg: CaptureConfig =
            serde_json::from_str(r#"{ "sequence_base_url": "http://infer:9000" }"#).unwrap();
        assert_eq!(cfg.sequence_base_url, "http://infer:9000");
        assert_eq!(cfg.bind_addr, "0.0.0.0:8765");
        assert_eq!(cfg.timeout(), Duration::from_secs(5));
        assert_eq!(cfg.mode, CaptureMode::Sequence);
        assert_eq!(cfg.gateway_base_url, "http://localhost:3001");
    }

    #[test]
    fn test_single_frame_mode_from_config() {
        let cfg: CaptureConfig = serde_json::from_str(r#"{ "mode": "single_frame" }"#).unwrap();
        assert_eq!(cfg.mode, CaptureMode::SingleFrame);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let cfg = CaptureConfig::load(Path::new("does/not/exist.json")).unwrap();
        assert_eq!(cfg.timeout_ms, 5000);
    }
}
