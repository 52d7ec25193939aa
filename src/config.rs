//! Configuration loaded from environment variables with sensible defaults.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use crate::device_health::{Threshold, Thresholds};

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP port for the web server (default: 8080)
    pub http_port: u16,
    /// Path to the SQLite database file (default: "netpulse.db")
    pub db_path: String,
    /// Sampling tick interval (default: 5s)
    pub sample_interval: Duration,
    /// How long to keep sample history (default: 7 days)
    pub retention: Duration,
    /// Reference host for the network-wide ping (default: 8.8.8.8)
    pub ping_target: String,
    /// Global threshold plus per-device overrides
    pub thresholds: Thresholds,
    /// Gemini API key; absent means rule-based diagnosis only
    pub gemini_api_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 8080,
            db_path: "netpulse.db".to_string(),
            sample_interval: Duration::from_secs(5),
            retention: Duration::from_secs(7 * 24 * 3600),
            ping_target: "8.8.8.8".to_string(),
            thresholds: Thresholds::default(),
            gemini_api_key: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `NETPULSE_HTTP_PORT`: HTTP port
    /// - `NETPULSE_DB_PATH`: database file path
    /// - `NETPULSE_SAMPLE_INTERVAL_SECS`: sampling interval in seconds
    /// - `NETPULSE_RETENTION_SECS`: sample retention in seconds
    /// - `NETPULSE_PING_TARGET`: reference ping host
    /// - `NETPULSE_DEVICE_THRESHOLDS`: JSON map of per-device overrides,
    ///   e.g. `{"192.168.1.5": {"latency_ms": 150.0, "loss_pct": 2.0}}`
    /// - `GEMINI_API_KEY`: enables the LLM diagnoser when present
    pub fn load() -> Self {
        let mut cfg = Self::default();

        if let Ok(port_str) = env::var("NETPULSE_HTTP_PORT") {
            if let Ok(port) = port_str.parse() {
                cfg.http_port = port;
            }
        }

        if let Ok(db_path) = env::var("NETPULSE_DB_PATH") {
            cfg.db_path = db_path;
        }

        if let Ok(interval_str) = env::var("NETPULSE_SAMPLE_INTERVAL_SECS") {
            if let Ok(secs) = interval_str.parse::<u64>() {
                if secs > 0 {
                    cfg.sample_interval = Duration::from_secs(secs);
                }
            }
        }

        if let Ok(retention_str) = env::var("NETPULSE_RETENTION_SECS") {
            if let Ok(secs) = retention_str.parse::<u64>() {
                if secs > 0 {
                    cfg.retention = Duration::from_secs(secs);
                }
            }
        }

        if let Ok(target) = env::var("NETPULSE_PING_TARGET") {
            cfg.ping_target = target;
        }

        if let Ok(overrides_json) = env::var("NETPULSE_DEVICE_THRESHOLDS") {
            match serde_json::from_str::<HashMap<String, Threshold>>(&overrides_json) {
                Ok(per_device) => cfg.thresholds.per_device = per_device,
                Err(e) => {
                    tracing::warn!("Ignoring unparseable NETPULSE_DEVICE_THRESHOLDS: {}", e)
                }
            }
        }

        if let Ok(key) = env::var("GEMINI_API_KEY") {
            if !key.is_empty() {
                cfg.gemini_api_key = Some(key);
            }
        }

        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.http_port, 8080);
        assert_eq!(cfg.db_path, "netpulse.db");
        assert_eq!(cfg.sample_interval, Duration::from_secs(5));
        assert_eq!(cfg.thresholds.global.latency_ms, 200.0);
        assert_eq!(cfg.thresholds.global.loss_pct, 5.0);
        assert!(cfg.gemini_api_key.is_none());
    }

    #[test]
    fn test_threshold_overrides_parse() {
        let json = r#"{"192.168.1.5": {"latency_ms": 150.0, "loss_pct": 2.0}}"#;
        let per_device: HashMap<String, Threshold> = serde_json::from_str(json).unwrap();
        assert_eq!(per_device["192.168.1.5"].latency_ms, 150.0);
    }
}
