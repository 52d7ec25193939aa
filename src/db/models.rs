//! Database model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One network-wide measurement tick.
///
/// `rx_bytes`/`tx_bytes` are cumulative counters summed across non-loopback
/// interfaces since boot, not deltas. Rates are derived by subtracting
/// consecutive samples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub latency_ms: Option<f64>,
    pub packet_loss_pct: f64,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// A device seen on the local network, keyed by IP.
///
/// IP is the identity key even though MAC/hostname may be more truly
/// identifying; `last_seen` only ever moves forward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub ip: String,
    pub mac: Option<String>,
    pub hostname: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
}

/// One per-device measurement tick.
///
/// Byte counters are best-effort; the host OS does not reliably expose
/// per-IP traffic, so they may be absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSample {
    pub device_ip: String,
    pub timestamp: DateTime<Utc>,
    pub latency_ms: Option<f64>,
    pub packet_loss_pct: Option<f64>,
    pub up: bool,
    pub rx_bytes: Option<u64>,
    pub tx_bytes: Option<u64>,
}

/// A device as reported by discovery, before it has any sample history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    pub ip: String,
    pub mac: Option<String>,
    pub hostname: Option<String>,
}
