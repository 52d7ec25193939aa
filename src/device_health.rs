//! Per-device threshold evaluation, sustained-violation detection, and
//! instantaneous bandwidth derivation.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{DeviceSample, Store};
use crate::stats::counter_rate;

/// Trailing window for sustained-violation counting.
pub const SUSTAINED_WINDOW_SECS: i64 = 600;
/// Violations within the window needed to call an issue sustained.
pub const SUSTAINED_MIN_VIOLATIONS: usize = 3;

/// Latency/loss limits for one device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub latency_ms: f64,
    pub loss_pct: f64,
}

impl Default for Threshold {
    fn default() -> Self {
        Self {
            latency_ms: 200.0,
            loss_pct: 5.0,
        }
    }
}

/// Threshold configuration: a global default plus per-device overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Thresholds {
    pub global: Threshold,
    #[serde(default)]
    pub per_device: HashMap<String, Threshold>,
}

impl Thresholds {
    /// Resolve the threshold for a device: override or global default.
    pub fn for_device(&self, ip: &str) -> Threshold {
        self.per_device.get(ip).copied().unwrap_or(self.global)
    }
}

/// Evaluation result for one device.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceHealth {
    /// Most recent sample exceeds its threshold.
    pub exceeded: bool,
    pub reasons: Vec<String>,
    pub bandwidth_rx_bps: Option<f64>,
    pub bandwidth_tx_bps: Option<f64>,
    /// Threshold violations over the trailing window.
    pub violation_count: usize,
    /// A coarser signal than `exceeded`: the device has been over threshold
    /// repeatedly, not just momentarily.
    pub sustained_issue: bool,
}

/// Evaluates device health against configured thresholds.
pub struct DeviceHealthEvaluator {
    store: Arc<Store>,
    thresholds: Thresholds,
}

impl DeviceHealthEvaluator {
    pub fn new(store: Arc<Store>, thresholds: Thresholds) -> Self {
        Self { store, thresholds }
    }

    /// Evaluate one device from its stored samples.
    pub fn evaluate(&self, ip: &str) -> DeviceHealth {
        let threshold = self.thresholds.for_device(ip);

        let recent = self.store.recent_device_samples(ip, 2).unwrap_or_default();
        let reasons = recent
            .first()
            .map(|s| violation_reasons(s.latency_ms, s.packet_loss_pct, threshold))
            .unwrap_or_default();

        let (bandwidth_rx_bps, bandwidth_tx_bps) = instantaneous_bandwidth(&recent);

        let cutoff = Utc::now() - ChronoDuration::seconds(SUSTAINED_WINDOW_SECS);
        let window = self.store.device_samples_since(ip, cutoff).unwrap_or_default();
        let violation_count = window
            .iter()
            .filter(|s| !violation_reasons(s.latency_ms, s.packet_loss_pct, threshold).is_empty())
            .count();

        DeviceHealth {
            exceeded: !reasons.is_empty(),
            reasons,
            bandwidth_rx_bps,
            bandwidth_tx_bps,
            violation_count,
            sustained_issue: violation_count >= SUSTAINED_MIN_VIOLATIONS,
        }
    }
}

/// Human-readable reasons for each threshold the sample exceeds.
pub fn violation_reasons(
    latency_ms: Option<f64>,
    loss_pct: Option<f64>,
    threshold: Threshold,
) -> Vec<String> {
    let mut reasons = Vec::new();
    if let Some(latency) = latency_ms {
        if latency > threshold.latency_ms {
            reasons.push(format!(
                "latency {:.1}ms > {}ms",
                latency, threshold.latency_ms
            ));
        }
    }
    if let Some(loss) = loss_pct {
        if loss > threshold.loss_pct {
            reasons.push(format!("loss {:.1}% > {}%", loss, threshold.loss_pct));
        }
    }
    reasons
}

/// Byte rates from the two most recent samples, most-recent-first.
///
/// Needs both samples to carry counters, strictly increasing time, and
/// non-decreasing counters; anything else is unknown, never negative.
pub fn instantaneous_bandwidth(recent: &[DeviceSample]) -> (Option<f64>, Option<f64>) {
    let [newer, older] = match recent {
        [a, b, ..] => [a, b],
        _ => return (None, None),
    };

    let (Some(new_rx), Some(new_tx), Some(old_rx), Some(old_tx)) =
        (newer.rx_bytes, newer.tx_bytes, older.rx_bytes, older.tx_bytes)
    else {
        return (None, None);
    };

    let dt = (newer.timestamp - older.timestamp).num_milliseconds() as f64 / 1000.0;
    (
        counter_rate(old_rx, new_rx, dt),
        counter_rate(old_tx, new_tx, dt),
    )
}
