//! Point-in-time, privacy-reduced aggregate of all devices' recent
//! statistics, built for either the LLM prompt or the heuristic detector.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;

use crate::db::{DeviceSample, DiscoveredDevice, Store};
use crate::device_health::{violation_reasons, Threshold};
use crate::probe::DeviceLister;
use crate::stats::{counter_rate, max, mean, percentile};

/// Default aggregation window.
pub const SNAPSHOT_WINDOW_SECS: i64 = 900;

/// Aggregated statistics for one device. MAC addresses are masked to their
/// OUI prefix before they get here; raw MACs never leave the builder.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSnapshot {
    pub ip: String,
    pub masked_mac: Option<String>,
    pub hostname: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
    pub latency_avg_ms: Option<f64>,
    pub latency_p95_ms: Option<f64>,
    pub latency_max_ms: Option<f64>,
    pub loss_avg_pct: Option<f64>,
    pub sustained_threshold_violations: usize,
    pub avg_rx_bps: Option<f64>,
    pub avg_tx_bps: Option<f64>,
    pub threshold_exceeded: bool,
    pub is_new_device: bool,
}

/// One consistent view of all discovered devices.
#[derive(Debug, Clone, Serialize)]
pub struct SecuritySnapshot {
    pub window_seconds: i64,
    pub generated_at: DateTime<Utc>,
    pub devices: Vec<DeviceSnapshot>,
    pub thresholds: Threshold,
}

/// Builds security snapshots from discovery plus stored device history.
pub struct SecuritySnapshotBuilder {
    store: Arc<Store>,
    lister: Arc<dyn DeviceLister>,
    thresholds: Threshold,
}

impl SecuritySnapshotBuilder {
    pub fn new(store: Arc<Store>, lister: Arc<dyn DeviceLister>, thresholds: Threshold) -> Self {
        Self {
            store,
            lister,
            thresholds,
        }
    }

    pub async fn build(&self, window_seconds: i64) -> SecuritySnapshot {
        let now = Utc::now();
        let cutoff = now - ChronoDuration::seconds(window_seconds);

        let mut devices = Vec::new();
        for device in self.lister.discover().await {
            let rows = self
                .store
                .device_samples_since(&device.ip, cutoff)
                .unwrap_or_default();
            devices.push(summarize_device(&device, &rows, self.thresholds));
        }

        SecuritySnapshot {
            window_seconds,
            generated_at: now,
            devices,
            thresholds: self.thresholds,
        }
    }
}

/// Aggregate one device's in-window samples, most-recent-first.
fn summarize_device(
    device: &DiscoveredDevice,
    rows: &[DeviceSample],
    threshold: Threshold,
) -> DeviceSnapshot {
    let latencies: Vec<f64> = rows.iter().filter_map(|r| r.latency_ms).collect();
    let losses: Vec<f64> = rows.iter().filter_map(|r| r.packet_loss_pct).collect();

    // Average rate over the whole window: oldest vs newest counter pair,
    // deliberately smoother than the instantaneous two-sample rate.
    let (avg_rx_bps, avg_tx_bps) = window_bandwidth(rows);

    let violations = rows
        .iter()
        .filter(|r| !violation_reasons(r.latency_ms, r.packet_loss_pct, threshold).is_empty())
        .count();

    DeviceSnapshot {
        ip: device.ip.clone(),
        masked_mac: device.mac.as_deref().map(mask_mac),
        hostname: device.hostname.clone(),
        last_seen: rows.first().map(|r| r.timestamp),
        latency_avg_ms: mean(&latencies).map(round1),
        latency_p95_ms: percentile(&latencies, 95.0).map(round1),
        latency_max_ms: max(&latencies).map(round1),
        loss_avg_pct: mean(&losses).map(round2),
        sustained_threshold_violations: violations,
        avg_rx_bps: avg_rx_bps.map(round2),
        avg_tx_bps: avg_tx_bps.map(round2),
        threshold_exceeded: violations >= 1,
        is_new_device: rows.is_empty(),
    }
}

/// Window-average byte rates from the newest and oldest in-window samples.
fn window_bandwidth(rows: &[DeviceSample]) -> (Option<f64>, Option<f64>) {
    if rows.len() < 2 {
        return (None, None);
    }
    let newest = &rows[0];
    let oldest = &rows[rows.len() - 1];

    let (Some(new_rx), Some(new_tx), Some(old_rx), Some(old_tx)) =
        (newest.rx_bytes, newest.tx_bytes, oldest.rx_bytes, oldest.tx_bytes)
    else {
        return (None, None);
    };

    let dt = (newest.timestamp - oldest.timestamp).num_milliseconds() as f64 / 1000.0;
    (
        counter_rate(old_rx, new_rx, dt),
        counter_rate(old_tx, new_tx, dt),
    )
}

/// Mask a MAC to its organizationally-unique prefix.
pub fn mask_mac(mac: &str) -> String {
    let mac = mac.to_lowercase();
    let parts: Vec<&str> = mac.split(':').collect();
    if parts.len() >= 3 {
        format!("{}:xx:xx:xx", parts[..3].join(":"))
    } else {
        let prefix: String = mac.chars().take(8).collect();
        format!("{}xx:xx:xx", prefix)
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(ip: &str) -> DiscoveredDevice {
        DiscoveredDevice {
            ip: ip.to_string(),
            mac: Some("AA:BB:CC:DD:EE:FF".to_string()),
            hostname: Some("host".to_string()),
        }
    }

    fn row(
        t: DateTime<Utc>,
        latency: Option<f64>,
        loss: Option<f64>,
        rx: Option<u64>,
        tx: Option<u64>,
    ) -> DeviceSample {
        DeviceSample {
            device_ip: "10.0.0.2".to_string(),
            timestamp: t,
            latency_ms: latency,
            packet_loss_pct: loss,
            up: latency.is_some(),
            rx_bytes: rx,
            tx_bytes: tx,
        }
    }

    #[test]
    fn test_mask_mac_keeps_oui_only() {
        assert_eq!(mask_mac("AA:BB:CC:DD:EE:FF"), "aa:bb:cc:xx:xx:xx");
    }

    #[test]
    fn test_mask_mac_short_form() {
        assert_eq!(mask_mac("aabbccddeeff"), "aabbccddxx:xx:xx");
    }

    #[test]
    fn test_summarize_empty_is_new_device() {
        let snap = summarize_device(&device("10.0.0.2"), &[], Threshold::default());
        assert!(snap.is_new_device);
        assert!(snap.latency_avg_ms.is_none());
        assert!(snap.latency_p95_ms.is_none());
        assert!(snap.loss_avg_pct.is_none());
        assert_eq!(snap.sustained_threshold_violations, 0);
        assert!(!snap.threshold_exceeded);
    }

    #[test]
    fn test_summarize_statistics() {
        let now = Utc::now();
        let rows = vec![
            row(now, Some(30.0), Some(0.0), Some(10_000), Some(20_000)),
            row(
                now - ChronoDuration::seconds(5),
                Some(10.0),
                Some(2.0),
                Some(5_000),
                Some(10_000),
            ),
            row(
                now - ChronoDuration::seconds(10),
                Some(20.0),
                Some(1.0),
                Some(1_000),
                Some(2_000),
            ),
        ];
        let snap = summarize_device(&device("10.0.0.2"), &rows, Threshold::default());

        assert_eq!(snap.latency_avg_ms, Some(20.0));
        assert_eq!(snap.latency_max_ms, Some(30.0));
        assert_eq!(snap.loss_avg_pct, Some(1.0));
        assert_eq!(snap.masked_mac.as_deref(), Some("aa:bb:cc:xx:xx:xx"));
        assert!(!snap.is_new_device);
        // Oldest-vs-newest over 10s: (10000-1000)/10 and (20000-2000)/10.
        assert_eq!(snap.avg_rx_bps, Some(900.0));
        assert_eq!(snap.avg_tx_bps, Some(1800.0));
    }

    #[test]
    fn test_summarize_counts_violations() {
        let now = Utc::now();
        let rows = vec![
            row(now, Some(250.0), Some(0.0), None, None),
            row(now - ChronoDuration::seconds(5), Some(10.0), Some(8.0), None, None),
            row(now - ChronoDuration::seconds(10), Some(10.0), Some(0.0), None, None),
        ];
        let snap = summarize_device(&device("10.0.0.2"), &rows, Threshold::default());

        assert_eq!(snap.sustained_threshold_violations, 2);
        assert!(snap.threshold_exceeded);
    }

    #[test]
    fn test_window_bandwidth_needs_counters_on_both_ends() {
        let now = Utc::now();
        let rows = vec![
            row(now, Some(1.0), None, Some(100), Some(100)),
            row(now - ChronoDuration::seconds(5), Some(1.0), None, None, None),
        ];
        assert_eq!(window_bandwidth(&rows), (None, None));
    }

    #[test]
    fn test_window_bandwidth_counter_reset() {
        let now = Utc::now();
        let rows = vec![
            row(now, Some(1.0), None, Some(10), Some(10)),
            row(now - ChronoDuration::seconds(5), Some(1.0), None, Some(500), Some(500)),
        ];
        assert_eq!(window_bandwidth(&rows), (None, None));
    }
}
