//! HTTP request handlers.
//!
//! Every read path degrades gracefully: with no samples yet the API answers
//! "waiting", never an HTTP error.

use super::AppState;
use crate::analyzer::{self, rate_latency};
use crate::device_health::instantaneous_bandwidth;
use crate::diagnosis::diagnose_with_fallback;
use crate::security::{detect_suspects, SNAPSHOT_WINDOW_SECS};
use crate::stats::{max, mean, percentile};

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Json},
};
use chrono::{Duration as ChronoDuration, Utc};
use serde::Deserialize;
use serde_json::json;

const SUMMARY_WINDOW_SECS: i64 = 300;
const DEVICE_HISTORY_LIMIT: u32 = 100;

fn waiting(message: &str) -> Json<serde_json::Value> {
    Json(json!({ "status": "waiting", "message": message }))
}

// ============================================================================
// Network-wide metrics
// ============================================================================

pub async fn handle_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let Some(analysis) = analyzer::analyze(&state.store) else {
        return waiting("Collecting metrics... Please wait.").into_response();
    };

    let current = analysis.current_latency_ms;
    let baseline = analysis.baseline_latency_ms;

    Json(json!({
        "status": "ok",
        "current_latency": round1(current),
        "baseline_latency": round1(baseline),
        "baseline_is_default": analysis.baseline_is_default,
        "latency_spike_percent": round1(analysis.latency_spike_pct),
        "packet_loss": round1(analysis.packet_loss_pct),
        "has_issues": analysis.has_issues,
        "summary": analysis.summary,
        // Aliases some frontends expect:
        "latency_ms": round1(current),
        "baseline_ms": round1(baseline),
        "spike_pct": round1(analysis.latency_spike_pct),
        "packet_loss_pct": round1(analysis.packet_loss_pct),
        // Extras:
        "latency_rating": rate_latency(current),
        "usual_latency_range_ms": {
            "min": round1((baseline - 10.0).max(0.0)),
            "max": round1(baseline + 10.0),
        },
    }))
    .into_response()
}

pub async fn handle_summary(State(state): State<AppState>) -> impl IntoResponse {
    let cutoff = Utc::now() - ChronoDuration::seconds(SUMMARY_WINDOW_SECS);
    let rows = state.store.samples_since(cutoff).unwrap_or_default();

    if rows.is_empty() {
        return waiting("No recent samples to summarize").into_response();
    }

    let latencies: Vec<f64> = rows.iter().filter_map(|r| r.latency_ms).collect();
    let losses: Vec<f64> = rows.iter().map(|r| r.packet_loss_pct).collect();

    Json(json!({
        "status": "ok",
        "window_seconds": SUMMARY_WINDOW_SECS,
        "samples": rows.len(),
        "avg_latency": mean(&latencies).map(round1),
        "p95_latency": percentile(&latencies, 95.0).map(round1),
        "max_latency": max(&latencies).map(round1),
        "avg_packet_loss": mean(&losses).map(round2),
    }))
    .into_response()
}

// ============================================================================
// Devices
// ============================================================================

pub async fn handle_devices(State(state): State<AppState>) -> impl IntoResponse {
    // When the neighbor table is cold, fall back to devices we have seen
    // before so the list does not go blank.
    let mut discovered = state.lister.discover().await;
    if discovered.is_empty() {
        discovered = state
            .store
            .devices()
            .unwrap_or_default()
            .into_iter()
            .map(|d| crate::db::DiscoveredDevice {
                ip: d.ip,
                mac: d.mac,
                hostname: d.hostname,
            })
            .collect();
    }

    let mut enriched = Vec::new();

    for device in discovered {
        let health = state.evaluator.evaluate(&device.ip);

        let alert_message = health
            .exceeded
            .then(|| format!("Threshold exceeded: {}", health.reasons.join(", ")));
        let sustained_report = health.sustained_issue.then(|| {
            format!(
                "Device exceeded thresholds {} times in last 10 minutes.",
                health.violation_count
            )
        });

        let device_type = infer_device_type(device.hostname.as_deref(), device.mac.as_deref());

        enriched.push(json!({
            "ip": device.ip,
            "mac": device.mac,
            "hostname": device.hostname,
            "type": device_type,
            "threshold_exceeded": health.exceeded,
            "alert_message": alert_message,
            "sustained_issue": health.sustained_issue,
            "sustained_report": sustained_report,
            "bandwidth_rx_bps": health.bandwidth_rx_bps.map(round2),
            "bandwidth_tx_bps": health.bandwidth_tx_bps.map(round2),
        }));
    }

    Json(json!({ "devices": enriched }))
}

pub async fn handle_device_metrics(
    State(state): State<AppState>,
    Path(ip): Path<String>,
) -> impl IntoResponse {
    let rows = state
        .store
        .recent_device_samples(&ip, DEVICE_HISTORY_LIMIT)
        .unwrap_or_default();

    let metrics: Vec<serde_json::Value> = rows
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let mut entry = json!({
                "timestamp": r.timestamp,
                "latency": r.latency_ms,
                "packet_loss": r.packet_loss_pct,
                "up": r.up,
                "rx_bytes": r.rx_bytes,
                "tx_bytes": r.tx_bytes,
            });
            // Per-pair bandwidth against the next-older sample.
            let (rx_bps, tx_bps) = instantaneous_bandwidth(&rows[i..]);
            if let Some(rx) = rx_bps {
                entry["bandwidth_rx_bps"] = json!(round2(rx));
            }
            if let Some(tx) = tx_bps {
                entry["bandwidth_tx_bps"] = json!(round2(tx));
            }
            entry
        })
        .collect();

    Json(json!({ "device": ip, "metrics": metrics }))
}

// ============================================================================
// Diagnosis and security
// ============================================================================

pub async fn handle_diagnosis(State(state): State<AppState>) -> impl IntoResponse {
    let diagnosis = match analyzer::analyze(&state.store) {
        Some(analysis) => {
            diagnose_with_fallback(state.diagnoser.as_deref(), &analysis).await
        }
        None => {
            "No network metrics available yet. Please wait for the metrics collector to gather data."
                .to_string()
        }
    };

    Json(json!({ "diagnosis": diagnosis }))
}

#[derive(Debug, Deserialize)]
pub struct SecurityParams {
    pub window_seconds: Option<i64>,
}

pub async fn handle_security(
    State(state): State<AppState>,
    Query(params): Query<SecurityParams>,
) -> impl IntoResponse {
    let window = params
        .window_seconds
        .filter(|w| *w > 0)
        .unwrap_or(SNAPSHOT_WINDOW_SECS);

    let snapshot = state.snapshots.build(window).await;
    let report = detect_suspects(&snapshot);

    Json(json!({ "snapshot": snapshot, "analysis": report }))
}

// ============================================================================
// Device type inference
// ============================================================================

/// Best-effort device classification from hostname keywords and MAC OUI.
pub fn infer_device_type(hostname: Option<&str>, mac: Option<&str>) -> &'static str {
    let hn = hostname.unwrap_or("").to_lowercase();

    let hostname_rules: [(&[&str], &'static str); 10] = [
        (&["iphone", "ios"], "phone (iPhone/iOS)"),
        (&["ipad"], "tablet (iPad/iOS)"),
        (&["android", "pixel", "galaxy", "oneplus", "samsung"], "phone (Android)"),
        (&["macbook", "imac", "mac-mini", "macos"], "laptop/desktop (Mac)"),
        (
            &["windows", "dell", "hp", "lenovo", "thinkpad", "xps", "surface", "asus"],
            "laptop/desktop (Windows/PC)",
        ),
        (&["laptop", "notebook"], "laptop (generic)"),
        (&["desktop", "pc"], "desktop (generic)"),
        (&["roku", "apple-tv", "firetv", "chromecast", "tv"], "streaming/TV"),
        (&["ps5", "ps4", "xbox", "switch"], "game console"),
        (&["nuc", "intel"], "desktop (Intel)"),
    ];
    for (keywords, label) in hostname_rules {
        if keywords.iter().any(|k| hn.contains(k)) {
            return label;
        }
    }

    let mac = mac.unwrap_or("").to_lowercase();
    let oui = if mac.len() >= 8 { &mac[..8] } else { "" };

    let oui_rules: [(&[&str], &'static str); 4] = [
        (
            &["88:e9:fe", "d8:30:62", "8c:85:90", "f0:18:98", "a4:5e:60", "ac:bc:32"],
            "Apple device (Mac/iOS)",
        ),
        (
            &["1c:5a:6b", "14:32:d1", "30:07:4d", "f4:09:d8", "00:16:6c"],
            "Samsung device (Android)",
        ),
        (
            &["3c:5a:b4", "f4:f5:d8", "a4:77:33", "e4:f0:42"],
            "Google device (Android/IoT)",
        ),
        (
            &["00:1b:21", "00:13:e8", "00:03:47", "00:15:17"],
            "Intel device (PC/NIC)",
        ),
    ];
    for (ouis, label) in oui_rules {
        if ouis.contains(&oui) {
            return label;
        }
    }

    "unknown"
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

    #[test]
    fn test_infer_from_hostname() {
        assert_eq!(
            infer_device_type(Some("Jos-iPhone"), None),
            "phone (iPhone/iOS)"
        );
        assert_eq!(
            infer_device_type(Some("pixel-7"), None),
            "phone (Android)"
        );
        assert_eq!(infer_device_type(Some("living-room-tv"), None), "streaming/TV");
    }

    #[test]
    fn test_infer_from_oui() {
        assert_eq!(
            infer_device_type(None, Some("88:E9:FE:12:34:56")),
            "Apple device (Mac/iOS)"
        );
    }

    #[test]
    fn test_infer_hostname_wins_over_oui() {
        assert_eq!(
            infer_device_type(Some("galaxy-s23"), Some("88:e9:fe:00:00:00")),
            "phone (Android)"
        );
    }

    #[test]
    fn test_infer_unknown() {
        assert_eq!(infer_device_type(None, None), "unknown");
        assert_eq!(infer_device_type(Some("mystery"), Some("ff:ff:ff:00:00:00")), "unknown");
    }
}
