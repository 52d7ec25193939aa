//! Heuristic suspect scoring, the deterministic fallback (and complement)
//! to LLM-based security analysis.

use serde::Serialize;

use super::{DeviceSnapshot, SecuritySnapshot};
use crate::device_health::SUSTAINED_MIN_VIOLATIONS;

const MAX_SCORE: u32 = 100;
const MAX_SUSPECTS: usize = 10;

/// Outbound rate above which dominantly-outbound traffic looks like exfil.
const HIGH_OUTBOUND_BPS: f64 = 1_000_000.0;
/// Rate in either direction that makes a never-seen device noteworthy.
const NEW_DEVICE_TRAFFIC_BPS: f64 = 200_000.0;

/// One device flagged by the heuristics.
#[derive(Debug, Clone, Serialize)]
pub struct Suspect {
    pub ip: String,
    pub risk_score: u32,
    pub reasons: Vec<String>,
    pub recommended_actions: Vec<&'static str>,
}

/// Result of a heuristic pass over a snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct SuspectReport {
    pub suspected_devices: Vec<Suspect>,
    pub global_observations: Vec<String>,
    pub confidence: &'static str,
}

/// Score every device in the snapshot. Pure: same snapshot, same report.
pub fn detect_suspects(snapshot: &SecuritySnapshot) -> SuspectReport {
    let mut suspects: Vec<Suspect> = snapshot
        .devices
        .iter()
        .filter_map(score_device)
        .collect();

    suspects.sort_by(|a, b| b.risk_score.cmp(&a.risk_score));
    suspects.truncate(MAX_SUSPECTS);

    let mut global_observations = Vec::new();
    if snapshot.devices.is_empty() {
        global_observations.push("no devices in snapshot".to_string());
    }

    let confidence = if suspects.is_empty() { "low" } else { "medium" };

    SuspectReport {
        suspected_devices: suspects,
        global_observations,
        confidence,
    }
}

/// Accumulate a risk score from independently-triggered rules; devices that
/// trip nothing are excluded.
fn score_device(device: &DeviceSnapshot) -> Option<Suspect> {
    let mut reasons = Vec::new();
    let mut score = 0u32;

    let tx = device.avg_tx_bps.unwrap_or(0.0);
    let rx = device.avg_rx_bps.unwrap_or(0.0);

    // High outbound rate, dominantly outbound: possible exfiltration.
    if tx > HIGH_OUTBOUND_BPS && tx > 2.0 * (rx + 1.0) {
        reasons.push(format!("high outbound {} bps", tx as i64));
        score += 35;
    }

    if device.sustained_threshold_violations >= SUSTAINED_MIN_VIOLATIONS {
        reasons.push("sustained latency/loss violations".to_string());
        score += 25;
    }

    if device.is_new_device && (tx > NEW_DEVICE_TRAFFIC_BPS || rx > NEW_DEVICE_TRAFFIC_BPS) {
        reasons.push("new device with traffic".to_string());
        score += 20;
    }

    if device.hostname.is_none() {
        reasons.push("unknown hostname".to_string());
        score += 10;
    }

    if score == 0 {
        return None;
    }

    Some(Suspect {
        ip: device.ip.clone(),
        risk_score: score.min(MAX_SCORE),
        reasons,
        recommended_actions: vec![
            "verify the device identity",
            "check for firmware updates",
            "limit cloud syncs or camera uploads if unintended",
        ],
    })
}
