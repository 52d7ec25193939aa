//! Network-wide anomaly analysis: current latency vs a rolling baseline.

use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;

use crate::db::{Sample, Store};

/// Window for "current" state.
pub const RECENT_WINDOW_SECS: i64 = 180;
/// Window for the baseline mean.
pub const BASELINE_WINDOW_SECS: i64 = 300;
/// Assumed baseline when there is not enough history to measure one.
pub const DEFAULT_BASELINE_MS: f64 = 40.0;
/// Spike percentage above baseline that counts as an issue.
pub const SPIKE_THRESHOLD_PCT: f64 = 30.0;
/// Packet loss percentage that counts as an issue.
pub const LOSS_THRESHOLD_PCT: f64 = 2.0;

/// Health verdict for the network as a whole.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub current_latency_ms: f64,
    pub baseline_latency_ms: f64,
    /// True when the baseline is the assumed default, not measured history.
    pub baseline_is_default: bool,
    pub latency_spike_pct: f64,
    pub packet_loss_pct: f64,
    pub issues: Vec<String>,
    pub summary: String,
    pub has_issues: bool,
}

/// Analyze current state against the rolling baseline.
///
/// Returns None when no samples exist yet; that is a distinct state from a
/// healthy zero-issue result. A storage read failure degrades to the same
/// "no data yet" answer.
pub fn analyze(store: &Store) -> Option<Analysis> {
    let now = Utc::now();
    let recent = store
        .samples_since(now - ChronoDuration::seconds(RECENT_WINDOW_SECS))
        .unwrap_or_default();
    let baseline = store
        .baseline_latency(now - ChronoDuration::seconds(BASELINE_WINDOW_SECS))
        .unwrap_or_default();

    evaluate(&recent, baseline)
}

/// Pure evaluation over the two query results, unit-testable without a
/// live sampler. `recent` is ordered most-recent-first.
pub fn evaluate(recent: &[Sample], baseline: Option<f64>) -> Option<Analysis> {
    let current = recent.first()?;
    let current_latency = current.latency_ms.unwrap_or(0.0);
    let packet_loss = current.packet_loss_pct;

    let baseline_is_default = baseline.is_none();
    let baseline_latency = baseline.unwrap_or(DEFAULT_BASELINE_MS);

    let spike_pct = if baseline_latency > 0.0 {
        (current_latency - baseline_latency) / baseline_latency * 100.0
    } else {
        0.0
    };

    let mut issues = Vec::new();
    if spike_pct > SPIKE_THRESHOLD_PCT {
        issues.push(format!(
            "latency spike of {:.0}% (now {:.1}ms, baseline {:.1}ms)",
            spike_pct, current_latency, baseline_latency
        ));
    }
    if packet_loss > LOSS_THRESHOLD_PCT {
        issues.push(format!("packet loss of {:.1}%", packet_loss));
    }

    let summary = if issues.is_empty() {
        format!(
            "Network health normal. Latency: {:.1}ms, No packet loss.",
            current_latency
        )
    } else {
        format!("Detected issues: {}", issues.join(", "))
    };

    Some(Analysis {
        current_latency_ms: current_latency,
        baseline_latency_ms: baseline_latency,
        baseline_is_default,
        latency_spike_pct: spike_pct,
        packet_loss_pct: packet_loss,
        has_issues: !issues.is_empty(),
        issues,
        summary,
    })
}

/// Qualitative latency rating for the metrics endpoint.
pub fn rate_latency(ms: f64) -> &'static str {
    if ms < 20.0 {
        "excellent"
    } else if ms < 50.0 {
        "good"
    } else if ms < 100.0 {
        "fair"
    } else {
        "poor"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample(latency: f64, loss: f64) -> Sample {
        Sample {
            timestamp: Utc::now(),
            latency_ms: Some(latency),
            packet_loss_pct: loss,
            rx_bytes: 0,
            tx_bytes: 0,
        }
    }

    #[test]
    fn test_no_samples_is_no_data() {
        assert!(evaluate(&[], Some(40.0)).is_none());
    }

    #[test]
    fn test_spike_detection() {
        let analysis = evaluate(&[sample(60.0, 0.0)], Some(40.0)).unwrap();
        assert!((analysis.latency_spike_pct - 50.0).abs() < 1e-9);
        assert!(analysis.has_issues);
        assert_eq!(analysis.issues.len(), 1);
        assert!(analysis.summary.contains("latency spike of 50%"));
    }

    #[test]
    fn test_small_deviation_is_normal() {
        let analysis = evaluate(&[sample(42.0, 0.0)], Some(40.0)).unwrap();
        assert!((analysis.latency_spike_pct - 5.0).abs() < 1e-9);
        assert!(!analysis.has_issues);
        assert!(analysis.summary.contains("42.0ms"));
        assert!(analysis.summary.starts_with("Network health normal"));
    }

    #[test]
    fn test_loss_issue_independent_of_spike() {
        let analysis = evaluate(&[sample(40.0, 4.0)], Some(40.0)).unwrap();
        assert!(analysis.has_issues);
        assert!(analysis.summary.contains("packet loss of 4.0%"));
    }

    #[test]
    fn test_both_issues_combine() {
        let analysis = evaluate(&[sample(100.0, 10.0)], Some(40.0)).unwrap();
        assert_eq!(analysis.issues.len(), 2);
    }

    #[test]
    fn test_default_baseline_is_flagged() {
        let analysis = evaluate(&[sample(44.0, 0.0)], None).unwrap();
        assert!(analysis.baseline_is_default);
        assert_eq!(analysis.baseline_latency_ms, DEFAULT_BASELINE_MS);
        // 44 vs default 40 is a 10% spike, under the threshold.
        assert!(!analysis.has_issues);
    }

    #[test]
    fn test_most_recent_sample_wins() {
        let analysis = evaluate(&[sample(80.0, 0.0), sample(10.0, 0.0)], Some(40.0)).unwrap();
        assert_eq!(analysis.current_latency_ms, 80.0);
    }

    #[test]
    fn test_rate_latency_tiers() {
        assert_eq!(rate_latency(5.0), "excellent");
        assert_eq!(rate_latency(30.0), "good");
        assert_eq!(rate_latency(70.0), "fair");
        assert_eq!(rate_latency(150.0), "poor");
    }
}
