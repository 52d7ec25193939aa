//! Ping probes via the system `ping` command.
//!
//! Parses the summary line of iputils/BSD ping output. Latency comes from
//! the min/avg/max summary for the network probe and from the per-reply
//! `time=` field for single-packet host probes.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;

use super::{HostPing, NetworkPing, ProbeError, Prober};

const NETWORK_PING_COUNT: u32 = 4;
const NETWORK_PING_TIMEOUT: Duration = Duration::from_secs(10);
const HOST_PING_TIMEOUT_SECS: u32 = 2;

fn rtt_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // min/avg/max[/stddev] = 10.1/15.5/20.3/4.2 ms
    RE.get_or_init(|| Regex::new(r"=\s*([0-9.]+)/([0-9.]+)/([0-9.]+)").unwrap())
}

fn loss_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([0-9.]+)%\s*packet loss").unwrap())
}

fn reply_time_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"time=([0-9.]+)\s*ms").unwrap())
}

/// Command-based `Prober` implementation.
pub struct PingProber {
    /// Reference host for the network-wide probe.
    target: String,
}

impl PingProber {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

#[async_trait]
impl Prober for PingProber {
    async fn ping_network(&self) -> Result<NetworkPing, ProbeError> {
        let output = tokio::time::timeout(
            NETWORK_PING_TIMEOUT,
            Command::new("ping")
                .arg("-c")
                .arg(NETWORK_PING_COUNT.to_string())
                .arg(&self.target)
                .output(),
        )
        .await
        .map_err(|_| ProbeError::Timeout(NETWORK_PING_TIMEOUT))??;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() && stdout.trim().is_empty() {
            // e.g. "ping: unknown host" lands on stderr with nothing parseable
            return Err(ProbeError::Command(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(parse_network_ping(&stdout))
    }

    async fn ping_host(&self, ip: &str) -> HostPing {
        let result = Command::new("ping")
            .arg("-c")
            .arg("1")
            .arg("-W")
            .arg(HOST_PING_TIMEOUT_SECS.to_string())
            .arg(ip)
            .output()
            .await;

        match result {
            Ok(output) => parse_host_ping(&String::from_utf8_lossy(&output.stdout)),
            Err(e) => {
                tracing::warn!("ping command failed for {}: {}", ip, e);
                HostPing {
                    latency_ms: None,
                    packet_loss_pct: None,
                    up: false,
                }
            }
        }
    }
}

/// Parse multi-packet ping output into average latency and loss.
fn parse_network_ping(output: &str) -> NetworkPing {
    let latency_ms = rtt_regex()
        .captures(output)
        .and_then(|c| c.get(2))
        .and_then(|m| m.as_str().parse::<f64>().ok());
    // Missing summary line means the probe produced nothing usable; report
    // total loss rather than inventing a number.
    let packet_loss_pct = loss_regex()
        .captures(output)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .unwrap_or(100.0);

    NetworkPing {
        latency_ms,
        packet_loss_pct,
    }
}

/// Parse single-packet ping output. `up` means at least one reply came back.
fn parse_host_ping(output: &str) -> HostPing {
    let latency_ms = reply_time_regex()
        .captures(output)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok());
    let packet_loss_pct = loss_regex()
        .captures(output)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok());

    let up = matches!(packet_loss_pct, Some(loss) if loss < 100.0);

    HostPing {
        latency_ms,
        packet_loss_pct: Some(packet_loss_pct.unwrap_or(100.0)),
        up,
    }
}
