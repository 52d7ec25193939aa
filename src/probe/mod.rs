//! Measurement capabilities: ping, device discovery, throughput counters.
//!
//! Each capability is a trait so the sampler and the web layer can be tested
//! against scripted implementations; the default implementations shell out
//! to OS tooling and are strictly best-effort.

mod neigh;
mod ping;
mod throughput;

pub use neigh::*;
pub use ping::*;
pub use throughput::*;

use crate::db::DiscoveredDevice;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Probe error types.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("command failed: {0}")]
    Command(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of a network-wide ping: average latency (None when every packet
/// was lost) and packet loss percentage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetworkPing {
    pub latency_ms: Option<f64>,
    pub packet_loss_pct: f64,
}

/// Result of pinging one host. A down host is `up = false` with no latency;
/// that is itself a meaningful observation, not an error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostPing {
    pub latency_ms: Option<f64>,
    pub packet_loss_pct: Option<f64>,
    pub up: bool,
}

/// Latency/loss measurement capability.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Ping the reference target for the network as a whole.
    async fn ping_network(&self) -> Result<NetworkPing, ProbeError>;

    /// Ping a single host. Unreachable hosts come back as `up = false`.
    async fn ping_host(&self, ip: &str) -> HostPing;
}

/// Device discovery capability. Best-effort: failures yield an empty list,
/// never an error.
#[async_trait]
pub trait DeviceLister: Send + Sync {
    async fn discover(&self) -> Vec<DiscoveredDevice>;
}

/// Cumulative interface byte counters (rx, tx) since boot.
pub trait ThroughputReader: Send + Sync {
    fn read(&self) -> Result<(u64, u64), ProbeError>;
}
