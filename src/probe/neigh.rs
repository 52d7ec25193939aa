//! Device discovery from the OS neighbor table.
//!
//! Primary source is `ip neigh`; `arp -a` is the fallback for systems
//! without iproute2. Discovery trusts OS tooling and is best-effort only:
//! any failure yields an empty device list.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;

use super::DeviceLister;
use crate::db::DiscoveredDevice;

fn arp_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // myhost (192.168.1.5) at aa:bb:cc:dd:ee:ff [ether] on eth0
    RE.get_or_init(|| {
        Regex::new(r"([\w\-.?]+) \((\d+\.\d+\.\d+\.\d+)\) at ([0-9a-fA-F:]+)").unwrap()
    })
}

/// Neighbor-table `DeviceLister` implementation.
pub struct NeighborLister;

#[async_trait]
impl DeviceLister for NeighborLister {
    async fn discover(&self) -> Vec<DiscoveredDevice> {
        if let Ok(output) = Command::new("ip").arg("neigh").output().await {
            if output.status.success() {
                let mut devices = parse_ip_neigh(&String::from_utf8_lossy(&output.stdout));
                for device in &mut devices {
                    device.hostname = reverse_lookup(&device.ip).await;
                }
                return devices;
            }
        }

        match Command::new("arp").arg("-a").output().await {
            Ok(output) => parse_arp(&String::from_utf8_lossy(&output.stdout)),
            Err(e) => {
                tracing::warn!("device discovery unavailable: {}", e);
                Vec::new()
            }
        }
    }
}

/// Parse `ip neigh` output.
///
/// Line format: `10.0.0.5 dev wlan0 lladdr aa:bb:cc:dd:ee:ff REACHABLE`.
/// Entries without `lladdr` (incomplete/failed) are kept with no MAC.
fn parse_ip_neigh(output: &str) -> Vec<DiscoveredDevice> {
    let mut devices: HashMap<String, DiscoveredDevice> = HashMap::new();

    for line in output.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(first) = parts.first() else { continue };
        if first.parse::<IpAddr>().is_err() {
            continue;
        }

        let mac = parts
            .iter()
            .position(|p| *p == "lladdr")
            .and_then(|idx| parts.get(idx + 1))
            .map(|m| m.to_lowercase());

        devices.insert(
            first.to_string(),
            DiscoveredDevice {
                ip: first.to_string(),
                mac,
                hostname: None,
            },
        );
    }

    let mut result: Vec<_> = devices.into_values().collect();
    result.sort_by(|a, b| a.ip.cmp(&b.ip));
    result
}

/// Parse `arp -a` output, which carries hostnames inline.
fn parse_arp(output: &str) -> Vec<DiscoveredDevice> {
    let mut devices: HashMap<String, DiscoveredDevice> = HashMap::new();

    for caps in arp_regex().captures_iter(output) {
        let hostname = caps[1].to_string();
        let ip = caps[2].to_string();
        let mac = caps[3].to_lowercase();
        devices.insert(
            ip.clone(),
            DiscoveredDevice {
                ip,
                mac: Some(mac),
                // arp prints "?" for unresolved names
                hostname: (hostname != "?").then_some(hostname),
            },
        );
    }

    let mut result: Vec<_> = devices.into_values().collect();
    result.sort_by(|a, b| a.ip.cmp(&b.ip));
    result
}

/// Best-effort reverse DNS via `getent hosts`.
async fn reverse_lookup(ip: &str) -> Option<String> {
    let output = Command::new("getent")
        .arg("hosts")
        .arg(ip)
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout
        .split_whitespace()
        .nth(1)
        .map(|name| name.to_string())
}
