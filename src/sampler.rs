//! Background sampling loop.
//!
//! One long-lived task drives all measurement: each tick pings the reference
//! target, reads the interface counters, discovers devices and pings each of
//! them sequentially, writing everything through the store. A second task
//! prunes history past the retention window. Both tasks stop on an explicit
//! broadcast signal.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::Mutex;

use crate::db::{DeviceSample, Sample, Store};
use crate::probe::{DeviceLister, Prober, ThroughputReader};

const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Drives periodic measurement for the lifetime of the process.
pub struct Sampler {
    store: Arc<Store>,
    prober: Arc<dyn Prober>,
    lister: Arc<dyn DeviceLister>,
    throughput: Arc<dyn ThroughputReader>,
    interval: Duration,
    retention: Duration,
    stop: Arc<Mutex<Option<tokio::sync::broadcast::Sender<()>>>>,
}

impl Sampler {
    pub fn new(
        store: Arc<Store>,
        prober: Arc<dyn Prober>,
        lister: Arc<dyn DeviceLister>,
        throughput: Arc<dyn ThroughputReader>,
        interval: Duration,
        retention: Duration,
    ) -> Self {
        Self {
            store,
            prober,
            lister,
            throughput,
            interval,
            retention,
            stop: Arc::new(Mutex::new(None)),
        }
    }

    /// Start the sampling and retention background tasks.
    pub async fn start(&self) {
        let (tx, _) = tokio::sync::broadcast::channel(1);
        {
            let mut stop_guard = self.stop.lock().await;
            *stop_guard = Some(tx.clone());
        }

        tracing::info!(
            "Sampler started (interval: {:?}, retention: {:?})",
            self.interval,
            self.retention
        );

        let store = self.store.clone();
        let prober = self.prober.clone();
        let lister = self.lister.clone();
        let throughput = self.throughput.clone();
        let tick_interval = self.interval;
        let mut stop_rx = tx.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = stop_rx.recv() => break,
                    _ = interval.tick() => {
                        run_tick(&store, prober.as_ref(), lister.as_ref(), throughput.as_ref()).await;
                    }
                }
            }
            tracing::info!("Sampler loop stopped");
        });

        let store = self.store.clone();
        let retention = self.retention;
        let mut stop_rx = tx.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(RETENTION_SWEEP_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = stop_rx.recv() => break,
                    _ = interval.tick() => {
                        let cutoff = Utc::now()
                            - ChronoDuration::seconds(retention.as_secs() as i64);
                        match store.prune_before(cutoff) {
                            Ok((0, 0)) => {}
                            Ok((m, dm)) => {
                                tracing::info!("Retention: pruned {} samples, {} device samples", m, dm);
                            }
                            Err(e) => tracing::error!("Retention sweep failed: {}", e),
                        }
                    }
                }
            }
        });
    }

    /// Signal both background tasks to stop.
    pub async fn stop(&self) {
        let stop = self.stop.lock().await;
        if let Some(tx) = stop.as_ref() {
            let _ = tx.send(());
        }
    }
}

/// One measurement tick. Every sub-step failure is logged and contained:
/// a bad probe never aborts the remaining devices, and a bad tick never
/// stops the loop.
async fn run_tick(
    store: &Store,
    prober: &dyn Prober,
    lister: &dyn DeviceLister,
    throughput: &dyn ThroughputReader,
) {
    let now = Utc::now();

    match prober.ping_network().await {
        Ok(ping) => {
            let (rx_bytes, tx_bytes) = throughput.read().unwrap_or_else(|e| {
                tracing::warn!("throughput read failed: {}", e);
                (0, 0)
            });

            // A fully failed probe yields no latency; skip the row entirely
            // rather than record partial data about nothing.
            if let Some(latency_ms) = ping.latency_ms {
                let sample = Sample {
                    timestamp: now,
                    latency_ms: Some(latency_ms),
                    packet_loss_pct: ping.packet_loss_pct,
                    rx_bytes,
                    tx_bytes,
                };
                if let Err(e) = store.append_sample(&sample) {
                    tracing::error!("failed to store sample: {}", e);
                } else {
                    tracing::debug!(
                        "Latency: {:.1}ms, Loss: {:.1}%, RX: {}, TX: {}",
                        latency_ms,
                        ping.packet_loss_pct,
                        rx_bytes,
                        tx_bytes
                    );
                }
            }
        }
        Err(e) => tracing::warn!("network ping failed: {}", e),
    }

    // Sequential per-device probing: tick duration grows with device count,
    // bounded by the per-host ping timeout.
    for device in lister.discover().await {
        let host = prober.ping_host(&device.ip).await;
        let sample = DeviceSample {
            device_ip: device.ip.clone(),
            timestamp: Utc::now(),
            latency_ms: host.latency_ms,
            packet_loss_pct: host.packet_loss_pct,
            up: host.up,
            rx_bytes: None,
            tx_bytes: None,
        };
        // Down devices are recorded too; up=false is itself a data point.
        if let Err(e) = store.append_device_sample(&device, &sample) {
            tracing::error!("failed to store device sample for {}: {}", device.ip, e);
        }
    }
}
