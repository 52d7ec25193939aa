//! NetPulse - home-network health monitor.
//!
//! Samples latency, loss, and throughput for the local network and each
//! discovered device, persists history to SQLite, derives a rolling baseline
//! to flag anomalies, and serves the results over a small JSON API with an
//! optional LLM-backed diagnosis.

mod analyzer;
mod config;
mod db;
mod device_health;
mod diagnosis;
mod probe;
mod sampler;
mod security;
mod stats;
mod web;

use config::Config;
use db::Store;
use device_health::DeviceHealthEvaluator;
use diagnosis::{Diagnoser, GeminiDiagnoser};
use probe::{DeviceLister, NeighborLister, PingProber, ProcNetDevReader};
use sampler::Sampler;
use security::SecuritySnapshotBuilder;
use web::{AppState, Server};

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("netpulse=info".parse()?),
        )
        .init();

    let cfg = Config::load();
    tracing::info!("Starting NetPulse on port {}...", cfg.http_port);
    tracing::info!("Using database at {}", cfg.db_path);

    let store = Arc::new(Store::new(&cfg.db_path)?);
    tracing::info!("Database initialized successfully");

    let prober = Arc::new(PingProber::new(cfg.ping_target.clone()));
    let lister: Arc<dyn DeviceLister> = Arc::new(NeighborLister);
    let throughput = Arc::new(ProcNetDevReader::new());

    let sampler = Sampler::new(
        store.clone(),
        prober,
        lister.clone(),
        throughput,
        cfg.sample_interval,
        cfg.retention,
    );
    sampler.start().await;

    let evaluator = Arc::new(DeviceHealthEvaluator::new(
        store.clone(),
        cfg.thresholds.clone(),
    ));
    let snapshots = Arc::new(SecuritySnapshotBuilder::new(
        store.clone(),
        lister.clone(),
        cfg.thresholds.global,
    ));

    let diagnoser: Option<Arc<dyn Diagnoser>> = match &cfg.gemini_api_key {
        Some(key) => {
            tracing::info!("LLM diagnosis enabled");
            Some(Arc::new(GeminiDiagnoser::new(key.clone())))
        }
        None => {
            tracing::info!("No GEMINI_API_KEY set, using rule-based diagnosis");
            None
        }
    };

    let state = AppState {
        store,
        lister,
        evaluator,
        snapshots,
        diagnoser,
    };
    let server = Server::new(&cfg, state);

    tokio::select! {
        result = server.start() => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
            sampler.stop().await;
        }
    }

    Ok(())
}
