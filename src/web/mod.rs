//! Web server module: JSON API over the analysis components.

mod handlers;

pub use handlers::*;

use crate::config::Config;
use crate::db::Store;
use crate::device_health::DeviceHealthEvaluator;
use crate::diagnosis::Diagnoser;
use crate::probe::DeviceLister;
use crate::security::SecuritySnapshotBuilder;

use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub lister: Arc<dyn DeviceLister>,
    pub evaluator: Arc<DeviceHealthEvaluator>,
    pub snapshots: Arc<SecuritySnapshotBuilder>,
    pub diagnoser: Option<Arc<dyn Diagnoser>>,
}

/// HTTP server for the monitor.
pub struct Server {
    port: u16,
    state: AppState,
}

impl Server {
    pub fn new(config: &Config, state: AppState) -> Self {
        Self {
            port: config.http_port,
            state,
        }
    }

    /// Build the router with all routes.
    fn routes(&self) -> Router {
        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

        Router::new()
            .route("/api/metrics", get(handlers::handle_metrics))
            .route("/api/summary", get(handlers::handle_summary))
            .route("/api/devices", get(handlers::handle_devices))
            .route("/api/device/{ip}/metrics", get(handlers::handle_device_metrics))
            .route("/api/diagnosis", get(handlers::handle_diagnosis))
            .route("/api/security", get(handlers::handle_security))
            .layer(cors)
            .with_state(self.state.clone())
    }

    /// Start the server on the configured port.
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let router = self.routes();

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}
