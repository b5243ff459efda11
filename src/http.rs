//! HTTP sidecar for Prometheus scraping.
//!
//! Serves `/metrics` (and a trivial `/healthz`) on its own tokio task.
//! Disabled entirely when `server.metrics_port` is 0.

use axum::{Json, Router, routing::get};
use std::net::SocketAddr;
use tracing::{error, info};

async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

async fn healthz_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "sessions": crate::metrics::CONNECTED_SESSIONS.get(),
    }))
}

/// Bind and serve the metrics endpoint until the process exits.
pub async fn run_http_server(port: u16) {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%addr, error = %e, "Failed to bind metrics endpoint");
            return;
        }
    };
    info!(%addr, "Metrics endpoint listening");

    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "Metrics endpoint error");
    }
}
