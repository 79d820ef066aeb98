//! Operational HTTP Endpoint
//!
//! Serves health checks and Prometheus metrics for both daemons.

use crate::metrics::Metrics;
use crate::Result;
use anyhow::Context;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// HTTP server exposing /health and /metrics
pub struct OpsServer {
    metrics: Arc<Metrics>,
    bind_addr: SocketAddr,
}

impl OpsServer {
    pub fn new(metrics: Arc<Metrics>, bind_addr: SocketAddr) -> Self {
        Self { metrics, bind_addr }
    }

    pub fn router(metrics: Arc<Metrics>) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/metrics", get(export_metrics))
            .layer(TraceLayer::new_for_http())
            .with_state(metrics)
    }

    /// Start the ops server
    pub async fn start(self) -> Result<()> {
        let listener = TcpListener::bind(self.bind_addr)
            .await
            .with_context(|| format!("Failed to bind ops server to {}", self.bind_addr))?;

        info!(bind_addr = %self.bind_addr, "Ops server listening");

        axum::serve(listener, Self::router(self.metrics))
            .await
            .context("Ops server error")?;

        Ok(())
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn export_metrics(State(metrics): State<Arc<Metrics>>) -> impl IntoResponse {
    (
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        metrics.export_prometheus(),
    )
}
