//! HTTP server for the Prometheus scrape endpoint
//!
//! `/metrics` serves the ManagedCluster families followed by the exporter's
//! own self-metrics; `/health` is a liveness probe.
//!
//! # Example
//!
//! ```ignore
//! use acm_metrics_exporter::metrics_server::MetricsServer;
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! MetricsServer::new(collector)
//!     .serve_with_shutdown(listener, shutdown_signal())
//!     .await?;
//! ```

use crate::collector::ClusterCollector;
use crate::error::Result;
use axum::extract::State;
use axum::{Router, http::StatusCode, response::IntoResponse, routing::get};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Metrics HTTP server
pub struct MetricsServer {
    collector: Arc<ClusterCollector>,
}

impl MetricsServer {
    pub fn new(collector: Arc<ClusterCollector>) -> Self {
        Self { collector }
    }

    /// Build the router
    pub fn router(&self) -> Router {
        Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/health", get(health_handler))
            .with_state(Arc::clone(&self.collector))
    }

    /// Serve until `shutdown` completes
    pub async fn serve_with_shutdown<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        info!(%addr, "Metrics server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

/// Handler for /metrics endpoint
async fn metrics_handler(State(collector): State<Arc<ClusterCollector>>) -> impl IntoResponse {
    let mut body = collector.scrape().await;
    body.push_str(&crate::metrics::gather());
    (StatusCode::OK, [("content-type", CONTENT_TYPE)], body)
}

/// Handler for /health endpoint
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
