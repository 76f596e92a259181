//! ACM ManagedCluster metrics exporter
//!
//! ## Usage
//!
//! ```bash
//! # Run against the current kubeconfig context
//! cargo run
//!
//! # Report failed lookups as created_via="unknown"
//! ACM_AMBIGUOUS_PROVENANCE=unknown cargo run
//! ```
//!
//! ## Environment Variables
//!
//! - `ACM_METRICS_ADDR`: Metrics server address (default: "0.0.0.0:8080")
//! - `ACM_LABEL_SELECTOR`: Label selector for watched ManagedClusters
//! - `ACM_LOOKUP_TIMEOUT_MS`: ClusterDeployment lookup timeout (default: 5000)
//! - `ACM_LOOKUP_CACHE_TTL_SECS`: Provenance cache TTL, 0 disables (default: 0)
//! - `ACM_AMBIGUOUS_PROVENANCE`: "hive" or "unknown" (default: "hive")
//! - `ACM_SCRAPE_CONCURRENCY`: Concurrent lookups per scrape (default: 8)
//! - `ACM_RELIST_BACKOFF_INITIAL_MS` / `ACM_RELIST_BACKOFF_MAX_MS`: Re-list backoff
//! - `ACM_LOG_LEVEL`: Log level (default: "info")
//! - `ACM_LOG_FORMAT`: "json" or "pretty" (default: "pretty")

use acm_metrics_exporter::config::{Config, LogFormat};
use acm_metrics_exporter::metrics::Metrics;
use acm_metrics_exporter::metrics_server::MetricsServer;
use acm_metrics_exporter::reflector::spawn_reflector;
use acm_metrics_exporter::resolver::kube_resolver;
use acm_metrics_exporter::{
    ClusterCollector, ClusterStore, ExporterError, KubeListWatch, Reflector,
    managed_cluster_families,
};
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    init_tracing(&config);
    info!(
        metrics_addr = %config.metrics_addr,
        label_selector = ?config.label_selector,
        ambiguous_policy = ?config.ambiguous_policy,
        "Starting ACM metrics exporter"
    );

    Metrics::init()?;

    // Connection settings must resolve before the first list/watch
    let kube_config = kube::Config::infer().await.map_err(ExporterError::from)?;
    let client = kube::Client::try_from(kube_config)
        .map_err(|e| ExporterError::Config(format!("kubernetes client: {e}")))?;

    let store = ClusterStore::new();

    let mut source = KubeListWatch::managed_clusters(client.clone());
    if let Some(selector) = &config.label_selector {
        source = source.labels(selector);
    }
    let reflector = Reflector::new(source, store.clone()).with_backoff(config.relist_backoff.clone());
    let reflector_handle = spawn_reflector(reflector);

    let resolver = kube_resolver(
        client,
        config.lookup_timeout,
        config.ambiguous_policy,
        config.lookup_cache_ttl,
    );
    let collector = ClusterCollector::new(store, resolver, managed_cluster_families())
        .concurrency(config.scrape_concurrency);

    let listener = tokio::net::TcpListener::bind(config.metrics_addr).await?;
    MetricsServer::new(Arc::new(collector))
        .serve_with_shutdown(listener, shutdown_signal())
        .await?;

    reflector_handle.abort();
    info!("ACM metrics exporter shutdown complete");
    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.log_level.as_str().into());

    match config.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = ?e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = ?e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
