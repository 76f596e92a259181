//! Prometheus self-metrics for the exporter
//!
//! These describe the exporter itself (watch health, lookup fallbacks, scrape
//! latency) and are appended after the ManagedCluster families on `/metrics`.

use crate::error::{ExporterError, Result};
use prometheus::{
    CounterVec, Encoder, Histogram, IntCounter, IntGauge, TextEncoder, register_counter_vec,
    register_histogram, register_int_counter, register_int_gauge,
};
use std::sync::OnceLock;

/// Global metrics instance
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// All exporter self-metrics
pub struct Metrics {
    /// Watch events applied (by type)
    pub watch_events: CounterVec,

    /// Successful re-lists
    pub relists: IntCounter,

    /// List/watch transport failures
    pub transport_errors: IntCounter,

    /// Objects skipped because they failed to decode
    pub decode_errors: IntCounter,

    /// Provenance lookups resolved by the fallback policy (by reason)
    pub lookup_fallbacks: CounterVec,

    /// ManagedClusters currently in the store
    pub store_clusters: IntGauge,

    /// Time spent rendering the cluster families
    pub scrape_duration: Histogram,
}

impl Metrics {
    /// Initialize metrics (call once at startup)
    ///
    /// Returns error if metric registration fails.
    pub fn init() -> Result<&'static Metrics> {
        if let Some(metrics) = METRICS.get() {
            return Ok(metrics);
        }

        let metrics = Metrics {
            watch_events: register_counter_vec!(
                "acm_exporter_watch_events_total",
                "ManagedCluster watch events applied to the store",
                &["type"]
            )
            .map_err(|e| ExporterError::Metrics(format!("watch_events: {e}")))?,

            relists: register_int_counter!(
                "acm_exporter_relists_total",
                "Full ManagedCluster re-lists"
            )
            .map_err(|e| ExporterError::Metrics(format!("relists: {e}")))?,

            transport_errors: register_int_counter!(
                "acm_exporter_transport_errors_total",
                "List or watch calls that failed"
            )
            .map_err(|e| ExporterError::Metrics(format!("transport_errors: {e}")))?,

            decode_errors: register_int_counter!(
                "acm_exporter_decode_errors_total",
                "Objects skipped because they could not be decoded"
            )
            .map_err(|e| ExporterError::Metrics(format!("decode_errors: {e}")))?,

            lookup_fallbacks: register_counter_vec!(
                "acm_exporter_lookup_fallbacks_total",
                "ClusterDeployment lookups classified by the fallback policy",
                &["reason"]
            )
            .map_err(|e| ExporterError::Metrics(format!("lookup_fallbacks: {e}")))?,

            store_clusters: register_int_gauge!(
                "acm_exporter_store_clusters",
                "ManagedClusters currently held in the local store"
            )
            .map_err(|e| ExporterError::Metrics(format!("store_clusters: {e}")))?,

            scrape_duration: register_histogram!(
                "acm_exporter_scrape_duration_seconds",
                "Time spent generating ManagedCluster metrics",
                vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]
            )
            .map_err(|e| ExporterError::Metrics(format!("scrape_duration: {e}")))?,
        };

        // Set the metrics (only succeeds once)
        let _ = METRICS.set(metrics);

        METRICS
            .get()
            .ok_or_else(|| ExporterError::Metrics("Failed to initialize metrics".to_string()))
    }

    /// Get the global metrics instance
    ///
    /// Returns None if metrics haven't been initialized yet.
    pub fn get() -> Option<&'static Metrics> {
        METRICS.get()
    }
}

/// Gather all self-metrics and encode as Prometheus text format
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_ok() {
        String::from_utf8(buffer).unwrap_or_default()
    } else {
        String::new()
    }
}

pub fn try_record_watch_event(event_type: &str) {
    if let Some(m) = Metrics::get() {
        m.watch_events.with_label_values(&[event_type]).inc();
    }
}

/// Record a completed re-list and the resulting store size
pub fn try_record_relist(store_size: usize) {
    if let Some(m) = Metrics::get() {
        m.relists.inc();
        m.store_clusters.set(store_size as i64);
    }
}

pub fn try_record_transport_error() {
    if let Some(m) = Metrics::get() {
        m.transport_errors.inc();
    }
}

pub fn try_record_decode_error() {
    if let Some(m) = Metrics::get() {
        m.decode_errors.inc();
    }
}

pub fn try_record_lookup_fallback(reason: &str) {
    if let Some(m) = Metrics::get() {
        m.lookup_fallbacks.with_label_values(&[reason]).inc();
    }
}

pub fn try_set_store_size(size: usize) {
    if let Some(m) = Metrics::get() {
        m.store_clusters.set(size as i64);
    }
}

pub fn try_observe_scrape(seconds: f64) {
    if let Some(m) = Metrics::get() {
        m.scrape_duration.observe(seconds);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_init() {
        // init() may race with other tests, so only check once it has settled
        let _ = Metrics::init();
        if Metrics::get().is_some() {
            try_record_watch_event("added");
            try_record_lookup_fallback("timeout");
            try_set_store_size(3);

            let text = gather();
            assert!(text.contains("acm_exporter_watch_events_total"));
            assert!(text.contains("acm_exporter_store_clusters"));
        }
    }
}
