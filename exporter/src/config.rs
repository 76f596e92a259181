//! Configuration for the exporter

use crate::error::{ExporterError, Result};
use crate::reflector::BackoffConfig;
use crate::resolver::AmbiguousPolicy;
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Main configuration for the exporter
#[derive(Debug, Clone)]
pub struct Config {
    /// Metrics server address
    pub metrics_addr: SocketAddr,

    /// Label selector applied to the ManagedCluster list/watch
    pub label_selector: Option<String>,

    /// Upper bound for a single ClusterDeployment lookup
    pub lookup_timeout: Duration,

    /// TTL of cached provenance lookups (zero disables caching)
    pub lookup_cache_ttl: Duration,

    /// Classification applied when a lookup neither confirms nor denies
    pub ambiguous_policy: AmbiguousPolicy,

    /// Concurrent lookups per scrape
    pub scrape_concurrency: usize,

    /// Re-list backoff after list/watch failures
    pub relist_backoff: BackoffConfig,

    /// Log level
    pub log_level: String,

    /// Log format (json or pretty)
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            label_selector: None,
            lookup_timeout: Duration::from_secs(5),
            lookup_cache_ttl: Duration::ZERO,
            ambiguous_policy: AmbiguousPolicy::Hive,
            scrape_concurrency: 8,
            relist_backoff: BackoffConfig::default(),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(addr) = lookup("ACM_METRICS_ADDR") {
            config.metrics_addr = parse_var("ACM_METRICS_ADDR", &addr)?;
        }

        if let Some(selector) = lookup("ACM_LABEL_SELECTOR")
            && !selector.trim().is_empty()
        {
            config.label_selector = Some(selector);
        }

        if let Some(ms) = lookup("ACM_LOOKUP_TIMEOUT_MS") {
            let ms: u64 = parse_var("ACM_LOOKUP_TIMEOUT_MS", &ms)?;
            if ms == 0 {
                return Err(ExporterError::Config(
                    "invalid ACM_LOOKUP_TIMEOUT_MS: must be greater than zero".to_string(),
                ));
            }
            config.lookup_timeout = Duration::from_millis(ms);
        }

        if let Some(secs) = lookup("ACM_LOOKUP_CACHE_TTL_SECS") {
            config.lookup_cache_ttl =
                Duration::from_secs(parse_var("ACM_LOOKUP_CACHE_TTL_SECS", &secs)?);
        }

        if let Some(policy) = lookup("ACM_AMBIGUOUS_PROVENANCE") {
            config.ambiguous_policy = match policy.to_lowercase().as_str() {
                "hive" => AmbiguousPolicy::Hive,
                "unknown" => AmbiguousPolicy::Unknown,
                other => {
                    return Err(ExporterError::Config(format!(
                        "invalid ACM_AMBIGUOUS_PROVENANCE: {other} (expected 'hive' or 'unknown')"
                    )));
                }
            };
        }

        if let Some(n) = lookup("ACM_SCRAPE_CONCURRENCY") {
            config.scrape_concurrency = parse_var("ACM_SCRAPE_CONCURRENCY", &n)?;
            if config.scrape_concurrency == 0 {
                return Err(ExporterError::Config(
                    "invalid ACM_SCRAPE_CONCURRENCY: must be greater than zero".to_string(),
                ));
            }
        }

        if let Some(ms) = lookup("ACM_RELIST_BACKOFF_INITIAL_MS") {
            config.relist_backoff.initial_delay =
                Duration::from_millis(parse_var("ACM_RELIST_BACKOFF_INITIAL_MS", &ms)?);
        }

        if let Some(ms) = lookup("ACM_RELIST_BACKOFF_MAX_MS") {
            config.relist_backoff.max_delay =
                Duration::from_millis(parse_var("ACM_RELIST_BACKOFF_MAX_MS", &ms)?);
        }

        if config.relist_backoff.max_delay < config.relist_backoff.initial_delay {
            return Err(ExporterError::Config(
                "ACM_RELIST_BACKOFF_MAX_MS must not be below ACM_RELIST_BACKOFF_INITIAL_MS"
                    .to_string(),
            ));
        }

        if let Some(level) = lookup("ACM_LOG_LEVEL") {
            config.log_level = level;
        }

        if let Some(format) = lookup("ACM_LOG_FORMAT") {
            config.log_format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                other => {
                    return Err(ExporterError::Config(format!(
                        "invalid ACM_LOG_FORMAT: {other} (expected 'json' or 'pretty')"
                    )));
                }
            };
        }

        Ok(config)
    }
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| ExporterError::Config(format!("invalid {key}: {e}")))
}
