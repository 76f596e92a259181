//! Metric families generated from ManagedClusters
//!
//! Each [`FamilyGenerator`] maps one cluster snapshot to zero or more samples.
//! [`enrich`] then prepends the [`DerivedLabels`] shared by every family so
//! the per-family generators stay pure and only describe their own labels.

use crate::resolver::ProvenanceResolver;
use crate::resource::ManagedCluster;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Keys prepended to every sample, in order
pub const DERIVED_LABEL_KEYS: [&str; 4] = ["vendor", "cloud", "created_via", "version"];

/// Exposition type of a family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Gauge,
    Counter,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Gauge => "gauge",
            MetricType::Counter => "counter",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One sample: positionally aligned label keys and values plus a value
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Metric {
    pub label_keys: Vec<String>,
    pub label_values: Vec<String>,
    pub value: f64,
}

impl Metric {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            ..Default::default()
        }
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.label_keys.push(key.into());
        self.label_values.push(value.into());
        self
    }

    pub fn is_aligned(&self) -> bool {
        self.label_keys.len() == self.label_values.len()
    }
}

/// Samples one generator produced for one cluster
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Family {
    pub metrics: Vec<Metric>,
}

/// Static declaration of a metric family
#[derive(Debug, Clone, Copy)]
pub struct FamilyGenerator {
    pub name: &'static str,
    pub help: &'static str,
    pub metric_type: MetricType,
    pub generate: fn(&ManagedCluster) -> Family,
}

/// Labels derived once per cluster per scrape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedLabels {
    values: [String; 4],
}

impl DerivedLabels {
    /// Classify the cluster and read the label-derived values
    pub async fn resolve(cluster: &ManagedCluster, resolver: &dyn ProvenanceResolver) -> Self {
        let provenance = resolver.classify(cluster).await;
        Self::from_parts(cluster, provenance.as_str())
    }

    pub fn from_parts(cluster: &ManagedCluster, created_via: &str) -> Self {
        Self {
            values: [
                cluster.label_or_empty("vendor").to_string(),
                cluster.label_or_empty("cloud").to_string(),
                created_via.to_string(),
                cluster.kubernetes_version.clone(),
            ],
        }
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }
}

/// A sample whose label keys and values differ in length
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MisalignedLabels {
    pub keys: usize,
    pub values: usize,
}

impl fmt::Display for MisalignedLabels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} label keys but {} label values",
            self.keys, self.values
        )
    }
}

/// Prepend the derived labels to every sample of `family`
///
/// Misaligned samples are dropped and reported; aligned ones always come out
/// aligned.
pub fn enrich(mut family: Family, derived: &DerivedLabels) -> (Family, Vec<MisalignedLabels>) {
    let mut rejected = Vec::new();

    family.metrics.retain_mut(|metric| {
        if !metric.is_aligned() {
            rejected.push(MisalignedLabels {
                keys: metric.label_keys.len(),
                values: metric.label_values.len(),
            });
            return false;
        }

        let mut keys: Vec<String> = DERIVED_LABEL_KEYS.iter().map(|k| k.to_string()).collect();
        keys.append(&mut metric.label_keys);
        metric.label_keys = keys;

        let mut values = derived.values().to_vec();
        values.append(&mut metric.label_values);
        metric.label_values = values;
        true
    });

    (family, rejected)
}

fn created(cluster: &ManagedCluster) -> Family {
    let metrics = cluster
        .creation_timestamp
        .map(|ts| {
            Metric::new(ts.timestamp() as f64 + f64::from(ts.timestamp_subsec_nanos()) / 1e9)
                .label("hub_name", cluster.name.as_str())
        })
        .into_iter()
        .collect();

    Family { metrics }
}

fn labels(cluster: &ManagedCluster) -> Family {
    let mut metric = Metric::new(1.0).label("hub_name", cluster.name.as_str());
    let mut seen: HashMap<String, &str> = HashMap::new();

    // Keys iterate sorted, so the first key claiming a sanitized name wins
    for (key, value) in &cluster.labels {
        let name = format!("label_{}", sanitize_label_name(key));
        if let Some(kept) = seen.get(&name) {
            warn!(
                cluster = %cluster.name,
                label = %key,
                kept = %kept,
                prometheus_label = %name,
                "Dropping label that collides after sanitization"
            );
            continue;
        }
        seen.insert(name.clone(), key.as_str());
        metric = metric.label(name, value);
    }

    Family {
        metrics: vec![metric],
    }
}

/// Map a Kubernetes label key onto a Prometheus label name
pub fn sanitize_label_name(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// The families exported for every ManagedCluster
pub fn managed_cluster_families() -> Arc<[FamilyGenerator]> {
    Arc::from(vec![
        FamilyGenerator {
            name: "acm_managedcluster_created",
            help: "Unix creation timestamp",
            metric_type: MetricType::Gauge,
            generate: created,
        },
        FamilyGenerator {
            name: "acm_managedcluster_labels",
            help: "ACM labels converted to Prometheus labels.",
            metric_type: MetricType::Gauge,
            generate: labels,
        },
    ])
}
