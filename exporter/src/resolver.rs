//! Cross-reference resolver: classifies how a ManagedCluster came to exist
//!
//! A cluster provisioned by Hive has a ClusterDeployment named after the
//! cluster, living in a namespace of the same name. A cluster without one was
//! imported.
//!
//! Only a confirmed not-found yields `imported`. Any other lookup failure
//! (API error, timeout) is ambiguous and classified by [`AmbiguousPolicy`],
//! which defaults to `hive` for compatibility with existing dashboards. That
//! default conflates "confirmed hive" with "lookup failed" and is likely a
//! defect; `AmbiguousPolicy::Unknown` reports such clusters as `unknown`.

use crate::resource::{ManagedCluster, cluster_deployment_resource};
use async_trait::async_trait;
use kube::Client;
use kube::api::{Api, ApiResource, DynamicObject};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Provenance tag attached to every sample as `created_via`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provenance {
    Hive,
    Imported,
    Unknown,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Hive => "hive",
            Provenance::Imported => "imported",
            Provenance::Unknown => "unknown",
        }
    }
}

/// Classification applied when a lookup neither confirms nor denies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AmbiguousPolicy {
    #[default]
    Hive,
    Unknown,
}

impl AmbiguousPolicy {
    fn provenance(self) -> Provenance {
        match self {
            AmbiguousPolicy::Hive => Provenance::Hive,
            AmbiguousPolicy::Unknown => Provenance::Unknown,
        }
    }
}

/// Result of a single ClusterDeployment point lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    Found,
    NotFound,
    /// The API answered with something other than the object or a 404
    Failed(String),
    /// No answer within the lookup timeout
    TimedOut,
}

/// Point lookup of the secondary resource
#[async_trait]
pub trait ClusterDeploymentLookup: Send + Sync {
    async fn lookup(&self, namespace: &str, name: &str) -> LookupOutcome;
}

/// [`ClusterDeploymentLookup`] against the Kubernetes API
pub struct KubeClusterDeploymentLookup {
    client: Client,
    resource: ApiResource,
}

impl KubeClusterDeploymentLookup {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            resource: cluster_deployment_resource(),
        }
    }
}

#[async_trait]
impl ClusterDeploymentLookup for KubeClusterDeploymentLookup {
    async fn lookup(&self, namespace: &str, name: &str) -> LookupOutcome {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &self.resource);

        match api.get(name).await {
            Ok(_) => LookupOutcome::Found,
            Err(kube::Error::Api(resp)) if resp.code == 404 => LookupOutcome::NotFound,
            Err(e) => LookupOutcome::Failed(e.to_string()),
        }
    }
}

/// Classifies a ManagedCluster into a [`Provenance`]
#[async_trait]
pub trait ProvenanceResolver: Send + Sync {
    async fn classify(&self, cluster: &ManagedCluster) -> Provenance;
}

/// Resolver performing one bounded lookup per call
pub struct ClusterDeploymentResolver<L> {
    lookup: L,
    timeout: Duration,
    policy: AmbiguousPolicy,
}

impl<L: ClusterDeploymentLookup> ClusterDeploymentResolver<L> {
    pub fn new(lookup: L) -> Self {
        Self {
            lookup,
            timeout: Duration::from_secs(5),
            policy: AmbiguousPolicy::default(),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn policy(mut self, policy: AmbiguousPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Lookup bounded by the configured timeout
    async fn bounded_lookup(&self, cluster: &ManagedCluster) -> LookupOutcome {
        // ClusterDeployments live in a namespace named after the cluster
        let lookup = self.lookup.lookup(&cluster.name, &cluster.name);
        tokio::time::timeout(self.timeout, lookup)
            .await
            .unwrap_or(LookupOutcome::TimedOut)
    }

    fn resolve(&self, cluster: &ManagedCluster, outcome: LookupOutcome) -> Provenance {
        match outcome {
            LookupOutcome::Found => Provenance::Hive,
            LookupOutcome::NotFound => Provenance::Imported,
            LookupOutcome::Failed(reason) => {
                let provenance = self.policy.provenance();
                warn!(
                    cluster = %cluster.name,
                    error = %reason,
                    created_via = provenance.as_str(),
                    "ClusterDeployment lookup failed, applying fallback classification"
                );
                crate::metrics::try_record_lookup_fallback("error");
                provenance
            }
            LookupOutcome::TimedOut => {
                let provenance = self.policy.provenance();
                warn!(
                    cluster = %cluster.name,
                    timeout = ?self.timeout,
                    created_via = provenance.as_str(),
                    "ClusterDeployment lookup timed out, applying fallback classification"
                );
                crate::metrics::try_record_lookup_fallback("timeout");
                provenance
            }
        }
    }

    /// Classify and report whether the answer was definitive
    async fn classify_with_certainty(&self, cluster: &ManagedCluster) -> (Provenance, bool) {
        let outcome = self.bounded_lookup(cluster).await;
        let definitive = matches!(outcome, LookupOutcome::Found | LookupOutcome::NotFound);
        (self.resolve(cluster, outcome), definitive)
    }
}

#[async_trait]
impl<L: ClusterDeploymentLookup> ProvenanceResolver for ClusterDeploymentResolver<L> {
    async fn classify(&self, cluster: &ManagedCluster) -> Provenance {
        self.classify_with_certainty(cluster).await.0
    }
}

/// TTL cache in front of a [`ClusterDeploymentResolver`]
///
/// Only definitive answers are cached; fallbacks are retried on the next scrape.
pub struct CachingResolver<L> {
    inner: ClusterDeploymentResolver<L>,
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, Provenance)>>,
}

impl<L: ClusterDeploymentLookup> CachingResolver<L> {
    pub fn new(inner: ClusterDeploymentResolver<L>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn cached(&self, name: &str) -> Option<Provenance> {
        let mut entries = self.entries.lock();
        match entries.get(name) {
            Some((at, provenance)) if at.elapsed() < self.ttl => Some(*provenance),
            Some(_) => {
                entries.remove(name);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl<L: ClusterDeploymentLookup> ProvenanceResolver for CachingResolver<L> {
    async fn classify(&self, cluster: &ManagedCluster) -> Provenance {
        if let Some(provenance) = self.cached(&cluster.name) {
            debug!(cluster = %cluster.name, created_via = provenance.as_str(), "Provenance cache hit");
            return provenance;
        }

        let (provenance, definitive) = self.inner.classify_with_certainty(cluster).await;
        if definitive {
            let mut entries = self.entries.lock();
            // Deleted clusters are never looked up again; expire them here
            entries.retain(|_, (at, _)| at.elapsed() < self.ttl);
            entries.insert(cluster.name.clone(), (Instant::now(), provenance));
        }
        provenance
    }
}

/// Build the resolver stack for the given client and settings
pub fn kube_resolver(
    client: Client,
    timeout: Duration,
    policy: AmbiguousPolicy,
    cache_ttl: Duration,
) -> Arc<dyn ProvenanceResolver> {
    let resolver = ClusterDeploymentResolver::new(KubeClusterDeploymentLookup::new(client))
        .timeout(timeout)
        .policy(policy);

    if cache_ttl.is_zero() {
        Arc::new(resolver)
    } else {
        Arc::new(CachingResolver::new(resolver, cache_ttl))
    }
}
