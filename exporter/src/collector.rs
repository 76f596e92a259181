//! Scrape path: stored ManagedClusters → exposition text
//!
//! Every scrape recomputes all families from the current store snapshot.
//! Derived labels (and with them the provenance lookup) are resolved once per
//! cluster, then shared by every family.
//!
//! Enriched samples always carry `created_via`, so a cluster whose
//! ClusterDeployment lookup returns not-found renders as
//! `acm_managedcluster_created{created_via="imported",hub_name="mc1"}`, not with
//! `hub_name` alone. Only the bare generator output lacks the derived labels.

use crate::exposition::{write_header, write_metric};
use crate::family::{DerivedLabels, Family, FamilyGenerator, enrich};
use crate::reflector::ClusterStore;
use crate::resolver::ProvenanceResolver;
use crate::resource::ManagedCluster;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Renders the ManagedCluster families from a [`ClusterStore`]
pub struct ClusterCollector {
    store: ClusterStore,
    resolver: Arc<dyn ProvenanceResolver>,
    families: Arc<[FamilyGenerator]>,
    concurrency: usize,
}

impl ClusterCollector {
    pub fn new(
        store: ClusterStore,
        resolver: Arc<dyn ProvenanceResolver>,
        families: Arc<[FamilyGenerator]>,
    ) -> Self {
        Self {
            store,
            resolver,
            families,
            concurrency: 8,
        }
    }

    /// Maximum number of concurrent provenance lookups per scrape
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Resolve derived labels for every stored cluster, in store order
    async fn resolve_all(&self) -> Vec<(Arc<ManagedCluster>, DerivedLabels)> {
        let clusters = self.store.snapshot();
        let resolver = self.resolver.as_ref();

        futures::stream::iter(clusters)
            .map(|cluster| async move {
                let derived = DerivedLabels::resolve(&cluster, resolver).await;
                (cluster, derived)
            })
            .buffered(self.concurrency)
            .collect()
            .await
    }

    /// Generate and render every family for the current store contents
    ///
    /// Never fails: samples that cannot be rendered are dropped and logged.
    pub async fn scrape(&self) -> String {
        let started = Instant::now();
        let resolved = self.resolve_all().await;
        let mut out = String::new();

        for generator in self.families.iter() {
            let families: Vec<Family> = resolved
                .iter()
                .map(|(cluster, derived)| {
                    let (family, rejected) = enrich((generator.generate)(cluster), derived);
                    for misaligned in rejected {
                        warn!(
                            metric = generator.name,
                            cluster = %cluster.name,
                            error = %misaligned,
                            "Dropping sample with misaligned labels"
                        );
                    }
                    family
                })
                .collect();

            if families.iter().all(|f| f.metrics.is_empty()) {
                continue;
            }

            write_header(&mut out, generator);
            for metric in families.iter().flat_map(|f| &f.metrics) {
                write_metric(&mut out, generator.name, metric);
            }
        }

        let elapsed = started.elapsed();
        crate::metrics::try_observe_scrape(elapsed.as_secs_f64());
        debug!(clusters = resolved.len(), elapsed = ?elapsed, "Scrape rendered");

        out
    }
}
