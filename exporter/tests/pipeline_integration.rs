//! Integration tests for the list-watch → store → scrape pipeline
//!
//! These tests drive the reflector with a scripted source and render the
//! store through the collector, checking the exposition text end to end.

#![allow(clippy::unwrap_used)]

use acm_metrics_exporter::exposition::{write_header, write_metric};
use acm_metrics_exporter::resolver::{
    AmbiguousPolicy, ClusterDeploymentLookup, ClusterDeploymentResolver, LookupOutcome,
};
use acm_metrics_exporter::source::{ResourceEvent, Snapshot, WatchStream};
use acm_metrics_exporter::{
    ClusterCollector, ClusterStore, ExporterError, ListWatch, ManagedCluster, Reflector,
    managed_cluster_families,
};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

// ============================================================================
// Test Sources
// ============================================================================

/// Source that serves scripted lists and watch sessions in order
struct ScriptedSource {
    lists: Mutex<VecDeque<Snapshot>>,
    watches: Mutex<VecDeque<Vec<Result<ResourceEvent, ExporterError>>>>,
    list_count: Arc<AtomicU32>,
}

impl ScriptedSource {
    fn new(list_count: Arc<AtomicU32>) -> Self {
        Self {
            lists: Mutex::new(VecDeque::new()),
            watches: Mutex::new(VecDeque::new()),
            list_count,
        }
    }

    fn then_list(self, items: Vec<ManagedCluster>, rv: &str) -> Self {
        self.lists.lock().push_back(Snapshot {
            items,
            resource_version: rv.to_string(),
            skipped: 0,
        });
        self
    }

    fn then_watch(self, events: Vec<Result<ResourceEvent, ExporterError>>) -> Self {
        self.watches.lock().push_back(events);
        self
    }
}

#[async_trait]
impl ListWatch for ScriptedSource {
    async fn list(&self) -> Result<Snapshot, ExporterError> {
        self.list_count.fetch_add(1, Ordering::SeqCst);
        self.lists
            .lock()
            .pop_front()
            .ok_or_else(|| ExporterError::Transport("api server unavailable".into()))
    }

    async fn watch(&self, _resource_version: &str) -> Result<WatchStream, ExporterError> {
        match self.watches.lock().pop_front() {
            Some(events) => Ok(futures::stream::iter(events).boxed()),
            None => Ok(futures::stream::pending().boxed()),
        }
    }
}

/// ClusterDeployment lookup backed by a set of hive-provisioned names
struct HiveClusters(HashSet<String>);

#[async_trait]
impl ClusterDeploymentLookup for HiveClusters {
    async fn lookup(&self, namespace: &str, name: &str) -> LookupOutcome {
        if namespace == name && self.0.contains(name) {
            LookupOutcome::Found
        } else {
            LookupOutcome::NotFound
        }
    }
}

fn cluster(name: &str, rv: &str) -> ManagedCluster {
    let mut mc =
        ManagedCluster::new(name).created_at(Utc.timestamp_opt(1_500_000_000, 0).unwrap());
    mc.resource_version = Some(rv.to_string());
    mc
}

fn collector(store: ClusterStore, hive: &[&str]) -> ClusterCollector {
    let lookup = HiveClusters(hive.iter().map(|s| s.to_string()).collect());
    let resolver = ClusterDeploymentResolver::new(lookup)
        .timeout(Duration::from_secs(1))
        .policy(AmbiguousPolicy::Hive);
    ClusterCollector::new(store, Arc::new(resolver), managed_cluster_families())
}

async fn wait_for(store: &ClusterStore, expected: &[&str]) {
    for _ in 0..200 {
        let names: Vec<String> = store.snapshot().iter().map(|mc| mc.name.clone()).collect();
        if names == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let names: Vec<String> = store.snapshot().iter().map(|mc| mc.name.clone()).collect();
    assert_eq!(names, expected);
}

// ============================================================================
// Exposition Scenarios
// ============================================================================

#[test]
fn test_created_family_base_output() {
    let families = managed_cluster_families();
    let created = families
        .iter()
        .find(|g| g.name == "acm_managedcluster_created")
        .unwrap();

    let mut out = String::new();
    write_header(&mut out, created);
    for metric in (created.generate)(&cluster("mc1", "1")).metrics {
        write_metric(&mut out, created.name, &metric);
    }

    assert_eq!(
        out,
        "# HELP acm_managedcluster_created Unix creation timestamp\n\
         # TYPE acm_managedcluster_created gauge\n\
         acm_managedcluster_created{hub_name=\"mc1\"} 1.5e+09\n"
    );
}

#[tokio::test]
async fn test_hive_cluster_with_vendor_labels() {
    let store = ClusterStore::new();
    store.apply(
        cluster("mc1", "1")
            .label("vendor", "aws")
            .label("cloud", "amazon"),
    );

    let text = collector(store, &["mc1"]).scrape().await;
    assert!(text.contains(
        "acm_managedcluster_created{vendor=\"aws\",cloud=\"amazon\",created_via=\"hive\",hub_name=\"mc1\"} 1.5e+09\n"
    ));
}

// ============================================================================
// Watch Disruption
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_transport_error_relists_without_stale_entries() {
    let list_count = Arc::new(AtomicU32::new(0));
    let source = ScriptedSource::new(Arc::clone(&list_count))
        .then_list(vec![cluster("mc1", "1"), cluster("mc2", "1")], "10")
        .then_watch(vec![
            Ok(ResourceEvent::Added(cluster("mc3", "11"))),
            Ok(ResourceEvent::Modified(cluster("mc1", "12"))),
            Err(ExporterError::Transport("watch stream reset".into())),
        ])
        // mc2 was deleted while the watch was down
        .then_list(vec![cluster("mc1", "20"), cluster("mc3", "20")], "20");

    let store = ClusterStore::new();
    let handle = tokio::spawn(Reflector::new(source, store.clone()).run());

    wait_for(&store, &["mc1", "mc3"]).await;
    assert_eq!(list_count.load(Ordering::SeqCst), 2);
    assert_eq!(store.len(), 2);

    let text = collector(store.clone(), &["mc3"]).scrape().await;
    handle.abort();

    let created: Vec<&str> = text
        .lines()
        .filter(|l| l.starts_with("acm_managedcluster_created{"))
        .collect();
    assert_eq!(
        created,
        vec![
            "acm_managedcluster_created{created_via=\"imported\",hub_name=\"mc1\"} 1.5e+09",
            "acm_managedcluster_created{created_via=\"hive\",hub_name=\"mc3\"} 1.5e+09",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_unavailable_api_is_retried_with_backoff() {
    let list_count = Arc::new(AtomicU32::new(0));
    let source = ScriptedSource::new(Arc::clone(&list_count));

    let store = ClusterStore::new();
    let handle = tokio::spawn(Reflector::new(source, store.clone()).run());

    // Default backoff: 0.5s, 1s, 2s, 4s ... so ~4 attempts fit in 5s
    tokio::time::sleep(Duration::from_secs(5)).await;
    handle.abort();

    let attempts = list_count.load(Ordering::SeqCst);
    assert!((2..=5).contains(&attempts), "unexpected attempts: {attempts}");
    assert!(store.is_empty());
}
