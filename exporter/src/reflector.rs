//! Reflector: drives a [`ListWatch`] source into a shared keyed store
//!
//! ```text
//! list ──► replace store ──► watch(rv) ──► apply events ──┐
//!   ▲                                                     │
//!   └──────────── backoff ◄── transport error ◄───────────┘
//! ```
//!
//! One task writes; scrapes read through [`ClusterStore::snapshot`], which only
//! holds the lock long enough to clone `Arc`s out.

use crate::error::{ExporterError, Result};
use crate::resource::{ManagedCluster, ObjectKey};
use crate::source::{ListWatch, ResourceEvent, Snapshot};
use futures::StreamExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Shared, read-mostly store of ManagedCluster snapshots keyed by identity
#[derive(Clone, Default)]
pub struct ClusterStore {
    inner: Arc<RwLock<HashMap<ObjectKey, Arc<ManagedCluster>>>>,
}

impl ClusterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the snapshot for this identity
    pub fn apply(&self, cluster: ManagedCluster) {
        self.inner.write().insert(cluster.key(), Arc::new(cluster));
    }

    /// Remove the snapshot for this identity
    pub fn delete(&self, key: &ObjectKey) -> bool {
        self.inner.write().remove(key).is_some()
    }

    /// Replace the whole content with a fresh listing
    pub fn replace(&self, clusters: Vec<ManagedCluster>) {
        let fresh: HashMap<_, _> = clusters
            .into_iter()
            .map(|mc| (mc.key(), Arc::new(mc)))
            .collect();
        *self.inner.write() = fresh;
    }

    pub fn get(&self, key: &ObjectKey) -> Option<Arc<ManagedCluster>> {
        self.inner.read().get(key).cloned()
    }

    /// All stored snapshots, ordered by identity
    pub fn snapshot(&self) -> Vec<Arc<ManagedCluster>> {
        let mut clusters: Vec<_> = self.inner.read().values().cloned().collect();
        clusters.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));
        clusters
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

/// Exponential backoff between re-list attempts
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Growth factor applied after each failed attempt
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl BackoffConfig {
    /// Delay before retry number `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.min(32) as i32);
        let delay = self.initial_delay.as_secs_f64() * factor;
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }
}

/// How a watch session ended
#[derive(Debug)]
pub enum WatchOutcome {
    /// Stream closed by the server; resume watching from this version
    Ended {
        resource_version: String,
        events: usize,
    },
    /// Transport failure; the store must be re-listed
    Failed { error: ExporterError, events: usize },
}

impl WatchOutcome {
    /// Events applied before the session ended
    pub fn events(&self) -> usize {
        match self {
            WatchOutcome::Ended { events, .. } | WatchOutcome::Failed { events, .. } => *events,
        }
    }
}

/// Keeps a [`ClusterStore`] synchronized with a [`ListWatch`] source
pub struct Reflector<S> {
    source: S,
    store: ClusterStore,
    backoff: BackoffConfig,
}

impl<S: ListWatch> Reflector<S> {
    pub fn new(source: S, store: ClusterStore) -> Self {
        Self {
            source,
            store,
            backoff: BackoffConfig::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn store(&self) -> &ClusterStore {
        &self.store
    }

    /// List the source and replace the store contents
    ///
    /// Returns the resource version to resume watching from.
    pub async fn relist(&self) -> Result<String> {
        let Snapshot {
            items,
            resource_version,
            skipped,
        } = self.source.list().await?;

        let count = items.len();
        self.store.replace(items);
        crate::metrics::try_record_relist(self.store.len());

        info!(
            clusters = count,
            skipped = skipped,
            resource_version = %resource_version,
            "Store resynchronized from list"
        );

        Ok(resource_version)
    }

    /// Consume one watch session, applying events to the store
    pub async fn watch_from(&self, resource_version: String) -> WatchOutcome {
        let mut stream = match self.source.watch(&resource_version).await {
            Ok(stream) => stream,
            Err(error) => return WatchOutcome::Failed { error, events: 0 },
        };

        let mut latest = resource_version;
        let mut events = 0;

        while let Some(item) = stream.next().await {
            match item {
                Ok(event) => {
                    if let Some(rv) = event.resource_version() {
                        latest = rv.to_string();
                    }
                    self.apply_event(event);
                    events += 1;
                }
                Err(error) if error.requires_relist() => {
                    return WatchOutcome::Failed { error, events };
                }
                Err(e) => {
                    warn!(error = %e, "Skipping watch event");
                    crate::metrics::try_record_decode_error();
                }
            }
        }

        WatchOutcome::Ended {
            resource_version: latest,
            events,
        }
    }

    fn apply_event(&self, event: ResourceEvent) {
        crate::metrics::try_record_watch_event(event.kind());

        match event {
            ResourceEvent::Added(mc) | ResourceEvent::Modified(mc) => {
                debug!(cluster = %mc.key(), "Applying cluster update");
                self.store.apply(mc);
            }
            ResourceEvent::Deleted(mc) => {
                debug!(cluster = %mc.key(), "Removing cluster");
                self.store.delete(&mc.key());
            }
            ResourceEvent::Bookmark(_) => {}
        }

        crate::metrics::try_set_store_size(self.store.len());
    }

    /// Run list/watch until the process exits
    ///
    /// Transport failures are logged and followed by a backoff and a fresh
    /// list; they never end the loop. The backoff only resets once a watch
    /// session delivers events, so a source that lists fine but cannot watch
    /// is still retried at a decreasing rate.
    pub async fn run(self) {
        let mut attempt: u32 = 0;

        loop {
            let mut resource_version = match self.relist().await {
                Ok(rv) => rv,
                Err(e) => {
                    let delay = self.backoff.delay_for(attempt);
                    error!(error = %e, retry_in = ?delay, "List failed");
                    crate::metrics::try_record_transport_error();
                    attempt = attempt.saturating_add(1);
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            loop {
                let outcome = self.watch_from(resource_version).await;
                if outcome.events() > 0 {
                    attempt = 0;
                }

                match outcome {
                    WatchOutcome::Ended {
                        resource_version: rv,
                        events,
                    } => {
                        if events == 0 {
                            // An empty session must not turn into a reconnect spin
                            let delay = self.backoff.delay_for(attempt);
                            debug!(
                                resource_version = %rv,
                                retry_in = ?delay,
                                "Watch closed without events"
                            );
                            attempt = attempt.saturating_add(1);
                            tokio::time::sleep(delay).await;
                        } else {
                            debug!(resource_version = %rv, events, "Watch ended, resuming");
                        }
                        resource_version = rv;
                    }
                    WatchOutcome::Failed { error, .. } => {
                        let delay = self.backoff.delay_for(attempt);
                        warn!(error = %error, retry_in = ?delay, "Watch failed, re-listing");
                        crate::metrics::try_record_transport_error();
                        attempt = attempt.saturating_add(1);
                        tokio::time::sleep(delay).await;
                        break;
                    }
                }
            }
        }
    }
}

/// Spawn the reflector as a background task
pub fn spawn_reflector<S>(reflector: Reflector<S>) -> tokio::task::JoinHandle<()>
where
    S: ListWatch + 'static,
{
    tokio::spawn(reflector.run())
}
