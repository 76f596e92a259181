//! List-watch adapter for ManagedClusters
//!
//! Wraps the remote `managedclusters` collection behind the [`ListWatch`]
//! contract consumed by the [`Reflector`](crate::reflector::Reflector): a
//! consistent snapshot with its resource version, followed by a change stream
//! resumable from that version.

use crate::error::{ExporterError, Result};
use crate::resource::{ManagedCluster, managed_cluster_resource};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use kube::Client;
use kube::api::{Api, ApiResource, DynamicObject, ListParams, WatchEvent, WatchParams};
use tracing::{debug, warn};

/// Snapshot returned by [`ListWatch::list`]
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Successfully decoded instances, in server order
    pub items: Vec<ManagedCluster>,
    /// Resource version to resume watching from
    pub resource_version: String,
    /// Objects skipped because they failed to decode
    pub skipped: usize,
}

/// A single change observed on the watch stream
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceEvent {
    Added(ManagedCluster),
    Modified(ManagedCluster),
    Deleted(ManagedCluster),
    /// Progress marker carrying only a newer resource version
    Bookmark(String),
}

impl ResourceEvent {
    /// Event type name used for logging and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ResourceEvent::Added(_) => "added",
            ResourceEvent::Modified(_) => "modified",
            ResourceEvent::Deleted(_) => "deleted",
            ResourceEvent::Bookmark(_) => "bookmark",
        }
    }

    /// Resource version carried by this event, if any
    pub fn resource_version(&self) -> Option<&str> {
        match self {
            ResourceEvent::Added(mc) | ResourceEvent::Modified(mc) | ResourceEvent::Deleted(mc) => {
                mc.resource_version.as_deref()
            }
            ResourceEvent::Bookmark(rv) => Some(rv),
        }
    }
}

/// Change stream; `Transport` items end the watch, `Decode` items are skippable
pub type WatchStream = BoxStream<'static, Result<ResourceEvent>>;

/// List + watch contract for one resource kind
///
/// # Example
///
/// ```ignore
/// struct FixedSource(Vec<ManagedCluster>);
///
/// #[async_trait]
/// impl ListWatch for FixedSource {
///     async fn list(&self) -> Result<Snapshot> {
///         Ok(Snapshot { items: self.0.clone(), resource_version: "1".into(), skipped: 0 })
///     }
///
///     async fn watch(&self, _rv: &str) -> Result<WatchStream> {
///         Ok(futures::stream::pending().boxed())
///     }
/// }
/// ```
#[async_trait]
pub trait ListWatch: Send + Sync {
    /// Fetch a consistent snapshot of the collection
    async fn list(&self) -> Result<Snapshot>;

    /// Open a change stream starting after `resource_version`
    async fn watch(&self, resource_version: &str) -> Result<WatchStream>;
}

/// [`ListWatch`] over the Kubernetes API using untyped objects
pub struct KubeListWatch {
    api: Api<DynamicObject>,
    resource: ApiResource,
    label_selector: Option<String>,
}

impl KubeListWatch {
    /// Create an adapter for cluster-scoped ManagedClusters
    pub fn managed_clusters(client: Client) -> Self {
        let resource = managed_cluster_resource();
        Self {
            api: Api::all_with(client, &resource),
            resource,
            label_selector: None,
        }
    }

    /// Filter by labels
    pub fn labels(mut self, selector: impl Into<String>) -> Self {
        self.label_selector = Some(selector.into());
        self
    }

    fn list_params(&self) -> ListParams {
        match &self.label_selector {
            Some(selector) => ListParams::default().labels(selector),
            None => ListParams::default(),
        }
    }

    fn watch_params(&self) -> WatchParams {
        match &self.label_selector {
            Some(selector) => WatchParams::default().labels(selector),
            None => WatchParams::default(),
        }
    }
}

#[async_trait]
impl ListWatch for KubeListWatch {
    async fn list(&self) -> Result<Snapshot> {
        let list = self.api.list(&self.list_params()).await.map_err(|e| {
            ExporterError::Transport(format!("list {}: {e}", self.resource.plural))
        })?;

        let resource_version = list.metadata.resource_version.unwrap_or_default();
        let mut snapshot = Snapshot {
            items: Vec::with_capacity(list.items.len()),
            resource_version,
            skipped: 0,
        };

        for obj in list.items {
            match ManagedCluster::try_from(obj) {
                Ok(mc) => snapshot.items.push(mc),
                Err(e) => {
                    warn!(resource = %self.resource.plural, error = %e, "Skipping undecodable object");
                    crate::metrics::try_record_decode_error();
                    snapshot.skipped += 1;
                }
            }
        }

        debug!(
            resource = %self.resource.plural,
            count = snapshot.items.len(),
            skipped = snapshot.skipped,
            resource_version = %snapshot.resource_version,
            "Listed objects"
        );

        Ok(snapshot)
    }

    async fn watch(&self, resource_version: &str) -> Result<WatchStream> {
        let plural = self.resource.plural.clone();
        let stream = self
            .api
            .watch(&self.watch_params(), resource_version)
            .await
            .map_err(|e| ExporterError::Transport(format!("watch {plural}: {e}")))?;

        Ok(stream
            .map(move |item| match item {
                Ok(event) => convert_event(event),
                Err(e) => Err(ExporterError::Transport(format!("watch {plural}: {e}"))),
            })
            .boxed())
    }
}

/// Map a raw watch event onto the typed change stream
pub fn convert_event(event: WatchEvent<DynamicObject>) -> Result<ResourceEvent> {
    match event {
        WatchEvent::Added(obj) => Ok(ResourceEvent::Added(ManagedCluster::try_from(obj)?)),
        WatchEvent::Modified(obj) => Ok(ResourceEvent::Modified(ManagedCluster::try_from(obj)?)),
        // Removal needs only the identity; a bad status must not keep it stored
        WatchEvent::Deleted(obj) => Ok(ResourceEvent::Deleted(
            ManagedCluster::from_metadata(obj)?,
        )),
        WatchEvent::Bookmark(bookmark) => {
            Ok(ResourceEvent::Bookmark(bookmark.metadata.resource_version))
        }
        WatchEvent::Error(status) => Err(ExporterError::Transport(format!(
            "watch error {} ({}): {}",
            status.code, status.reason, status.message
        ))),
    }
}
