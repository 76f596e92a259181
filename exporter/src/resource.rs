//! Typed views of the resources the exporter consumes
//!
//! ManagedClusters arrive from the API server as untyped [`DynamicObject`]s and
//! are decoded at the adapter boundary into an immutable [`ManagedCluster`]
//! snapshot. Decoding is fallible and never panics.

use crate::error::DecodeError;
use chrono::{DateTime, Utc};
use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;

/// `cluster.open-cluster-management.io/v1` ManagedCluster
pub fn managed_cluster_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk("cluster.open-cluster-management.io", "v1", "ManagedCluster"),
        "managedclusters",
    )
}

/// `hive.openshift.io/v1` ClusterDeployment
pub fn cluster_deployment_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk("hive.openshift.io", "v1", "ClusterDeployment"),
        "clusterdeployments",
    )
}

/// Identity of an object in the local store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    /// Namespace, empty for cluster-scoped objects
    pub namespace: String,
    pub name: String,
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

/// Snapshot of one ManagedCluster revision
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ManagedCluster {
    pub namespace: String,
    pub name: String,
    /// `None` when the server reported no creation timestamp
    pub creation_timestamp: Option<DateTime<Utc>>,
    pub labels: BTreeMap<String, String>,
    /// `status.version.kubernetes`, empty until the cluster reports it
    pub kubernetes_version: String,
    pub resource_version: Option<String>,
}

impl ManagedCluster {
    /// Create a cluster-scoped snapshot with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn created_at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.creation_timestamp = Some(timestamp);
        self
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn kubernetes_version(mut self, version: impl Into<String>) -> Self {
        self.kubernetes_version = version.into();
        self
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }

    /// Label value, or the empty string when absent
    pub fn label_or_empty(&self, key: &str) -> &str {
        self.labels.get(key).map(String::as_str).unwrap_or("")
    }
}

#[derive(Debug, Default, Deserialize)]
struct ManagedClusterStatus {
    #[serde(default)]
    version: ManagedClusterVersion,
}

#[derive(Debug, Default, Deserialize)]
struct ManagedClusterVersion {
    #[serde(default)]
    kubernetes: String,
}

impl ManagedCluster {
    /// Decode metadata only, leaving `status` untouched
    ///
    /// Enough to identify a deleted object even when its status is malformed.
    pub fn from_metadata(obj: DynamicObject) -> Result<Self, DecodeError> {
        let name = obj
            .metadata
            .name
            .filter(|n| !n.is_empty())
            .ok_or(DecodeError::MissingField {
                field: "metadata.name",
            })?;

        Ok(ManagedCluster {
            namespace: obj.metadata.namespace.unwrap_or_default(),
            name,
            creation_timestamp: obj.metadata.creation_timestamp.map(|t| t.0),
            labels: obj.metadata.labels.unwrap_or_default(),
            kubernetes_version: String::new(),
            resource_version: obj.metadata.resource_version,
        })
    }
}

impl TryFrom<DynamicObject> for ManagedCluster {
    type Error = DecodeError;

    fn try_from(mut obj: DynamicObject) -> Result<Self, Self::Error> {
        let raw_status = obj.data.get_mut("status").map(serde_json::Value::take);
        let mut cluster = ManagedCluster::from_metadata(obj)?;

        if let Some(raw) = raw_status.filter(|v| !v.is_null()) {
            let status = ManagedClusterStatus::deserialize(raw).map_err(|e| {
                DecodeError::Malformed {
                    name: cluster.name.clone(),
                    field: "status",
                    message: e.to_string(),
                }
            })?;
            cluster.kubernetes_version = status.version.kubernetes;
        }

        Ok(cluster)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dynamic(value: serde_json::Value) -> DynamicObject {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_decode_full_object() {
        let obj = dynamic(json!({
            "apiVersion": "cluster.open-cluster-management.io/v1",
            "kind": "ManagedCluster",
            "metadata": {
                "name": "mc1",
                "resourceVersion": "42",
                "creationTimestamp": "2017-07-14T02:40:00Z",
                "labels": {"vendor": "OpenShift", "cloud": "Amazon"}
            },
            "spec": {"hubAcceptsClient": true},
            "status": {"version": {"kubernetes": "v1.27.3"}}
        }));

        let mc = ManagedCluster::try_from(obj).unwrap();
        assert_eq!(mc.name, "mc1");
        assert_eq!(mc.namespace, "");
        assert_eq!(mc.creation_timestamp.unwrap().timestamp(), 1_500_000_000);
        assert_eq!(mc.label_or_empty("vendor"), "OpenShift");
        assert_eq!(mc.label_or_empty("region"), "");
        assert_eq!(mc.kubernetes_version, "v1.27.3");
        assert_eq!(mc.resource_version.as_deref(), Some("42"));
    }

    #[test]
    fn test_decode_without_status_or_timestamp() {
        let obj = dynamic(json!({
            "apiVersion": "cluster.open-cluster-management.io/v1",
            "kind": "ManagedCluster",
            "metadata": {"name": "pending"}
        }));

        let mc = ManagedCluster::try_from(obj).unwrap();
        assert!(mc.creation_timestamp.is_none());
        assert!(mc.labels.is_empty());
        assert_eq!(mc.kubernetes_version, "");
    }

    #[test]
    fn test_decode_missing_name_fails() {
        let obj = dynamic(json!({
            "apiVersion": "cluster.open-cluster-management.io/v1",
            "kind": "ManagedCluster",
            "metadata": {}
        }));

        assert_eq!(
            ManagedCluster::try_from(obj).unwrap_err(),
            DecodeError::MissingField {
                field: "metadata.name"
            }
        );
    }

    #[test]
    fn test_decode_mistyped_status_fails() {
        let obj = dynamic(json!({
            "apiVersion": "cluster.open-cluster-management.io/v1",
            "kind": "ManagedCluster",
            "metadata": {"name": "broken"},
            "status": {"version": {"kubernetes": 127}}
        }));

        let err = ManagedCluster::try_from(obj).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Malformed { ref name, field: "status", .. } if name == "broken"
        ));
    }

    #[test]
    fn test_from_metadata_ignores_status() {
        let obj = dynamic(json!({
            "apiVersion": "cluster.open-cluster-management.io/v1",
            "kind": "ManagedCluster",
            "metadata": {"name": "broken", "resourceVersion": "9"},
            "status": {"version": {"kubernetes": 127}}
        }));

        let mc = ManagedCluster::from_metadata(obj).unwrap();
        assert_eq!(mc.key().to_string(), "broken");
        assert_eq!(mc.resource_version.as_deref(), Some("9"));
        assert_eq!(mc.kubernetes_version, "");
    }

    #[test]
    fn test_object_key_display() {
        assert_eq!(ManagedCluster::new("mc1").key().to_string(), "mc1");
        let key = ObjectKey {
            namespace: "ns".into(),
            name: "a".into(),
        };
        assert_eq!(key.to_string(), "ns/a");
    }

    #[test]
    fn test_resource_descriptors() {
        let mc = managed_cluster_resource();
        assert_eq!(mc.api_version, "cluster.open-cluster-management.io/v1");
        assert_eq!(mc.plural, "managedclusters");

        let cd = cluster_deployment_resource();
        assert_eq!(cd.group, "hive.openshift.io");
        assert_eq!(cd.plural, "clusterdeployments");
    }
}
