//! ACM ManagedCluster metrics exporter
//!
//! Keeps a local view of `ManagedCluster` resources in sync with the
//! Kubernetes API and renders them as Prometheus metrics, labeling each
//! cluster with how it was created (Hive-provisioned or imported).
//!
//! # Architecture
//!
//! ```text
//! KubeListWatch ──► Reflector ──► ClusterStore
//!                                      │ scrape
//!                                      ▼
//!           ProvenanceResolver ──► ClusterCollector ──► /metrics
//! ```
//!
//! The list/watch source and the provenance resolver are traits, so both
//! ends of the pipeline can be replaced in tests.

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]

pub mod collector;
pub mod config;
pub mod error;
pub mod exposition;
pub mod family;
pub mod metrics;
pub mod metrics_server;
pub mod reflector;
pub mod resolver;
pub mod resource;
pub mod source;

pub use collector::ClusterCollector;
pub use config::Config;
pub use error::{DecodeError, ExporterError, Result};
pub use family::{FamilyGenerator, managed_cluster_families};
pub use reflector::{ClusterStore, Reflector};
pub use resolver::{AmbiguousPolicy, Provenance, ProvenanceResolver};
pub use resource::ManagedCluster;
pub use source::{KubeListWatch, ListWatch};
