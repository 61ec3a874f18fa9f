//! Cluster access for shiftscope
//!
//! This crate provides the read-only port over Kubernetes, OpenShift, OLM
//! and Helm resources, plus the OCM managed-cluster client.

mod access;
mod client;
mod ocm;

#[cfg(any(test, feature = "testing"))]
pub mod fake;

pub use access::{AccessError, AccessResult, ClusterAccess, ManagedClusterApi};
pub use client::KubeClient;
pub use ocm::{DEFAULT_API_BASE, OcmClient, OcmCredentials};

// Re-export types that are used in our public API
pub use shiftscope_types::{
    BuildInfo, ClusterVersionInfo, ContainerInfo, CsvInfo, EventInfo, HelmReleaseInfo,
    ManagedCluster, NamespaceScope, NodeInfo, OwnerRef, PodInfo, PodStatus, ProjectInfo,
    QuotaInfo, ReplicaSetInfo, ResourceDetail, ResourceKind, ResourceRecord, ServiceLogRecord,
    SubscriptionInfo, WorkloadInfo, WorkloadKind,
};
