//! The read-only access port every shiftscope component is handed.

use async_trait::async_trait;
use thiserror::Error;

use shiftscope_types::{
    BuildInfo, ClusterVersionInfo, CsvInfo, EventInfo, HelmReleaseInfo, ManagedCluster,
    NamespaceScope, NodeInfo, PodInfo, ProjectInfo, QuotaInfo, ReplicaSetInfo, ResourceKind,
    ResourceRecord, ServiceLogRecord, SubscriptionInfo, WorkloadInfo,
};

/// Typed failure of a single read against a backend
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AccessError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("access to {0} forbidden")]
    Forbidden(String),

    #[error("{resource} unavailable: {reason}")]
    Unavailable { resource: String, reason: String },
}

impl AccessError {
    pub fn unavailable(resource: impl Into<String>, reason: impl ToString) -> Self {
        Self::Unavailable {
            resource: resource.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Short reason used in warnings, e.g. "ocm: unavailable"
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not found",
            Self::Forbidden(_) => "access denied",
            Self::Unavailable { .. } => "unavailable",
        }
    }
}

pub type AccessResult<T> = Result<T, AccessError>;

/// Read-only accessor over core, OpenShift, OLM and Helm resources.
///
/// Implementations must tolerate many concurrent outstanding calls.
#[async_trait]
pub trait ClusterAccess: Send + Sync {
    async fn list_pods(
        &self,
        scope: &NamespaceScope,
        label_selector: Option<&str>,
    ) -> AccessResult<Vec<PodInfo>>;

    async fn list_nodes(&self) -> AccessResult<Vec<NodeInfo>>;

    async fn get_node(&self, name: &str) -> AccessResult<NodeInfo>;

    async fn list_events(&self, scope: &NamespaceScope) -> AccessResult<Vec<EventInfo>>;

    async fn list_subscriptions(&self, scope: &NamespaceScope)
    -> AccessResult<Vec<SubscriptionInfo>>;

    async fn list_csvs(&self, scope: &NamespaceScope) -> AccessResult<Vec<CsvInfo>>;

    async fn list_helm_releases(&self, scope: &NamespaceScope)
    -> AccessResult<Vec<HelmReleaseInfo>>;

    /// Deployments, StatefulSets and DaemonSets
    async fn list_workloads(&self, scope: &NamespaceScope) -> AccessResult<Vec<WorkloadInfo>>;

    async fn list_replica_sets(&self, scope: &NamespaceScope)
    -> AccessResult<Vec<ReplicaSetInfo>>;

    async fn list_builds(&self, scope: &NamespaceScope) -> AccessResult<Vec<BuildInfo>>;

    async fn build_log(&self, namespace: &str, build: &str) -> AccessResult<String>;

    /// Tail of one container's log, each line prefixed with its RFC 3339 timestamp
    async fn pod_log(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        tail_lines: usize,
    ) -> AccessResult<String>;

    async fn cluster_version(&self) -> AccessResult<ClusterVersionInfo>;

    /// Projects visible to the caller, without quotas
    async fn list_projects(&self) -> AccessResult<Vec<ProjectInfo>>;

    async fn list_resource_quotas(&self, scope: &NamespaceScope) -> AccessResult<Vec<QuotaInfo>>;

    /// Routes, Services, ConfigMaps, Secrets (keys only) or ImageStreams
    async fn list_resources(
        &self,
        kind: ResourceKind,
        scope: &NamespaceScope,
    ) -> AccessResult<Vec<ResourceRecord>>;
}

/// OCM managed-cluster API. Bearer tokens are supplied by the implementation.
#[async_trait]
pub trait ManagedClusterApi: Send + Sync {
    /// Clusters, optionally only those in the given lifecycle state (e.g. "ready")
    async fn list_managed_clusters(&self, state: Option<&str>)
    -> AccessResult<Vec<ManagedCluster>>;

    async fn get_cluster(&self, cluster_id: &str) -> AccessResult<ManagedCluster>;

    async fn service_logs(&self, cluster_id: &str) -> AccessResult<Vec<ServiceLogRecord>>;
}
