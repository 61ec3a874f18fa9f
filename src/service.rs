//! One method per public operation, each returning a serializable record.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use shiftscope_inventory::{
    HardwareTagger, OperatorClassifier, OwnershipResolver, find_by_name, find_or_adhoc,
    is_nvidia_operator,
};
use shiftscope_k8s::{AccessError, ClusterAccess, ManagedClusterApi};
use shiftscope_logs::{EngineConfig, LogSearchEngine, LogTarget, QueryMode, SearchRequest};
use shiftscope_types::{
    DeviceFamily, LogLevel, ManagedCluster, ManagedPod, NamespaceScope, NodeHardwareProfile,
    Operator, ProjectInfo, QueryError, ResourceKind, ResourceRecord, ResourceTypeScope,
    SearchResult, SourceKind, WorkloadHardwareUsage,
};

/// Namespaces the GPU operator and OpenShift AI run in
pub const GPU_NAMESPACES: &[&str] = &["nvidia-gpu-operator", "opendatahub"];

/// Namespaces the network operator and SR-IOV operator run in
pub const DPU_NAMESPACES: &[&str] = &["nvidia-network-operator", "openshift-sriov-network-operator"];

/// Query terms that widen a GPU log search to the whole cluster
pub const GPU_QUERY_KEYWORDS: &[&str] = &["gpu", "nvidia", "cuda", "dcgm", "mig"];

/// Query terms that widen a DPU log search to the whole cluster
pub const DPU_QUERY_KEYWORDS: &[&str] = &[
    "bluefield", "dpu", "mellanox", "connectx", "ofed", "rdma", "sriov",
];

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error("{0} not found")]
    NotFound(String),

    #[error("OCM is not configured; set OCM_TOKEN or OCM_OFFLINE_TOKEN")]
    OcmNotConfigured,
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Classified operators plus the accounting for degraded candidate streams
#[derive(Debug, Serialize)]
pub struct OperatorReport {
    pub operators: Vec<Operator>,
    pub failed_streams: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct OperatorPods {
    pub operator: Operator,
    pub pods: Vec<ManagedPod>,
}

#[derive(Debug, Serialize)]
pub struct PodClaims {
    pub pods: Vec<ManagedPod>,
    /// Pods several operators matched, and which one won
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ClusterInfo {
    pub openshift_available: bool,
    pub ocm_available: bool,
    pub openshift_version: Option<String>,
    pub cluster_id: Option<String>,
    pub update_channel: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Projects with their quotas attached
#[derive(Debug, Serialize)]
pub struct ProjectReport {
    pub projects: Vec<ProjectInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Caller options shared by the log search operations
#[derive(Clone, Debug, Default)]
pub struct SearchOptions {
    pub regex: bool,
    pub min_level: Option<LogLevel>,
    pub max_lines: Option<usize>,
}

impl SearchOptions {
    fn mode(&self) -> QueryMode {
        if self.regex {
            QueryMode::Regex
        } else {
            QueryMode::Substring
        }
    }
}

/// Query surface over a cluster and, optionally, OCM
#[derive(Clone)]
pub struct Shiftscope {
    cluster: Arc<dyn ClusterAccess>,
    ocm: Option<Arc<dyn ManagedClusterApi>>,
    classifier: OperatorClassifier,
    resolver: OwnershipResolver,
    tagger: HardwareTagger,
    engine: LogSearchEngine,
    default_max_lines: usize,
}

impl Shiftscope {
    pub fn new(
        cluster: Arc<dyn ClusterAccess>,
        ocm: Option<Arc<dyn ManagedClusterApi>>,
        engine_config: EngineConfig,
    ) -> Self {
        Self {
            classifier: OperatorClassifier::new(Arc::clone(&cluster)),
            resolver: OwnershipResolver::new(Arc::clone(&cluster)),
            tagger: HardwareTagger::new(Arc::clone(&cluster)),
            engine: LogSearchEngine::new(Arc::clone(&cluster), ocm.clone(), engine_config),
            cluster,
            ocm,
            default_max_lines: shiftscope_logs::DEFAULT_MAX_LINES,
        }
    }

    pub fn with_default_max_lines(mut self, max_lines: usize) -> Self {
        self.default_max_lines = max_lines;
        self
    }

    /// OCM clusters searched when a query names none
    pub fn with_ocm_clusters(mut self, cluster_ids: Vec<String>) -> Self {
        self.engine = self.engine.with_ocm_clusters(cluster_ids);
        self
    }

    fn max_lines(&self, options: &SearchOptions) -> usize {
        options.max_lines.unwrap_or(self.default_max_lines)
    }

    // ------------------------------------------------------------------------
    // Operators
    // ------------------------------------------------------------------------

    pub async fn get_all_operators(&self, namespace: &str) -> ServiceResult<OperatorReport> {
        let scope: NamespaceScope = namespace.parse()?;
        let classification = self.classifier.classify(&scope).await;
        Ok(OperatorReport {
            operators: classification.operators,
            failed_streams: classification.failed_streams,
            warnings: classification.warnings,
            notes: classification.notes,
        })
    }

    /// Operators belonging to the NVIDIA accelerator stack
    pub async fn get_nvidia_operators(&self, namespace: &str) -> ServiceResult<OperatorReport> {
        let mut report = self.get_all_operators(namespace).await?;
        report.operators.retain(is_nvidia_operator);
        Ok(report)
    }

    /// Pods of one operator. Within a namespace an unclassified name still
    /// resolves by name prefix; across the cluster it must classify.
    pub async fn get_operator_pods(
        &self,
        name: &str,
        namespace: &str,
    ) -> ServiceResult<OperatorPods> {
        let scope: NamespaceScope = namespace.parse()?;
        let classification = self.classifier.classify(&scope).await;
        let operator = match scope.as_namespace() {
            Some(ns) => find_or_adhoc(&classification.operators, name, ns),
            None => find_by_name(&classification.operators, name)
                .cloned()
                .ok_or_else(|| ServiceError::NotFound(format!("operator '{name}'")))?,
        };
        let pods = self.resolver.resolve_pods(&operator).await?;
        Ok(OperatorPods { operator, pods })
    }

    /// Every pod in scope, each assigned to at most one classified operator
    pub async fn claim_pods(&self, namespace: &str) -> ServiceResult<PodClaims> {
        let scope: NamespaceScope = namespace.parse()?;
        let classification = self.classifier.classify(&scope).await;
        let claimed = self
            .resolver
            .claim_pods(&classification.operators, &scope)
            .await?;
        Ok(PodClaims {
            pods: claimed.pods,
            notes: claimed.notes,
        })
    }

    // ------------------------------------------------------------------------
    // Hardware
    // ------------------------------------------------------------------------

    pub async fn get_nodes(&self) -> ServiceResult<Vec<NodeHardwareProfile>> {
        Ok(self.tagger.tag_nodes().await?)
    }

    pub async fn get_node(&self, name: &str) -> ServiceResult<NodeHardwareProfile> {
        Ok(self.tagger.tag_node(name).await?)
    }

    pub async fn get_gpu_nodes(&self) -> ServiceResult<Vec<NodeHardwareProfile>> {
        Ok(self.tagger.nodes_with(DeviceFamily::Gpu).await?)
    }

    pub async fn get_dpu_nodes(&self) -> ServiceResult<Vec<NodeHardwareProfile>> {
        Ok(self.tagger.nodes_with(DeviceFamily::Dpu).await?)
    }

    pub async fn get_workloads(&self, namespace: &str) -> ServiceResult<Vec<WorkloadHardwareUsage>> {
        let scope: NamespaceScope = namespace.parse()?;
        Ok(self.tagger.tag_workloads(&scope).await?)
    }

    pub async fn get_gpu_workloads(
        &self,
        namespace: &str,
    ) -> ServiceResult<Vec<WorkloadHardwareUsage>> {
        let scope: NamespaceScope = namespace.parse()?;
        Ok(self.tagger.workloads_with(DeviceFamily::Gpu, &scope).await?)
    }

    pub async fn get_dpu_workloads(
        &self,
        namespace: &str,
    ) -> ServiceResult<Vec<WorkloadHardwareUsage>> {
        let scope: NamespaceScope = namespace.parse()?;
        Ok(self.tagger.workloads_with(DeviceFamily::Dpu, &scope).await?)
    }

    // ------------------------------------------------------------------------
    // Logs
    // ------------------------------------------------------------------------

    /// Search every selected adapter across one or more namespaces
    pub async fn search_all_logs(
        &self,
        query: &str,
        namespaces: &[String],
        resource_types: &str,
        options: &SearchOptions,
        cancel: &CancellationToken,
    ) -> ServiceResult<SearchResult> {
        let scopes = parse_namespaces(namespaces)?;
        let request = SearchRequest::new(
            query,
            NamespaceScope::All,
            resource_types.parse()?,
            self.max_lines(options),
        )
        .with_namespaces(scopes)
        .with_mode(options.mode())
        .with_min_level(options.min_level);
        Ok(self.engine.search_cancellable(&request, cancel).await?)
    }

    /// Logs of a single operator, pod or build
    pub async fn get_comprehensive_logs(
        &self,
        resource_type: &str,
        name: &str,
        namespace: &str,
        log_types: &str,
        max_lines: Option<usize>,
        cancel: &CancellationToken,
    ) -> ServiceResult<SearchResult> {
        let target = LogTarget::parse(resource_type, name)?;
        let scope: NamespaceScope = namespace.parse()?;
        let kinds: ResourceTypeScope = log_types.parse()?;
        let max_lines = max_lines.unwrap_or(self.default_max_lines);
        Ok(self
            .engine
            .comprehensive_logs(&target, &scope, &kinds, max_lines, cancel)
            .await?)
    }

    /// Search the GPU operator and OpenShift AI namespaces, or the whole
    /// cluster when the query names a GPU term
    pub async fn search_gpu_logs(
        &self,
        query: &str,
        resource_types: &str,
        options: &SearchOptions,
        cancel: &CancellationToken,
    ) -> ServiceResult<SearchResult> {
        let scopes = family_scopes(query, GPU_NAMESPACES, GPU_QUERY_KEYWORDS);
        self.search_scopes(query, scopes, resource_types, options, cancel)
            .await
    }

    /// Search the network operator and SR-IOV namespaces, or the whole
    /// cluster when the query names a DPU term
    pub async fn search_dpu_logs(
        &self,
        query: &str,
        resource_types: &str,
        options: &SearchOptions,
        cancel: &CancellationToken,
    ) -> ServiceResult<SearchResult> {
        let scopes = family_scopes(query, DPU_NAMESPACES, DPU_QUERY_KEYWORDS);
        self.search_scopes(query, scopes, resource_types, options, cancel)
            .await
    }

    async fn search_scopes(
        &self,
        query: &str,
        scopes: Vec<NamespaceScope>,
        resource_types: &str,
        options: &SearchOptions,
        cancel: &CancellationToken,
    ) -> ServiceResult<SearchResult> {
        debug!(query, scopes = ?scopes, "Family log search");
        let request = SearchRequest::new(
            query,
            NamespaceScope::All,
            resource_types.parse()?,
            self.max_lines(options),
        )
        .with_namespaces(scopes)
        .with_mode(options.mode())
        .with_min_level(options.min_level);
        Ok(self.engine.search_cancellable(&request, cancel).await?)
    }

    // ------------------------------------------------------------------------
    // Projects and namespace resources
    // ------------------------------------------------------------------------

    /// Every project with display name, description, phase and quota usage.
    /// Unreadable quotas leave the projects without them and add a warning.
    pub async fn get_projects(&self) -> ServiceResult<ProjectReport> {
        let (projects, quotas) = tokio::join!(
            self.cluster.list_projects(),
            self.cluster.list_resource_quotas(&NamespaceScope::All),
        );
        let mut projects = projects?;
        let mut warnings = Vec::new();

        let mut quotas = match quotas {
            Ok(quotas) => quotas,
            Err(e) => {
                warn!(error = %e, "Resource quotas unavailable");
                warnings.push(format!("resourcequotas: {}", e.reason()));
                Vec::new()
            }
        };
        quotas.sort_by(|a, b| a.name.cmp(&b.name));
        for quota in quotas {
            if let Some(project) = projects.iter_mut().find(|p| p.name == quota.namespace) {
                project.quotas.push(quota);
            }
        }

        projects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(ProjectReport { projects, warnings })
    }

    /// Routes, services, configmaps, secrets (keys only) or imagestreams,
    /// sorted by `(namespace, name)`. An API group the cluster does not
    /// serve yields an empty list.
    pub async fn get_openshift_resources(
        &self,
        resource_type: &str,
        namespace: &str,
    ) -> ServiceResult<Vec<ResourceRecord>> {
        let kind: ResourceKind = resource_type.parse()?;
        let scope: NamespaceScope = namespace.parse()?;

        let mut records = match self.cluster.list_resources(kind, &scope).await {
            Ok(records) => records,
            Err(e) if e.is_not_found() => {
                debug!(kind = %kind, "Resource type not served by this cluster");
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };
        records.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));
        Ok(records)
    }

    // ------------------------------------------------------------------------
    // OCM
    // ------------------------------------------------------------------------

    /// Managed clusters sorted by name, optionally only those in `state`
    pub async fn ocm_clusters(&self, state: Option<&str>) -> ServiceResult<Vec<ManagedCluster>> {
        let ocm = self.ocm.as_ref().ok_or(ServiceError::OcmNotConfigured)?;
        let state = state.map(str::trim).filter(|s| !s.is_empty());
        let mut clusters = ocm.list_managed_clusters(state).await?;
        clusters.sort_by(|a, b| (&a.name, &a.id).cmp(&(&b.name, &b.id)));
        Ok(clusters)
    }

    pub async fn ocm_cluster(&self, cluster_id: &str) -> ServiceResult<ManagedCluster> {
        let ocm = self.ocm.as_ref().ok_or(ServiceError::OcmNotConfigured)?;
        let cluster_id = cluster_id.trim();
        if cluster_id.is_empty() {
            return Err(QueryError::InvalidScope("empty cluster id".to_string()).into());
        }
        match ocm.get_cluster(cluster_id).await {
            Err(e) if e.is_not_found() => {
                Err(ServiceError::NotFound(format!("OCM cluster {cluster_id}")))
            }
            other => Ok(other?),
        }
    }

    /// Service logs of one managed cluster, through the search pipeline
    pub async fn ocm_cluster_logs(
        &self,
        cluster_id: &str,
        query: &str,
        options: &SearchOptions,
        cancel: &CancellationToken,
    ) -> ServiceResult<SearchResult> {
        if self.ocm.is_none() {
            return Err(ServiceError::OcmNotConfigured);
        }
        let cluster_id = cluster_id.trim();
        if cluster_id.is_empty() {
            return Err(QueryError::InvalidScope("empty cluster id".to_string()).into());
        }
        let request = SearchRequest::new(
            query,
            NamespaceScope::All,
            ResourceTypeScope::only([SourceKind::Ocm]),
            self.max_lines(options),
        )
        .with_mode(options.mode())
        .with_min_level(options.min_level)
        .with_ocm_clusters(vec![cluster_id.to_string()]);
        Ok(self.engine.search_cancellable(&request, cancel).await?)
    }

    // ------------------------------------------------------------------------
    // Cluster
    // ------------------------------------------------------------------------

    /// OpenShift version details and which backends answer
    pub async fn cluster_info(&self) -> ClusterInfo {
        let mut info = ClusterInfo {
            openshift_available: false,
            ocm_available: self.ocm.is_some(),
            openshift_version: None,
            cluster_id: None,
            update_channel: None,
            warnings: Vec::new(),
        };
        match self.cluster.cluster_version().await {
            Ok(version) => {
                info.openshift_available = true;
                info.openshift_version = version.version;
                info.cluster_id = version.cluster_id;
                info.update_channel = version.channel;
            }
            Err(e) => {
                warn!(error = %e, "Cluster version unavailable");
                info.warnings.push(format!("clusterversion: {}", e.reason()));
            }
        }
        info
    }

    pub(crate) fn classifier(&self) -> &OperatorClassifier {
        &self.classifier
    }

    pub(crate) fn resolver(&self) -> &OwnershipResolver {
        &self.resolver
    }

    pub(crate) fn tagger(&self) -> &HardwareTagger {
        &self.tagger
    }
}

fn parse_namespaces(namespaces: &[String]) -> Result<Vec<NamespaceScope>, QueryError> {
    if namespaces.is_empty() {
        return Ok(vec![NamespaceScope::All]);
    }
    namespaces.iter().map(|ns| ns.parse()).collect()
}

fn family_scopes(query: &str, namespaces: &[&str], keywords: &[&str]) -> Vec<NamespaceScope> {
    let lowered = query.to_lowercase();
    if keywords.iter().any(|k| lowered.contains(k)) {
        return vec![NamespaceScope::All];
    }
    namespaces
        .iter()
        .map(|ns| NamespaceScope::namespace(*ns))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use shiftscope_k8s::fake::{FakeCluster, FakeOcm, running_pod};
    use shiftscope_types::{
        ClusterVersionInfo, CsvInfo, NodeInfo, OwnerRef, QuotaInfo, ResourceDetail,
        ServiceLogRecord, SubscriptionInfo, WorkloadInfo, WorkloadKind,
    };

    fn service(cluster: FakeCluster) -> Shiftscope {
        Shiftscope::new(Arc::new(cluster), None, EngineConfig::default())
    }

    fn gpu_operator_cluster() -> FakeCluster {
        let mut deployment = WorkloadInfo::new(
            WorkloadKind::Deployment,
            "gpu-operator",
            "nvidia-gpu-operator",
        );
        deployment.owners = vec![OwnerRef::new(
            "ClusterServiceVersion",
            "gpu-operator-certified.v24.3.0",
        )];

        let mut pod = running_pod("nvidia-gpu-operator", "gpu-operator-7d9c4-abcde", &["manager"]);
        pod.owners = vec![OwnerRef::new("ReplicaSet", "gpu-operator-7d9c4")];

        FakeCluster::new()
            .with_subscription(SubscriptionInfo {
                name: "gpu-operator-certified".to_string(),
                namespace: "nvidia-gpu-operator".to_string(),
                package: Some("gpu-operator-certified".to_string()),
                installed_csv: Some("gpu-operator-certified.v24.3.0".to_string()),
                ..Default::default()
            })
            .with_csv(CsvInfo {
                name: "gpu-operator-certified.v24.3.0".to_string(),
                namespace: "nvidia-gpu-operator".to_string(),
                display_name: Some("NVIDIA GPU Operator".to_string()),
                version: Some("24.3.0".to_string()),
                phase: Some("Succeeded".to_string()),
            })
            .with_workload(deployment)
            .with_pod(pod)
            .with_pod(running_pod("default", "web-0", &["app"]))
    }

    #[tokio::test]
    async fn test_nvidia_operators_filtered() {
        let cluster = gpu_operator_cluster().with_workload(WorkloadInfo::new(
            WorkloadKind::Deployment,
            "cert-manager-operator",
            "cert-manager",
        ));
        let report = service(cluster).get_nvidia_operators("all").await.unwrap();

        assert_eq!(report.operators.len(), 1);
        assert_eq!(report.operators[0].name, "gpu-operator-certified");
        assert_eq!(report.failed_streams, 0);
    }

    #[tokio::test]
    async fn test_operator_pods_by_substring() {
        let pods = service(gpu_operator_cluster())
            .get_operator_pods("gpu-operator", "nvidia-gpu-operator")
            .await
            .unwrap();

        assert_eq!(pods.operator.name, "gpu-operator-certified");
        assert_eq!(pods.pods.len(), 1);
        assert_eq!(pods.pods[0].name, "gpu-operator-7d9c4-abcde");
    }

    #[tokio::test]
    async fn test_unknown_operator_across_cluster_is_not_found() {
        let err = service(gpu_operator_cluster())
            .get_operator_pods("does-not-exist", "all")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_invalid_namespace_rejected() {
        let err = service(FakeCluster::new())
            .get_all_operators("Not_A_Namespace")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Query(QueryError::InvalidScope(_))));
    }

    #[tokio::test]
    async fn test_hardware_views() {
        let mut gpu = NodeInfo::new("worker-gpu");
        gpu.capacity.insert("nvidia.com/gpu".to_string(), "4".to_string());
        let mut dpu = NodeInfo::new("worker-dpu");
        dpu.capacity
            .insert("nvidia.com/bluefield".to_string(), "1".to_string());

        let svc = service(FakeCluster::new().with_node(gpu).with_node(dpu));
        let gpu_nodes = svc.get_gpu_nodes().await.unwrap();
        let dpu_nodes = svc.get_dpu_nodes().await.unwrap();

        assert_eq!(gpu_nodes.len(), 1);
        assert_eq!(gpu_nodes[0].node_name, "worker-gpu");
        assert_eq!(dpu_nodes.len(), 1);
        assert_eq!(dpu_nodes[0].node_name, "worker-dpu");
        assert_eq!(svc.get_nodes().await.unwrap().len(), 2);
    }

    #[test]
    fn test_family_scopes_widen_on_keyword() {
        assert_eq!(
            family_scopes("Xid error", GPU_NAMESPACES, GPU_QUERY_KEYWORDS),
            vec![
                NamespaceScope::namespace("nvidia-gpu-operator"),
                NamespaceScope::namespace("opendatahub"),
            ]
        );
        assert_eq!(
            family_scopes("CUDA init failed", GPU_NAMESPACES, GPU_QUERY_KEYWORDS),
            vec![NamespaceScope::All]
        );
        assert_eq!(
            family_scopes("rdma link down", DPU_NAMESPACES, DPU_QUERY_KEYWORDS),
            vec![NamespaceScope::All]
        );
    }

    #[tokio::test]
    async fn test_gpu_log_search_stays_in_gpu_namespaces() {
        let cluster = FakeCluster::new()
            .with_pod(running_pod("nvidia-gpu-operator", "driver-0", &["driver"]))
            .with_pod(running_pod("default", "app-0", &["app"]))
            .with_pod_log(
                "nvidia-gpu-operator",
                "driver-0",
                "driver",
                "2024-01-15T10:30:00Z driver failed to load\n",
            )
            .with_pod_log(
                "default",
                "app-0",
                "app",
                "2024-01-15T10:30:01Z request failed\n",
            );

        let result = service(cluster)
            .search_gpu_logs(
                "failed",
                "pod",
                &SearchOptions::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].source_id, "nvidia-gpu-operator/driver-0/driver");
    }

    #[tokio::test]
    async fn test_ocm_operations_require_configuration() {
        let svc = service(FakeCluster::new());
        assert!(matches!(
            svc.ocm_clusters(None).await,
            Err(ServiceError::OcmNotConfigured)
        ));
        assert!(matches!(
            svc.ocm_cluster("abc").await,
            Err(ServiceError::OcmNotConfigured)
        ));
        assert!(matches!(
            svc.ocm_cluster_logs("abc", "", &SearchOptions::default(), &CancellationToken::new())
                .await,
            Err(ServiceError::OcmNotConfigured)
        ));
    }

    #[tokio::test]
    async fn test_ocm_cluster_logs() {
        let ocm = FakeOcm::new()
            .with_cluster(ManagedCluster {
                id: "abc".to_string(),
                name: "prod".to_string(),
                ..Default::default()
            })
            .with_log(ServiceLogRecord {
                id: "1".to_string(),
                cluster_id: "abc".to_string(),
                summary: Some("Cluster upgrade completed".to_string()),
                severity: Some("Info".to_string()),
                timestamp: Some(Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()),
                ..Default::default()
            });
        let svc = Shiftscope::new(
            Arc::new(FakeCluster::new()),
            Some(Arc::new(ocm)),
            EngineConfig::default(),
        );

        assert_eq!(svc.ocm_clusters(None).await.unwrap()[0].name, "prod");
        let logs = svc
            .ocm_cluster_logs("abc", "upgrade", &SearchOptions::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(logs.entries.len(), 1);
        assert!(logs.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_ocm_state_filter_and_lookup() {
        let cluster = |id: &str, name: &str, state: &str| ManagedCluster {
            id: id.to_string(),
            name: name.to_string(),
            state: Some(state.to_string()),
            ..Default::default()
        };
        let ocm = FakeOcm::new()
            .with_cluster(cluster("c2", "staging", "installing"))
            .with_cluster(cluster("c1", "prod", "ready"))
            .with_cluster(cluster("c3", "dev", "ready"));
        let svc = Shiftscope::new(
            Arc::new(FakeCluster::new()),
            Some(Arc::new(ocm)),
            EngineConfig::default(),
        );

        let ready: Vec<_> = svc
            .ocm_clusters(Some("Ready"))
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(ready, vec!["dev", "prod"]);
        assert_eq!(svc.ocm_clusters(Some(" ")).await.unwrap().len(), 3);

        assert_eq!(svc.ocm_cluster("c2").await.unwrap().name, "staging");
        assert!(matches!(
            svc.ocm_cluster("nope").await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            svc.ocm_cluster("  ").await,
            Err(ServiceError::Query(QueryError::InvalidScope(_)))
        ));
    }

    #[tokio::test]
    async fn test_projects_with_quotas() {
        let project = |name: &str| ProjectInfo {
            name: name.to_string(),
            phase: Some("Active".to_string()),
            ..Default::default()
        };
        let mut hard = std::collections::BTreeMap::new();
        hard.insert("requests.nvidia.com/gpu".to_string(), "4".to_string());
        let mut used = std::collections::BTreeMap::new();
        used.insert("requests.nvidia.com/gpu".to_string(), "1".to_string());

        let cluster = FakeCluster::new()
            .with_project(project("ml"))
            .with_project(project("default"))
            .with_quota(QuotaInfo {
                name: "gpu-quota".to_string(),
                namespace: "ml".to_string(),
                hard,
                used,
            });

        let report = service(cluster).get_projects().await.unwrap();
        let names: Vec<_> = report.projects.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["default", "ml"]);
        assert!(report.projects[0].quotas.is_empty());
        assert_eq!(
            report.projects[1].quotas[0].used.get("requests.nvidia.com/gpu").map(String::as_str),
            Some("1")
        );
        assert!(report.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_projects_without_quota_access() {
        let cluster = FakeCluster::new()
            .with_project(ProjectInfo {
                name: "ml".to_string(),
                ..Default::default()
            })
            .fail(
                "list_resource_quotas",
                AccessError::Forbidden("resourcequotas".to_string()),
            );
        let report = service(cluster).get_projects().await.unwrap();
        assert_eq!(report.projects.len(), 1);
        assert_eq!(report.warnings, vec!["resourcequotas: access denied"]);

        let denied = FakeCluster::new()
            .fail("list_projects", AccessError::Forbidden("projects".to_string()));
        assert!(matches!(
            service(denied).get_projects().await,
            Err(ServiceError::Access(AccessError::Forbidden(_)))
        ));
    }

    #[tokio::test]
    async fn test_openshift_resources() {
        let config_map = |ns: &str, name: &str| {
            ResourceRecord::new(
                name,
                ns,
                ResourceDetail::ConfigMap {
                    data_keys: vec!["config.yaml".to_string()],
                },
            )
        };
        let cluster = FakeCluster::new()
            .with_resource(config_map("ml", "trainer-config"))
            .with_resource(config_map("default", "kube-root-ca.crt"))
            .with_resource(config_map("ml", "app-config"))
            .with_resource(ResourceRecord::new(
                "token",
                "ml",
                ResourceDetail::Secret {
                    secret_type: Some("Opaque".to_string()),
                    data_keys: vec!["token".to_string()],
                },
            ))
            .fail(
                "list_resources:imagestreams",
                AccessError::NotFound("imagestreams".to_string()),
            );
        let svc = service(cluster);

        let names: Vec<_> = svc
            .get_openshift_resources("configmaps", "ml")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["app-config", "trainer-config"]);
        assert_eq!(svc.get_openshift_resources("secret", "all").await.unwrap().len(), 1);
        assert!(svc.get_openshift_resources("imagestreams", "all").await.unwrap().is_empty());
        assert!(matches!(
            svc.get_openshift_resources("deployments", "ml").await,
            Err(ServiceError::Query(QueryError::InvalidScope(_)))
        ));
    }

    #[tokio::test]
    async fn test_cluster_info() {
        let cluster = FakeCluster::new().with_cluster_version(ClusterVersionInfo {
            version: Some("4.15.3".to_string()),
            cluster_id: Some("c0ffee".to_string()),
            channel: Some("stable-4.15".to_string()),
        });
        let info = service(cluster).cluster_info().await;
        assert!(info.openshift_available);
        assert!(!info.ocm_available);
        assert_eq!(info.openshift_version.as_deref(), Some("4.15.3"));
    }

    #[tokio::test]
    async fn test_cluster_info_degrades() {
        let cluster = FakeCluster::new().fail(
            "cluster_version",
            AccessError::NotFound("clusterversion".to_string()),
        );
        let info = service(cluster).cluster_info().await;
        assert!(!info.openshift_available);
        assert_eq!(info.warnings, vec!["clusterversion: not found"]);
    }
}
