//! In-memory cluster and OCM backends for tests.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::access::{AccessError, AccessResult, ClusterAccess, ManagedClusterApi};
use shiftscope_types::{
    BuildInfo, ClusterVersionInfo, ContainerInfo, CsvInfo, EventInfo, HelmReleaseInfo,
    ManagedCluster, NamespaceScope, NodeInfo, PodInfo, PodStatus, ProjectInfo, QuotaInfo,
    ReplicaSetInfo, ResourceKind, ResourceRecord, ServiceLogRecord, SubscriptionInfo,
    WorkloadInfo,
};

/// A running pod with ready containers of the given names
pub fn running_pod(namespace: &str, name: &str, containers: &[&str]) -> PodInfo {
    let mut pod = PodInfo::new(name, namespace);
    pod.status = PodStatus::Running;
    pod.containers = containers
        .iter()
        .map(|c| {
            let mut container = ContainerInfo::new(*c);
            container.ready = true;
            container
        })
        .collect();
    pod
}

/// Scriptable [`ClusterAccess`] backed by plain vectors.
///
/// Failures and delays are keyed by operation name (`"list_pods"`), for
/// log reads by `"pod_log:<ns>/<pod>"` and `"build_log:<ns>/<build>"`, and
/// for resource listings by `"list_resources:<kind>"` (e.g. `list_resources:routes`).
#[derive(Default)]
pub struct FakeCluster {
    pub pods: Vec<PodInfo>,
    pub nodes: Vec<NodeInfo>,
    pub events: Vec<EventInfo>,
    pub subscriptions: Vec<SubscriptionInfo>,
    pub csvs: Vec<CsvInfo>,
    pub helm_releases: Vec<HelmReleaseInfo>,
    pub workloads: Vec<WorkloadInfo>,
    pub replica_sets: Vec<ReplicaSetInfo>,
    pub builds: Vec<BuildInfo>,
    pub pod_logs: HashMap<(String, String, String), String>,
    pub build_logs: HashMap<(String, String), String>,
    pub cluster_version: Option<ClusterVersionInfo>,
    pub projects: Vec<ProjectInfo>,
    pub quotas: Vec<QuotaInfo>,
    pub resources: Vec<ResourceRecord>,
    failures: HashMap<String, AccessError>,
    delays: HashMap<String, Duration>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pod(mut self, pod: PodInfo) -> Self {
        self.pods.push(pod);
        self
    }

    pub fn with_node(mut self, node: NodeInfo) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_event(mut self, event: EventInfo) -> Self {
        self.events.push(event);
        self
    }

    pub fn with_subscription(mut self, sub: SubscriptionInfo) -> Self {
        self.subscriptions.push(sub);
        self
    }

    pub fn with_csv(mut self, csv: CsvInfo) -> Self {
        self.csvs.push(csv);
        self
    }

    pub fn with_helm_release(mut self, release: HelmReleaseInfo) -> Self {
        self.helm_releases.push(release);
        self
    }

    pub fn with_workload(mut self, workload: WorkloadInfo) -> Self {
        self.workloads.push(workload);
        self
    }

    pub fn with_replica_set(mut self, rs: ReplicaSetInfo) -> Self {
        self.replica_sets.push(rs);
        self
    }

    pub fn with_build(mut self, build: BuildInfo, log: &str) -> Self {
        self.build_logs
            .insert((build.namespace.clone(), build.name.clone()), log.to_string());
        self.builds.push(build);
        self
    }

    pub fn with_pod_log(mut self, namespace: &str, pod: &str, container: &str, log: &str) -> Self {
        self.pod_logs.insert(
            (namespace.to_string(), pod.to_string(), container.to_string()),
            log.to_string(),
        );
        self
    }

    pub fn with_cluster_version(mut self, version: ClusterVersionInfo) -> Self {
        self.cluster_version = Some(version);
        self
    }

    pub fn with_project(mut self, project: ProjectInfo) -> Self {
        self.projects.push(project);
        self
    }

    pub fn with_quota(mut self, quota: QuotaInfo) -> Self {
        self.quotas.push(quota);
        self
    }

    pub fn with_resource(mut self, resource: ResourceRecord) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn fail(mut self, operation: &str, error: AccessError) -> Self {
        self.failures.insert(operation.to_string(), error);
        self
    }

    pub fn delay(mut self, operation: &str, delay: Duration) -> Self {
        self.delays.insert(operation.to_string(), delay);
        self
    }

    async fn gate(&self, operation: &str) -> AccessResult<()> {
        if let Some(delay) = self.delays.get(operation) {
            tokio::time::sleep(*delay).await;
        }
        match self.failures.get(operation) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn in_scope<'a, T>(
        items: &'a [T],
        scope: &'a NamespaceScope,
        namespace: impl Fn(&T) -> &str + 'a,
    ) -> impl Iterator<Item = &'a T> + 'a {
        items.iter().filter(move |item| scope.contains(namespace(item)))
    }
}

fn selector_matches(selector: &str, pod: &PodInfo) -> bool {
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((key, value)) => pod.labels.get(key.trim()).map(String::as_str) == Some(value.trim()),
            None => pod.labels.contains_key(term.trim()),
        })
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

#[async_trait]
impl ClusterAccess for FakeCluster {
    async fn list_pods(
        &self,
        scope: &NamespaceScope,
        label_selector: Option<&str>,
    ) -> AccessResult<Vec<PodInfo>> {
        self.gate("list_pods").await?;
        Ok(Self::in_scope(&self.pods, scope, |p| &p.namespace)
            .filter(|p| label_selector.is_none_or(|s| selector_matches(s, p)))
            .cloned()
            .collect())
    }

    async fn list_nodes(&self) -> AccessResult<Vec<NodeInfo>> {
        self.gate("list_nodes").await?;
        Ok(self.nodes.clone())
    }

    async fn get_node(&self, name: &str) -> AccessResult<NodeInfo> {
        self.gate("get_node").await?;
        self.nodes
            .iter()
            .find(|n| n.name == name)
            .cloned()
            .ok_or_else(|| AccessError::NotFound(format!("node {name}")))
    }

    async fn list_events(&self, scope: &NamespaceScope) -> AccessResult<Vec<EventInfo>> {
        self.gate("list_events").await?;
        Ok(Self::in_scope(&self.events, scope, |e| &e.namespace)
            .cloned()
            .collect())
    }

    async fn list_subscriptions(
        &self,
        scope: &NamespaceScope,
    ) -> AccessResult<Vec<SubscriptionInfo>> {
        self.gate("list_subscriptions").await?;
        Ok(Self::in_scope(&self.subscriptions, scope, |s| &s.namespace)
            .cloned()
            .collect())
    }

    async fn list_csvs(&self, scope: &NamespaceScope) -> AccessResult<Vec<CsvInfo>> {
        self.gate("list_csvs").await?;
        Ok(Self::in_scope(&self.csvs, scope, |c| &c.namespace)
            .cloned()
            .collect())
    }

    async fn list_helm_releases(
        &self,
        scope: &NamespaceScope,
    ) -> AccessResult<Vec<HelmReleaseInfo>> {
        self.gate("list_helm_releases").await?;
        Ok(Self::in_scope(&self.helm_releases, scope, |r| &r.namespace)
            .cloned()
            .collect())
    }

    async fn list_workloads(&self, scope: &NamespaceScope) -> AccessResult<Vec<WorkloadInfo>> {
        self.gate("list_workloads").await?;
        Ok(Self::in_scope(&self.workloads, scope, |w| &w.namespace)
            .cloned()
            .collect())
    }

    async fn list_replica_sets(
        &self,
        scope: &NamespaceScope,
    ) -> AccessResult<Vec<ReplicaSetInfo>> {
        self.gate("list_replica_sets").await?;
        Ok(Self::in_scope(&self.replica_sets, scope, |r| &r.namespace)
            .cloned()
            .collect())
    }

    async fn list_builds(&self, scope: &NamespaceScope) -> AccessResult<Vec<BuildInfo>> {
        self.gate("list_builds").await?;
        Ok(Self::in_scope(&self.builds, scope, |b| &b.namespace)
            .cloned()
            .collect())
    }

    async fn build_log(&self, namespace: &str, build: &str) -> AccessResult<String> {
        self.gate("build_log").await?;
        self.gate(&format!("build_log:{namespace}/{build}")).await?;
        self.build_logs
            .get(&(namespace.to_string(), build.to_string()))
            .cloned()
            .ok_or_else(|| AccessError::NotFound(format!("build log {namespace}/{build}")))
    }

    async fn pod_log(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        tail_lines: usize,
    ) -> AccessResult<String> {
        self.gate("pod_log").await?;
        self.gate(&format!("pod_log:{namespace}/{pod}")).await?;
        let key = (namespace.to_string(), pod.to_string(), container.to_string());
        match self.pod_logs.get(&key) {
            Some(log) => Ok(tail(log, tail_lines)),
            None => Ok(String::new()),
        }
    }

    async fn cluster_version(&self) -> AccessResult<ClusterVersionInfo> {
        self.gate("cluster_version").await?;
        self.cluster_version
            .clone()
            .ok_or_else(|| AccessError::NotFound("clusterversion".to_string()))
    }

    async fn list_projects(&self) -> AccessResult<Vec<ProjectInfo>> {
        self.gate("list_projects").await?;
        Ok(self.projects.clone())
    }

    async fn list_resource_quotas(&self, scope: &NamespaceScope) -> AccessResult<Vec<QuotaInfo>> {
        self.gate("list_resource_quotas").await?;
        Ok(Self::in_scope(&self.quotas, scope, |q| &q.namespace)
            .cloned()
            .collect())
    }

    async fn list_resources(
        &self,
        kind: ResourceKind,
        scope: &NamespaceScope,
    ) -> AccessResult<Vec<ResourceRecord>> {
        self.gate(&format!("list_resources:{kind}")).await?;
        Ok(Self::in_scope(&self.resources, scope, |r| &r.namespace)
            .filter(|r| r.kind() == kind)
            .cloned()
            .collect())
    }
}

/// Scriptable [`ManagedClusterApi`]
#[derive(Default)]
pub struct FakeOcm {
    pub clusters: Vec<ManagedCluster>,
    pub logs: HashMap<String, Vec<ServiceLogRecord>>,
    failure: Option<AccessError>,
    delay: Option<Duration>,
}

impl FakeOcm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cluster(mut self, cluster: ManagedCluster) -> Self {
        self.clusters.push(cluster);
        self
    }

    pub fn with_log(mut self, record: ServiceLogRecord) -> Self {
        self.logs
            .entry(record.cluster_id.clone())
            .or_default()
            .push(record);
        self
    }

    pub fn failing(mut self, error: AccessError) -> Self {
        self.failure = Some(error);
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    async fn gate(&self) -> AccessResult<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ManagedClusterApi for FakeOcm {
    async fn list_managed_clusters(
        &self,
        state: Option<&str>,
    ) -> AccessResult<Vec<ManagedCluster>> {
        self.gate().await?;
        Ok(self
            .clusters
            .iter()
            .filter(|c| {
                state.is_none_or(|state| {
                    c.state
                        .as_deref()
                        .is_some_and(|s| s.eq_ignore_ascii_case(state))
                })
            })
            .cloned()
            .collect())
    }

    async fn get_cluster(&self, cluster_id: &str) -> AccessResult<ManagedCluster> {
        self.gate().await?;
        self.clusters
            .iter()
            .find(|c| c.id == cluster_id)
            .cloned()
            .ok_or_else(|| AccessError::NotFound(format!("ocm cluster {cluster_id}")))
    }

    async fn service_logs(&self, cluster_id: &str) -> AccessResult<Vec<ServiceLogRecord>> {
        self.gate().await?;
        Ok(self.logs.get(cluster_id).cloned().unwrap_or_default())
    }
}
