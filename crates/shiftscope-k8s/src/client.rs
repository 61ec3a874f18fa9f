//! Kubernetes client for shiftscope

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join3;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::core::v1::{
    ConfigMap, Container, Event, Node, Pod, PodSpec, ResourceQuota, Secret, Service,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::{Api, DynamicObject, ListParams, LogParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::discovery::ApiResource;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::access::{AccessError, AccessResult, ClusterAccess};
use shiftscope_types::{
    BuildInfo, ClusterVersionInfo, ContainerInfo, CsvInfo, EventInfo, HelmReleaseInfo,
    ImageStreamInfo, NamespaceScope, NodeInfo, OwnerRef, PodInfo, PodStatus, ProjectInfo,
    QuotaInfo, ReplicaSetInfo, ResourceDetail, ResourceKind, ResourceRecord, RouteInfo,
    ServiceInfo, ServicePortInfo, SubscriptionInfo, WorkloadInfo, WorkloadKind,
};

/// Label Helm v3 puts on its release storage objects
const HELM_OWNER_SELECTOR: &str = "owner=helm";

/// Label OLM sets on CSVs it copies into every watched namespace
const OLM_COPIED_FROM: &str = "olm.copiedFrom";

const DISPLAY_NAME_ANNOTATION: &str = "openshift.io/display-name";
const DESCRIPTION_ANNOTATION: &str = "openshift.io/description";

fn api_resource(group: &str, version: &str, kind: &str, plural: &str) -> ApiResource {
    ApiResource {
        group: group.to_string(),
        version: version.to_string(),
        api_version: format!("{group}/{version}"),
        kind: kind.to_string(),
        plural: plural.to_string(),
    }
}

fn subscription_api() -> ApiResource {
    api_resource("operators.coreos.com", "v1alpha1", "Subscription", "subscriptions")
}

fn csv_api() -> ApiResource {
    api_resource(
        "operators.coreos.com",
        "v1alpha1",
        "ClusterServiceVersion",
        "clusterserviceversions",
    )
}

fn build_api() -> ApiResource {
    api_resource("build.openshift.io", "v1", "Build", "builds")
}

fn cluster_version_api() -> ApiResource {
    api_resource("config.openshift.io", "v1", "ClusterVersion", "clusterversions")
}

fn project_api() -> ApiResource {
    api_resource("project.openshift.io", "v1", "Project", "projects")
}

fn route_api() -> ApiResource {
    api_resource("route.openshift.io", "v1", "Route", "routes")
}

fn image_stream_api() -> ApiResource {
    api_resource("image.openshift.io", "v1", "ImageStream", "imagestreams")
}

/// Kubernetes client wrapper implementing [`ClusterAccess`]
#[derive(Clone)]
pub struct KubeClient {
    client: kube::Client,
}

impl KubeClient {
    /// Connect using a kubeconfig (explicit path, or the default lookup),
    /// falling back to the in-cluster service account when none is found
    pub async fn connect(kubeconfig_path: Option<&Path>, context: Option<&str>) -> Result<Self> {
        let kubeconfig = match kubeconfig_path {
            Some(path) => Some(
                Kubeconfig::read_from(path)
                    .with_context(|| format!("Failed to read kubeconfig at {}", path.display()))?,
            ),
            None => Kubeconfig::read().ok(),
        };

        let config = match kubeconfig {
            Some(kubeconfig) => kube::Config::from_custom_kubeconfig(
                kubeconfig,
                &KubeConfigOptions {
                    context: context.map(str::to_string),
                    ..Default::default()
                },
            )
            .await
            .context(format!(
                "Failed to create config for context: {}",
                context.unwrap_or("<current>")
            ))?,
            None => kube::Config::incluster()
                .context("No kubeconfig found and not running inside a cluster")?,
        };

        let client = kube::Client::try_from(config).context("Failed to create cluster client")?;

        Ok(Self { client })
    }

    /// Wrap an already configured client
    pub fn from_client(client: kube::Client) -> Self {
        Self { client }
    }

    fn scoped<K>(&self, scope: &NamespaceScope) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        match scope {
            NamespaceScope::All => Api::all(self.client.clone()),
            NamespaceScope::Namespace(ns) => Api::namespaced(self.client.clone(), ns),
        }
    }

    fn scoped_dynamic(&self, scope: &NamespaceScope, resource: &ApiResource) -> Api<DynamicObject> {
        match scope {
            NamespaceScope::All => Api::all_with(self.client.clone(), resource),
            NamespaceScope::Namespace(ns) => {
                Api::namespaced_with(self.client.clone(), ns, resource)
            }
        }
    }

    async fn list<K>(api: &Api<K>, params: &ListParams, what: &str) -> AccessResult<Vec<K>>
    where
        K: Clone + DeserializeOwned + Debug,
    {
        debug!(resource = what, "list");
        api.list(params)
            .await
            .map(|list| list.items)
            .map_err(|e| map_error(what, e))
    }

    async fn list_helm_storage(&self, scope: &NamespaceScope) -> AccessResult<Vec<ObjectMeta>> {
        let params = ListParams::default().labels(HELM_OWNER_SELECTOR);
        let secrets: Api<Secret> = self.scoped(scope);
        let config_maps: Api<ConfigMap> = self.scoped(scope);

        let (secrets, config_maps) = futures::join!(
            Self::list(&secrets, &params, "secrets"),
            Self::list(&config_maps, &params, "configmaps"),
        );

        // Helm keeps releases in one storage driver; either listing may be
        // denied without the other being so.
        match (secrets, config_maps) {
            (Err(e), Err(_)) => Err(e),
            (secrets, config_maps) => {
                let mut metas: Vec<ObjectMeta> = Vec::new();
                match secrets {
                    Ok(items) => metas.extend(items.into_iter().map(|s| s.metadata)),
                    Err(e) => warn!(error = %e, "Helm secret storage not readable"),
                }
                match config_maps {
                    Ok(items) => metas.extend(items.into_iter().map(|c| c.metadata)),
                    Err(e) => warn!(error = %e, "Helm configmap storage not readable"),
                }
                Ok(metas)
            }
        }
    }
}

#[async_trait]
impl ClusterAccess for KubeClient {
    async fn list_pods(
        &self,
        scope: &NamespaceScope,
        label_selector: Option<&str>,
    ) -> AccessResult<Vec<PodInfo>> {
        let pods: Api<Pod> = self.scoped(scope);
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }
        let items = Self::list(&pods, &params, "pods").await?;
        Ok(items.into_iter().map(pod_to_info).collect())
    }

    async fn list_nodes(&self) -> AccessResult<Vec<NodeInfo>> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let items = Self::list(&nodes, &ListParams::default(), "nodes").await?;
        Ok(items.into_iter().map(node_to_info).collect())
    }

    async fn get_node(&self, name: &str) -> AccessResult<NodeInfo> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let node = nodes
            .get(name)
            .await
            .map_err(|e| map_error(&format!("node {name}"), e))?;
        Ok(node_to_info(node))
    }

    async fn list_events(&self, scope: &NamespaceScope) -> AccessResult<Vec<EventInfo>> {
        let events: Api<Event> = self.scoped(scope);
        let items = Self::list(&events, &ListParams::default(), "events").await?;
        Ok(items.into_iter().map(event_to_info).collect())
    }

    async fn list_subscriptions(
        &self,
        scope: &NamespaceScope,
    ) -> AccessResult<Vec<SubscriptionInfo>> {
        let api = self.scoped_dynamic(scope, &subscription_api());
        let items = Self::list(&api, &ListParams::default(), "subscriptions").await?;

        Ok(items
            .into_iter()
            .map(|sub| SubscriptionInfo {
                name: sub.metadata.name.clone().unwrap_or_default(),
                namespace: sub.metadata.namespace.clone().unwrap_or_default(),
                package: json_str(&sub.data, &["spec", "name"]),
                channel: json_str(&sub.data, &["spec", "channel"]),
                catalog_source: json_str(&sub.data, &["spec", "source"]),
                current_csv: json_str(&sub.data, &["status", "currentCSV"]),
                installed_csv: json_str(&sub.data, &["status", "installedCSV"]),
            })
            .collect())
    }

    async fn list_csvs(&self, scope: &NamespaceScope) -> AccessResult<Vec<CsvInfo>> {
        let api = self.scoped_dynamic(scope, &csv_api());
        let items = Self::list(&api, &ListParams::default(), "clusterserviceversions").await?;

        Ok(items
            .into_iter()
            .filter(|csv| {
                !csv.metadata
                    .labels
                    .as_ref()
                    .is_some_and(|l| l.contains_key(OLM_COPIED_FROM))
            })
            .map(|csv| CsvInfo {
                name: csv.metadata.name.clone().unwrap_or_default(),
                namespace: csv.metadata.namespace.clone().unwrap_or_default(),
                display_name: json_str(&csv.data, &["spec", "displayName"]),
                version: json_str(&csv.data, &["spec", "version"]),
                phase: json_str(&csv.data, &["status", "phase"]),
            })
            .collect())
    }

    async fn list_helm_releases(
        &self,
        scope: &NamespaceScope,
    ) -> AccessResult<Vec<HelmReleaseInfo>> {
        let metas = self.list_helm_storage(scope).await?;

        // One storage object per revision; keep the newest revision per release
        let mut latest: BTreeMap<(String, String), HelmReleaseInfo> = BTreeMap::new();
        for meta in metas {
            let labels = meta.labels.unwrap_or_default();
            let Some(name) = labels.get("name").cloned() else {
                continue;
            };
            let release = HelmReleaseInfo {
                name,
                namespace: meta.namespace.unwrap_or_default(),
                revision: labels.get("version").and_then(|v| v.parse().ok()),
                status: labels.get("status").cloned(),
            };
            let key = (release.namespace.clone(), release.name.clone());
            match latest.get(&key) {
                Some(existing) if existing.revision >= release.revision => {}
                _ => {
                    latest.insert(key, release);
                }
            }
        }

        Ok(latest.into_values().collect())
    }

    async fn list_workloads(&self, scope: &NamespaceScope) -> AccessResult<Vec<WorkloadInfo>> {
        let params = ListParams::default();
        let deployments: Api<Deployment> = self.scoped(scope);
        let stateful_sets: Api<StatefulSet> = self.scoped(scope);
        let daemon_sets: Api<DaemonSet> = self.scoped(scope);

        let (deployments, stateful_sets, daemon_sets) = join3(
            Self::list(&deployments, &params, "deployments"),
            Self::list(&stateful_sets, &params, "statefulsets"),
            Self::list(&daemon_sets, &params, "daemonsets"),
        )
        .await;

        // Any unreadable kind fails the whole listing
        let mut workloads: Vec<WorkloadInfo> =
            deployments?.into_iter().map(deployment_to_info).collect();
        workloads.extend(stateful_sets?.into_iter().map(stateful_set_to_info));
        workloads.extend(daemon_sets?.into_iter().map(daemon_set_to_info));

        Ok(workloads)
    }

    async fn list_replica_sets(
        &self,
        scope: &NamespaceScope,
    ) -> AccessResult<Vec<ReplicaSetInfo>> {
        let replica_sets: Api<ReplicaSet> = self.scoped(scope);
        let items = Self::list(&replica_sets, &ListParams::default(), "replicasets").await?;

        Ok(items
            .into_iter()
            .map(|rs| ReplicaSetInfo {
                owners: owners(&rs.metadata),
                name: rs.metadata.name.unwrap_or_default(),
                namespace: rs.metadata.namespace.unwrap_or_default(),
            })
            .collect())
    }

    async fn list_builds(&self, scope: &NamespaceScope) -> AccessResult<Vec<BuildInfo>> {
        let api = self.scoped_dynamic(scope, &build_api());
        let items = Self::list(&api, &ListParams::default(), "builds").await?;

        Ok(items
            .into_iter()
            .map(|build| {
                let labels = build.metadata.labels.clone().unwrap_or_default();
                let annotations = build.metadata.annotations.clone().unwrap_or_default();
                BuildInfo {
                    name: build.metadata.name.clone().unwrap_or_default(),
                    namespace: build.metadata.namespace.clone().unwrap_or_default(),
                    config_name: json_str(&build.data, &["status", "config", "name"])
                        .or_else(|| labels.get("openshift.io/build-config.name").cloned())
                        .or_else(|| labels.get("buildconfig").cloned()),
                    number: annotations
                        .get("openshift.io/build.number")
                        .and_then(|n| n.parse().ok()),
                    phase: json_str(&build.data, &["status", "phase"]),
                    created: build.metadata.creation_timestamp.as_ref().map(|t| t.0),
                }
            })
            .collect())
    }

    async fn build_log(&self, namespace: &str, build: &str) -> AccessResult<String> {
        let what = format!("build log {namespace}/{build}");
        let request = http::Request::get(format!(
            "/apis/build.openshift.io/v1/namespaces/{namespace}/builds/{build}/log"
        ))
        .body(Vec::new())
        .map_err(|e| AccessError::unavailable(what.clone(), e))?;

        self.client
            .request_text(request)
            .await
            .map_err(|e| map_error(&what, e))
    }

    async fn pod_log(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        tail_lines: usize,
    ) -> AccessResult<String> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = LogParams {
            container: Some(container.to_string()),
            tail_lines: Some(i64::try_from(tail_lines).unwrap_or(i64::MAX)),
            timestamps: true,
            ..Default::default()
        };

        pods.logs(pod, &params)
            .await
            .map_err(|e| map_error(&format!("log {namespace}/{pod}/{container}"), e))
    }

    async fn cluster_version(&self) -> AccessResult<ClusterVersionInfo> {
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &cluster_version_api());
        let cv = api
            .get("version")
            .await
            .map_err(|e| map_error("clusterversion", e))?;

        Ok(ClusterVersionInfo {
            version: json_str(&cv.data, &["status", "desired", "version"]),
            cluster_id: json_str(&cv.data, &["spec", "clusterID"]),
            channel: json_str(&cv.data, &["spec", "channel"]),
        })
    }

    async fn list_projects(&self) -> AccessResult<Vec<ProjectInfo>> {
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &project_api());
        let items = Self::list(&api, &ListParams::default(), "projects").await?;
        Ok(items.into_iter().map(project_to_info).collect())
    }

    async fn list_resource_quotas(&self, scope: &NamespaceScope) -> AccessResult<Vec<QuotaInfo>> {
        let quotas: Api<ResourceQuota> = self.scoped(scope);
        let items = Self::list(&quotas, &ListParams::default(), "resourcequotas").await?;

        Ok(items
            .into_iter()
            .map(|quota| {
                let status = quota.status.unwrap_or_default();
                QuotaInfo {
                    name: quota.metadata.name.unwrap_or_default(),
                    namespace: quota.metadata.namespace.unwrap_or_default(),
                    hard: quantities(status.hard.as_ref()),
                    used: quantities(status.used.as_ref()),
                }
            })
            .collect())
    }

    async fn list_resources(
        &self,
        kind: ResourceKind,
        scope: &NamespaceScope,
    ) -> AccessResult<Vec<ResourceRecord>> {
        let params = ListParams::default();
        let what = kind.as_str();
        let records = match kind {
            ResourceKind::Route => {
                let api = self.scoped_dynamic(scope, &route_api());
                Self::list(&api, &params, what)
                    .await?
                    .into_iter()
                    .map(route_to_record)
                    .collect()
            }
            ResourceKind::ImageStream => {
                let api = self.scoped_dynamic(scope, &image_stream_api());
                Self::list(&api, &params, what)
                    .await?
                    .into_iter()
                    .map(image_stream_to_record)
                    .collect()
            }
            ResourceKind::Service => {
                let api: Api<Service> = self.scoped(scope);
                Self::list(&api, &params, what)
                    .await?
                    .into_iter()
                    .map(service_to_record)
                    .collect()
            }
            ResourceKind::ConfigMap => {
                let api: Api<ConfigMap> = self.scoped(scope);
                Self::list(&api, &params, what)
                    .await?
                    .into_iter()
                    .map(|cm| {
                        let mut data_keys: Vec<String> =
                            cm.data.iter().flatten().map(|(k, _)| k.clone()).collect();
                        data_keys.extend(cm.binary_data.iter().flatten().map(|(k, _)| k.clone()));
                        record(cm.metadata, ResourceDetail::ConfigMap { data_keys })
                    })
                    .collect()
            }
            ResourceKind::Secret => {
                let api: Api<Secret> = self.scoped(scope);
                Self::list(&api, &params, what)
                    .await?
                    .into_iter()
                    .map(|secret| {
                        // Values are dropped here and never leave the client
                        let mut data_keys: Vec<String> =
                            secret.data.iter().flatten().map(|(k, _)| k.clone()).collect();
                        data_keys.extend(
                            secret.string_data.iter().flatten().map(|(k, _)| k.clone()),
                        );
                        record(
                            secret.metadata,
                            ResourceDetail::Secret {
                                secret_type: secret.type_,
                                data_keys,
                            },
                        )
                    })
                    .collect()
            }
        };
        Ok(records)
    }
}

/// Map a kube error onto the port's error taxonomy
fn map_error(resource: &str, err: kube::Error) -> AccessError {
    match err {
        kube::Error::Api(resp) if resp.code == 404 => AccessError::NotFound(resource.to_string()),
        kube::Error::Api(resp) if resp.code == 401 || resp.code == 403 => {
            AccessError::Forbidden(resource.to_string())
        }
        other => AccessError::unavailable(resource, other),
    }
}

fn json_str(value: &Value, path: &[&str]) -> Option<String> {
    path.iter()
        .try_fold(value, |v, key| v.get(*key))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn owners(meta: &ObjectMeta) -> Vec<OwnerRef> {
    meta.owner_references
        .iter()
        .flatten()
        .map(|r| OwnerRef {
            kind: r.kind.clone(),
            name: r.name.clone(),
            controller: r.controller.unwrap_or(false),
        })
        .collect()
}

fn quantities(map: Option<&BTreeMap<String, Quantity>>) -> BTreeMap<String, String> {
    map.into_iter()
        .flatten()
        .map(|(k, q)| (k.clone(), q.0.clone()))
        .collect()
}

fn container_to_info(container: &Container, init: bool) -> ContainerInfo {
    let mut info = ContainerInfo::new(container.name.clone());
    info.image = container.image.clone();
    info.init = init;
    if let Some(resources) = &container.resources {
        info.requests = quantities(resources.requests.as_ref());
        info.limits = quantities(resources.limits.as_ref());
    }
    info
}

/// Convert a k8s Pod to PodInfo, merging container spec with status by name
fn pod_to_info(pod: Pod) -> PodInfo {
    let mut info = PodInfo::new(
        pod.metadata.name.clone().unwrap_or_default(),
        pod.metadata.namespace.clone().unwrap_or_default(),
    );
    info.labels = pod.metadata.labels.clone().unwrap_or_default();
    info.owners = owners(&pod.metadata);

    if let Some(spec) = &pod.spec {
        info.node_name = spec.node_name.clone();
        info.containers = spec
            .init_containers
            .iter()
            .flatten()
            .map(|c| container_to_info(c, true))
            .chain(spec.containers.iter().map(|c| container_to_info(c, false)))
            .collect();
    }

    if let Some(status) = pod.status {
        info.status = status
            .phase
            .as_deref()
            .map(PodStatus::from)
            .unwrap_or(PodStatus::Unknown);

        for cs in status.container_statuses.into_iter().flatten() {
            if let Some(container) = info
                .containers
                .iter_mut()
                .find(|c| !c.init && c.name == cs.name)
            {
                container.ready = cs.ready;
                container.restart_count = cs.restart_count;
            }
        }
    }

    info
}

fn workload_info(
    kind: WorkloadKind,
    meta: ObjectMeta,
    selector: Option<&LabelSelector>,
    template: Option<&PodSpec>,
) -> WorkloadInfo {
    let mut info = WorkloadInfo::new(
        kind,
        meta.name.clone().unwrap_or_default(),
        meta.namespace.clone().unwrap_or_default(),
    );
    info.owners = owners(&meta);
    info.labels = meta.labels.unwrap_or_default();
    info.annotations = meta.annotations.unwrap_or_default();
    if let Some(labels) = selector.and_then(|s| s.match_labels.clone()) {
        info.selector = labels;
    }
    if let Some(spec) = template {
        info.images = spec
            .containers
            .iter()
            .filter_map(|c| c.image.clone())
            .collect();
    }
    info
}

/// Convert a k8s Deployment to WorkloadInfo
fn deployment_to_info(deploy: Deployment) -> WorkloadInfo {
    let spec = deploy.spec.as_ref();
    let mut info = workload_info(
        WorkloadKind::Deployment,
        deploy.metadata.clone(),
        spec.map(|s| &s.selector),
        spec.and_then(|s| s.template.spec.as_ref()),
    );
    info.replicas = spec.and_then(|s| s.replicas).unwrap_or(0);
    info.ready_replicas = deploy
        .status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0);
    info
}

fn stateful_set_to_info(sts: StatefulSet) -> WorkloadInfo {
    let spec = sts.spec.as_ref();
    let mut info = workload_info(
        WorkloadKind::StatefulSet,
        sts.metadata.clone(),
        spec.map(|s| &s.selector),
        spec.and_then(|s| s.template.spec.as_ref()),
    );
    info.replicas = spec.and_then(|s| s.replicas).unwrap_or(0);
    info.ready_replicas = sts
        .status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0);
    info
}

fn daemon_set_to_info(ds: DaemonSet) -> WorkloadInfo {
    let spec = ds.spec.as_ref();
    let mut info = workload_info(
        WorkloadKind::DaemonSet,
        ds.metadata.clone(),
        spec.map(|s| &s.selector),
        spec.and_then(|s| s.template.spec.as_ref()),
    );
    if let Some(status) = &ds.status {
        info.replicas = status.desired_number_scheduled;
        info.ready_replicas = status.number_ready;
    }
    info
}

fn node_to_info(node: Node) -> NodeInfo {
    let mut info = NodeInfo::new(node.metadata.name.unwrap_or_default());
    info.labels = node.metadata.labels.unwrap_or_default();
    if let Some(status) = node.status {
        info.capacity = quantities(status.capacity.as_ref());
        info.allocatable = quantities(status.allocatable.as_ref());
        info.ready = status
            .conditions
            .iter()
            .flatten()
            .find(|c| c.type_ == "Ready")
            .map(|c| c.status == "True");
    }
    info
}

fn project_to_info(project: DynamicObject) -> ProjectInfo {
    let annotations = project.metadata.annotations.clone().unwrap_or_default();
    let non_empty = |key: &str| annotations.get(key).filter(|v| !v.is_empty()).cloned();
    ProjectInfo {
        name: project.metadata.name.clone().unwrap_or_default(),
        display_name: non_empty(DISPLAY_NAME_ANNOTATION),
        description: non_empty(DESCRIPTION_ANNOTATION),
        phase: json_str(&project.data, &["status", "phase"]),
        created: project.metadata.creation_timestamp.as_ref().map(|t| t.0),
        quotas: Vec::new(),
    }
}

fn record(meta: ObjectMeta, detail: ResourceDetail) -> ResourceRecord {
    let mut record = ResourceRecord::new(
        meta.name.unwrap_or_default(),
        meta.namespace.unwrap_or_default(),
        detail,
    );
    record.created = meta.creation_timestamp.map(|t| t.0);
    record
}

/// Route target ports may be a port name or a number
fn json_scalar(value: &Value, path: &[&str]) -> Option<String> {
    match path.iter().try_fold(value, |v, key| v.get(*key))? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn route_to_record(route: DynamicObject) -> ResourceRecord {
    let info = RouteInfo {
        host: json_str(&route.data, &["spec", "host"]),
        path: json_str(&route.data, &["spec", "path"]),
        target_service: json_str(&route.data, &["spec", "to", "name"]),
        target_port: json_scalar(&route.data, &["spec", "port", "targetPort"]),
        tls: route
            .data
            .get("spec")
            .and_then(|spec| spec.get("tls"))
            .is_some_and(|tls| !tls.is_null()),
    };
    record(route.metadata, ResourceDetail::Route(info))
}

fn image_stream_to_record(stream: DynamicObject) -> ResourceRecord {
    let tags = stream
        .data
        .get("status")
        .and_then(|status| status.get("tags"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|tag| tag.get("tag").and_then(Value::as_str).map(str::to_string))
        .collect();
    let info = ImageStreamInfo {
        repository: json_str(&stream.data, &["status", "dockerImageRepository"]),
        tags,
    };
    record(stream.metadata, ResourceDetail::ImageStream(info))
}

fn service_to_record(service: Service) -> ResourceRecord {
    let spec = service.spec.unwrap_or_default();
    let info = ServiceInfo {
        service_type: spec.type_,
        cluster_ip: spec.cluster_ip,
        ports: spec
            .ports
            .into_iter()
            .flatten()
            .map(|p| ServicePortInfo {
                name: p.name,
                port: p.port,
                target_port: p.target_port.map(|t| match t {
                    IntOrString::Int(n) => n.to_string(),
                    IntOrString::String(s) => s,
                }),
                protocol: p.protocol,
            })
            .collect(),
        selector: spec.selector.unwrap_or_default(),
    };
    record(service.metadata, ResourceDetail::Service(info))
}

fn event_to_info(event: Event) -> EventInfo {
    // Prefer the most recent occurrence; newer event producers only set event_time
    let last_timestamp: Option<DateTime<Utc>> = event
        .last_timestamp
        .as_ref()
        .map(|t| t.0)
        .or_else(|| event.event_time.as_ref().map(|t| t.0))
        .or_else(|| event.first_timestamp.as_ref().map(|t| t.0))
        .or_else(|| event.metadata.creation_timestamp.as_ref().map(|t| t.0));

    EventInfo {
        namespace: event
            .metadata
            .namespace
            .clone()
            .or_else(|| event.involved_object.namespace.clone())
            .unwrap_or_default(),
        involved_kind: event.involved_object.kind.clone().unwrap_or_default(),
        involved_name: event.involved_object.name.clone().unwrap_or_default(),
        reason: event.reason,
        message: event.message,
        event_type: event.type_,
        count: event.count,
        last_timestamp,
    }
}
