//! GPU and DPU tagging for nodes and workloads.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use shiftscope_k8s::{AccessResult, ClusterAccess};
use shiftscope_types::{
    DeviceFamilies, DeviceFamily, NamespaceScope, NodeHardwareProfile, NodeInfo, PodInfo, PodRef,
    WorkloadHardwareUsage,
};

/// How a resource key is matched
#[derive(Clone, Copy, Debug)]
enum KeyMatch {
    Exact(&'static str),
    Prefix(&'static str),
}

/// Resource keys that identify accelerator hardware
const KEY_TABLE: &[(KeyMatch, DeviceFamily)] = &[
    (KeyMatch::Exact("nvidia.com/gpu"), DeviceFamily::Gpu),
    (KeyMatch::Prefix("nvidia.com/gpu."), DeviceFamily::Gpu),
    (KeyMatch::Prefix("nvidia.com/mig-"), DeviceFamily::Gpu),
    (KeyMatch::Exact("nvidia.com/dpu"), DeviceFamily::Dpu),
    (KeyMatch::Exact("nvidia.com/bluefield"), DeviceFamily::Dpu),
    (KeyMatch::Prefix("nvidia.com/sriov_net_"), DeviceFamily::Dpu),
];

/// Label fragments worth surfacing as extended hardware tags
const EXTENDED_TAG_HINTS: &[&str] = &[
    "nvidia",
    "mellanox",
    "bluefield",
    "connectx",
    "gpu",
    "dpu",
    "sriov",
    "rdma",
    // NFD PCI vendor ids for NVIDIA and Mellanox
    "pci-10de",
    "pci-15b3",
];

/// Device family of a resource key, if it is a recognized one
pub fn family_of(key: &str) -> Option<DeviceFamily> {
    KEY_TABLE
        .iter()
        .find(|(m, _)| match m {
            KeyMatch::Exact(k) => key == *k,
            KeyMatch::Prefix(p) => key.starts_with(p),
        })
        .map(|(_, family)| *family)
}

/// Numeric part of a quantity string such as `2`, `500m` or `1.5`
fn quantity_value(quantity: &str) -> Option<f64> {
    let q = quantity.trim();
    let end = q
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
        .unwrap_or(q.len());
    q[..end].parse().ok()
}

fn is_nonzero(quantity: &str) -> bool {
    quantity_value(quantity).is_none_or(|v| v != 0.0)
}

fn format_quantity(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Profile a node from its labels, capacity and allocatable resources
pub fn profile_node(node: &NodeInfo) -> NodeHardwareProfile {
    let mut families = DeviceFamilies::default();
    let mut capacity_resources = BTreeMap::new();

    // Presence of the key tags the node even when no device is currently free
    for (key, quantity) in node.capacity.iter().chain(node.allocatable.iter()) {
        if let Some(family) = family_of(key) {
            families.insert(family);
            capacity_resources
                .entry(key.clone())
                .or_insert_with(|| quantity.clone());
        }
    }

    // Device plugins also publish recognized keys as labels, e.g. nvidia.com/gpu.product
    for key in node.labels.keys() {
        if let Some(family) = family_of(key) {
            families.insert(family);
        }
    }

    let extended_tags = node
        .labels
        .iter()
        .filter(|(key, _)| {
            let lower = key.to_lowercase();
            EXTENDED_TAG_HINTS.iter().any(|hint| lower.contains(hint))
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    NodeHardwareProfile {
        node_name: node.name.clone(),
        labels: node.labels.clone(),
        capacity_resources,
        device_family: families,
        extended_tags,
        ready: node.ready,
    }
}

/// Hardware usage of a pod, or `None` when it requests no recognized key.
///
/// App container quantities are summed; init containers contribute their
/// maximum, matching the scheduler's effective request.
pub fn workload_usage(pod: &PodInfo) -> Option<WorkloadHardwareUsage> {
    let mut families = DeviceFamilies::default();
    let mut requests = BTreeMap::new();
    let mut limits = BTreeMap::new();

    let (init, app): (Vec<_>, Vec<_>) = pod.containers.iter().partition(|c| c.init);

    for container in &app {
        accumulate(&mut requests, &container.requests, &mut families, Combine::Sum);
        accumulate(&mut limits, &container.limits, &mut families, Combine::Sum);
    }
    for container in &init {
        accumulate(&mut requests, &container.requests, &mut families, Combine::Max);
        accumulate(&mut limits, &container.limits, &mut families, Combine::Max);
    }

    if families.is_none() {
        return None;
    }

    Some(WorkloadHardwareUsage {
        pod_ref: PodRef {
            namespace: pod.namespace.clone(),
            name: pod.name.clone(),
        },
        status: pod.status,
        node_name: pod.node_name.clone(),
        device_family: families,
        requests,
        limits,
    })
}

#[derive(Clone, Copy)]
enum Combine {
    Sum,
    Max,
}

fn accumulate(
    into: &mut BTreeMap<String, String>,
    resources: &BTreeMap<String, String>,
    families: &mut DeviceFamilies,
    combine: Combine,
) {
    for (key, quantity) in resources {
        let Some(family) = family_of(key) else {
            continue;
        };
        if !is_nonzero(quantity) {
            continue;
        }
        families.insert(family);

        let merged = match into.get(key).and_then(|q| quantity_value(q)).zip(quantity_value(quantity)) {
            Some((current, next)) => format_quantity(match combine {
                Combine::Sum => current + next,
                Combine::Max => current.max(next),
            }),
            None => into.get(key).cloned().unwrap_or_else(|| quantity.clone()),
        };
        into.insert(key.clone(), merged);
    }
}

/// Cluster-backed hardware tagging
#[derive(Clone)]
pub struct HardwareTagger {
    access: Arc<dyn ClusterAccess>,
}

impl HardwareTagger {
    pub fn new(access: Arc<dyn ClusterAccess>) -> Self {
        Self { access }
    }

    /// Profile every node, sorted by name
    pub async fn tag_nodes(&self) -> AccessResult<Vec<NodeHardwareProfile>> {
        let nodes = self.access.list_nodes().await?;
        let mut profiles: Vec<_> = nodes.iter().map(profile_node).collect();
        profiles.sort_by(|a, b| a.node_name.cmp(&b.node_name));
        debug!(nodes = profiles.len(), "Tagged nodes");
        Ok(profiles)
    }

    pub async fn tag_node(&self, name: &str) -> AccessResult<NodeHardwareProfile> {
        let node = self.access.get_node(name).await?;
        Ok(profile_node(&node))
    }

    /// Nodes exposing the given family
    pub async fn nodes_with(&self, family: DeviceFamily) -> AccessResult<Vec<NodeHardwareProfile>> {
        Ok(self
            .tag_nodes()
            .await?
            .into_iter()
            .filter(|p| p.device_family.contains(family))
            .collect())
    }

    /// Pods requesting or limited on recognized keys, sorted by `(namespace, name)`
    pub async fn tag_workloads(
        &self,
        scope: &NamespaceScope,
    ) -> AccessResult<Vec<WorkloadHardwareUsage>> {
        let pods = self.access.list_pods(scope, None).await?;
        let mut usages: Vec<_> = pods.iter().filter_map(workload_usage).collect();
        usages.sort_by(|a, b| {
            (&a.pod_ref.namespace, &a.pod_ref.name).cmp(&(&b.pod_ref.namespace, &b.pod_ref.name))
        });
        debug!(scope = %scope, workloads = usages.len(), "Tagged workloads");
        Ok(usages)
    }

    pub async fn workloads_with(
        &self,
        family: DeviceFamily,
        scope: &NamespaceScope,
    ) -> AccessResult<Vec<WorkloadHardwareUsage>> {
        Ok(self
            .tag_workloads(scope)
            .await?
            .into_iter()
            .filter(|u| u.device_family.contains(family))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shiftscope_k8s::fake::{FakeCluster, running_pod};
    use shiftscope_types::ContainerInfo;

    fn node(name: &str, capacity: &[(&str, &str)], labels: &[(&str, &str)]) -> NodeInfo {
        let mut node = NodeInfo::new(name);
        for (k, v) in capacity {
            node.capacity.insert(k.to_string(), v.to_string());
        }
        for (k, v) in labels {
            node.labels.insert(k.to_string(), v.to_string());
        }
        node
    }

    fn gpu_pod(ns: &str, name: &str, gpus: &str) -> PodInfo {
        let mut pod = running_pod(ns, name, &["main"]);
        pod.containers[0]
            .limits
            .insert("nvidia.com/gpu".to_string(), gpus.to_string());
        pod
    }

    #[test]
    fn test_family_of_keys() {
        assert_eq!(family_of("nvidia.com/gpu"), Some(DeviceFamily::Gpu));
        assert_eq!(family_of("nvidia.com/mig-1g.5gb"), Some(DeviceFamily::Gpu));
        assert_eq!(family_of("nvidia.com/gpu.product"), Some(DeviceFamily::Gpu));
        assert_eq!(family_of("nvidia.com/bluefield"), Some(DeviceFamily::Dpu));
        assert_eq!(family_of("nvidia.com/sriov_net_a"), Some(DeviceFamily::Dpu));
        assert_eq!(family_of("nvidia.com/gpus"), None);
        assert_eq!(family_of("amd.com/gpu"), None);
    }

    #[test]
    fn test_node_families() {
        let gpu_only = profile_node(&node("n1", &[("nvidia.com/gpu", "4")], &[]));
        assert_eq!(gpu_only.device_family.label(), "gpu");

        let both = profile_node(&node(
            "n2",
            &[("nvidia.com/gpu", "8"), ("nvidia.com/bluefield", "2")],
            &[("feature.node.kubernetes.io/pci-15b3.present", "true")],
        ));
        assert_eq!(both.device_family.label(), "gpu+dpu");
        assert_eq!(both.extended_tags.len(), 1);

        let none = profile_node(&node("n3", &[("cpu", "16"), ("memory", "64Gi")], &[]));
        assert!(none.device_family.is_none());
        assert!(none.capacity_resources.is_empty());
    }

    #[test]
    fn test_zero_capacity_node_still_tagged() {
        let drained = profile_node(&node("n4", &[("cpu", "16"), ("nvidia.com/gpu", "0")], &[]));
        assert_eq!(drained.device_family.label(), "gpu");
        assert_eq!(
            drained.capacity_resources.get("nvidia.com/gpu").map(String::as_str),
            Some("0")
        );
    }

    #[test]
    fn test_workload_usage_sums_containers() {
        let mut pod = gpu_pod("ml", "trainer", "2");
        let mut sidecar = ContainerInfo::new("sidecar");
        sidecar
            .limits
            .insert("nvidia.com/gpu".to_string(), "1".to_string());
        pod.containers.push(sidecar);
        let mut init = ContainerInfo::new("warmup");
        init.init = true;
        init.limits
            .insert("nvidia.com/gpu".to_string(), "2".to_string());
        pod.containers.push(init);

        let usage = workload_usage(&pod).unwrap();
        assert_eq!(usage.limits.get("nvidia.com/gpu").map(String::as_str), Some("3"));
        assert!(usage.requests.is_empty());
        assert_eq!(usage.device_family.label(), "gpu");
    }

    #[test]
    fn test_zero_quantity_is_not_tagged() {
        assert!(workload_usage(&gpu_pod("ml", "idle", "0")).is_none());
        assert!(workload_usage(&running_pod("ml", "web", &["main"])).is_none());
    }

    #[tokio::test]
    async fn test_gpu_workloads_in_scope() {
        let cluster = FakeCluster::new()
            .with_pod(gpu_pod("ml", "trainer-b", "1"))
            .with_pod(gpu_pod("ml", "trainer-a", "4"))
            .with_pod(running_pod("ml", "web", &["main"]))
            .with_pod(gpu_pod("other", "job", "1"));

        let tagger = HardwareTagger::new(Arc::new(cluster));
        let usages = tagger
            .workloads_with(DeviceFamily::Gpu, &NamespaceScope::namespace("ml"))
            .await
            .unwrap();

        let names: Vec<_> = usages.iter().map(|u| u.pod_ref.name.as_str()).collect();
        assert_eq!(names, vec!["trainer-a", "trainer-b"]);
        assert!(
            tagger
                .workloads_with(DeviceFamily::Dpu, &NamespaceScope::All)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_gpu_nodes() {
        let cluster = FakeCluster::new()
            .with_node(node("worker-b", &[("nvidia.com/gpu", "2")], &[]))
            .with_node(node("worker-a", &[("cpu", "8")], &[]))
            .with_node(node("worker-c", &[("nvidia.com/dpu", "1")], &[]));

        let tagger = HardwareTagger::new(Arc::new(cluster));
        let all = tagger.tag_nodes().await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].node_name, "worker-a");

        let gpu: Vec<_> = tagger
            .nodes_with(DeviceFamily::Gpu)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.node_name)
            .collect();
        assert_eq!(gpu, vec!["worker-b".to_string()]);
    }
}
