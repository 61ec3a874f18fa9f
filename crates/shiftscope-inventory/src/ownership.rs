//! Pod ownership resolution.
//!
//! A pod belongs to an operator by owner chain, then by label selector, then
//! by name prefix. The first heuristic that matches decides.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::{CSV_KIND, HELM_RELEASE_ANNOTATION, OLM_OWNER_LABEL};
use shiftscope_k8s::{AccessResult, ClusterAccess};
use shiftscope_types::{
    ManagedPod, NamespaceScope, Operator, PodInfo, ReplicaSetInfo, Resolution, SourceRef,
    WorkloadInfo, WorkloadKind,
};

/// Pods plus the controller records needed to walk their owner chains
#[derive(Clone, Debug, Default)]
pub struct PodInventory {
    pub pods: Vec<PodInfo>,
    pub workloads: Vec<WorkloadInfo>,
    pub replica_sets: Vec<ReplicaSetInfo>,
}

/// Pods assigned across a set of operators
#[derive(Clone, Debug, Default)]
pub struct ClaimedPods {
    /// Sorted by `(namespace, name)`; each pod appears at most once
    pub pods: Vec<ManagedPod>,
    pub notes: Vec<String>,
}

#[derive(Clone)]
pub struct OwnershipResolver {
    access: Arc<dyn ClusterAccess>,
}

impl OwnershipResolver {
    pub fn new(access: Arc<dyn ClusterAccess>) -> Self {
        Self { access }
    }

    /// Fetch pods, workloads and replica sets for a scope.
    ///
    /// # Errors
    /// Fails only when the pod listing itself fails; missing controller
    /// records just weaken the owner-chain heuristic.
    pub async fn inventory(&self, scope: &NamespaceScope) -> AccessResult<PodInventory> {
        let (pods, workloads, replica_sets) = tokio::join!(
            self.access.list_pods(scope, None),
            self.access.list_workloads(scope),
            self.access.list_replica_sets(scope),
        );

        let pods = match pods {
            Ok(pods) => pods,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(e),
        };
        let workloads = workloads.unwrap_or_else(|e| {
            warn!(error = %e, "Workloads unavailable for ownership resolution");
            Vec::new()
        });
        let replica_sets = replica_sets.unwrap_or_else(|e| {
            warn!(error = %e, "ReplicaSets unavailable for ownership resolution");
            Vec::new()
        });

        Ok(PodInventory {
            pods,
            workloads,
            replica_sets,
        })
    }

    /// Pods managed by a single operator, searched in its namespace
    pub async fn resolve_pods(&self, operator: &Operator) -> AccessResult<Vec<ManagedPod>> {
        let scope = NamespaceScope::namespace(&operator.namespace);
        let inventory = self.inventory(&scope).await?;
        let pods = resolve_in(operator, &inventory);
        debug!(operator = %operator.key(), pods = pods.len(), "Resolved operator pods");
        Ok(pods)
    }

    /// Assign every pod in scope to at most one of the given operators
    pub async fn claim_pods(
        &self,
        operators: &[Operator],
        scope: &NamespaceScope,
    ) -> AccessResult<ClaimedPods> {
        let inventory = self.inventory(scope).await?;
        Ok(claim(operators, &inventory))
    }
}

/// Pods that resolve to `operator` within an inventory
pub fn resolve_in(operator: &Operator, inventory: &PodInventory) -> Vec<ManagedPod> {
    let targets = target_workloads(operator, inventory);
    let mut pods: Vec<ManagedPod> = inventory
        .pods
        .iter()
        .filter_map(|pod| {
            match_pod(operator, &targets, pod, inventory)
                .map(|resolution| managed_pod(pod, operator, resolution))
        })
        .collect();
    pods.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));
    pods
}

/// Claim pods across operators. A pod matched by several operators goes to
/// the strongest resolution, then the highest-precedence kind, then the
/// smallest key.
pub fn claim(operators: &[Operator], inventory: &PodInventory) -> ClaimedPods {
    let candidates: Vec<(&Operator, Vec<&WorkloadInfo>)> = operators
        .iter()
        .map(|op| (op, target_workloads(op, inventory)))
        .collect();

    let mut claimed = ClaimedPods::default();
    for pod in &inventory.pods {
        let mut matches: Vec<(Resolution, &Operator)> = candidates
            .iter()
            .filter_map(|(op, targets)| {
                match_pod(op, targets, pod, inventory).map(|resolution| (resolution, *op))
            })
            .collect();
        matches.sort_by(|(ra, a), (rb, b)| (ra, a.kind, a.key()).cmp(&(rb, b.kind, b.key())));

        let Some((resolution, winner)) = matches.first() else {
            continue;
        };
        if matches.len() > 1 {
            claimed.notes.push(format!(
                "pod {}/{} matched {} operators; assigned to {} by {:?}",
                pod.namespace,
                pod.name,
                matches.len(),
                winner.key(),
                resolution
            ));
        }
        claimed.pods.push(managed_pod(pod, winner, *resolution));
    }

    claimed
        .pods
        .sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));
    claimed
}

/// Workloads an operator deploys directly
fn target_workloads<'a>(operator: &Operator, inventory: &'a PodInventory) -> Vec<&'a WorkloadInfo> {
    inventory
        .workloads
        .iter()
        .filter(|w| w.namespace == operator.namespace)
        .filter(|w| match &operator.source_ref {
            SourceRef::Subscription { csv: Some(csv), .. } => {
                w.owners.iter().any(|o| o.kind == CSV_KIND && &o.name == csv)
                    || w.labels.get(OLM_OWNER_LABEL) == Some(csv)
            }
            SourceRef::Subscription { csv: None, .. } => false,
            SourceRef::HelmRelease { name, .. } => {
                w.annotations.get(HELM_RELEASE_ANNOTATION) == Some(name)
                    || (w.labels.get("app.kubernetes.io/instance") == Some(name)
                        && w.labels.get("app.kubernetes.io/managed-by").map(String::as_str)
                            == Some("Helm"))
            }
            SourceRef::Workload { kind, name } => w.kind == *kind && &w.name == name,
        })
        .collect()
}

/// Controller workload at the top of a pod's owner chain
fn owner_chain(pod: &PodInfo, inventory: &PodInventory) -> Option<(WorkloadKind, String)> {
    let owner = pod.controller_owner()?;
    match owner.kind.as_str() {
        "ReplicaSet" => {
            let rs = inventory
                .replica_sets
                .iter()
                .find(|rs| rs.namespace == pod.namespace && rs.name == owner.name);
            match rs {
                Some(rs) => {
                    let parent = rs
                        .owners
                        .iter()
                        .find(|o| o.controller)
                        .or_else(|| rs.owners.first())?;
                    WorkloadKind::from_owner_kind(&parent.kind).map(|k| (k, parent.name.clone()))
                }
                // ReplicaSets are named <deployment>-<pod-template-hash>
                None => owner
                    .name
                    .rsplit_once('-')
                    .map(|(deployment, _)| (WorkloadKind::Deployment, deployment.to_string())),
            }
        }
        kind => WorkloadKind::from_owner_kind(kind).map(|k| (k, owner.name.clone())),
    }
}

fn match_pod(
    operator: &Operator,
    targets: &[&WorkloadInfo],
    pod: &PodInfo,
    inventory: &PodInventory,
) -> Option<Resolution> {
    if pod.namespace != operator.namespace {
        return None;
    }

    let chain = owner_chain(pod, inventory);
    if let Some((kind, name)) = &chain
        && targets.iter().any(|w| w.kind == *kind && &w.name == name)
    {
        return Some(Resolution::OwnerChain);
    }

    if targets.iter().any(|w| {
        !w.selector.is_empty()
            && w.selector
                .iter()
                .all(|(key, value)| pod.labels.get(key) == Some(value))
    }) {
        return Some(Resolution::LabelSelector);
    }

    // Name prefix only applies when the pod has no known controller
    let has_known_controller = chain.is_some_and(|(kind, name)| {
        inventory
            .workloads
            .iter()
            .any(|w| w.namespace == pod.namespace && w.kind == kind && w.name == name)
    });
    if !has_known_controller
        && pod
            .name
            .to_lowercase()
            .starts_with(&operator.name.to_lowercase())
    {
        return Some(Resolution::NamePrefix);
    }

    None
}

fn managed_pod(pod: &PodInfo, operator: &Operator, resolution: Resolution) -> ManagedPod {
    ManagedPod {
        name: pod.name.clone(),
        namespace: pod.namespace.clone(),
        owner_operator: operator.key(),
        matched_by: resolution,
        status: pod.status,
        ready_count: pod.ready_count(),
        container_count: pod.container_count(),
        node_name: pod.node_name.clone(),
    }
}
