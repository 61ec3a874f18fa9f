//! Operator classification over OLM subscriptions, Helm releases and
//! operator-like workloads.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{CSV_KIND, HELM_RELEASE_ANNOTATION, OLM_OWNER_LABEL};
use shiftscope_k8s::{AccessResult, ClusterAccess};
use shiftscope_types::{
    CsvInfo, HelmReleaseInfo, NamespaceScope, Operator, OperatorKind, SourceRef,
    SubscriptionInfo, WorkloadInfo, WorkloadKind,
};

/// Raw records the three candidate streams produced
#[derive(Clone, Debug, Default)]
pub struct CandidateRecords {
    pub subscriptions: Vec<SubscriptionInfo>,
    pub csvs: Vec<CsvInfo>,
    pub helm_releases: Vec<HelmReleaseInfo>,
    pub workloads: Vec<WorkloadInfo>,
}

/// Result of one classification pass
#[derive(Clone, Debug, Default)]
pub struct Classification {
    /// Sorted by `(namespace, name, kind)`
    pub operators: Vec<Operator>,
    /// Candidate streams that failed and contributed nothing
    pub failed_streams: usize,
    pub warnings: Vec<String>,
    /// Precedence decisions taken on ambiguous records
    pub notes: Vec<String>,
}

/// Classifies installed software into OLM, Helm and Custom operators
#[derive(Clone)]
pub struct OperatorClassifier {
    access: Arc<dyn ClusterAccess>,
}

impl OperatorClassifier {
    pub fn new(access: Arc<dyn ClusterAccess>) -> Self {
        Self { access }
    }

    /// Collect the three candidate streams concurrently and classify them.
    /// A failing stream degrades to empty and is counted, never fatal.
    pub async fn classify(&self, scope: &NamespaceScope) -> Classification {
        let (subscriptions, csvs, helm_releases, workloads) = tokio::join!(
            self.access.list_subscriptions(scope),
            self.access.list_csvs(scope),
            self.access.list_helm_releases(scope),
            self.access.list_workloads(scope),
        );

        let mut failed_streams = 0;
        let mut warnings = Vec::new();

        let subscriptions = settle("olm", subscriptions, &mut failed_streams, &mut warnings);
        // Missing CSV details only thin out the OLM entries
        let csvs = match csvs {
            Ok(csvs) => csvs,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => {
                warn!(error = %e, "CSV details unavailable");
                warnings.push(format!("olm csv details: {}", e.reason()));
                Vec::new()
            }
        };
        let helm_releases = settle("helm", helm_releases, &mut failed_streams, &mut warnings);
        let workloads = settle("custom", workloads, &mut failed_streams, &mut warnings);

        let records = CandidateRecords {
            subscriptions,
            csvs,
            helm_releases,
            workloads,
        };
        let (operators, notes) = classify_records(&records);

        info!(
            scope = %scope,
            operators = operators.len(),
            failed_streams,
            "Classified operators"
        );

        Classification {
            operators,
            failed_streams,
            warnings,
            notes,
        }
    }
}

fn settle<T>(
    stream: &str,
    result: AccessResult<Vec<T>>,
    failed_streams: &mut usize,
    warnings: &mut Vec<String>,
) -> Vec<T> {
    match result {
        Ok(items) => items,
        // CRDs absent on the cluster
        Err(e) if e.is_not_found() => {
            debug!(stream, "Candidate stream not present on cluster");
            Vec::new()
        }
        Err(e) => {
            warn!(stream, error = %e, "Candidate stream failed");
            *failed_streams += 1;
            warnings.push(format!("{stream}: {}", e.reason()));
            Vec::new()
        }
    }
}

/// Classify already-fetched records.
///
/// Precedence is OLM > Helm > Custom: a workload claimed by a CSV or a Helm
/// release never becomes Custom, and a Custom entry is suppressed by an OLM
/// or Helm entry with the same `(namespace, name)`.
pub fn classify_records(records: &CandidateRecords) -> (Vec<Operator>, Vec<String>) {
    let mut notes = Vec::new();
    let mut by_key: BTreeMap<(String, String, OperatorKind), Operator> = BTreeMap::new();

    for sub in &records.subscriptions {
        let operator = olm_operator(sub, &records.csvs);
        by_key.entry(key_of(&operator)).or_insert(operator);
    }

    for release in &records.helm_releases {
        let operator = helm_operator(release);
        by_key.entry(key_of(&operator)).or_insert(operator);
    }

    let helm_names: BTreeSet<(&str, &str)> = records
        .helm_releases
        .iter()
        .map(|r| (r.namespace.as_str(), r.name.as_str()))
        .collect();

    let mut workloads: Vec<&WorkloadInfo> = records
        .workloads
        .iter()
        .filter(|w| looks_like_operator(w))
        .collect();
    workloads.sort_by(|a, b| (&a.namespace, &a.name, a.kind).cmp(&(&b.namespace, &b.name, b.kind)));

    for workload in workloads {
        let target = format!("{} {}/{}", workload.kind, workload.namespace, workload.name);

        if let Some(csv) = owning_csv(workload) {
            notes.push(format!("{target} is operator-like but deployed by CSV {csv}; OLM takes precedence"));
            continue;
        }
        if let Some(release) = workload.annotations.get(HELM_RELEASE_ANNOTATION)
            && helm_names.contains(&(workload.namespace.as_str(), release.as_str()))
        {
            notes.push(format!("{target} is operator-like but rendered by Helm release {release}; Helm takes precedence"));
            continue;
        }

        let suppressed_by = [OperatorKind::Olm, OperatorKind::Helm].into_iter().find(|kind| {
            by_key.contains_key(&(workload.namespace.clone(), workload.name.clone(), *kind))
        });
        if let Some(kind) = suppressed_by {
            notes.push(format!("{target} shares its name with a {kind} operator; {kind} takes precedence"));
            continue;
        }

        let operator = custom_operator(workload);
        by_key.entry(key_of(&operator)).or_insert(operator);
    }

    (by_key.into_values().collect(), notes)
}

fn key_of(operator: &Operator) -> (String, String, OperatorKind) {
    (operator.namespace.clone(), operator.name.clone(), operator.kind)
}

fn olm_operator(sub: &SubscriptionInfo, csvs: &[CsvInfo]) -> Operator {
    let csv_name = sub.current_csv.clone().or_else(|| sub.installed_csv.clone());
    let csv = csv_name.as_deref().and_then(|name| {
        csvs.iter()
            .find(|c| c.namespace == sub.namespace && c.name == name)
    });

    let mut operator = Operator::new(
        &sub.name,
        &sub.namespace,
        OperatorKind::Olm,
        SourceRef::Subscription {
            name: sub.name.clone(),
            csv: csv_name.clone(),
        },
    );
    operator.package = sub.package.clone();
    operator.channel = sub.channel.clone();
    operator.catalog_source = sub.catalog_source.clone();

    match csv {
        Some(csv) => {
            operator.display_name = csv.display_name.clone();
            operator.version = csv.version.clone();
            operator.install_phase = csv.phase.clone();
        }
        None => {
            // CSV names follow <package>.v<version>
            operator.version = csv_name
                .as_deref()
                .and_then(|n| n.split_once(".v"))
                .map(|(_, v)| v.to_string());
        }
    }
    operator
}

fn helm_operator(release: &HelmReleaseInfo) -> Operator {
    let mut operator = Operator::new(
        &release.name,
        &release.namespace,
        OperatorKind::Helm,
        SourceRef::HelmRelease {
            name: release.name.clone(),
            revision: release.revision,
        },
    );
    operator.display_name = Some(release.name.clone());
    operator.install_phase = release.status.clone();
    operator
}

fn custom_operator(workload: &WorkloadInfo) -> Operator {
    let mut operator = Operator::new(
        &workload.name,
        &workload.namespace,
        OperatorKind::Custom,
        SourceRef::Workload {
            kind: workload.kind,
            name: workload.name.clone(),
        },
    );
    operator.display_name = Some(
        workload
            .labels
            .get("app.kubernetes.io/name")
            .cloned()
            .unwrap_or_else(|| workload.name.clone()),
    );
    operator.version = workload
        .labels
        .get("app.kubernetes.io/version")
        .cloned()
        .or_else(|| workload.images.first().and_then(|i| image_tag(i)));
    operator.install_phase = Some(
        if workload.replicas == 0 {
            "ScaledDown"
        } else if workload.ready_replicas >= workload.replicas {
            "Running"
        } else {
            "Progressing"
        }
        .to_string(),
    );
    operator.replicas = Some(workload.replica_status());
    operator.images = workload.images.clone();
    operator
}

/// Name of the CSV that deployed this workload, if any
fn owning_csv(workload: &WorkloadInfo) -> Option<&str> {
    workload
        .owners
        .iter()
        .find(|o| o.kind == CSV_KIND)
        .map(|o| o.name.as_str())
        .or_else(|| workload.labels.get(OLM_OWNER_LABEL).map(String::as_str))
}

/// Name, label and image heuristic for workloads that run an operator
pub fn looks_like_operator(workload: &WorkloadInfo) -> bool {
    let name = workload.name.to_lowercase();
    // Plain "controller" names are not operators; kubebuilder managers are
    if name.contains("operator") || name.ends_with("controller-manager") {
        return true;
    }
    if workload.labels.get("app.kubernetes.io/component").map(String::as_str) == Some("operator")
    {
        return true;
    }
    // kubebuilder scaffolding labels the manager this way
    if workload.labels.get("control-plane").map(String::as_str) == Some("controller-manager") {
        return true;
    }
    workload
        .images
        .iter()
        .any(|image| image_repository(image).contains("operator"))
}

/// Last path segment of an image reference, without tag or digest
fn image_repository(image: &str) -> String {
    let without_digest = image.split('@').next().unwrap_or(image);
    let last = without_digest.rsplit('/').next().unwrap_or(without_digest);
    last.split(':').next().unwrap_or(last).to_lowercase()
}

fn image_tag(image: &str) -> Option<String> {
    let without_digest = image.split('@').next().unwrap_or(image);
    let last = without_digest.rsplit('/').next().unwrap_or(without_digest);
    last.split_once(':').map(|(_, tag)| tag.to_string())
}

/// Look an operator up by name: exact (case-insensitive) match first, in
/// precedence order, then a substring match on name, package or display name
pub fn find_by_name<'a>(operators: &'a [Operator], name: &str) -> Option<&'a Operator> {
    let wanted = name.to_lowercase();
    let exact = operators
        .iter()
        .filter(|op| op.name.to_lowercase() == wanted)
        .min_by_key(|op| op.kind);
    exact.or_else(|| {
        operators
            .iter()
            .filter(|op| {
                op.name.to_lowercase().contains(&wanted)
                    || op.package.as_deref().is_some_and(|p| p.to_lowercase().contains(&wanted))
                    || op
                        .display_name
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(&wanted))
            })
            .min_by_key(|op| op.kind)
    })
}

/// Operator named `name`, or an ad-hoc Custom operator in `namespace` so the
/// name-prefix heuristic can still find its pods
pub fn find_or_adhoc(operators: &[Operator], name: &str, namespace: &str) -> Operator {
    let in_namespace: Vec<Operator> = operators
        .iter()
        .filter(|op| op.namespace == namespace)
        .cloned()
        .collect();
    if let Some(found) = find_by_name(&in_namespace, name) {
        return found.clone();
    }
    debug!(name, namespace, "No classified operator matched; using ad-hoc lookup");
    Operator::new(
        name,
        namespace,
        OperatorKind::Custom,
        SourceRef::Workload {
            kind: WorkloadKind::Deployment,
            name: name.to_string(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use shiftscope_k8s::AccessError;
    use shiftscope_k8s::fake::FakeCluster;
    use shiftscope_types::OwnerRef;

    fn subscription(ns: &str, name: &str, csv: &str) -> SubscriptionInfo {
        SubscriptionInfo {
            name: name.to_string(),
            namespace: ns.to_string(),
            package: Some(name.to_string()),
            current_csv: Some(csv.to_string()),
            ..Default::default()
        }
    }

    fn deployment(ns: &str, name: &str) -> WorkloadInfo {
        let mut w = WorkloadInfo::new(WorkloadKind::Deployment, name, ns);
        w.replicas = 1;
        w.ready_replicas = 1;
        w
    }

    #[test]
    fn test_olm_suppresses_custom_with_same_key() {
        let records = CandidateRecords {
            subscriptions: vec![subscription("ops", "cert-operator", "cert-operator.v1.2.0")],
            workloads: vec![deployment("ops", "cert-operator")],
            ..Default::default()
        };

        let (operators, notes) = classify_records(&records);
        assert_eq!(operators.len(), 1);
        assert_eq!(operators[0].kind, OperatorKind::Olm);
        assert_eq!(operators[0].version.as_deref(), Some("1.2.0"));
        assert_eq!(notes.len(), 1);
    }

    #[test]
    fn test_distinct_names_are_not_suppressed() {
        let records = CandidateRecords {
            subscriptions: vec![subscription(
                "nvidia-gpu-operator",
                "gpu-operator-certified",
                "gpu-operator-certified.v23.9.1",
            )],
            csvs: vec![CsvInfo {
                name: "gpu-operator-certified.v23.9.1".to_string(),
                namespace: "nvidia-gpu-operator".to_string(),
                display_name: Some("NVIDIA GPU Operator".to_string()),
                version: Some("23.9.1".to_string()),
                phase: Some("Succeeded".to_string()),
            }],
            workloads: vec![deployment("nvidia-gpu-operator", "gpu-operator-helper")],
            ..Default::default()
        };

        let (operators, _) = classify_records(&records);
        let kinds: Vec<_> = operators.iter().map(|o| (o.name.as_str(), o.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                ("gpu-operator-certified", OperatorKind::Olm),
                ("gpu-operator-helper", OperatorKind::Custom),
            ]
        );
        assert_eq!(operators[0].install_phase.as_deref(), Some("Succeeded"));
    }

    #[test]
    fn test_csv_owned_workload_is_claimed_by_olm() {
        let mut deploy = deployment("nvidia-gpu-operator", "gpu-operator");
        deploy
            .owners
            .push(OwnerRef::new(CSV_KIND, "gpu-operator-certified.v23.9.1"));

        let records = CandidateRecords {
            subscriptions: vec![subscription(
                "nvidia-gpu-operator",
                "gpu-operator-certified",
                "gpu-operator-certified.v23.9.1",
            )],
            workloads: vec![deploy],
            ..Default::default()
        };

        let (operators, notes) = classify_records(&records);
        assert_eq!(operators.len(), 1);
        assert_eq!(operators[0].kind, OperatorKind::Olm);
        assert!(notes[0].contains("OLM takes precedence"));
    }

    #[test]
    fn test_helm_rendered_workload_is_not_custom() {
        let mut deploy = deployment("monitoring", "prometheus-operator");
        deploy
            .annotations
            .insert(HELM_RELEASE_ANNOTATION.to_string(), "kube-prom".to_string());

        let records = CandidateRecords {
            helm_releases: vec![HelmReleaseInfo {
                name: "kube-prom".to_string(),
                namespace: "monitoring".to_string(),
                revision: Some(3),
                status: Some("deployed".to_string()),
            }],
            workloads: vec![deploy],
            ..Default::default()
        };

        let (operators, _) = classify_records(&records);
        assert_eq!(operators.len(), 1);
        assert_eq!(operators[0].kind, OperatorKind::Helm);
        assert_eq!(operators[0].install_phase.as_deref(), Some("deployed"));
    }

    #[test]
    fn test_operator_heuristics() {
        assert!(looks_like_operator(&deployment("a", "widget-controller-manager")));
        assert!(!looks_like_operator(&deployment("a", "cert-manager-controller")));
        assert!(!looks_like_operator(&deployment("openshift-ingress", "ingress-controller")));

        let mut by_label = deployment("a", "manager");
        by_label
            .labels
            .insert("control-plane".to_string(), "controller-manager".to_string());
        assert!(looks_like_operator(&by_label));

        let mut by_image = deployment("a", "manager");
        by_image
            .images
            .push("quay.io/acme/widget-operator:v0.3.1@sha256:abc".to_string());
        assert!(looks_like_operator(&by_image));

        assert!(!looks_like_operator(&deployment("a", "frontend")));
    }

    #[test]
    fn test_find_by_name_prefers_exact_match() {
        let records = CandidateRecords {
            subscriptions: vec![
                subscription("ops", "gpu-operator-certified", "x.v1"),
                subscription("ops", "gpu", "y.v1"),
            ],
            ..Default::default()
        };
        let (operators, _) = classify_records(&records);

        assert_eq!(find_by_name(&operators, "GPU").unwrap().name, "gpu");
        assert_eq!(
            find_by_name(&operators, "certified").unwrap().name,
            "gpu-operator-certified"
        );
        assert!(find_by_name(&operators, "network").is_none());

        let adhoc = find_or_adhoc(&operators, "network", "ops");
        assert_eq!(adhoc.kind, OperatorKind::Custom);
        assert_eq!(find_or_adhoc(&operators, "gpu", "ops").kind, OperatorKind::Olm);
    }

    #[tokio::test]
    async fn test_failed_stream_degrades_to_empty() {
        let cluster = FakeCluster::new()
            .with_workload(deployment("ops", "widget-operator"))
            .fail(
                "list_subscriptions",
                AccessError::Forbidden("subscriptions".to_string()),
            )
            .fail(
                "list_helm_releases",
                AccessError::NotFound("secrets".to_string()),
            );

        let classifier = OperatorClassifier::new(Arc::new(cluster));
        let result = classifier.classify(&NamespaceScope::All).await;

        assert_eq!(result.failed_streams, 1);
        assert_eq!(result.warnings, vec!["olm: access denied".to_string()]);
        assert_eq!(result.operators.len(), 1);
        assert_eq!(result.operators[0].kind, OperatorKind::Custom);
    }

    #[tokio::test]
    async fn test_unreadable_workloads_fail_custom_stream() {
        let cluster = FakeCluster::new()
            .with_workload(deployment("ops", "widget-operator"))
            .fail(
                "list_workloads",
                AccessError::Forbidden("statefulsets".to_string()),
            );

        let classifier = OperatorClassifier::new(Arc::new(cluster));
        let result = classifier.classify(&NamespaceScope::All).await;

        assert_eq!(result.failed_streams, 1);
        assert_eq!(result.warnings, vec!["custom: access denied".to_string()]);
        assert!(result.operators.is_empty());
    }
}
