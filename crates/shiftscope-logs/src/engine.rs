//! Aggregation and search over every log source.
//!
//! A query discovers its fetch units, runs them concurrently under one
//! deadline, then merges, filters and windows the joined batches.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapters::{Adapters, FetchUnit, InvolvedFilter, SourceError};
use crate::diagnostics::Diagnostics;
use crate::filter::{CompiledFilter, QueryMode};
use crate::window;
use shiftscope_inventory::{
    OperatorClassifier, OwnershipResolver, find_by_name, find_or_adhoc, resolve_in,
};
use shiftscope_k8s::{ClusterAccess, ManagedClusterApi};
use shiftscope_types::{
    BuildInfo, LevelCounts, LogLevel, ManagedPod, NamespaceScope, PodInfo, PodStatus, QueryError,
    ResourceTypeScope, SearchResult, SourceKind,
};

/// Default line limit when the caller gives none
pub const DEFAULT_MAX_LINES: usize = 100;

/// Engine limits
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Fetch units allowed in flight at once
    pub fan_out: usize,
    /// Deadline for a whole query, discovery included
    pub query_timeout: Duration,
    /// Pods searched per query; the rest are skipped with a warning
    pub max_pod_sources: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fan_out: 8,
            query_timeout: Duration::from_secs(30),
            max_pod_sources: 50,
        }
    }
}

/// A scoped log search
#[derive(Clone, Debug)]
pub struct SearchRequest {
    pub query: String,
    pub mode: QueryMode,
    pub min_level: Option<LogLevel>,
    pub namespaces: Vec<NamespaceScope>,
    pub resource_types: ResourceTypeScope,
    pub max_lines: usize,
    /// OCM clusters to read; `None` uses the configured ids, else every
    /// managed cluster
    pub ocm_clusters: Option<Vec<String>>,
}

impl SearchRequest {
    pub fn new(
        query: impl Into<String>,
        namespace: NamespaceScope,
        resource_types: ResourceTypeScope,
        max_lines: usize,
    ) -> Self {
        Self {
            query: query.into(),
            mode: QueryMode::default(),
            min_level: None,
            namespaces: vec![namespace],
            resource_types,
            max_lines,
            ocm_clusters: None,
        }
    }

    /// Build a request from caller strings.
    ///
    /// # Errors
    /// `InvalidScope` for an unknown namespace or resource type value.
    pub fn parse(
        query: &str,
        namespace: &str,
        resource_types: &str,
        max_lines: usize,
    ) -> Result<Self, QueryError> {
        Ok(Self::new(
            query,
            namespace.parse()?,
            resource_types.parse()?,
            max_lines,
        ))
    }

    pub fn with_mode(mut self, mode: QueryMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_min_level(mut self, level: Option<LogLevel>) -> Self {
        self.min_level = level;
        self
    }

    pub fn with_namespaces(mut self, namespaces: Vec<NamespaceScope>) -> Self {
        self.namespaces = namespaces;
        self
    }

    pub fn with_ocm_clusters(mut self, cluster_ids: Vec<String>) -> Self {
        self.ocm_clusters = Some(cluster_ids);
        self
    }
}

/// A single named resource for comprehensive logs
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogTarget {
    Operator(String),
    Pod(String),
    Build(String),
}

impl LogTarget {
    /// Parse `operator`, `pod` or `build` plus a resource name
    pub fn parse(resource_type: &str, name: &str) -> Result<Self, QueryError> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(QueryError::InvalidScope("empty resource name".to_string()));
        }
        match resource_type.trim().to_lowercase().as_str() {
            "operator" | "operators" => Ok(Self::Operator(name)),
            "pod" | "pods" => Ok(Self::Pod(name)),
            "build" | "builds" | "buildconfig" => Ok(Self::Build(name)),
            other => Err(QueryError::InvalidScope(format!("resource type '{other}'"))),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Operator(name) | Self::Pod(name) | Self::Build(name) => name,
        }
    }

    /// Adapters that can say something about this kind of resource
    pub fn applicable(&self) -> ResourceTypeScope {
        match self {
            Self::Operator(_) => {
                ResourceTypeScope::only([SourceKind::Pod, SourceKind::Event, SourceKind::Build])
            }
            Self::Pod(_) => ResourceTypeScope::only([SourceKind::Pod, SourceKind::Event]),
            Self::Build(_) => ResourceTypeScope::only([SourceKind::Build, SourceKind::Event]),
        }
    }
}

/// Fans log queries out over the adapters
#[derive(Clone)]
pub struct LogSearchEngine {
    cluster: Arc<dyn ClusterAccess>,
    ocm: Option<Arc<dyn ManagedClusterApi>>,
    adapters: Adapters,
    config: EngineConfig,
    ocm_cluster_ids: Vec<String>,
}

impl LogSearchEngine {
    pub fn new(
        cluster: Arc<dyn ClusterAccess>,
        ocm: Option<Arc<dyn ManagedClusterApi>>,
        config: EngineConfig,
    ) -> Self {
        Self {
            adapters: Adapters::new(Arc::clone(&cluster), ocm.clone()),
            cluster,
            ocm,
            config,
            ocm_cluster_ids: Vec::new(),
        }
    }

    /// Default OCM clusters for searches that name none
    pub fn with_ocm_clusters(mut self, cluster_ids: Vec<String>) -> Self {
        self.ocm_cluster_ids = cluster_ids;
        self
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResult, QueryError> {
        self.search_cancellable(request, &CancellationToken::new())
            .await
    }

    /// Run a search. Only caller-input errors fail; every backend problem
    /// degrades into the result's warnings.
    pub async fn search_cancellable(
        &self,
        request: &SearchRequest,
        cancel: &CancellationToken,
    ) -> Result<SearchResult, QueryError> {
        if request.max_lines == 0 {
            return Err(QueryError::InvalidLimit);
        }
        if request.resource_types.is_empty() {
            return Err(QueryError::InvalidScope("no resource types".to_string()));
        }
        if request.namespaces.is_empty() {
            return Err(QueryError::InvalidScope("no namespaces".to_string()));
        }
        let filter =
            CompiledFilter::new(&request.query, request.mode)?.with_min_level(request.min_level);

        let deadline = Instant::now() + self.config.query_timeout;
        let diagnostics = Diagnostics::new();
        let scopes = normalize_scopes(&request.namespaces);
        let wants = |kind| request.resource_types.contains(kind);

        let (pods, builds, ocm) = tokio::join!(
            async {
                if wants(SourceKind::Pod) {
                    self.pod_units(&scopes, &|_| true, &diagnostics, deadline, cancel)
                        .await
                } else {
                    Vec::new()
                }
            },
            async {
                if wants(SourceKind::Build) {
                    self.build_units(&scopes, &|_| true, &diagnostics, deadline, cancel)
                        .await
                } else {
                    Vec::new()
                }
            },
            async {
                if wants(SourceKind::Ocm) {
                    self.ocm_units(request.ocm_clusters.as_deref(), &diagnostics, deadline, cancel)
                        .await
                } else {
                    Vec::new()
                }
            },
        );

        let mut units = pods;
        units.extend(builds);
        if wants(SourceKind::Event) {
            units.extend(scopes.iter().map(|scope| FetchUnit::Event {
                scope: scope.clone(),
                involved: None,
            }));
        }
        units.extend(ocm);

        let result = self
            .execute(units, &filter, request.max_lines, &diagnostics, deadline, cancel)
            .await;
        info!(
            query = %request.query,
            sources = result.sources_queried,
            entries = result.entries.len(),
            failed = ?result.failed_sources,
            "Log search complete"
        );
        Ok(result)
    }

    /// All logs for one operator, pod or build, limited to the adapters that
    /// apply to it
    pub async fn comprehensive_logs(
        &self,
        target: &LogTarget,
        namespace: &NamespaceScope,
        resource_types: &ResourceTypeScope,
        max_lines: usize,
        cancel: &CancellationToken,
    ) -> Result<SearchResult, QueryError> {
        if max_lines == 0 {
            return Err(QueryError::InvalidLimit);
        }
        let kinds = resource_types.intersect(&target.applicable());
        if kinds.is_empty() {
            return Err(QueryError::InvalidScope(format!(
                "no requested log type applies to {}",
                target.name()
            )));
        }

        let deadline = Instant::now() + self.config.query_timeout;
        let diagnostics = Diagnostics::new();
        let scopes = vec![namespace.clone()];
        let name = target.name().to_lowercase();
        let mut units = Vec::new();
        let mut involved = vec![target.name().to_string()];

        match target {
            LogTarget::Pod(pod) => {
                if kinds.contains(SourceKind::Pod) {
                    let found = self
                        .pod_units(&scopes, &|p| p.name == *pod, &diagnostics, deadline, cancel)
                        .await;
                    if found.is_empty() {
                        diagnostics.note(SourceKind::Pod, "not found");
                    }
                    units.extend(found);
                }
            }
            LogTarget::Build(_) => {
                if kinds.contains(SourceKind::Build) {
                    let select = |b: &BuildInfo| build_matches(b, &name);
                    let found = self
                        .build_units(&scopes, &select, &diagnostics, deadline, cancel)
                        .await;
                    if found.is_empty() {
                        diagnostics.note(SourceKind::Build, "not found");
                    }
                    units.extend(found);
                }
            }
            LogTarget::Operator(operator) => {
                let managed = self
                    .operator_pods(operator, namespace, &diagnostics, deadline, cancel)
                    .await;
                let claimed: BTreeSet<(String, String)> = managed
                    .iter()
                    .map(|p| (p.namespace.clone(), p.name.clone()))
                    .collect();
                involved.extend(managed.into_iter().map(|p| p.name));

                if kinds.contains(SourceKind::Pod) && !claimed.is_empty() {
                    let select =
                        |p: &PodInfo| claimed.contains(&(p.namespace.clone(), p.name.clone()));
                    units.extend(
                        self.pod_units(&scopes, &select, &diagnostics, deadline, cancel)
                            .await,
                    );
                }
                if kinds.contains(SourceKind::Build) {
                    let select = |b: &BuildInfo| build_matches(b, &name);
                    units.extend(
                        self.build_units(&scopes, &select, &diagnostics, deadline, cancel)
                            .await,
                    );
                }
            }
        }

        if kinds.contains(SourceKind::Event) {
            units.push(FetchUnit::Event {
                scope: namespace.clone(),
                involved: Some(InvolvedFilter::new(&involved)),
            });
        }

        let result = self
            .execute(
                units,
                &CompiledFilter::match_all(),
                max_lines,
                &diagnostics,
                deadline,
                cancel,
            )
            .await;
        info!(
            target = ?target,
            sources = result.sources_queried,
            entries = result.entries.len(),
            "Comprehensive logs complete"
        );
        Ok(result)
    }

    /// Pods of a named operator; falls back to an ad-hoc lookup by name
    async fn operator_pods(
        &self,
        name: &str,
        namespace: &NamespaceScope,
        diagnostics: &Diagnostics,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Vec<ManagedPod> {
        let classifier = OperatorClassifier::new(Arc::clone(&self.cluster));
        let resolver = OwnershipResolver::new(Arc::clone(&self.cluster));

        let work = async {
            let (classification, inventory) =
                tokio::join!(classifier.classify(namespace), resolver.inventory(namespace));
            let inventory = match inventory {
                Ok(inventory) => inventory,
                Err(e) => return Err(SourceError::access(SourceKind::Pod, e)),
            };
            let operator = match namespace.as_namespace() {
                Some(ns) => find_or_adhoc(&classification.operators, name, ns),
                None => match find_by_name(&classification.operators, name) {
                    Some(op) => op.clone(),
                    None => return Ok(Vec::new()),
                },
            };
            Ok(resolve_in(&operator, &inventory))
        };

        match bounded(SourceKind::Pod, deadline, cancel, work).await {
            Ok(pods) => {
                debug!(operator = name, pods = pods.len(), "Resolved operator pods");
                pods
            }
            Err(err) => {
                diagnostics.record(&err);
                Vec::new()
            }
        }
    }

    async fn pod_units(
        &self,
        scopes: &[NamespaceScope],
        select: &(dyn Fn(&PodInfo) -> bool + Sync),
        diagnostics: &Diagnostics,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Vec<FetchUnit> {
        let mut pods: BTreeMap<(String, String), PodInfo> = BTreeMap::new();
        for scope in scopes {
            let listing = bounded(SourceKind::Pod, deadline, cancel, async {
                self.cluster
                    .list_pods(scope, None)
                    .await
                    .map_err(|e| SourceError::access(SourceKind::Pod, e))
            })
            .await;
            match listing {
                Ok(found) => pods.extend(
                    found
                        .into_iter()
                        .filter(|p| has_logs(p) && select(p))
                        .map(|p| ((p.namespace.clone(), p.name.clone()), p)),
                ),
                Err(err) => diagnostics.record(&err),
            }
        }

        let total = pods.len();
        if total > self.config.max_pod_sources {
            diagnostics.note(
                SourceKind::Pod,
                &format!("searched {} of {total} pods", self.config.max_pod_sources),
            );
            diagnostics.capped();
        }

        pods.into_values()
            .take(self.config.max_pod_sources)
            .flat_map(|pod| {
                pod.app_containers()
                    .map(|c| FetchUnit::Pod {
                        namespace: pod.namespace.clone(),
                        pod: pod.name.clone(),
                        container: c.name.clone(),
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Latest build per BuildConfig among the selected builds
    async fn build_units(
        &self,
        scopes: &[NamespaceScope],
        select: &(dyn Fn(&BuildInfo) -> bool + Sync),
        diagnostics: &Diagnostics,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Vec<FetchUnit> {
        let mut latest: BTreeMap<(String, String), BuildInfo> = BTreeMap::new();
        for scope in scopes {
            let listing = bounded(SourceKind::Build, deadline, cancel, async {
                self.cluster
                    .list_builds(scope)
                    .await
                    .map_err(|e| SourceError::access(SourceKind::Build, e))
            })
            .await;
            let builds = match listing {
                Ok(builds) => builds,
                Err(err) => {
                    diagnostics.record(&err);
                    continue;
                }
            };
            for build in builds.into_iter().filter(|b| select(b)) {
                let config = build.config_name.clone().unwrap_or_else(|| build.name.clone());
                let key = (build.namespace.clone(), config);
                let newer = latest
                    .get(&key)
                    .is_none_or(|current| build_rank(&build) > build_rank(current));
                if newer {
                    latest.insert(key, build);
                }
            }
        }

        latest
            .into_values()
            .map(|b| FetchUnit::Build {
                namespace: b.namespace,
                build: b.name,
            })
            .collect()
    }

    async fn ocm_units(
        &self,
        explicit: Option<&[String]>,
        diagnostics: &Diagnostics,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Vec<FetchUnit> {
        let Some(ocm) = &self.ocm else {
            diagnostics.record(&SourceError::NotConfigured(SourceKind::Ocm));
            return Vec::new();
        };

        let ids = match explicit {
            Some(ids) => ids.to_vec(),
            None if !self.ocm_cluster_ids.is_empty() => self.ocm_cluster_ids.clone(),
            None => {
                let listing = bounded(SourceKind::Ocm, deadline, cancel, async {
                    ocm.list_managed_clusters(None)
                        .await
                        .map_err(|e| SourceError::access(SourceKind::Ocm, e))
                })
                .await;
                match listing {
                    Ok(clusters) => clusters.into_iter().map(|c| c.id).collect(),
                    Err(err) => {
                        diagnostics.record(&err);
                        Vec::new()
                    }
                }
            }
        };

        ids.into_iter()
            .map(|cluster_id| FetchUnit::Ocm { cluster_id })
            .collect()
    }

    /// Run every unit, join them all, then merge, filter and window
    async fn execute(
        &self,
        units: Vec<FetchUnit>,
        filter: &CompiledFilter,
        max_lines: usize,
        diagnostics: &Diagnostics,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> SearchResult {
        let sources_queried = units.len();
        let semaphore = Arc::new(Semaphore::new(self.config.fan_out.max(1)));
        let mut tasks = JoinSet::new();

        for unit in units {
            let adapters = self.adapters.clone();
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let kind = unit.kind();
                let fetch = async {
                    let _permit = semaphore
                        .acquire()
                        .await
                        .map_err(|_| SourceError::Cancelled(kind))?;
                    adapters.fetch(&unit, max_lines).await
                };
                let result = bounded(kind, deadline, &cancel, fetch).await;
                (unit, result)
            });
        }

        let mut batches = Vec::with_capacity(sources_queried);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((unit, Ok(batch))) => {
                    debug!(
                        source = %unit,
                        lines = batch.entries.len(),
                        capped = batch.capped,
                        "Source returned"
                    );
                    if batch.capped {
                        diagnostics.capped();
                    }
                    batches.push(batch.entries);
                }
                Ok((unit, Err(err))) => {
                    debug!(source = %unit, error = %err, "Source failed");
                    diagnostics.record(&err);
                }
                Err(e) => warn!(error = %e, "Fetch task aborted"),
            }
        }

        let merged = window::merge(batches);
        let matched: Vec<_> = merged.into_iter().filter(|e| filter.matches(e)).collect();
        let (mut entries, windowed) = window::window(matched, max_lines);
        // Newest first
        entries.reverse();

        let snapshot = diagnostics.snapshot();
        SearchResult {
            level_counts: LevelCounts::from_entries(&entries),
            entries,
            truncated: windowed || snapshot.capped,
            warnings: snapshot.warnings,
            failed_sources: snapshot.failed,
            sources_queried,
        }
    }
}

/// Bound a unit of work by the query deadline and the caller's token
async fn bounded<T>(
    kind: SourceKind,
    deadline: Instant,
    cancel: &CancellationToken,
    work: impl Future<Output = Result<T, SourceError>>,
) -> Result<T, SourceError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SourceError::Cancelled(kind)),
        outcome = tokio::time::timeout_at(deadline, work) => {
            outcome.unwrap_or_else(|_| Err(SourceError::DeadlineExceeded(kind)))
        }
    }
}

/// `All` swallows every other scope; duplicates collapse
fn normalize_scopes(scopes: &[NamespaceScope]) -> Vec<NamespaceScope> {
    if scopes.contains(&NamespaceScope::All) {
        return vec![NamespaceScope::All];
    }
    let unique: BTreeSet<_> = scopes.iter().cloned().collect();
    unique.into_iter().collect()
}

/// Pods whose containers have started at some point
fn has_logs(pod: &PodInfo) -> bool {
    matches!(
        pod.status,
        PodStatus::Running | PodStatus::Succeeded | PodStatus::Failed
    )
}

fn build_matches(build: &BuildInfo, needle: &str) -> bool {
    build.name.to_lowercase().contains(needle)
        || build
            .config_name
            .as_deref()
            .is_some_and(|c| c.to_lowercase().contains(needle))
}

fn build_rank(build: &BuildInfo) -> (Option<u64>, Option<chrono::DateTime<chrono::Utc>>, &str) {
    (build.number, build.created, build.name.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_scopes() {
        let scopes = normalize_scopes(&[
            NamespaceScope::namespace("b"),
            NamespaceScope::namespace("a"),
            NamespaceScope::namespace("b"),
        ]);
        assert_eq!(
            scopes,
            vec![NamespaceScope::namespace("a"), NamespaceScope::namespace("b")]
        );
        assert_eq!(
            normalize_scopes(&[NamespaceScope::namespace("a"), NamespaceScope::All]),
            vec![NamespaceScope::All]
        );
    }

    #[test]
    fn test_log_target_parsing() {
        assert_eq!(
            LogTarget::parse("Operator", "gpu-operator").unwrap(),
            LogTarget::Operator("gpu-operator".to_string())
        );
        assert!(LogTarget::parse("service", "x").is_err());
        assert!(LogTarget::parse("pod", " ").is_err());

        let kinds: Vec<_> = LogTarget::Build("api".to_string()).applicable().kinds().collect();
        assert_eq!(kinds, vec![SourceKind::Build, SourceKind::Event]);
    }

    #[test]
    fn test_build_rank_prefers_higher_number() {
        let older = BuildInfo {
            name: "api-9".to_string(),
            number: Some(9),
            ..Default::default()
        };
        let newer = BuildInfo {
            name: "api-10".to_string(),
            number: Some(10),
            ..Default::default()
        };
        assert!(build_rank(&newer) > build_rank(&older));
    }
}
