use std::sync::Arc;
use std::time::{Duration, Instant};

use shiftscope_k8s::AccessError;
use shiftscope_k8s::fake::{FakeCluster, FakeOcm, running_pod};
use shiftscope_logs::{
    EngineConfig, LogLevel, LogSearchEngine, LogTarget, QueryMode, SearchRequest, SourceKind,
};
use shiftscope_types::{
    BuildInfo, CsvInfo, EventInfo, NamespaceScope, OwnerRef, QueryError, ReplicaSetInfo,
    ResourceTypeScope, ServiceLogRecord, SubscriptionInfo, WorkloadInfo, WorkloadKind,
};
use tokio_util::sync::CancellationToken;

fn log(lines: &[(u32, &str)]) -> String {
    lines
        .iter()
        .map(|(secs, text)| format!("2024-01-15T10:{:02}:{:02}Z {text}", secs / 60, secs % 60))
        .collect::<Vec<_>>()
        .join("\n")
}

fn event(ns: &str, involved: &str, reason: &str, message: &str) -> EventInfo {
    EventInfo {
        namespace: ns.to_string(),
        involved_kind: "Pod".to_string(),
        involved_name: involved.to_string(),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        event_type: Some("Warning".to_string()),
        count: Some(1),
        last_timestamp: chrono::DateTime::parse_from_rfc3339("2024-01-15T10:00:30Z")
            .ok()
            .map(|t| t.with_timezone(&chrono::Utc)),
    }
}

/// Three pods in `default`, two of which log the phrase
fn three_pods() -> FakeCluster {
    FakeCluster::new()
        .with_pod(running_pod("default", "api", &["app"]))
        .with_pod(running_pod("default", "worker", &["app"]))
        .with_pod(running_pod("default", "cache", &["app"]))
        .with_pod(running_pod("other", "api", &["app"]))
        .with_pod_log(
            "default",
            "api",
            "app",
            &log(&[
                (1, "starting"),
                (5, "dial tcp 10.0.0.4:5432: connection refused"),
                (9, "retry: Connection Refused"),
            ]),
        )
        .with_pod_log(
            "default",
            "worker",
            "app",
            &log(&[(3, "[ERROR] upstream connection refused"), (7, "idle")]),
        )
        .with_pod_log("default", "cache", "app", &log(&[(2, "ready"), (8, "evicted 3 keys")]))
        .with_pod_log("other", "api", "app", &log(&[(4, "connection refused")]))
}

fn engine(cluster: FakeCluster) -> LogSearchEngine {
    LogSearchEngine::new(Arc::new(cluster), None, EngineConfig::default())
}

#[tokio::test]
async fn test_substring_search_across_pods() {
    let engine = engine(three_pods());
    let request = SearchRequest::parse("connection refused", "default", "pod", 50).unwrap();
    let result = engine.search(&request).await.unwrap();

    let found: Vec<_> = result
        .entries
        .iter()
        .map(|e| (e.source_id.as_str(), e.timestamp.format("%M:%S").to_string()))
        .collect();
    assert_eq!(
        found,
        vec![
            ("default/api/app", "00:09".to_string()),
            ("default/api/app", "00:05".to_string()),
            ("default/worker/app", "00:03".to_string()),
        ]
    );
    assert!(!result.truncated);
    assert!(result.warnings.is_empty());
    assert!(result.failed_sources.is_empty());
    assert_eq!(result.sources_queried, 3);
    assert_eq!(result.level_counts.error, 1);
}

#[tokio::test]
async fn test_unavailable_ocm_degrades_to_warning() {
    let cluster = three_pods().with_event(event("default", "api", "BackOff", "Back-off restarting"));
    let ocm = FakeOcm::new().failing(AccessError::unavailable("ocm", "connection refused"));
    let engine = LogSearchEngine::new(
        Arc::new(cluster),
        Some(Arc::new(ocm)),
        EngineConfig::default(),
    )
    .with_ocm_clusters(vec!["abc123".to_string()]);

    let request = SearchRequest::parse("", "default", "pod,event,ocm", 100).unwrap();
    let result = engine.search(&request).await.unwrap();

    assert_eq!(result.warnings, vec!["ocm: unavailable".to_string()]);
    assert_eq!(
        result.failed_sources.iter().copied().collect::<Vec<_>>(),
        vec![SourceKind::Ocm]
    );
    assert!(result.entries.iter().any(|e| e.source_kind == SourceKind::Pod));
    assert!(result.entries.iter().any(|e| e.source_kind == SourceKind::Event));
    assert!(result.entries.iter().all(|e| e.source_kind != SourceKind::Ocm));
}

#[tokio::test]
async fn test_missing_ocm_configuration_is_reported() {
    let engine = engine(three_pods());
    let request = SearchRequest::parse("refused", "default", "all", 10).unwrap();
    let result = engine.search(&request).await.unwrap();

    assert!(result.warnings.contains(&"ocm: not configured".to_string()));
    assert!(result.failed_sources.is_empty());
    assert_eq!(result.len(), 3);
}

#[tokio::test]
async fn test_result_is_independent_of_arrival_order() {
    let request = SearchRequest::parse("", "default", "pod", 100).unwrap();

    let api_slow = engine(three_pods().delay("pod_log:default/api", Duration::from_millis(60)));
    let worker_slow =
        engine(three_pods().delay("pod_log:default/worker", Duration::from_millis(60)));

    let a = api_slow.search(&request).await.unwrap();
    let b = worker_slow.search(&request).await.unwrap();
    assert_eq!(a.entries, b.entries);
    assert_eq!(a.len(), 7);

    // Descending by (timestamp, kind, id)
    for pair in a.entries.windows(2) {
        assert!(pair[0].cmp_order(&pair[1]).is_ge());
    }
}

#[tokio::test]
async fn test_window_keeps_most_recent() {
    let lines: Vec<(u32, String)> = (0..30).map(|i| (i * 2, format!("tick {i}"))).collect();
    let refs: Vec<(u32, &str)> = lines.iter().map(|(s, t)| (*s, t.as_str())).collect();
    let cluster = FakeCluster::new()
        .with_pod(running_pod("default", "clock", &["app"]))
        .with_pod_log("default", "clock", "app", &log(&refs));

    let request = SearchRequest::parse("tick", "default", "pod", 5).unwrap();
    let result = engine(cluster).search(&request).await.unwrap();

    // The adapter keeps only the newest five lines and reports the cut
    assert_eq!(result.len(), 5);
    assert!(result.truncated);
    assert_eq!(result.entries[0].text, "tick 29");
    assert_eq!(result.entries[4].text, "tick 25");

    let request = SearchRequest::parse("", "default", "pod", 4).unwrap();
    let result = engine(three_pods()).search(&request).await.unwrap();
    assert_eq!(result.len(), 4);
    assert!(result.truncated);
    assert_eq!(result.entries[0].text, "retry: Connection Refused");
}

#[tokio::test]
async fn test_exact_fit_is_not_truncated() {
    let cluster = FakeCluster::new()
        .with_pod(running_pod("default", "clock", &["app"]))
        .with_pod_log("default", "clock", "app", &log(&[(1, "tick 0"), (2, "tick 1")]));

    let request = SearchRequest::parse("tick", "default", "pod", 2).unwrap();
    let result = engine(cluster).search(&request).await.unwrap();
    assert_eq!(result.len(), 2);
    assert!(!result.truncated);
}

#[tokio::test]
async fn test_event_cap_marks_truncated() {
    let cluster = (0..6).fold(FakeCluster::new(), |cluster, i| {
        cluster.with_event(event("default", &format!("api-{i}"), "BackOff", "restarting"))
    });
    let engine = engine(cluster);

    let request = SearchRequest::parse("restarting", "default", "event", 3).unwrap();
    let result = engine.search(&request).await.unwrap();
    assert_eq!(result.len(), 3);
    assert!(result.truncated);

    let request = SearchRequest::parse("restarting", "default", "event", 6).unwrap();
    let result = engine.search(&request).await.unwrap();
    assert_eq!(result.len(), 6);
    assert!(!result.truncated);
}

#[tokio::test]
async fn test_ocm_cap_marks_truncated() {
    let ocm = (0..4).fold(FakeOcm::new(), |ocm, i| {
        ocm.with_log(ServiceLogRecord {
            id: i.to_string(),
            cluster_id: "abc123".to_string(),
            summary: Some(format!("upgrade step {i}")),
            timestamp: chrono::DateTime::from_timestamp(1_700_000_000 + i64::from(i), 0),
            ..Default::default()
        })
    });
    let engine = LogSearchEngine::new(
        Arc::new(FakeCluster::new()),
        Some(Arc::new(ocm)),
        EngineConfig::default(),
    )
    .with_ocm_clusters(vec!["abc123".to_string()]);

    let request = SearchRequest::parse("upgrade", "all", "ocm", 2).unwrap();
    let result = engine.search(&request).await.unwrap();
    assert_eq!(result.len(), 2);
    assert!(result.truncated);
    assert_eq!(result.entries[0].text, "upgrade step 3");
}

#[tokio::test]
async fn test_pod_source_limit_marks_truncated() {
    let config = EngineConfig {
        max_pod_sources: 2,
        ..EngineConfig::default()
    };
    let engine = LogSearchEngine::new(Arc::new(three_pods()), None, config);

    let request = SearchRequest::parse("", "default", "pod", 100).unwrap();
    let result = engine.search(&request).await.unwrap();
    assert_eq!(result.sources_queried, 2);
    assert!(result.truncated);
    assert_eq!(result.warnings, vec!["pod: searched 2 of 3 pods".to_string()]);
    assert!(result.failed_sources.is_empty());
}

#[tokio::test]
async fn test_deadline_abandons_slow_sources() {
    let cluster = three_pods().delay("pod_log:default/cache", Duration::from_secs(10));
    let config = EngineConfig {
        query_timeout: Duration::from_millis(200),
        ..EngineConfig::default()
    };
    let engine = LogSearchEngine::new(Arc::new(cluster), None, config);

    let started = Instant::now();
    let request = SearchRequest::parse("connection refused", "default", "pod", 50).unwrap();
    let result = engine.search(&request).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(result.len(), 3);
    assert!(result.failed_sources.contains(&SourceKind::Pod));
    assert_eq!(result.warnings, vec!["pod: deadline exceeded".to_string()]);
}

#[tokio::test]
async fn test_cancellation_stops_the_query() {
    let engine = engine(three_pods());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let request = SearchRequest::parse("", "default", "pod", 50).unwrap();
    let result = engine.search_cancellable(&request, &cancel).await.unwrap();

    assert!(result.is_empty());
    assert_eq!(result.warnings, vec!["pod: cancelled".to_string()]);
}

#[tokio::test]
async fn test_invalid_input_fails_before_fetching() {
    assert!(matches!(
        SearchRequest::parse("x", "Not_A_Namespace", "pod", 10),
        Err(QueryError::InvalidScope(_))
    ));
    assert!(matches!(
        SearchRequest::parse("x", "default", "pods,logs", 10),
        Err(QueryError::InvalidScope(_))
    ));

    // A slow cluster would blow the test timeout if anything were fetched
    let slow = three_pods().delay("list_pods", Duration::from_secs(30));
    let engine = engine(slow);
    let started = Instant::now();

    let zero = SearchRequest::new("x", NamespaceScope::All, ResourceTypeScope::all(), 0);
    assert_eq!(engine.search(&zero).await.unwrap_err(), QueryError::InvalidLimit);

    let bad_regex = SearchRequest::new("(", NamespaceScope::All, ResourceTypeScope::all(), 10)
        .with_mode(QueryMode::Regex);
    assert!(matches!(
        engine.search(&bad_regex).await,
        Err(QueryError::InvalidQuery(_))
    ));
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_regex_and_min_level() {
    let engine = engine(three_pods());
    let request = SearchRequest::parse(r"connection\s+refused", "all", "pod", 50)
        .unwrap()
        .with_mode(QueryMode::Regex)
        .with_min_level(Some(LogLevel::Error));
    let result = engine.search(&request).await.unwrap();

    assert_eq!(result.len(), 1);
    assert_eq!(result.entries[0].source_id, "default/worker/app");
}

#[tokio::test]
async fn test_searches_several_namespaces() {
    let engine = engine(three_pods());
    let request = SearchRequest::parse("connection refused", "default", "pod", 50)
        .unwrap()
        .with_namespaces(vec![
            NamespaceScope::namespace("default"),
            NamespaceScope::namespace("other"),
            NamespaceScope::namespace("missing"),
        ]);
    let result = engine.search(&request).await.unwrap();

    assert_eq!(result.len(), 4);
    assert_eq!(result.sources_queried, 4);
}

#[tokio::test]
async fn test_build_search_reads_latest_build() {
    let build = |name: &str, number: u64| BuildInfo {
        name: name.to_string(),
        namespace: "ci".to_string(),
        config_name: Some("api".to_string()),
        number: Some(number),
        ..Default::default()
    };
    let cluster = FakeCluster::new()
        .with_build(build("api-1", 1), "error: old failure\n")
        .with_build(build("api-2", 2), "STEP 1/2: FROM ubi9\nerror: exit status 1\n");

    let engine = engine(cluster);
    let request = SearchRequest::parse("error", "ci", "build", 20).unwrap();
    let result = engine.search(&request).await.unwrap();

    assert_eq!(result.sources_queried, 1);
    assert_eq!(result.len(), 1);
    assert_eq!(result.entries[0].source_id, "ci/api-2");
}

#[tokio::test]
async fn test_not_found_source_warns_without_failing() {
    let cluster = three_pods().fail("list_builds", AccessError::NotFound("builds".to_string()));
    let engine = engine(cluster);
    let request = SearchRequest::parse("refused", "default", "pod,build", 20).unwrap();
    let result = engine.search(&request).await.unwrap();

    assert_eq!(result.warnings, vec!["build: not found".to_string()]);
    assert!(result.failed_sources.is_empty());
    assert_eq!(result.len(), 3);
}

#[tokio::test]
async fn test_comprehensive_operator_logs() {
    const NS: &str = "nvidia-gpu-operator";
    const CSV: &str = "gpu-operator-certified.v23.9.1";

    let mut deployment = WorkloadInfo::new(WorkloadKind::Deployment, "gpu-operator", NS);
    deployment.owners.push(OwnerRef::new("ClusterServiceVersion", CSV));

    let mut operator_pod = running_pod(NS, "gpu-operator-7d9f8-abcde", &["gpu-operator"]);
    operator_pod
        .owners
        .push(OwnerRef::new("ReplicaSet", "gpu-operator-7d9f8"));
    let mut driver_pod = running_pod(NS, "nvidia-driver-daemonset-xyz", &["driver"]);
    driver_pod
        .owners
        .push(OwnerRef::new("DaemonSet", "nvidia-driver-daemonset"));

    let cluster = FakeCluster::new()
        .with_subscription(SubscriptionInfo {
            name: "gpu-operator-certified".to_string(),
            namespace: NS.to_string(),
            current_csv: Some(CSV.to_string()),
            ..Default::default()
        })
        .with_csv(CsvInfo {
            name: CSV.to_string(),
            namespace: NS.to_string(),
            phase: Some("Succeeded".to_string()),
            ..Default::default()
        })
        .with_workload(deployment)
        .with_replica_set(ReplicaSetInfo {
            name: "gpu-operator-7d9f8".to_string(),
            namespace: NS.to_string(),
            owners: vec![OwnerRef::new("Deployment", "gpu-operator")],
        })
        .with_pod(operator_pod)
        .with_pod(driver_pod)
        .with_pod_log(
            NS,
            "gpu-operator-7d9f8-abcde",
            "gpu-operator",
            &log(&[(1, "reconciling ClusterPolicy"), (2, "[ERROR] driver not ready")]),
        )
        .with_pod_log(NS, "nvidia-driver-daemonset-xyz", "driver", &log(&[(3, "loading")]))
        .with_event(event(NS, "gpu-operator-7d9f8-abcde", "Unhealthy", "probe failed"))
        .with_event(event(NS, "nvidia-driver-daemonset-xyz", "BackOff", "restarting"));

    let engine = engine(cluster);
    let target = LogTarget::parse("operator", "gpu-operator-certified").unwrap();
    let result = engine
        .comprehensive_logs(
            &target,
            &NamespaceScope::namespace(NS),
            &ResourceTypeScope::all(),
            100,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let sources: Vec<_> = result
        .entries
        .iter()
        .map(|e| (e.source_kind, e.source_id.as_str()))
        .collect();
    assert_eq!(
        sources,
        vec![
            (SourceKind::Event, "nvidia-gpu-operator/Pod/gpu-operator-7d9f8-abcde"),
            (
                SourceKind::Pod,
                "nvidia-gpu-operator/gpu-operator-7d9f8-abcde/gpu-operator"
            ),
            (
                SourceKind::Pod,
                "nvidia-gpu-operator/gpu-operator-7d9f8-abcde/gpu-operator"
            ),
        ]
    );
    assert!(result.failed_sources.is_empty());
}

#[tokio::test]
async fn test_comprehensive_logs_for_missing_pod() {
    let engine = engine(three_pods());
    let target = LogTarget::Pod("ghost".to_string());
    let result = engine
        .comprehensive_logs(
            &target,
            &NamespaceScope::namespace("default"),
            &ResourceTypeScope::all(),
            10,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(result.is_empty());
    assert_eq!(result.warnings, vec!["pod: not found".to_string()]);

    let only_ocm = ResourceTypeScope::only([SourceKind::Ocm]);
    assert!(matches!(
        engine
            .comprehensive_logs(
                &target,
                &NamespaceScope::All,
                &only_ocm,
                10,
                &CancellationToken::new()
            )
            .await,
        Err(QueryError::InvalidScope(_))
    ));
}
