use chrono::Utc;
use tracing::debug;

use super::tail;
use crate::parser::LogParser;
use shiftscope_k8s::{AccessResult, ClusterAccess};
use shiftscope_types::{LogEntry, SourceKind};

pub(super) async fn fetch(
    cluster: &dyn ClusterAccess,
    namespace: &str,
    build: &str,
    limit: usize,
) -> AccessResult<Vec<LogEntry>> {
    let observed_at = Utc::now();
    let log = cluster.build_log(namespace, build).await?;
    let source_id = format!("{namespace}/{build}");
    let entries = LogParser::parse_stream(
        &tail(&log, limit),
        SourceKind::Build,
        &source_id,
        observed_at,
    );
    debug!(source = %source_id, lines = entries.len(), "Fetched build log");
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shiftscope_k8s::fake::FakeCluster;
    use shiftscope_types::BuildInfo;

    #[tokio::test]
    async fn test_build_log_tail() {
        let build = BuildInfo {
            name: "api-3".to_string(),
            namespace: "ci".to_string(),
            config_name: Some("api".to_string()),
            number: Some(3),
            ..Default::default()
        };
        let cluster = FakeCluster::new().with_build(
            build,
            "Cloning repository\nSTEP 1/4: FROM ubi9\nerror: build error: exit status 1\n",
        );

        let entries = fetch(&cluster, "ci", "api-3", 2).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.source_id == "ci/api-3"));
        assert!(entries[1].text.starts_with("error:"));
    }
}
