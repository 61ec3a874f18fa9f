use chrono::Utc;
use tracing::debug;

use crate::parser::LogParser;
use shiftscope_k8s::{AccessResult, ClusterAccess};
use shiftscope_types::{LogEntry, SourceKind};

pub(super) async fn fetch(
    cluster: &dyn ClusterAccess,
    namespace: &str,
    pod: &str,
    container: &str,
    limit: usize,
) -> AccessResult<Vec<LogEntry>> {
    let observed_at = Utc::now();
    let text = cluster.pod_log(namespace, pod, container, limit).await?;
    let source_id = format!("{namespace}/{pod}/{container}");
    let entries = LogParser::parse_stream(&text, SourceKind::Pod, &source_id, observed_at);
    debug!(source = %source_id, lines = entries.len(), "Fetched pod log");
    Ok(entries)
}
