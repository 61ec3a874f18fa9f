use chrono::Utc;
use tracing::debug;

use shiftscope_k8s::{AccessResult, ManagedClusterApi};
use shiftscope_types::{LogEntry, LogLevel, ServiceLogRecord, SourceKind};

pub(super) async fn fetch(
    ocm: &dyn ManagedClusterApi,
    cluster_id: &str,
    limit: usize,
) -> AccessResult<Vec<LogEntry>> {
    let observed_at = Utc::now();
    let mut records = ocm.service_logs(cluster_id).await?;
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    records.truncate(limit);
    debug!(cluster_id, records = records.len(), "Fetched OCM service logs");

    Ok(records
        .into_iter()
        .map(|record| {
            let text = service_log_text(&record);
            let mut entry = LogEntry::new(
                record.timestamp.unwrap_or(observed_at),
                SourceKind::Ocm,
                cluster_id,
                text,
            );
            entry.level = record
                .severity
                .as_deref()
                .map(LogLevel::from_str)
                .unwrap_or_default();
            entry.raw_severity = record.severity;
            entry
        })
        .collect())
}

fn service_log_text(record: &ServiceLogRecord) -> String {
    let mut text = String::new();
    if let Some(service) = record.service_name.as_deref().filter(|s| !s.is_empty()) {
        text.push_str(service);
        text.push_str(": ");
    }
    text.push_str(record.summary.as_deref().unwrap_or("(no summary)"));
    if let Some(description) = record.description.as_deref().filter(|s| !s.is_empty()) {
        text.push_str(" - ");
        text.push_str(description);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use shiftscope_k8s::fake::FakeOcm;

    #[tokio::test]
    async fn test_service_logs_normalized() {
        let ocm = FakeOcm::new().with_log(ServiceLogRecord {
            id: "1".to_string(),
            cluster_id: "abc".to_string(),
            service_name: Some("SREManualAction".to_string()),
            summary: Some("Node replaced".to_string()),
            description: Some("worker-3 failed health checks".to_string()),
            severity: Some("Major".to_string()),
            timestamp: None,
        });

        let entries = fetch(&ocm, "abc", 10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].text,
            "SREManualAction: Node replaced - worker-3 failed health checks"
        );
        assert_eq!(entries[0].level, LogLevel::Warn);
        assert_eq!(entries[0].raw_severity.as_deref(), Some("Major"));
        assert_eq!(entries[0].source_id, "abc");
    }
}
