use chrono::Utc;
use tracing::debug;

use shiftscope_k8s::{AccessResult, ClusterAccess};
use shiftscope_types::{EventInfo, LogEntry, LogLevel, NamespaceScope, SourceKind};

/// Restricts events to those whose involved object name contains one of
/// the needles (case-insensitive)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvolvedFilter {
    needles: Vec<String>,
}

impl InvolvedFilter {
    pub fn new(needles: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        Self {
            needles: needles
                .into_iter()
                .map(|n| n.as_ref().to_lowercase())
                .filter(|n| !n.is_empty())
                .collect(),
        }
    }

    pub fn matches(&self, event: &EventInfo) -> bool {
        let name = event.involved_name.to_lowercase();
        self.needles.iter().any(|needle| name.contains(needle))
    }
}

pub(super) async fn fetch(
    cluster: &dyn ClusterAccess,
    scope: &NamespaceScope,
    involved: Option<&InvolvedFilter>,
    limit: usize,
) -> AccessResult<Vec<LogEntry>> {
    let observed_at = Utc::now();
    let mut events: Vec<EventInfo> = cluster
        .list_events(scope)
        .await?
        .into_iter()
        .filter(|e| involved.is_none_or(|f| f.matches(e)))
        .collect();

    // Newest first
    events.sort_by(|a, b| b.last_timestamp.cmp(&a.last_timestamp));
    events.truncate(limit);
    debug!(scope = %scope, events = events.len(), "Fetched events");

    Ok(events
        .into_iter()
        .map(|event| {
            let source_id = format!(
                "{}/{}/{}",
                event.namespace, event.involved_kind, event.involved_name
            );
            let event_type = event.event_type.as_deref().unwrap_or("Normal");
            let mut text = format!(
                "{event_type} {}: {}",
                event.reason.as_deref().unwrap_or("-"),
                event.message.as_deref().unwrap_or_default().trim()
            );
            if let Some(count) = event.count.filter(|c| *c > 1) {
                text.push_str(&format!(" (x{count})"));
            }

            let mut entry = LogEntry::new(
                event.last_timestamp.unwrap_or(observed_at),
                SourceKind::Event,
                source_id,
                text,
            );
            entry.level = match LogLevel::from_str(event_type) {
                LogLevel::Unknown => LogLevel::Info,
                level => level,
            };
            entry.raw_severity = event.event_type;
            entry
        })
        .collect())
}
