use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::adapters::SourceError;
use shiftscope_types::SourceKind;

#[derive(Default)]
struct Inner {
    warnings: BTreeSet<String>,
    failed: BTreeSet<SourceKind>,
    capped: bool,
}

/// What the side channel collected over one query
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    pub warnings: Vec<String>,
    pub failed: BTreeSet<SourceKind>,
    /// Some source or source listing was cut short
    pub capped: bool,
}

/// Per-query side channel collecting source failures while units run
#[derive(Clone, Default)]
pub struct Diagnostics {
    inner: Arc<Mutex<Inner>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, error: &SourceError) {
        warn!(kind = %error.kind(), error = %error, "Log source degraded");
        let mut inner = self.inner.lock();
        inner.warnings.insert(error.warning());
        if error.marks_failed() {
            inner.failed.insert(error.kind());
        }
    }

    /// Record a warning that does not fail the source
    pub fn note(&self, kind: SourceKind, reason: &str) {
        self.inner.lock().warnings.insert(format!("{kind}: {reason}"));
    }

    /// Mark that a source held more entries than it contributed
    pub fn capped(&self) {
        self.inner.lock().capped = true;
    }

    /// Deduplicated, sorted warnings, failed kinds and the capped bit
    pub fn snapshot(&self) -> Snapshot {
        let inner = self.inner.lock();
        Snapshot {
            warnings: inner.warnings.iter().cloned().collect(),
            failed: inner.failed.clone(),
            capped: inner.capped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shiftscope_k8s::AccessError;

    #[test]
    fn test_warnings_deduplicated() {
        let diagnostics = Diagnostics::new();
        let err = SourceError::access(SourceKind::Pod, AccessError::Forbidden("pods".to_string()));
        diagnostics.record(&err);
        diagnostics.record(&err);
        diagnostics.record(&SourceError::NotConfigured(SourceKind::Ocm));

        let snapshot = diagnostics.snapshot();
        assert_eq!(snapshot.warnings, vec!["ocm: not configured", "pod: access denied"]);
        assert_eq!(snapshot.failed.into_iter().collect::<Vec<_>>(), vec![SourceKind::Pod]);
        assert!(!snapshot.capped);

        diagnostics.capped();
        assert!(diagnostics.snapshot().capped);
    }
}
