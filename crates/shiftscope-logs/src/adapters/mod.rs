//! Log source adapters.
//!
//! Each backend's records are normalized into [`LogEntry`] values here;
//! nothing past this module sees a backend-specific shape.

mod build;
mod event;
mod ocm;
mod pod;

use std::sync::Arc;

use thiserror::Error;

use shiftscope_k8s::{AccessError, ClusterAccess, ManagedClusterApi};
use shiftscope_types::{LogEntry, NamespaceScope, SourceKind};

pub use event::InvolvedFilter;

/// One concurrent unit of fetch work
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchUnit {
    Pod {
        namespace: String,
        pod: String,
        container: String,
    },
    Build {
        namespace: String,
        build: String,
    },
    Event {
        scope: NamespaceScope,
        involved: Option<InvolvedFilter>,
    },
    Ocm {
        cluster_id: String,
    },
}

impl FetchUnit {
    pub fn kind(&self) -> SourceKind {
        match self {
            Self::Pod { .. } => SourceKind::Pod,
            Self::Build { .. } => SourceKind::Build,
            Self::Event { .. } => SourceKind::Event,
            Self::Ocm { .. } => SourceKind::Ocm,
        }
    }
}

impl std::fmt::Display for FetchUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pod {
                namespace,
                pod,
                container,
            } => write!(f, "pod {namespace}/{pod}/{container}"),
            Self::Build { namespace, build } => write!(f, "build {namespace}/{build}"),
            Self::Event { scope, .. } => write!(f, "events in {scope}"),
            Self::Ocm { cluster_id } => write!(f, "ocm cluster {cluster_id}"),
        }
    }
}

/// Why a source contributed nothing
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SourceError {
    #[error("{kind}: {err}")]
    Access { kind: SourceKind, err: AccessError },

    #[error("{0}: deadline exceeded")]
    DeadlineExceeded(SourceKind),

    #[error("{0}: cancelled")]
    Cancelled(SourceKind),

    #[error("{0}: not configured")]
    NotConfigured(SourceKind),
}

impl SourceError {
    pub fn access(kind: SourceKind, err: AccessError) -> Self {
        Self::Access { kind, err }
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            Self::Access { kind, .. } => *kind,
            Self::DeadlineExceeded(kind) | Self::Cancelled(kind) | Self::NotConfigured(kind) => {
                *kind
            }
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::Access { err, .. } => err.reason(),
            Self::DeadlineExceeded(_) => "deadline exceeded",
            Self::Cancelled(_) => "cancelled",
            Self::NotConfigured(_) => "not configured",
        }
    }

    /// Whether the source kind counts as failed. Absent resources and
    /// unconfigured backends only warn.
    pub fn marks_failed(&self) -> bool {
        match self {
            Self::Access { err, .. } => !err.is_not_found(),
            Self::DeadlineExceeded(_) | Self::Cancelled(_) => true,
            Self::NotConfigured(_) => false,
        }
    }

    /// `"<kind>: <reason>"`
    pub fn warning(&self) -> String {
        format!("{}: {}", self.kind(), self.reason())
    }
}

/// Entries one unit contributed
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Batch {
    /// At most `max_lines`, the newest ones
    pub entries: Vec<LogEntry>,
    /// The source held more than `max_lines` entries
    pub capped: bool,
}

/// Dispatches fetch units to the backend adapters
#[derive(Clone)]
pub struct Adapters {
    cluster: Arc<dyn ClusterAccess>,
    ocm: Option<Arc<dyn ManagedClusterApi>>,
}

impl Adapters {
    pub fn new(cluster: Arc<dyn ClusterAccess>, ocm: Option<Arc<dyn ManagedClusterApi>>) -> Self {
        Self { cluster, ocm }
    }

    pub fn has_ocm(&self) -> bool {
        self.ocm.is_some()
    }

    /// Fetch at most `max_lines` entries, the newest ones, for a unit.
    /// Backends are asked for one entry more so a cut is detectable.
    pub async fn fetch(&self, unit: &FetchUnit, max_lines: usize) -> Result<Batch, SourceError> {
        let limit = max_lines.saturating_add(1);
        let entries = match unit {
            FetchUnit::Pod {
                namespace,
                pod,
                container,
            } => pod::fetch(self.cluster.as_ref(), namespace, pod, container, limit).await,
            FetchUnit::Build { namespace, build } => {
                build::fetch(self.cluster.as_ref(), namespace, build, limit).await
            }
            FetchUnit::Event { scope, involved } => {
                event::fetch(self.cluster.as_ref(), scope, involved.as_ref(), limit).await
            }
            FetchUnit::Ocm { cluster_id } => match &self.ocm {
                Some(ocm) => ocm::fetch(ocm.as_ref(), cluster_id, limit).await,
                None => return Err(SourceError::NotConfigured(SourceKind::Ocm)),
            },
        };
        let entries = entries.map_err(|err| SourceError::access(unit.kind(), err))?;
        Ok(newest(entries, max_lines))
    }
}

/// Sort a batch and keep its newest `max_lines` entries
fn newest(mut entries: Vec<LogEntry>, max_lines: usize) -> Batch {
    entries.sort_by(|a, b| a.cmp_order(b));
    let excess = entries.len().saturating_sub(max_lines);
    entries.drain(..excess);
    Batch {
        entries,
        capped: excess > 0,
    }
}

/// Last `lines` non-blank lines of a text
fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}
