//! Shared types for shiftscope
//!
//! This crate contains the data structures used across multiple shiftscope
//! crates. Everything here is a query-scoped value object: records are
//! derived from live cluster state on every call and dropped afterwards.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Kubernetes Resource Types
// ============================================================================

/// Owner reference on a Kubernetes object
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OwnerRef {
    pub kind: String,
    pub name: String,
    pub controller: bool,
}

impl OwnerRef {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            controller: true,
        }
    }
}

/// Pod information
#[derive(Clone, Debug, Serialize)]
pub struct PodInfo {
    pub name: String,
    pub namespace: String,
    pub status: PodStatus,
    pub labels: BTreeMap<String, String>,
    pub owners: Vec<OwnerRef>,
    pub containers: Vec<ContainerInfo>,
    pub node_name: Option<String>,
}

impl PodInfo {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            status: PodStatus::Unknown,
            labels: BTreeMap::new(),
            owners: Vec::new(),
            containers: Vec::new(),
            node_name: None,
        }
    }

    /// The controlling owner, or the first owner when none is marked controller
    pub fn controller_owner(&self) -> Option<&OwnerRef> {
        self.owners
            .iter()
            .find(|o| o.controller)
            .or_else(|| self.owners.first())
    }

    /// Regular (non-init) containers, the ones that produce log streams
    pub fn app_containers(&self) -> impl Iterator<Item = &ContainerInfo> {
        self.containers.iter().filter(|c| !c.init)
    }

    pub fn ready_count(&self) -> usize {
        self.app_containers().filter(|c| c.ready).count()
    }

    pub fn container_count(&self) -> usize {
        self.app_containers().count()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum PodStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl From<&str> for PodStatus {
    fn from(s: &str) -> Self {
        match s {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

/// Container spec and status, merged by name
#[derive(Clone, Debug, Serialize)]
pub struct ContainerInfo {
    pub name: String,
    pub image: Option<String>,
    pub init: bool,
    pub ready: bool,
    pub restart_count: i32,
    pub requests: BTreeMap<String, String>,
    pub limits: BTreeMap<String, String>,
}

impl ContainerInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: None,
            init: false,
            ready: false,
            restart_count: 0,
            requests: BTreeMap::new(),
            limits: BTreeMap::new(),
        }
    }
}

/// Kind of pod-owning controller an operator can run as
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
    DaemonSet,
}

impl WorkloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deployment => "Deployment",
            Self::StatefulSet => "StatefulSet",
            Self::DaemonSet => "DaemonSet",
        }
    }

    /// Map an owner-reference kind to a workload kind
    pub fn from_owner_kind(kind: &str) -> Option<Self> {
        match kind {
            "Deployment" => Some(Self::Deployment),
            "StatefulSet" => Some(Self::StatefulSet),
            "DaemonSet" => Some(Self::DaemonSet),
            _ => None,
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deployment, StatefulSet or DaemonSet information
#[derive(Clone, Debug, Serialize)]
pub struct WorkloadInfo {
    pub kind: WorkloadKind,
    pub name: String,
    pub namespace: String,
    pub replicas: i32,
    pub ready_replicas: i32,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub selector: BTreeMap<String, String>,
    pub owners: Vec<OwnerRef>,
    pub images: Vec<String>,
}

impl WorkloadInfo {
    pub fn new(kind: WorkloadKind, name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            namespace: namespace.into(),
            replicas: 0,
            ready_replicas: 0,
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            selector: BTreeMap::new(),
            owners: Vec::new(),
            images: Vec::new(),
        }
    }

    /// Format replica status as "ready/total"
    pub fn replica_status(&self) -> String {
        format!("{}/{}", self.ready_replicas, self.replicas)
    }
}

/// ReplicaSet information, kept only for walking owner chains
#[derive(Clone, Debug)]
pub struct ReplicaSetInfo {
    pub name: String,
    pub namespace: String,
    pub owners: Vec<OwnerRef>,
}

/// Node information
#[derive(Clone, Debug, Default)]
pub struct NodeInfo {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub capacity: BTreeMap<String, String>,
    pub allocatable: BTreeMap<String, String>,
    pub ready: Option<bool>,
}

impl NodeInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Cluster event, with the most precise timestamp the event carries
#[derive(Clone, Debug)]
pub struct EventInfo {
    pub namespace: String,
    pub involved_kind: String,
    pub involved_name: String,
    pub reason: Option<String>,
    pub message: Option<String>,
    pub event_type: Option<String>,
    pub count: Option<i32>,
    pub last_timestamp: Option<DateTime<Utc>>,
}

/// OLM Subscription
#[derive(Clone, Debug, Default)]
pub struct SubscriptionInfo {
    pub name: String,
    pub namespace: String,
    pub package: Option<String>,
    pub channel: Option<String>,
    pub catalog_source: Option<String>,
    pub current_csv: Option<String>,
    pub installed_csv: Option<String>,
}

/// OLM ClusterServiceVersion
#[derive(Clone, Debug, Default)]
pub struct CsvInfo {
    pub name: String,
    pub namespace: String,
    pub display_name: Option<String>,
    pub version: Option<String>,
    pub phase: Option<String>,
}

/// Helm release metadata, as recorded on the release storage object
#[derive(Clone, Debug, Default)]
pub struct HelmReleaseInfo {
    pub name: String,
    pub namespace: String,
    pub revision: Option<u32>,
    pub status: Option<String>,
}

/// OpenShift Build
#[derive(Clone, Debug, Default)]
pub struct BuildInfo {
    pub name: String,
    pub namespace: String,
    pub config_name: Option<String>,
    pub number: Option<u64>,
    pub phase: Option<String>,
    pub created: Option<DateTime<Utc>>,
}

/// OpenShift ClusterVersion summary
#[derive(Clone, Debug, Default, Serialize)]
pub struct ClusterVersionInfo {
    pub version: Option<String>,
    pub cluster_id: Option<String>,
    pub channel: Option<String>,
}

/// Cluster managed through OCM
#[derive(Clone, Debug, Default, Serialize)]
pub struct ManagedCluster {
    pub id: String,
    pub name: String,
    pub state: Option<String>,
    pub api_url: Option<String>,
    pub console_url: Option<String>,
    pub openshift_version: Option<String>,
    pub product: Option<String>,
    pub cloud_provider: Option<String>,
    pub region: Option<String>,
}

/// OCM service-log record
#[derive(Clone, Debug, Default)]
pub struct ServiceLogRecord {
    pub id: String,
    pub cluster_id: String,
    pub service_name: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub severity: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

// ============================================================================
// Projects and Namespace Resources
// ============================================================================

/// OpenShift project with the quotas that apply to it
#[derive(Clone, Debug, Default, Serialize)]
pub struct ProjectInfo {
    pub name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    /// `Active` or `Terminating`
    pub phase: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub quotas: Vec<QuotaInfo>,
}

/// ResourceQuota status: hard limits and current usage per resource
#[derive(Clone, Debug, Default, Serialize)]
pub struct QuotaInfo {
    pub name: String,
    pub namespace: String,
    pub hard: BTreeMap<String, String>,
    pub used: BTreeMap<String, String>,
}

/// Namespaced resource kinds that can be listed read-only
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Route,
    Service,
    ConfigMap,
    Secret,
    ImageStream,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Route => "routes",
            Self::Service => "services",
            Self::ConfigMap => "configmaps",
            Self::Secret => "secrets",
            Self::ImageStream => "imagestreams",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "route" | "routes" => Ok(Self::Route),
            "service" | "services" | "svc" => Ok(Self::Service),
            "configmap" | "configmaps" | "cm" => Ok(Self::ConfigMap),
            "secret" | "secrets" => Ok(Self::Secret),
            "imagestream" | "imagestreams" | "is" => Ok(Self::ImageStream),
            other => Err(QueryError::InvalidScope(format!("resource kind '{other}'"))),
        }
    }
}

/// OpenShift Route
#[derive(Clone, Debug, Default, Serialize)]
pub struct RouteInfo {
    pub host: Option<String>,
    pub path: Option<String>,
    pub target_service: Option<String>,
    pub target_port: Option<String>,
    pub tls: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ServicePortInfo {
    pub name: Option<String>,
    pub port: i32,
    pub target_port: Option<String>,
    pub protocol: Option<String>,
}

/// Core Service
#[derive(Clone, Debug, Default, Serialize)]
pub struct ServiceInfo {
    pub service_type: Option<String>,
    pub cluster_ip: Option<String>,
    pub ports: Vec<ServicePortInfo>,
    pub selector: BTreeMap<String, String>,
}

/// OpenShift ImageStream
#[derive(Clone, Debug, Default, Serialize)]
pub struct ImageStreamInfo {
    pub repository: Option<String>,
    pub tags: Vec<String>,
}

/// Kind-specific part of a listed resource. Secrets and ConfigMaps only
/// ever expose their data keys, never values.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ResourceDetail {
    Route(RouteInfo),
    Service(ServiceInfo),
    ConfigMap { data_keys: Vec<String> },
    Secret {
        secret_type: Option<String>,
        data_keys: Vec<String>,
    },
    ImageStream(ImageStreamInfo),
}

impl ResourceDetail {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Route(_) => ResourceKind::Route,
            Self::Service(_) => ResourceKind::Service,
            Self::ConfigMap { .. } => ResourceKind::ConfigMap,
            Self::Secret { .. } => ResourceKind::Secret,
            Self::ImageStream(_) => ResourceKind::ImageStream,
        }
    }
}

/// One namespaced resource in a listing
#[derive(Clone, Debug, Serialize)]
pub struct ResourceRecord {
    pub name: String,
    pub namespace: String,
    pub created: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub detail: ResourceDetail,
}

impl ResourceRecord {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        detail: ResourceDetail,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            created: None,
            detail,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.detail.kind()
    }
}

// ============================================================================
// Query Scopes
// ============================================================================

/// Errors a caller can cause before any backend is contacted
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("invalid scope: {0}")]
    InvalidScope(String),

    #[error("invalid limit: max_lines must be at least 1")]
    InvalidLimit,

    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

/// A single namespace or the whole cluster
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NamespaceScope {
    All,
    Namespace(String),
}

impl NamespaceScope {
    pub fn namespace(name: impl Into<String>) -> Self {
        Self::Namespace(name.into())
    }

    pub fn as_namespace(&self) -> Option<&str> {
        match self {
            Self::All => None,
            Self::Namespace(ns) => Some(ns),
        }
    }

    pub fn contains(&self, namespace: &str) -> bool {
        match self {
            Self::All => true,
            Self::Namespace(ns) => ns == namespace,
        }
    }
}

impl FromStr for NamespaceScope {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        // RFC 1123 label, which is what the API server accepts for namespaces
        let valid = !s.is_empty()
            && s.len() <= 63
            && s.bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
            && !s.starts_with('-')
            && !s.ends_with('-');
        if valid {
            Ok(Self::Namespace(s.to_string()))
        } else {
            Err(QueryError::InvalidScope(format!("namespace '{s}'")))
        }
    }
}

impl fmt::Display for NamespaceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Namespace(ns) => f.write_str(ns),
        }
    }
}

/// Set of log source kinds a query may consult
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceTypeScope(BTreeSet<SourceKind>);

impl ResourceTypeScope {
    pub fn all() -> Self {
        Self(SourceKind::ALL.into_iter().collect())
    }

    pub fn only(kinds: impl IntoIterator<Item = SourceKind>) -> Self {
        Self(kinds.into_iter().collect())
    }

    pub fn contains(&self, kind: SourceKind) -> bool {
        self.0.contains(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = SourceKind> + '_ {
        self.0.iter().copied()
    }

    pub fn intersect(&self, other: &Self) -> Self {
        Self(self.0.intersection(&other.0).copied().collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromStr for ResourceTypeScope {
    type Err = QueryError;

    /// Accepts "all" or a comma-separated list such as "pod,event"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut kinds = BTreeSet::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            if part.eq_ignore_ascii_case("all") {
                return Ok(Self::all());
            }
            kinds.insert(part.parse::<SourceKind>()?);
        }
        if kinds.is_empty() {
            return Err(QueryError::InvalidScope(format!("resource types '{s}'")));
        }
        Ok(Self(kinds))
    }
}

// ============================================================================
// Operator Model
// ============================================================================

/// How an operator was installed. Variant order is classification precedence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum OperatorKind {
    #[serde(rename = "OLM")]
    Olm,
    Helm,
    Custom,
}

impl OperatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Olm => "OLM",
            Self::Helm => "Helm",
            Self::Custom => "Custom",
        }
    }
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of an operator within one query
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct OperatorKey {
    pub namespace: String,
    pub name: String,
    pub kind: OperatorKind,
}

impl fmt::Display for OperatorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

/// The record an operator was classified from
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceRef {
    Subscription {
        name: String,
        csv: Option<String>,
    },
    HelmRelease {
        name: String,
        revision: Option<u32>,
    },
    Workload {
        kind: WorkloadKind,
        name: String,
    },
}

#[derive(Clone, Debug, Serialize)]
pub struct Operator {
    pub name: String,
    pub namespace: String,
    pub kind: OperatorKind,
    pub source_ref: SourceRef,
    pub display_name: Option<String>,
    pub version: Option<String>,
    pub install_phase: Option<String>,
    /// OLM package name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog_source: Option<String>,
    /// Ready/desired replicas for Custom operators
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

impl Operator {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        kind: OperatorKind,
        source_ref: SourceRef,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            kind,
            source_ref,
            display_name: None,
            version: None,
            install_phase: None,
            package: None,
            channel: None,
            catalog_source: None,
            replicas: None,
            images: Vec::new(),
        }
    }

    pub fn key(&self) -> OperatorKey {
        OperatorKey {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            kind: self.kind,
        }
    }
}

/// Which ownership heuristic attached a pod to its operator.
/// Variant order is the order the heuristics are tried in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    OwnerChain,
    LabelSelector,
    NamePrefix,
}

#[derive(Clone, Debug, Serialize)]
pub struct ManagedPod {
    pub name: String,
    pub namespace: String,
    /// Informational back-reference; the operator does not own the pod record
    pub owner_operator: OperatorKey,
    pub matched_by: Resolution,
    pub status: PodStatus,
    pub ready_count: usize,
    pub container_count: usize,
    pub node_name: Option<String>,
}

// ============================================================================
// Hardware Model
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceFamily {
    Gpu,
    Dpu,
}

/// Device families detected on a node or requested by a workload
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DeviceFamilies {
    pub gpu: bool,
    pub dpu: bool,
}

impl DeviceFamilies {
    pub fn insert(&mut self, family: DeviceFamily) {
        match family {
            DeviceFamily::Gpu => self.gpu = true,
            DeviceFamily::Dpu => self.dpu = true,
        }
    }

    pub fn contains(&self, family: DeviceFamily) -> bool {
        match family {
            DeviceFamily::Gpu => self.gpu,
            DeviceFamily::Dpu => self.dpu,
        }
    }

    pub fn is_none(&self) -> bool {
        !self.gpu && !self.dpu
    }

    pub fn label(&self) -> &'static str {
        match (self.gpu, self.dpu) {
            (true, true) => "gpu+dpu",
            (true, false) => "gpu",
            (false, true) => "dpu",
            (false, false) => "none",
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct NodeHardwareProfile {
    pub node_name: String,
    pub labels: BTreeMap<String, String>,
    pub capacity_resources: BTreeMap<String, String>,
    pub device_family: DeviceFamilies,
    /// Vendor labels that describe the hardware but do not drive tagging
    pub extended_tags: BTreeMap<String, String>,
    pub ready: Option<bool>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PodRef {
    pub namespace: String,
    pub name: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct WorkloadHardwareUsage {
    pub pod_ref: PodRef,
    pub status: PodStatus,
    pub node_name: Option<String>,
    pub device_family: DeviceFamilies,
    pub requests: BTreeMap<String, String>,
    pub limits: BTreeMap<String, String>,
}

// ============================================================================
// Log Types
// ============================================================================

/// Log severity level
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
    #[default]
    Unknown,
}

impl LogLevel {
    /// Parse log level from common formats
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trace" | "trc" | "trce" => Self::Trace,
            "debug" | "dbg" | "debg" => Self::Debug,
            "info" | "inf" | "information" | "normal" => Self::Info,
            "warn" | "warning" | "wrn" | "major" => Self::Warn,
            "error" | "err" | "erro" => Self::Error,
            "fatal" | "panic" | "critical" | "crit" | "ftl" => Self::Fatal,
            _ => Self::Unknown,
        }
    }

    /// Short display string (3 chars)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "TRC",
            Self::Debug => "DBG",
            Self::Info => "INF",
            Self::Warn => "WRN",
            Self::Error => "ERR",
            Self::Fatal => "FTL",
            Self::Unknown => "???",
        }
    }

    /// Ordinal for threshold comparisons; unknown ranks as info
    pub fn severity(&self) -> u8 {
        match self {
            Self::Trace => 0,
            Self::Debug => 1,
            Self::Info | Self::Unknown => 2,
            Self::Warn => 3,
            Self::Error => 4,
            Self::Fatal => 5,
        }
    }
}

impl Serialize for LogLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Backend a log entry came from. Variants are declared in lexical order of
/// their names so the derived `Ord` is the documented tie-break.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourceKind {
    Build,
    Event,
    Ocm,
    Pod,
}

impl SourceKind {
    pub const ALL: [SourceKind; 4] = [Self::Build, Self::Event, Self::Ocm, Self::Pod];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Event => "event",
            Self::Ocm => "ocm",
            Self::Pod => "pod",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SourceKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pod" | "pods" => Ok(Self::Pod),
            "build" | "builds" => Ok(Self::Build),
            "event" | "events" => Ok(Self::Event),
            "ocm" => Ok(Self::Ocm),
            other => Err(QueryError::InvalidScope(format!("resource type '{other}'"))),
        }
    }
}

/// A single normalized log entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub source_kind: SourceKind,
    /// `namespace/pod/container`, `namespace/build`, `namespace/object` or a cluster id
    pub source_id: String,
    pub text: String,
    /// Severity exactly as the backend reported it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_severity: Option<String>,
    pub level: LogLevel,
}

impl LogEntry {
    pub fn new(
        timestamp: DateTime<Utc>,
        source_kind: SourceKind,
        source_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            source_kind,
            source_id: source_id.into(),
            text: text.into(),
            raw_severity: None,
            level: LogLevel::Unknown,
        }
    }

    /// Total order: timestamp, then source kind, then source id
    pub fn cmp_order(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then(self.source_kind.cmp(&other.source_kind))
            .then_with(|| self.source_id.cmp(&other.source_id))
    }
}

/// Counts per log level
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LevelCounts {
    pub trace: usize,
    pub debug: usize,
    pub info: usize,
    pub warn: usize,
    pub error: usize,
    pub fatal: usize,
    pub unknown: usize,
}

impl LevelCounts {
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a LogEntry>) -> Self {
        let mut counts = Self::default();
        for entry in entries {
            match entry.level {
                LogLevel::Trace => counts.trace += 1,
                LogLevel::Debug => counts.debug += 1,
                LogLevel::Info => counts.info += 1,
                LogLevel::Warn => counts.warn += 1,
                LogLevel::Error => counts.error += 1,
                LogLevel::Fatal => counts.fatal += 1,
                LogLevel::Unknown => counts.unknown += 1,
            }
        }
        counts
    }
}

/// Merged, filtered and windowed result of a log query, newest entry first
#[derive(Clone, Debug, Default, Serialize)]
pub struct SearchResult {
    pub entries: Vec<LogEntry>,
    pub truncated: bool,
    pub warnings: Vec<String>,
    pub failed_sources: BTreeSet<SourceKind>,
    pub sources_queried: usize,
    pub level_counts: LevelCounts,
}

impl SearchResult {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
