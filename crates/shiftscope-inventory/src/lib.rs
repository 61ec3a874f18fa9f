//! Resource classification for shiftscope
//!
//! This crate turns raw cluster records into the operator taxonomy, resolves
//! which pods belong to an operator, and tags accelerator hardware.

mod classifier;
mod hardware;
mod nvidia;
mod ownership;

pub use classifier::{
    CandidateRecords, Classification, OperatorClassifier, classify_records, find_by_name,
    find_or_adhoc, looks_like_operator,
};
pub use hardware::{HardwareTagger, family_of, profile_node, workload_usage};
pub use nvidia::{NVIDIA_KEYWORDS, is_gpu_operator, is_network_operator, is_nvidia_operator};
pub use ownership::{ClaimedPods, OwnershipResolver, PodInventory, claim, resolve_in};

/// Annotation Helm 3 stamps on every object it renders
pub(crate) const HELM_RELEASE_ANNOTATION: &str = "meta.helm.sh/release-name";

/// Label OLM sets on the workloads a CSV deploys
pub(crate) const OLM_OWNER_LABEL: &str = "olm.owner";

pub(crate) const CSV_KIND: &str = "ClusterServiceVersion";
