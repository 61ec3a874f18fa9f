//! NVIDIA operator selection.

use shiftscope_types::Operator;

/// Keywords that mark an operator as part of the NVIDIA accelerator stack
pub const NVIDIA_KEYWORDS: &[&str] = &["nvidia", "gpu", "cuda", "mellanox", "connectx"];

fn haystack(operator: &Operator) -> String {
    [
        Some(operator.name.as_str()),
        Some(operator.namespace.as_str()),
        operator.package.as_deref(),
        operator.display_name.as_deref(),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(" ")
    .to_lowercase()
}

pub fn is_nvidia_operator(operator: &Operator) -> bool {
    let text = haystack(operator);
    NVIDIA_KEYWORDS.iter().any(|k| text.contains(k))
}

/// The NVIDIA GPU Operator (certified or community build)
pub fn is_gpu_operator(operator: &Operator) -> bool {
    let text = haystack(operator);
    text.contains("gpu-operator") || text.contains("gpu operator")
}

/// The NVIDIA Network Operator, which manages DPU and ConnectX drivers
pub fn is_network_operator(operator: &Operator) -> bool {
    let text = haystack(operator);
    text.contains("network-operator") || text.contains("network operator")
}
