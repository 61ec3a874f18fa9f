//! Point-in-time health reports for the GPU and DPU stacks.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::service::{SearchOptions, ServiceResult, Shiftscope};
use shiftscope_inventory::{is_gpu_operator, is_network_operator, is_nvidia_operator};
use shiftscope_types::{
    DeviceFamily, ManagedPod, NamespaceScope, NodeHardwareProfile, Operator, OperatorKind,
    PodStatus, SearchResult, WorkloadHardwareUsage,
};

/// Lines of recent error output each report collects
const ERROR_WINDOW: usize = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    NotInstalled,
}

#[derive(Debug, Serialize)]
pub struct GpuHealthSummary {
    pub status: HealthStatus,
    pub operator_installed: bool,
    pub operator_healthy: bool,
    pub total_pods: usize,
    pub running_pods: usize,
    pub gpu_nodes_count: usize,
    pub recent_errors_count: usize,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct GpuOperatorHealth {
    pub operator: Option<Operator>,
    pub pods: Vec<ManagedPod>,
    pub gpu_nodes: Vec<NodeHardwareProfile>,
    pub recent_errors: SearchResult,
    pub summary: GpuHealthSummary,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct DpuHealthSummary {
    pub status: HealthStatus,
    pub network_operator_installed: bool,
    pub network_operator_healthy: bool,
    pub dpu_nodes_count: usize,
    pub dpu_workloads_count: usize,
    pub recent_errors_count: usize,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct DpuHealth {
    pub network_operator: Option<Operator>,
    pub dpu_nodes: Vec<NodeHardwareProfile>,
    pub dpu_workloads: Vec<WorkloadHardwareUsage>,
    pub recent_errors: SearchResult,
    pub summary: DpuHealthSummary,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Whether an operator reports a completed install: CSV phase `Succeeded`
/// for OLM, release status `deployed` for Helm, `Running` for Custom
pub fn operator_healthy(operator: &Operator) -> bool {
    let phase = operator.install_phase.as_deref().unwrap_or_default();
    match operator.kind {
        OperatorKind::Olm => phase == "Succeeded",
        OperatorKind::Helm => phase.eq_ignore_ascii_case("deployed"),
        OperatorKind::Custom => phase == "Running",
    }
}

/// Pick the operator matching `select`, preferring the OLM install
fn pick(operators: &[Operator], select: fn(&Operator) -> bool) -> Option<Operator> {
    operators
        .iter()
        .filter(|op| is_nvidia_operator(op) && select(op))
        .min_by_key(|op| op.kind)
        .cloned()
}

fn errors_options() -> SearchOptions {
    SearchOptions {
        max_lines: Some(ERROR_WINDOW),
        ..Default::default()
    }
}

impl Shiftscope {
    pub async fn gpu_operator_health(
        &self,
        cancel: &CancellationToken,
    ) -> ServiceResult<GpuOperatorHealth> {
        let mut warnings = Vec::new();
        let errors_opts = errors_options();
        let (classification, nodes, recent_errors) = tokio::join!(
            self.classifier().classify(&NamespaceScope::All),
            self.tagger().nodes_with(DeviceFamily::Gpu),
            self.search_gpu_logs("error", "all", &errors_opts, cancel),
        );
        warnings.extend(classification.warnings);

        let operator = pick(&classification.operators, is_gpu_operator);
        let pods = match &operator {
            Some(op) => match self.resolver().resolve_pods(op).await {
                Ok(pods) => pods,
                Err(e) => {
                    warn!(operator = %op.key(), error = %e, "GPU operator pods unavailable");
                    warnings.push(format!("pods: {}", e.reason()));
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        let gpu_nodes = nodes.unwrap_or_else(|e| {
            warn!(error = %e, "GPU nodes unavailable");
            warnings.push(format!("nodes: {}", e.reason()));
            Vec::new()
        });
        let recent_errors = recent_errors?;

        let operator_healthy = operator.as_ref().is_some_and(operator_healthy);
        let running_pods = pods.iter().filter(|p| p.status == PodStatus::Running).count();
        let status = match &operator {
            None => HealthStatus::NotInstalled,
            Some(_)
                if operator_healthy && running_pods == pods.len() && recent_errors.is_empty() =>
            {
                HealthStatus::Healthy
            }
            Some(_) => HealthStatus::Degraded,
        };

        let summary = GpuHealthSummary {
            status,
            operator_installed: operator.is_some(),
            operator_healthy,
            total_pods: pods.len(),
            running_pods,
            gpu_nodes_count: gpu_nodes.len(),
            recent_errors_count: recent_errors.len(),
            checked_at: Utc::now(),
        };
        info!(status = ?summary.status, pods = summary.total_pods, "GPU operator health checked");

        Ok(GpuOperatorHealth {
            operator,
            pods,
            gpu_nodes,
            recent_errors,
            summary,
            warnings,
        })
    }

    pub async fn dpu_health(&self, cancel: &CancellationToken) -> ServiceResult<DpuHealth> {
        let mut warnings = Vec::new();
        let errors_opts = errors_options();
        let (classification, nodes, workloads, recent_errors) = tokio::join!(
            self.classifier().classify(&NamespaceScope::All),
            self.tagger().nodes_with(DeviceFamily::Dpu),
            self.tagger()
                .workloads_with(DeviceFamily::Dpu, &NamespaceScope::All),
            self.search_dpu_logs("error", "all", &errors_opts, cancel),
        );
        warnings.extend(classification.warnings);

        let network_operator = pick(&classification.operators, is_network_operator);
        let dpu_nodes = nodes.unwrap_or_else(|e| {
            warn!(error = %e, "DPU nodes unavailable");
            warnings.push(format!("nodes: {}", e.reason()));
            Vec::new()
        });
        let dpu_workloads = workloads.unwrap_or_else(|e| {
            warn!(error = %e, "DPU workloads unavailable");
            warnings.push(format!("workloads: {}", e.reason()));
            Vec::new()
        });
        let recent_errors = recent_errors?;

        let network_operator_healthy = network_operator.as_ref().is_some_and(operator_healthy);
        let status = if network_operator.is_none() && dpu_nodes.is_empty() {
            HealthStatus::NotInstalled
        } else if recent_errors.is_empty()
            && network_operator.as_ref().is_none_or(operator_healthy)
        {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };

        let summary = DpuHealthSummary {
            status,
            network_operator_installed: network_operator.is_some(),
            network_operator_healthy,
            dpu_nodes_count: dpu_nodes.len(),
            dpu_workloads_count: dpu_workloads.len(),
            recent_errors_count: recent_errors.len(),
            checked_at: Utc::now(),
        };
        info!(status = ?summary.status, nodes = summary.dpu_nodes_count, "DPU health checked");

        Ok(DpuHealth {
            network_operator,
            dpu_nodes,
            dpu_workloads,
            recent_errors,
            summary,
            warnings,
        })
    }
}
