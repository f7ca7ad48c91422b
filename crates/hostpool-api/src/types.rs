use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ── Pools ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct GpuTypesResponse {
    pub gpu_types: Vec<String>,
}

/// Payload of `GET /api/aggregates/{gpu_type}`.
///
/// Every sub-pool is optional: the backend omits columns it could not
/// resolve for a GPU type rather than failing the whole request.
#[derive(Debug, Clone, Deserialize)]
pub struct AggregatesResponse {
    pub gpu_type: String,
    #[serde(default)]
    pub ondemand: Option<SubPoolPayload>,
    #[serde(default)]
    pub runpod: Option<SubPoolPayload>,
    #[serde(default)]
    pub spot: Option<SubPoolPayload>,
    #[serde(default)]
    pub contracts: Option<SubPoolPayload>,
    #[serde(default)]
    pub outofstock: Option<SubPoolPayload>,
    #[serde(default)]
    pub gpu_overview: Option<GpuOverview>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubPoolPayload {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub hosts: Vec<HostPayload>,
    #[serde(default)]
    pub gpu_summary: GpuSummary,
    #[serde(default)]
    pub variants: Vec<VariantPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VariantPayload {
    pub aggregate: String,
    pub variant: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostPayload {
    pub name: String,
    #[serde(default)]
    pub vm_count: u32,
    #[serde(default)]
    pub tenant: Option<String>,
    #[serde(default)]
    pub owner_group: Option<String>,
    #[serde(default)]
    pub nvlinks: bool,
    #[serde(default)]
    pub gpu_used: u32,
    #[serde(default)]
    pub gpu_capacity: u32,
    #[serde(default)]
    pub variant: Option<String>,
    #[serde(default)]
    pub contract_aggregate: Option<String>,
    #[serde(default)]
    pub contract_name: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct GpuSummary {
    #[serde(default)]
    pub gpu_used: u32,
    #[serde(default)]
    pub gpu_capacity: u32,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct GpuOverview {
    pub total_gpu_used: u32,
    pub total_gpu_capacity: u32,
    #[serde(default)]
    pub gpu_usage_percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetAggregateRequest {
    pub hostname: String,
    pub target_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_variant: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetAggregateResponse {
    #[serde(default)]
    pub target_aggregate: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

// ── Migrations ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct MigrationRequest {
    pub host: String,
    pub source_aggregate: String,
    pub target_aggregate: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MigrationPreviewResponse {
    #[serde(default)]
    pub commands: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteMigrationResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub results: Vec<CommandOutput>,
}

/// One backend-side command and what it printed.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandOutput {
    pub command: String,
    pub success: bool,
    #[serde(default)]
    pub output: String,
}

// ── Runpod launches ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct LaunchRequest {
    pub hostname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LaunchPreviewResponse {
    #[serde(default)]
    pub vm_name: Option<String>,
    #[serde(default)]
    pub flavor_name: Option<String>,
    #[serde(default)]
    pub gpu_type: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteLaunchResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub vm_id: Option<serde_json::Value>,
    #[serde(default)]
    pub vm_name: Option<String>,
    #[serde(default)]
    pub storage_network_scheduled: bool,
    #[serde(default)]
    pub firewall_scheduled: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImagesResponse {
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Image {
    pub id: serde_json::Value,
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub region_name: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

// ── Read-only views ──────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct HostVmsResponse {
    pub hostname: String,
    #[serde(default)]
    pub vms: Vec<HostVm>,
}

/// A workload running on a host, as reported by the compute service.
#[derive(Debug, Clone, Deserialize)]
pub struct HostVm {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default, rename = "Flavor")]
    pub flavor: Option<String>,
    #[serde(default, rename = "Image")]
    pub image: Option<String>,
    #[serde(default, rename = "Created")]
    pub created: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandLogResponse {
    #[serde(default)]
    pub commands: Vec<CommandLogEntry>,
}

/// Entry of the backend-owned audit trail.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandLogEntry {
    pub id: u64,
    pub timestamp: NaiveDateTime,
    pub command: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub returncode: Option<i64>,
}
