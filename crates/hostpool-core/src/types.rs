use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Error;

/// Commercial category a host is pooled under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolKind {
    OnDemand,
    Runpod,
    Spot,
    Contract,
    OutOfStock,
}

impl PoolKind {
    /// Column order of a snapshot.
    pub const ALL: [PoolKind; 5] = [
        Self::OnDemand,
        Self::Runpod,
        Self::Spot,
        Self::Contract,
        Self::OutOfStock,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnDemand => "ondemand",
            Self::Runpod => "runpod",
            Self::Spot => "spot",
            Self::Contract => "contract",
            Self::OutOfStock => "outofstock",
        }
    }

    /// Whether capacity in this pool counts toward the usage ratio.
    pub fn counts_toward_usage(&self) -> bool {
        !matches!(self, Self::OutOfStock)
    }
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PoolKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "ondemand" => Ok(Self::OnDemand),
            "runpod" => Ok(Self::Runpod),
            "spot" => Ok(Self::Spot),
            "contract" | "contracts" => Ok(Self::Contract),
            "outofstock" => Ok(Self::OutOfStock),
            other => Err(Error::UnknownPoolKind(other.to_string())),
        }
    }
}

/// Who owns the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OwnerGroup {
    Investors,
    NexgenCloud,
}

impl OwnerGroup {
    /// Anything the backend does not label as Nexgen-owned is investor hardware.
    pub fn from_label(label: Option<&str>) -> Self {
        match label {
            Some("Nexgen Cloud") => Self::NexgenCloud,
            _ => Self::Investors,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuUsage {
    pub used: u32,
    pub capacity: u32,
}

impl GpuUsage {
    pub fn ratio(&self) -> String {
        format!("{}/{}", self.used, self.capacity)
    }

    /// Used share in percent, rounded to one decimal.
    pub fn percentage(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        (f64::from(self.used) / f64::from(self.capacity) * 1000.0).round() / 10.0
    }
}

impl std::ops::Add for GpuUsage {
    type Output = GpuUsage;

    fn add(self, rhs: GpuUsage) -> GpuUsage {
        GpuUsage {
            used: self.used + rhs.used,
            capacity: self.capacity + rhs.capacity,
        }
    }
}

impl std::iter::Sum for GpuUsage {
    fn sum<I: Iterator<Item = GpuUsage>>(iter: I) -> GpuUsage {
        iter.fold(GpuUsage::default(), |acc, u| acc + u)
    }
}

/// A physical compute host as seen in one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub name: String,
    pub pool: PoolKind,
    pub vm_count: u32,
    pub gpu: GpuUsage,
    pub owner: OwnerGroup,
    pub nvlink: bool,
    pub tenant: Option<String>,
    /// Display name of the on-demand variant the host sits in.
    pub variant: Option<String>,
    /// Aggregate behind `variant`.
    pub variant_aggregate: Option<String>,
    pub contract_aggregate: Option<String>,
}

impl Host {
    pub fn has_vms(&self) -> bool {
        self.vm_count > 0
    }

    /// Spot hosts running workloads are pinned until the workloads drain.
    pub fn can_leave_pool(&self) -> bool {
        !(self.pool == PoolKind::Spot && self.has_vms())
    }
}

/// One column of a pool snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubPool {
    pub kind: PoolKind,
    /// Display name; for on-demand pools with several variants this is a summary label.
    pub name: String,
    pub hosts: Vec<Host>,
    pub usage: GpuUsage,
}

impl SubPool {
    pub fn empty(kind: PoolKind) -> Self {
        Self {
            kind,
            name: String::new(),
            hosts: Vec::new(),
            usage: GpuUsage::default(),
        }
    }

    /// Aggregate a host currently belongs to within this sub-pool.
    pub fn aggregate_for<'a>(&'a self, host: &'a Host) -> &'a str {
        host.variant_aggregate
            .as_deref()
            .or(host.contract_aggregate.as_deref())
            .unwrap_or(self.name.as_str())
    }
}

/// Everything known about one pool key (GPU class) at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub key: String,
    /// Always one entry per [`PoolKind`], in [`PoolKind::ALL`] order.
    pub sub_pools: Vec<SubPool>,
    pub usage: GpuUsage,
    pub fetched_at: DateTime<Utc>,
}

impl PoolSnapshot {
    pub fn sub_pool(&self, kind: PoolKind) -> Option<&SubPool> {
        self.sub_pools.iter().find(|p| p.kind == kind)
    }

    pub fn find_host(&self, name: &str) -> Option<(&SubPool, &Host)> {
        self.sub_pools
            .iter()
            .find_map(|p| p.hosts.iter().find(|h| h.name == name).map(|h| (p, h)))
    }

    pub fn host_count(&self) -> usize {
        self.sub_pools.iter().map(|p| p.hosts.len()).sum()
    }

    /// Usage over every pool that counts toward capacity.
    pub fn computed_usage(sub_pools: &[SubPool]) -> GpuUsage {
        sub_pools
            .iter()
            .filter(|p| p.kind.counts_toward_usage())
            .map(|p| p.usage)
            .sum()
    }
}

// ── Operations ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationIntent {
    pub host: String,
    pub source_pool: PoolKind,
    pub target_pool: PoolKind,
    pub source_aggregate: String,
    pub target_aggregate: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchIntent {
    pub host: String,
    pub vm_name: String,
    pub flavor_name: Option<String>,
    pub image_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OperationKind {
    Migration(MigrationIntent),
    Launch(LaunchIntent),
}

impl OperationKind {
    pub fn host(&self) -> &str {
        match self {
            Self::Migration(m) => &m.host,
            Self::Launch(l) => &l.host,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Migration(_) => "migration",
            Self::Launch(_) => "launch",
        }
    }
}

/// A previewed, planned, not yet executed intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: Uuid,
    pub pool_key: String,
    pub kind: OperationKind,
    pub steps: Vec<CommandStep>,
    /// Command text the backend reported during preview.
    pub preview: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Operation {
    pub fn new(
        pool_key: impl Into<String>,
        kind: OperationKind,
        steps: Vec<CommandStep>,
        preview: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            pool_key: pool_key.into(),
            kind,
            steps,
            preview,
            created_at: Utc::now(),
        }
    }

    pub fn host(&self) -> &str {
        self.kind.host()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    AggregateRemove,
    AggregateAdd,
    WaitPropagation,
    DeployVm,
    StorageNetworkDiscover,
    StoragePortCreate,
    StoragePortAttach,
    FirewallGet,
    FirewallUpdate,
}

/// One atomic unit of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandStep {
    pub kind: StepKind,
    pub title: String,
    pub description: String,
    pub command: String,
    pub verify: Vec<String>,
    pub estimate: Duration,
    pub depends_on: Vec<StepKind>,
}

// ── Execution ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// The backend answered and said no.
    Rejected,
    /// The request never got a usable answer.
    Transport,
    /// The backend did not answer in time.
    Timeout,
}

/// What the backend reported for a mutation that it accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecuteOutcome {
    pub success: bool,
    pub message: Option<String>,
    pub error: Option<String>,
    pub output: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub operation_id: Uuid,
    pub host: String,
    pub success: bool,
    pub error: Option<String>,
    pub failure: Option<FailureKind>,
    pub output: Vec<String>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub results: Vec<ExecutionResult>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }
}
