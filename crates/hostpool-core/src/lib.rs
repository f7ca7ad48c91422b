//! Orchestration core of the host pool console.
//!
//! Pool snapshots are cached per GPU class ([`cache::PoolCache`]), user
//! intents are previewed against the backend ([`preview::PreviewGateway`]),
//! planned into ordered steps ([`planner::Planner`]), held one per host
//! ([`queue::OperationQueue`]) and executed one at a time
//! ([`engine::ExecutionEngine`]). [`console::Console`] wires a session
//! together.

pub mod cache;
pub mod columns;
pub mod console;
pub mod engine;
pub mod filter;
pub mod http;
pub mod planner;
pub mod preview;
pub mod queue;
pub mod settings;
pub mod types;

#[cfg(test)]
mod testing;

use std::time::Duration;

use async_trait::async_trait;

pub use hostpool_api::{CommandLogEntry, HostVm, Image};
use preview::LaunchPreview;
use types::{ExecuteOutcome, FailureKind, LaunchIntent, MigrationIntent, PoolKind, PoolSnapshot};

/// Errors are `Clone` so one in-flight fetch can hand the same failure to
/// every caller waiting on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("backend unreachable: {0}")]
    Transport(String),

    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("backend rejected request: {0}")]
    Rejected(String),

    #[error("{operation} timed out after {}s", .after.as_secs())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("pool not loaded: {0}")]
    PoolNotLoaded(String),

    #[error("host {host} not found in pool {pool}")]
    HostNotFound { pool: String, host: String },

    #[error("host {host} has {vm_count} running VMs and cannot leave the spot pool")]
    HostBusy { host: String, vm_count: u32 },

    #[error("host {host} is not in the runpod pool")]
    NotLaunchable { host: String },

    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    #[error("background task failed: {0}")]
    Task(String),

    #[error("unknown pool kind: {0}")]
    UnknownPoolKind(String),

    #[error("missing env var: {0}")]
    MissingEnv(String),

    #[error("invalid env var: {0}")]
    InvalidEnv(String),
}

impl Error {
    /// How an execution failure is reported in a batch result.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::Transport(_) | Self::Task(_) => FailureKind::Transport,
            _ => FailureKind::Rejected,
        }
    }

    /// Message suitable for a user-facing log line.
    pub fn user_message(&self) -> String {
        match self {
            Self::Status { message, .. } | Self::Rejected(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<hostpool_api::Error> for Error {
    fn from(e: hostpool_api::Error) -> Self {
        match &e {
            hostpool_api::Error::Request(_) => Self::Transport(e.to_string()),
            hostpool_api::Error::Api { status, .. } => Self::Status {
                status: status.as_u16(),
                message: e.message(),
            },
            hostpool_api::Error::Rejected { .. } => Self::Rejected(e.message()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Everything the core needs from the system of record.
///
/// [`http::HttpBackend`] talks to the real console backend; tests use an
/// in-memory fake.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Pool keys (GPU classes) the backend knows about.
    async fn pool_keys(&self) -> Result<Vec<String>>;

    /// Full snapshot of one pool key.
    async fn fetch_pool(&self, key: &str) -> Result<PoolSnapshot>;

    /// Exact aggregate a host would join for a pool kind.
    async fn target_aggregate(
        &self,
        host: &str,
        target: PoolKind,
        variant: Option<&str>,
    ) -> Result<String>;

    async fn preview_migration(&self, intent: &MigrationIntent) -> Result<Vec<String>>;

    async fn execute_migration(&self, intent: &MigrationIntent) -> Result<ExecuteOutcome>;

    async fn preview_launch(&self, intent: &LaunchIntent) -> Result<LaunchPreview>;

    async fn execute_launch(&self, intent: &LaunchIntent) -> Result<ExecuteOutcome>;

    /// Workloads currently placed on a host.
    async fn host_workloads(&self, host: &str) -> Result<Vec<HostVm>>;

    /// Images a runpod launch can boot from.
    async fn images(&self) -> Result<Vec<Image>>;

    async fn command_log(&self) -> Result<Vec<CommandLogEntry>>;

    async fn clear_command_log(&self) -> Result<()>;
}
