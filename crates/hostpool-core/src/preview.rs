//! Dry-run gate in front of the queue.
//!
//! Nothing reaches the [`OperationQueue`](crate::queue::OperationQueue)
//! without a successful preview. A preview only proves the intent was valid
//! when it ran; execution can still fail and is isolated per operation.

use std::sync::Arc;

use tracing::{info, warn};

use crate::types::{LaunchIntent, MigrationIntent, PoolKind};
use crate::{Backend, Result};

/// Backend-computed commands for a migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationPreview {
    pub commands: Vec<String>,
}

/// Backend-computed names and command text for a runpod launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPreview {
    pub vm_name: String,
    pub flavor_name: Option<String>,
    pub gpu_type: Option<String>,
    pub command: String,
}

#[derive(Clone)]
pub struct PreviewGateway {
    backend: Arc<dyn Backend>,
}

impl PreviewGateway {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Authoritative aggregate name for moving `host` into `target`.
    pub async fn resolve_target(
        &self,
        host: &str,
        target: PoolKind,
        variant: Option<&str>,
    ) -> Result<String> {
        self.backend
            .target_aggregate(host, target, variant)
            .await
            .inspect_err(|e| warn!(host, %target, error = %e, "target aggregate lookup failed"))
    }

    pub async fn preview_migration(&self, intent: &MigrationIntent) -> Result<MigrationPreview> {
        match self.backend.preview_migration(intent).await {
            Ok(commands) => {
                info!(
                    host = %intent.host,
                    source = %intent.source_aggregate,
                    target = %intent.target_aggregate,
                    commands = commands.len(),
                    "migration preview ok"
                );
                Ok(MigrationPreview { commands })
            }
            Err(e) => {
                warn!(host = %intent.host, error = %e, "migration preview rejected");
                Err(e)
            }
        }
    }

    pub async fn preview_launch(&self, intent: &LaunchIntent) -> Result<LaunchPreview> {
        match self.backend.preview_launch(intent).await {
            Ok(preview) => {
                info!(
                    host = %intent.host,
                    vm = %preview.vm_name,
                    flavor = preview.flavor_name.as_deref().unwrap_or("-"),
                    "launch preview ok"
                );
                Ok(preview)
            }
            Err(e) => {
                warn!(host = %intent.host, error = %e, "launch preview rejected");
                Err(e)
            }
        }
    }
}
