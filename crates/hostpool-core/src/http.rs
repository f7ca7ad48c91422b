use async_trait::async_trait;
use chrono::Utc;
use hostpool_api::{
    AggregatesResponse, ConsoleClient, ExecuteLaunchResponse, ExecuteMigrationResponse,
    HostPayload, LaunchRequest, MigrationRequest, SubPoolPayload, TargetAggregateRequest,
    VariantPayload,
};
use tracing::{debug, info};

use crate::preview::LaunchPreview;
use crate::types::{
    ExecuteOutcome, GpuUsage, Host, LaunchIntent, MigrationIntent, OwnerGroup, PoolKind,
    PoolSnapshot, SubPool,
};
use crate::{Backend, CommandLogEntry, HostVm, Image, Result};

/// [`Backend`] over the console REST API.
///
/// Delegates to [`ConsoleClient`] for all HTTP calls.
pub struct HttpBackend {
    client: ConsoleClient,
}

impl HttpBackend {
    pub fn new(client: ConsoleClient) -> Self {
        Self { client }
    }

    pub fn from_url(base_url: impl Into<String>) -> Self {
        Self::new(ConsoleClient::new(base_url))
    }

    /// Wire spelling of a pool kind for `get-target-aggregate`.
    fn target_type(kind: PoolKind) -> &'static str {
        match kind {
            PoolKind::Contract => "contracts",
            other => other.as_str(),
        }
    }

    fn launch_request(intent: &LaunchIntent) -> LaunchRequest {
        LaunchRequest {
            hostname: intent.host.clone(),
            image_name: intent.image_name.clone(),
            image_id: None,
        }
    }
}

/// Build a snapshot with one sub-pool per kind, filling gaps the backend left out.
pub(crate) fn snapshot_from(key: &str, resp: AggregatesResponse) -> PoolSnapshot {
    let AggregatesResponse {
        ondemand,
        runpod,
        spot,
        contracts,
        outofstock,
        gpu_overview,
        ..
    } = resp;

    let sub_pools: Vec<SubPool> = [
        (PoolKind::OnDemand, ondemand),
        (PoolKind::Runpod, runpod),
        (PoolKind::Spot, spot),
        (PoolKind::Contract, contracts),
        (PoolKind::OutOfStock, outofstock),
    ]
    .into_iter()
    .map(|(kind, payload)| match payload {
        Some(p) => sub_pool_from(kind, p),
        None => SubPool::empty(kind),
    })
    .collect();

    let usage = match gpu_overview {
        Some(o) => GpuUsage {
            used: o.total_gpu_used,
            capacity: o.total_gpu_capacity,
        },
        None => PoolSnapshot::computed_usage(&sub_pools),
    };

    PoolSnapshot {
        key: key.to_string(),
        sub_pools,
        usage,
        fetched_at: Utc::now(),
    }
}

fn sub_pool_from(kind: PoolKind, payload: SubPoolPayload) -> SubPool {
    SubPool {
        kind,
        name: payload.name,
        usage: GpuUsage {
            used: payload.gpu_summary.gpu_used,
            capacity: payload.gpu_summary.gpu_capacity,
        },
        hosts: payload
            .hosts
            .into_iter()
            .map(|h| host_from(kind, h, &payload.variants))
            .collect(),
    }
}

/// Aggregate of the variant a host is labelled with. A pool with a single
/// variant puts every unlabelled host in it.
fn variant_aggregate(
    pool: PoolKind,
    label: Option<&str>,
    variants: &[VariantPayload],
) -> Option<String> {
    if pool != PoolKind::OnDemand {
        return None;
    }
    match (label, variants) {
        (Some(label), _) => variants
            .iter()
            .find(|v| v.variant == label || v.aggregate == label)
            .map(|v| v.aggregate.clone()),
        (None, [only]) => Some(only.aggregate.clone()),
        (None, _) => None,
    }
}

fn host_from(pool: PoolKind, h: HostPayload, variants: &[VariantPayload]) -> Host {
    Host {
        variant_aggregate: variant_aggregate(pool, h.variant.as_deref(), variants),
        owner: OwnerGroup::from_label(h.owner_group.as_deref()),
        name: h.name,
        pool,
        vm_count: h.vm_count,
        gpu: GpuUsage {
            used: h.gpu_used,
            capacity: h.gpu_capacity,
        },
        nvlink: h.nvlinks,
        tenant: h.tenant,
        variant: h.variant,
        contract_aggregate: h.contract_aggregate,
    }
}

fn migration_outcome(resp: ExecuteMigrationResponse) -> ExecuteOutcome {
    ExecuteOutcome {
        success: resp.success,
        message: resp.message,
        error: resp.error,
        output: resp
            .results
            .into_iter()
            .map(|r| {
                let mark = if r.success { "ok" } else { "failed" };
                format!("[{mark}] {}\n{}", r.command, r.output.trim_end())
            })
            .collect(),
    }
}

fn launch_outcome(resp: ExecuteLaunchResponse) -> ExecuteOutcome {
    let mut output = Vec::new();
    if let Some(id) = &resp.vm_id {
        let name = resp.vm_name.as_deref().unwrap_or("-");
        output.push(format!("vm {name} created with id {id}"));
    }
    if resp.storage_network_scheduled {
        output.push("storage network attachment scheduled".to_string());
    }
    if resp.firewall_scheduled {
        output.push("firewall attachment scheduled".to_string());
    }

    ExecuteOutcome {
        success: resp.success,
        message: resp.message,
        error: resp.error,
        output,
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn pool_keys(&self) -> Result<Vec<String>> {
        let keys = self.client.gpu_types().await?;
        debug!(count = keys.len(), "console: pool keys");
        Ok(keys)
    }

    async fn fetch_pool(&self, key: &str) -> Result<PoolSnapshot> {
        let resp = self.client.aggregates(key).await?;
        let snapshot = snapshot_from(key, resp);
        debug!(pool = key, hosts = snapshot.host_count(), "console: pool fetched");
        Ok(snapshot)
    }

    async fn target_aggregate(
        &self,
        host: &str,
        target: PoolKind,
        variant: Option<&str>,
    ) -> Result<String> {
        let aggregate = self
            .client
            .target_aggregate(&TargetAggregateRequest {
                hostname: host.to_string(),
                target_type: Self::target_type(target).to_string(),
                target_variant: variant.map(str::to_string),
            })
            .await?;
        Ok(aggregate)
    }

    async fn preview_migration(&self, intent: &MigrationIntent) -> Result<Vec<String>> {
        let commands = self
            .client
            .preview_migration(&MigrationRequest {
                host: intent.host.clone(),
                source_aggregate: intent.source_aggregate.clone(),
                target_aggregate: intent.target_aggregate.clone(),
            })
            .await?;
        Ok(commands)
    }

    async fn execute_migration(&self, intent: &MigrationIntent) -> Result<ExecuteOutcome> {
        let resp = self
            .client
            .execute_migration(&MigrationRequest {
                host: intent.host.clone(),
                source_aggregate: intent.source_aggregate.clone(),
                target_aggregate: intent.target_aggregate.clone(),
            })
            .await?;
        info!(host = %intent.host, success = resp.success, "console: migration executed");
        Ok(migration_outcome(resp))
    }

    async fn preview_launch(&self, intent: &LaunchIntent) -> Result<LaunchPreview> {
        let resp = self
            .client
            .preview_launch(&Self::launch_request(intent))
            .await?;

        Ok(LaunchPreview {
            vm_name: resp.vm_name.unwrap_or_else(|| intent.vm_name.clone()),
            flavor_name: resp.flavor_name,
            gpu_type: resp.gpu_type,
            command: resp.command.unwrap_or_default(),
        })
    }

    async fn execute_launch(&self, intent: &LaunchIntent) -> Result<ExecuteOutcome> {
        let resp = self
            .client
            .execute_launch(&Self::launch_request(intent))
            .await?;
        info!(host = %intent.host, success = resp.success, "console: launch executed");
        Ok(launch_outcome(resp))
    }

    async fn host_workloads(&self, host: &str) -> Result<Vec<HostVm>> {
        Ok(self.client.host_vms(host).await?)
    }

    async fn images(&self) -> Result<Vec<Image>> {
        Ok(self.client.images().await?)
    }

    async fn command_log(&self) -> Result<Vec<CommandLogEntry>> {
        Ok(self.client.command_log().await?)
    }

    async fn clear_command_log(&self) -> Result<()> {
        self.client.clear_command_log().await?;
        info!("console: command log cleared");
        Ok(())
    }
}
