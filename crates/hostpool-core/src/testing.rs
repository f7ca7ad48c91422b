use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::preview::LaunchPreview;
use crate::types::{
    ExecuteOutcome, GpuUsage, Host, LaunchIntent, MigrationIntent, OwnerGroup, PoolKind,
    PoolSnapshot, SubPool,
};
use crate::{Backend, CommandLogEntry, Error, HostVm, Image, Result};

/// How the fake answers a mutation for one host.
#[derive(Debug, Clone)]
pub enum Outcome {
    Succeed,
    /// HTTP-level failure with the given message.
    Fail(String),
    /// 2xx body with `success: false`.
    Refuse(String),
    /// Never answers within any sane timeout.
    Hang,
}

#[derive(Default)]
pub struct FakeBackend {
    pub pools: Mutex<HashMap<String, PoolSnapshot>>,
    pub failing_pools: Mutex<HashSet<String>>,
    pub fetch_delay: Mutex<Duration>,
    pub fetches: Mutex<Vec<String>>,
    pub outcomes: Mutex<HashMap<String, Outcome>>,
    pub rejected_previews: Mutex<HashSet<String>>,
    /// Every backend call in the order it was issued.
    pub calls: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn with_pools(keys: &[&str]) -> Self {
        let fake = Self::default();
        {
            let mut pools = fake.pools.lock().unwrap();
            for key in keys {
                pools.insert(key.to_string(), sample_snapshot(key));
            }
        }
        fake
    }

    pub fn set_outcome(&self, host: &str, outcome: Outcome) {
        self.outcomes.lock().unwrap().insert(host.into(), outcome);
    }

    pub fn fail_pool(&self, key: &str) {
        self.failing_pools.lock().unwrap().insert(key.into());
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = delay;
    }

    pub fn fetch_count(&self, key: &str) -> usize {
        self.fetches.lock().unwrap().iter().filter(|k| *k == key).count()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    async fn mutate(&self, host: &str) -> Result<ExecuteOutcome> {
        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .get(host)
            .cloned()
            .unwrap_or(Outcome::Succeed);

        match outcome {
            Outcome::Succeed => Ok(ExecuteOutcome {
                success: true,
                message: Some(format!("Successfully completed operation: {host}")),
                error: None,
                output: Vec::new(),
            }),
            Outcome::Fail(message) => Err(Error::Status { status: 500, message }),
            Outcome::Refuse(message) => Ok(ExecuteOutcome {
                success: false,
                message: None,
                error: Some(message),
                output: Vec::new(),
            }),
            Outcome::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(Error::Transport("hung call returned".into()))
            }
        }
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn pool_keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<_> = self.pools.lock().unwrap().keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    async fn fetch_pool(&self, key: &str) -> Result<PoolSnapshot> {
        self.fetches.lock().unwrap().push(key.to_string());
        let delay = *self.fetch_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.failing_pools.lock().unwrap().contains(key) {
            return Err(Error::Transport(format!("connection refused fetching {key}")));
        }
        let mut snapshot = self
            .pools
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| Error::Status {
                status: 404,
                message: format!("unknown gpu type {key}"),
            })?;
        snapshot.fetched_at = Utc::now();
        Ok(snapshot)
    }

    async fn target_aggregate(
        &self,
        host: &str,
        target: PoolKind,
        variant: Option<&str>,
    ) -> Result<String> {
        self.record(format!("target-aggregate {host} {target}"));
        Ok(match (target, variant) {
            (_, Some(v)) => v.to_string(),
            (PoolKind::OnDemand, None) => "H100-n3".into(),
            (kind, None) => format!("H100-n3-{kind}"),
        })
    }

    async fn preview_migration(&self, intent: &MigrationIntent) -> Result<Vec<String>> {
        self.record(format!("preview-migration {}", intent.host));
        if self.rejected_previews.lock().unwrap().contains(&intent.host) {
            return Err(Error::Rejected(format!("unknown host {}", intent.host)));
        }
        Ok(vec![
            format!(
                "openstack aggregate remove host {} {}",
                intent.source_aggregate, intent.host
            ),
            format!(
                "openstack aggregate add host {} {}",
                intent.target_aggregate, intent.host
            ),
        ])
    }

    async fn execute_migration(&self, intent: &MigrationIntent) -> Result<ExecuteOutcome> {
        self.record(format!("execute-migration {}", intent.host));
        self.mutate(&intent.host).await
    }

    async fn preview_launch(&self, intent: &LaunchIntent) -> Result<LaunchPreview> {
        self.record(format!("preview-launch {}", intent.host));
        if self.rejected_previews.lock().unwrap().contains(&intent.host) {
            return Err(Error::Rejected(format!("unknown host {}", intent.host)));
        }
        Ok(LaunchPreview {
            vm_name: intent.host.clone(),
            flavor_name: Some("n3-H100x8".into()),
            gpu_type: Some("H100".into()),
            command: format!("curl -X POST .../core/virtual-machines -d '{{\"name\": \"{}\"}}'", intent.host),
        })
    }

    async fn execute_launch(&self, intent: &LaunchIntent) -> Result<ExecuteOutcome> {
        self.record(format!("execute-launch {}", intent.host));
        self.mutate(&intent.host).await
    }

    async fn host_workloads(&self, host: &str) -> Result<Vec<HostVm>> {
        self.record(format!("host-vms {host}"));
        Ok(Vec::new())
    }

    async fn images(&self) -> Result<Vec<Image>> {
        Ok(Vec::new())
    }

    async fn command_log(&self) -> Result<Vec<CommandLogEntry>> {
        Ok(Vec::new())
    }

    async fn clear_command_log(&self) -> Result<()> {
        self.record("clear-log".into());
        Ok(())
    }
}

pub fn host(name: &str, pool: PoolKind, vm_count: u32, used: u32) -> Host {
    Host {
        name: name.into(),
        pool,
        vm_count,
        gpu: GpuUsage { used, capacity: 8 },
        owner: OwnerGroup::Investors,
        nvlink: false,
        tenant: None,
        variant: None,
        variant_aggregate: None,
        contract_aggregate: None,
    }
}

/// Snapshot with one host in each interesting position:
/// idle spot `gpu-01`, runpod `gpu-02`, busy spot `gpu-03`, NVLink on-demand `gpu-04`.
pub fn sample_snapshot(key: &str) -> PoolSnapshot {
    let mut ondemand = host("gpu-04", PoolKind::OnDemand, 3, 8);
    ondemand.variant = Some(format!("{key}-n3-NVLink"));
    ondemand.variant_aggregate = Some(format!("{key}-n3-NVLink"));
    ondemand.nvlink = true;
    ondemand.owner = OwnerGroup::NexgenCloud;
    ondemand.tenant = Some("Acme Labs".into());

    let sub_pools = vec![
        sub_pool(PoolKind::OnDemand, &format!("{key}-n3"), vec![ondemand]),
        sub_pool(
            PoolKind::Runpod,
            &format!("{key}-n3-runpod"),
            vec![host("gpu-02", PoolKind::Runpod, 0, 0)],
        ),
        sub_pool(
            PoolKind::Spot,
            &format!("{key}-n3-spot"),
            vec![
                host("gpu-01", PoolKind::Spot, 0, 0),
                host("gpu-03", PoolKind::Spot, 2, 4),
            ],
        ),
        sub_pool(PoolKind::Contract, "Contracts (0 contracts)", Vec::new()),
        sub_pool(
            PoolKind::OutOfStock,
            "Out of Stock",
            vec![host("gpu-09", PoolKind::OutOfStock, 0, 0)],
        ),
    ];

    PoolSnapshot {
        key: key.into(),
        usage: PoolSnapshot::computed_usage(&sub_pools),
        sub_pools,
        fetched_at: Utc::now(),
    }
}

fn sub_pool(kind: PoolKind, name: &str, hosts: Vec<Host>) -> SubPool {
    SubPool {
        kind,
        name: name.into(),
        usage: hosts.iter().map(|h| h.gpu).sum(),
        hosts,
    }
}
