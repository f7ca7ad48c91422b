//! One operator session.
//!
//! Owns the cache, the pending queue and the collaborators that turn an
//! intent into a queued operation. Nothing here is global: every session
//! builds its own [`Console`].

use std::sync::Arc;

use tracing::{info, warn};

use crate::cache::{PoolCache, PrefetchSummary};
use crate::columns::{self, ColumnView};
use crate::engine::ExecutionEngine;
use crate::filter::{self, HostFilter};
use crate::planner::{self, Planner};
use crate::preview::PreviewGateway;
use crate::queue::OperationQueue;
use crate::settings::Settings;
use crate::types::{
    BatchReport, LaunchIntent, MigrationIntent, Operation, OperationKind, PoolKind, PoolSnapshot,
};
use crate::{Backend, CommandLogEntry, Error, HostVm, Image, Result};

pub struct Console {
    backend: Arc<dyn Backend>,
    cache: PoolCache,
    queue: OperationQueue,
    gateway: PreviewGateway,
    engine: ExecutionEngine,
    planner: Planner,
    pool_keys: Vec<String>,
}

impl Console {
    pub fn new(backend: Arc<dyn Backend>, settings: Settings) -> Self {
        Self {
            cache: PoolCache::new(backend.clone(), settings.cache_ttl),
            queue: OperationQueue::new(),
            gateway: PreviewGateway::new(backend.clone()),
            engine: ExecutionEngine::new(backend.clone(), settings.timeouts),
            planner: Planner::new(settings.planner),
            pool_keys: Vec::new(),
            backend,
        }
    }

    /// Shared handle, e.g. for a background prefetch task.
    pub fn cache(&self) -> &PoolCache {
        &self.cache
    }

    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    // ── Pools ────────────────────────────────────────────────────────

    pub async fn load_pool_keys(&mut self) -> Result<&[String]> {
        self.pool_keys = self.backend.pool_keys().await?;
        info!(count = self.pool_keys.len(), "loaded pool keys");
        Ok(&self.pool_keys)
    }

    pub fn pool_keys(&self) -> &[String] {
        &self.pool_keys
    }

    pub async fn open_pool(&self, key: &str) -> Result<Arc<PoolSnapshot>> {
        self.cache.fill(key, false).await
    }

    pub async fn refresh_pool(&self, key: &str) -> Result<Arc<PoolSnapshot>> {
        self.cache.refresh(key).await
    }

    /// Warm every known pool except `excluding`.
    pub async fn prefetch(&self, excluding: Option<&str>) -> PrefetchSummary {
        self.cache.prefetch_all(&self.pool_keys, excluding).await
    }

    pub fn filtered(&self, key: &str, filter: &HostFilter) -> Result<PoolSnapshot> {
        let snapshot = self.snapshot(key)?;
        Ok(filter::apply(&snapshot, filter))
    }

    pub fn columns(&self, key: &str) -> Result<Vec<ColumnView>> {
        let snapshot = self.snapshot(key)?;
        Ok(columns::render_all(&snapshot))
    }

    fn snapshot(&self, key: &str) -> Result<Arc<PoolSnapshot>> {
        self.cache
            .get(key)
            .ok_or_else(|| Error::PoolNotLoaded(key.to_string()))
    }

    // ── Queueing ─────────────────────────────────────────────────────

    /// Preview and queue moving `host` into the `target` pool.
    ///
    /// `target_variant` selects an on-demand variant aggregate when the pool
    /// has several.
    pub async fn queue_migration(
        &mut self,
        pool_key: &str,
        host: &str,
        target: PoolKind,
        target_variant: Option<&str>,
    ) -> Result<Operation> {
        let (source_pool, source_aggregate) = {
            let snapshot = self.snapshot(pool_key)?;
            let (sub, h) = snapshot.find_host(host).ok_or_else(|| Error::HostNotFound {
                pool: pool_key.to_string(),
                host: host.to_string(),
            })?;
            if !h.can_leave_pool() {
                return Err(Error::HostBusy {
                    host: host.to_string(),
                    vm_count: h.vm_count,
                });
            }
            (sub.kind, sub.aggregate_for(h).to_string())
        };

        let target_aggregate = self.gateway.resolve_target(host, target, target_variant).await?;
        if target_aggregate == source_aggregate {
            return Err(Error::InvalidPlan(format!(
                "{host} is already in {target_aggregate}"
            )));
        }

        let intent = MigrationIntent {
            host: host.to_string(),
            source_pool,
            target_pool: target,
            source_aggregate,
            target_aggregate,
        };
        let preview = self.gateway.preview_migration(&intent).await?;

        self.enqueue(pool_key, OperationKind::Migration(intent), preview.commands)
    }

    /// Preview and queue a VM launch on a runpod host.
    pub async fn queue_launch(
        &mut self,
        pool_key: &str,
        host: &str,
        image_name: Option<&str>,
    ) -> Result<Operation> {
        let snapshot = self.snapshot(pool_key)?;
        match snapshot.find_host(host) {
            Some((sub, _)) if sub.kind == PoolKind::Runpod => {}
            Some(_) => return Err(Error::NotLaunchable { host: host.to_string() }),
            None => {
                return Err(Error::HostNotFound {
                    pool: pool_key.to_string(),
                    host: host.to_string(),
                });
            }
        }

        let mut intent = LaunchIntent {
            host: host.to_string(),
            vm_name: host.to_string(),
            flavor_name: None,
            image_name: image_name.map(str::to_string),
        };
        let preview = self.gateway.preview_launch(&intent).await?;

        // plan with the names the backend will actually use
        intent.vm_name = preview.vm_name;
        intent.flavor_name = preview.flavor_name;

        self.enqueue(pool_key, OperationKind::Launch(intent), vec![preview.command])
    }

    fn enqueue(&mut self, pool_key: &str, kind: OperationKind, preview: Vec<String>) -> Result<Operation> {
        let steps = self.planner.plan(&kind);
        planner::check_order(&steps)?;

        let op = Operation::new(pool_key, kind, steps, preview);
        info!(
            host = %op.host(),
            kind = op.kind.label(),
            steps = op.steps.len(),
            "operation queued"
        );
        self.queue.add(op.clone());
        Ok(op)
    }

    pub fn remove(&mut self, host: &str) -> Option<Operation> {
        self.queue.remove(host)
    }

    pub fn clear_pending(&mut self) {
        self.queue.clear();
    }

    pub fn pending(&self) -> &OperationQueue {
        &self.queue
    }

    // ── Execution ────────────────────────────────────────────────────

    /// Execute everything pending.
    ///
    /// Succeeded operations leave the queue; failed ones stay for a retry.
    /// Every pool touched by the batch is dropped from the cache and
    /// reloaded, whether or not its operations succeeded.
    pub async fn commit(&mut self) -> BatchReport {
        let ops = self.queue.snapshot();
        if ops.is_empty() {
            return BatchReport::default();
        }

        let report = self.engine.run(&ops).await;

        for result in report.results.iter().filter(|r| r.success) {
            if self.queue.get(&result.host).is_some_and(|o| o.id == result.operation_id) {
                self.queue.remove(&result.host);
            }
        }

        let mut touched: Vec<String> = Vec::new();
        for op in &ops {
            if !touched.contains(&op.pool_key) {
                touched.push(op.pool_key.clone());
            }
        }
        for key in &touched {
            self.cache.invalidate(key);
        }
        let reload = self.cache.prefetch_all(&touched, None).await;
        if reload.failed > 0 {
            warn!(failed = reload.failed, "some pools could not be reloaded after commit");
        }

        report
    }

    // ── Read-only views ──────────────────────────────────────────────

    pub async fn host_workloads(&self, host: &str) -> Result<Vec<HostVm>> {
        self.backend.host_workloads(host).await
    }

    pub async fn images(&self) -> Result<Vec<Image>> {
        self.backend.images().await
    }

    pub async fn command_log(&self) -> Result<Vec<CommandLogEntry>> {
        self.backend.command_log().await
    }

    pub async fn clear_command_log(&self) -> Result<()> {
        self.backend.clear_command_log().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBackend, Outcome};
    use crate::types::{FailureKind, StepKind};

    async fn console_with(fake: &Arc<FakeBackend>) -> Console {
        let mut console = Console::new(fake.clone(), Settings::default());
        console.load_pool_keys().await.unwrap();
        console.open_pool("H100").await.unwrap();
        console
    }

    #[tokio::test]
    async fn commit_keeps_only_failed_operations() {
        let fake = Arc::new(FakeBackend::with_pools(&["H100"]));
        fake.set_outcome("gpu-02", Outcome::Fail("Failed to launch VM gpu-02: HTTP 500".into()));
        let mut console = console_with(&fake).await;

        console
            .queue_migration("H100", "gpu-01", PoolKind::OnDemand, None)
            .await
            .unwrap();
        console.queue_launch("H100", "gpu-02", None).await.unwrap();
        let fetches_before = fake.fetch_count("H100");

        let report = console.commit().await;

        assert_eq!(report.results.len(), 2);
        assert!(report.results[0].success);
        assert_eq!(report.results[0].host, "gpu-01");
        assert!(!report.results[1].success);
        assert_eq!(report.results[1].failure, Some(FailureKind::Rejected));
        assert_eq!(
            report.results[1].error.as_deref(),
            Some("Failed to launch VM gpu-02: HTTP 500")
        );

        let left: Vec<_> = console.pending().iter().map(|o| o.host().to_string()).collect();
        assert_eq!(left, vec!["gpu-02"]);

        // touched pool was reloaded
        assert_eq!(fake.fetch_count("H100"), fetches_before + 1);
        assert!(console.cache().is_fresh("H100"));
    }

    #[tokio::test]
    async fn rejected_preview_does_not_queue() {
        let fake = Arc::new(FakeBackend::with_pools(&["H100"]));
        fake.rejected_previews.lock().unwrap().insert("gpu-01".into());
        let mut console = console_with(&fake).await;

        let err = console
            .queue_migration("H100", "gpu-01", PoolKind::OnDemand, None)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Rejected(_)));
        assert!(console.pending().is_empty());
    }

    #[tokio::test]
    async fn busy_spot_host_cannot_migrate() {
        let fake = Arc::new(FakeBackend::with_pools(&["H100"]));
        let mut console = console_with(&fake).await;

        let err = console
            .queue_migration("H100", "gpu-03", PoolKind::Runpod, None)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::HostBusy { vm_count: 2, .. }));
        assert!(!fake.calls().iter().any(|c| c.starts_with("preview-migration")));
    }

    #[tokio::test]
    async fn launch_requires_runpod_host() {
        let fake = Arc::new(FakeBackend::with_pools(&["H100"]));
        let mut console = console_with(&fake).await;

        let err = console.queue_launch("H100", "gpu-01", None).await.unwrap_err();
        assert!(matches!(err, Error::NotLaunchable { .. }));

        let err = console.queue_launch("H100", "gpu-77", None).await.unwrap_err();
        assert!(matches!(err, Error::HostNotFound { .. }));
    }

    #[tokio::test]
    async fn launch_is_planned_with_backend_names() {
        let fake = Arc::new(FakeBackend::with_pools(&["H100"]));
        let mut console = console_with(&fake).await;

        let op = console
            .queue_launch("H100", "gpu-02", Some("Ubuntu Server 22.04 LTS"))
            .await
            .unwrap();

        let OperationKind::Launch(intent) = &op.kind else {
            panic!("expected launch, got {:?}", op.kind);
        };
        assert_eq!(intent.flavor_name.as_deref(), Some("n3-H100x8"));
        assert_eq!(op.steps[0].kind, StepKind::WaitPropagation);
        assert_eq!(op.steps[1].kind, StepKind::DeployVm);
        assert!(op.steps[1].command.contains("n3-H100x8"));
        assert_eq!(op.preview.len(), 1);
    }

    #[tokio::test]
    async fn second_intent_for_host_replaces_first() {
        let fake = Arc::new(FakeBackend::with_pools(&["H100"]));
        let mut console = console_with(&fake).await;

        console
            .queue_migration("H100", "gpu-01", PoolKind::OnDemand, None)
            .await
            .unwrap();
        let second = console
            .queue_migration("H100", "gpu-01", PoolKind::Runpod, None)
            .await
            .unwrap();

        assert_eq!(console.pending().len(), 1);
        assert_eq!(console.pending().get("gpu-01").unwrap().id, second.id);
    }

    #[tokio::test]
    async fn migration_into_current_aggregate_is_refused() {
        let fake = Arc::new(FakeBackend::with_pools(&["H100"]));
        let mut console = console_with(&fake).await;

        let err = console
            .queue_migration("H100", "gpu-01", PoolKind::Spot, None)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidPlan(_)));
        assert!(console.pending().is_empty());
    }

    #[tokio::test]
    async fn unloaded_pool_is_reported() {
        let fake = Arc::new(FakeBackend::with_pools(&["H100", "A100"]));
        let mut console = console_with(&fake).await;

        let err = console
            .queue_migration("A100", "gpu-01", PoolKind::OnDemand, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PoolNotLoaded(key) if key == "A100"));
        assert!(console.columns("A100").is_err());

        let summary = console.prefetch(Some("H100")).await;
        assert_eq!(summary.loaded, 1);
        assert_eq!(console.columns("A100").unwrap().len(), 6);
    }

    #[tokio::test]
    async fn filtered_and_columns_read_the_cached_snapshot() {
        let fake = Arc::new(FakeBackend::with_pools(&["H100"]));
        let console = console_with(&fake).await;

        let nvlink = HostFilter { nvlink_only: true, ..Default::default() };
        let view = console.filtered("H100", &nvlink).unwrap();
        assert_eq!(view.host_count(), 1);
        assert_eq!(console.cache().get("H100").unwrap().host_count(), 5);

        let board = console.columns("H100").unwrap();
        assert_eq!(board[2].rows().len(), 2);

        let err = console.filtered("A100", &HostFilter::default()).unwrap_err();
        assert!(matches!(err, Error::PoolNotLoaded(_)));
    }

    #[tokio::test]
    async fn refresh_pool_swaps_in_new_snapshot() {
        let fake = Arc::new(FakeBackend::with_pools(&["H100"]));
        let console = console_with(&fake).await;
        let before = console.cache().get("H100").unwrap();

        let after = console.refresh_pool("H100").await.unwrap();

        assert_eq!(fake.fetch_count("H100"), 2);
        assert!(!Arc::ptr_eq(&before, &after));
        assert!(Arc::ptr_eq(&after, &console.cache().get("H100").unwrap()));
    }

    #[tokio::test]
    async fn empty_commit_touches_nothing() {
        let fake = Arc::new(FakeBackend::with_pools(&["H100"]));
        let mut console = console_with(&fake).await;
        let calls = fake.calls().len();

        let report = console.commit().await;

        assert!(report.results.is_empty());
        assert_eq!(fake.calls().len(), calls);
        assert_eq!(fake.fetch_count("H100"), 1);
    }
}
