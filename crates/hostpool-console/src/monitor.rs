use std::time::Duration;

use futures_util::future::join_all;
use hostpool_core::cache::PoolCache;
use tokio::task::JoinHandle;

/// Spawn the background pool warmer.
///
/// Every tick loads pools that were never fetched and refetches expired
/// ones. The focus pool is left to the foreground.
pub fn spawn_prefetch(
    cache: PoolCache,
    keys: Vec<String>,
    focus: Option<String>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(interval);
        loop {
            interval.tick().await;
            sweep(&cache, &keys, focus.as_deref()).await;
        }
    })
}

async fn sweep(cache: &PoolCache, keys: &[String], focus: Option<&str>) {
    let summary = cache.prefetch_all(keys, focus).await;

    let stale: Vec<&str> = keys
        .iter()
        .map(String::as_str)
        .filter(|k| Some(*k) != focus && cache.get(k).is_some() && !cache.is_fresh(k))
        .collect();
    if stale.is_empty() {
        return;
    }

    tracing::debug!(count = stale.len(), loaded = summary.loaded, "refreshing expired pools");
    for (key, result) in stale.iter().zip(join_all(stale.iter().map(|k| cache.fill(k, false))).await) {
        if let Err(e) = result {
            tracing::warn!(pool = %key, error = %e, "background refresh failed, keeping stale snapshot");
        }
    }
}
