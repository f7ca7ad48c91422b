//! Per-pool snapshot cache with request coalescing and background prefetch.
//!
//! Entries are whole [`PoolSnapshot`]s behind an `Arc`: a key is either
//! absent or holds one complete snapshot, and refreshes swap the `Arc`
//! rather than patching hosts in place.
//!
//! Fetches run on their own tokio task and are shared between every caller
//! that asks for the same key while the fetch is in flight, so a background
//! prefetch and a foreground load never hit the backend twice for one key.
//! At most one request per key is outstanding: a fetch that cannot reuse the
//! in-flight one is queued behind it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared, join_all};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::types::PoolSnapshot;
use crate::{Backend, Error, Result};

type SharedFetch = Shared<BoxFuture<'static, Result<Arc<PoolSnapshot>>>>;

struct Entry {
    snapshot: Arc<PoolSnapshot>,
    stored_at: Instant,
}

struct InFlight {
    id: u64,
    fetch: SharedFetch,
    /// Invalidated while running: callers still get the result, the cache does not.
    detached: bool,
}

#[derive(Default)]
struct State {
    entries: HashMap<String, Entry>,
    in_flight: HashMap<String, InFlight>,
    next_id: u64,
}

impl State {
    /// Forget the in-flight fetch for `key` if it is still fetch `id`.
    ///
    /// Returns whether its result may be stored.
    fn finish(&mut self, key: &str, id: u64) -> bool {
        match self.in_flight.get(key) {
            Some(flight) if flight.id == id => {
                let detached = flight.detached;
                self.in_flight.remove(key);
                !detached
            }
            _ => false,
        }
    }

    fn detach(&mut self, key: &str) -> bool {
        match self.in_flight.get_mut(key) {
            Some(flight) => {
                flight.detached = true;
                true
            }
            None => false,
        }
    }
}

struct Inner {
    backend: Arc<dyn Backend>,
    ttl: Duration,
    state: Mutex<State>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Outcome counts of a [`PoolCache::prefetch_all`] sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrefetchSummary {
    pub loaded: usize,
    pub failed: usize,
}

/// Cheap to clone; clones share the same entries.
#[derive(Clone)]
pub struct PoolCache {
    inner: Arc<Inner>,
}

impl PoolCache {
    pub fn new(backend: Arc<dyn Backend>, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                ttl,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Cached snapshot for `key`, expired or not. Never does I/O.
    pub fn get(&self, key: &str) -> Option<Arc<PoolSnapshot>> {
        self.inner
            .lock()
            .entries
            .get(key)
            .map(|e| Arc::clone(&e.snapshot))
    }

    /// Present and younger than the TTL.
    pub fn is_fresh(&self, key: &str) -> bool {
        self.inner
            .lock()
            .entries
            .get(key)
            .is_some_and(|e| e.stored_at.elapsed() < self.inner.ttl)
    }

    pub fn cached_keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.inner.lock().entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Drop the entry for `key`.
    ///
    /// A fetch already in flight still answers its callers but no longer
    /// writes into the cache; the next [`fill`](Self::fill) issues a new
    /// request once that fetch has settled.
    pub fn invalidate(&self, key: &str) {
        let mut state = self.inner.lock();
        let had_entry = state.entries.remove(key).is_some();
        let had_fetch = state.detach(key);
        debug!(pool = key, had_entry, had_fetch, "invalidated pool");
    }

    pub fn clear(&self) {
        let mut state = self.inner.lock();
        state.entries.clear();
        for flight in state.in_flight.values_mut() {
            flight.detached = true;
        }
    }

    /// Snapshot for `key`, from cache when fresh and not `force`d.
    ///
    /// Joins the in-flight fetch when it can. A forced fill, or one that
    /// finds the in-flight fetch detached, waits for it to settle and then
    /// fetches again, so two requests for one key never overlap.
    ///
    /// On failure the cache is left as it was, so stale data stays readable.
    pub async fn fill(&self, key: &str, force: bool) -> Result<Arc<PoolSnapshot>> {
        let fetch = {
            let mut state = self.inner.lock();
            if !force
                && let Some(entry) = state.entries.get(key)
                && entry.stored_at.elapsed() < self.inner.ttl
            {
                return Ok(Arc::clone(&entry.snapshot));
            }

            let pending = state
                .in_flight
                .get(key)
                .map(|f| (f.fetch.clone(), f.detached));
            match pending {
                Some((fetch, false)) if !force => {
                    debug!(pool = key, "joining in-flight fetch");
                    fetch
                }
                Some((previous, _)) => {
                    debug!(pool = key, "queueing fetch behind in-flight one");
                    self.start_fetch(&mut state, key, Some(previous))
                }
                None => self.start_fetch(&mut state, key, None),
            }
        };

        fetch.await
    }

    /// Invalidate then fetch in the foreground.
    ///
    /// A fetch already in flight is detached and the new one starts after it.
    pub async fn refresh(&self, key: &str) -> Result<Arc<PoolSnapshot>> {
        self.invalidate(key);
        self.fill(key, true).await
    }

    /// Fill every key that is not cached yet, except `excluding`.
    ///
    /// Fetches run concurrently; the sweep returns once all of them settled.
    /// Failures are logged and counted, never returned.
    pub async fn prefetch_all(&self, keys: &[String], excluding: Option<&str>) -> PrefetchSummary {
        let targets: Vec<&str> = keys
            .iter()
            .map(String::as_str)
            .filter(|k| Some(*k) != excluding && self.get(k).is_none())
            .collect();

        if targets.is_empty() {
            return PrefetchSummary::default();
        }

        info!(count = targets.len(), "prefetching pools");
        let results = join_all(targets.iter().map(|k| self.fill(k, false))).await;

        let mut summary = PrefetchSummary::default();
        for (key, result) in targets.iter().zip(results) {
            match result {
                Ok(_) => summary.loaded += 1,
                Err(e) => {
                    warn!(pool = %key, error = %e, "prefetch failed");
                    summary.failed += 1;
                }
            }
        }

        info!(loaded = summary.loaded, failed = summary.failed, "prefetch sweep finished");
        summary
    }

    /// Spawn the fetch for `key` and register it as in flight, replacing any
    /// fetch already registered. With `after`, the request is only sent once
    /// that fetch has settled.
    ///
    /// Must be called with the state lock held: the task takes the same lock
    /// before settling, so it cannot finish before it is registered.
    fn start_fetch(&self, state: &mut State, key: &str, after: Option<SharedFetch>) -> SharedFetch {
        state.next_id += 1;
        let id = state.next_id;

        let inner = Arc::clone(&self.inner);
        let owned = key.to_string();
        let task = tokio::spawn(async move {
            if let Some(previous) = after {
                let _ = previous.await;
            }
            let started = Instant::now();
            let result = inner.backend.fetch_pool(&owned).await.map(Arc::new);

            let stored = {
                let mut state = inner.lock();
                let current = state.finish(&owned, id);
                if current && let Ok(snapshot) = &result {
                    state.entries.insert(
                        owned.clone(),
                        Entry {
                            snapshot: Arc::clone(snapshot),
                            stored_at: Instant::now(),
                        },
                    );
                }
                current
            };

            let elapsed_ms = started.elapsed().as_millis() as u64;
            match &result {
                Ok(snapshot) => info!(
                    pool = %owned,
                    hosts = snapshot.host_count(),
                    elapsed_ms,
                    stored,
                    "pool snapshot fetched"
                ),
                Err(e) => warn!(pool = %owned, error = %e, elapsed_ms, "pool fetch failed"),
            }
            result
        });

        let inner = Arc::clone(&self.inner);
        let owned = key.to_string();
        let fetch = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    inner.lock().finish(&owned, id);
                    Err(Error::Task(e.to_string()))
                }
            }
        }
        .boxed()
        .shared();

        state.in_flight.insert(
            key.to_string(),
            InFlight {
                id,
                fetch: fetch.clone(),
                detached: false,
            },
        );
        fetch
    }
}
