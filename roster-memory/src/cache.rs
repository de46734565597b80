// Copyright 2026 roster Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{fmt::Debug, future::Future, sync::Arc, time::Duration};

use parking_lot::Mutex;
use roster_common::{
    clock::{Clock, SystemClock},
    error::{Error, Result},
    spawn::{SpawnHandle, Spawner},
    user::{User, UserId},
};
use tokio::sync::{broadcast, Mutex as AsyncMutex};

use crate::{
    config::SweepConfig,
    entry::CacheEntry,
    flusher::Flusher,
    map::CacheMap,
    reclaimer::Reclaimer,
    statistics::{Statistics, StatisticsSnapshot},
    store::UserStore,
};

/// Builder for [`UserCache`].
pub struct CacheBuilder {
    config: SweepConfig,
    clock: Arc<dyn Clock>,
    spawner: Option<Spawner>,
}

impl Debug for CacheBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheBuilder")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .field("spawner", &self.spawner)
            .finish()
    }
}

impl Default for CacheBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheBuilder {
    /// Create a builder with the default sweep timing and the system clock.
    pub fn new() -> Self {
        Self {
            config: SweepConfig::default(),
            clock: Arc::new(SystemClock),
            spawner: None,
        }
    }

    /// Set the period of the write-back sweep.
    ///
    /// Default: 5s.
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.config.flush_interval = interval;
        self
    }

    /// Set the period of the eviction sweep.
    ///
    /// Default: 1s.
    pub fn with_reclaim_interval(mut self, interval: Duration) -> Self {
        self.config.reclaim_interval = interval;
        self
    }

    /// Set how long an entry must stay clean before it can be evicted.
    ///
    /// Default: 60s.
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.config.grace_period = grace_period;
        self
    }

    /// Replace all sweep timings at once.
    pub fn with_config(mut self, config: SweepConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the time source used for clean timestamps and expiry checks.
    ///
    /// Default: [`SystemClock`].
    pub fn with_clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Set where the sweepers are spawned.
    ///
    /// Default: the runtime that calls [`UserCache::start`].
    pub fn with_spawner(mut self, spawner: Spawner) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Build the cache over `store`. The sweepers are not running until [`UserCache::start`] is called.
    pub fn build<S>(self, store: Arc<S>) -> Result<UserCache>
    where
        S: UserStore,
    {
        self.config.validate()?;

        let inner = Inner {
            map: Arc::new(CacheMap::new()),
            store,
            clock: self.clock,
            config: self.config,
            spawner: self.spawner,
            statistics: Arc::default(),
            sweep_lock: Arc::default(),
            workers: Mutex::new(Workers::Idle),
        };
        Ok(UserCache { inner: Arc::new(inner) })
    }
}

enum Workers {
    Idle,
    Running {
        stop_tx: broadcast::Sender<()>,
        handles: Vec<SpawnHandle<()>>,
    },
    Closed,
}

struct Inner {
    map: Arc<CacheMap>,
    store: Arc<dyn UserStore>,
    clock: Arc<dyn Clock>,
    config: SweepConfig,
    spawner: Option<Spawner>,
    statistics: Arc<Statistics>,
    sweep_lock: Arc<AsyncMutex<()>>,
    workers: Mutex<Workers>,
}

/// In-memory write-back buffer for user records.
///
/// [`UserCache::touch`] records a change in memory and returns immediately. The [`Flusher`] persists it later and
/// the [`Reclaimer`] drops it once it has stayed clean for the grace period.
///
/// Cloning is cheap and all clones share the same entries.
#[derive(Clone)]
pub struct UserCache {
    inner: Arc<Inner>,
}

impl Debug for UserCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserCache")
            .field("config", &self.inner.config)
            .field("store", &self.inner.store)
            .field("resident", &self.inner.map.len())
            .finish()
    }
}

impl UserCache {
    /// Create a cache builder.
    pub fn builder() -> CacheBuilder {
        CacheBuilder::new()
    }

    /// Record a created or modified user. The entry becomes dirty until a flush persists it.
    pub fn touch(&self, id: UserId, record: User) {
        Statistics::inc(&self.inner.statistics.touches, 1);
        if self.inner.map.put(id, record, self.inner.clock.now()) {
            tracing::trace!(id, "[cache]: New entry.");
        }
    }

    /// Record a newly created user. Returns `false` without touching the entry if `id` is already resident.
    pub fn insert(&self, id: UserId, record: User) -> bool {
        let inserted = self.inner.map.insert(id, record, self.inner.clock.now());
        if inserted {
            Statistics::inc(&self.inner.statistics.touches, 1);
        }
        inserted
    }

    /// Modify the resident record for `id` in place, or `base` if `id` is not resident, and mark it dirty.
    ///
    /// The read and the write happen under one lock, so concurrent updates of the same user never lose each
    /// other's changes. Returns `None` if `id` is not resident and `base` is `None`.
    pub fn update(&self, id: UserId, base: Option<User>, f: impl FnOnce(&mut User)) -> Option<User> {
        let updated = self.inner.map.update(id, base, self.inner.clock.now(), f);
        if updated.is_some() {
            Statistics::inc(&self.inner.statistics.touches, 1);
        }
        updated
    }

    /// Drop the entry for `id` once `purge` has succeeded, with no flush in flight.
    ///
    /// `purge` usually deletes the record from the store. No sweep runs between its start and the removal of the
    /// entry, so a flush cannot write the record back. If `purge` fails the entry is kept.
    pub async fn remove<T, F>(&self, id: UserId, purge: F) -> Result<(Option<CacheEntry>, T)>
    where
        F: Future<Output = Result<T>>,
    {
        let _guard = self.inner.sweep_lock.lock().await;
        let purged = purge.await?;
        let removed = self.inner.map.delete(id);
        if removed.is_some() {
            tracing::trace!(id, "[cache]: Entry removed.");
        }
        Ok((removed, purged))
    }

    /// The resident record for `id`, if any.
    ///
    /// A miss says nothing about the persistent store, and a miss never loads the record into the cache.
    pub fn try_get(&self, id: UserId) -> Option<User> {
        self.inner.map.get(id)
    }

    /// Copy of the resident entry for `id` with its bookkeeping.
    pub fn entry(&self, id: UserId) -> Option<CacheEntry> {
        self.inner.map.entry(id)
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.inner.map.len()
    }

    /// Whether no entry is resident.
    pub fn is_empty(&self) -> bool {
        self.inner.map.is_empty()
    }

    /// Number of resident entries not yet persisted.
    pub fn dirty(&self) -> usize {
        self.inner.map.dirty()
    }

    /// Sweep timing of this cache.
    pub fn config(&self) -> &SweepConfig {
        &self.inner.config
    }

    /// Counters since the cache was built.
    pub fn statistics(&self) -> StatisticsSnapshot {
        self.inner.statistics.snapshot()
    }

    /// A write-back sweeper over this cache, for driving sweeps by hand.
    pub fn flusher(&self) -> Flusher {
        Flusher::new(
            self.inner.map.clone(),
            self.inner.store.clone(),
            self.inner.clock.clone(),
            self.inner.statistics.clone(),
            self.inner.sweep_lock.clone(),
        )
    }

    /// An eviction sweeper over this cache, for driving sweeps by hand.
    pub fn reclaimer(&self) -> Reclaimer {
        Reclaimer::new(
            self.inner.map.clone(),
            self.inner.clock.clone(),
            self.inner.config.grace_period,
            self.inner.statistics.clone(),
        )
    }

    /// Spawn both background sweepers.
    ///
    /// Calling `start` on a running cache is a no-op. A closed cache cannot be restarted.
    pub fn start(&self) -> Result<()> {
        let mut workers = self.inner.workers.lock();
        match &*workers {
            Workers::Running { .. } => return Ok(()),
            Workers::Closed => return Err(Error::closed()),
            Workers::Idle => {}
        }

        let spawner = match &self.inner.spawner {
            Some(spawner) => spawner.clone(),
            None => Spawner::try_current()?,
        };

        let (stop_tx, _) = broadcast::channel(1);
        let handles = vec![
            spawner.spawn(
                self.flusher()
                    .run(self.inner.config.flush_interval, stop_tx.subscribe()),
            ),
            spawner.spawn(
                self.reclaimer()
                    .run(self.inner.config.reclaim_interval, stop_tx.subscribe()),
            ),
        ];
        *workers = Workers::Running { stop_tx, handles };

        tracing::info!(config = ?self.inner.config, "[cache]: Sweepers started.");
        Ok(())
    }

    /// Stop both sweepers and wait for them to exit.
    ///
    /// An in-flight flush completes and the remaining dirty entries are drained once before exit, also when the
    /// sweepers were never started or the cache is already closed. Entries that still fail to persist stay in memory
    /// and are lost with the process.
    pub async fn close(&self) -> Result<()> {
        let workers = std::mem::replace(&mut *self.inner.workers.lock(), Workers::Closed);
        let (stop_tx, handles) = match workers {
            Workers::Running { stop_tx, handles } => (stop_tx, handles),
            Workers::Idle | Workers::Closed => {
                let report = self.flusher().sweep().await;
                tracing::info!(
                    flushed = report.flushed,
                    failed = report.failed,
                    remaining = self.inner.map.dirty(),
                    "[cache]: Drained on close without sweepers."
                );
                return Ok(());
            }
        };

        // Receivers may already be gone if a sweeper panicked. The join below reports that.
        let _ = stop_tx.send(());

        let mut res = Ok(());
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!("[cache]: Sweeper exited abnormally, err: {e}");
                res = res.and(Err(e));
            }
        }

        tracing::info!(dirty = self.inner.map.dirty(), "[cache]: Closed.");
        res
    }
}
