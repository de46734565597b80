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

use std::{fmt::Debug, sync::Arc, time::Duration};

use roster_common::clock::Clock;
use tokio::{
    sync::{broadcast, Mutex as AsyncMutex},
    time::{interval, MissedTickBehavior},
};

use crate::{map::CacheMap, statistics::Statistics, store::UserStore};

/// Outcome of one write-back sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    /// Entries persisted and marked clean.
    pub flushed: usize,
    /// Entries whose persist call failed. They stay dirty.
    pub failed: usize,
    /// Entries persisted but mutated while the write was in flight. They stay dirty.
    pub superseded: usize,
}

/// Write-back sweeper.
///
/// Each sweep persists every dirty entry of a snapshot and commits the clean transition on the live entry.
///
/// All flushers of one cache share a sweep lock. At most one sweep is in flight at any time.
#[derive(Clone)]
pub struct Flusher {
    map: Arc<CacheMap>,
    store: Arc<dyn UserStore>,
    clock: Arc<dyn Clock>,
    statistics: Arc<Statistics>,
    sweep_lock: Arc<AsyncMutex<()>>,
}

impl Debug for Flusher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flusher").field("store", &self.store).finish()
    }
}

impl Flusher {
    pub(crate) fn new(
        map: Arc<CacheMap>,
        store: Arc<dyn UserStore>,
        clock: Arc<dyn Clock>,
        statistics: Arc<Statistics>,
        sweep_lock: Arc<AsyncMutex<()>>,
    ) -> Self {
        Self {
            map,
            store,
            clock,
            statistics,
            sweep_lock,
        }
    }

    /// Run one write-back sweep. Waits for a sweep already in flight to finish first.
    pub async fn sweep(&self) -> FlushReport {
        let _guard = self.sweep_lock.lock().await;
        let mut report = FlushReport::default();

        let dirty = self.map.snapshot().into_iter().filter(|(_, entry)| entry.is_dirty());
        for (id, entry) in dirty {
            // The map lock is not held here. Touches keep landing while the store works.
            if let Err(e) = self.store.persist(id, entry.record()).await {
                tracing::warn!(id, "[flusher]: Failed to persist user, retry on next sweep, err: {e}");
                report.failed += 1;
                continue;
            }
            if self.map.mark_clean(id, entry.version(), self.clock.now()) {
                report.flushed += 1;
            } else {
                tracing::trace!(id, "[flusher]: User mutated during flush, keep dirty.");
                report.superseded += 1;
            }
        }

        Statistics::inc(&self.statistics.flushes, report.flushed);
        Statistics::inc(&self.statistics.flush_failures, report.failed);
        Statistics::inc(&self.statistics.superseded, report.superseded);

        if report != FlushReport::default() {
            tracing::debug!(
                flushed = report.flushed,
                failed = report.failed,
                superseded = report.superseded,
                "[flusher]: Sweep finished."
            );
        }

        report
    }

    /// Sweep every `period` until a stop signal arrives or the sender is dropped, then drain once more and exit.
    ///
    /// A sweep in progress is never interrupted by the stop signal.
    pub(crate) async fn run(self, period: Duration, mut stop_rx: broadcast::Receiver<()>) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        tracing::info!(?period, "[flusher]: Start.");

        loop {
            tokio::select! {
                biased;
                _ = stop_rx.recv() => {
                    let report = self.sweep().await;
                    tracing::info!(
                        flushed = report.flushed,
                        failed = report.failed,
                        remaining = self.map.dirty(),
                        "[flusher]: Drained on close, exit."
                    );
                    return;
                }
                _ = ticker.tick() => {
                    self.sweep().await;
                }
            }
        }
    }
}
