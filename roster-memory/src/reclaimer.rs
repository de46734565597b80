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

use itertools::Itertools;
use roster_common::clock::Clock;
use tokio::{
    sync::broadcast,
    time::{interval, MissedTickBehavior},
};

use crate::{map::CacheMap, statistics::Statistics};

/// Eviction sweeper.
///
/// Drops entries that have stayed clean for longer than the grace period. Dirty entries are never touched.
#[derive(Clone)]
pub struct Reclaimer {
    map: Arc<CacheMap>,
    clock: Arc<dyn Clock>,
    grace_period: Duration,
    statistics: Arc<Statistics>,
}

impl Debug for Reclaimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reclaimer")
            .field("grace_period", &self.grace_period)
            .finish()
    }
}

impl Reclaimer {
    pub(crate) fn new(
        map: Arc<CacheMap>,
        clock: Arc<dyn Clock>,
        grace_period: Duration,
        statistics: Arc<Statistics>,
    ) -> Self {
        Self {
            map,
            clock,
            grace_period,
            statistics,
        }
    }

    /// Run one eviction sweep. Returns the number of evicted entries.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let candidates = self
            .map
            .snapshot()
            .into_iter()
            .filter(|(_, entry)| entry.is_expired(now, self.grace_period))
            .map(|(id, _)| id)
            .collect_vec();

        // Candidates come from a copy. Each delete re-checks the live entry, which may have been touched since.
        let mut evicted = 0;
        for id in candidates {
            if self.map.remove_if_expired(id, self.clock.now(), self.grace_period) {
                tracing::trace!(id, "[reclaimer]: Evict user.");
                evicted += 1;
            }
        }

        if evicted > 0 {
            Statistics::inc(&self.statistics.evictions, evicted);
            tracing::debug!(evicted, resident = self.map.len(), "[reclaimer]: Sweep finished.");
        }

        evicted
    }

    /// Sweep every `period` until a stop signal arrives or the sender is dropped.
    pub(crate) async fn run(self, period: Duration, mut stop_rx: broadcast::Receiver<()>) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        tracing::info!(?period, grace_period = ?self.grace_period, "[reclaimer]: Start.");

        loop {
            tokio::select! {
                biased;
                _ = stop_rx.recv() => {
                    tracing::info!("[reclaimer]: Exit.");
                    return;
                }
                _ = ticker.tick() => {
                    self.sweep();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use roster_common::{clock::ManualClock, user::User};

    use super::*;

    const GRACE: Duration = Duration::from_secs(60);

    fn reclaimer(map: &Arc<CacheMap>, clock: &ManualClock) -> Reclaimer {
        Reclaimer::new(
            map.clone(),
            Arc::new(clock.clone()),
            GRACE,
            Arc::new(Statistics::default()),
        )
    }

    #[test]
    fn test_evict_only_after_grace_period() {
        let clock = ManualClock::new();
        let map = Arc::new(CacheMap::new());
        let reclaimer = reclaimer(&map, &clock);

        map.put(1, User::new(1, "a"), clock.now());
        map.mark_clean(1, 1, clock.now());

        clock.advance(GRACE - Duration::from_secs(1));
        assert_eq!(reclaimer.sweep(), 0);
        clock.advance(Duration::from_secs(1));
        assert_eq!(reclaimer.sweep(), 0);
        clock.advance(Duration::from_millis(1));
        assert_eq!(reclaimer.sweep(), 1);
        assert!(map.is_empty());
    }

    #[test]
    fn test_never_evict_dirty() {
        let clock = ManualClock::new();
        let map = Arc::new(CacheMap::new());
        let reclaimer = reclaimer(&map, &clock);

        map.put(1, User::new(1, "a"), clock.now());
        for _ in 0..10 {
            clock.advance(GRACE * 10);
            assert_eq!(reclaimer.sweep(), 0);
        }
        assert!(map.entry(1).unwrap().is_dirty());
    }

    #[test]
    fn test_touched_entry_survives_sweep() {
        let clock = ManualClock::new();
        let map = Arc::new(CacheMap::new());
        let reclaimer = reclaimer(&map, &clock);

        map.put(1, User::new(1, "a"), clock.now());
        map.put(2, User::new(2, "b"), clock.now());
        map.mark_clean(1, 1, clock.now());
        map.mark_clean(2, 1, clock.now());

        clock.advance(GRACE * 2);
        // Re-dirty 2 before the sweep; only 1 goes.
        map.put(2, User::new(2, "b2"), clock.now());
        assert_eq!(reclaimer.sweep(), 1);
        assert!(map.get(1).is_none());
        assert_eq!(map.get(2).unwrap().login, "b2");
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_run_exits_when_sender_dropped() {
        let clock = ManualClock::new();
        let map = Arc::new(CacheMap::new());
        let (stop_tx, stop_rx) = broadcast::channel::<()>(1);
        let handle = tokio::spawn(reclaimer(&map, &clock).run(Duration::from_secs(1), stop_rx));
        drop(stop_tx);
        handle.await.unwrap();
    }
}
