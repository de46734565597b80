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

use std::{sync::Arc, time::Duration};

use roster::prelude::*;
use roster_memory::test_utils::GatedStore;

const GRACE: Duration = Duration::from_secs(60);

fn open(store: Arc<MemoryStore>) -> (UserCache, ManualClock) {
    let clock = ManualClock::new();
    let cache = CacheBuilder::new()
        .with_grace_period(GRACE)
        .with_clock(clock.clone())
        .build(store)
        .unwrap();
    (cache, clock)
}

#[test_log::test(tokio::test)]
async fn test_touch_flush_evict_lifecycle() {
    let store = Arc::new(MemoryStore::new());
    let (cache, clock) = open(store.clone());

    cache.touch(1, User::new(1, "a"));
    let entry = cache.entry(1).unwrap();
    assert!(entry.is_dirty());
    assert_eq!(entry.record().login, "a");

    let report = cache.flusher().sweep().await;
    assert_eq!(report.flushed, 1);
    assert!(!cache.entry(1).unwrap().is_dirty());
    assert_eq!(store.get(1).unwrap().login, "a");

    clock.advance(GRACE / 2);
    assert_eq!(cache.reclaimer().sweep(), 0);
    assert!(cache.entry(1).is_some());

    clock.advance(GRACE);
    assert_eq!(cache.reclaimer().sweep(), 1);
    assert!(cache.entry(1).is_none());
    // Evicted, not lost.
    assert_eq!(store.get(1).unwrap().login, "a");
}

#[test_log::test(tokio::test)]
async fn test_failing_store_pins_entry() {
    let store = Arc::new(MemoryStore::new());
    store.set_failing(true);
    let (cache, clock) = open(store.clone());

    cache.touch(2, User::new(2, "b"));
    let report = cache.flusher().sweep().await;
    assert_eq!(report.failed, 1);
    assert!(cache.entry(2).unwrap().is_dirty());

    for _ in 0..5 {
        clock.advance(GRACE * 2);
        assert_eq!(cache.reclaimer().sweep(), 0);
        cache.flusher().sweep().await;
    }
    let entry = cache.entry(2).unwrap();
    assert!(entry.is_dirty());
    assert_eq!(entry.record().login, "b");
    assert!(store.is_empty());
    assert_eq!(cache.statistics().flush_failures, 6);

    store.set_failing(false);
    assert_eq!(cache.flusher().sweep().await.flushed, 1);
    assert_eq!(store.get(2).unwrap().login, "b");
}

#[test_log::test(tokio::test)]
async fn test_dirty_until_flushed() {
    let store = Arc::new(MemoryStore::new());
    let (cache, clock) = open(store.clone());

    for id in 0..8 {
        cache.touch(id, User::new(id, format!("user-{id}")));
    }
    clock.advance(GRACE * 10);
    cache.reclaimer().sweep();
    assert_eq!(cache.dirty(), 8);
    assert!(store.is_empty());

    cache.flusher().sweep().await;
    assert_eq!(cache.dirty(), 0);
    assert_eq!(store.len(), 8);
}

#[test_log::test(tokio::test)]
async fn test_clean_timestamp_only_moves_on_flush() {
    let store = Arc::new(MemoryStore::new());
    let (cache, clock) = open(store.clone());

    cache.touch(1, User::new(1, "a"));
    cache.flusher().sweep().await;
    let flushed_at = cache.entry(1).unwrap().last_clean_at();

    clock.advance(GRACE / 2);
    cache.touch(1, User::new(1, "b"));
    assert_eq!(cache.entry(1).unwrap().last_clean_at(), flushed_at);

    clock.advance(GRACE / 4);
    cache.flusher().sweep().await;
    assert_eq!(cache.entry(1).unwrap().last_clean_at(), clock.now());

    // The grace period restarts from the second flush.
    clock.advance(GRACE - GRACE / 4);
    assert_eq!(cache.reclaimer().sweep(), 0);
    clock.advance(GRACE / 2);
    assert_eq!(cache.reclaimer().sweep(), 1);
}

#[test_log::test(tokio::test)]
async fn test_grace_period_is_strict() {
    let store = Arc::new(MemoryStore::new());
    let (cache, clock) = open(store);

    cache.touch(1, User::new(1, "a"));
    cache.flusher().sweep().await;

    clock.advance(GRACE);
    assert_eq!(cache.reclaimer().sweep(), 0);
    clock.advance(Duration::from_nanos(1));
    assert_eq!(cache.reclaimer().sweep(), 1);
}

#[test_log::test(tokio::test)]
async fn test_touch_between_snapshot_and_commit() {
    let store = Arc::new(GatedStore::new());
    let clock = ManualClock::new();
    let cache = CacheBuilder::new()
        .with_grace_period(GRACE)
        .with_clock(clock.clone())
        .build(store.clone())
        .unwrap();

    cache.touch(1, User::new(1, "v1"));

    let flusher = cache.flusher();
    let sweep = tokio::spawn(async move { flusher.sweep().await });
    store.wait_entered().await;
    cache.touch(1, User::new(1, "v2"));
    store.release();
    let report = sweep.await.unwrap();
    assert_eq!(report.superseded, 1);

    // v2 was never written, so it must not look clean nor be evictable.
    let entry = cache.entry(1).unwrap();
    assert!(entry.is_dirty());
    assert_eq!(entry.record().login, "v2");
    clock.advance(GRACE * 2);
    assert_eq!(cache.reclaimer().sweep(), 0);
    assert_eq!(cache.statistics().superseded, 1);
}

#[test_log::test(tokio::test)]
async fn test_retouch_after_expiry_survives_sweep() {
    let store = Arc::new(MemoryStore::new());
    let (cache, clock) = open(store.clone());

    cache.touch(1, User::new(1, "a"));
    cache.flusher().sweep().await;
    clock.advance(GRACE * 2);

    cache.touch(1, User::new(1, "b"));
    assert_eq!(cache.reclaimer().sweep(), 0);
    assert_eq!(cache.try_get(1).unwrap().login, "b");
}

#[test_log::test(tokio::test)]
async fn test_concurrent_group_updates_are_not_lost() {
    let store = Arc::new(MemoryStore::new());
    let (cache, _) = open(store.clone());
    let directory = Directory::new(cache, store.clone());
    directory.create_user(User::new(1, "alice")).await.unwrap();

    let tasks = (0..32u64)
        .map(|group| {
            let directory = directory.clone();
            tokio::spawn(async move { directory.add_to_group(1, group).await })
        })
        .collect::<Vec<_>>();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let mut groups = directory.get_user(1).await.unwrap().unwrap().groups;
    groups.sort_unstable();
    assert_eq!(groups, (0..32).collect::<Vec<_>>());

    directory.cache().flusher().sweep().await;
    assert_eq!(store.get(1).unwrap().groups.len(), 32);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_directory_writes_back_in_background() {
    let store = Arc::new(MemoryStore::new());
    let directory = Directory::open(
        CacheBuilder::new()
            .with_flush_interval(Duration::from_secs(5))
            .with_reclaim_interval(Duration::from_secs(1)),
        store.clone(),
    )
    .unwrap();

    directory.create_user(User::new(7, "grace")).await.unwrap();
    directory.set_status(7, true).await.unwrap();
    assert!(store.get(7).is_none());

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(store.get(7).unwrap().status);

    directory.set_status(7, false).await.unwrap();
    directory.close().await.unwrap();
    assert!(!store.get(7).unwrap().status);
    assert_eq!(directory.cache().dirty(), 0);
}

#[test_log::test(tokio::test)]
async fn test_record_with_foreign_id_is_flushed_under_key() {
    let store = Arc::new(MemoryStore::new());
    let (cache, clock) = open(store.clone());

    cache.touch(1, User::new(2, "x"));
    assert_eq!(cache.flusher().sweep().await.flushed, 1);
    assert_eq!(store.get(1).unwrap().id, 1);
    assert!(store.get(2).is_none());
    assert_eq!(store.statistics().rejected, 0);

    clock.advance(GRACE * 2);
    assert_eq!(cache.reclaimer().sweep(), 1);
    assert!(cache.is_empty());
}

#[test_log::test(tokio::test)]
async fn test_overlapping_sweeps_keep_store_current() {
    let store = Arc::new(GatedStore::new());
    let clock = ManualClock::new();
    let cache = CacheBuilder::new()
        .with_grace_period(GRACE)
        .with_clock(clock.clone())
        .build(store.clone())
        .unwrap();

    cache.touch(1, User::new(1, "v1"));
    let slow = tokio::spawn({
        let flusher = cache.flusher();
        async move { flusher.sweep().await }
    });
    store.wait_entered().await;

    cache.touch(1, User::new(1, "v2"));
    let fast = tokio::spawn({
        let flusher = cache.flusher();
        async move { flusher.sweep().await }
    });

    store.release();
    assert_eq!(slow.await.unwrap().superseded, 1);
    store.wait_entered().await;
    store.release();
    assert_eq!(fast.await.unwrap().flushed, 1);

    // The last write to reach the store is the one the clean entry holds.
    let writes = store.writes();
    assert_eq!(writes.last().unwrap().1.login, "v2");
    let entry = cache.entry(1).unwrap();
    assert!(!entry.is_dirty());
    assert_eq!(entry.record().login, "v2");
}

#[test_log::test(tokio::test)]
async fn test_close_without_start_persists_dirty_users() {
    let store = Arc::new(MemoryStore::new());
    let (cache, _) = open(store.clone());
    let directory = Directory::new(cache, store.clone());

    directory.create_user(User::new(1, "alice")).await.unwrap();
    directory.add_to_group(1, 7).await.unwrap();
    directory.close().await.unwrap();

    assert_eq!(directory.cache().dirty(), 0);
    assert_eq!(store.get(1).unwrap().groups, vec![7]);
}
