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

use std::time::{Duration, Instant};

use hashbrown::{hash_map::Entry, HashMap};
use parking_lot::Mutex;
use roster_common::user::{User, UserId};

use crate::entry::CacheEntry;

/// The set of resident entries, guarded by a single map-wide lock.
///
/// Every method is one critical section. Callers never get a reference into the map, only copies, and the lock is
/// never held across an await point.
#[derive(Debug, Default)]
pub struct CacheMap {
    entries: Mutex<HashMap<UserId, CacheEntry>>,
}

impl CacheMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record for `id` and mark it dirty. The record is always stored under `id`.
    ///
    /// Returns `true` if a new entry was created.
    pub fn put(&self, id: UserId, mut record: User, now: Instant) -> bool {
        record.id = id;
        match self.entries.lock().entry(id) {
            Entry::Occupied(mut o) => {
                o.get_mut().replace(record);
                false
            }
            Entry::Vacant(v) => {
                v.insert(CacheEntry::new(id, record, now));
                true
            }
        }
    }

    /// Insert `record` as a new dirty entry. Returns `false` and leaves the map untouched if `id` is resident.
    pub fn insert(&self, id: UserId, mut record: User, now: Instant) -> bool {
        record.id = id;
        match self.entries.lock().entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(v) => {
                v.insert(CacheEntry::new(id, record, now));
                true
            }
        }
    }

    /// Apply `f` to the record for `id` in place and mark it dirty.
    ///
    /// If `id` is not resident, `f` is applied to `base` instead, which then becomes a new entry. Returns a copy of
    /// the result, or `None` if `id` is not resident and there is no `base`. `f` cannot change the id.
    pub fn update(&self, id: UserId, base: Option<User>, now: Instant, f: impl FnOnce(&mut User)) -> Option<User> {
        let f = |record: &mut User| {
            f(record);
            record.id = id;
        };
        match self.entries.lock().entry(id) {
            Entry::Occupied(mut o) => {
                o.get_mut().modify(f);
                Some(o.get().record().clone())
            }
            Entry::Vacant(v) => {
                let mut record = base?;
                f(&mut record);
                Some(v.insert(CacheEntry::new(id, record, now)).record().clone())
            }
        }
    }

    /// Copy of the resident record for `id`.
    pub fn get(&self, id: UserId) -> Option<User> {
        self.entries.lock().get(&id).map(|e| e.record().clone())
    }

    /// Copy of the resident entry for `id`, bookkeeping included.
    pub fn entry(&self, id: UserId) -> Option<CacheEntry> {
        self.entries.lock().get(&id).cloned()
    }

    /// Remove the entry for `id` regardless of its state.
    pub fn delete(&self, id: UserId) -> Option<CacheEntry> {
        self.entries.lock().remove(&id)
    }

    /// Point-in-time copy of all resident entries, in no particular order.
    pub fn snapshot(&self) -> Vec<(UserId, CacheEntry)> {
        self.entries.lock().iter().map(|(id, e)| (*id, e.clone())).collect()
    }

    /// Commit a successful flush of `version` to the live entry.
    ///
    /// The entry is marked clean only if it is still at `version`. A mutation that landed after the flushed copy was
    /// taken leaves it dirty. Returns whether the entry was marked clean.
    pub fn mark_clean(&self, id: UserId, version: u64, now: Instant) -> bool {
        match self.entries.lock().get_mut(&id) {
            Some(entry) if entry.version() == version => {
                entry.mark_clean(now);
                true
            }
            _ => false,
        }
    }

    /// Remove the live entry for `id` only if it is still clean and still older than `grace`.
    pub fn remove_if_expired(&self, id: UserId, now: Instant, grace: Duration) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(&id) {
            Some(entry) if entry.is_expired(now, grace) => {
                entries.remove(&id);
                true
            }
            _ => false,
        }
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no entry is resident.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Number of resident entries that are dirty.
    pub fn dirty(&self) -> usize {
        self.entries.lock().values().filter(|e| e.is_dirty()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRACE: Duration = Duration::from_secs(60);

    #[test]
    fn test_put_get_delete() {
        let map = CacheMap::new();
        let now = Instant::now();

        assert!(map.put(1, User::new(1, "a"), now));
        assert!(!map.put(1, User::new(1, "b"), now));
        assert_eq!(map.get(1).unwrap().login, "b");
        assert_eq!(map.len(), 1);
        assert_eq!(map.dirty(), 1);

        assert!(map.delete(1).is_some());
        assert!(map.get(1).is_none());
        assert!(map.is_empty());
    }

    #[test]
    fn test_record_is_stored_under_its_key() {
        let map = CacheMap::new();
        let now = Instant::now();

        map.put(1, User::new(2, "a"), now);
        assert_eq!(map.get(1).unwrap().id, 1);
        assert!(map.get(2).is_none());

        map.insert(3, User::new(4, "b"), now);
        assert_eq!(map.get(3).unwrap().id, 3);

        let user = map.update(3, None, now, |u| u.id = 5).unwrap();
        assert_eq!(user.id, 3);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_insert_keeps_resident_entry() {
        let map = CacheMap::new();
        let now = Instant::now();

        assert!(map.insert(1, User::new(1, "a"), now));
        assert!(!map.insert(1, User::new(1, "b"), now));
        assert_eq!(map.get(1).unwrap().login, "a");
        assert_eq!(map.entry(1).unwrap().version(), 1);
    }

    #[test]
    fn test_update_in_place_or_from_base() {
        let map = CacheMap::new();
        let now = Instant::now();

        assert!(map.update(1, None, now, |u| u.status = false).is_none());
        assert!(map.is_empty());

        let user = map.update(1, Some(User::new(1, "a")), now, |u| u.status = false).unwrap();
        assert!(!user.status);
        assert!(map.entry(1).unwrap().is_dirty());

        map.mark_clean(1, 1, now);
        // The resident record wins over a base loaded elsewhere.
        let user = map.update(1, Some(User::new(1, "stale")), now, |u| u.email = "a@b".to_string()).unwrap();
        assert_eq!(user.login, "a");
        assert!(!user.status);
        let entry = map.entry(1).unwrap();
        assert!(entry.is_dirty());
        assert_eq!(entry.version(), 2);
    }

    #[test]
    fn test_mark_clean_rejects_stale_version() {
        let map = CacheMap::new();
        let now = Instant::now();

        map.put(1, User::new(1, "a"), now);
        let flushed = map.entry(1).unwrap().version();

        // A newer mutation arrives before the flush commits.
        map.put(1, User::new(1, "b"), now);
        assert!(!map.mark_clean(1, flushed, now));
        assert!(map.entry(1).unwrap().is_dirty());

        let current = map.entry(1).unwrap().version();
        assert!(map.mark_clean(1, current, now));
        assert!(!map.entry(1).unwrap().is_dirty());
    }

    #[test]
    fn test_mark_clean_on_missing_entry() {
        let map = CacheMap::new();
        assert!(!map.mark_clean(42, 1, Instant::now()));
    }

    #[test]
    fn test_remove_if_expired_rechecks_live_entry() {
        let map = CacheMap::new();
        let t0 = Instant::now();

        map.put(1, User::new(1, "a"), t0);
        map.mark_clean(1, 1, t0);

        // Looked expired when the snapshot was taken ...
        let later = t0 + GRACE + Duration::from_secs(1);
        let stale = map.snapshot();
        assert!(stale[0].1.is_expired(later, GRACE));

        // ... but got dirtied again before the delete.
        map.put(1, User::new(1, "b"), later);
        assert!(!map.remove_if_expired(1, later, GRACE));
        assert_eq!(map.get(1).unwrap().login, "b");
    }

    #[test]
    fn test_remove_if_expired_respects_grace() {
        let map = CacheMap::new();
        let t0 = Instant::now();

        map.put(1, User::new(1, "a"), t0);
        map.mark_clean(1, 1, t0);

        assert!(!map.remove_if_expired(1, t0 + GRACE, GRACE));
        assert!(map.remove_if_expired(1, t0 + GRACE + Duration::from_millis(1), GRACE));
        assert!(map.is_empty());
    }

    #[test]
    fn test_snapshot_is_detached() {
        let map = CacheMap::new();
        let now = Instant::now();
        map.put(1, User::new(1, "a"), now);
        map.put(2, User::new(2, "b"), now);

        let snapshot = map.snapshot();
        map.put(1, User::new(1, "c"), now);

        let (_, first) = snapshot.iter().find(|(id, _)| *id == 1).unwrap();
        assert_eq!(first.record().login, "a");
        assert_eq!(snapshot.len(), 2);
    }
}
