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

use roster_common::user::{User, UserId};

/// A resident user record with its write-back bookkeeping.
///
/// Entries handed out by the cache are copies. Mutating the live entry is only possible through
/// [`crate::CacheMap`].
#[derive(Debug, Clone)]
pub struct CacheEntry {
    id: UserId,
    record: User,
    dirty: bool,
    last_clean_at: Instant,
    /// Bumped on every mutation. A flush commits only if the version it persisted is still current.
    version: u64,
}

impl CacheEntry {
    /// A freshly touched entry is dirty and counts its creation as its last clean instant.
    pub(crate) fn new(id: UserId, record: User, now: Instant) -> Self {
        Self {
            id,
            record,
            dirty: true,
            last_clean_at: now,
            version: 1,
        }
    }

    pub(crate) fn replace(&mut self, record: User) {
        self.record = record;
        self.dirty = true;
        self.version += 1;
    }

    pub(crate) fn modify(&mut self, f: impl FnOnce(&mut User)) {
        f(&mut self.record);
        self.dirty = true;
        self.version += 1;
    }

    pub(crate) fn mark_clean(&mut self, now: Instant) {
        self.dirty = false;
        self.last_clean_at = now;
    }

    /// Record key.
    pub fn id(&self) -> UserId {
        self.id
    }

    /// The resident record.
    pub fn record(&self) -> &User {
        &self.record
    }

    /// Whether the record has changes not yet persisted.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Instant of the last dirty-to-clean transition, or of creation.
    pub fn last_clean_at(&self) -> Instant {
        self.last_clean_at
    }

    /// Mutation counter.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Whether the entry is clean and has stayed clean for strictly longer than `grace`.
    pub fn is_expired(&self, now: Instant, grace: Duration) -> bool {
        !self.dirty && now.saturating_duration_since(self.last_clean_at) > grace
    }
}
