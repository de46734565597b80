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

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use futures_util::{future::BoxFuture, FutureExt};
use hashbrown::HashMap;
use parking_lot::Mutex;
use roster_common::{
    error::{Error, ErrorKind, Result},
    user::{User, UserId},
};
use roster_memory::UserStore;

/// Direct access to the persistent store, outside the write-back path.
pub trait UserLookup: Send + Sync + 'static {
    /// Load the persisted record for `id`. `Ok(None)` means the store has no such user.
    fn load(&self, id: UserId) -> BoxFuture<'_, Result<Option<User>>>;

    /// Delete the persisted record for `id`. Returns whether a record was deleted.
    fn remove(&self, id: UserId) -> BoxFuture<'_, Result<bool>>;
}

/// Errors raised by [`MemoryStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An injected failure.
    #[error("store is unavailable")]
    Unavailable,
    /// The record does not carry the id it is written under.
    #[error("record id {found} does not match key {expected}")]
    IdMismatch {
        /// Key the record is written under.
        expected: UserId,
        /// Id carried by the record.
        found: UserId,
    },
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        Error::new(ErrorKind::Persist, "memory store rejected the request").with_source(e)
    }
}

/// Counters of a [`MemoryStore`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StoreStatistics {
    /// Accepted writes.
    pub persisted: usize,
    /// Rejected writes.
    pub rejected: usize,
    /// Lookups served.
    pub loads: usize,
    /// Records deleted.
    pub removed: usize,
}

/// In-memory persistent store with injectable write failures.
///
/// Writes are upserts, so repeating a write is harmless.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<UserId, User>>,
    /// Bits of an `f64` in `[0.0, 1.0]`.
    failure_ratio: AtomicU64,
    persisted: AtomicUsize,
    rejected: AtomicUsize,
    loads: AtomicUsize,
    removed: AtomicUsize,
}

impl MemoryStore {
    /// Create an empty store that accepts all writes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the probability that a write is rejected. The value is clamped to `[0.0, 1.0]`.
    pub fn set_failure_ratio(&self, ratio: f64) {
        let ratio = if ratio.is_nan() { 0.0 } else { ratio.clamp(0.0, 1.0) };
        self.failure_ratio.store(ratio.to_bits(), Ordering::Relaxed);
    }

    /// Probability that a write is rejected.
    pub fn failure_ratio(&self) -> f64 {
        f64::from_bits(self.failure_ratio.load(Ordering::Relaxed))
    }

    /// Reject every write from now on, or stop rejecting.
    pub fn set_failing(&self, failing: bool) {
        self.set_failure_ratio(if failing { 1.0 } else { 0.0 });
    }

    /// Seed the store with a record, bypassing failure injection and counters.
    pub fn seed(&self, record: User) {
        self.users.lock().insert(record.id, record);
    }

    /// The persisted record for `id`.
    pub fn get(&self, id: UserId) -> Option<User> {
        self.users.lock().get(&id).cloned()
    }

    /// Number of persisted records.
    pub fn len(&self) -> usize {
        self.users.lock().len()
    }

    /// Whether nothing has been persisted.
    pub fn is_empty(&self) -> bool {
        self.users.lock().is_empty()
    }

    /// Counters since the store was created.
    pub fn statistics(&self) -> StoreStatistics {
        StoreStatistics {
            persisted: self.persisted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            removed: self.removed.load(Ordering::Relaxed),
        }
    }

    fn should_fail(&self) -> bool {
        match self.failure_ratio() {
            r if r <= 0.0 => false,
            r if r >= 1.0 => true,
            r => rand::random_bool(r),
        }
    }

    fn write(&self, id: UserId, record: &User) -> std::result::Result<(), StoreError> {
        if record.id != id {
            return Err(StoreError::IdMismatch {
                expected: id,
                found: record.id,
            });
        }
        if self.should_fail() {
            return Err(StoreError::Unavailable);
        }
        self.users.lock().insert(id, record.clone());
        Ok(())
    }
}

impl UserStore for MemoryStore {
    fn persist<'a>(&'a self, id: UserId, record: &'a User) -> BoxFuture<'a, Result<()>> {
        async move {
            match self.write(id, record) {
                Ok(()) => {
                    self.persisted.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                }
                Err(e) => {
                    self.rejected.fetch_add(1, Ordering::Relaxed);
                    Err(Error::from(e).with_context("id", id))
                }
            }
        }
        .boxed()
    }
}

impl UserLookup for MemoryStore {
    fn load(&self, id: UserId) -> BoxFuture<'_, Result<Option<User>>> {
        async move {
            self.loads.fetch_add(1, Ordering::Relaxed);
            Ok(self.get(id))
        }
        .boxed()
    }

    fn remove(&self, id: UserId) -> BoxFuture<'_, Result<bool>> {
        async move {
            if self.should_fail() {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                return Err(Error::from(StoreError::Unavailable).with_context("id", id));
            }
            let removed = self.users.lock().remove(&id).is_some();
            if removed {
                self.removed.fetch_add(1, Ordering::Relaxed);
            }
            Ok(removed)
        }
        .boxed()
    }
}
