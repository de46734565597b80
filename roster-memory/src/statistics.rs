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

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;

/// Counters updated by the cache and its sweepers.
#[derive(Debug, Default)]
pub struct Statistics {
    pub(crate) touches: AtomicUsize,
    pub(crate) flushes: AtomicUsize,
    pub(crate) flush_failures: AtomicUsize,
    pub(crate) superseded: AtomicUsize,
    pub(crate) evictions: AtomicUsize,
}

/// Point-in-time copy of [`Statistics`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatisticsSnapshot {
    /// Recorded mutations: touches, inserts and updates.
    pub touches: usize,
    /// Entries persisted and marked clean.
    pub flushes: usize,
    /// Persist calls that returned an error.
    pub flush_failures: usize,
    /// Entries persisted but left dirty because they were mutated mid-flush.
    pub superseded: usize,
    /// Entries removed by the reclaimer.
    pub evictions: usize,
}

impl Statistics {
    pub(crate) fn inc(counter: &AtomicUsize, n: usize) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Load all counters.
    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            touches: self.touches.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            flush_failures: self.flush_failures.load(Ordering::Relaxed),
            superseded: self.superseded.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}
