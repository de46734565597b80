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

//! In-memory write-back cache for user records.
//!
//! Changes are recorded with [`UserCache::touch`] and become dirty entries of a shared [`CacheMap`]. Two background
//! sweepers work over the map:
//!
//! - [`Flusher`] persists dirty entries through a [`UserStore`] and marks them clean.
//! - [`Reclaimer`] evicts entries that have stayed clean for longer than the grace period.
//!
//! Both sweepers commit against the live entry rather than the snapshot they iterate, so a touch that races a sweep
//! is never marked clean nor evicted before it is persisted.

mod cache;
mod config;
mod entry;
mod flusher;
mod map;
mod reclaimer;
mod statistics;
mod store;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

mod prelude;
pub use prelude::*;
