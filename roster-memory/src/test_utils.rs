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

//! Stores for testing the write-back path.

use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{future::BoxFuture, FutureExt};
use parking_lot::Mutex;
use roster_common::{
    error::{Error, ErrorKind, Result},
    user::{User, UserId},
};
use tokio::sync::Notify;

use crate::store::UserStore;

/// Store that records every successful write and can be switched into failing mode.
#[derive(Debug, Default)]
pub struct RecordingStore {
    failing: AtomicBool,
    writes: Mutex<Vec<(UserId, User)>>,
}

impl RecordingStore {
    /// Create a store that accepts writes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that rejects all writes.
    pub fn failing() -> Self {
        let store = Self::default();
        store.set_failing(true);
        store
    }

    /// Switch failing mode on or off.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    /// All accepted writes in order.
    pub fn writes(&self) -> Vec<(UserId, User)> {
        self.writes.lock().clone()
    }
}

impl UserStore for RecordingStore {
    fn persist<'a>(&'a self, id: UserId, record: &'a User) -> BoxFuture<'a, Result<()>> {
        async move {
            if self.failing.load(Ordering::Relaxed) {
                return Err(Error::new(ErrorKind::Persist, "injected failure").with_context("id", id));
            }
            self.writes.lock().push((id, record.clone()));
            Ok(())
        }
        .boxed()
    }
}

/// Store that parks every write until released, to interleave mutations with an in-flight flush.
#[derive(Debug, Default)]
pub struct GatedStore {
    entered: Notify,
    release: Notify,
    writes: Mutex<Vec<(UserId, User)>>,
}

impl GatedStore {
    /// Create a closed gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until a write has reached the gate.
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    /// Let one parked write through.
    pub fn release(&self) {
        self.release.notify_one();
    }

    /// All completed writes in order.
    pub fn writes(&self) -> Vec<(UserId, User)> {
        self.writes.lock().clone()
    }
}

impl UserStore for GatedStore {
    fn persist<'a>(&'a self, id: UserId, record: &'a User) -> BoxFuture<'a, Result<()>> {
        async move {
            self.entered.notify_one();
            self.release.notified().await;
            self.writes.lock().push((id, record.clone()));
            Ok(())
        }
        .boxed()
    }
}
