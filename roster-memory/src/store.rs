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

use std::fmt::Debug;

use futures_util::future::BoxFuture;
use roster_common::{
    error::Result,
    user::{User, UserId},
};

/// Durable side of the write-back cache.
///
/// `persist` must be an idempotent upsert by id: the flusher retries failed writes on every sweep and may write the
/// same record more than once.
pub trait UserStore: Send + Sync + Debug + 'static {
    /// Write `record` under `id`.
    fn persist<'a>(&'a self, id: UserId, record: &'a User) -> BoxFuture<'a, Result<()>>;
}
