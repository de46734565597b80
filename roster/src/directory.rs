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

use std::{fmt::Debug, sync::Arc};

use roster_common::{
    error::{Error, Result},
    user::{GroupId, User, UserId},
};
use roster_memory::{CacheBuilder, UserCache, UserStore};

use crate::store::UserLookup;

/// User operations over a write-back [`UserCache`].
///
/// Mutations land in the cache and reach the store on the next flush. Reads see the resident record first, so a
/// caller always observes its own writes, and fall back to the store otherwise. Reads never fill the cache.
pub struct Directory<S> {
    cache: UserCache,
    store: Arc<S>,
}

impl<S> Debug for Directory<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Directory").field("cache", &self.cache).finish()
    }
}

impl<S> Clone for Directory<S> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            store: self.store.clone(),
        }
    }
}

impl<S> Directory<S>
where
    S: UserStore + UserLookup,
{
    /// Build a cache over `store` with `builder` and start its sweepers.
    ///
    /// Must be called inside a tokio runtime unless the builder carries a spawner.
    pub fn open(builder: CacheBuilder, store: Arc<S>) -> Result<Self> {
        let cache = builder.build(store.clone())?;
        cache.start()?;
        Ok(Self { cache, store })
    }

    /// Wrap an existing cache. `store` must be the store the cache writes back to.
    pub fn new(cache: UserCache, store: Arc<S>) -> Self {
        Self { cache, store }
    }

    /// The underlying cache.
    pub fn cache(&self) -> &UserCache {
        &self.cache
    }

    /// Register a new user.
    pub async fn create_user(&self, user: User) -> Result<()> {
        let id = user.id;
        if self.cache.try_get(id).is_some() || self.store.load(id).await?.is_some() {
            return Err(Error::already_exists(id));
        }
        // Another create may have won the race since the lookup.
        if !self.cache.insert(id, user) {
            return Err(Error::already_exists(id));
        }
        tracing::debug!(id, "[directory]: User created.");
        Ok(())
    }

    /// Look up a user, resident record first.
    pub async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        if let Some(user) = self.cache.try_get(id) {
            return Ok(Some(user));
        }
        self.store.load(id).await
    }

    /// Apply `f` to a user and record the result in the cache. Returns the updated record.
    ///
    /// `f` may run more than once if the entry is evicted concurrently. Changes `f` makes to the id are discarded.
    pub async fn update_user<F>(&self, id: UserId, mut f: F) -> Result<User>
    where
        F: FnMut(&mut User) + Send,
    {
        loop {
            let base = match self.cache.try_get(id) {
                Some(_) => None,
                None => Some(self.store.load(id).await?.ok_or_else(|| Error::not_found(id))?),
            };
            if let Some(user) = self.cache.update(id, base, &mut f) {
                return Ok(user);
            }
            // Evicted between the peek and the update. It was clean, so the store has it now.
            tracing::trace!(id, "[directory]: Entry evicted during update, reload.");
        }
    }

    /// Delete a user from the cache and the store.
    ///
    /// Fails with `NotFound` if the user is neither resident nor persisted. If the store rejects the delete, the
    /// resident record is kept.
    pub async fn delete_user(&self, id: UserId) -> Result<()> {
        let (resident, persisted) = self.cache.remove(id, self.store.remove(id)).await?;
        if resident.is_none() && !persisted {
            return Err(Error::not_found(id));
        }
        tracing::debug!(id, "[directory]: User deleted.");
        Ok(())
    }

    /// Set the account status flag.
    pub async fn set_status(&self, id: UserId, status: bool) -> Result<User> {
        self.update_user(id, |user| user.status = status).await
    }

    /// Add a user to a group. Adding an existing member still counts as a mutation.
    pub async fn add_to_group(&self, id: UserId, group: GroupId) -> Result<User> {
        self.update_user(id, |user| {
            user.join_group(group);
        })
        .await
    }

    /// Remove a user from a group.
    pub async fn remove_from_group(&self, id: UserId, group: GroupId) -> Result<User> {
        self.update_user(id, |user| {
            user.leave_group(group);
        })
        .await
    }

    /// Stop the sweepers after a final write-back.
    pub async fn close(&self) -> Result<()> {
        self.cache.close().await
    }
}
