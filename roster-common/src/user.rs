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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a user record, shared with the persistent store.
pub type UserId = u64;

/// Identifier of a group.
pub type GroupId = u64;

/// A user record as held by the cache and written to the persistent store.
///
/// `hash` is an already-hashed credential. Hashing happens before a record reaches the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Record key.
    pub id: UserId,
    /// Unique login name.
    pub login: String,
    /// Unique email address.
    pub email: String,
    /// Credential hash.
    pub hash: String,
    /// Registration time.
    pub registered_at: DateTime<Utc>,
    /// Account status flag.
    pub status: bool,
    /// Groups the user belongs to, without duplicates.
    pub groups: Vec<GroupId>,
}

impl User {
    /// Create a user with the given id and login, registered now, with no groups.
    pub fn new(id: UserId, login: impl Into<String>) -> Self {
        Self {
            id,
            login: login.into(),
            email: String::new(),
            hash: String::new(),
            registered_at: Utc::now(),
            status: false,
            groups: vec![],
        }
    }

    /// Set the email address.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    /// Set the credential hash.
    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = hash.into();
        self
    }

    /// Add the user to a group. Returns `false` if the user was already a member.
    pub fn join_group(&mut self, group: GroupId) -> bool {
        if self.groups.contains(&group) {
            return false;
        }
        self.groups.push(group);
        true
    }

    /// Remove the user from a group. Returns `false` if the user was not a member.
    pub fn leave_group(&mut self, group: GroupId) -> bool {
        let len = self.groups.len();
        self.groups.retain(|g| *g != group);
        self.groups.len() != len
    }

    /// Whether the user is a member of the group.
    pub fn is_member_of(&self, group: GroupId) -> bool {
        self.groups.contains(&group)
    }
}
