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

//! roster - an in-memory write-back cache for user records.
//!
//! Mutations are recorded in memory and return immediately. A background flusher writes dirty records to the
//! persistent store and a background reclaimer drops records that have stayed clean for a grace period.

pub use roster_common as common;
pub use roster_memory as memory;

mod directory;
mod store;

/// Everything needed to build and drive a cache, in one import.
pub mod prelude;
pub use prelude::*;
