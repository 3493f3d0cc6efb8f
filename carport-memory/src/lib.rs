// Copyright 2026 carport Project Authors
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

//! In-memory response cache engine for carport.
//!
//! One cache instance owns one key/value map and the policies around it:
//! TTL expiration (lazy on read, plus a periodic sweep task), LRU eviction
//! under entry-count and estimated-size pressure, tag-based bulk
//! invalidation, single-flight deduplication of concurrent fetches, and
//! opportunistic background refresh of near-expiry entries.
//!
//! The cache is an explicitly constructed object. Build one with
//! [`CacheBuilder`], hand clones of it to collaborators, and stop its
//! maintenance task with [`Cache::close`] on shutdown.

mod cache;
mod code;
mod error;
mod eviction;
mod inflight;
mod metrics;
mod record;
mod store;

pub mod prelude;

pub use cache::{Cache, CacheBuilder, FetchOptions};
pub use code::{Key, Value, Weighter};
pub use error::{Error, Result};
pub use eviction::EvictionConfig;
pub use metrics::CacheStats;
