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

//! carport - response cache for Rust.
//!
//! carport is a client-side response cache: a per-process key/value map with
//! TTL expiration, LRU eviction under entry-count and size pressure,
//! tag-based bulk invalidation, single-flight deduplication of concurrent
//! fetches, opportunistic background refresh, and a durable snapshot store
//! with stale fallback for one latency-critical dataset.
//!
//! From a caller's perspective the cache is transparent: a cached call
//! returns the same data a direct call would, or fails with the same error,
//! just faster and shared among concurrent identical calls.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use carport::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> anyhow::Result<()> {
//! let cache: Cache<String, u64> = CacheBuilder::new()
//!     .with_default_ttl(Duration::from_secs(600))
//!     .build();
//!
//! let count = cache
//!     .fetch("vehicles:count".to_string(), || async { anyhow::Ok(42) })
//!     .await?;
//! assert_eq!(count, 42);
//!
//! // A domain write invalidates every read that embedded the entity.
//! cache.invalidate(&["vehicles"]);
//!
//! cache.close();
//! # Ok(())
//! # }
//! ```

pub use carport_memory as memory;
pub use carport_storage as storage;

pub mod prelude;

pub use carport_memory::{Cache, CacheBuilder, CacheStats, EvictionConfig, FetchOptions, Key, Value, Weighter};
pub use carport_storage::{Freshness, SnapshotStore};
