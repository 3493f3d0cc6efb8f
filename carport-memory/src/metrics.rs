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

use std::sync::atomic::{AtomicU64, Ordering};

/// Event counters for one cache instance.
#[derive(Debug, Default)]
pub(crate) struct Metrics {
    /// get hits
    pub hit: AtomicU64,
    /// get misses
    pub miss: AtomicU64,
    /// successful inserts without replaces
    pub insert: AtomicU64,
    /// successful replaces
    pub replace: AtomicU64,
    /// successful removes, including tag invalidation and clear
    pub remove: AtomicU64,
    /// capacity evictions
    pub evict: AtomicU64,
    /// expired reclamations, lazy or swept
    pub expire: AtomicU64,
    /// fetches issued after a cache miss
    pub fetch: AtomicU64,
    /// deduped fetches parked on an existing flight
    pub queue: AtomicU64,
    /// background refreshes spawned
    pub refresh: AtomicU64,
}

impl Metrics {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

/// Point-in-time view of cache activity and contents.
#[derive(Debug, Clone)]
pub struct CacheStats<K> {
    /// Reads answered from the cache.
    pub hits: u64,
    /// Reads that fell through to a fetch or returned nothing.
    pub misses: u64,
    /// `hits / (hits + misses)`, `0.0` before any read.
    pub hit_rate: f64,
    /// Live entries.
    pub entries: usize,
    /// Aggregate estimated size of live entries in bytes.
    pub weight: usize,
    /// Hottest keys by hit count since their last (re)population.
    pub top_keys: Vec<(K, u64)>,
}
