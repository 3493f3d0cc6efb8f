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

use std::{
    hash::Hash,
    sync::Arc,
    time::Instant,
};

use equivalent::Equivalent;
use hashbrown::HashMap;
use itertools::Itertools;

use crate::{
    code::{Key, Value},
    eviction::{self, EvictionConfig},
    metrics::{CacheStats, Metrics},
    record::Record,
};

/// The authoritative key to record map.
///
/// All mutations run under the owning mutex, so the map can never hold two
/// records for one key or observe a half-applied weight adjustment.
pub(crate) struct Store<K, V> {
    map: HashMap<K, Record<V>>,
    /// Aggregate estimated size of live records.
    weight: usize,
    config: EvictionConfig,
    metrics: Arc<Metrics>,
}

impl<K, V> Store<K, V>
where
    K: Key,
    V: Value,
{
    pub fn new(config: EvictionConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            map: HashMap::new(),
            weight: 0,
            config,
            metrics,
        }
    }

    /// Look up `key`, reporting the value and whether its background refresh
    /// threshold has passed.
    ///
    /// An expired record counts as a miss and is removed as a side effect.
    pub fn get<Q>(&mut self, key: &Q, refresh_ratio: f64) -> Option<(V, bool)>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        let now = Instant::now();
        match self.map.get_mut(key) {
            None => {
                Metrics::bump(&self.metrics.miss);
                return None;
            }
            Some(record) => {
                if !record.is_expired(now) {
                    record.touch(now);
                    Metrics::bump(&self.metrics.hit);
                    return Some((record.value().clone(), record.refresh_due(now, refresh_ratio)));
                }
            }
        }

        // Lazy expiration.
        if let Some(record) = self.map.remove(key) {
            self.weight -= record.weight();
            Metrics::bump(&self.metrics.expire);
        }
        Metrics::bump(&self.metrics.miss);
        None
    }

    /// Insert or replace. Runs the eviction policy at most once per call.
    ///
    /// Keys for which `pinned` returns true are exempt from capacity
    /// eviction; the cache pins keys with an active in-flight fetch.
    pub fn insert(&mut self, key: K, record: Record<V>, pinned: impl Fn(&K) -> bool) {
        let replacing = self.map.contains_key(&key);
        let entry_pressure = !replacing && self.map.len() >= self.config.max_entries;
        let weight_pressure = self.weight > self.config.max_weight;

        if entry_pressure || weight_pressure {
            self.evict_once(Instant::now(), |candidate| {
                pinned(candidate) || *candidate == key
            });
        }

        let weight = record.weight();
        match self.map.insert(key, record) {
            Some(old) => {
                self.weight = self.weight - old.weight() + weight;
                Metrics::bump(&self.metrics.replace);
            }
            None => {
                self.weight += weight;
                Metrics::bump(&self.metrics.insert);
            }
        }
    }

    /// Reclaim expired records; if the store is still at or over capacity,
    /// evict the single least recently accessed unpinned record.
    fn evict_once(&mut self, now: Instant, pinned: impl Fn(&K) -> bool) {
        let swept = self.sweep(now);
        if swept > 0 && !self.config.over_capacity(self.map.len(), self.weight) {
            return;
        }

        if let Some(victim) = eviction::select_victim(&self.map, pinned) {
            if let Some(record) = self.map.remove(&victim) {
                self.weight -= record.weight();
                Metrics::bump(&self.metrics.evict);
                tracing::trace!(key = ?victim, "evicted least recently used entry");
            }
        }
    }

    pub fn remove<Q>(&mut self, key: &Q) -> bool
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        match self.map.remove(key) {
            Some(record) => {
                self.weight -= record.weight();
                Metrics::bump(&self.metrics.remove);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        let count = self.map.len() as u64;
        self.map.clear();
        self.weight = 0;
        Metrics::add(&self.metrics.remove, count);
    }

    /// Remove every record whose tag set intersects `tags`.
    pub fn invalidate_tags(&mut self, tags: &[&str]) -> usize {
        let mut removed = 0usize;
        let mut weight = self.weight;
        self.map.retain(|_, record| {
            if record.matches_any_tag(tags) {
                removed += 1;
                weight -= record.weight();
                false
            } else {
                true
            }
        });
        self.weight = weight;
        Metrics::add(&self.metrics.remove, removed as u64);
        removed
    }

    /// Reclaim every expired record, returning the count.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let mut swept = 0usize;
        let mut weight = self.weight;
        self.map.retain(|_, record| {
            if record.is_expired(now) {
                swept += 1;
                weight -= record.weight();
                false
            } else {
                true
            }
        });
        self.weight = weight;
        Metrics::add(&self.metrics.expire, swept as u64);
        swept
    }

    pub fn stats(&self, top: usize) -> CacheStats<K> {
        let hits = Metrics::get(&self.metrics.hit);
        let misses = Metrics::get(&self.metrics.miss);
        let reads = hits + misses;
        let hit_rate = if reads == 0 {
            0.0
        } else {
            hits as f64 / reads as f64
        };
        let top_keys = self
            .map
            .iter()
            .map(|(key, record)| (key.clone(), record.hits()))
            .sorted_by(|a, b| b.1.cmp(&a.1))
            .take(top)
            .collect_vec();
        CacheStats {
            hits,
            misses,
            hit_rate,
            entries: self.map.len(),
            weight: self.weight,
            top_keys,
        }
    }
}
