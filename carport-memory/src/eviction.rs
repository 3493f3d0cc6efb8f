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

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::record::Record;

/// Capacity bounds for the in-memory cache.
///
/// Whichever bound trips first triggers eviction. Expired entries are always
/// reclaimed before a live entry is considered; when the store is still over
/// capacity afterwards, the single entry with the oldest `last_accessed` is
/// evicted (true LRU, not insertion order).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvictionConfig {
    /// Maximum number of entries.
    pub max_entries: usize,
    /// Maximum aggregate estimated size in bytes.
    pub max_weight: usize,
}

impl Default for EvictionConfig {
    fn default() -> Self {
        Self {
            max_entries: 1024,
            max_weight: 64 * 1024 * 1024,
        }
    }
}

impl EvictionConfig {
    pub(crate) fn over_capacity(&self, entries: usize, weight: usize) -> bool {
        entries >= self.max_entries || weight > self.max_weight
    }
}

/// Pick the key with the oldest `last_accessed`, skipping pinned keys.
///
/// A key with an active in-flight fetch is pinned: evicting it while its
/// fetch is running would immediately be undone by the fetch completion.
/// Ties resolve to the iteration-order minimum, which is deterministic for a
/// given map state.
pub(crate) fn select_victim<K, V>(
    map: &HashMap<K, Record<V>>,
    pinned: impl Fn(&K) -> bool,
) -> Option<K>
where
    K: Clone,
{
    map.iter()
        .filter(|(key, _)| !pinned(key))
        .min_by_key(|(_, record)| record.last_accessed())
        .map(|(key, _)| key.clone())
}
