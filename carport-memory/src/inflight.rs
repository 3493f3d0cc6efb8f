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

use std::hash::Hash;

use equivalent::Equivalent;
use hashbrown::hash_map::{Entry as HashMapEntry, HashMap};
use tokio::sync::oneshot;

use crate::error::Result;

pub(crate) type Waiter<V> = oneshot::Receiver<Result<V>>;
pub(crate) type Notifier<V> = oneshot::Sender<Result<V>>;

/// Outcome of joining the in-flight map for a key.
pub(crate) enum Join<V> {
    /// The caller leads: it must run the fetch and settle the key. The
    /// waiter receives the settled result like any other caller's.
    Leader(Waiter<V>),
    /// A fetch for the key is already running; the waiter shares its result.
    Wait(Waiter<V>),
    /// The distinct-key in-flight limit is reached; retry after a slot
    /// frees up.
    Full,
}

/// At most one in-flight fetch per key.
///
/// The check-and-register step is atomic under the owning mutex: there is no
/// window in which two fetches for the same key can both start. The pending
/// slot is removed when the fetch settles, success or failure, regardless of
/// how many callers are parked on it.
pub(crate) struct InflightMap<K, V> {
    flights: HashMap<K, Vec<Notifier<V>>>,
}

impl<K, V> Default for InflightMap<K, V> {
    fn default() -> Self {
        Self {
            flights: HashMap::new(),
        }
    }
}

impl<K, V> InflightMap<K, V>
where
    K: Hash + Eq,
{
    /// Join the flight for `key`, registering it if absent.
    ///
    /// `limit` bounds the number of distinct in-flight keys; joining an
    /// existing flight never counts against it.
    pub fn join(&mut self, key: K, limit: Option<usize>) -> Join<V> {
        let at_capacity = limit.is_some_and(|n| self.flights.len() >= n);
        match self.flights.entry(key) {
            HashMapEntry::Occupied(mut o) => {
                let (tx, rx) = oneshot::channel();
                o.get_mut().push(tx);
                Join::Wait(rx)
            }
            HashMapEntry::Vacant(v) => {
                if at_capacity {
                    return Join::Full;
                }
                let (tx, rx) = oneshot::channel();
                v.insert(vec![tx]);
                Join::Leader(rx)
            }
        }
    }

    /// Register a fire-and-forget flight for `key` if none exists and the
    /// limit allows. Used by background refresh, which has no waiter.
    pub fn try_lead(&mut self, key: K, limit: Option<usize>) -> bool {
        if limit.is_some_and(|n| self.flights.len() >= n) {
            return false;
        }
        match self.flights.entry(key) {
            HashMapEntry::Occupied(_) => false,
            HashMapEntry::Vacant(v) => {
                v.insert(vec![]);
                true
            }
        }
    }

    /// Remove the flight for `key` and hand back its notifiers.
    pub fn settle<Q>(&mut self, key: &Q) -> Vec<Notifier<V>>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        self.flights.remove(key).unwrap_or_default()
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        self.flights.contains_key(key)
    }
}
