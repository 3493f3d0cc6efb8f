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
    future::Future,
    hash::Hash,
    sync::Arc,
    time::{Duration, Instant},
};

use equivalent::Equivalent;
use parking_lot::Mutex;
use tokio::{runtime::Handle, sync::Notify, task::JoinHandle, time::MissedTickBehavior};

use crate::{
    code::{Key, Value, Weighter},
    error::{Error, Result},
    eviction::EvictionConfig,
    inflight::{InflightMap, Join},
    metrics::{CacheStats, Metrics},
    record::Record,
    store::Store,
};

/// Keys reported by [`Cache::stats`] in the hottest-keys view.
const TOP_KEYS: usize = 8;

/// Per-call options for [`Cache::fetch_with`] and [`Cache::insert_with`].
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    ttl: Option<Duration>,
    tags: Vec<String>,
    refresh: bool,
    force: bool,
}

impl FetchOptions {
    /// Default options: cache-default ttl, no tags, no background refresh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the cache's default ttl for this entry.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Tags for bulk invalidation. Immutable for the entry's lifetime.
    pub fn with_tags<T, I>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Re-fetch the entry in the background when a hit finds it past its
    /// refresh threshold, still returning the cached value immediately.
    pub fn with_refresh(mut self) -> Self {
        self.refresh = true;
        self
    }

    /// Bypass the cached value and re-fetch, still deduplicating with any
    /// concurrent fetch for the same key.
    pub fn with_force(mut self) -> Self {
        self.force = true;
        self
    }
}

/// Builder for [`Cache`].
pub struct CacheBuilder<K, V>
where
    K: Key,
    V: Value,
{
    eviction: EvictionConfig,
    default_ttl: Duration,
    refresh_ratio: f64,
    sweep_interval: Option<Duration>,
    max_inflight: Option<usize>,
    weighter: Arc<dyn Weighter<K, V>>,
}

impl<K, V> Default for CacheBuilder<K, V>
where
    K: Key,
    V: Value,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> CacheBuilder<K, V>
where
    K: Key,
    V: Value,
{
    /// Builder with default policy: 1024 entries / 64 MiB, 5 minute ttl,
    /// refresh threshold at 60 % of ttl, sweep every 2 minutes, no in-flight
    /// limit.
    pub fn new() -> Self {
        Self {
            eviction: EvictionConfig::default(),
            default_ttl: Duration::from_secs(300),
            refresh_ratio: 0.6,
            sweep_interval: Some(Duration::from_secs(120)),
            max_inflight: None,
            weighter: Arc::new(|_: &K, _: &V| std::mem::size_of::<V>()),
        }
    }

    /// Set the capacity bounds.
    pub fn with_eviction(mut self, eviction: EvictionConfig) -> Self {
        self.eviction = eviction;
        self
    }

    /// Set the ttl applied when a call does not provide one.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Set the background refresh threshold as a ratio of an entry's ttl.
    ///
    /// # Panics
    ///
    /// Panics if the ratio is not in `0.0..=1.0`.
    pub fn with_refresh_ratio(mut self, ratio: f64) -> Self {
        assert!(
            (0.0..=1.0).contains(&ratio),
            "refresh_ratio must be in 0.0..=1.0, given: {ratio}"
        );
        self.refresh_ratio = ratio;
        self
    }

    /// Set the periodic sweep interval, or `None` to rely on lazy
    /// expiration only.
    pub fn with_sweep_interval(mut self, interval: Option<Duration>) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Bound the number of distinct keys with an in-flight fetch. Fetches
    /// beyond the bound park until a slot frees up.
    pub fn with_max_inflight(mut self, max: usize) -> Self {
        self.max_inflight = Some(max);
        self
    }

    /// Set the entry size estimator feeding the size budget.
    pub fn with_weighter(mut self, weighter: impl Weighter<K, V>) -> Self {
        self.weighter = Arc::new(weighter);
        self
    }

    /// Build the cache and start its sweep task.
    ///
    /// The sweep task needs an ambient tokio runtime; without one the cache
    /// still works and falls back to lazy expiration.
    pub fn build(self) -> Cache<K, V> {
        let metrics = Arc::new(Metrics::default());
        let inner = Arc::new(CacheInner {
            store: Mutex::new(Store::new(self.eviction, metrics.clone())),
            inflight: Mutex::new(InflightMap::default()),
            slot_free: Notify::new(),
            default_ttl: self.default_ttl,
            refresh_ratio: self.refresh_ratio,
            max_inflight: self.max_inflight,
            weighter: self.weighter,
            metrics,
            sweeper: Mutex::new(None),
        });
        if let Some(period) = self.sweep_interval {
            start_sweeper(&inner, period);
        }
        Cache { inner }
    }
}

fn start_sweeper<K, V>(inner: &Arc<CacheInner<K, V>>, period: Duration)
where
    K: Key,
    V: Value,
{
    let Ok(handle) = Handle::try_current() else {
        tracing::warn!("no tokio runtime available, periodic sweep disabled");
        return;
    };
    // The task holds a weak reference so it cannot keep a dropped cache
    // alive between ticks.
    let weak = Arc::downgrade(inner);
    let task = handle.spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await;
        loop {
            interval.tick().await;
            let Some(inner) = weak.upgrade() else {
                break;
            };
            let swept = inner.store.lock().sweep(Instant::now());
            if swept > 0 {
                tracing::debug!(swept, "sweep reclaimed expired entries");
            }
        }
    });
    *inner.sweeper.lock() = Some(task);
}

struct CacheInner<K, V>
where
    K: Key,
    V: Value,
{
    store: Mutex<Store<K, V>>,
    inflight: Mutex<InflightMap<K, V>>,
    /// Wakes one parked fetch when an in-flight slot frees up.
    slot_free: Notify,
    default_ttl: Duration,
    refresh_ratio: f64,
    max_inflight: Option<usize>,
    weighter: Arc<dyn Weighter<K, V>>,
    metrics: Arc<Metrics>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl<K, V> Drop for CacheInner<K, V>
where
    K: Key,
    V: Value,
{
    fn drop(&mut self) {
        if let Some(task) = self.sweeper.lock().take() {
            task.abort();
        }
    }
}

impl<K, V> CacheInner<K, V>
where
    K: Key,
    V: Value,
{
    fn write(&self, key: K, value: V, ttl: Duration, tags: Vec<String>) {
        let weight = (self.weighter)(&key, &value);
        let record = Record::new(value, ttl, tags, weight, Instant::now());
        self.store.lock().insert(key, record, |candidate| {
            self.inflight.lock().contains(candidate)
        });
    }

    fn settle(&self, key: &K, result: Result<V>) {
        // Remove the flight before notifying so a caller arriving after the
        // broadcast starts a fresh fetch instead of parking forever.
        let notifiers = self.inflight.lock().settle(key);
        self.slot_free.notify_one();
        for tx in notifiers {
            let _ = tx.send(result.clone());
        }
    }

    /// Drive a registered flight to completion: run the fetch, populate the
    /// store on success, settle every waiter.
    ///
    /// Detached, so the fetch always runs to completion and populates the
    /// cache even if every caller has gone away.
    fn run_fill<FU>(self: Arc<Self>, key: K, ttl: Duration, tags: Vec<String>, future: FU, background: bool)
    where
        FU: Future<Output = anyhow::Result<V>> + Send + 'static,
    {
        tokio::spawn(async move {
            let result = match future.await {
                Ok(value) => {
                    self.write(key.clone(), value.clone(), ttl, tags);
                    Ok(value)
                }
                Err(e) => {
                    let e = Error::fetch(e);
                    if background {
                        tracing::warn!(key = ?key, error = %e, "background refresh failed");
                    }
                    Err(e)
                }
            };
            self.settle(&key, result);
        });
    }
}

/// The in-memory response cache.
///
/// Cheap to clone; clones share the same state. See the crate docs for the
/// overall model.
pub struct Cache<K, V>
where
    K: Key,
    V: Value,
{
    inner: Arc<CacheInner<K, V>>,
}

impl<K, V> Clone for Cache<K, V>
where
    K: Key,
    V: Value,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V> Cache<K, V>
where
    K: Key,
    V: Value,
{
    /// Get the cached value for `key` if present and not expired.
    ///
    /// An expired entry counts as a miss and is removed as a side effect.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        self.inner
            .store
            .lock()
            .get(key, self.inner.refresh_ratio)
            .map(|(value, _)| value)
    }

    /// Insert with the cache's default ttl and no tags.
    pub fn insert(&self, key: K, value: V) {
        self.inner.write(key, value, self.inner.default_ttl, vec![]);
    }

    /// Insert with an explicit ttl and tags.
    pub fn insert_with(&self, key: K, value: V, ttl: Duration, tags: &[&str]) {
        self.inner
            .write(key, value, ttl, tags.iter().map(|tag| tag.to_string()).collect());
    }

    /// Remove a single entry. Returns whether it was present.
    pub fn remove<Q>(&self, key: &Q) -> bool
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        self.inner.store.lock().remove(key)
    }

    /// Remove every entry whose tag set intersects `tags`, returning the
    /// count.
    ///
    /// Pure removal: the next fetch repopulates on demand. Domain writers
    /// call this right after a successful mutation.
    pub fn invalidate(&self, tags: &[&str]) -> usize {
        self.inner.store.lock().invalidate_tags(tags)
    }

    /// Remove all entries.
    pub fn clear(&self) {
        self.inner.store.lock().clear()
    }

    /// A point-in-time stats snapshot.
    pub fn stats(&self) -> CacheStats<K> {
        self.inner.store.lock().stats(TOP_KEYS)
    }

    /// Stop the periodic sweep task. Idempotent; the cache itself stays
    /// usable with lazy expiration only.
    pub fn close(&self) {
        if let Some(task) = self.inner.sweeper.lock().take() {
            task.abort();
        }
    }

    /// [`Cache::fetch_with`] with default options.
    pub async fn fetch<F, FU>(&self, key: K, f: F) -> Result<V>
    where
        F: FnOnce() -> FU,
        FU: Future<Output = anyhow::Result<V>> + Send + 'static,
    {
        self.fetch_with(key, FetchOptions::default(), f).await
    }

    /// The read path: cached value on a hit, single-flight fetch on a miss.
    ///
    /// Concurrent calls for one key share a single execution of `f` and its
    /// result, success or failure. On failure nothing is cached and every
    /// coalesced caller observes the error, exactly as if no cache existed.
    ///
    /// With [`FetchOptions::with_refresh`], a hit past the refresh threshold
    /// additionally re-runs `f` in the background; the caller still gets the
    /// cached value immediately and a refresh failure is only logged.
    pub async fn fetch_with<F, FU>(&self, key: K, options: FetchOptions, f: F) -> Result<V>
    where
        F: FnOnce() -> FU,
        FU: Future<Output = anyhow::Result<V>> + Send + 'static,
    {
        let ttl = options.ttl.unwrap_or(self.inner.default_ttl);

        if !options.force {
            let hit = self.inner.store.lock().get(&key, self.inner.refresh_ratio);
            if let Some((value, refresh_due)) = hit {
                if options.refresh && refresh_due {
                    self.spawn_refresh(key, ttl, options.tags, f);
                }
                return Ok(value);
            }
        }

        let join = loop {
            let notified = self.inner.slot_free.notified();
            match self
                .inner
                .inflight
                .lock()
                .join(key.clone(), self.inner.max_inflight)
            {
                Join::Full => {}
                join => break join,
            }
            notified.await;
            // The flight that freed the slot may have populated our key.
            if !options.force {
                if let Some((value, _)) = self.inner.store.lock().get(&key, self.inner.refresh_ratio) {
                    return Ok(value);
                }
            }
        };

        let waiter = match join {
            Join::Leader(waiter) => {
                Metrics::bump(&self.inner.metrics.fetch);
                let future = f();
                self.inner.clone().run_fill(key, ttl, options.tags, future, false);
                waiter
            }
            Join::Wait(waiter) => {
                Metrics::bump(&self.inner.metrics.queue);
                waiter
            }
            Join::Full => unreachable!(),
        };

        waiter.await.map_err(|_| Error::FlightDropped)?
    }

    /// Fire-and-forget refresh of a still-valid entry, deduplicated through
    /// the in-flight map and skipped when the in-flight limit is reached.
    fn spawn_refresh<F, FU>(&self, key: K, ttl: Duration, tags: Vec<String>, f: F)
    where
        F: FnOnce() -> FU,
        FU: Future<Output = anyhow::Result<V>> + Send + 'static,
    {
        if !self
            .inner
            .inflight
            .lock()
            .try_lead(key.clone(), self.inner.max_inflight)
        {
            return;
        }
        Metrics::bump(&self.inner.metrics.refresh);
        let future = f();
        self.inner.clone().run_fill(key, ttl, tags, future, true);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures_util::future::join_all;

    use super::*;

    fn cache() -> Cache<String, u64> {
        CacheBuilder::new()
            .with_default_ttl(Duration::from_secs(60))
            .with_sweep_interval(None)
            .build()
    }

    #[test_log::test(tokio::test)]
    async fn test_fetch_populates_then_hits() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            let value = cache
                .fetch("rentals:active".to_string(), move || async move {
                    calls.fetch_add(1, Ordering::Relaxed);
                    anyhow::Ok(7)
                })
                .await
                .unwrap();
            assert_eq!(value, 7);
        }

        assert_eq!(calls.load(Ordering::Relaxed), 1);
        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_single_flight_under_burst() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));

        let futures = (0..8).map(|_| {
            let cache = cache.clone();
            let calls = calls.clone();
            async move {
                cache
                    .fetch("protocols:status".to_string(), move || async move {
                        calls.fetch_add(1, Ordering::Relaxed);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        anyhow::Ok(99)
                    })
                    .await
            }
        });

        let results = join_all(futures).await;
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        for result in results {
            assert_eq!(result.unwrap(), 99);
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_fetch_failure_shared_and_nothing_cached() {
        let cache = cache();
        let calls = Arc::new(AtomicUsize::new(0));

        let futures = (0..4).map(|_| {
            let cache = cache.clone();
            let calls = calls.clone();
            async move {
                cache
                    .fetch("vehicles:all".to_string(), move || async move {
                        calls.fetch_add(1, Ordering::Relaxed);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Err(anyhow::anyhow!("backend unreachable"))
                    })
                    .await
            }
        });

        let results = join_all(futures).await;
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        for result in results {
            assert!(matches!(result.unwrap_err(), Error::Fetch(_)));
        }
        assert_eq!(cache.stats().entries, 0);

        // The failed flight is gone; the next fetch starts fresh.
        let value = cache
            .fetch("vehicles:all".to_string(), || async { anyhow::Ok(3) })
            .await
            .unwrap();
        assert_eq!(value, 3);
    }

    #[test_log::test(tokio::test)]
    async fn test_ttl_expiry() {
        let cache = cache();
        cache.insert_with("k".to_string(), 1, Duration::from_millis(40), &[]);
        assert_eq!(cache.get("k"), Some(1));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.stats().entries, 0);
    }

    #[test_log::test(tokio::test)]
    async fn test_write_invalidate_read_scenario() {
        let cache: Cache<String, Vec<&'static str>> =
            CacheBuilder::new().with_sweep_interval(None).build();
        cache.insert_with(
            "vehicles:all".to_string(),
            vec!["v1", "v2"],
            Duration::from_secs(600),
            &["vehicles"],
        );
        assert_eq!(cache.get("vehicles:all"), Some(vec!["v1", "v2"]));

        assert_eq!(cache.invalidate(&["vehicles"]), 1);
        assert_eq!(cache.get("vehicles:all"), None);
    }

    #[test_log::test(tokio::test)]
    async fn test_lru_eviction_follows_access_order() {
        let cache: Cache<String, u64> = CacheBuilder::new()
            .with_eviction(EvictionConfig {
                max_entries: 3,
                max_weight: usize::MAX,
            })
            .with_sweep_interval(None)
            .build();

        cache.insert("a".to_string(), 1);
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.insert("b".to_string(), 2);
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.insert("c".to_string(), 3);
        tokio::time::sleep(Duration::from_millis(2)).await;

        // Reading "a" makes "b" the least recently used entry.
        assert_eq!(cache.get("a"), Some(1));
        cache.insert("d".to_string(), 4);

        assert_eq!(cache.stats().entries, 3);
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("c"), Some(3));
        assert_eq!(cache.get("d"), Some(4));
    }

    #[test_log::test(tokio::test)]
    async fn test_background_refresh_serves_cached_then_updates() {
        let cache: Cache<String, u64> = CacheBuilder::new()
            .with_refresh_ratio(0.25)
            .with_sweep_interval(None)
            .build();
        let options = FetchOptions::new()
            .with_ttl(Duration::from_secs(2))
            .with_refresh();

        let value = cache
            .fetch_with("doc:status".to_string(), options.clone(), || async {
                anyhow::Ok(1)
            })
            .await
            .unwrap();
        assert_eq!(value, 1);

        // Past the refresh threshold (500 ms) but far from expiry.
        tokio::time::sleep(Duration::from_millis(700)).await;

        let value = cache
            .fetch_with("doc:status".to_string(), options.clone(), || async {
                anyhow::Ok(2)
            })
            .await
            .unwrap();
        // The caller gets the still-valid cached value...
        assert_eq!(value, 1);

        // ...while the refresh lands in the background.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(cache.get("doc:status"), Some(2));
    }

    #[test_log::test(tokio::test)]
    async fn test_background_refresh_failure_is_swallowed() {
        let cache: Cache<String, u64> = CacheBuilder::new()
            .with_refresh_ratio(0.25)
            .with_sweep_interval(None)
            .build();
        let options = FetchOptions::new()
            .with_ttl(Duration::from_secs(2))
            .with_refresh();

        cache
            .fetch_with("doc:status".to_string(), options.clone(), || async {
                anyhow::Ok(1)
            })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(700)).await;

        let value = cache
            .fetch_with("doc:status".to_string(), options.clone(), || async {
                Err(anyhow::anyhow!("backend unreachable"))
            })
            .await
            .unwrap();
        assert_eq!(value, 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        // The refresh failure left the valid entry untouched.
        assert_eq!(cache.get("doc:status"), Some(1));
        assert_eq!(cache.stats().entries, 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_force_refetch_replaces_cached_value() {
        let cache = cache();
        cache.insert("k".to_string(), 1);

        let value = cache
            .fetch_with("k".to_string(), FetchOptions::new().with_force(), || async {
                anyhow::Ok(2)
            })
            .await
            .unwrap();
        assert_eq!(value, 2);
        assert_eq!(cache.get("k"), Some(2));
    }

    #[test_log::test(tokio::test)]
    async fn test_max_inflight_bounds_concurrent_fetches() {
        let cache: Cache<String, u64> = CacheBuilder::new()
            .with_max_inflight(1)
            .with_sweep_interval(None)
            .build();
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let futures = (0..3).map(|i| {
            let cache = cache.clone();
            let current = current.clone();
            let peak = peak.clone();
            async move {
                cache
                    .fetch(format!("k{i}"), move || async move {
                        let running = current.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(running, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        current.fetch_sub(1, Ordering::SeqCst);
                        anyhow::Ok(i as u64)
                    })
                    .await
            }
        });

        let results = join_all(futures).await;
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        for (i, result) in results.into_iter().enumerate() {
            assert_eq!(result.unwrap(), i as u64);
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_clear_then_stats_report_empty() {
        let cache = cache();
        cache.insert("a".to_string(), 1);
        cache.insert("b".to_string(), 2);

        cache.clear();
        cache.clear();

        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.stats().entries, 0);
    }

    #[test_log::test(tokio::test)]
    async fn test_periodic_sweep_reclaims_without_reads() {
        let cache: Cache<String, u64> = CacheBuilder::new()
            .with_sweep_interval(Some(Duration::from_millis(30)))
            .build();
        cache.insert_with("k".to_string(), 1, Duration::from_millis(20), &[]);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(cache.stats().entries, 0);
        cache.close();
    }

    #[test_log::test(tokio::test)]
    async fn test_close_stops_the_sweeper() {
        let cache: Cache<String, u64> = CacheBuilder::new()
            .with_sweep_interval(Some(Duration::from_millis(20)))
            .build();
        cache.close();
        cache.insert_with("k".to_string(), 1, Duration::from_millis(10), &[]);

        tokio::time::sleep(Duration::from_millis(100)).await;
        // Only lazy expiration is left: the record sits untouched until read.
        assert_eq!(cache.stats().entries, 1);
        assert_eq!(cache.get("k"), None);
    }
}
