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

use std::time::{Duration, Instant};

/// A cached entry and its bookkeeping state.
///
/// One record exists per key. Replacing a key constructs a fresh record, so
/// `created_at` and `hits` always describe the current population.
pub(crate) struct Record<V> {
    value: V,
    created_at: Instant,
    last_accessed: Instant,
    ttl: Duration,
    /// Immutable for the record's lifetime.
    tags: Box<[String]>,
    hits: u64,
    weight: usize,
}

impl<V> Record<V> {
    pub fn new(value: V, ttl: Duration, tags: Vec<String>, weight: usize, now: Instant) -> Self {
        Self {
            value,
            created_at: now,
            last_accessed: now,
            ttl,
            tags: tags.into_boxed_slice(),
            hits: 0,
            weight,
        }
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn weight(&self) -> usize {
        self.weight
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn last_accessed(&self) -> Instant {
        self.last_accessed
    }

    /// A record is expired strictly after `created_at + ttl`. A read at
    /// exactly `created_at + ttl` still hits.
    pub fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) > self.ttl
    }

    /// Whether the record's age has crossed the background refresh
    /// threshold, expressed as a ratio of its ttl.
    pub fn refresh_due(&self, now: Instant, ratio: f64) -> bool {
        now.duration_since(self.created_at) >= self.ttl.mul_f64(ratio)
    }

    /// Bump access bookkeeping on a hit.
    pub fn touch(&mut self, now: Instant) {
        self.last_accessed = now;
        self.hits += 1;
    }

    pub fn matches_any_tag(&self, tags: &[&str]) -> bool {
        self.tags.iter().any(|own| tags.contains(&own.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_boundary() {
        let now = Instant::now();
        let record = Record::new(42u64, Duration::from_secs(10), vec![], 8, now);

        assert!(!record.is_expired(now));
        assert!(!record.is_expired(now + Duration::from_secs(10)));
        assert!(record.is_expired(now + Duration::from_secs(10) + Duration::from_nanos(1)));
    }

    #[test]
    fn test_refresh_threshold() {
        let now = Instant::now();
        let record = Record::new((), Duration::from_secs(100), vec![], 0, now);

        assert!(!record.refresh_due(now + Duration::from_secs(59), 0.6));
        assert!(record.refresh_due(now + Duration::from_secs(60), 0.6));
    }

    #[test]
    fn test_touch_bumps_access_state() {
        let now = Instant::now();
        let mut record = Record::new((), Duration::from_secs(1), vec![], 0, now);
        assert_eq!(record.hits(), 0);

        let later = now + Duration::from_millis(5);
        record.touch(later);
        assert_eq!(record.hits(), 1);
        assert_eq!(record.last_accessed(), later);
    }

    #[test]
    fn test_tag_match() {
        let now = Instant::now();
        let record = Record::new(
            (),
            Duration::from_secs(1),
            vec!["vehicles".to_string(), "rentals".to_string()],
            0,
            now,
        );

        assert!(record.matches_any_tag(&["vehicles"]));
        assert!(record.matches_any_tag(&["expenses", "rentals"]));
        assert!(!record.matches_any_tag(&["expenses"]));
        assert!(!record.matches_any_tag(&[]));
    }
}
