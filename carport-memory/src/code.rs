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

use std::fmt::Debug;

/// Key trait for the in-memory cache.
pub trait Key: Send + Sync + 'static + std::hash::Hash + Eq + Clone + Debug {}
impl<T> Key for T where T: Send + Sync + 'static + std::hash::Hash + Eq + Clone + Debug {}

/// Value trait for the in-memory cache.
///
/// Values are cloned on read and when a shared fetch result is broadcast to
/// coalesced waiters. Wrap large payloads in [`std::sync::Arc`] to keep the
/// clone cheap.
pub trait Value: Send + Sync + 'static + Clone {}
impl<T> Value for T where T: Send + Sync + 'static + Clone {}

/// The weighter for the in-memory cache.
///
/// The weighter estimates the serialized byte size of an entry. The estimate
/// feeds the cache's aggregate size budget.
pub trait Weighter<K, V>: Fn(&K, &V) -> usize + Send + Sync + 'static {}
impl<K, V, T> Weighter<K, V> for T where T: Fn(&K, &V) -> usize + Send + Sync + 'static {}
