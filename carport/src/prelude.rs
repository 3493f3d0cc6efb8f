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

//! Convenient re-exports of the public surface of all carport crates.

pub use carport_memory::{
    Cache, CacheBuilder, CacheStats, Error as CacheError, EvictionConfig, FetchOptions, Key, Value,
    Weighter,
};
pub use carport_storage::{Error as SnapshotError, Freshness, SnapshotStore};
