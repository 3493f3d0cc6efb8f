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

//! Durable snapshot store for carport.
//!
//! One latency-critical dataset (document/protocol completion status) is
//! worth keeping across restarts. [`SnapshotStore`] persists the whole
//! collection as a single checksummed record with a schema version and a
//! write timestamp, distinguishes fresh, stale and absent state on read, and
//! can serve a stale snapshot when the source of truth is unreachable.
//!
//! Corrupt or version-skewed snapshots are never an error: the store treats
//! them as absent and clears the file so the next read does not trip over
//! the same garbage.

mod error;
mod snapshot;

pub mod prelude;

pub use error::{Error, Result};
pub use snapshot::{Freshness, SnapshotStore};
