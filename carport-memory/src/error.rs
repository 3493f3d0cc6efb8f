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

use std::sync::Arc;

/// In-memory cache error.
///
/// The error is cheap to clone so that a single fetch failure can be
/// broadcast to every caller coalesced on the same key.
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    /// The caller-supplied fetch function failed.
    ///
    /// Every caller coalesced on the key observes the same failure. Nothing
    /// is cached.
    #[error("fetch error: {0}")]
    Fetch(Arc<anyhow::Error>),
    /// The in-flight fetch settled without notifying its waiters.
    ///
    /// Only reachable if the fetch task died before settling, e.g. on a
    /// panic inside the fetch function.
    #[error("in-flight fetch dropped")]
    FlightDropped,
}

impl Error {
    /// Wrap a caller-supplied fetch failure.
    pub fn fetch(e: impl Into<anyhow::Error>) -> Self {
        Self::Fetch(Arc::new(e.into()))
    }
}

/// In-memory cache result.
pub type Result<T> = std::result::Result<T, Error>;
