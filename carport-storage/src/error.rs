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

/// Durable snapshot store error.
///
/// Unreadable snapshots are deliberately not represented here: corruption
/// and version skew decay to "absent" instead of failing the read.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Snapshot encoding error.
    #[error("encode error: {0}")]
    Encode(#[from] bincode::Error),
    /// The caller-supplied fetch for a refresh failed and no snapshot was
    /// available to fall back to.
    #[error("fetch error: {0}")]
    Fetch(anyhow::Error),
}

impl Error {
    /// Wrap a caller-supplied fetch failure.
    pub fn fetch(e: impl Into<anyhow::Error>) -> Self {
        Self::Fetch(e.into())
    }
}

/// Durable snapshot store result.
pub type Result<T> = std::result::Result<T, Error>;
