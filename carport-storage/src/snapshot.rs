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
    hash::Hasher,
    io,
    marker::PhantomData,
    path::{Path, PathBuf},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use bytes::{Buf, BufMut};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use twox_hash::XxHash64;

use crate::error::{Error, Result};

/// Freshness of the persisted snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// No usable snapshot exists.
    Absent,
    /// The snapshot's version matches and its age is within the ttl.
    Fresh,
    /// The snapshot parses but its age exceeds the ttl. Only served on
    /// explicit request, as a fallback when a live fetch fails.
    Stale,
}

/// On-disk layout: `| magic 8B | checksum 8B | bincode payload |`.
const MAGIC: u64 = 0x6361_7270_6f72_7431;
const HEADER: usize = 16;

#[derive(Debug, Serialize)]
struct PayloadRef<'a, T> {
    version: &'a str,
    written_at_ms: u64,
    entries: &'a [T],
}

#[derive(Debug, Deserialize)]
struct Payload<T> {
    version: String,
    written_at_ms: u64,
    entries: Vec<T>,
}

struct Checksummer;

impl Checksummer {
    fn checksum64(buf: &[u8]) -> u64 {
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(buf);
        hasher.finish()
    }
}

/// A durable, whole-collection snapshot under one well-known path.
///
/// The store persists the full entry collection in one atomic write and
/// reads it back across restarts. Readers trust the data only when the
/// schema version matches and the snapshot's age is within the ttl;
/// anything unreadable is treated as absent and cleared, never surfaced as
/// an error.
pub struct SnapshotStore<T> {
    path: PathBuf,
    version: String,
    ttl: Duration,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for SnapshotStore<T> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            version: self.version.clone(),
            ttl: self.ttl,
            _marker: PhantomData,
        }
    }
}

impl<T> SnapshotStore<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    /// A store reading and writing `path`, trusting snapshots whose version
    /// equals `version` and whose age is within `ttl`.
    pub fn new(path: impl Into<PathBuf>, version: impl Into<String>, ttl: Duration) -> Self {
        Self {
            path: path.into(),
            version: version.into(),
            ttl,
            _marker: PhantomData,
        }
    }

    /// The entries, only when the snapshot is [`Freshness::Fresh`].
    pub async fn load(&self) -> Result<Option<Vec<T>>> {
        Ok(match self.read().await? {
            Some((payload, Freshness::Fresh)) => Some(payload.entries),
            _ => None,
        })
    }

    /// The entries and their write time regardless of freshness.
    ///
    /// This is the stale-fallback read: when a live fetch fails, a stale
    /// snapshot beats no data.
    pub async fn force_load(&self) -> Result<Option<(Vec<T>, SystemTime)>> {
        Ok(self.read().await?.map(|(payload, _)| {
            let written_at = UNIX_EPOCH + Duration::from_millis(payload.written_at_ms);
            (payload.entries, written_at)
        }))
    }

    /// Pure freshness probe.
    pub async fn freshness(&self) -> Result<Freshness> {
        Ok(self
            .read()
            .await?
            .map(|(_, freshness)| freshness)
            .unwrap_or(Freshness::Absent))
    }

    /// Whether a fresh snapshot exists.
    pub async fn is_fresh(&self) -> Result<bool> {
        Ok(self.freshness().await? == Freshness::Fresh)
    }

    /// Persist `entries` as the new snapshot, transitioning to
    /// [`Freshness::Fresh`]. The write is atomic: readers see either the
    /// old snapshot or the new one.
    pub async fn store(&self, entries: &[T]) -> Result<()> {
        let payload = PayloadRef {
            version: &self.version,
            written_at_ms: unix_millis(SystemTime::now()),
            entries,
        };
        let buf = encode(&payload)?;
        let path = self.path.clone();
        asyncify(move || write_atomic(&path, &buf)).await?;
        Ok(())
    }

    /// Remove the snapshot, transitioning to [`Freshness::Absent`].
    /// Idempotent.
    pub async fn clear(&self) -> Result<()> {
        let path = self.path.clone();
        asyncify(move || match std::fs::remove_file(&path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        })
        .await?;
        Ok(())
    }

    /// Fetch from the source of truth and persist the result; on fetch
    /// failure serve the existing snapshot, stale or not, if one exists.
    ///
    /// A persistence failure after a successful fetch is only logged: the
    /// caller asked for fresh data and got it.
    pub async fn refresh_with<F, FU>(&self, f: F) -> Result<Vec<T>>
    where
        F: FnOnce() -> FU,
        FU: Future<Output = anyhow::Result<Vec<T>>>,
    {
        match f().await {
            Ok(entries) => {
                if let Err(e) = self.store(&entries).await {
                    tracing::warn!(error = %e, "failed to persist refreshed snapshot");
                }
                Ok(entries)
            }
            Err(e) => {
                if let Ok(Some((payload, _))) = self.read().await {
                    tracing::warn!(error = %e, "refresh failed, serving stale snapshot");
                    Ok(payload.entries)
                } else {
                    Err(Error::fetch(e))
                }
            }
        }
    }

    /// Read and validate the snapshot. `None` means absent; corruption and
    /// version skew clear the file and read as absent.
    async fn read(&self) -> Result<Option<(Payload<T>, Freshness)>> {
        let path = self.path.clone();
        let buf = match asyncify(move || std::fs::read(&path)).await {
            Ok(buf) => buf,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let payload: Payload<T> = match decode(&buf) {
            Ok(payload) => payload,
            Err(reason) => {
                tracing::warn!(path = %self.path.display(), reason, "snapshot unreadable, clearing");
                self.clear().await?;
                return Ok(None);
            }
        };

        if payload.version != self.version {
            tracing::warn!(
                found = %payload.version,
                expected = %self.version,
                "snapshot version mismatch, clearing"
            );
            self.clear().await?;
            return Ok(None);
        }

        // Clock skew into the future reads as age zero.
        let written_at = UNIX_EPOCH + Duration::from_millis(payload.written_at_ms);
        let age = SystemTime::now()
            .duration_since(written_at)
            .unwrap_or_default();
        let freshness = if age <= self.ttl {
            Freshness::Fresh
        } else {
            Freshness::Stale
        };
        Ok(Some((payload, freshness)))
    }
}

fn encode<T>(payload: &PayloadRef<'_, T>) -> Result<Vec<u8>>
where
    T: Serialize,
{
    let mut buf = vec![0u8; HEADER];
    bincode::serialize_into(&mut buf, payload)?;
    let checksum = Checksummer::checksum64(&buf[HEADER..]);
    (&mut buf[0..8]).put_u64(MAGIC);
    (&mut buf[8..16]).put_u64(checksum);
    Ok(buf)
}

fn decode<T>(buf: &[u8]) -> std::result::Result<Payload<T>, &'static str>
where
    T: DeserializeOwned,
{
    if buf.len() < HEADER {
        return Err("truncated header");
    }
    let magic = (&buf[0..8]).get_u64();
    let checksum = (&buf[8..16]).get_u64();
    if magic != MAGIC {
        return Err("magic mismatch");
    }
    if checksum != Checksummer::checksum64(&buf[HEADER..]) {
        return Err("checksum mismatch");
    }
    bincode::deserialize(&buf[HEADER..]).map_err(|_| "payload undecodable")
}

fn write_atomic(path: &Path, buf: &[u8]) -> io::Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, buf)?;
    std::fs::rename(&tmp, path)
}

fn unix_millis(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Convert the blocking file call to an async call on the blocking pool.
async fn asyncify<F, T>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.unwrap()
}
