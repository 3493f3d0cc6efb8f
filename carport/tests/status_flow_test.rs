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

//! End-to-end flow combining the in-memory cache with the durable snapshot
//! store, the way a document status service uses them together.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use carport::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ProtocolStatus {
    rental_id: u64,
    handover_signed: bool,
    return_signed: bool,
}

fn statuses(signed: bool) -> Vec<ProtocolStatus> {
    vec![
        ProtocolStatus {
            rental_id: 1,
            handover_signed: signed,
            return_signed: false,
        },
        ProtocolStatus {
            rental_id: 2,
            handover_signed: signed,
            return_signed: signed,
        },
    ]
}

#[test_log::test(tokio::test)]
async fn test_memory_cache_fronts_durable_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let snapshots: SnapshotStore<ProtocolStatus> = SnapshotStore::new(
        dir.path().join("protocol-status.bin"),
        "3",
        Duration::from_secs(300),
    );
    let cache: Cache<String, Vec<ProtocolStatus>> =
        CacheBuilder::new().with_sweep_interval(None).build();

    let backend_calls = Arc::new(AtomicUsize::new(0));

    // Cold start: the fetch goes to the backend and the snapshot is written
    // behind it.
    let fetched = {
        let snapshots = snapshots.clone();
        let backend_calls = backend_calls.clone();
        cache
            .fetch("protocols:status".to_string(), move || async move {
                let entries = snapshots
                    .refresh_with(|| async {
                        backend_calls.fetch_add(1, Ordering::Relaxed);
                        Ok(statuses(false))
                    })
                    .await?;
                Ok(entries)
            })
            .await
            .unwrap()
    };
    assert_eq!(backend_calls.load(Ordering::Relaxed), 1);
    assert_eq!(fetched, statuses(false));

    // Warm reads stay in memory.
    assert_eq!(cache.get("protocols:status"), Some(statuses(false)));
    assert_eq!(backend_calls.load(Ordering::Relaxed), 1);

    // The snapshot landed and is fresh.
    assert_eq!(snapshots.load().await.unwrap(), Some(statuses(false)));
}

#[test_log::test(tokio::test)]
async fn test_restart_serves_stale_snapshot_when_backend_down() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("protocol-status.bin");

    // A previous session wrote a snapshot that has since gone stale.
    let previous: SnapshotStore<ProtocolStatus> = SnapshotStore::new(&path, "3", Duration::ZERO);
    previous.store(&statuses(true)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    // New session: cache cold, backend unreachable.
    let snapshots: SnapshotStore<ProtocolStatus> = SnapshotStore::new(&path, "3", Duration::ZERO);
    let cache: Cache<String, Vec<ProtocolStatus>> =
        CacheBuilder::new().with_sweep_interval(None).build();

    let served = {
        let snapshots = snapshots.clone();
        cache
            .fetch("protocols:status".to_string(), move || async move {
                let entries = snapshots
                    .refresh_with(|| async { Err(anyhow::anyhow!("backend down")) })
                    .await?;
                Ok(entries)
            })
            .await
            .unwrap()
    };
    assert_eq!(served, statuses(true));

    // The stale data is now served from memory, too.
    assert_eq!(cache.get("protocols:status"), Some(statuses(true)));
}

#[test_log::test(tokio::test)]
async fn test_domain_write_invalidates_cached_reads() {
    let cache: Cache<String, Vec<ProtocolStatus>> =
        CacheBuilder::new().with_sweep_interval(None).build();
    let options = FetchOptions::new()
        .with_ttl(Duration::from_secs(600))
        .with_tags(["protocols"]);

    cache
        .fetch_with("protocols:status".to_string(), options.clone(), || async {
            Ok(statuses(false))
        })
        .await
        .unwrap();

    // A protocol gets signed; the writer invalidates right after the write.
    assert_eq!(cache.invalidate(&["protocols"]), 1);

    let refreshed = cache
        .fetch_with("protocols:status".to_string(), options, || async {
            Ok(statuses(true))
        })
        .await
        .unwrap();
    assert_eq!(refreshed, statuses(true));
}
