// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Filesystem-lease subsystem for cross-process `max_concurrency` gating
//! (spec §4.G step 2, §5): one directory per job under
//! `<data_dir>/cron-leases/`, one exclusive-create slot file per
//! concurrency unit.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LeasePayload {
    lease_id: String,
    job_id: String,
    owner: String,
    slot: u32,
    acquired_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// A held slot; `release` must be called with the matching `job_id` and
/// `leases_dir` to free it.
#[derive(Debug)]
pub struct Lease {
    pub lease_id: String,
    path: PathBuf,
}

fn job_dir(leases_dir: &Path, job_id: &str) -> PathBuf {
    leases_dir.join(URL_SAFE_NO_PAD.encode(job_id))
}

/// Attempts to acquire one of `max_concurrency` slots for `job_id`. Slots
/// found expired (`expires_at < now`) or corrupt are GC'd opportunistically
/// before the attempt. Returns `None` if every slot is currently held by a
/// live lease.
pub async fn acquire(
    leases_dir: &Path,
    job_id: &str,
    max_concurrency: u32,
    timeout_seconds: u32,
) -> Option<Lease> {
    let dir = job_dir(leases_dir, job_id);
    tokio::fs::create_dir_all(&dir).await.ok()?;

    let now = Utc::now();
    let ttl_seconds = (timeout_seconds as i64 + 30).max(30);
    let lease_id = uuid::Uuid::new_v4().to_string();

    for slot in 0..max_concurrency.max(1) {
        let path = dir.join(format!("slot-{slot}.json"));

        if let Ok(bytes) = tokio::fs::read(&path).await {
            let stale = match serde_json::from_slice::<LeasePayload>(&bytes) {
                Ok(existing) => existing.expires_at < now,
                Err(_) => true,
            };
            if stale {
                let _ = tokio::fs::remove_file(&path).await;
            }
        }

        let payload = LeasePayload {
            lease_id: lease_id.clone(),
            job_id: job_id.to_string(),
            owner: format!("pid:{}", std::process::id()),
            slot,
            acquired_at: now,
            expires_at: now + chrono::Duration::seconds(ttl_seconds),
        };
        let Ok(bytes) = serde_json::to_vec(&payload) else {
            continue;
        };

        let mut open_opts = tokio::fs::OpenOptions::new();
        open_opts.write(true).create_new(true);
        match open_opts.open(&path).await {
            Ok(mut file) => {
                use tokio::io::AsyncWriteExt;
                if file.write_all(&bytes).await.is_ok() {
                    return Some(Lease { lease_id, path });
                }
                let _ = tokio::fs::remove_file(&path).await;
                return None;
            }
            Err(_) => continue,
        }
    }
    None
}

/// Releases `lease` if the slot file still carries a matching `lease_id`.
/// Idempotent: a missing file, a mismatched id (reused by another lease),
/// or a prior GC are all silently tolerated (spec §5).
pub async fn release(lease: &Lease) {
    let Ok(bytes) = tokio::fs::read(&lease.path).await else {
        return;
    };
    if let Ok(payload) = serde_json::from_slice::<LeasePayload>(&bytes) {
        if payload.lease_id == lease.lease_id {
            let _ = tokio::fs::remove_file(&lease.path).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_slot_is_acquired_and_released() {
        let dir = tempfile::tempdir().unwrap();
        let lease = acquire(dir.path(), "job-1", 1, 30).await.unwrap();
        assert!(dir.path().join(URL_SAFE_NO_PAD.encode("job-1")).join("slot-0.json").exists());
        release(&lease).await;
        assert!(!dir.path().join(URL_SAFE_NO_PAD.encode("job-1")).join("slot-0.json").exists());
    }

    #[tokio::test]
    async fn second_acquire_fails_when_max_concurrency_one() {
        let dir = tempfile::tempdir().unwrap();
        let _first = acquire(dir.path(), "job-1", 1, 30).await.unwrap();
        assert!(acquire(dir.path(), "job-1", 1, 30).await.is_none());
    }

    #[tokio::test]
    async fn max_concurrency_two_allows_two_concurrent_leases() {
        let dir = tempfile::tempdir().unwrap();
        let a = acquire(dir.path(), "job-1", 2, 30).await.unwrap();
        let b = acquire(dir.path(), "job-1", 2, 30).await.unwrap();
        assert_ne!(a.lease_id, b.lease_id);
    }

    #[tokio::test]
    async fn expired_lease_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let job = job_dir(dir.path(), "job-1");
        tokio::fs::create_dir_all(&job).await.unwrap();
        let stale = LeasePayload {
            lease_id: "old".into(),
            job_id: "job-1".into(),
            owner: "pid:1".into(),
            slot: 0,
            acquired_at: Utc::now() - chrono::Duration::hours(1),
            expires_at: Utc::now() - chrono::Duration::minutes(1),
        };
        tokio::fs::write(job.join("slot-0.json"), serde_json::to_vec(&stale).unwrap()).await.unwrap();

        let lease = acquire(dir.path(), "job-1", 1, 30).await.unwrap();
        assert_ne!(lease.lease_id, "old");
    }

    #[tokio::test]
    async fn release_with_mismatched_lease_id_leaves_file_alone() {
        let dir = tempfile::tempdir().unwrap();
        let lease = acquire(dir.path(), "job-1", 1, 30).await.unwrap();
        let stray = Lease { lease_id: "not-the-real-one".into(), path: lease_path_for_test(&lease) };
        release(&stray).await;
        assert!(lease_path_for_test(&lease).exists());
    }

    fn lease_path_for_test(lease: &Lease) -> PathBuf {
        lease.path.clone()
    }
}
