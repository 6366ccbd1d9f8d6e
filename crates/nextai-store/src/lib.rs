// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The single-writer / many-reader state store (spec §4.A, §5).
//!
//! Grounded on the `Arc<Mutex<_>>`-guarded shared-state idiom the teacher
//! uses for `Agent::current_mode` and on the command-channel/broadcast hub
//! shape of its `ControlService` — generalized here into a plain
//! copy-on-write snapshot since the spec's contract (`Read`/`Write` with
//! exclusive write lease, non-tearing reads) does not require a dedicated
//! writer task.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use nextai_config::State;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, warn};

const STATE_FILE_NAME: &str = "state.json";
const TMP_FILE_NAME: &str = "state.json.tmp";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("persisted state at {0} is corrupt: {1}")]
    Corrupt(PathBuf, #[source] serde_json::Error),
    #[error("state persistence failed: {0}")]
    Io(#[source] std::io::Error),
    #[error("state encoding failed: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Outcome of a [`Store::write`] call: either the caller's closure failed
/// (pre-image retained, nothing persisted) or it succeeded but the durable
/// commit failed (in-memory snapshot already advanced — best-effort
/// durability per §4.A).
#[derive(Debug, thiserror::Error)]
pub enum WriteOutcome<E> {
    #[error(transparent)]
    User(E),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct Store {
    state: RwLock<Arc<State>>,
    /// Serializes writers (§5: "each Write holds an exclusive lease that
    /// serializes all mutators"). Held only across the closure + persist,
    /// never across a read.
    write_lease: Mutex<()>,
    data_dir: PathBuf,
}

impl Store {
    /// Loads the last committed state from `data_dir`, or populates a fresh
    /// one with built-in defaults if no file exists yet. A present but
    /// corrupt file is fatal (§4.A: "loading a corrupt persisted state is
    /// fatal at startup").
    pub async fn open(data_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let data_dir = data_dir.into();
        tokio::fs::create_dir_all(&data_dir)
            .await
            .map_err(StoreError::Io)?;
        let path = data_dir.join(STATE_FILE_NAME);

        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                debug!(path = %path.display(), "loading persisted state");
                serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt(path.clone(), e))?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no persisted state found, using defaults");
                State::with_defaults()
            }
            Err(e) => return Err(StoreError::Io(e)),
        };

        Ok(Self {
            state: RwLock::new(Arc::new(state)),
            write_lease: Mutex::new(()),
            data_dir,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Directory holding per-job cron-lease slot files (§4.G, §6).
    pub fn cron_leases_dir(&self) -> PathBuf {
        self.data_dir.join("cron-leases")
    }

    /// Invokes `f` with an immutable snapshot. Never blocks a concurrent
    /// write past the cheap `Arc` clone, and never observes a torn write.
    pub async fn read<R>(&self, f: impl FnOnce(&State) -> R) -> R {
        let snapshot = self.state.read().await.clone();
        f(&snapshot)
    }

    /// Invokes `f` with a mutable copy of the current state under the
    /// exclusive write lease. If `f` returns `Err`, the pre-image is
    /// retained and nothing is persisted. Otherwise the post-image becomes
    /// the current snapshot immediately (so later reads observe it even if
    /// persistence then fails) and is flushed to disk before returning.
    pub async fn write<E>(
        &self,
        f: impl FnOnce(&mut State) -> Result<(), E>,
    ) -> Result<(), WriteOutcome<E>> {
        let _guard = self.write_lease.lock().await;

        let pre = self.state.read().await.clone();
        let mut post = (*pre).clone();
        f(&mut post).map_err(WriteOutcome::User)?;
        let post = Arc::new(post);

        *self.state.write().await = post.clone();

        if let Err(e) = self.persist(&post).await {
            error!(error = %e, "state commit failed; in-memory snapshot already advanced");
            return Err(WriteOutcome::Store(e));
        }
        Ok(())
    }

    async fn persist(&self, state: &State) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(state).map_err(StoreError::Encode)?;
        let tmp = self.data_dir.join(TMP_FILE_NAME);
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(StoreError::Io)?;
        tokio::fs::rename(&tmp, self.data_dir.join(STATE_FILE_NAME))
            .await
            .map_err(StoreError::Io)?;
        Ok(())
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("data_dir", &self.data_dir)
            .finish()
    }
}

/// Logs and swallows a store commit failure at call sites that cannot
/// meaningfully propagate it (e.g. cron tick bookkeeping per §4.F, which
/// proceeds best-effort).
pub fn warn_on_store_error<E: std::fmt::Display>(result: &Result<(), WriteOutcome<E>>) {
    if let Err(WriteOutcome::Store(e)) = result {
        warn!(error = %e, "continuing after best-effort store commit failure");
    }
}
