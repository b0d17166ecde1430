// src/sync/state.rs
//! Persisted sync bookkeeping: last known upstream revision and last run per
//! source. Reads are tolerant: a missing or corrupt file is an empty state.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

use super::SyncKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastRun {
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    /// Commit hash of the legislator dataset last enriched from.
    #[serde(default)]
    pub legislators_revision: Option<String>,
    /// Newest publication date seen by the regulation sync.
    #[serde(default)]
    pub regulations_through: Option<NaiveDate>,
    #[serde(default)]
    pub last_runs: BTreeMap<SyncKind, LastRun>,
}

impl SyncState {
    pub fn record_run(&mut self, kind: SyncKind, success: bool, message: impl Into<String>, at: DateTime<Utc>) {
        self.last_runs.insert(
            kind,
            LastRun {
                finished_at: at,
                success,
                message: message.into(),
            },
        );
    }
}

/// State file guarded for read-modify-write from concurrent runs.
#[derive(Debug)]
pub struct StateFile {
    path: PathBuf,
    lock: Mutex<()>,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read(&self) -> SyncState {
        let _g = self.lock.lock().await;
        read_state(&self.path).await
    }

    /// Applies `f` to the current state and writes it back. Write failures
    /// are logged; the updated state is returned either way.
    pub async fn update<F>(&self, f: F) -> SyncState
    where
        F: FnOnce(&mut SyncState),
    {
        let _g = self.lock.lock().await;
        let mut state = read_state(&self.path).await;
        f(&mut state);
        write_state(&self.path, &state).await;
        state
    }
}

async fn read_state(path: &Path) -> SyncState {
    match fs::read_to_string(path).await {
        Ok(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
            tracing::warn!(target: "sync", path = %path.display(), error = %e, "corrupt sync state; starting empty");
            SyncState::default()
        }),
        Err(_) => SyncState::default(),
    }
}

async fn write_state(path: &Path, s: &SyncState) {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if let Err(e) = fs::create_dir_all(dir).await {
            tracing::warn!(target: "sync", "state dir: {e:#}");
        }
    }
    if let Err(e) = fs::write(path, serde_json::to_vec_pretty(s).unwrap_or_default()).await {
        tracing::warn!(target: "sync", "write state: {e:#}");
    }
}
