// src/sync/mod.rs
//! Batch sync jobs: agency import, member import, legislator enrichment and
//! regulation sync.
//!
//! Every job reports a result struct; nothing is thrown past a job. At most one
//! run per source is in flight: a second trigger while one runs is rejected
//! rather than queued.

pub mod agencies;
pub mod legislators;
pub mod members;
pub mod regulations;
pub mod scheduler;
pub mod service;
pub mod state;

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::{Mutex, MutexGuard};

use crate::error::SyncError;

pub use agencies::{AgencySync, AgencySyncResult};
pub use legislators::{EnrichmentPreview, SyncOrchestrator, SyncResult};
pub use members::{MemberImport, MemberImportResult};
pub use regulations::{RegulationSync, RegulationSyncResult};
pub use service::{SourceStatus, SyncReport, SyncService, SyncStatus};
pub use state::{StateFile, SyncState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncKind {
    Agencies,
    Members,
    Legislators,
    Regulations,
}

impl SyncKind {
    pub const ALL: [SyncKind; 4] = [
        SyncKind::Agencies,
        SyncKind::Members,
        SyncKind::Legislators,
        SyncKind::Regulations,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncKind::Agencies => "agencies",
            SyncKind::Members => "members",
            SyncKind::Legislators => "legislators",
            SyncKind::Regulations => "regulations",
        }
    }
}

impl fmt::Display for SyncKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Claims the per-source run slot without waiting.
pub(crate) fn try_start(slot: &Mutex<()>, kind: SyncKind) -> Result<MutexGuard<'_, ()>, SyncError> {
    slot.try_lock().map_err(|_| SyncError::AlreadyRunning(kind.as_str()))
}

/// Adds per-result record counts to `sync_records_total`.
pub(crate) fn record_counts(kind: SyncKind, counts: &[(&'static str, usize)]) {
    for (result, n) in counts {
        if *n > 0 {
            counter!("sync_records_total", "source" => kind.as_str(), "result" => *result).increment(*n as u64);
        }
    }
}
