// src/sync/legislators.rs
//! Enrichment of local persons from the community legislator dataset.
//!
//! The revision marker is fetched first; when it equals the last known
//! revision the run ends as "unchanged" without downloading the dataset.
//! Otherwise the dataset is fetched once and merged record by record. Each
//! merge is complete and idempotent on its own, so a cancelled or failed run
//! can simply be repeated.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{record_counts, try_start, SyncKind};
use crate::error::{FetchError, SyncError};
use crate::merge::{EnrichmentMergeEngine, EnrichmentStamp, MergeDiff, PersonEnrichment};
use crate::model::SourceTag;
use crate::sources::{LegislatorFile, LegislatorRecord, LegislatorsClient, RevisionedSource, SourceClient};
use crate::store::PersonStore;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub success: bool,
    /// Another run of this source held the slot; nothing was done.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub already_running: bool,
    /// Upstream revision the run compared against or merged from.
    pub revision: Option<String>,
    /// Revision matched the last known one; nothing was fetched.
    pub unchanged: bool,
    pub file: Option<LegislatorFile>,
    /// Upstream records merged into an existing local person.
    pub matched: usize,
    /// Upstream records with no local person (enrichment needs a prior import).
    pub not_found: usize,
    /// Upstream records without a bioguide id.
    pub skipped: usize,
    /// Per-record store failures.
    pub errors: usize,
    pub fields_added: usize,
    pub message: String,
}

impl SyncResult {
    fn failed(revision: Option<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            revision,
            message: message.into(),
            ..Self::default()
        }
    }

    fn rejected(revision: Option<String>, err: SyncError) -> Self {
        Self {
            already_running: true,
            ..Self::failed(revision, err.to_string())
        }
    }
}

/// What an enrichment would change for one person, without applying it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichmentPreview {
    pub bioguide_id: String,
    pub local_found: bool,
    pub upstream_found: bool,
    pub diff: Option<MergeDiff>,
}

pub struct SyncOrchestrator {
    client: Arc<LegislatorsClient>,
    persons: Arc<dyn PersonStore>,
    engine: EnrichmentMergeEngine,
    running: Mutex<()>,
}

impl SyncOrchestrator {
    pub fn new(client: Arc<LegislatorsClient>, persons: Arc<dyn PersonStore>) -> Self {
        Self::with_engine(client, persons, EnrichmentMergeEngine::default())
    }

    pub fn with_engine(
        client: Arc<LegislatorsClient>,
        persons: Arc<dyn PersonStore>,
        engine: EnrichmentMergeEngine,
    ) -> Self {
        Self {
            client,
            persons,
            engine,
            running: Mutex::new(()),
        }
    }

    pub fn client(&self) -> &LegislatorsClient {
        &self.client
    }

    pub fn is_running(&self) -> bool {
        self.running.try_lock().is_err()
    }

    /// Enriches from the current-legislators file unless the upstream revision
    /// equals `last_known_revision`.
    pub async fn run_full_sync(&self, last_known_revision: Option<&str>, cancel: &CancellationToken) -> SyncResult {
        let _running = match try_start(&self.running, SyncKind::Legislators) {
            Ok(g) => g,
            Err(e) => return SyncResult::rejected(None, e),
        };

        let revision = match self.client.fetch_revision(cancel).await {
            Ok(r) => r,
            Err(e) => {
                warn!(target: "sync", source = "legislators", error = %e, "revision unavailable");
                return SyncResult::failed(None, format!("revision unavailable: {e}"));
            }
        };

        if last_known_revision == Some(revision.as_str()) {
            info!(target: "sync", source = "legislators", revision = %revision, "dataset unchanged; skipping");
            return SyncResult {
                success: true,
                revision: Some(revision),
                unchanged: true,
                message: "unchanged".into(),
                ..SyncResult::default()
            };
        }

        self.enrich_locked(LegislatorFile::Current, &revision, cancel).await
    }

    /// Merges one dataset file stamped with `revision`, regardless of what was
    /// merged before.
    pub async fn enrich_file(&self, file: LegislatorFile, revision: &str, cancel: &CancellationToken) -> SyncResult {
        let _running = match try_start(&self.running, SyncKind::Legislators) {
            Ok(g) => g,
            Err(e) => return SyncResult::rejected(Some(revision.to_string()), e),
        };
        self.enrich_locked(file, revision, cancel).await
    }

    async fn enrich_locked(&self, file: LegislatorFile, revision: &str, cancel: &CancellationToken) -> SyncResult {
        let records = match self.client.fetch_all(&file, 1, cancel).await {
            Ok(r) => r,
            Err(e) => {
                warn!(target: "sync", source = "legislators", file = file.as_str(), error = %e, "dataset fetch failed");
                return SyncResult {
                    file: Some(file),
                    ..SyncResult::failed(Some(revision.to_string()), format!("dataset fetch failed: {e}"))
                };
            }
        };

        let stamp = EnrichmentStamp {
            source: SourceTag::LegislatorsRepo,
            version: revision.to_string(),
            at: Utc::now(),
        };
        let mut result = SyncResult {
            success: true,
            revision: Some(revision.to_string()),
            file: Some(file),
            ..SyncResult::default()
        };

        for record in &records {
            if cancel.is_cancelled() {
                result.success = false;
                result.message = SyncError::Cancelled.to_string();
                break;
            }
            self.merge_one(record, &stamp, &mut result).await;
        }

        if result.success {
            result.message = format!(
                "{} matched, {} not found, {} skipped, {} errors",
                result.matched, result.not_found, result.skipped, result.errors
            );
        }
        record_counts(
            SyncKind::Legislators,
            &[
                ("matched", result.matched),
                ("not_found", result.not_found),
                ("skipped", result.skipped),
                ("error", result.errors),
            ],
        );
        info!(
            target: "sync",
            source = "legislators",
            file = file.as_str(),
            revision,
            records = records.len(),
            matched = result.matched,
            not_found = result.not_found,
            skipped = result.skipped,
            errors = result.errors,
            fields_added = result.fields_added,
            "enrichment finished"
        );
        result
    }

    async fn merge_one(&self, record: &LegislatorRecord, stamp: &EnrichmentStamp, result: &mut SyncResult) {
        let Some(incoming) = PersonEnrichment::from_legislator(record) else {
            result.skipped += 1;
            return;
        };
        let mut added = None;
        let merged = self
            .persons
            .update_person(&incoming.bioguide_id, &mut |local| {
                let local = local?;
                let diff = self.engine.compute_diff(local, &incoming);
                added = Some(diff.fields_to_add.len());
                Some(self.engine.apply(local.clone(), &diff, stamp))
            })
            .await;
        match (merged, added) {
            (Ok(_), Some(added)) => {
                result.matched += 1;
                result.fields_added += added;
            }
            (Ok(_), None) => {
                debug!(target: "sync", bioguide_id = %incoming.bioguide_id, "no local person");
                result.not_found += 1;
            }
            (Err(e), _) => {
                warn!(target: "sync", bioguide_id = %incoming.bioguide_id, error = %e, "merge failed");
                result.errors += 1;
            }
        }
    }

    /// Diff against the current dataset for one person. Nothing is written.
    pub async fn preview(&self, bioguide_id: &str, cancel: &CancellationToken) -> Result<EnrichmentPreview, SyncError> {
        let local = self.persons.find_person(bioguide_id).await?;
        let upstream = match self.client.fetch_one(bioguide_id, cancel).await {
            Ok(r) => Some(r),
            Err(FetchError::NotFound(_)) => None,
            Err(e) => return Err(e.into()),
        };
        let diff = match (&local, upstream.as_ref().and_then(PersonEnrichment::from_legislator)) {
            (Some(local), Some(incoming)) => Some(self.engine.compute_diff(local, &incoming)),
            _ => None,
        };
        Ok(EnrichmentPreview {
            bioguide_id: bioguide_id.to_string(),
            local_found: local.is_some(),
            upstream_found: upstream.is_some(),
            diff,
        })
    }
}
