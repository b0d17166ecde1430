// src/sync/regulations.rs
//! Regulation import from the document search.
//!
//! Pulls rules, proposed rules, notices and presidential documents published
//! since the last run (or over the backfill window on the first run) and links
//! each document's agencies to registry organizations: Federal Register agency
//! id first, then the entity linker on the agency name. A registry that cannot
//! be loaded aborts the run.

use chrono::{Days, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{record_counts, try_start, SyncKind};
use crate::config::{FederalRegisterSync, LinkerConfig};
use crate::error::{StoreError, SyncError};
use crate::linker::{EntityLinker, LinkOutcome};
use crate::model::{AgencyLink, CfrCitation, DocumentType, Regulation};
use crate::sources::federal_register::DocumentAgency;
use crate::sources::{DocumentQuery, FederalRegisterClient, FederalRegisterDocument, SourceClient};
use crate::store::{OrganizationStore, RegulationStore};

const SYNC_TYPES: [DocumentType; 4] = [
    DocumentType::Rule,
    DocumentType::ProposedRule,
    DocumentType::Notice,
    DocumentType::PresidentialDocument,
];
const MAX_TITLE_CHARS: usize = 1000;
const DOCUMENT_PERMALINK: &str = "https://www.federalregister.gov/d/";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegulationSyncResult {
    pub success: bool,
    /// Another run of this source held the slot; nothing was done.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub already_running: bool,
    pub since: Option<NaiveDate>,
    pub fetched: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: usize,
    pub linked_agencies: usize,
    /// Distinct upstream agency names that matched no organization.
    pub unmatched_agencies: BTreeSet<String>,
    /// Newest publication date seen; the next run starts here.
    pub latest_publication_date: Option<NaiveDate>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Processed {
    Created,
    Updated,
    Skipped,
}

pub struct RegulationSync {
    client: Arc<FederalRegisterClient>,
    regulations: Arc<dyn RegulationStore>,
    organizations: Arc<dyn OrganizationStore>,
    cfg: FederalRegisterSync,
    linker_cfg: LinkerConfig,
    running: Mutex<()>,
}

impl RegulationSync {
    pub fn new(
        client: Arc<FederalRegisterClient>,
        regulations: Arc<dyn RegulationStore>,
        organizations: Arc<dyn OrganizationStore>,
        cfg: FederalRegisterSync,
        linker_cfg: LinkerConfig,
    ) -> Self {
        Self {
            client,
            regulations,
            organizations,
            cfg,
            linker_cfg,
            running: Mutex::new(()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.try_lock().is_err()
    }

    /// Query for documents published on or after `since`, or over the backfill
    /// window ending `today` when there is no previous run.
    pub fn query(&self, since: Option<NaiveDate>, today: NaiveDate) -> DocumentQuery {
        let gte = since.or_else(|| today.checked_sub_days(Days::new(self.cfg.initial_backfill_days.into())));
        DocumentQuery {
            publication_date_gte: gte,
            document_types: SYNC_TYPES
                .iter()
                .filter_map(|t| t.upstream_code())
                .map(str::to_string)
                .collect(),
            per_page: self.cfg.page_size,
            ..DocumentQuery::default()
        }
    }

    pub async fn run(&self, since: Option<NaiveDate>, today: NaiveDate, cancel: &CancellationToken) -> RegulationSyncResult {
        match self.run_inner(since, today, cancel).await {
            Ok(r) => r,
            Err(e) => {
                warn!(target: "sync", source = "regulations", error = %e, "regulation sync failed");
                RegulationSyncResult {
                    success: false,
                    already_running: matches!(e, SyncError::AlreadyRunning(_)),
                    since,
                    message: e.to_string(),
                    ..RegulationSyncResult::default()
                }
            }
        }
    }

    async fn run_inner(
        &self,
        since: Option<NaiveDate>,
        today: NaiveDate,
        cancel: &CancellationToken,
    ) -> Result<RegulationSyncResult, SyncError> {
        let _running = try_start(&self.running, SyncKind::Regulations)?;

        let linker = EntityLinker::from_store(self.organizations.as_ref(), self.linker_cfg.clone()).await?;
        let by_fr_id: HashMap<u32, Uuid> = linker
            .registry()
            .iter()
            .filter_map(|o| o.federal_register.as_ref().map(|r| (r.agency_id, o.id)))
            .collect();

        let query = self.query(since, today);
        let documents = self.client.fetch_all(&query, self.cfg.max_pages, cancel).await?;
        let mut result = RegulationSyncResult {
            since: query.publication_date_gte,
            fetched: documents.len(),
            ..RegulationSyncResult::default()
        };
        info!(
            target: "sync",
            source = "regulations",
            since = ?result.since,
            fetched = result.fetched,
            "documents fetched"
        );

        for doc in &documents {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            if doc.document_number.trim().is_empty() {
                result.skipped += 1;
                continue;
            }
            let (links, unmatched) = link_agencies(&doc.agencies, &by_fr_id, &linker);
            match self.process(doc, links, unmatched.clone()).await {
                Ok((processed, linked)) => {
                    match processed {
                        Processed::Created => result.created += 1,
                        Processed::Updated => result.updated += 1,
                        Processed::Skipped => result.skipped += 1,
                    }
                    result.linked_agencies += linked;
                    result.unmatched_agencies.extend(unmatched);
                    result.latest_publication_date = result.latest_publication_date.max(doc.publication_date);
                }
                Err(e) => {
                    warn!(target: "sync", document = %doc.document_number, error = %e, "document failed");
                    result.errors += 1;
                }
            }
        }

        result.success = true;
        result.message = format!(
            "{} created, {} updated, {} skipped, {} errors, {} unmatched agencies",
            result.created,
            result.updated,
            result.skipped,
            result.errors,
            result.unmatched_agencies.len()
        );
        record_counts(
            SyncKind::Regulations,
            &[
                ("created", result.created),
                ("updated", result.updated),
                ("skipped", result.skipped),
                ("error", result.errors),
            ],
        );
        info!(
            target: "sync",
            source = "regulations",
            created = result.created,
            updated = result.updated,
            skipped = result.skipped,
            errors = result.errors,
            linked_agencies = result.linked_agencies,
            unmatched_agencies = result.unmatched_agencies.len(),
            "regulation sync finished"
        );
        Ok(result)
    }

    async fn process(
        &self,
        doc: &FederalRegisterDocument,
        links: Vec<AgencyLink>,
        unmatched: Vec<String>,
    ) -> Result<(Processed, usize), StoreError> {
        let fresh = to_regulation(doc, links, unmatched);
        let linked = fresh.agencies.len();
        let processed = match self.regulations.find_regulation(&doc.document_number).await? {
            None => Processed::Created,
            Some(existing) if existing == fresh => Processed::Skipped,
            Some(_) => Processed::Updated,
        };
        if processed == Processed::Skipped {
            return Ok((processed, 0));
        }
        debug!(target: "sync", document = %doc.document_number, ?processed, "regulation stored");
        self.regulations.save_regulation(fresh).await?;
        Ok((processed, linked))
    }
}

/// Resolves a document's agencies. The first linked agency is the primary one;
/// an organization listed twice is linked once.
fn link_agencies(
    agencies: &[DocumentAgency],
    by_fr_id: &HashMap<u32, Uuid>,
    linker: &EntityLinker,
) -> (Vec<AgencyLink>, Vec<String>) {
    let mut links: Vec<AgencyLink> = Vec::new();
    let mut unmatched = Vec::new();
    for agency in agencies {
        let raw = agency.name.clone().unwrap_or_default();
        let org_id = agency.id.and_then(|id| by_fr_id.get(&id).copied()).or_else(|| {
            let r = linker.resolve(&raw);
            (r.outcome == LinkOutcome::Matched).then_some(r.organization_id).flatten()
        });
        match org_id {
            Some(id) if links.iter().any(|l| l.organization_id == id) => {}
            Some(id) => links.push(AgencyLink {
                organization_id: id,
                agency_name_raw: raw,
                primary: links.is_empty(),
            }),
            None if !raw.trim().is_empty() => unmatched.push(raw),
            None => {}
        }
    }
    (links, unmatched)
}

fn truncate_title(title: &str) -> String {
    if title.chars().count() <= MAX_TITLE_CHARS {
        return title.to_string();
    }
    let head: String = title.chars().take(MAX_TITLE_CHARS - 3).collect();
    format!("{head}...")
}

fn to_regulation(doc: &FederalRegisterDocument, agencies: Vec<AgencyLink>, unmatched: Vec<String>) -> Regulation {
    Regulation {
        document_number: doc.document_number.trim().to_string(),
        title: truncate_title(doc.title.as_deref().unwrap_or_default()),
        summary: doc.summary.clone(),
        document_type: doc
            .document_type
            .as_deref()
            .map(DocumentType::from_upstream)
            .unwrap_or(DocumentType::Other),
        publication_date: doc.publication_date,
        effective_on: doc.effective_on,
        signing_date: doc.signing_date,
        regulation_id_number: doc.regulation_id_number.clone(),
        cfr_references: doc
            .cfr_references
            .iter()
            .filter_map(|c| Some(CfrCitation { title: c.title?, part: c.part? }))
            .collect(),
        docket_ids: doc.docket_ids.clone(),
        html_url: doc.html_url.clone(),
        pdf_url: doc.pdf_url.clone(),
        source_url: format!("{DOCUMENT_PERMALINK}{}", doc.document_number.trim()),
        agencies,
        unmatched_agencies: unmatched,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_titles_are_truncated_on_char_boundaries() {
        let t = "é".repeat(MAX_TITLE_CHARS + 5);
        let out = truncate_title(&t);
        assert_eq!(out.chars().count(), MAX_TITLE_CHARS);
        assert!(out.ends_with("..."));
        assert_eq!(truncate_title("Short"), "Short");
    }
}
