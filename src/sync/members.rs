// src/sync/members.rs
//! Primary person import from the legislature roster.
//!
//! Creates missing persons and refreshes the roster-owned fields (names,
//! party, state, chamber) of existing ones. Image, middle name and gender are
//! filled only when absent. Enrichment maps are never touched here.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{record_counts, try_start, SyncKind};
use crate::error::{StoreError, SyncError};
use crate::model::states::usps_code;
use crate::model::Person;
use crate::sources::{CongressClient, CongressMember, MemberFilter, SourceClient};
use crate::store::PersonStore;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MemberImportResult {
    pub success: bool,
    /// Another run of this source held the slot; nothing was done.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub already_running: bool,
    pub fetched: usize,
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub errors: usize,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Upsert {
    Added,
    Updated,
    Unchanged,
}

pub struct MemberImport {
    client: Arc<CongressClient>,
    persons: Arc<dyn PersonStore>,
    max_pages: u32,
    running: Mutex<()>,
}

impl MemberImport {
    pub fn new(client: Arc<CongressClient>, persons: Arc<dyn PersonStore>, max_pages: u32) -> Self {
        Self {
            client,
            persons,
            max_pages: max_pages.max(1),
            running: Mutex::new(()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.try_lock().is_err()
    }

    /// Imports every current member.
    pub async fn run(&self, cancel: &CancellationToken) -> MemberImportResult {
        match self.run_inner(cancel).await {
            Ok(r) => r,
            Err(e) => MemberImportResult {
                success: false,
                already_running: matches!(e, SyncError::AlreadyRunning(_)),
                message: e.to_string(),
                ..MemberImportResult::default()
            },
        }
    }

    async fn run_inner(&self, cancel: &CancellationToken) -> Result<MemberImportResult, SyncError> {
        let _running = try_start(&self.running, SyncKind::Members)?;
        if !self.client.is_configured() {
            warn!(target: "sync", source = "members", "roster API key not configured; set CONGRESS_API_KEY");
            return Err(SyncError::NotConfigured("roster API key"));
        }

        let members = self
            .client
            .fetch_all(&MemberFilter::default(), self.max_pages, cancel)
            .await?;
        let mut result = MemberImportResult {
            fetched: members.len(),
            ..MemberImportResult::default()
        };

        for member in &members {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            match self.upsert(member).await {
                Ok((Upsert::Added, _)) => result.added += 1,
                Ok((Upsert::Updated, _)) => result.updated += 1,
                Ok((Upsert::Unchanged, _)) => result.unchanged += 1,
                Err(e) => {
                    warn!(target: "sync", bioguide_id = %member.bioguide_id, error = %e, "member import failed");
                    result.errors += 1;
                }
            }
        }

        result.success = true;
        result.message = format!(
            "{} added, {} updated, {} unchanged, {} errors",
            result.added, result.updated, result.unchanged, result.errors
        );
        record_counts(
            SyncKind::Members,
            &[
                ("added", result.added),
                ("updated", result.updated),
                ("unchanged", result.unchanged),
                ("error", result.errors),
            ],
        );
        info!(
            target: "sync",
            source = "members",
            fetched = result.fetched,
            added = result.added,
            updated = result.updated,
            errors = result.errors,
            "member import finished"
        );
        Ok(result)
    }

    /// Refreshes one member by bioguide id. Shares the run slot with `run`.
    pub async fn import_one(&self, bioguide_id: &str, cancel: &CancellationToken) -> Result<Person, SyncError> {
        let _running = try_start(&self.running, SyncKind::Members)?;
        if !self.client.is_configured() {
            return Err(SyncError::NotConfigured("roster API key"));
        }
        let member = self.client.fetch_one(bioguide_id, cancel).await?;
        let (_, person) = self.upsert(&member).await?;
        Ok(person)
    }

    async fn upsert(&self, member: &CongressMember) -> Result<(Upsert, Person), SyncError> {
        let bioguide_id = member.bioguide_id.trim();
        let mut outcome = Upsert::Unchanged;
        let stored = self
            .persons
            .update_person(bioguide_id, &mut |existing| {
                let mut person = existing
                    .cloned()
                    .unwrap_or_else(|| Person::new(bioguide_id, "", ""));
                apply_roster_fields(&mut person, member);
                outcome = match existing {
                    None => Upsert::Added,
                    Some(before) if *before != person => Upsert::Updated,
                    Some(_) => Upsert::Unchanged,
                };
                person.congress_last_sync = Some(Utc::now());
                Some(person)
            })
            .await?;
        let person = stored.ok_or_else(|| StoreError::Backend(format!("person {bioguide_id} missing after upsert")))?;
        debug!(target: "sync", bioguide_id = %person.bioguide_id, ?outcome, "member upserted");
        Ok((outcome, person))
    }
}

/// Writes roster-owned fields; fill-only for image, middle name and gender.
fn apply_roster_fields(person: &mut Person, member: &CongressMember) {
    let name = member.parsed_name();
    if let Some(first) = name.first {
        person.first_name = first;
    }
    if let Some(last) = name.last {
        person.last_name = last;
    }
    if let Some(party) = member.party() {
        person.party = Some(party);
    }
    if let Some(code) = member.state.as_deref().and_then(usps_code) {
        person.state = Some(code.to_string());
    }
    if let Some(chamber) = member.latest_chamber() {
        person.chamber = Some(chamber);
    }
    if person.middle_name.is_none() {
        person.middle_name = name.middle;
    }
    if person.image_url.is_none() {
        person.image_url = member.image_url();
    }
    if person.gender.is_none() {
        person.gender = member.gender.clone().filter(|g| !g.trim().is_empty());
    }
}
