// src/sync/service.rs
//! Wiring of all sync jobs over one store and one transport, plus the state
//! file, run metrics and the status report used by the admin surface and the
//! scheduler.

use chrono::{NaiveDate, Utc};
use metrics::{counter, gauge};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::state::{LastRun, StateFile};
use super::{
    AgencySync, AgencySyncResult, EnrichmentPreview, MemberImport, MemberImportResult, RegulationSync,
    RegulationSyncResult, SyncKind, SyncOrchestrator, SyncResult,
};
use crate::config::EnrichmentConfig;
use crate::error::{RegistryError, StoreError, SyncError};
use crate::fetch::Transport;
use crate::linker::EntityLinker;
use crate::metrics::ensure_metrics_described;
use crate::model::{GovernmentBranch, Person};
use crate::sources::{
    CongressClient, FederalRegisterClient, LegislatorFile, LegislatorsClient, RevisionedSource, SourceClient,
};
use crate::store::{InMemoryStore, OrganizationStore, PersonStore, RegulationStore};

/// Outcome of one triggered run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum SyncReport {
    Agencies(AgencySyncResult),
    Members(MemberImportResult),
    Legislators(SyncResult),
    Regulations(RegulationSyncResult),
}

impl SyncReport {
    pub fn kind(&self) -> SyncKind {
        match self {
            SyncReport::Agencies(_) => SyncKind::Agencies,
            SyncReport::Members(_) => SyncKind::Members,
            SyncReport::Legislators(_) => SyncKind::Legislators,
            SyncReport::Regulations(_) => SyncKind::Regulations,
        }
    }

    pub fn success(&self) -> bool {
        match self {
            SyncReport::Agencies(r) => r.success,
            SyncReport::Members(r) => r.success,
            SyncReport::Legislators(r) => r.success,
            SyncReport::Regulations(r) => r.success,
        }
    }

    /// The run was rejected because another run of the same source held the slot.
    pub fn already_running(&self) -> bool {
        match self {
            SyncReport::Agencies(r) => r.already_running,
            SyncReport::Members(r) => r.already_running,
            SyncReport::Legislators(r) => r.already_running,
            SyncReport::Regulations(r) => r.already_running,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            SyncReport::Agencies(r) => &r.message,
            SyncReport::Members(r) => &r.message,
            SyncReport::Legislators(r) => &r.message,
            SyncReport::Regulations(r) => &r.message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceStatus {
    pub kind: SyncKind,
    pub scheduled: bool,
    pub last_run: Option<LastRun>,
    pub upstream_available: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStatus {
    pub sources: Vec<SourceStatus>,
    pub legislators_revision: Option<String>,
    pub regulations_through: Option<NaiveDate>,
    pub organizations_total: usize,
    pub organizations_by_branch: BTreeMap<GovernmentBranch, usize>,
    pub persons_total: usize,
    pub regulations_total: usize,
}

pub struct SyncService {
    agencies: AgencySync,
    members: MemberImport,
    legislators: SyncOrchestrator,
    regulations: RegulationSync,
    federal_register: Arc<FederalRegisterClient>,
    congress: Arc<CongressClient>,
    legislators_client: Arc<LegislatorsClient>,
    persons: Arc<dyn PersonStore>,
    organizations: Arc<dyn OrganizationStore>,
    regulation_store: Arc<dyn RegulationStore>,
    state: StateFile,
    scheduled: BTreeMap<SyncKind, bool>,
    cfg: EnrichmentConfig,
    snapshot: Option<(Arc<InMemoryStore>, PathBuf)>,
}

impl SyncService {
    pub fn new<S>(cfg: &EnrichmentConfig, transport: Arc<dyn Transport>, store: Arc<S>) -> Self
    where
        S: PersonStore + OrganizationStore + RegulationStore + 'static,
    {
        ensure_metrics_described();
        let persons: Arc<dyn PersonStore> = store.clone();
        let organizations: Arc<dyn OrganizationStore> = store.clone();
        let regulation_store: Arc<dyn RegulationStore> = store;

        let federal_register = Arc::new(FederalRegisterClient::new(&cfg.federal_register, transport.clone()));
        let congress = Arc::new(CongressClient::new(&cfg.congress, transport.clone()));
        let legislators_client = Arc::new(LegislatorsClient::new(&cfg.legislators, transport));

        let scheduled = BTreeMap::from([
            (SyncKind::Agencies, cfg.federal_register.agency_sync.enabled),
            (SyncKind::Members, false),
            (SyncKind::Legislators, cfg.legislators.sync.enabled),
            (SyncKind::Regulations, cfg.federal_register.sync.enabled),
        ]);

        Self {
            agencies: AgencySync::new(federal_register.clone(), organizations.clone()),
            members: MemberImport::new(congress.clone(), persons.clone(), cfg.congress.max_pages),
            legislators: SyncOrchestrator::new(legislators_client.clone(), persons.clone()),
            regulations: RegulationSync::new(
                federal_register.clone(),
                regulation_store.clone(),
                organizations.clone(),
                cfg.federal_register.sync.clone(),
                cfg.linker.clone(),
            ),
            federal_register,
            congress,
            legislators_client,
            persons,
            organizations,
            regulation_store,
            state: StateFile::new(cfg.state_path.clone()),
            scheduled,
            cfg: cfg.clone(),
            snapshot: None,
        }
    }

    /// Writes a store snapshot to `path` after every run.
    pub fn with_snapshot(mut self, store: Arc<InMemoryStore>, path: impl Into<PathBuf>) -> Self {
        self.snapshot = Some((store, path.into()));
        self
    }

    pub fn config(&self) -> &EnrichmentConfig {
        &self.cfg
    }

    pub fn state(&self) -> &StateFile {
        &self.state
    }

    pub fn orchestrator(&self) -> &SyncOrchestrator {
        &self.legislators
    }

    pub fn is_running(&self, kind: SyncKind) -> bool {
        match kind {
            SyncKind::Agencies => self.agencies.is_running(),
            SyncKind::Members => self.members.is_running(),
            SyncKind::Legislators => self.legislators.is_running(),
            SyncKind::Regulations => self.regulations.is_running(),
        }
    }

    /// Runs one source to completion and records the outcome.
    pub async fn run(&self, kind: SyncKind, cancel: &CancellationToken) -> SyncReport {
        info!(target: "sync", source = kind.as_str(), "sync started");
        let report = match kind {
            SyncKind::Agencies => SyncReport::Agencies(self.agencies.run(cancel).await),
            SyncKind::Members => SyncReport::Members(self.members.run(cancel).await),
            SyncKind::Legislators => {
                let last = self.state.read().await.legislators_revision;
                SyncReport::Legislators(self.legislators.run_full_sync(last.as_deref(), cancel).await)
            }
            SyncKind::Regulations => {
                let since = self.state.read().await.regulations_through;
                let today = Utc::now().date_naive();
                SyncReport::Regulations(self.regulations.run(since, today, cancel).await)
            }
        };
        self.finish(&report).await;
        report
    }

    /// Additive enrichment from the historical-legislators file at the
    /// current upstream revision.
    pub async fn enrich_historical(&self, cancel: &CancellationToken) -> SyncReport {
        let result = match self.legislators_client.fetch_revision(cancel).await {
            Ok(revision) => {
                self.legislators
                    .enrich_file(LegislatorFile::Historical, &revision, cancel)
                    .await
            }
            Err(e) => SyncResult {
                success: false,
                message: format!("revision unavailable: {e}"),
                ..SyncResult::default()
            },
        };
        let report = SyncReport::Legislators(result);
        self.finish(&report).await;
        report
    }

    async fn finish(&self, report: &SyncReport) {
        let kind = report.kind();
        // The run holding the slot records its own outcome.
        if report.already_running() {
            info!(target: "sync", source = kind.as_str(), "sync rejected: already running");
            return;
        }
        let outcome = if report.success() { "success" } else { "failure" };
        counter!("sync_runs_total", "source" => kind.as_str(), "outcome" => outcome).increment(1);
        gauge!("sync_last_run_ts", "source" => kind.as_str()).set(Utc::now().timestamp() as f64);

        let now = Utc::now();
        self.state
            .update(|s| {
                s.record_run(kind, report.success(), report.message(), now);
                match report {
                    // Only a complete current-file run may advance the revision.
                    SyncReport::Legislators(r)
                        if r.success && !r.unchanged && r.file == Some(LegislatorFile::Current) =>
                    {
                        s.legislators_revision = r.revision.clone();
                    }
                    SyncReport::Regulations(r) if r.success => {
                        s.regulations_through = s.regulations_through.max(r.latest_publication_date);
                    }
                    _ => {}
                }
            })
            .await;

        if let Some((store, path)) = &self.snapshot {
            if let Err(e) = store.save_snapshot(path).await {
                warn!(target: "sync", error = %e, "snapshot write failed");
            }
        }
        info!(
            target: "sync",
            source = kind.as_str(),
            success = report.success(),
            message = report.message(),
            "sync finished"
        );
    }

    pub async fn preview(&self, bioguide_id: &str, cancel: &CancellationToken) -> Result<EnrichmentPreview, SyncError> {
        self.legislators.preview(bioguide_id, cancel).await
    }

    pub async fn import_member(&self, bioguide_id: &str, cancel: &CancellationToken) -> Result<Person, SyncError> {
        self.members.import_one(bioguide_id, cancel).await
    }

    /// Linker over the organizations currently stored.
    pub async fn linker(&self) -> Result<EntityLinker, RegistryError> {
        EntityLinker::from_store(self.organizations.as_ref(), self.cfg.linker.clone()).await
    }

    pub async fn status(&self) -> Result<SyncStatus, StoreError> {
        let state = self.state.read().await;
        let (fr_up, congress_up, legislators_up) = tokio::join!(
            self.federal_register.is_available(),
            self.congress.is_available(),
            self.legislators_client.is_available(),
        );

        let orgs = self.organizations.all_organizations().await?;
        let mut by_branch = BTreeMap::new();
        for org in &orgs {
            *by_branch.entry(org.branch).or_insert(0) += 1;
        }

        let sources = SyncKind::ALL
            .iter()
            .map(|kind| SourceStatus {
                kind: *kind,
                scheduled: self.scheduled.get(kind).copied().unwrap_or(false),
                last_run: state.last_runs.get(kind).cloned(),
                upstream_available: match kind {
                    SyncKind::Agencies | SyncKind::Regulations => fr_up,
                    SyncKind::Members => congress_up,
                    SyncKind::Legislators => legislators_up,
                },
            })
            .collect();

        Ok(SyncStatus {
            sources,
            legislators_revision: state.legislators_revision.clone(),
            regulations_through: state.regulations_through,
            organizations_total: orgs.len(),
            organizations_by_branch: by_branch,
            persons_total: self.persons.all_persons().await?.len(),
            regulations_total: self.regulation_store.regulation_count().await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::mock::ScriptedTransport;

    fn service(dir: &tempfile::TempDir) -> SyncService {
        let mut cfg = EnrichmentConfig::default();
        cfg.state_path = dir.path().join("state.json");
        SyncService::new(&cfg, Arc::new(ScriptedTransport::new()), Arc::new(InMemoryStore::new()))
    }

    #[tokio::test]
    async fn rejected_run_records_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);

        let rejected = SyncReport::Regulations(RegulationSyncResult {
            already_running: true,
            latest_publication_date: NaiveDate::from_ymd_opt(2024, 5, 1),
            message: "a regulations sync is already running".into(),
            ..RegulationSyncResult::default()
        });
        svc.finish(&rejected).await;
        let state = svc.state().read().await;
        assert!(state.last_runs.is_empty());
        assert_eq!(state.regulations_through, None);

        let done = SyncReport::Regulations(RegulationSyncResult {
            success: true,
            latest_publication_date: NaiveDate::from_ymd_opt(2024, 5, 1),
            ..RegulationSyncResult::default()
        });
        svc.finish(&done).await;
        let state = svc.state().read().await;
        assert!(state.last_runs[&SyncKind::Regulations].success);
        assert_eq!(state.regulations_through, NaiveDate::from_ymd_opt(2024, 5, 1));
    }

    #[test]
    fn slot_rejection_is_flagged_on_the_report() {
        let r = SyncReport::Legislators(SyncResult {
            already_running: true,
            ..SyncResult::default()
        });
        assert!(r.already_running());
        assert!(!SyncReport::Members(MemberImportResult::default()).already_running());
    }
}
