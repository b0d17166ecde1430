// src/sync/scheduler.rs
use crate::config::{EnrichmentConfig, Schedule};
use crate::sync::{SyncKind, SyncService};
use chrono::Utc;
use metrics::{counter, gauge};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Sources with a schedule enabled in `cfg`. Member import is manual only.
pub fn scheduled_sources(cfg: &EnrichmentConfig) -> Vec<(SyncKind, Schedule)> {
    let mut out = Vec::new();
    if cfg.federal_register.agency_sync.enabled {
        out.push((SyncKind::Agencies, cfg.federal_register.agency_sync.schedule));
    }
    if cfg.legislators.sync.enabled {
        out.push((SyncKind::Legislators, cfg.legislators.sync.schedule));
    }
    if cfg.federal_register.sync.enabled {
        out.push((SyncKind::Regulations, cfg.federal_register.sync.schedule));
    }
    out
}

/// Spawns one loop per scheduled source. Loops stop when `cancel` fires; a
/// run in progress sees the same token.
pub fn spawn_schedulers(service: Arc<SyncService>, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
    scheduled_sources(service.config())
        .into_iter()
        .map(|(kind, schedule)| spawn_source_loop(service.clone(), kind, schedule, cancel.clone()))
        .collect()
}

fn spawn_source_loop(
    service: Arc<SyncService>,
    kind: SyncKind,
    schedule: Schedule,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(target: "scheduler", source = kind.as_str(), %schedule, "scheduler started");
        loop {
            let now = Utc::now();
            let next = schedule.next_after(now);
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            gauge!("sync_next_run_ts", "source" => kind.as_str()).set(next.timestamp() as f64);

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            let report = service.run(kind, &cancel).await;
            counter!("scheduler_ticks_total", "source" => kind.as_str()).increment(1);
            tracing::info!(
                target: "scheduler",
                source = kind.as_str(),
                success = report.success(),
                message = report.message(),
                "scheduled sync tick"
            );
        }
        tracing::info!(target: "scheduler", source = kind.as_str(), "scheduler stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_enabled_sources_are_scheduled() {
        let mut cfg = EnrichmentConfig::default();
        assert!(scheduled_sources(&cfg).is_empty());

        cfg.legislators.sync.enabled = true;
        cfg.federal_register.sync.enabled = true;
        let kinds: Vec<SyncKind> = scheduled_sources(&cfg).into_iter().map(|(k, _)| k).collect();
        assert_eq!(kinds, vec![SyncKind::Legislators, SyncKind::Regulations]);
    }
}
