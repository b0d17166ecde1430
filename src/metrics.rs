// src/metrics.rs
use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("fetch_requests_total", "Outbound requests issued, per source.");
        describe_counter!("fetch_retries_total", "Backoff retries after a transient failure.");
        describe_counter!("fetch_failures_total", "Failed request attempts, per source.");
        describe_counter!(
            "sources_decode_errors_total",
            "Pages or records that failed to decode and were skipped."
        );
        describe_counter!("linker_outcomes_total", "Entity link decisions by outcome.");
        describe_counter!("sync_runs_total", "Sync runs by source and outcome.");
        describe_counter!(
            "sync_records_total",
            "Records processed by sync runs, by source and result."
        );
        describe_gauge!("sync_last_run_ts", "Unix ts of the last finished sync run, per source.");
        describe_gauge!("sync_next_run_ts", "Unix ts of the next scheduled run, per source.");
        describe_counter!("scheduler_ticks_total", "Scheduled runs started, per source.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Installs the global Prometheus recorder. Call once per process.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// Recorder that is not installed globally; renders nothing recorded
    /// through the `metrics` macros. For routers built in tests.
    pub fn detached() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        Self {
            handle: recorder.handle(),
        }
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
