//! Civic enrichment service, binary entrypoint.
//! Loads configuration and the store snapshot, starts the sync schedulers and
//! serves the admin router.

use std::sync::Arc;

use anyhow::Context;
use civic_enrichment::{
    api::{create_router, AppState},
    config::EnrichmentConfig,
    fetch::ReqwestTransport,
    metrics::Metrics,
    store::InMemoryStore,
    sync::{scheduler, SyncService},
};
use shuttle_axum::ShuttleAxum;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Compact logs by default; `LOG_FORMAT=json` switches to one JSON object per line.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("civic_enrichment=info,warn"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    // Shuttle may have installed a subscriber already.
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = EnrichmentConfig::load_default()?;
    tracing::info!(
        state = %cfg.state_path.display(),
        snapshot = %cfg.snapshot_path.display(),
        "configuration loaded"
    );

    let transport = Arc::new(ReqwestTransport::new().context("building HTTP client")?);
    let store = Arc::new(
        InMemoryStore::load_snapshot(&cfg.snapshot_path)
            .await
            .context("loading store snapshot")?,
    );

    let service = Arc::new(
        SyncService::new(&cfg, transport, store.clone()).with_snapshot(store, cfg.snapshot_path.clone()),
    );
    let cancel = CancellationToken::new();
    let handles = scheduler::spawn_schedulers(service.clone(), cancel.clone());
    tracing::info!(schedulers = handles.len(), "sync schedulers started");

    let metrics = Metrics::init()?;
    let router = create_router(AppState { service, cancel }, &metrics);

    Ok(router.into())
}
