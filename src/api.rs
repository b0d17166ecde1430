// src/api.rs
//! Thin admin surface over the sync service.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use crate::error::{FetchError, RegistryError, SyncError};
use crate::linker::{LinkResult, LinkSummary};
use crate::metrics::Metrics;
use crate::model::{ExtractedEntity, Person};
use crate::sync::{EnrichmentPreview, SyncKind, SyncReport, SyncService, SyncStatus};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SyncService>,
    /// Shared with the schedulers; cancelled on shutdown.
    pub cancel: CancellationToken,
}

pub fn create_router(state: AppState, metrics: &Metrics) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/sync/status", get(sync_status))
        .route("/sync/{source}", post(trigger_sync))
        .route("/entities/link", post(link_entities))
        .route("/persons/{bioguide_id}/enrichment-preview", get(enrichment_preview))
        .route("/persons/{bioguide_id}/import", post(import_person))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
        .merge(metrics.router())
}

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Conflict(String),
    Unavailable(String),
    Upstream(String),
    Internal(String),
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        let msg = err.to_string();
        match err {
            SyncError::Fetch(FetchError::NotFound(_)) => ApiError::NotFound(msg),
            SyncError::AlreadyRunning(_) => ApiError::Conflict(msg),
            SyncError::NotConfigured(_) | SyncError::Cancelled => ApiError::Unavailable(msg),
            SyncError::Fetch(_) => ApiError::Upstream(msg),
            SyncError::Registry(_) | SyncError::Store(_) => ApiError::Internal(msg),
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        SyncError::Registry(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, "NOT_FOUND", m),
            ApiError::Conflict(m) => (StatusCode::CONFLICT, "CONFLICT", m),
            ApiError::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE", m),
            ApiError::Upstream(m) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", m),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", m),
        };
        tracing::warn!(target: "api", %status, code, "{message}");
        (status, Json(json!({ "error": { "code": code, "message": message } }))).into_response()
    }
}

async fn sync_status(State(state): State<AppState>) -> Result<Json<SyncStatus>, ApiError> {
    state
        .service
        .status()
        .await
        .map(Json)
        .map_err(|e| ApiError::Internal(e.to_string()))
}

#[derive(Debug, Default, Deserialize)]
struct TriggerParams {
    /// Legislators only: enrich from the historical file instead.
    #[serde(default)]
    historical: bool,
}

async fn trigger_sync(
    State(state): State<AppState>,
    Path(source): Path<SyncKind>,
    Query(params): Query<TriggerParams>,
) -> Result<Json<SyncReport>, ApiError> {
    tracing::info!(target: "api", %source, historical = params.historical, "sync triggered");
    let report = if source == SyncKind::Legislators && params.historical {
        state.service.enrich_historical(&state.cancel).await
    } else {
        state.service.run(source, &state.cancel).await
    };
    if report.already_running() {
        return Err(SyncError::AlreadyRunning(source.as_str()).into());
    }
    Ok(Json(report))
}

#[derive(Debug, Serialize)]
struct LinkResponse {
    entities: Vec<ExtractedEntity>,
    results: Vec<LinkResult>,
    summary: LinkSummary,
}

async fn link_entities(
    State(state): State<AppState>,
    Json(mut entities): Json<Vec<ExtractedEntity>>,
) -> Result<Json<LinkResponse>, ApiError> {
    let linker = state.service.linker().await?;
    let (results, summary) = linker.link_all(&mut entities);
    Ok(Json(LinkResponse {
        entities,
        results,
        summary,
    }))
}

async fn enrichment_preview(
    State(state): State<AppState>,
    Path(bioguide_id): Path<String>,
) -> Result<Json<EnrichmentPreview>, ApiError> {
    Ok(Json(state.service.preview(&bioguide_id, &state.cancel).await?))
}

async fn import_person(
    State(state): State<AppState>,
    Path(bioguide_id): Path<String>,
) -> Result<Json<Person>, ApiError> {
    Ok(Json(state.service.import_member(&bioguide_id, &state.cancel).await?))
}
