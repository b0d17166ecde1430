// tests/api_http.rs
//
// HTTP-level tests for the admin Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health, GET /metrics
// - GET /sync/status
// - POST /sync/{source} (unknown source, result body, 409 while running)
// - POST /entities/link
// - person preview / import error mapping

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use serde_json::Value as Json;
use shuttle_axum::axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt as _; // for `oneshot`

use civic_enrichment::fetch::mock::ScriptedTransport;
use civic_enrichment::metrics::Metrics;
use civic_enrichment::model::{GovernmentBranch, GovernmentOrganization, OrganizationType};
use civic_enrichment::store::{InMemoryStore, OrganizationStore};
use civic_enrichment::{create_router, AppState, EnrichmentConfig, SyncKind, SyncService};

const BODY_LIMIT: usize = 1024 * 1024;
const FR: &str = "http://fr.test/api/v1";
const RAW: &str = "http://raw.test/data";

struct Harness {
    app: Router,
    service: Arc<SyncService>,
    _dir: tempfile::TempDir,
}

async fn harness(transport: ScriptedTransport) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = EnrichmentConfig::default();
    cfg.state_path = dir.path().join("state.json");
    cfg.federal_register.base_url = FR.into();
    cfg.federal_register.rate_limit_ms = 0;
    cfg.federal_register.retry_attempts = 1;
    cfg.legislators.base_url = RAW.into();
    cfg.legislators.api_url = "http://gh.test/repo".into();
    cfg.legislators.rate_limit_ms = 0;
    cfg.legislators.retry_attempts = 1;
    cfg.congress.base_url = "http://congress.test/v3".into();
    cfg.congress.api_key = None;

    let store = Arc::new(InMemoryStore::new());
    let epa = GovernmentOrganization::new_root(
        "Environmental Protection Agency",
        Some("EPA".into()),
        OrganizationType::IndependentAgency,
        GovernmentBranch::Executive,
    );
    store.save_organization(epa).await.unwrap();

    let service = Arc::new(SyncService::new(&cfg, Arc::new(transport), store));
    let state = AppState {
        service: service.clone(),
        cancel: CancellationToken::new(),
    };
    Harness {
        app: create_router(state, &Metrics::detached()),
        service,
        _dir: dir,
    }
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Json>) -> (StatusCode, Vec<u8>) {
    let mut req = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            req = req.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let resp = app
        .clone()
        .oneshot(req.body(body).expect("build request"))
        .await
        .expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    (status, bytes)
}

fn json_of(bytes: &[u8]) -> Json {
    serde_json::from_slice(bytes).expect("json body")
}

#[tokio::test]
async fn health_and_metrics_respond() {
    let h = harness(ScriptedTransport::new()).await;

    let (status, body) = send(&h.app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(String::from_utf8(body).unwrap(), "ok");

    let (status, _) = send(&h.app, "GET", "/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn status_lists_every_source() {
    let h = harness(ScriptedTransport::new()).await;
    let (status, body) = send(&h.app, "GET", "/sync/status", None).await;
    assert_eq!(status, StatusCode::OK);

    let v = json_of(&body);
    let kinds: Vec<&str> = v["sources"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["kind"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, ["agencies", "members", "legislators", "regulations"]);
    // Nothing is scripted, so every probe fails.
    assert!(v["sources"].as_array().unwrap().iter().all(|s| s["upstream_available"] == false));
    assert_eq!(v["organizations_total"], 1);
    assert_eq!(v["organizations_by_branch"]["executive"], 1);
    assert_eq!(v["legislators_revision"], Json::Null);
}

#[tokio::test]
async fn unknown_source_is_a_bad_request() {
    let h = harness(ScriptedTransport::new()).await;
    let (status, _) = send(&h.app, "POST", "/sync/weather", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn triggered_sync_returns_its_report() {
    let t = ScriptedTransport::new();
    t.respond_json(
        &format!("{FR}/agencies"),
        &json!([{ "id": 145, "name": "Environmental Protection Agency", "short_name": "EPA" }]),
    );
    let h = harness(t).await;

    let (status, body) = send(&h.app, "POST", "/sync/agencies", None).await;
    assert_eq!(status, StatusCode::OK);
    let v = json_of(&body);
    assert_eq!(v["source"], "agencies");
    assert_eq!(v["success"], true);
    assert_eq!(v["updated"], 1);

    // Members need an API key; the run reports failure rather than erroring.
    let (status, body) = send(&h.app, "POST", "/sync/members", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_of(&body)["success"], false);

    let (_, body) = send(&h.app, "GET", "/sync/status", None).await;
    let v = json_of(&body);
    let agencies = &v["sources"][0];
    assert_eq!(agencies["last_run"]["success"], true);
}

#[tokio::test(start_paused = true)]
async fn second_trigger_while_running_is_a_conflict() {
    let t = ScriptedTransport::new().with_latency(Duration::from_secs(30));
    t.respond_json(&format!("{FR}/agencies"), &json!([{ "id": 1, "name": "Board of Example" }]));
    let h = harness(t).await;

    let svc = h.service.clone();
    let running = tokio::spawn(async move { svc.run(SyncKind::Agencies, &CancellationToken::new()).await });
    for _ in 0..10 {
        if h.service.is_running(SyncKind::Agencies) {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(h.service.is_running(SyncKind::Agencies));

    let (status, body) = send(&h.app, "POST", "/sync/agencies", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json_of(&body)["error"]["code"], "CONFLICT");

    // A rejected run leaves the in-flight run's record alone.
    let rejected = h.service.run(SyncKind::Agencies, &CancellationToken::new()).await;
    assert!(rejected.already_running());
    assert!(!rejected.success());

    let report = running.await.unwrap();
    assert!(report.success());
    assert!(!report.already_running());
    let last = h.service.state().read().await.last_runs[&SyncKind::Agencies].clone();
    assert!(last.success);
}

#[tokio::test]
async fn link_endpoint_returns_entities_results_and_summary() {
    let h = harness(ScriptedTransport::new()).await;
    let payload = json!([
        { "name": "EPA", "entity_type": "government_org", "confidence_score": 0.9 },
        { "name": "Unknown Test Agency", "entity_type": "government_org", "confidence_score": 0.5 },
        { "name": "Jane Doe", "entity_type": "person", "confidence_score": 0.8 }
    ]);
    let (status, body) = send(&h.app, "POST", "/entities/link", Some(payload)).await;
    assert_eq!(status, StatusCode::OK);

    let v = json_of(&body);
    assert_eq!(v["entities"][0]["verified"], true);
    assert_eq!(
        v["entities"][0]["display"]["display_text"],
        "Environmental Protection Agency (EPA)"
    );
    assert_eq!(v["results"][0]["outcome"], "matched");
    assert_eq!(v["results"][1]["outcome"], "no_match");
    assert_eq!(v["entities"][1]["verified"], false);
    assert_eq!(v["summary"], json!({ "matched": 1, "ambiguous": 0, "no_match": 1, "not_applicable": 1 }));
}

#[tokio::test]
async fn person_endpoints_map_errors_to_statuses() {
    let t = ScriptedTransport::new();
    t.respond(&format!("{RAW}/legislators-current.yaml"), 503, "");
    let h = harness(t).await;

    // Dataset host down: upstream error.
    let (status, body) = send(&h.app, "GET", "/persons/S000148/enrichment-preview", None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json_of(&body)["error"]["code"], "UPSTREAM_ERROR");

    // No roster API key configured.
    let (status, body) = send(&h.app, "POST", "/persons/S000148/import", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(json_of(&body)["error"]["message"]
        .as_str()
        .unwrap()
        .contains("not configured"));
}
