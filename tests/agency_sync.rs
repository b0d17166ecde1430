// tests/agency_sync.rs
//
// Agency import from a scripted agency list:
// - new agencies become level-1 executive organizations with an inferred type
// - existing curated organizations only get vacant fields filled
// - parents are linked shallowest first; existing parents are kept
// - a second run over the same list changes nothing

use std::sync::Arc;

use civic_enrichment::config::FederalRegisterConfig;
use civic_enrichment::fetch::mock::ScriptedTransport;
use civic_enrichment::model::{GovernmentBranch, GovernmentOrganization, OrganizationType};
use civic_enrichment::registry::OrganizationRegistry;
use civic_enrichment::sources::FederalRegisterClient;
use civic_enrichment::store::{InMemoryStore, OrganizationStore};
use civic_enrichment::sync::AgencySync;
use serde_json::json;
use tokio_util::sync::CancellationToken;

const FR: &str = "http://fr.test/api/v1";

fn agencies_payload() -> serde_json::Value {
    json!([
        {
            "id": 145,
            "name": "Environmental Protection Agency",
            "short_name": "EPA",
            "slug": "environmental-protection-agency",
            "url": "https://www.federalregister.gov/agencies/environmental-protection-agency",
            "agency_url": "https://www.epa.gov/",
            "description": "The EPA protects human health and the environment.",
            "parent_id": null
        },
        {
            "id": 12,
            "name": "Department of Agriculture",
            "short_name": "USDA",
            "slug": "agriculture-department",
            "parent_id": null
        },
        {
            "id": 13,
            "name": "Forest Service",
            "slug": "forest-service",
            "parent_id": 12
        },
        {
            "id": 14,
            "name": "Office of the Chief Forester",
            "slug": "office-of-the-chief-forester",
            "parent_id": 13
        },
        { "name": "record without an id is skipped" }
    ])
}

fn client(t: Arc<ScriptedTransport>) -> Arc<FederalRegisterClient> {
    let cfg = FederalRegisterConfig {
        base_url: FR.into(),
        rate_limit_ms: 0,
        retry_attempts: 1,
        ..FederalRegisterConfig::default()
    };
    Arc::new(FederalRegisterClient::new(&cfg, t))
}

async fn curated_store() -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    let mut epa = GovernmentOrganization::new_root(
        "Environmental Protection Agency",
        Some("EPA".into()),
        OrganizationType::IndependentAgency,
        GovernmentBranch::Executive,
    );
    epa.description = Some("Curated description".into());
    store.save_organization(epa).await.unwrap();
    store
}

#[tokio::test(start_paused = true)]
async fn imports_agencies_and_links_parents() {
    let t = Arc::new(ScriptedTransport::new());
    t.respond_json(&format!("{FR}/agencies"), &agencies_payload());
    let store = curated_store().await;
    let sync = AgencySync::new(client(t.clone()), store.clone());

    let r = sync.run(&CancellationToken::new()).await;
    assert!(r.success, "{}", r.message);
    assert_eq!(r.fetched, 4);
    assert_eq!((r.added, r.updated, r.skipped), (3, 1, 0));
    assert_eq!(r.parents_linked, 2);
    assert_eq!(r.errors, 0);

    let epa = store.find_organization_by_acronym("epa").await.unwrap().unwrap();
    assert_eq!(epa.description.as_deref(), Some("Curated description"));
    assert_eq!(epa.website_url.as_deref(), Some("https://www.epa.gov/"));
    assert_eq!(epa.federal_register.as_ref().map(|r| r.agency_id), Some(145));

    let usda = store.find_organization_by_acronym("USDA").await.unwrap().unwrap();
    assert_eq!(usda.organization_type, OrganizationType::Department);
    assert_eq!(usda.branch, GovernmentBranch::Executive);
    assert_eq!(usda.org_level, 1);

    let forest = store
        .find_organization_by_name("Forest Service")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(forest.parent_id, Some(usda.id));
    assert_eq!(forest.org_level, 2);

    let office = store
        .find_organization_by_name("Office of the Chief Forester")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(office.parent_id, Some(forest.id));
    assert_eq!(office.org_level, 3);
    assert_eq!(office.organization_type, OrganizationType::Office);

    // Same list again: everything matches by Federal Register id, nothing changes.
    let again = sync.run(&CancellationToken::new()).await;
    assert!(again.success);
    assert_eq!((again.added, again.updated, again.skipped), (0, 0, 4));
    assert_eq!(again.parents_linked, 0);
    assert_eq!(store.all_organizations().await.unwrap().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn upstream_parent_cycle_is_reported_and_left_unlinked() {
    let t = Arc::new(ScriptedTransport::new());
    t.respond_json(
        &format!("{FR}/agencies"),
        &json!([
            { "id": 1, "name": "Board of Alpha", "parent_id": 2 },
            { "id": 2, "name": "Board of Beta", "parent_id": 1 }
        ]),
    );
    let store = Arc::new(InMemoryStore::new());
    let sync = AgencySync::new(client(t), store.clone());

    let r = sync.run(&CancellationToken::new()).await;
    assert!(r.success);
    assert_eq!(r.added, 2);
    assert_eq!(r.errors, 2);
    assert_eq!(r.parents_linked, 0);
    assert!(r.error_messages.iter().all(|m| m.contains("cycle")));
    for org in store.all_organizations().await.unwrap() {
        assert!(org.parent_id.is_none());
        assert_eq!(org.organization_type, OrganizationType::Board);
    }
}

#[tokio::test(start_paused = true)]
async fn unreachable_api_fails_the_run() {
    let t = Arc::new(ScriptedTransport::new());
    t.respond(&format!("{FR}/agencies"), 503, "");
    let store = Arc::new(InMemoryStore::new());
    let sync = AgencySync::new(client(t), store.clone());

    let r = sync.run(&CancellationToken::new()).await;
    assert!(!r.success);
    assert!(store.all_organizations().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn linking_a_stored_root_relevels_its_subtree() {
    let t = Arc::new(ScriptedTransport::new());
    t.respond_json(
        &format!("{FR}/agencies"),
        &json!([
            { "id": 12, "name": "Department of Agriculture", "short_name": "USDA", "parent_id": null },
            { "id": 13, "name": "Forest Service", "parent_id": 12 }
        ]),
    );
    let store = Arc::new(InMemoryStore::new());
    let forest = GovernmentOrganization::new_root(
        "Forest Service",
        None,
        OrganizationType::Bureau,
        GovernmentBranch::Executive,
    );
    let office = GovernmentOrganization::new_child(&forest, "Office of the Chief Forester", None, OrganizationType::Office);
    store.save_organization(forest.clone()).await.unwrap();
    store.save_organization(office.clone()).await.unwrap();

    let r = AgencySync::new(client(t), store.clone()).run(&CancellationToken::new()).await;
    assert!(r.success, "{}", r.message);
    assert_eq!(r.parents_linked, 1);
    assert_eq!(r.errors, 0);

    let forest = store.find_organization(&forest.id).await.unwrap().unwrap();
    assert_eq!(forest.org_level, 2);
    let office = store.find_organization(&office.id).await.unwrap().unwrap();
    assert_eq!(office.parent_id, Some(forest.id));
    assert_eq!(office.org_level, 3);

    let load = OrganizationRegistry::load(store.all_organizations().await.unwrap());
    assert!(load.rejected.is_empty(), "{:?}", load.rejected);
    assert_eq!(load.registry.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn link_that_would_close_a_stored_cycle_is_refused() {
    let t = Arc::new(ScriptedTransport::new());
    t.respond_json(
        &format!("{FR}/agencies"),
        &json!([
            { "id": 1, "name": "Board of Alpha", "parent_id": 2 },
            { "id": 2, "name": "Board of Beta", "parent_id": null }
        ]),
    );
    // Stored the other way round: Beta sits under Alpha.
    let store = Arc::new(InMemoryStore::new());
    let alpha = GovernmentOrganization::new_root("Board of Alpha", None, OrganizationType::Board, GovernmentBranch::Executive);
    let beta = GovernmentOrganization::new_child(&alpha, "Board of Beta", None, OrganizationType::Board);
    store.save_organization(alpha.clone()).await.unwrap();
    store.save_organization(beta.clone()).await.unwrap();

    let r = AgencySync::new(client(t), store.clone()).run(&CancellationToken::new()).await;
    assert!(r.success);
    assert_eq!(r.parents_linked, 0);
    assert_eq!(r.errors, 1);
    assert!(r.error_messages[0].contains("cycle"), "{:?}", r.error_messages);

    let alpha = store.find_organization(&alpha.id).await.unwrap().unwrap();
    assert_eq!(alpha.parent_id, None);
    assert_eq!(alpha.org_level, 1);

    let load = OrganizationRegistry::load(store.all_organizations().await.unwrap());
    assert!(load.rejected.is_empty(), "{:?}", load.rejected);
    assert_eq!(load.registry.len(), 2);
}
