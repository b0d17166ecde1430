// tests/registry_hierarchy.rs
//
// Registry load and traversal over a small executive/legislative forest:
// - invalid entries (missing parent, wrong level) are rejected with everything below them
// - ancestors, children, descendants and top-level queries
// - lookup tiers: acronym before name, fuzzy only as a fallback

use std::collections::BTreeSet;

use civic_enrichment::error::RegistryError;
use civic_enrichment::model::{GovernmentBranch, GovernmentOrganization, OrganizationType};
use civic_enrichment::registry::{MatchKind, OrganizationRegistry};
use uuid::Uuid;

struct Forest {
    usda: GovernmentOrganization,
    forest_service: GovernmentOrganization,
    chief: GovernmentOrganization,
    epa: GovernmentOrganization,
    gao: GovernmentOrganization,
}

fn forest() -> Forest {
    let usda = GovernmentOrganization::new_root(
        "Department of Agriculture",
        Some("USDA".into()),
        OrganizationType::Department,
        GovernmentBranch::Executive,
    );
    let forest_service = GovernmentOrganization::new_child(&usda, "Forest Service", Some("FS".into()), OrganizationType::Bureau);
    let chief = GovernmentOrganization::new_child(&forest_service, "Office of the Chief", None, OrganizationType::Office);
    let epa = GovernmentOrganization::new_root(
        "Environmental Protection Agency",
        Some("EPA".into()),
        OrganizationType::IndependentAgency,
        GovernmentBranch::Executive,
    );
    let gao = GovernmentOrganization::new_root(
        "Government Accountability Office",
        Some("GAO".into()),
        OrganizationType::Office,
        GovernmentBranch::Legislative,
    );
    Forest {
        usda,
        forest_service,
        chief,
        epa,
        gao,
    }
}

fn all(f: &Forest) -> Vec<GovernmentOrganization> {
    vec![
        f.chief.clone(),
        f.forest_service.clone(),
        f.usda.clone(),
        f.epa.clone(),
        f.gao.clone(),
    ]
}

#[test]
fn hierarchy_queries_follow_parent_links() {
    let f = forest();
    // Children listed before their parents still load.
    let load = OrganizationRegistry::load(all(&f));
    assert!(load.rejected.is_empty(), "{:?}", load.rejected);
    let reg = load.registry;
    assert_eq!(reg.len(), 5);

    let chain: Vec<Uuid> = reg.ancestors_of(&f.chief.id).iter().map(|o| o.id).collect();
    assert_eq!(chain, vec![f.usda.id, f.forest_service.id]);
    assert!(reg.ancestors_of(&f.usda.id).is_empty());
    assert!(reg.ancestors_of(&Uuid::new_v4()).is_empty());

    assert_eq!(reg.children_of(&f.usda.id), BTreeSet::from([f.forest_service.id]));
    assert_eq!(reg.descendants_of(&f.usda.id), BTreeSet::from([f.forest_service.id, f.chief.id]));
    assert!(reg.descendants_of(&f.chief.id).is_empty());

    assert_eq!(reg.top_level_of(GovernmentBranch::Executive), BTreeSet::from([f.usda.id, f.epa.id]));
    assert_eq!(reg.top_level_of(GovernmentBranch::Legislative), BTreeSet::from([f.gao.id]));
    assert!(reg.top_level_of(GovernmentBranch::Judicial).is_empty());

    let counts = reg.count_by_branch();
    assert_eq!(counts[&GovernmentBranch::Executive], 4);
    assert_eq!(counts[&GovernmentBranch::Legislative], 1);
}

#[test]
fn invalid_entries_are_rejected_with_their_subtree() {
    let f = forest();
    let mut orphan = GovernmentOrganization::new_root("Orphan Bureau", None, OrganizationType::Bureau, GovernmentBranch::Executive);
    let ghost = Uuid::new_v4();
    orphan.parent_id = Some(ghost);
    orphan.org_level = 2;
    let below_orphan = GovernmentOrganization::new_child(&orphan, "Orphan Office", None, OrganizationType::Office);

    let mut too_deep = GovernmentOrganization::new_child(&f.epa, "Office of Water", None, OrganizationType::Office);
    too_deep.org_level = 4;

    let mut bad_root = GovernmentOrganization::new_root("Floating Board", None, OrganizationType::Board, GovernmentBranch::Executive);
    bad_root.org_level = 2;

    let mut orgs = all(&f);
    orgs.extend([below_orphan.clone(), orphan.clone(), too_deep.clone(), bad_root.clone()]);
    let load = OrganizationRegistry::load(orgs);

    assert_eq!(load.registry.len(), 5);
    assert!(load.registry.get(&orphan.id).is_none());
    assert!(load.registry.get(&below_orphan.id).is_none());
    assert!(load.registry.get(&too_deep.id).is_none());
    assert!(load.registry.get(&bad_root.id).is_none());

    assert!(load.rejected.contains(&RegistryError::MissingParent {
        id: orphan.id,
        parent_id: ghost
    }));
    assert!(load.rejected.contains(&RegistryError::MissingParent {
        id: below_orphan.id,
        parent_id: orphan.id
    }));
    assert!(load.rejected.contains(&RegistryError::LevelMismatch {
        id: too_deep.id,
        level: 4,
        expected: 2
    }));
    assert!(load.rejected.contains(&RegistryError::RootLevel { id: bad_root.id, level: 2 }));
}

#[test]
fn lookup_tiers() {
    let f = forest();
    let reg = OrganizationRegistry::load(all(&f)).registry;

    let hits = reg.find_by_name_or_acronym("usda");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].kind, MatchKind::Acronym);

    let hits = reg.find_by_name_or_acronym("  forest   SERVICE ");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].kind, MatchKind::Name);
    assert_eq!(hits[0].organization.id, f.forest_service.id);

    let hits = reg.find_by_name_or_acronym("Enviromental Protection Agency");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].kind, MatchKind::Fuzzy);
    assert!(hits[0].similarity >= reg.fuzzy_threshold() && hits[0].similarity < 1.0);

    assert!(reg.find_by_name_or_acronym("Unknown Test Agency").is_empty());

    let suggestions = reg.suggest("Environmental Agency", 0.4, 3);
    assert_eq!(suggestions.first().map(|(n, _)| n.as_str()), Some("Environmental Protection Agency"));
}
