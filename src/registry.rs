// src/registry.rs
//! Hierarchical registry of government organizations.
//!
//! Built from a flat list once per batch. Loading validates the forest shape:
//! every parent must be present and accepted, and `org_level` must equal the
//! parent's level + 1 (roots are level 1). Offending organizations are left out
//! and reported, and so is everything below them.
//!
//! Lookup tiers for `find_by_name_or_acronym`:
//! 1. exact acronym (case-insensitive, dots ignored)
//! 2. exact official name (normalized)
//! 3. fuzzy over official names, only when neither exact tier matched

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::OnceLock;

use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::RegistryError;
use crate::model::{GovernmentBranch, GovernmentOrganization};
use crate::normalize::{normalize_acronym, normalize_name, similarity};

pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.85;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Acronym,
    Name,
    Fuzzy,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::Acronym => "acronym",
            MatchKind::Name => "name",
            MatchKind::Fuzzy => "fuzzy",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub organization: &'a GovernmentOrganization,
    pub kind: MatchKind,
    /// 1.0 for exact tiers.
    pub similarity: f64,
}

/// Outcome of loading: the accepted registry plus everything that was flagged.
#[derive(Debug)]
pub struct RegistryLoad {
    pub registry: OrganizationRegistry,
    pub rejected: Vec<RegistryError>,
}

#[derive(Debug)]
pub struct OrganizationRegistry {
    orgs: HashMap<Uuid, GovernmentOrganization>,
    order: Vec<Uuid>,
    by_acronym: HashMap<String, Vec<Uuid>>,
    by_name: HashMap<String, Vec<Uuid>>,
    children: OnceLock<HashMap<Uuid, BTreeSet<Uuid>>>,
    fuzzy_threshold: f64,
}

impl OrganizationRegistry {
    pub fn load(orgs: Vec<GovernmentOrganization>) -> RegistryLoad {
        Self::load_with_threshold(orgs, DEFAULT_FUZZY_THRESHOLD)
    }

    pub fn load_with_threshold(orgs: Vec<GovernmentOrganization>, fuzzy_threshold: f64) -> RegistryLoad {
        let mut rejected = Vec::new();

        // First occurrence of an id wins.
        let mut input: HashMap<Uuid, GovernmentOrganization> = HashMap::with_capacity(orgs.len());
        let mut input_order = Vec::with_capacity(orgs.len());
        for org in orgs {
            if input.contains_key(&org.id) {
                rejected.push(RegistryError::DuplicateId(org.id));
                continue;
            }
            input_order.push(org.id);
            input.insert(org.id, org);
        }

        let mut accepted: HashMap<Uuid, u32> = HashMap::new();
        let mut dropped: HashSet<Uuid> = HashSet::new();
        let mut pending: Vec<Uuid> = Vec::new();

        for id in &input_order {
            let org = &input[id];
            match org.parent_id {
                None if org.org_level == 1 => {
                    accepted.insert(*id, 1);
                }
                None => {
                    rejected.push(RegistryError::RootLevel {
                        id: *id,
                        level: org.org_level,
                    });
                    dropped.insert(*id);
                }
                Some(_) => pending.push(*id),
            }
        }

        // Resolve children level by level until nothing moves.
        loop {
            let mut progressed = false;
            let mut still_pending = Vec::with_capacity(pending.len());
            for id in pending {
                let org = &input[&id];
                let Some(parent_id) = org.parent_id else {
                    continue;
                };
                if let Some(&parent_level) = accepted.get(&parent_id) {
                    progressed = true;
                    if org.org_level == parent_level + 1 {
                        accepted.insert(id, org.org_level);
                    } else {
                        rejected.push(RegistryError::LevelMismatch {
                            id,
                            level: org.org_level,
                            expected: parent_level + 1,
                        });
                        dropped.insert(id);
                    }
                } else if dropped.contains(&parent_id) || !input.contains_key(&parent_id) {
                    progressed = true;
                    rejected.push(RegistryError::MissingParent { id, parent_id });
                    dropped.insert(id);
                } else {
                    still_pending.push(id);
                }
            }
            pending = still_pending;
            if !progressed || pending.is_empty() {
                break;
            }
        }

        // Whatever is left sits on a parent cycle or below one.
        let stuck: HashSet<Uuid> = pending.iter().copied().collect();
        for id in pending {
            let Some(parent_id) = input[&id].parent_id else {
                continue;
            };
            if on_cycle(id, &input, &stuck) {
                rejected.push(RegistryError::Cycle { id });
            } else {
                rejected.push(RegistryError::MissingParent { id, parent_id });
            }
        }

        for err in &rejected {
            warn!(target: "registry", error = %err, "organization rejected on load");
        }

        let order: Vec<Uuid> = input_order
            .into_iter()
            .filter(|id| accepted.contains_key(id))
            .collect();
        let orgs: HashMap<Uuid, GovernmentOrganization> = input
            .into_iter()
            .filter(|(id, _)| accepted.contains_key(id))
            .collect();

        let mut by_acronym: HashMap<String, Vec<Uuid>> = HashMap::new();
        let mut by_name: HashMap<String, Vec<Uuid>> = HashMap::new();
        for id in &order {
            let org = &orgs[id];
            if let Some(acr) = org.acronym.as_deref() {
                let key = normalize_acronym(acr);
                if !key.is_empty() {
                    by_acronym.entry(key).or_default().push(*id);
                }
            }
            by_name
                .entry(normalize_name(&org.official_name))
                .or_default()
                .push(*id);
        }

        debug!(
            target: "registry",
            accepted = order.len(),
            rejected = rejected.len(),
            "registry loaded"
        );

        RegistryLoad {
            registry: OrganizationRegistry {
                orgs,
                order,
                by_acronym,
                by_name,
                children: OnceLock::new(),
                fuzzy_threshold: fuzzy_threshold.clamp(0.0, 1.0),
            },
            rejected,
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, id: &Uuid) -> Option<&GovernmentOrganization> {
        self.orgs.get(id)
    }

    /// Organizations in load order.
    pub fn iter(&self) -> impl Iterator<Item = &GovernmentOrganization> {
        self.order.iter().filter_map(|id| self.orgs.get(id))
    }

    pub fn fuzzy_threshold(&self) -> f64 {
        self.fuzzy_threshold
    }

    /// Candidates for free text. Empty when nothing matches.
    pub fn find_by_name_or_acronym(&self, text: &str) -> Vec<Candidate<'_>> {
        let mut out: Vec<Candidate<'_>> = Vec::new();
        let mut seen: HashSet<Uuid> = HashSet::new();

        let acr = normalize_acronym(text);
        if !acr.is_empty() {
            for id in self.by_acronym.get(&acr).into_iter().flatten() {
                if seen.insert(*id) {
                    out.push(self.exact(id, MatchKind::Acronym));
                }
            }
        }

        let name = normalize_name(text);
        if !name.is_empty() {
            for id in self.by_name.get(&name).into_iter().flatten() {
                if seen.insert(*id) {
                    out.push(self.exact(id, MatchKind::Name));
                }
            }
        }

        if !out.is_empty() || name.is_empty() {
            return out;
        }

        let mut fuzzy: Vec<Candidate<'_>> = self
            .iter()
            .filter_map(|org| {
                let s = similarity(text, &org.official_name);
                (s >= self.fuzzy_threshold).then_some(Candidate {
                    organization: org,
                    kind: MatchKind::Fuzzy,
                    similarity: s,
                })
            })
            .collect();
        fuzzy.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.organization.official_name.cmp(&b.organization.official_name))
        });
        fuzzy
    }

    /// Official names loosely resembling `text`, best first.
    pub fn suggest(&self, text: &str, min_similarity: f64, limit: usize) -> Vec<(String, f64)> {
        let mut scored: Vec<(String, f64)> = self
            .iter()
            .map(|org| (org.official_name.clone(), similarity(text, &org.official_name)))
            .filter(|(_, s)| *s > min_similarity)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(limit);
        scored
    }

    /// Chain from the root down to the direct parent. Empty for roots and
    /// unknown ids.
    pub fn ancestors_of(&self, id: &Uuid) -> Vec<&GovernmentOrganization> {
        let mut chain = Vec::new();
        let mut cursor = self.orgs.get(id).and_then(|o| o.parent_id);
        while let Some(pid) = cursor {
            let Some(parent) = self.orgs.get(&pid) else {
                break;
            };
            chain.push(parent);
            cursor = parent.parent_id;
        }
        chain.reverse();
        chain
    }

    pub fn children_of(&self, id: &Uuid) -> BTreeSet<Uuid> {
        self.adjacency().get(id).cloned().unwrap_or_default()
    }

    /// Every organization below `id`, excluding `id` itself.
    pub fn descendants_of(&self, id: &Uuid) -> BTreeSet<Uuid> {
        let adjacency = self.adjacency();
        let mut out = BTreeSet::new();
        let mut stack: Vec<Uuid> = adjacency.get(id).into_iter().flatten().copied().collect();
        while let Some(next) = stack.pop() {
            if out.insert(next) {
                stack.extend(adjacency.get(&next).into_iter().flatten().copied());
            }
        }
        out
    }

    /// Level-1 organizations of one branch.
    pub fn top_level_of(&self, branch: GovernmentBranch) -> BTreeSet<Uuid> {
        self.iter()
            .filter(|o| o.branch == branch && o.org_level == 1)
            .map(|o| o.id)
            .collect()
    }

    pub fn count_by_branch(&self) -> BTreeMap<GovernmentBranch, usize> {
        let mut counts = BTreeMap::new();
        for org in self.iter() {
            *counts.entry(org.branch).or_insert(0) += 1;
        }
        counts
    }

    fn exact(&self, id: &Uuid, kind: MatchKind) -> Candidate<'_> {
        Candidate {
            organization: &self.orgs[id],
            kind,
            similarity: 1.0,
        }
    }

    fn adjacency(&self) -> &HashMap<Uuid, BTreeSet<Uuid>> {
        self.children.get_or_init(|| {
            let mut map: HashMap<Uuid, BTreeSet<Uuid>> = HashMap::new();
            for org in self.iter() {
                if let Some(pid) = org.parent_id {
                    map.entry(pid).or_default().insert(org.id);
                }
            }
            map
        })
    }
}

/// True when following parents from `id` through `stuck` leads back to `id`.
fn on_cycle(id: Uuid, input: &HashMap<Uuid, GovernmentOrganization>, stuck: &HashSet<Uuid>) -> bool {
    let mut cursor = input[&id].parent_id;
    for _ in 0..stuck.len() {
        match cursor {
            Some(p) if p == id => return true,
            Some(p) if stuck.contains(&p) => cursor = input[&p].parent_id,
            _ => return false,
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OrganizationType;

    fn root(name: &str, acr: Option<&str>) -> GovernmentOrganization {
        GovernmentOrganization::new_root(
            name,
            acr.map(str::to_string),
            OrganizationType::Department,
            GovernmentBranch::Executive,
        )
    }

    #[test]
    fn duplicate_ids_keep_first() {
        let a = root("Department of Energy", Some("DOE"));
        let mut b = a.clone();
        b.official_name = "Impostor".into();
        let load = OrganizationRegistry::load(vec![a.clone(), b]);
        assert_eq!(load.registry.len(), 1);
        assert_eq!(load.rejected, vec![RegistryError::DuplicateId(a.id)]);
        assert_eq!(load.registry.get(&a.id).unwrap().official_name, "Department of Energy");
    }

    #[test]
    fn parent_cycle_is_flagged() {
        let mut a = root("A Office", None);
        let mut b = root("B Office", None);
        a.parent_id = Some(b.id);
        a.org_level = 2;
        b.parent_id = Some(a.id);
        b.org_level = 2;
        let below = GovernmentOrganization::new_child(&a, "C Office", None, OrganizationType::Office);
        let load = OrganizationRegistry::load(vec![a.clone(), b.clone(), below.clone()]);
        assert!(load.registry.is_empty());
        assert_eq!(load.rejected.len(), 3);
        assert!(load.rejected.contains(&RegistryError::Cycle { id: a.id }));
        assert!(load.rejected.contains(&RegistryError::Cycle { id: b.id }));
        assert!(load.rejected.contains(&RegistryError::MissingParent {
            id: below.id,
            parent_id: a.id
        }));
    }

    #[test]
    fn dotted_acronym_matches() {
        let epa = root("Environmental Protection Agency", Some("EPA"));
        let load = OrganizationRegistry::load(vec![epa.clone()]);
        let hits = load.registry.find_by_name_or_acronym("E.P.A.");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].organization.id, epa.id);
        assert_eq!(hits[0].kind, MatchKind::Acronym);
    }

    #[test]
    fn blank_text_matches_nothing() {
        let load = OrganizationRegistry::load(vec![root("Department of State", Some("DOS"))]);
        assert!(load.registry.find_by_name_or_acronym("   ").is_empty());
    }
}
