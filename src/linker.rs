// src/linker.rs
//! Links extracted entities to registry organizations.
//!
//! Outcomes:
//! - `Matched`: exactly one clearly best candidate; the entity is marked
//!   verified and gets a read-only copy of the organization's display fields
//! - `Ambiguous`: tied candidates within the deciding tier; nothing is linked
//! - `NoMatch`: no candidate; the entity stays unlinked and can be retried on a
//!   later run
//! - `NotApplicable`: entity type is never linked (people, places, ...)
//!
//! None of these is an error. The only failure is a registry that cannot be
//! loaded, which surfaces from `EntityLinker::from_store`.

use metrics::counter;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::LinkerConfig;
use crate::error::RegistryError;
use crate::metrics::ensure_metrics_described;
use crate::model::{ExtractedEntity, GovernmentOrganization, OrgDisplay};
use crate::registry::{Candidate, MatchKind, OrganizationRegistry};
use crate::store::OrganizationStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkOutcome {
    Matched,
    Ambiguous,
    NoMatch,
    NotApplicable,
}

impl LinkOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkOutcome::Matched => "matched",
            LinkOutcome::Ambiguous => "ambiguous",
            LinkOutcome::NoMatch => "no_match",
            LinkOutcome::NotApplicable => "not_applicable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkResult {
    pub verified: bool,
    pub organization_id: Option<Uuid>,
    pub matched_name: Option<String>,
    pub outcome: LinkOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_kind: Option<MatchKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
    /// Official names worth a look when nothing was linked.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl LinkResult {
    fn unlinked(outcome: LinkOutcome, suggestions: Vec<String>) -> Self {
        Self {
            verified: false,
            organization_id: None,
            matched_name: None,
            outcome,
            match_kind: None,
            similarity: None,
            suggestions,
        }
    }

    fn matched(candidate: &Candidate<'_>) -> Self {
        Self {
            verified: true,
            organization_id: Some(candidate.organization.id),
            matched_name: Some(candidate.organization.official_name.clone()),
            outcome: LinkOutcome::Matched,
            match_kind: Some(candidate.kind),
            similarity: Some(candidate.similarity),
            suggestions: Vec::new(),
        }
    }
}

/// Per-batch counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkSummary {
    pub matched: usize,
    pub ambiguous: usize,
    pub no_match: usize,
    pub not_applicable: usize,
}

impl LinkSummary {
    fn record(&mut self, outcome: LinkOutcome) {
        match outcome {
            LinkOutcome::Matched => self.matched += 1,
            LinkOutcome::Ambiguous => self.ambiguous += 1,
            LinkOutcome::NoMatch => self.no_match += 1,
            LinkOutcome::NotApplicable => self.not_applicable += 1,
        }
    }
}

pub struct EntityLinker {
    registry: Arc<OrganizationRegistry>,
    cfg: LinkerConfig,
}

impl EntityLinker {
    pub fn new(registry: Arc<OrganizationRegistry>, cfg: LinkerConfig) -> Self {
        ensure_metrics_described();
        Self { registry, cfg }
    }

    /// Loads the registry from the store for one batch. Organizations that
    /// break the hierarchy rules are logged and left out; a store failure is
    /// `RegistryError::Unavailable` and must abort the batch.
    pub async fn from_store(store: &dyn OrganizationStore, cfg: LinkerConfig) -> Result<Self, RegistryError> {
        let orgs = store
            .all_organizations()
            .await
            .map_err(|e| RegistryError::Unavailable(e.to_string()))?;
        let load = OrganizationRegistry::load_with_threshold(orgs, cfg.fuzzy_threshold);
        for issue in &load.rejected {
            warn!(target: "linker", error = %issue, "organization left out of registry");
        }
        info!(
            target: "linker",
            organizations = load.registry.len(),
            rejected = load.rejected.len(),
            "registry loaded"
        );
        Ok(Self::new(Arc::new(load.registry), cfg))
    }

    pub fn registry(&self) -> &OrganizationRegistry {
        &self.registry
    }

    /// Decision for a bare name, without touching any entity.
    pub fn resolve(&self, name: &str) -> LinkResult {
        let name = name.trim();
        if name.is_empty() {
            return LinkResult::unlinked(LinkOutcome::NoMatch, Vec::new());
        }

        let candidates = self.registry.find_by_name_or_acronym(name);
        let Some(best) = candidates.first() else {
            let suggestions = self
                .registry
                .suggest(name, self.cfg.suggestion_threshold, self.cfg.max_suggestions)
                .into_iter()
                .map(|(n, _)| n)
                .collect();
            return LinkResult::unlinked(LinkOutcome::NoMatch, suggestions);
        };

        // Acronym hits are listed before name hits, so the first candidate's
        // tier is the deciding one.
        let tier: Vec<&Candidate<'_>> = candidates.iter().filter(|c| c.kind == best.kind).collect();
        let ambiguous = match best.kind {
            MatchKind::Acronym | MatchKind::Name => tier.len() > 1,
            MatchKind::Fuzzy => tier
                .get(1)
                .is_some_and(|second| best.similarity - second.similarity < self.cfg.ambiguity_margin),
        };

        if ambiguous {
            let suggestions = tier
                .iter()
                .take(self.cfg.max_suggestions.max(2))
                .map(|c| c.organization.official_name.clone())
                .collect();
            debug!(target: "linker", name, tied = tier.len(), kind = best.kind.as_str(), "ambiguous");
            return LinkResult::unlinked(LinkOutcome::Ambiguous, suggestions);
        }
        LinkResult::matched(best)
    }

    /// Resolves `entity` and records the outcome on it. A match sets
    /// `verified`, the organization id and the display copy; anything else
    /// clears them.
    pub fn link(&self, entity: &mut ExtractedEntity) -> LinkResult {
        let result = if entity.entity_type.is_linkable() {
            self.resolve(&entity.name)
        } else {
            LinkResult::unlinked(LinkOutcome::NotApplicable, Vec::new())
        };

        match result.organization_id.and_then(|id| self.registry.get(&id)) {
            Some(org) => {
                entity.verified = true;
                entity.government_organization_id = Some(org.id);
                entity.display = Some(display_of(org));
            }
            None => {
                entity.verified = false;
                entity.government_organization_id = None;
                entity.display = None;
            }
        }

        counter!("linker_outcomes_total", "outcome" => result.outcome.as_str()).increment(1);
        debug!(
            target: "linker",
            name = %entity.name,
            outcome = result.outcome.as_str(),
            organization = ?result.matched_name,
            "entity linked"
        );
        result
    }

    pub fn link_all(&self, entities: &mut [ExtractedEntity]) -> (Vec<LinkResult>, LinkSummary) {
        let mut summary = LinkSummary::default();
        let results = entities
            .iter_mut()
            .map(|e| {
                let r = self.link(e);
                summary.record(r.outcome);
                r
            })
            .collect();
        info!(
            target: "linker",
            matched = summary.matched,
            ambiguous = summary.ambiguous,
            no_match = summary.no_match,
            not_applicable = summary.not_applicable,
            "batch linked"
        );
        (results, summary)
    }
}

fn display_of(org: &GovernmentOrganization) -> OrgDisplay {
    OrgDisplay {
        official_name: org.official_name.clone(),
        acronym: org.acronym.clone(),
        website_url: org.website_url.clone(),
        display_text: org.display_text(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityType, GovernmentBranch, OrganizationType};

    fn org(name: &str, acr: Option<&str>) -> GovernmentOrganization {
        GovernmentOrganization::new_root(
            name,
            acr.map(str::to_string),
            OrganizationType::IndependentAgency,
            GovernmentBranch::Executive,
        )
    }

    fn linker(orgs: Vec<GovernmentOrganization>) -> EntityLinker {
        let load = OrganizationRegistry::load(orgs);
        assert!(load.rejected.is_empty());
        EntityLinker::new(Arc::new(load.registry), LinkerConfig::default())
    }

    #[test]
    fn acronym_tier_beats_a_different_name_match() {
        let by_acr = org("Department of Defense", Some("DOD"));
        let by_name = org("Dod", None);
        let want = by_acr.id;
        let l = linker(vec![by_name, by_acr]);
        let r = l.resolve("DOD");
        assert_eq!(r.outcome, LinkOutcome::Matched);
        assert_eq!(r.organization_id, Some(want));
        assert_eq!(r.match_kind, Some(MatchKind::Acronym));
    }

    #[test]
    fn shared_acronym_is_ambiguous() {
        let l = linker(vec![
            org("Federal Trade Commission", Some("FTC")),
            org("Fictional Tariff Council", Some("FTC")),
        ]);
        let r = l.resolve("FTC");
        assert_eq!(r.outcome, LinkOutcome::Ambiguous);
        assert!(!r.verified);
        assert_eq!(r.organization_id, None);
        assert_eq!(r.suggestions.len(), 2);
    }

    #[test]
    fn non_org_entities_are_not_linked() {
        let l = linker(vec![org("Environmental Protection Agency", Some("EPA"))]);
        let mut e = ExtractedEntity::new("EPA", EntityType::Person, 0.9);
        let r = l.link(&mut e);
        assert_eq!(r.outcome, LinkOutcome::NotApplicable);
        assert!(!e.is_linked());
    }

    #[test]
    fn relinking_clears_a_stale_link() {
        let l = linker(vec![org("Environmental Protection Agency", Some("EPA"))]);
        let mut e = ExtractedEntity::new("EPA", EntityType::GovernmentOrg, 0.9);
        l.link(&mut e);
        assert!(e.is_linked());
        e.name = "Unknown Test Agency".into();
        let r = l.link(&mut e);
        assert_eq!(r.outcome, LinkOutcome::NoMatch);
        assert!(!e.verified);
        assert!(e.display.is_none());
    }

    #[test]
    fn summary_counts_each_outcome() {
        let l = linker(vec![org("Environmental Protection Agency", Some("EPA"))]);
        let mut batch = vec![
            ExtractedEntity::new("EPA", EntityType::GovernmentOrg, 0.95),
            ExtractedEntity::new("Nowhere Bureau", EntityType::Organization, 0.5),
            ExtractedEntity::new("Washington", EntityType::Location, 0.8),
        ];
        let (results, summary) = l.link_all(&mut batch);
        assert_eq!(results.len(), 3);
        assert_eq!(
            summary,
            LinkSummary {
                matched: 1,
                ambiguous: 0,
                no_match: 1,
                not_applicable: 1
            }
        );
    }
}
