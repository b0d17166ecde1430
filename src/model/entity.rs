// src/model/entity.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Person,
    Organization,
    GovernmentOrg,
    Location,
    Event,
    Concept,
    #[serde(other)]
    Other,
}

impl EntityType {
    /// Only organization-like entities are candidates for registry linking.
    pub fn is_linkable(&self) -> bool {
        matches!(self, EntityType::GovernmentOrg | EntityType::Organization)
    }
}

/// Read-only copy of an organization's display fields, attached on a link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgDisplay {
    pub official_name: String,
    #[serde(default)]
    pub acronym: Option<String>,
    #[serde(default)]
    pub website_url: Option<String>,
    pub display_text: String,
}

/// An entity as produced by the NLP extraction collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub name: String,
    pub entity_type: EntityType,
    #[serde(default)]
    pub source: String,
    /// Extraction certainty in [0, 1]. Unrelated to match similarity.
    pub confidence_score: f32,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub government_organization_id: Option<Uuid>,
    #[serde(default)]
    pub display: Option<OrgDisplay>,
}

impl ExtractedEntity {
    pub fn new(name: impl Into<String>, entity_type: EntityType, confidence_score: f32) -> Self {
        Self {
            name: name.into(),
            entity_type,
            source: String::new(),
            confidence_score: confidence_score.clamp(0.0, 1.0),
            verified: false,
            government_organization_id: None,
            display: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn is_linked(&self) -> bool {
        self.verified && self.government_organization_id.is_some()
    }
}
