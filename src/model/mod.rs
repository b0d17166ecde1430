// src/model/mod.rs
//! Domain records: organizations, persons, regulations, extracted entities.

pub mod entity;
pub mod keyed_map;
pub mod organization;
pub mod person;
pub mod regulation;
pub mod states;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use entity::{EntityType, ExtractedEntity, OrgDisplay};
pub use keyed_map::{AdditiveMap, ExternalIdKey, SocialPlatform};
pub use organization::{FederalRegisterRef, GovernmentBranch, GovernmentOrganization, OrganizationType};
pub use person::{Chamber, ExternalIds, Person, ScalarField, SocialMedia};
pub use regulation::{AgencyLink, CfrCitation, DocumentType, Regulation};

/// Which external source produced (or last wrote) a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceTag {
    FederalRegister,
    Congress,
    LegislatorsRepo,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::FederalRegister => "federal_register",
            SourceTag::Congress => "congress",
            SourceTag::LegislatorsRepo => "legislators_repo",
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
