// src/model/person.rs
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::keyed_map::{AdditiveMap, ExternalIdKey, SocialPlatform};
use super::SourceTag;

/// Source-name → identifier. Values stay JSON because upstream mixes
/// integers (govtrack), strings (opensecrets) and lists (fec).
pub type ExternalIds = AdditiveMap<ExternalIdKey, serde_json::Value>;

/// Platform → handle.
pub type SocialMedia = AdditiveMap<SocialPlatform, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Chamber {
    Senate,
    House,
}

impl Chamber {
    /// Accepts roster spellings ("House of Representatives", "Senate") and
    /// dataset term codes ("rep", "sen").
    pub fn parse(s: &str) -> Option<Self> {
        let lower = s.trim().to_ascii_lowercase();
        if lower == "sen" || lower.contains("senate") {
            Some(Chamber::Senate)
        } else if lower == "rep" || lower.contains("house") {
            Some(Chamber::House)
        } else {
            None
        }
    }
}

/// Scalar person fields enrichment may fill when absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarField {
    MiddleName,
    Suffix,
    Nickname,
    Gender,
    BirthDate,
}

impl ScalarField {
    pub const ALL: [ScalarField; 5] = [
        ScalarField::MiddleName,
        ScalarField::Suffix,
        ScalarField::Nickname,
        ScalarField::Gender,
        ScalarField::BirthDate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarField::MiddleName => "middle_name",
            ScalarField::Suffix => "suffix",
            ScalarField::Nickname => "nickname",
            ScalarField::Gender => "gender",
            ScalarField::BirthDate => "birth_date",
        }
    }

    /// Canonical string form of `value` for this field, or `None` when the
    /// field cannot hold it (blank, or a date that does not parse).
    pub fn canonical(&self, value: &str) -> Option<String> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        match self {
            ScalarField::BirthDate => NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .map(|d| d.to_string()),
            _ => Some(value.to_string()),
        }
    }
}

impl fmt::Display for ScalarField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Congressional member, judge or appointee.
///
/// Primary fields (names, party, state, chamber) belong to the primary import;
/// `external_ids` and `social_media` are only ever grown by enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    /// Bioguide-style stable key; the join key for every enrichment source.
    pub bioguide_id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub middle_name: Option<String>,
    #[serde(default)]
    pub suffix: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub party: Option<String>,
    /// USPS two-letter code.
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub chamber: Option<Chamber>,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub external_ids: ExternalIds,
    #[serde(default)]
    pub social_media: SocialMedia,
    #[serde(default)]
    pub enrichment_source: Option<SourceTag>,
    /// Upstream snapshot (commit hash) of the last enrichment check.
    #[serde(default)]
    pub enrichment_version: Option<String>,
    #[serde(default)]
    pub last_enriched_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub congress_last_sync: Option<DateTime<Utc>>,
}

impl Person {
    pub fn new(
        bioguide_id: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            bioguide_id: bioguide_id.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            middle_name: None,
            suffix: None,
            nickname: None,
            party: None,
            state: None,
            chamber: None,
            birth_date: None,
            gender: None,
            image_url: None,
            external_ids: ExternalIds::new(),
            social_media: SocialMedia::new(),
            enrichment_source: None,
            enrichment_version: None,
            last_enriched_at: None,
            congress_last_sync: None,
        }
    }

    pub fn full_name(&self) -> String {
        let mut parts = vec![self.first_name.as_str()];
        if let Some(m) = self.middle_name.as_deref() {
            parts.push(m);
        }
        parts.push(self.last_name.as_str());
        if let Some(s) = self.suffix.as_deref() {
            parts.push(s);
        }
        parts.retain(|p| !p.is_empty());
        parts.join(" ")
    }

    /// Current value of a scalar field, rendered as a string.
    pub fn scalar(&self, field: ScalarField) -> Option<String> {
        match field {
            ScalarField::MiddleName => self.middle_name.clone(),
            ScalarField::Suffix => self.suffix.clone(),
            ScalarField::Nickname => self.nickname.clone(),
            ScalarField::Gender => self.gender.clone(),
            ScalarField::BirthDate => self.birth_date.map(|d| d.to_string()),
        }
        .filter(|v| !v.trim().is_empty())
    }

    /// Writes a scalar field from its string form. Values the field cannot
    /// hold are ignored.
    pub fn set_scalar(&mut self, field: ScalarField, value: &str) {
        let Some(value) = field.canonical(value) else {
            return;
        };
        match field {
            ScalarField::MiddleName => self.middle_name = Some(value),
            ScalarField::Suffix => self.suffix = Some(value),
            ScalarField::Nickname => self.nickname = Some(value),
            ScalarField::Gender => self.gender = Some(value),
            ScalarField::BirthDate => {
                if let Ok(d) = NaiveDate::parse_from_str(&value, "%Y-%m-%d") {
                    self.birth_date = Some(d);
                }
            }
        }
    }
}
