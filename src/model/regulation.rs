// src/model/regulation.rs
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Rule,
    ProposedRule,
    Notice,
    PresidentialDocument,
    Other,
}

impl DocumentType {
    /// Upstream spelling ("Proposed Rule") → variant.
    pub fn from_upstream(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "rule" => DocumentType::Rule,
            "proposed rule" => DocumentType::ProposedRule,
            "notice" => DocumentType::Notice,
            "presidential document" => DocumentType::PresidentialDocument,
            _ => DocumentType::Other,
        }
    }

    /// Value for the `conditions[type][]` filter.
    pub fn upstream_code(&self) -> Option<&'static str> {
        match self {
            DocumentType::Rule => Some("RULE"),
            DocumentType::ProposedRule => Some("PRORULE"),
            DocumentType::Notice => Some("NOTICE"),
            DocumentType::PresidentialDocument => Some("PRESDOCU"),
            DocumentType::Other => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CfrCitation {
    pub title: u32,
    pub part: u32,
}

/// Link from a regulation to an issuing organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgencyLink {
    pub organization_id: Uuid,
    /// Agency name as printed on the document.
    pub agency_name_raw: String,
    /// First linked agency on the document.
    pub primary: bool,
}

/// A published regulatory document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Regulation {
    pub document_number: String,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    pub document_type: DocumentType,
    #[serde(default)]
    pub publication_date: Option<NaiveDate>,
    #[serde(default)]
    pub effective_on: Option<NaiveDate>,
    #[serde(default)]
    pub signing_date: Option<NaiveDate>,
    #[serde(default)]
    pub regulation_id_number: Option<String>,
    #[serde(default)]
    pub cfr_references: Vec<CfrCitation>,
    #[serde(default)]
    pub docket_ids: Vec<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub pdf_url: Option<String>,
    pub source_url: String,
    #[serde(default)]
    pub agencies: Vec<AgencyLink>,
    /// Upstream agency names that matched no organization.
    #[serde(default)]
    pub unmatched_agencies: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_types_map_both_ways() {
        assert_eq!(DocumentType::from_upstream("Proposed Rule"), DocumentType::ProposedRule);
        assert_eq!(DocumentType::from_upstream("Correction"), DocumentType::Other);
        assert_eq!(DocumentType::ProposedRule.upstream_code(), Some("PRORULE"));
        assert_eq!(DocumentType::Other.upstream_code(), None);
    }
}
