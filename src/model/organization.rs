// src/model/organization.rs
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Top-level classification of a government organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GovernmentBranch {
    Executive,
    Legislative,
    Judicial,
    Independent,
}

impl GovernmentBranch {
    pub fn as_str(&self) -> &'static str {
        match self {
            GovernmentBranch::Executive => "executive",
            GovernmentBranch::Legislative => "legislative",
            GovernmentBranch::Judicial => "judicial",
            GovernmentBranch::Independent => "independent",
        }
    }
}

impl fmt::Display for GovernmentBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrganizationType {
    Branch,
    Department,
    Agency,
    IndependentAgency,
    Bureau,
    Office,
    Commission,
    Board,
    Court,
    Committee,
}

impl OrganizationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrganizationType::Branch => "branch",
            OrganizationType::Department => "department",
            OrganizationType::Agency => "agency",
            OrganizationType::IndependentAgency => "independent_agency",
            OrganizationType::Bureau => "bureau",
            OrganizationType::Office => "office",
            OrganizationType::Commission => "commission",
            OrganizationType::Board => "board",
            OrganizationType::Court => "court",
            OrganizationType::Committee => "committee",
        }
    }

    /// Best guess from an official name, for sources that carry no type.
    /// Order matters: "Office of ... Administration" is an agency, not an office.
    pub fn infer_from_name(name: &str) -> Self {
        let lower = name.trim().to_lowercase();
        if lower.starts_with("department of") {
            return OrganizationType::Department;
        }
        if lower.contains("agency") || lower.contains("administration") {
            return OrganizationType::IndependentAgency;
        }
        if lower.contains("bureau") {
            return OrganizationType::Bureau;
        }
        if lower.contains("office") {
            return OrganizationType::Office;
        }
        if lower.contains("commission") {
            return OrganizationType::Commission;
        }
        if lower.contains("board") {
            return OrganizationType::Board;
        }
        OrganizationType::IndependentAgency
    }
}

/// Pointer back to the Federal Register agency record an organization came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederalRegisterRef {
    pub agency_id: u32,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Canonical registry entry. Never hard-deleted: dissolution is `active = false`
/// plus `dissolved_date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernmentOrganization {
    pub id: Uuid,
    pub official_name: String,
    #[serde(default)]
    pub acronym: Option<String>,
    pub organization_type: OrganizationType,
    pub branch: GovernmentBranch,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    /// Depth in the hierarchy; roots are 1.
    pub org_level: u32,
    #[serde(default)]
    pub established_date: Option<NaiveDate>,
    #[serde(default)]
    pub dissolved_date: Option<NaiveDate>,
    pub active: bool,
    #[serde(default)]
    pub website_url: Option<String>,
    #[serde(default)]
    pub jurisdiction_areas: BTreeSet<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub federal_register: Option<FederalRegisterRef>,
}

impl GovernmentOrganization {
    /// New active root organization with a fresh id.
    pub fn new_root(
        official_name: impl Into<String>,
        acronym: Option<String>,
        organization_type: OrganizationType,
        branch: GovernmentBranch,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            official_name: official_name.into(),
            acronym: acronym.filter(|a| !a.trim().is_empty()),
            organization_type,
            branch,
            parent_id: None,
            org_level: 1,
            established_date: None,
            dissolved_date: None,
            active: true,
            website_url: None,
            jurisdiction_areas: BTreeSet::new(),
            description: None,
            federal_register: None,
        }
    }

    /// New active child one level below `parent`, same branch.
    pub fn new_child(
        parent: &GovernmentOrganization,
        official_name: impl Into<String>,
        acronym: Option<String>,
        organization_type: OrganizationType,
    ) -> Self {
        let mut org = Self::new_root(official_name, acronym, organization_type, parent.branch);
        org.parent_id = Some(parent.id);
        org.org_level = parent.org_level + 1;
        org
    }

    /// "Official Name (ACR)" or just the official name.
    pub fn display_text(&self) -> String {
        match self.acronym.as_deref().filter(|a| !a.is_empty()) {
            Some(acr) => format!("{} ({})", self.official_name, acr),
            None => self.official_name.clone(),
        }
    }

    /// Schema.org JSON-LD rendering for downstream display.
    pub fn schema_org(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("@context".into(), json!("https://schema.org"));
        obj.insert("@type".into(), json!("GovernmentOrganization"));
        obj.insert("@id".into(), json!(format!("urn:uuid:{}", self.id)));
        obj.insert("name".into(), json!(self.official_name));
        obj.insert("additionalType".into(), json!(self.organization_type.as_str()));
        obj.insert("branch".into(), json!(self.branch.as_str()));
        if let Some(acr) = &self.acronym {
            obj.insert("alternateName".into(), json!(acr));
        }
        if let Some(url) = &self.website_url {
            obj.insert("url".into(), json!(url));
        }
        if let Some(d) = self.established_date {
            obj.insert("foundingDate".into(), json!(d.to_string()));
        }
        if let Some(d) = self.dissolved_date {
            obj.insert("dissolutionDate".into(), json!(d.to_string()));
        }
        if !self.jurisdiction_areas.is_empty() {
            let areas: Vec<&str> = self.jurisdiction_areas.iter().map(String::as_str).collect();
            obj.insert(
                "areaServed".into(),
                json!({"@type": "AdministrativeArea", "name": areas.join(", ")}),
            );
        }
        Value::Object(obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_type_from_name() {
        use OrganizationType::*;
        assert_eq!(OrganizationType::infer_from_name("Department of Energy"), Department);
        assert_eq!(
            OrganizationType::infer_from_name("Environmental Protection Agency"),
            IndependentAgency
        );
        assert_eq!(OrganizationType::infer_from_name("Census Bureau"), Bureau);
        assert_eq!(
            OrganizationType::infer_from_name("Office of Personnel Management"),
            Office
        );
        assert_eq!(
            OrganizationType::infer_from_name("Federal Trade Commission"),
            Commission
        );
        assert_eq!(
            OrganizationType::infer_from_name("National Labor Relations Board"),
            Board
        );
        assert_eq!(OrganizationType::infer_from_name("Peace Corps"), IndependentAgency);
    }

    #[test]
    fn child_sits_one_level_below_parent() {
        let dept = GovernmentOrganization::new_root(
            "Department of Commerce",
            Some("DOC".into()),
            OrganizationType::Department,
            GovernmentBranch::Executive,
        );
        let bureau = GovernmentOrganization::new_child(
            &dept,
            "Census Bureau",
            None,
            OrganizationType::Bureau,
        );
        assert_eq!(bureau.parent_id, Some(dept.id));
        assert_eq!(bureau.org_level, 2);
        assert_eq!(bureau.branch, GovernmentBranch::Executive);
        assert_eq!(dept.display_text(), "Department of Commerce (DOC)");
        assert_eq!(bureau.display_text(), "Census Bureau");
    }

    #[test]
    fn schema_org_includes_optional_fields_only_when_set() {
        let mut epa = GovernmentOrganization::new_root(
            "Environmental Protection Agency",
            Some("EPA".into()),
            OrganizationType::IndependentAgency,
            GovernmentBranch::Executive,
        );
        let doc = epa.schema_org();
        assert_eq!(doc["alternateName"], "EPA");
        assert!(doc.get("url").is_none());

        epa.website_url = Some("https://www.epa.gov".into());
        epa.jurisdiction_areas.insert("environment".into());
        let doc = epa.schema_org();
        assert_eq!(doc["url"], "https://www.epa.gov");
        assert_eq!(doc["areaServed"]["name"], "environment");
    }
}
