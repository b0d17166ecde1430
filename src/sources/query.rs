// src/sources/query.rs
//! Document search filters and their query-string encoding.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use urlencoding::encode;

/// Fields requested from the document search to keep payloads small.
pub const DOCUMENT_FIELDS: &[&str] = &[
    "document_number",
    "title",
    "abstract",
    "type",
    "publication_date",
    "effective_on",
    "signing_date",
    "agencies",
    "cfr_references",
    "docket_ids",
    "regulation_id_number",
    "html_url",
    "pdf_url",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentQuery {
    #[serde(default)]
    pub publication_date_gte: Option<NaiveDate>,
    #[serde(default)]
    pub publication_date_lte: Option<NaiveDate>,
    /// Upstream type codes ("RULE", "PRORULE", "NOTICE", "PRESDOCU").
    #[serde(default)]
    pub document_types: Vec<String>,
    #[serde(default)]
    pub agency_ids: Vec<u32>,
    pub per_page: u32,
    pub page: u32,
}

impl Default for DocumentQuery {
    fn default() -> Self {
        Self {
            publication_date_gte: None,
            publication_date_lte: None,
            document_types: Vec::new(),
            agency_ids: Vec::new(),
            per_page: 100,
            page: 1,
        }
    }
}

impl DocumentQuery {
    /// Documents published in the last `days` days up to `today`.
    pub fn backfill(today: NaiveDate, days: u32, per_page: u32) -> Self {
        Self {
            publication_date_gte: today.checked_sub_days(chrono::Days::new(days.into())),
            publication_date_lte: Some(today),
            per_page,
            ..Self::default()
        }
    }

    pub fn with_page(&self, page: u32) -> Self {
        Self {
            page,
            ..self.clone()
        }
    }
}

/// Query string (without the leading `?`) for the document search endpoint.
///
/// Bracketed keys are left literal; upstream expects them unescaped.
pub fn build_query_string(q: &DocumentQuery) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(d) = q.publication_date_gte {
        parts.push(format!("conditions[publication_date][gte]={d}"));
    }
    if let Some(d) = q.publication_date_lte {
        parts.push(format!("conditions[publication_date][lte]={d}"));
    }
    for t in q.document_types.iter().filter(|t| !t.trim().is_empty()) {
        parts.push(format!("conditions[type][]={}", encode(t.trim())));
    }
    for id in &q.agency_ids {
        parts.push(format!("conditions[agencies][]={id}"));
    }
    parts.push(format!("per_page={}", q.per_page));
    parts.push(format!("page={}", q.page.max(1)));
    parts.extend(DOCUMENT_FIELDS.iter().map(|f| format!("fields[]={f}")));
    parts.join("&")
}
