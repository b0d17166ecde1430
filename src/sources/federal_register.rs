// src/sources/federal_register.rs
//! Regulatory-document API client (agencies and documents).

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use urlencoding::encode;

use super::query::{build_query_string, DocumentQuery};
use super::{collect_pages, Page, SourceClient, SourceRecord};
use crate::config::FederalRegisterConfig;
use crate::error::FetchError;
use crate::fetch::{decode_or_empty, records_from_values, try_decode, Format, RateLimitedFetcher, Transport};
use crate::model::SourceTag;

const SOURCE: &str = "federal_register";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederalRegisterAgency {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub short_name: Option<String>,
    /// Agency page on the document site.
    #[serde(default)]
    pub url: Option<String>,
    /// The agency's own website.
    #[serde(default)]
    pub agency_url: Option<String>,
    #[serde(default)]
    pub parent_id: Option<u32>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
}

impl SourceRecord for FederalRegisterAgency {
    fn source(&self) -> SourceTag {
        SourceTag::FederalRegister
    }

    fn source_key(&self) -> Option<&str> {
        self.slug.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentAgency {
    #[serde(default)]
    pub id: Option<u32>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CfrReference {
    #[serde(default)]
    pub title: Option<u32>,
    #[serde(default)]
    pub part: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederalRegisterDocument {
    pub document_number: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, rename = "abstract")]
    pub summary: Option<String>,
    #[serde(default, rename = "type")]
    pub document_type: Option<String>,
    #[serde(default)]
    pub publication_date: Option<NaiveDate>,
    #[serde(default)]
    pub effective_on: Option<NaiveDate>,
    #[serde(default)]
    pub signing_date: Option<NaiveDate>,
    #[serde(default)]
    pub agencies: Vec<DocumentAgency>,
    #[serde(default)]
    pub cfr_references: Vec<CfrReference>,
    #[serde(default)]
    pub docket_ids: Vec<String>,
    #[serde(default)]
    pub regulation_id_number: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub pdf_url: Option<String>,
}

impl SourceRecord for FederalRegisterDocument {
    fn source(&self) -> SourceTag {
        SourceTag::FederalRegister
    }

    fn source_key(&self) -> Option<&str> {
        Some(self.document_number.as_str())
    }
}

#[derive(Debug, Default, Deserialize)]
struct DocumentPageRaw {
    #[serde(default)]
    count: u64,
    #[serde(default)]
    total_pages: u32,
    #[serde(default)]
    next_page_url: Option<String>,
    #[serde(default)]
    results: Vec<serde_json::Value>,
}

pub struct FederalRegisterClient {
    base_url: String,
    fetcher: RateLimitedFetcher,
}

impl FederalRegisterClient {
    pub fn new(cfg: &FederalRegisterConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            fetcher: RateLimitedFetcher::new(SOURCE, transport, cfg.fetch_policy()),
        }
    }

    pub fn fetcher(&self) -> &RateLimitedFetcher {
        &self.fetcher
    }

    /// Full agency list. The endpoint is unpaginated.
    pub async fn fetch_agencies(&self, cancel: &CancellationToken) -> Result<Vec<FederalRegisterAgency>, FetchError> {
        let url = format!("{}/agencies", self.base_url);
        let body = self.fetcher.fetch(&url, cancel).await?;
        let values: Vec<serde_json::Value> = decode_or_empty(Format::Json, &body, SOURCE, "agencies");
        let agencies: Vec<FederalRegisterAgency> = records_from_values(values, SOURCE, "agencies");
        info!(target: "sources", source = SOURCE, agencies = agencies.len(), "agencies fetched");
        Ok(agencies)
    }

    pub async fn fetch_agency(&self, slug: &str, cancel: &CancellationToken) -> Result<FederalRegisterAgency, FetchError> {
        let url = format!("{}/agencies/{}", self.base_url, encode(slug));
        let body = self.fetcher.fetch(&url, cancel).await?;
        Ok(try_decode(Format::Json, &body, &format!("agency {slug}"))?)
    }

    async fn fetch_documents_page(
        &self,
        query: &DocumentQuery,
        page: u32,
        cancel: &CancellationToken,
    ) -> Result<Page<FederalRegisterDocument>, FetchError> {
        let url = format!(
            "{}/documents?{}",
            self.base_url,
            build_query_string(&query.with_page(page))
        );
        let body = self.fetcher.fetch(&url, cancel).await?;
        let what = format!("documents page {page}");
        let raw: DocumentPageRaw = decode_or_empty(Format::Json, &body, SOURCE, &what);
        debug!(
            target: "sources",
            source = SOURCE,
            page,
            total_pages = raw.total_pages,
            count = raw.count,
            "documents page"
        );
        Ok(Page {
            has_more: raw.next_page_url.is_some() && page < raw.total_pages,
            records: records_from_values(raw.results, SOURCE, &what),
        })
    }
}

#[async_trait]
impl SourceClient for FederalRegisterClient {
    type Filter = DocumentQuery;
    type Record = FederalRegisterDocument;

    fn tag(&self) -> SourceTag {
        SourceTag::FederalRegister
    }

    async fn fetch_all(
        &self,
        filter: &DocumentQuery,
        max_pages: u32,
        cancel: &CancellationToken,
    ) -> Result<Vec<FederalRegisterDocument>, FetchError> {
        let docs = collect_pages(SOURCE, max_pages, cancel, |page| {
            self.fetch_documents_page(filter, page, cancel)
        })
        .await?;
        info!(target: "sources", source = SOURCE, documents = docs.len(), "documents fetched");
        Ok(docs)
    }

    async fn fetch_one(&self, document_number: &str, cancel: &CancellationToken) -> Result<FederalRegisterDocument, FetchError> {
        let url = format!("{}/documents/{}", self.base_url, encode(document_number));
        let body = self.fetcher.fetch(&url, cancel).await?;
        Ok(try_decode(Format::Json, &body, &format!("document {document_number}"))?)
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/agencies", self.base_url);
        self.fetcher.probe(&url, &CancellationToken::new()).await
    }
}
