// src/sources/legislators.rs
//! Community-maintained legislator dataset.
//!
//! One bulk YAML document per file plus a revision marker (latest commit hash).
//! No server-side filtering.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{RevisionedSource, SourceClient, SourceRecord};
use crate::config::LegislatorsConfig;
use crate::error::FetchError;
use crate::fetch::{decode_or_empty, records_from_values, try_decode, Format, RateLimitedFetcher, Transport};
use crate::model::SourceTag;

const SOURCE: &str = "legislators_repo";

/// `id` keys that are join keys rather than enrichment payload.
const NON_ENRICHING_ID_KEYS: &[&str] = &["bioguide", "bioguide_previous"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegislatorFile {
    Current,
    Historical,
}

impl LegislatorFile {
    pub fn as_str(&self) -> &'static str {
        match self {
            LegislatorFile::Current => "current",
            LegislatorFile::Historical => "historical",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegislatorName {
    #[serde(default)]
    pub first: Option<String>,
    #[serde(default)]
    pub last: Option<String>,
    #[serde(default)]
    pub middle: Option<String>,
    #[serde(default)]
    pub suffix: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub official_full: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegislatorBio {
    /// ISO date string.
    #[serde(default)]
    pub birthday: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegislatorTerm {
    /// "sen" or "rep".
    #[serde(default, rename = "type")]
    pub term_type: Option<String>,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub party: Option<String>,
}

/// One legislator entry. `id` and `social` stay open maps so identifier
/// systems added upstream flow through without code changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegislatorRecord {
    #[serde(default)]
    pub id: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub name: LegislatorName,
    #[serde(default)]
    pub bio: LegislatorBio,
    #[serde(default)]
    pub terms: Vec<LegislatorTerm>,
    #[serde(default)]
    pub social: BTreeMap<String, serde_json::Value>,
}

impl LegislatorRecord {
    pub fn bioguide_id(&self) -> Option<&str> {
        self.id
            .get("bioguide")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Identifier map to enrich with. `fec` is always a list; nulls are dropped.
    pub fn external_ids(&self) -> BTreeMap<String, serde_json::Value> {
        self.id
            .iter()
            .filter(|(k, v)| !NON_ENRICHING_ID_KEYS.contains(&k.as_str()) && !v.is_null())
            .map(|(k, v)| {
                let v = match (k.as_str(), v) {
                    ("fec", serde_json::Value::String(s)) => serde_json::json!([s]),
                    _ => v.clone(),
                };
                (k.clone(), v)
            })
            .collect()
    }

    /// Platform → handle. Numeric `*_id` companions are not handles.
    pub fn social_handles(&self) -> BTreeMap<String, String> {
        self.social
            .iter()
            .filter(|(k, _)| !k.ends_with("_id"))
            .filter_map(|(k, v)| match v {
                serde_json::Value::String(s) if !s.trim().is_empty() => Some((k.clone(), s.trim().to_string())),
                serde_json::Value::Number(n) => Some((k.clone(), n.to_string())),
                _ => None,
            })
            .collect()
    }
}

impl SourceRecord for LegislatorRecord {
    fn source(&self) -> SourceTag {
        SourceTag::LegislatorsRepo
    }

    fn source_key(&self) -> Option<&str> {
        self.bioguide_id()
    }
}

#[derive(Debug, Deserialize)]
struct CommitRaw {
    sha: String,
}

pub struct LegislatorsClient {
    base_url: String,
    api_url: String,
    current_file: String,
    historical_file: String,
    bulk_timeout: Duration,
    fetcher: RateLimitedFetcher,
}

impl LegislatorsClient {
    pub fn new(cfg: &LegislatorsConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_url: cfg.api_url.trim_end_matches('/').to_string(),
            current_file: cfg.current_file.clone(),
            historical_file: cfg.historical_file.clone(),
            bulk_timeout: cfg.bulk_timeout(),
            fetcher: RateLimitedFetcher::new(SOURCE, transport, cfg.fetch_policy()),
        }
    }

    pub fn fetcher(&self) -> &RateLimitedFetcher {
        &self.fetcher
    }

    pub fn file_url(&self, file: LegislatorFile) -> String {
        let name = match file {
            LegislatorFile::Current => &self.current_file,
            LegislatorFile::Historical => &self.historical_file,
        };
        format!("{}/{}", self.base_url, name)
    }

    pub fn revision_url(&self) -> String {
        format!("{}/commits/main", self.api_url)
    }
}

#[async_trait]
impl SourceClient for LegislatorsClient {
    type Filter = LegislatorFile;
    type Record = LegislatorRecord;

    fn tag(&self) -> SourceTag {
        SourceTag::LegislatorsRepo
    }

    /// The dataset is one document, so any `max_pages >= 1` reads all of it.
    async fn fetch_all(
        &self,
        file: &LegislatorFile,
        max_pages: u32,
        cancel: &CancellationToken,
    ) -> Result<Vec<LegislatorRecord>, FetchError> {
        if max_pages == 0 {
            return Ok(Vec::new());
        }
        let url = self.file_url(*file);
        let body = self
            .fetcher
            .fetch_with_timeout(&url, self.bulk_timeout, cancel)
            .await?;
        let what = format!("{} legislators", file.as_str());
        let values: Vec<serde_json::Value> = decode_or_empty(Format::Yaml, &body, SOURCE, &what);
        let records: Vec<LegislatorRecord> = records_from_values(values, SOURCE, &what);
        info!(
            target: "sources",
            source = SOURCE,
            file = file.as_str(),
            records = records.len(),
            "legislator dataset fetched"
        );
        Ok(records)
    }

    async fn fetch_one(&self, bioguide_id: &str, cancel: &CancellationToken) -> Result<LegislatorRecord, FetchError> {
        self.fetch_all(&LegislatorFile::Current, 1, cancel)
            .await?
            .into_iter()
            .find(|r| r.bioguide_id() == Some(bioguide_id))
            .ok_or_else(|| FetchError::NotFound(format!("legislator {bioguide_id}")))
    }

    async fn is_available(&self) -> bool {
        self.fetcher.probe(&self.api_url, &CancellationToken::new()).await
    }
}

#[async_trait]
impl RevisionedSource for LegislatorsClient {
    async fn fetch_revision(&self, cancel: &CancellationToken) -> Result<String, FetchError> {
        let body = self.fetcher.fetch(&self.revision_url(), cancel).await?;
        let commit: CommitRaw = try_decode(Format::Json, &body, "latest commit")?;
        Ok(commit.sha)
    }
}
