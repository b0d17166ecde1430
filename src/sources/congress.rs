// src/sources/congress.rs
//! Legislature roster API client.
//!
//! Offset/limit pagination (`pagination.count` is the total), `api_key` as a
//! query parameter, hourly request quota enforced by the fetcher.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use urlencoding::encode;

use super::{collect_pages, Page, SourceClient, SourceRecord};
use crate::config::{CongressConfig, CONGRESS_PAGE_CAP};
use crate::error::FetchError;
use crate::fetch::{decode_or_empty, records_from_values, try_decode, Format, RateLimitedFetcher, Transport};
use crate::model::{Chamber, SourceTag};

const SOURCE: &str = "congress";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberTerm {
    #[serde(default)]
    pub chamber: Option<String>,
    #[serde(default)]
    pub start_year: Option<i32>,
    #[serde(default)]
    pub end_year: Option<i32>,
}

/// List responses wrap terms in `{"item": [...]}`; detail responses do not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MemberTerms {
    Wrapped { item: Vec<MemberTerm> },
    List(Vec<MemberTerm>),
}

impl Default for MemberTerms {
    fn default() -> Self {
        MemberTerms::List(Vec::new())
    }
}

impl MemberTerms {
    pub fn items(&self) -> &[MemberTerm] {
        match self {
            MemberTerms::Wrapped { item } => item,
            MemberTerms::List(items) => items,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyHistory {
    #[serde(default)]
    pub party_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Depiction {
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CongressMember {
    pub bioguide_id: String,
    /// "Last, First Middle" in list responses.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub middle_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub party_name: Option<String>,
    #[serde(default)]
    pub party_history: Vec<PartyHistory>,
    /// Full state name ("New York").
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub terms: MemberTerms,
    /// String or number upstream.
    #[serde(default)]
    pub birth_year: Option<serde_json::Value>,
    #[serde(default)]
    pub depiction: Option<Depiction>,
    #[serde(default)]
    pub gender: Option<String>,
}

impl SourceRecord for CongressMember {
    fn source(&self) -> SourceTag {
        SourceTag::Congress
    }

    fn source_key(&self) -> Option<&str> {
        Some(self.bioguide_id.as_str())
    }
}

/// Split of a roster name into (first, middle, last).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedName {
    pub first: Option<String>,
    pub middle: Option<String>,
    pub last: Option<String>,
}

/// "Last, First Middle" → parts. Without a comma the whole string is the last
/// name.
pub fn parse_inverted_name(full: &str) -> ParsedName {
    let full = full.trim();
    if full.is_empty() {
        return ParsedName::default();
    }
    let non_empty = |s: &str| Some(s.trim().to_string()).filter(|s| !s.is_empty());
    match full.split_once(',') {
        Some((last, rest)) if !last.trim().is_empty() => {
            let mut parts = rest.trim().splitn(2, char::is_whitespace);
            ParsedName {
                last: non_empty(last),
                first: parts.next().and_then(non_empty),
                middle: parts.next().and_then(non_empty),
            }
        }
        _ => ParsedName {
            last: non_empty(full),
            ..ParsedName::default()
        },
    }
}

impl CongressMember {
    pub fn parsed_name(&self) -> ParsedName {
        let mut parsed = self.name.as_deref().map(parse_inverted_name).unwrap_or_default();
        let pick = |explicit: &Option<String>, fallback: Option<String>| {
            explicit
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .or(fallback)
        };
        parsed.first = pick(&self.first_name, parsed.first);
        parsed.middle = pick(&self.middle_name, parsed.middle);
        parsed.last = pick(&self.last_name, parsed.last);
        parsed
    }

    pub fn party(&self) -> Option<String> {
        self.party_name
            .clone()
            .or_else(|| self.party_history.iter().rev().find_map(|p| p.party_name.clone()))
            .filter(|p| !p.trim().is_empty())
    }

    /// Chamber of the most recent term.
    pub fn latest_chamber(&self) -> Option<Chamber> {
        self.terms
            .items()
            .last()
            .and_then(|t| t.chamber.as_deref())
            .and_then(Chamber::parse)
    }

    pub fn birth_year(&self) -> Option<i32> {
        match self.birth_year.as_ref()? {
            serde_json::Value::Number(n) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn image_url(&self) -> Option<String> {
        self.depiction.as_ref().and_then(|d| d.image_url.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberFilter {
    pub current_only: bool,
}

impl Default for MemberFilter {
    fn default() -> Self {
        Self { current_only: true }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Pagination {
    #[serde(default)]
    count: u64,
}

#[derive(Debug, Default, Deserialize)]
struct MemberListRaw {
    #[serde(default)]
    members: Vec<serde_json::Value>,
    #[serde(default)]
    pagination: Pagination,
}

#[derive(Debug, Deserialize)]
struct MemberDetailRaw {
    member: Option<CongressMember>,
}

pub struct CongressClient {
    base_url: String,
    api_key: Option<String>,
    page_limit: u32,
    fetcher: RateLimitedFetcher,
}

impl CongressClient {
    pub fn new(cfg: &CongressConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            page_limit: cfg.page_limit.clamp(1, CONGRESS_PAGE_CAP),
            fetcher: RateLimitedFetcher::new(SOURCE, transport, cfg.fetch_policy()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn fetcher(&self) -> &RateLimitedFetcher {
        &self.fetcher
    }

    fn key_param(&self) -> String {
        self.api_key
            .as_deref()
            .map(|k| format!("&api_key={}", encode(k)))
            .unwrap_or_default()
    }

    async fn fetch_members_page(
        &self,
        filter: &MemberFilter,
        page: u32,
        cancel: &CancellationToken,
    ) -> Result<Page<CongressMember>, FetchError> {
        let offset = u64::from(page - 1) * u64::from(self.page_limit);
        let url = format!(
            "{}/member?format=json&limit={}&offset={}&currentMember={}{}",
            self.base_url,
            self.page_limit,
            offset,
            filter.current_only,
            self.key_param()
        );
        let body = self.fetcher.fetch(&url, cancel).await?;
        let what = format!("members offset {offset}");
        let raw: MemberListRaw = decode_or_empty(Format::Json, &body, SOURCE, &what);
        let seen = offset + raw.members.len() as u64;
        Ok(Page {
            has_more: seen < raw.pagination.count,
            records: records_from_values(raw.members, SOURCE, &what),
        })
    }
}

#[async_trait]
impl SourceClient for CongressClient {
    type Filter = MemberFilter;
    type Record = CongressMember;

    fn tag(&self) -> SourceTag {
        SourceTag::Congress
    }

    async fn fetch_all(
        &self,
        filter: &MemberFilter,
        max_pages: u32,
        cancel: &CancellationToken,
    ) -> Result<Vec<CongressMember>, FetchError> {
        let members = collect_pages(SOURCE, max_pages, cancel, |page| {
            self.fetch_members_page(filter, page, cancel)
        })
        .await?;
        info!(target: "sources", source = SOURCE, members = members.len(), "members fetched");
        Ok(members)
    }

    async fn fetch_one(&self, bioguide_id: &str, cancel: &CancellationToken) -> Result<CongressMember, FetchError> {
        let url = format!(
            "{}/member/{}?format=json{}",
            self.base_url,
            encode(bioguide_id),
            self.key_param()
        );
        let body = self.fetcher.fetch(&url, cancel).await?;
        let raw: MemberDetailRaw = try_decode(Format::Json, &body, &format!("member {bioguide_id}"))?;
        raw.member
            .ok_or_else(|| FetchError::NotFound(format!("member {bioguide_id}")))
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/member?format=json&limit=1{}", self.base_url, self.key_param());
        self.fetcher.probe(&url, &CancellationToken::new()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_inverted_names() {
        let p = parse_inverted_name("Schumer, Charles E.");
        assert_eq!(p.last.as_deref(), Some("Schumer"));
        assert_eq!(p.first.as_deref(), Some("Charles"));
        assert_eq!(p.middle.as_deref(), Some("E."));

        let p = parse_inverted_name("Van Hollen, Chris");
        assert_eq!(p.last.as_deref(), Some("Van Hollen"));
        assert_eq!(p.middle, None);

        let p = parse_inverted_name("Cher");
        assert_eq!(p.last.as_deref(), Some("Cher"));
        assert_eq!(p.first, None);
    }

    #[test]
    fn key_is_escaped_in_the_query() {
        let cfg = CongressConfig {
            api_key: Some("a+b/c d".into()),
            ..CongressConfig::default()
        };
        let client = CongressClient::new(&cfg, Arc::new(crate::fetch::mock::ScriptedTransport::new()));
        assert_eq!(client.key_param(), "&api_key=a%2Bb%2Fc%20d");

        let keyless = CongressClient::new(&CongressConfig::default(), Arc::new(crate::fetch::mock::ScriptedTransport::new()));
        assert_eq!(keyless.key_param(), "");
    }

    #[test]
    fn list_and_detail_shapes_decode() {
        let list: CongressMember = serde_json::from_value(json!({
            "bioguideId": "S000148",
            "name": "Schumer, Charles E.",
            "partyName": "Democratic",
            "state": "New York",
            "terms": {"item": [
                {"chamber": "House of Representatives", "startYear": 1981, "endYear": 1999},
                {"chamber": "Senate", "startYear": 1999}
            ]},
            "depiction": {"imageUrl": "https://example.test/s.jpg"}
        }))
        .unwrap();
        assert_eq!(list.latest_chamber(), Some(Chamber::Senate));
        assert_eq!(list.party().as_deref(), Some("Democratic"));
        assert_eq!(list.image_url().as_deref(), Some("https://example.test/s.jpg"));

        let detail: CongressMember = serde_json::from_value(json!({
            "bioguideId": "P000197",
            "firstName": "Nancy",
            "lastName": "Pelosi",
            "partyHistory": [{"partyName": "Democratic"}],
            "terms": [{"chamber": "House of Representatives"}],
            "birthYear": "1940"
        }))
        .unwrap();
        let name = detail.parsed_name();
        assert_eq!(name.first.as_deref(), Some("Nancy"));
        assert_eq!(name.last.as_deref(), Some("Pelosi"));
        assert_eq!(detail.party().as_deref(), Some("Democratic"));
        assert_eq!(detail.latest_chamber(), Some(Chamber::House));
        assert_eq!(detail.birth_year(), Some(1940));
    }
}
