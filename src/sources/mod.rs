// src/sources/mod.rs
//! External source clients.
//!
//! Each client owns a `RateLimitedFetcher` and decodes into source-specific
//! records. Pagination is strictly sequential within one client.

pub mod congress;
pub mod federal_register;
pub mod legislators;
pub mod query;

use async_trait::async_trait;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::FetchError;
use crate::model::SourceTag;

pub use congress::{CongressClient, CongressMember, MemberFilter};
pub use federal_register::{FederalRegisterAgency, FederalRegisterClient, FederalRegisterDocument};
pub use legislators::{LegislatorFile, LegislatorRecord, LegislatorsClient};
pub use query::{build_query_string, DocumentQuery};

/// Transient upstream representation of an organization, document or person.
pub trait SourceRecord {
    fn source(&self) -> SourceTag;
    /// Source-native stable key (agency slug, document number, bioguide id).
    fn source_key(&self) -> Option<&str>;
}

#[async_trait]
pub trait SourceClient: Send + Sync {
    type Filter: Send + Sync;
    type Record: SourceRecord + Send;

    fn tag(&self) -> SourceTag;

    /// Every record matching `filter`, reading at most `max_pages` pages.
    async fn fetch_all(
        &self,
        filter: &Self::Filter,
        max_pages: u32,
        cancel: &CancellationToken,
    ) -> Result<Vec<Self::Record>, FetchError>;

    /// One record by source key; `FetchError::NotFound` when absent upstream.
    async fn fetch_one(&self, key: &str, cancel: &CancellationToken) -> Result<Self::Record, FetchError>;

    /// Lightweight probe. Never errors.
    async fn is_available(&self) -> bool;
}

/// A source whose bulk dataset carries a revision marker.
#[async_trait]
pub trait RevisionedSource: SourceClient {
    async fn fetch_revision(&self, cancel: &CancellationToken) -> Result<String, FetchError>;
}

/// One decoded page.
#[derive(Debug)]
pub struct Page<R> {
    pub records: Vec<R>,
    /// Upstream says there is more after this page.
    pub has_more: bool,
}

impl<R> Default for Page<R> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            has_more: false,
        }
    }
}

/// Drives pages `1..=max_pages` through `fetch_page`.
///
/// Stops on an empty page, when upstream reports no more pages, or at the cap.
/// A failed first page fails the fetch; a later failure stops pagination and
/// keeps what was collected. Cancellation always fails.
pub(crate) async fn collect_pages<R, F, Fut>(
    source: &'static str,
    max_pages: u32,
    cancel: &CancellationToken,
    mut fetch_page: F,
) -> Result<Vec<R>, FetchError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Page<R>, FetchError>>,
{
    let mut out = Vec::new();
    for page in 1..=max_pages {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        match fetch_page(page).await {
            Ok(p) => {
                let n = p.records.len();
                out.extend(p.records);
                debug!(target: "sources", source, page, records = n, total = out.len(), "page fetched");
                if n == 0 || !p.has_more {
                    return Ok(out);
                }
                if page == max_pages {
                    info!(target: "sources", source, max_pages, "page cap reached; more pages upstream");
                }
            }
            Err(FetchError::Cancelled) => return Err(FetchError::Cancelled),
            Err(e) if page == 1 => return Err(e),
            Err(e) => {
                warn!(
                    target: "sources",
                    source,
                    page,
                    error = %e,
                    kept = out.len(),
                    "page failed; keeping partial results"
                );
                return Ok(out);
            }
        }
    }
    Ok(out)
}
