// src/fetch/mod.rs
//! Outbound HTTP plumbing shared by every source client.
//!
//! - `Transport`: one raw request, no policy. `ReqwestTransport` in production,
//!   `mock::ScriptedTransport` in tests.
//! - `RateLimitedFetcher`: pacing + timeout + bounded retry with backoff on top
//!   of a transport. Each client owns its own fetcher.
//! - `decode`: the single decode helper every client uses.

pub mod decode;
pub mod mock;
pub mod rate_limit;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::FetchError;

pub use decode::{decode_or_empty, records_from_values, try_decode, Format};
pub use rate_limit::{FetchPolicy, RateLimitedFetcher};

const USER_AGENT: &str = "civic-enrichment/0.1";

/// Raw response: status plus body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Single GET. Non-2xx statuses are returned, not raised; only transport
    /// failures and timeouts are errors.
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, FetchError>;

    /// Single HEAD; returns the status code.
    async fn head(&self, url: &str, timeout: Duration) -> Result<u16, FetchError>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client })
    }

    fn map_err(err: reqwest::Error, timeout: Duration) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(timeout)
        } else {
            FetchError::from(err)
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, FetchError> {
        let resp = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Self::map_err(e, timeout))?;
        let status = resp.status().as_u16();
        let body = resp
            .bytes()
            .await
            .map_err(|e| Self::map_err(e, timeout))?;
        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }

    async fn head(&self, url: &str, timeout: Duration) -> Result<u16, FetchError> {
        let resp = self
            .client
            .head(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Self::map_err(e, timeout))?;
        Ok(resp.status().as_u16())
    }
}
