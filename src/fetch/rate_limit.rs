// src/fetch/rate_limit.rs
//! Paced, retrying fetcher.
//!
//! - Pacing: consecutive attempts on one fetcher are at least `min_delay` apart,
//!   measured from the end of the previous attempt. The watermark moves on every
//!   attempt, failed ones included.
//! - Retry: transient failures are retried up to `max_attempts` with exponential
//!   backoff (initial 1s, doubling). Exhaustion yields `Unavailable`.
//! - Quota: optional hourly request budget; when spent, calls fail fast with
//!   `Unavailable` instead of sleeping out the window.
//! - Cancellation is observed while waiting for the lock, while pacing, during
//!   the request and during backoff.
//!
//! Pacing state sits behind an async mutex held for the whole attempt, so
//! concurrent callers sharing one fetcher are serialized.

use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use super::{HttpResponse, Transport};
use crate::error::FetchError;

const QUOTA_WINDOW: Duration = Duration::from_secs(3600);

static RE_SECRET: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(api_key=)[^&]*").unwrap());

/// URL as it may appear in logs: credentials in the query string are masked.
pub fn redact(url: &str) -> Cow<'_, str> {
    RE_SECRET.replace_all(url, "${1}***")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPolicy {
    pub min_delay: Duration,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub timeout: Duration,
    pub hourly_quota: Option<u32>,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(100),
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            timeout: Duration::from_secs(30),
            hourly_quota: None,
        }
    }
}

#[derive(Debug)]
struct PacerState {
    last_request: Option<Instant>,
    window_start: Instant,
    window_count: u32,
}

pub struct RateLimitedFetcher {
    source: &'static str,
    transport: Arc<dyn Transport>,
    policy: FetchPolicy,
    state: Mutex<PacerState>,
    requests: AtomicU64,
}

impl RateLimitedFetcher {
    pub fn new(source: &'static str, transport: Arc<dyn Transport>, policy: FetchPolicy) -> Self {
        Self {
            source,
            transport,
            policy,
            state: Mutex::new(PacerState {
                last_request: None,
                window_start: Instant::now(),
                window_count: 0,
            }),
            requests: AtomicU64::new(0),
        }
    }

    pub fn source(&self) -> &'static str {
        self.source
    }

    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    /// Attempts issued so far (GET and HEAD, successful or not).
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub async fn fetch(&self, url: &str, cancel: &CancellationToken) -> Result<Vec<u8>, FetchError> {
        self.fetch_with_timeout(url, self.policy.timeout, cancel)
            .await
    }

    /// Like `fetch`, with a per-call timeout (bulk transfers need longer).
    pub async fn fetch_with_timeout(
        &self,
        url: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, FetchError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut backoff = self.policy.initial_backoff;
        let mut last = String::new();

        for attempt in 1..=max_attempts {
            match self.attempt(url, timeout, cancel).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_retryable() => {
                    counter!("fetch_failures_total", "source" => self.source).increment(1);
                    warn!(
                        target: "fetch",
                        source = self.source,
                        url = %redact(url),
                        attempt,
                        max_attempts,
                        error = %e,
                        "request failed"
                    );
                    last = e.to_string();
                    if attempt < max_attempts {
                        counter!("fetch_retries_total", "source" => self.source).increment(1);
                        sleep_or_cancel(backoff, cancel).await?;
                        backoff = backoff.saturating_mul(2);
                    }
                }
                Err(e) => return Err(e),
            }
        }

        error!(
            target: "fetch",
            source = self.source,
            url = %redact(url),
            attempts = max_attempts,
            "giving up after retries"
        );
        Err(FetchError::Unavailable {
            attempts: max_attempts,
            last,
        })
    }

    /// Lightweight existence probe (HEAD). Honors pacing; any failure is `false`.
    pub async fn probe(&self, url: &str, cancel: &CancellationToken) -> bool {
        let mut state = match self.pace(cancel).await {
            Ok(s) => s,
            Err(e) => {
                debug!(target: "fetch", source = self.source, error = %e, "probe skipped");
                return false;
            }
        };
        self.requests.fetch_add(1, Ordering::Relaxed);
        counter!("fetch_requests_total", "source" => self.source).increment(1);

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            r = self.transport.head(url, self.policy.timeout) => r,
        };
        state.last_request = Some(Instant::now());
        drop(state);

        match result {
            Ok(status) if (200..400).contains(&status) => true,
            Ok(status) => {
                warn!(target: "fetch", source = self.source, url = %redact(url), status, "probe returned non-success");
                false
            }
            Err(e) => {
                warn!(target: "fetch", source = self.source, url = %redact(url), error = %e, "probe failed");
                false
            }
        }
    }

    async fn attempt(
        &self,
        url: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, FetchError> {
        let mut state = self.pace(cancel).await?;
        self.requests.fetch_add(1, Ordering::Relaxed);
        counter!("fetch_requests_total", "source" => self.source).increment(1);

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            r = self.transport.get(url, timeout) => r,
        };
        state.last_request = Some(Instant::now());
        drop(state);

        classify(result?, url)
    }

    /// Takes the pacing lock, charges the quota and waits out `min_delay`.
    /// The returned guard must be held until the request finishes.
    async fn pace(&self, cancel: &CancellationToken) -> Result<MutexGuard<'_, PacerState>, FetchError> {
        let mut state = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            s = self.state.lock() => s,
        };

        if let Some(quota) = self.policy.hourly_quota {
            let now = Instant::now();
            if now.duration_since(state.window_start) >= QUOTA_WINDOW {
                state.window_start = now;
                state.window_count = 0;
            }
            if state.window_count >= quota {
                warn!(target: "fetch", source = self.source, quota, "hourly quota exhausted");
                return Err(FetchError::Unavailable {
                    attempts: 0,
                    last: format!("hourly quota of {quota} requests exhausted"),
                });
            }
            state.window_count += 1;
        }

        if let Some(last) = state.last_request {
            let ready_at = last + self.policy.min_delay;
            if ready_at > Instant::now() {
                trace!(target: "fetch", source = self.source, "pacing");
                sleep_until_or_cancel(ready_at, cancel).await?;
            }
        }
        Ok(state)
    }
}

fn classify(resp: HttpResponse, url: &str) -> Result<Vec<u8>, FetchError> {
    match resp.status {
        200..=299 => Ok(resp.body),
        404 => Err(FetchError::NotFound(redact(url).into_owned())),
        408 | 429 => Err(FetchError::Transient(format!("HTTP {}", resp.status))),
        500..=599 => Err(FetchError::Transient(format!("HTTP {}", resp.status))),
        400..=499 => Err(FetchError::Rejected {
            status: resp.status,
        }),
        other => Err(FetchError::Transient(format!("unexpected HTTP {other}"))),
    }
}

pub(crate) async fn sleep_or_cancel(d: Duration, cancel: &CancellationToken) -> Result<(), FetchError> {
    sleep_until_or_cancel(Instant::now() + d, cancel).await
}

async fn sleep_until_or_cancel(deadline: Instant, cancel: &CancellationToken) -> Result<(), FetchError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FetchError::Cancelled),
        _ = tokio::time::sleep_until(deadline) => Ok(()),
    }
}
