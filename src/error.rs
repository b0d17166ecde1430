// src/error.rs
//! Error taxonomy for the enrichment pipeline.
//!
//! Per-record problems are counted by the orchestrators and never surface here;
//! these types only describe what can fail a single request, a decode, a registry
//! load, a store call, or one source's portion of a sync run.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// Failure of an outbound request as seen by callers of the fetcher.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// One failed attempt (transport error, timeout, 408/429/5xx). Retried by the
    /// fetcher; only escapes when a caller uses the raw transport.
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Retries exhausted or hourly quota spent.
    #[error("source unavailable after {attempts} attempt(s): {last}")]
    Unavailable { attempts: u32, last: String },

    /// Permanent client error (4xx other than 404/408/429). Not retried.
    #[error("request rejected with HTTP {status}")]
    Rejected { status: u16 },

    #[error("not found: {0}")]
    NotFound(String),

    /// A single-record response arrived but could not be decoded.
    #[error(transparent)]
    Malformed(#[from] DecodeError),

    #[error("cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Transient(_) | FetchError::Timeout(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Transient(err.to_string())
    }
}

/// Malformed page or record. Produced only by `fetch::decode::try_decode`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("failed to decode {what}: {message}")]
pub struct DecodeError {
    pub what: String,
    pub message: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("organization {id} references missing parent {parent_id}")]
    MissingParent { id: Uuid, parent_id: Uuid },

    #[error("organization {id} has level {level}, expected {expected} under its parent")]
    LevelMismatch { id: Uuid, level: u32, expected: u32 },

    #[error("root organization {id} has level {level}, expected 1")]
    RootLevel { id: Uuid, level: u32 },

    #[error("duplicate organization id {0}")]
    DuplicateId(Uuid),

    #[error("organization {id} sits on a parent cycle")]
    Cycle { id: Uuid },

    /// The registry could not be loaded at all; fatal for a linking batch.
    #[error("organization registry unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("snapshot I/O error: {0}")]
    Snapshot(String),
}

/// Failures that abort one source's portion of a run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("cancelled")]
    Cancelled,

    #[error("a {0} sync is already running")]
    AlreadyRunning(&'static str),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),
}
