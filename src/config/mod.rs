// src/config/mod.rs
//! Runtime configuration.
//!
//! Lookup order:
//! 1) $ENRICHMENT_CONFIG_PATH (must exist)
//! 2) config/enrichment.toml
//! 3) built-in defaults
//!
//! Env overrides are applied afterwards, then everything is sanitized.

pub mod schedule;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use crate::fetch::FetchPolicy;
pub use schedule::Schedule;

pub const ENV_PATH: &str = "ENRICHMENT_CONFIG_PATH";
pub const DEFAULT_PATH: &str = "config/enrichment.toml";

/// Upstream cap on the roster API's `limit` parameter.
pub const CONGRESS_PAGE_CAP: u32 = 250;
/// Upstream cap on the document API's `per_page` parameter.
pub const FEDERAL_REGISTER_PAGE_CAP: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub federal_register: FederalRegisterConfig,
    pub congress: CongressConfig,
    pub legislators: LegislatorsConfig,
    pub linker: LinkerConfig,
    pub state_path: PathBuf,
    pub snapshot_path: PathBuf,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            federal_register: FederalRegisterConfig::default(),
            congress: CongressConfig::default(),
            legislators: LegislatorsConfig::default(),
            linker: LinkerConfig::default(),
            state_path: PathBuf::from("state/sync_state.json"),
            snapshot_path: PathBuf::from("state/store.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncToggle {
    pub enabled: bool,
    pub schedule: Schedule,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FederalRegisterSync {
    pub enabled: bool,
    pub schedule: Schedule,
    pub page_size: u32,
    pub max_pages: u32,
    pub initial_backfill_days: u32,
}

impl Default for FederalRegisterSync {
    fn default() -> Self {
        Self {
            enabled: false,
            schedule: Schedule::daily(3, 0),
            page_size: 100,
            max_pages: 100,
            initial_backfill_days: 365,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FederalRegisterConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub retry_attempts: u32,
    pub rate_limit_ms: u64,
    /// Regulation document sync.
    pub sync: FederalRegisterSync,
    /// Agency (organization) import.
    pub agency_sync: SyncToggle,
}

impl Default for FederalRegisterConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.federalregister.gov/api/v1".into(),
            timeout_secs: 30,
            retry_attempts: 3,
            rate_limit_ms: 100,
            sync: FederalRegisterSync::default(),
            agency_sync: SyncToggle {
                enabled: false,
                schedule: Schedule::weekly(Weekday::Sun, 5, 0),
            },
        }
    }
}

impl FederalRegisterConfig {
    pub fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy {
            min_delay: Duration::from_millis(self.rate_limit_ms),
            max_attempts: self.retry_attempts,
            timeout: Duration::from_secs(self.timeout_secs),
            ..FetchPolicy::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CongressConfig {
    pub base_url: String,
    /// Literal key, or "ENV" to read `CONGRESS_API_KEY`.
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub retry_attempts: u32,
    pub rate_limit_ms: u64,
    pub hourly_quota: u32,
    pub page_limit: u32,
    pub max_pages: u32,
}

impl Default for CongressConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.congress.gov/v3".into(),
            api_key: None,
            timeout_secs: 30,
            retry_attempts: 3,
            rate_limit_ms: 750,
            hourly_quota: 5000,
            page_limit: CONGRESS_PAGE_CAP,
            max_pages: 20,
        }
    }
}

impl CongressConfig {
    pub fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy {
            min_delay: Duration::from_millis(self.rate_limit_ms),
            max_attempts: self.retry_attempts,
            timeout: Duration::from_secs(self.timeout_secs),
            hourly_quota: (self.hourly_quota > 0).then_some(self.hourly_quota),
            ..FetchPolicy::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegislatorsConfig {
    /// Raw dataset host.
    pub base_url: String,
    /// Revision host (commit metadata).
    pub api_url: String,
    pub current_file: String,
    pub historical_file: String,
    pub timeout_secs: u64,
    pub bulk_timeout_secs: u64,
    pub retry_attempts: u32,
    pub rate_limit_ms: u64,
    pub sync: SyncToggle,
}

impl Default for LegislatorsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://raw.githubusercontent.com/unitedstates/congress-legislators/main".into(),
            api_url: "https://api.github.com/repos/unitedstates/congress-legislators".into(),
            current_file: "legislators-current.yaml".into(),
            historical_file: "legislators-historical.yaml".into(),
            timeout_secs: 30,
            bulk_timeout_secs: 300,
            retry_attempts: 3,
            rate_limit_ms: 100,
            sync: SyncToggle {
                enabled: false,
                schedule: Schedule::weekly(Weekday::Sun, 4, 0),
            },
        }
    }
}

impl Default for SyncToggle {
    fn default() -> Self {
        Self {
            enabled: false,
            schedule: Schedule::daily(3, 0),
        }
    }
}

impl LegislatorsConfig {
    pub fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy {
            min_delay: Duration::from_millis(self.rate_limit_ms),
            max_attempts: self.retry_attempts,
            timeout: Duration::from_secs(self.timeout_secs),
            ..FetchPolicy::default()
        }
    }

    pub fn bulk_timeout(&self) -> Duration {
        Duration::from_secs(self.bulk_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkerConfig {
    pub fuzzy_threshold: f64,
    pub suggestion_threshold: f64,
    pub max_suggestions: usize,
    /// Fuzzy runner-up this close to the best candidate makes the link ambiguous.
    pub ambiguity_margin: f64,
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.85,
            suggestion_threshold: 0.4,
            max_suggestions: 3,
            ambiguity_margin: 0.01,
        }
    }
}

impl EnrichmentConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&data).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: EnrichmentConfig = toml::from_str(s)?;
        cfg.finalize()
    }

    pub fn load_default() -> Result<Self> {
        if let Ok(p) = env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                bail!("{ENV_PATH} points to non-existent path {}", pb.display());
            }
            return Self::load_from_file(&pb);
        }
        let default = PathBuf::from(DEFAULT_PATH);
        if default.exists() {
            return Self::load_from_file(&default);
        }
        Self::default().finalize()
    }

    fn finalize(mut self) -> Result<Self> {
        self.apply_env_overrides();

        if let Some(key) = self.congress.api_key.as_deref() {
            if key.trim().eq_ignore_ascii_case("env") {
                let resolved = env::var("CONGRESS_API_KEY")
                    .map_err(|_| anyhow!("Missing CONGRESS_API_KEY env var"))?;
                self.congress.api_key = Some(resolved);
            }
        }
        if self
            .congress
            .api_key
            .as_deref()
            .is_some_and(|k| k.trim().is_empty())
        {
            self.congress.api_key = None;
        }

        self.sanitize();
        Ok(self)
    }

    fn apply_env_overrides(&mut self) {
        let var = |k: &str| env::var(k).ok().filter(|v| !v.trim().is_empty());
        if let Some(v) = var("FEDERAL_REGISTER_BASE_URL") {
            self.federal_register.base_url = v;
        }
        if let Some(v) = var("CONGRESS_BASE_URL") {
            self.congress.base_url = v;
        }
        if let Some(v) = var("LEGISLATORS_BASE_URL") {
            self.legislators.base_url = v;
        }
        if let Some(v) = var("LEGISLATORS_API_URL") {
            self.legislators.api_url = v;
        }
        if let Some(v) = var("SYNC_ENABLED") {
            let on = matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
            self.federal_register.sync.enabled = on;
            self.federal_register.agency_sync.enabled = on;
            self.legislators.sync.enabled = on;
        }
    }

    fn sanitize(&mut self) {
        for url in [
            &mut self.federal_register.base_url,
            &mut self.congress.base_url,
            &mut self.legislators.base_url,
            &mut self.legislators.api_url,
        ] {
            let trimmed = url.trim().trim_end_matches('/').to_string();
            *url = trimmed;
        }

        let fr = &mut self.federal_register;
        fr.retry_attempts = fr.retry_attempts.max(1);
        fr.sync.max_pages = fr.sync.max_pages.max(1);
        fr.sync.page_size = fr.sync.page_size.clamp(1, FEDERAL_REGISTER_PAGE_CAP);

        let c = &mut self.congress;
        c.retry_attempts = c.retry_attempts.max(1);
        c.max_pages = c.max_pages.max(1);
        c.page_limit = c.page_limit.clamp(1, CONGRESS_PAGE_CAP);

        self.legislators.retry_attempts = self.legislators.retry_attempts.max(1);

        let l = &mut self.linker;
        let d = LinkerConfig::default();
        if !(0.0..=1.0).contains(&l.fuzzy_threshold) {
            l.fuzzy_threshold = d.fuzzy_threshold;
        }
        if !(0.0..=1.0).contains(&l.suggestion_threshold) {
            l.suggestion_threshold = d.suggestion_threshold;
        }
        if !(0.0..=1.0).contains(&l.ambiguity_margin) {
            l.ambiguity_margin = d.ambiguity_margin;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = EnrichmentConfig::from_toml_str(
            r#"
            [federal_register.sync]
            enabled = true
            max_pages = 0

            [legislators]
            base_url = "http://localhost:9000/data/"
            "#,
        )
        .unwrap();
        assert!(cfg.federal_register.sync.enabled);
        assert_eq!(cfg.federal_register.sync.max_pages, 1);
        assert_eq!(cfg.federal_register.sync.page_size, 100);
        assert_eq!(cfg.legislators.base_url, "http://localhost:9000/data");
        assert_eq!(cfg.legislators.sync.schedule, Schedule::weekly(Weekday::Sun, 4, 0));
        assert_eq!(cfg.congress.page_limit, 250);
    }

    #[test]
    fn out_of_range_values_are_sanitized() {
        let cfg = EnrichmentConfig::from_toml_str(
            r#"
            [congress]
            page_limit = 1000
            retry_attempts = 0

            [linker]
            fuzzy_threshold = 3.0
            "#,
        )
        .unwrap();
        assert_eq!(cfg.congress.page_limit, CONGRESS_PAGE_CAP);
        assert_eq!(cfg.congress.retry_attempts, 1);
        assert_eq!(cfg.linker.fuzzy_threshold, 0.85);
    }

    #[test]
    fn congress_policy_carries_quota() {
        let p = CongressConfig::default().fetch_policy();
        assert_eq!(p.hourly_quota, Some(5000));
        assert_eq!(p.min_delay, Duration::from_millis(750));
        assert_eq!(p.initial_backoff, Duration::from_secs(1));
    }

    #[test]
    fn bad_schedule_is_a_parse_error() {
        let err = EnrichmentConfig::from_toml_str(
            r#"
            [legislators.sync]
            schedule = "whenever"
            "#,
        );
        assert!(err.is_err());
    }
}
