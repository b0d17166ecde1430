// src/merge.rs
//! Additive-only merge of external data into local person records.
//!
//! Rules:
//! - a key already set locally is never overwritten, whatever the incoming value
//! - a key absent (or vacant) locally and present incoming is added
//! - only fields on the policy's `always_refresh` list are ever updated; the
//!   list is empty by default
//! - every `apply` restamps enrichment source, version and timestamp, even
//!   when nothing was added
//!
//! Together these make `apply(compute_diff(..))` idempotent.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

use crate::model::keyed_map::Vacancy;
use crate::model::{ExternalIdKey, Person, ScalarField, SocialPlatform, SourceTag};
use crate::sources::LegislatorRecord;

/// What an external source knows about one person.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersonEnrichment {
    pub bioguide_id: String,
    pub external_ids: BTreeMap<ExternalIdKey, Value>,
    pub social_media: BTreeMap<SocialPlatform, String>,
    pub scalars: BTreeMap<ScalarField, String>,
}

impl PersonEnrichment {
    /// `None` when the record carries no bioguide id.
    pub fn from_legislator(record: &LegislatorRecord) -> Option<Self> {
        let bioguide_id = record.bioguide_id()?.to_string();
        let external_ids = record
            .external_ids()
            .into_iter()
            .map(|(k, v)| (ExternalIdKey::from(k), v))
            .collect();
        let social_media = record
            .social_handles()
            .into_iter()
            .map(|(k, v)| (SocialPlatform::from(k), v))
            .collect();

        let mut scalars = BTreeMap::new();
        let name = &record.name;
        let bio = &record.bio;
        for (field, value) in [
            (ScalarField::MiddleName, &name.middle),
            (ScalarField::Suffix, &name.suffix),
            (ScalarField::Nickname, &name.nickname),
            (ScalarField::Gender, &bio.gender),
            (ScalarField::BirthDate, &bio.birthday),
        ] {
            if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                scalars.insert(field, v.to_string());
            }
        }

        Some(Self {
            bioguide_id,
            external_ids,
            social_media,
            scalars,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldPath {
    ExternalId(ExternalIdKey),
    SocialMedia(SocialPlatform),
    Scalar(ScalarField),
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldPath::ExternalId(k) => write!(f, "external_ids.{k}"),
            FieldPath::SocialMedia(p) => write!(f, "social_media.{p}"),
            FieldPath::Scalar(s) => f.write_str(s.as_str()),
        }
    }
}

impl Serialize for FieldPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    pub path: FieldPath,
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergeDiff {
    pub fields_to_add: Vec<FieldChange>,
    pub fields_to_update: Vec<FieldChange>,
    /// Set locally with a different incoming value; left alone.
    pub skipped: Vec<FieldPath>,
}

impl MergeDiff {
    pub fn is_empty(&self) -> bool {
        self.fields_to_add.is_empty() && self.fields_to_update.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergePolicy {
    pub always_refresh: BTreeSet<FieldPath>,
}

/// Provenance written on every apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentStamp {
    pub source: SourceTag,
    /// Upstream revision (commit hash) the incoming data came from.
    pub version: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct EnrichmentMergeEngine {
    policy: MergePolicy,
}

impl EnrichmentMergeEngine {
    pub fn new(policy: MergePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &MergePolicy {
        &self.policy
    }

    pub fn compute_diff(&self, local: &Person, incoming: &PersonEnrichment) -> MergeDiff {
        let mut diff = MergeDiff::default();

        for (key, value) in &incoming.external_ids {
            self.classify(
                &mut diff,
                FieldPath::ExternalId(key.clone()),
                local.external_ids.get(key).filter(|v| !v.is_vacant()).cloned(),
                value.clone(),
            );
        }
        for (platform, handle) in &incoming.social_media {
            self.classify(
                &mut diff,
                FieldPath::SocialMedia(platform.clone()),
                local
                    .social_media
                    .get(platform)
                    .filter(|v| !v.is_vacant())
                    .map(|v| Value::String(v.clone())),
                Value::String(handle.clone()),
            );
        }
        for (field, value) in &incoming.scalars {
            let Some(value) = field.canonical(value) else {
                debug!(target: "merge", bioguide_id = %incoming.bioguide_id, %field, %value, "ignoring unusable value");
                continue;
            };
            self.classify(
                &mut diff,
                FieldPath::Scalar(*field),
                local.scalar(*field).map(Value::String),
                Value::String(value),
            );
        }
        diff
    }

    fn classify(&self, diff: &mut MergeDiff, path: FieldPath, local: Option<Value>, incoming: Value) {
        if incoming.is_vacant() {
            return;
        }
        match local {
            None => diff.fields_to_add.push(FieldChange {
                path,
                value: incoming,
                previous: None,
            }),
            Some(current) if current == incoming => {}
            Some(current) if self.policy.always_refresh.contains(&path) => {
                diff.fields_to_update.push(FieldChange {
                    path,
                    value: incoming,
                    previous: Some(current),
                })
            }
            Some(_) => diff.skipped.push(path),
        }
    }

    /// Applies `diff` and restamps provenance.
    pub fn apply(&self, mut local: Person, diff: &MergeDiff, stamp: &EnrichmentStamp) -> Person {
        let mut added = 0usize;
        for change in &diff.fields_to_add {
            if add_field(&mut local, change) {
                added += 1;
            }
        }
        let mut updated = 0usize;
        for change in diff
            .fields_to_update
            .iter()
            .filter(|c| self.policy.always_refresh.contains(&c.path))
        {
            overwrite_field(&mut local, change);
            updated += 1;
        }

        local.enrichment_source = Some(stamp.source);
        local.enrichment_version = Some(stamp.version.clone());
        local.last_enriched_at = Some(stamp.at);

        debug!(
            target: "merge",
            bioguide_id = %local.bioguide_id,
            added,
            updated,
            skipped = diff.skipped.len(),
            "enrichment applied"
        );
        local
    }
}

fn as_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn add_field(local: &mut Person, change: &FieldChange) -> bool {
    match &change.path {
        FieldPath::ExternalId(k) => local.external_ids.insert_if_absent(k.clone(), change.value.clone()),
        FieldPath::SocialMedia(p) => local.social_media.insert_if_absent(p.clone(), as_text(&change.value)),
        FieldPath::Scalar(f) => {
            if local.scalar(*f).is_some() {
                return false;
            }
            local.set_scalar(*f, &as_text(&change.value));
            local.scalar(*f).is_some()
        }
    }
}

fn overwrite_field(local: &mut Person, change: &FieldChange) {
    match &change.path {
        FieldPath::ExternalId(k) => {
            local.external_ids.overwrite(k.clone(), change.value.clone());
        }
        FieldPath::SocialMedia(p) => {
            local.social_media.overwrite(p.clone(), as_text(&change.value));
        }
        FieldPath::Scalar(f) => local.set_scalar(*f, &as_text(&change.value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stamp(v: &str) -> EnrichmentStamp {
        EnrichmentStamp {
            source: SourceTag::LegislatorsRepo,
            version: v.into(),
            at: Utc::now(),
        }
    }

    fn incoming() -> PersonEnrichment {
        PersonEnrichment {
            bioguide_id: "S000148".into(),
            external_ids: [
                (ExternalIdKey::Govtrack, json!(300087)),
                (ExternalIdKey::Opensecrets, json!("N00001093")),
            ]
            .into_iter()
            .collect(),
            social_media: [(SocialPlatform::Twitter, "SenSchumer".to_string())]
                .into_iter()
                .collect(),
            scalars: [(ScalarField::Nickname, "Chuck".to_string())].into_iter().collect(),
        }
    }

    #[test]
    fn diff_separates_additions_from_conflicts() {
        let mut local = Person::new("S000148", "Charles", "Schumer");
        local.external_ids.insert_if_absent(ExternalIdKey::Govtrack, json!(1));
        let diff = EnrichmentMergeEngine::default().compute_diff(&local, &incoming());

        let added: Vec<String> = diff.fields_to_add.iter().map(|c| c.path.to_string()).collect();
        assert_eq!(
            added,
            vec!["external_ids.opensecrets", "social_media.twitter", "nickname"]
        );
        assert!(diff.fields_to_update.is_empty());
        assert_eq!(diff.skipped, vec![FieldPath::ExternalId(ExternalIdKey::Govtrack)]);
    }

    #[test]
    fn vacant_local_values_count_as_absent() {
        let mut local = Person::new("S000148", "Charles", "Schumer");
        local.external_ids.overwrite(ExternalIdKey::Govtrack, Value::Null);
        let diff = EnrichmentMergeEngine::default().compute_diff(&local, &incoming());
        assert!(diff
            .fields_to_add
            .iter()
            .any(|c| c.path == FieldPath::ExternalId(ExternalIdKey::Govtrack)));
    }

    #[test]
    fn whitelisted_field_is_refreshed() {
        let policy = MergePolicy {
            always_refresh: [FieldPath::SocialMedia(SocialPlatform::Twitter)].into_iter().collect(),
        };
        let engine = EnrichmentMergeEngine::new(policy);
        let mut local = Person::new("S000148", "Charles", "Schumer");
        local.social_media.insert_if_absent(SocialPlatform::Twitter, "OldHandle".into());

        let diff = engine.compute_diff(&local, &incoming());
        assert_eq!(diff.fields_to_update.len(), 1);
        let out = engine.apply(local, &diff, &stamp("abc"));
        assert_eq!(out.social_media.get(&SocialPlatform::Twitter).map(String::as_str), Some("SenSchumer"));
    }

    #[test]
    fn empty_diff_still_restamps() {
        let engine = EnrichmentMergeEngine::default();
        let local = Person::new("S000148", "Charles", "Schumer");
        let out = engine.apply(local, &MergeDiff::default(), &stamp("rev-2"));
        assert_eq!(out.enrichment_version.as_deref(), Some("rev-2"));
        assert_eq!(out.enrichment_source, Some(SourceTag::LegislatorsRepo));
        assert!(out.last_enriched_at.is_some());
    }

    #[test]
    fn field_paths_render_and_serialize() {
        let p = FieldPath::ExternalId(ExternalIdKey::from("new_tracker"));
        assert_eq!(p.to_string(), "external_ids.new_tracker");
        assert_eq!(serde_json::to_value(&p).unwrap(), json!("external_ids.new_tracker"));
    }
}
