// src/model/keyed_map.rs
//! Open key-value maps with an enumerated set of known keys.
//!
//! Known keys get their own variant; anything else passes through untouched as
//! `Other(String)`, so upstream datasets can grow new identifiers without a
//! schema change here. The map itself only grows through `insert_if_absent`
//! during enrichment.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Declares a key enum that round-trips through its string form.
macro_rules! known_keys {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum $name {
            $($variant,)+
            Other(String),
        }

        impl $name {
            pub const KNOWN: &'static [&'static str] = &[$($text),+];

            pub fn as_str(&self) -> &str {
                match self {
                    $(Self::$variant => $text,)+
                    Self::Other(s) => s.as_str(),
                }
            }

            pub fn is_known(&self) -> bool {
                !matches!(self, Self::Other(_))
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                match s.as_str() {
                    $($text => Self::$variant,)+
                    _ => Self::Other(s),
                }
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::from(s.to_string())
            }
        }

        impl From<$name> for String {
            fn from(k: $name) -> String {
                match k {
                    $name::Other(s) => s,
                    other => other.as_str().to_string(),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

known_keys! {
    /// Identifier systems a legislator may be known under.
    ExternalIdKey {
        Govtrack => "govtrack",
        Opensecrets => "opensecrets",
        Votesmart => "votesmart",
        Fec => "fec",
        Thomas => "thomas",
        Wikipedia => "wikipedia",
        Ballotpedia => "ballotpedia",
        Icpsr => "icpsr",
        Lis => "lis",
        Cspan => "cspan",
        HouseHistory => "house_history",
    }
}

known_keys! {
    SocialPlatform {
        Twitter => "twitter",
        Facebook => "facebook",
        Youtube => "youtube",
        Instagram => "instagram",
    }
}

/// Whether a stored value should be treated as "not set".
pub trait Vacancy {
    fn is_vacant(&self) -> bool;
}

impl Vacancy for serde_json::Value {
    fn is_vacant(&self) -> bool {
        match self {
            serde_json::Value::Null => true,
            serde_json::Value::String(s) => s.trim().is_empty(),
            serde_json::Value::Array(a) => a.is_empty(),
            _ => false,
        }
    }
}

impl Vacancy for String {
    fn is_vacant(&self) -> bool {
        self.trim().is_empty()
    }
}

/// Ordered map whose enrichment path only adds keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdditiveMap<K: Ord, V> {
    entries: BTreeMap<K, V>,
}

impl<K: Ord, V> Default for AdditiveMap<K, V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Clone, V: Vacancy> AdditiveMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    /// A key holding a vacant value (null, blank) counts as absent.
    pub fn has(&self, key: &K) -> bool {
        self.entries.get(key).is_some_and(|v| !v.is_vacant())
    }

    /// Adds `value` under `key` only if the key is absent or vacant.
    /// Returns true when the map changed.
    pub fn insert_if_absent(&mut self, key: K, value: V) -> bool {
        if self.has(&key) || value.is_vacant() {
            return false;
        }
        self.entries.insert(key, value);
        true
    }

    /// Unconditional write. Reserved for fields a merge policy explicitly
    /// allows to be refreshed; enrichment never calls this by default.
    pub fn overwrite(&mut self, key: K, value: V) -> Option<V> {
        self.entries.insert(key, value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }
}

impl<K: Ord + Clone, V: Vacancy> FromIterator<(K, V)> for AdditiveMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert_if_absent(k, v);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_and_unknown_keys_round_trip_through_strings() {
        assert_eq!(ExternalIdKey::from("govtrack"), ExternalIdKey::Govtrack);
        assert_eq!(
            ExternalIdKey::from("maplight"),
            ExternalIdKey::Other("maplight".into())
        );
        assert_eq!(String::from(ExternalIdKey::HouseHistory), "house_history");
        assert!(!SocialPlatform::from("mastodon").is_known());
    }

    #[test]
    fn insert_if_absent_keeps_existing_values() {
        let mut m: AdditiveMap<ExternalIdKey, serde_json::Value> = AdditiveMap::new();
        assert!(m.insert_if_absent(ExternalIdKey::Govtrack, json!(400001)));
        assert!(!m.insert_if_absent(ExternalIdKey::Govtrack, json!(999)));
        assert_eq!(m.get(&ExternalIdKey::Govtrack), Some(&json!(400001)));
    }

    #[test]
    fn vacant_values_are_fillable() {
        let mut m: AdditiveMap<SocialPlatform, String> = AdditiveMap::new();
        m.overwrite(SocialPlatform::Twitter, "  ".into());
        assert!(!m.has(&SocialPlatform::Twitter));
        assert!(m.insert_if_absent(SocialPlatform::Twitter, "SenExample".into()));
        assert!(!m.insert_if_absent(SocialPlatform::Youtube, String::new()));
    }

    #[test]
    fn serializes_as_plain_object_with_unknown_keys() {
        let mut m: AdditiveMap<SocialPlatform, String> = AdditiveMap::new();
        m.insert_if_absent(SocialPlatform::Twitter, "a".into());
        m.insert_if_absent(SocialPlatform::from("bluesky"), "b".into());
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v, json!({"twitter": "a", "bluesky": "b"}));

        let back: AdditiveMap<SocialPlatform, String> = serde_json::from_value(v).unwrap();
        assert_eq!(back, m);
    }
}
