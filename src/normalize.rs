// src/normalize.rs
//! Name normalization and similarity for organization matching.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

static RE_DROP: Lazy<Regex> = Lazy::new(|| Regex::new(r"['\u{2019}.]").unwrap());
static RE_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\p{L}\p{N}\s]+").unwrap());
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Canonical comparison form of an organization name.
///
/// "U.S. Fish &amp; Wildlife Service" → "us fish and wildlife service".
pub fn normalize_name(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s);
    let lower = decoded.to_lowercase().replace('&', " and ");
    // Periods and apostrophes join ("U.S." → "us"); other punctuation splits.
    let joined = RE_DROP.replace_all(&lower, "");
    let spaced = RE_PUNCT.replace_all(&joined, " ");
    RE_WS.replace_all(spaced.trim(), " ").to_string()
}

/// Canonical acronym form: uppercase, no dots or spaces ("e.p.a." → "EPA").
pub fn normalize_acronym(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_uppercase)
        .collect()
}

fn tokens(s: &str) -> BTreeSet<&str> {
    s.split(' ').filter(|t| !t.is_empty()).collect()
}

/// Jaccard overlap of whitespace tokens of two already-normalized names.
pub fn token_jaccard(a: &str, b: &str) -> f64 {
    let ta = tokens(a);
    let tb = tokens(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let inter = ta.intersection(&tb).count() as f64;
    let union = ta.union(&tb).count() as f64;
    inter / union
}

/// Similarity in [0, 1]: the better of edit-distance and token overlap,
/// computed over normalized forms.
pub fn similarity(a: &str, b: &str) -> f64 {
    let na = normalize_name(a);
    let nb = normalize_name(b);
    if na.is_empty() || nb.is_empty() {
        return 0.0;
    }
    if na == nb {
        return 1.0;
    }
    strsim::normalized_levenshtein(&na, &nb).max(token_jaccard(&na, &nb))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_entities_punctuation_and_case() {
        assert_eq!(
            normalize_name("U.S. Fish &amp; Wildlife   Service"),
            "us fish and wildlife service"
        );
        assert_eq!(normalize_name("  Bureau of Land-Management, "), "bureau of land management");
        assert_eq!(normalize_name("People's Commission"), "peoples commission");
    }

    #[test]
    fn acronyms_ignore_dots_and_case() {
        assert_eq!(normalize_acronym("e.p.a."), "EPA");
        assert_eq!(normalize_acronym(" DoD "), "DOD");
    }

    #[test]
    fn similarity_prefers_near_spellings() {
        assert_eq!(similarity("Environmental Protection Agency", "environmental protection agency"), 1.0);
        assert!(similarity("Enviromental Protection Agency", "Environmental Protection Agency") > 0.9);
        assert!(similarity("Unknown Test Agency", "Environmental Protection Agency") < 0.85);
        assert_eq!(similarity("", "Agency"), 0.0);
    }

    #[test]
    fn token_overlap_handles_reordering() {
        let a = normalize_name("Agency for International Development");
        let b = normalize_name("International Development Agency for");
        assert_eq!(token_jaccard(&a, &b), 1.0);
    }
}
