// src/fetch/decode.rs
use metrics::counter;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::DecodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Yaml,
}

/// Decode a payload. `what` names the payload in the error ("agencies page 3").
pub fn try_decode<T: DeserializeOwned>(
    format: Format,
    bytes: &[u8],
    what: &str,
) -> Result<T, DecodeError> {
    let result = match format {
        Format::Json => serde_json::from_slice::<T>(bytes).map_err(|e| e.to_string()),
        Format::Yaml => serde_yaml::from_slice::<T>(bytes).map_err(|e| e.to_string()),
    };
    result.map_err(|message| DecodeError {
        what: what.to_string(),
        message,
    })
}

/// Page-level fallback: a payload that fails to decode is logged, counted and
/// treated as empty so the rest of the run can continue.
pub fn decode_or_empty<T: DeserializeOwned + Default>(
    format: Format,
    bytes: &[u8],
    source: &'static str,
    what: &str,
) -> T {
    match try_decode(format, bytes, what) {
        Ok(v) => v,
        Err(e) => {
            counter!("sources_decode_errors_total", "source" => source).increment(1);
            warn!(target: "sources", source, error = %e, "treating undecodable payload as empty");
            T::default()
        }
    }
}

/// Record-level fallback: decode each element on its own and skip the ones
/// that do not fit `T`.
pub fn records_from_values<T: DeserializeOwned>(
    values: Vec<serde_json::Value>,
    source: &'static str,
    what: &str,
) -> Vec<T> {
    let mut out = Vec::with_capacity(values.len());
    for (index, value) in values.into_iter().enumerate() {
        match serde_json::from_value::<T>(value) {
            Ok(v) => out.push(v),
            Err(e) => {
                counter!("sources_decode_errors_total", "source" => source).increment(1);
                warn!(target: "sources", source, what, index, error = %e, "skipping undecodable record");
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, serde::Deserialize, PartialEq)]
    struct Page {
        #[serde(default)]
        results: Vec<u32>,
    }

    #[test]
    fn decodes_json_and_yaml() {
        let j: Page = try_decode(Format::Json, br#"{"results":[1,2]}"#, "page").unwrap();
        assert_eq!(j.results, vec![1, 2]);
        let y: Page = try_decode(Format::Yaml, b"results:\n  - 3\n", "page").unwrap();
        assert_eq!(y.results, vec![3]);
    }

    #[test]
    fn error_names_the_payload() {
        let err = try_decode::<Page>(Format::Json, b"<html>", "documents page 2").unwrap_err();
        assert_eq!(err.what, "documents page 2");
        assert!(err.to_string().starts_with("failed to decode documents page 2"));
    }

    #[test]
    fn malformed_payload_falls_back_to_default() {
        let p: Page = decode_or_empty(Format::Json, b"{not json", "test", "page");
        assert_eq!(p, Page::default());
    }

    #[test]
    fn bad_records_are_skipped_individually() {
        let values = vec![
            serde_json::json!({"results": [1]}),
            serde_json::json!({"results": "nope"}),
            serde_json::json!({}),
        ];
        let pages: Vec<Page> = records_from_values(values, "test", "pages");
        assert_eq!(pages.len(), 2);
    }
}
