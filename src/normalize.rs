//! Canonical endpoint patterns.
//!
//! A pattern is the collapsing key for deduplication: semantically equivalent
//! requests (same shape, different concrete ids or query values) must map to
//! the same string. Over-collapsing hides distinct endpoints, under-collapsing
//! causes redundant testing and log spam.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use url::Url;

static NUMERIC_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").unwrap());
static UUID_SEGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i)[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$").unwrap()
});
static GRAPHQL_OPERATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:query|mutation)\s*\w*\s*\{?\s*(\w+)").unwrap());

const UNKNOWN_OPERATION: &str = "unknown_operation";

/// Pattern for a plain request: `METHOD path-template[?sorted-query-keys]`.
pub fn normalize(method: &str, url: &Url) -> String {
    let path = template_path(url.path());

    let keys: BTreeSet<String> = url.query_pairs().map(|(k, _)| k.into_owned()).collect();
    if keys.is_empty() {
        format!("{} {}", method.to_uppercase(), path)
    } else {
        let query = keys
            .iter()
            .map(|k| format!("{k}={{...}}"))
            .collect::<Vec<_>>()
            .join("&");
        format!("{} {}?{}", method.to_uppercase(), path, query)
    }
}

/// Pattern for a GraphQL-shaped POST: `POST path [operationName]`.
///
/// The operation name is the first identifier after a `query` or `mutation`
/// keyword in the body's `query` field. An absent, undecodable or malformed
/// body falls back to `[unknown_operation]`.
pub fn normalize_graphql(url: &Url, body: Option<&[u8]>) -> String {
    let operation = body
        .and_then(|bytes| std::str::from_utf8(bytes).ok())
        .and_then(|text| serde_json::from_str::<Value>(text).ok())
        .and_then(|data| data.get("query").and_then(|q| q.as_str()).map(str::to_string))
        .and_then(|query| {
            GRAPHQL_OPERATION
                .captures(&query)
                .map(|caps| caps[1].to_string())
        })
        .unwrap_or_else(|| UNKNOWN_OPERATION.to_string());

    format!("POST {} [{}]", url.path(), operation)
}

/// Replace dynamic path segments with `{id}`: numeric pass first, then
/// UUID-shaped segments. A segment folds at most once.
fn template_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if NUMERIC_SEGMENT.is_match(segment) || UUID_SEGMENT.is_match(segment) {
                "{id}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
