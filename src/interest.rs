//! Decides which observed requests are worth replaying.
//!
//! A request is interesting when one of the configured identifier values (a
//! victim's user id, email, resource id) shows up in the URL or, for GraphQL
//! POSTs, somewhere in the JSON body. GraphQL mutations are deliberately
//! never interesting: they have side effects and are unsafe to replay.

use serde_json::Value;
use std::collections::VecDeque;
use url::Url;

#[derive(Debug, Clone)]
pub struct InterestHeuristic {
    keys: Vec<String>,
}

impl InterestHeuristic {
    /// Keys may be configured as strings or numbers; both compare by their
    /// string form.
    pub fn new(keys: &[Value]) -> Self {
        Self {
            keys: keys.iter().filter_map(scalar_to_string).collect(),
        }
    }

    /// Exact match of any key against a path segment or a query parameter
    /// value.
    pub fn url_has_key(&self, url: &Url) -> bool {
        if self.keys.is_empty() {
            return false;
        }
        let segments: Vec<&str> = url.path().trim_matches('/').split('/').collect();
        if self.keys.iter().any(|k| segments.contains(&k.as_str())) {
            return true;
        }
        url.query_pairs()
            .any(|(_, v)| self.keys.iter().any(|k| v == k.as_str()))
    }

    /// Search a GraphQL JSON body for the configured keys.
    ///
    /// Bodies whose top-level `query` text contains `mutation` never match.
    /// Otherwise every scalar reachable from the root is collected as a
    /// string and tested for a key occurrence; the walk is iterative so
    /// adversarial nesting depth cannot blow the stack. A body that is not
    /// valid JSON has no extractable structure and never matches.
    pub fn body_has_key(&self, body: Option<&[u8]>) -> bool {
        let Some(bytes) = body else { return false };
        if self.keys.is_empty() {
            return false;
        }
        let Ok(text) = std::str::from_utf8(bytes) else { return false };
        let Ok(data) = serde_json::from_str::<Value>(text) else { return false };

        if let Some(query) = data.get("query").and_then(|q| q.as_str()) {
            if query.contains("mutation") {
                return false;
            }
        }

        let leaves = collect_scalars(&data);
        self.keys
            .iter()
            .any(|key| leaves.iter().any(|leaf| leaf.contains(key.as_str())))
    }
}

fn scalar_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Breadth-first walk over a work queue of JSON values; objects contribute
/// their values, arrays their items, scalars their string form.
fn collect_scalars(root: &Value) -> Vec<String> {
    let mut leaves = Vec::new();
    let mut queue: VecDeque<&Value> = VecDeque::new();
    queue.push_back(root);

    while let Some(value) = queue.pop_front() {
        match value {
            Value::Object(map) => queue.extend(map.values()),
            Value::Array(items) => queue.extend(items.iter()),
            other => {
                if let Some(s) = scalar_to_string(other) {
                    leaves.push(s);
                }
            }
        }
    }
    leaves
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn heuristic(keys: &[Value]) -> InterestHeuristic {
        InterestHeuristic::new(keys)
    }

    #[test]
    fn key_in_path_segment() {
        let h = heuristic(&[json!(7)]);
        let url = Url::parse("https://x.com/users/7/profile").unwrap();
        assert!(h.url_has_key(&url));
    }

    #[test]
    fn partial_segment_does_not_match() {
        let h = heuristic(&[json!(7)]);
        let url = Url::parse("https://x.com/users/17/profile").unwrap();
        assert!(!h.url_has_key(&url));
    }

    #[test]
    fn key_in_query_value() {
        let h = heuristic(&[json!("a@b.com")]);
        let url = Url::parse("https://x.com/lookup?email=a%40b.com").unwrap();
        assert!(h.url_has_key(&url));
    }

    #[test]
    fn query_key_name_is_not_a_value_match() {
        let h = heuristic(&[json!("user")]);
        let url = Url::parse("https://x.com/lookup?user=42").unwrap();
        assert!(!h.url_has_key(&url));
    }

    #[test]
    fn mutation_bodies_are_never_interesting() {
        let h = heuristic(&[json!(7)]);
        let body = br#"{"query":"mutation { deleteUser(id: 7) }"}"#;
        assert!(!h.body_has_key(Some(body)));
    }

    #[test]
    fn query_body_with_key_is_interesting() {
        let h = heuristic(&[json!(7)]);
        let body = br#"{"query":"query { user(id: 7) }"}"#;
        assert!(h.body_has_key(Some(body)));
    }

    #[test]
    fn key_found_in_nested_variables() {
        let h = heuristic(&[json!(26)]);
        let body = br#"{"query":"query U($id: ID!) { user(id: $id) { name } }","variables":{"filter":{"ids":[3, 26]}}}"#;
        assert!(h.body_has_key(Some(body)));
    }

    #[test]
    fn absent_or_malformed_body_is_not_interesting() {
        let h = heuristic(&[json!(7)]);
        assert!(!h.body_has_key(None));
        assert!(!h.body_has_key(Some(b"<html>7</html>")));
    }

    #[test]
    fn numeric_and_string_keys_compare_by_string_form() {
        let h = heuristic(&[json!("7")]);
        let body = br#"{"query":"query q { u }","variables":{"id":7}}"#;
        assert!(h.body_has_key(Some(body)));
    }

    #[test]
    fn no_keys_means_nothing_is_interesting() {
        let h = heuristic(&[]);
        let url = Url::parse("https://x.com/users/7").unwrap();
        assert!(!h.url_has_key(&url));
        assert!(!h.body_has_key(Some(br#"{"query":"query { a }"}"#)));
    }
}
