//! Anonymous replay of queued requests.
//!
//! Each request is reissued with its credential headers stripped. If the
//! target still answers with success and nothing in the body says "access
//! denied", the original endpoint served the object without checking who was
//! asking.

use std::collections::HashMap;
use std::time::Duration;

use indicatif::ProgressBar;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;

use crate::config::RunConfig;
use crate::intercept::ObservedRequest;
use crate::output::Artifacts;

/// Outcome per tested request. Never mutated once produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Vulnerable,
    Ignored(String),
    /// The replay itself failed at the network level; distinct from a
    /// classified rejection.
    ReplayFailed(String),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ReplaySummary {
    pub vulnerable: usize,
    pub ignored: usize,
    pub failed: usize,
}

pub struct ReplayVerifier<'a> {
    client: reqwest::Client,
    unauthorized_keywords: Vec<String>,
    timeout: Duration,
    artifacts: &'a Artifacts,
}

impl<'a> ReplayVerifier<'a> {
    pub fn new(config: &RunConfig, artifacts: &'a Artifacts) -> Self {
        Self {
            client: crate::http_client::create_replay_client(
                config.replay_timeout_secs,
                &config.user_agent,
            ),
            unauthorized_keywords: config
                .unauthorized_keywords
                .iter()
                .map(|k| k.to_lowercase())
                .collect(),
            timeout: Duration::from_secs(config.replay_timeout_secs),
            artifacts,
        }
    }

    /// Drain the queue in enqueue order. No verdict for one item ever stops
    /// the rest.
    pub async fn run(&self, items: Vec<ObservedRequest>) -> ReplaySummary {
        let mut summary = ReplaySummary::default();
        let progress = ProgressBar::new(items.len() as u64);

        for request in &items {
            match self.verify(request).await {
                Verdict::Vulnerable => summary.vulnerable += 1,
                Verdict::Ignored(_) => summary.ignored += 1,
                Verdict::ReplayFailed(_) => summary.failed += 1,
            }
            progress.inc(1);
        }
        progress.finish_and_clear();
        summary
    }

    async fn verify(&self, request: &ObservedRequest) -> Verdict {
        let original = match request.response.lock().clone() {
            None => {
                let reason = "original request failed (status: n/a)".to_string();
                self.artifacts.log_ignored(&request.url, &reason);
                return Verdict::Ignored(reason);
            }
            Some(r) if r.status >= 400 => {
                let reason = format!("original request failed (status: {})", r.status);
                self.artifacts.log_ignored(&request.url, &reason);
                return Verdict::Ignored(reason);
            }
            Some(r) => r,
        };

        tracing::info!(
            method = %request.method,
            url = %request.url,
            original_status = original.status,
            original_latency_ms = original.latency_ms,
            "replaying anonymously"
        );

        let method = Method::from_bytes(request.method.as_bytes()).unwrap_or(Method::GET);
        let mut builder = self
            .client
            .request(method, &request.url)
            .headers(anonymized_headers(&request.headers))
            .timeout(self.timeout);
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = match builder.send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(url = %request.url, error = %e, "error replaying request");
                return Verdict::ReplayFailed(e.to_string());
            }
        };

        let status = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .map(|(n, v)| {
                (
                    n.as_str().to_string(),
                    v.to_str().unwrap_or("<binary>").to_string(),
                )
            })
            .collect();
        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => {
                tracing::error!(url = %request.url, error = %e, "error reading replay body");
                return Verdict::ReplayFailed(e.to_string());
            }
        };

        let verdict = classify_replay(status, &body, &self.unauthorized_keywords);
        match &verdict {
            Verdict::Vulnerable => match self.artifacts.write_vulnerability(request, status, &headers, &body) {
                Ok(path) => {
                    tracing::info!(record = %path.display(), "potential IDOR found");
                }
                Err(e) => {
                    tracing::error!(url = %request.url, error = %e, "failed to persist finding");
                }
            },
            Verdict::Ignored(reason) => self.artifacts.log_ignored(&request.url, reason),
            Verdict::ReplayFailed(_) => {}
        }
        verdict
    }
}

/// Strip credential headers, case-insensitively, keeping everything else.
pub fn anonymized_headers(headers: &HashMap<String, String>) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        if name.eq_ignore_ascii_case("authorization") || name.eq_ignore_ascii_case("cookie") {
            continue;
        }
        // Pseudo-headers like `:authority` show up in captured HTTP/2
        // traffic and are not resendable.
        if name.starts_with(':') {
            continue;
        }
        if let (Ok(n), Ok(v)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            map.insert(n, v);
        }
    }
    map
}

/// Vulnerable iff the anonymous replay succeeded and the body contains none
/// of the unauthorized markers. Keywords are expected pre-lowercased.
pub fn classify_replay(status: u16, body: &str, unauthorized_keywords: &[String]) -> Verdict {
    let body_lower = body.to_lowercase();
    let keyword_hit = unauthorized_keywords
        .iter()
        .find(|k| body_lower.contains(k.as_str()));

    if status < 400 && keyword_hit.is_none() {
        return Verdict::Vulnerable;
    }

    let mut reason = format!("replay failed with status {status}");
    if let Some(keyword) = keyword_hit {
        reason.push_str(&format!(" (contains unauthorized keyword '{keyword}')"));
    }
    Verdict::Ignored(reason)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keywords() -> Vec<String> {
        vec!["unauthorized".into(), "forbidden".into(), "access denied".into()]
    }

    #[test]
    fn success_without_keywords_is_vulnerable() {
        let v = classify_replay(200, r#"{"id":7,"email":"a@b.com"}"#, &keywords());
        assert_eq!(v, Verdict::Vulnerable);
    }

    #[test]
    fn redirect_status_is_not_vulnerable_by_status_alone() {
        // 3xx still counts as < 400; only keyword hits downgrade it.
        let v = classify_replay(302, "redirecting", &keywords());
        assert_eq!(v, Verdict::Vulnerable);
    }

    #[test]
    fn keyword_match_is_ignored_with_named_keyword() {
        let v = classify_replay(200, "Error: UNAUTHORIZED access", &keywords());
        match v {
            Verdict::Ignored(reason) => {
                assert!(reason.contains("unauthorized keyword 'unauthorized'"));
            }
            other => panic!("expected Ignored, got {other:?}"),
        }
    }

    #[test]
    fn denied_status_is_ignored_with_status_in_reason() {
        let v = classify_replay(403, "nope", &keywords());
        match v {
            Verdict::Ignored(reason) => assert!(reason.contains("403")),
            other => panic!("expected Ignored, got {other:?}"),
        }
    }

    #[test]
    fn denied_status_and_keyword_name_both() {
        let v = classify_replay(401, "Forbidden", &keywords());
        match v {
            Verdict::Ignored(reason) => {
                assert!(reason.contains("401"));
                assert!(reason.contains("'forbidden'"));
            }
            other => panic!("expected Ignored, got {other:?}"),
        }
    }

    #[test]
    fn credential_headers_are_stripped() {
        let headers = HashMap::from([
            ("Authorization".to_string(), "Bearer xyz".to_string()),
            ("COOKIE".to_string(), "session=1".to_string()),
            ("Accept".to_string(), "application/json".to_string()),
            (":authority".to_string(), "example.com".to_string()),
        ]);
        let map = anonymized_headers(&headers);
        assert!(map.get("authorization").is_none());
        assert!(map.get("cookie").is_none());
        assert_eq!(map.get("accept").unwrap(), "application/json");
        assert_eq!(map.len(), 1);
    }
}
