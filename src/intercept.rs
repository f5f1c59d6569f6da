//! Request interception pipeline.
//!
//! Invoked synchronously for every network request the browsing session
//! observes during traversal. Each gate short-circuits: scope, asset
//! extension, method classification, normalization, sitemap dedup, interest.
//! Only requests that pass every gate land in the test queue.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use url::Url;

use crate::config::RunConfig;
use crate::interest::InterestHeuristic;
use crate::normalize;
use crate::scope::ScopeFilter;
use crate::sitemap::SitemapStore;

/// Status and latency of the original in-browser response, filled in by the
/// browsing session adapter once the response arrives.
#[derive(Debug, Clone)]
pub struct ResponseInfo {
    pub status: u16,
    pub latency_ms: u64,
}

/// Shared slot for a response that may not have arrived yet. The verifier
/// reads it after traversal ends, when every response has either settled or
/// never will.
pub type ResponseHandle = Arc<Mutex<Option<ResponseInfo>>>;

/// A network request captured at the moment of observation, decoupled from
/// the browser's own object lifetime. Immutable after creation.
#[derive(Debug, Clone)]
pub struct ObservedRequest {
    pub method: String,
    pub url: String,
    /// Header keys compare case-insensitively; stored as observed.
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
    pub response: ResponseHandle,
}

impl ObservedRequest {
    pub fn unresolved_response() -> ResponseHandle {
        Arc::new(Mutex::new(None))
    }
}

/// Requests that passed every interception gate, in enqueue order. Drained
/// exactly once by the replay phase.
#[derive(Default)]
pub struct TestQueue {
    items: Mutex<Vec<ObservedRequest>>,
}

impl TestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, request: ObservedRequest) {
        self.items.lock().push(request);
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn drain(&self) -> Vec<ObservedRequest> {
        std::mem::take(&mut *self.items.lock())
    }
}

pub struct RequestInterceptor {
    scope: ScopeFilter,
    interest: InterestHeuristic,
    sitemap: Arc<SitemapStore>,
    queue: Arc<TestQueue>,
    graphql_paths: Vec<String>,
    excluded_extensions: Vec<String>,
}

impl RequestInterceptor {
    pub fn new(config: &RunConfig, sitemap: Arc<SitemapStore>, queue: Arc<TestQueue>) -> Self {
        Self {
            scope: ScopeFilter::new(&config.scope, &config.excluded_domains),
            interest: InterestHeuristic::new(&config.keys),
            sitemap,
            queue,
            graphql_paths: config.graphql_paths.clone(),
            excluded_extensions: config
                .excluded_extensions
                .iter()
                .map(|e| e.to_lowercase())
                .collect(),
        }
    }

    /// Run one observed request through the pipeline. Rejections are silent
    /// no-ops; this executes inside the browsing event flow and must stay
    /// cheap.
    pub fn observe(&self, request: ObservedRequest) {
        if !self.scope.is_in_scope(&request.url) {
            return;
        }
        let parsed = match Url::parse(&request.url) {
            Ok(u) => u,
            Err(_) => return,
        };
        if self.is_asset(&parsed) {
            return;
        }

        let is_get = request.method.eq_ignore_ascii_case("GET");
        let is_graphql_post = request.method.eq_ignore_ascii_case("POST")
            && self.graphql_paths.iter().any(|p| p == parsed.path());

        let pattern = if is_get {
            normalize::normalize("GET", &parsed)
        } else if is_graphql_post {
            normalize::normalize_graphql(&parsed, request.body.as_deref())
        } else {
            return;
        };

        if !self.sitemap.record_if_new(&pattern) {
            return;
        }

        let interesting = self.interest.url_has_key(&parsed)
            || (is_graphql_post && self.interest.body_has_key(request.body.as_deref()));
        if !interesting {
            return;
        }

        tracing::info!(pattern = %pattern, url = %request.url, "request added to test queue");
        self.queue.push(request);
    }

    fn is_asset(&self, url: &Url) -> bool {
        let path = url.path().to_lowercase();
        self.excluded_extensions.iter().any(|ext| path.ends_with(ext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_config(dir: &std::path::Path) -> (RunConfig, Arc<SitemapStore>, Arc<TestQueue>) {
        let config = RunConfig {
            scope: vec!["example.com".into()],
            keys: vec![json!(7)],
            graphql_paths: vec!["/graphql".into()],
            ..RunConfig::default()
        };
        let sitemap = Arc::new(SitemapStore::open(&dir.join("sitemap.log")).unwrap());
        let queue = Arc::new(TestQueue::new());
        (config, sitemap, queue)
    }

    fn request(method: &str, url: &str, body: Option<&[u8]>) -> ObservedRequest {
        ObservedRequest {
            method: method.into(),
            url: url.into(),
            headers: HashMap::new(),
            body: body.map(|b| b.to_vec()),
            response: ObservedRequest::unresolved_response(),
        }
    }

    #[test]
    fn interesting_get_is_queued() {
        let dir = tempfile::tempdir().unwrap();
        let (config, sitemap, queue) = make_config(dir.path());
        let interceptor = RequestInterceptor::new(&config, sitemap, queue.clone());

        interceptor.observe(request("GET", "https://example.com/users/7", None));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn out_of_scope_and_assets_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let (config, sitemap, queue) = make_config(dir.path());
        let interceptor = RequestInterceptor::new(&config, sitemap.clone(), queue.clone());

        interceptor.observe(request("GET", "https://other.com/users/7", None));
        interceptor.observe(request("GET", "https://example.com/assets/7.png", None));
        assert!(queue.is_empty());
        // rejected before normalization, so nothing was recorded either
        assert!(sitemap.is_empty());
    }

    #[test]
    fn duplicate_shapes_are_tested_once() {
        let dir = tempfile::tempdir().unwrap();
        let (config, sitemap, queue) = make_config(dir.path());
        let interceptor = RequestInterceptor::new(&config, sitemap, queue.clone());

        interceptor.observe(request("GET", "https://example.com/users/7", None));
        interceptor.observe(request("GET", "https://example.com/users/7?x=1", None));
        interceptor.observe(request("GET", "https://example.com/users/7", None));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn uninteresting_requests_still_land_in_sitemap() {
        let dir = tempfile::tempdir().unwrap();
        let (config, sitemap, queue) = make_config(dir.path());
        let interceptor = RequestInterceptor::new(&config, sitemap.clone(), queue.clone());

        interceptor.observe(request("GET", "https://example.com/catalog", None));
        assert!(queue.is_empty());
        assert_eq!(sitemap.len(), 1);
    }

    #[test]
    fn post_outside_graphql_paths_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let (config, sitemap, queue) = make_config(dir.path());
        let interceptor = RequestInterceptor::new(&config, sitemap.clone(), queue.clone());

        interceptor.observe(request("POST", "https://example.com/api/users/7", None));
        assert!(queue.is_empty());
        assert!(sitemap.is_empty());
    }

    #[test]
    fn graphql_post_with_body_key_is_queued() {
        let dir = tempfile::tempdir().unwrap();
        let (config, sitemap, queue) = make_config(dir.path());
        let interceptor = RequestInterceptor::new(&config, sitemap, queue.clone());

        let body = br#"{"query":"query { user(id: 7) { name } }"}"#;
        interceptor.observe(request("POST", "https://example.com/graphql", Some(body)));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn graphql_mutation_is_not_queued() {
        let dir = tempfile::tempdir().unwrap();
        let (config, sitemap, queue) = make_config(dir.path());
        let interceptor = RequestInterceptor::new(&config, sitemap.clone(), queue.clone());

        let body = br#"{"query":"mutation { deleteUser(id: 7) }"}"#;
        interceptor.observe(request("POST", "https://example.com/graphql", Some(body)));
        assert!(queue.is_empty());
        // the shape is still recorded
        assert_eq!(sitemap.len(), 1);
    }

    #[test]
    fn drain_consumes_the_queue() {
        let queue = TestQueue::new();
        queue.push(request("GET", "https://example.com/users/7", None));
        let items = queue.drain();
        assert_eq!(items.len(), 1);
        assert!(queue.is_empty());
    }
}
