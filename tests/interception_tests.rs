use std::collections::HashMap;
use std::sync::Arc;

use idor_scout::config::RunConfig;
use idor_scout::intercept::{ObservedRequest, RequestInterceptor, TestQueue};
use idor_scout::sitemap::SitemapStore;
use serde_json::json;

fn observed(method: &str, url: &str) -> ObservedRequest {
    ObservedRequest {
        method: method.into(),
        url: url.into(),
        headers: HashMap::new(),
        body: None,
        response: ObservedRequest::unresolved_response(),
    }
}

#[test]
fn pipeline_queues_once_per_shape_and_persists_sitemap() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunConfig {
        scope: vec!["shop.example.com".into()],
        keys: vec![json!(1337)],
        ..RunConfig::default()
    };
    let sitemap = Arc::new(SitemapStore::open(&dir.path().join("sitemap.log")).unwrap());
    let queue = Arc::new(TestQueue::new());
    let interceptor = RequestInterceptor::new(&config, sitemap, queue.clone());

    // Same endpoint shape observed for two different account ids.
    interceptor.observe(observed("GET", "https://shop.example.com/api/accounts/1337"));
    interceptor.observe(observed("GET", "https://shop.example.com/api/accounts/2448"));
    // Asset noise and third-party traffic.
    interceptor.observe(observed("GET", "https://shop.example.com/logo.svg"));
    interceptor.observe(observed("GET", "https://cdn.example.net/lib.js"));

    assert_eq!(queue.len(), 1);

    drop(interceptor);
    let sitemap_lines = std::fs::read_to_string(dir.path().join("sitemap.log")).unwrap();
    assert_eq!(sitemap_lines.trim(), "GET /api/accounts/{id}");
}
