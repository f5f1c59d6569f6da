use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

/// Run configuration, loaded from a JSON file. Every field has a default so
/// a config file only needs to name what it changes; `scope` and
/// `start_urls` are the two an operator always sets.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Domains eligible for crawling and testing. Wildcards supported
    /// (`*.example.com`); entries may carry a port (`localhost:3000`).
    pub scope: Vec<String>,
    /// Domains explicitly excluded even when a wildcard covers them.
    pub excluded_domains: Vec<String>,
    /// Seed URLs for the traversal work queue.
    pub start_urls: Vec<String>,

    /// Cookies injected into the authenticated browser session.
    pub cookies: HashMap<String, String>,
    /// Optional `Authorization` header value sent with every browser request.
    pub bearer_header: Option<String>,
    pub user_agent: String,

    /// Identifier values (strings or numbers) whose presence marks a request
    /// as interesting. Matching against URLs is exact.
    pub keys: Vec<Value>,
    /// Paths treated as GraphQL endpoints for POST classification.
    pub graphql_paths: Vec<String>,
    /// Case-insensitive markers of a denied resource in replayed responses.
    pub unauthorized_keywords: Vec<String>,
    /// Static asset extensions whose requests are never analyzed.
    pub excluded_extensions: Vec<String>,

    pub headless: bool,

    /// CSS selectors that identify overlays (modals, cookie banners).
    pub overlay_selectors: Vec<String>,
    /// Close-affordance texts, compared exactly and case-insensitively.
    pub close_button_texts: Vec<String>,
    /// ARIA fallback selectors for close affordances, scoped to the overlay.
    pub aria_close_selectors: Vec<String>,

    /// Directory receiving the sitemap, ignored log, findings and run log.
    pub log_dir: String,

    pub navigation_timeout_secs: u64,
    /// Extra wait after navigation for dynamic content.
    pub settle_wait_ms: u64,
    /// Wait after a click for navigation or requests to fire.
    pub click_settle_ms: u64,
    pub click_timeout_secs: u64,
    pub replay_timeout_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            scope: Vec::new(),
            excluded_domains: Vec::new(),
            start_urls: Vec::new(),
            cookies: HashMap::new(),
            bearer_header: None,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            keys: Vec::new(),
            graphql_paths: Vec::new(),
            unauthorized_keywords: [
                "unauthorized",
                "forbidden",
                "access denied",
                "auth required",
                "session expired",
            ]
            .map(String::from)
            .to_vec(),
            excluded_extensions: [
                ".jpg", ".jpeg", ".png", ".gif", ".svg", ".webp", ".ico", ".css", ".js",
                ".map", ".woff", ".woff2", ".ttf", ".eot", ".mp4", ".webm", ".pdf",
            ]
            .map(String::from)
            .to_vec(),
            headless: true,
            overlay_selectors: [
                "[role=\"dialog\"]",
                "[aria-modal=\"true\"]",
                "#onetrust-banner-sdk",
                "div[class*=\"modal\"]",
                "div[class*=\"overlay\"]",
                "div[class*=\"popup\"]",
                "div[class*=\"banner\"]",
            ]
            .map(String::from)
            .to_vec(),
            close_button_texts: [
                "accept", "agree", "close", "ok", "continue", "dismiss", "got it",
                "i agree", "i accept", "yes", "allow all", "accept all",
            ]
            .map(String::from)
            .to_vec(),
            aria_close_selectors: [
                "[aria-label*=\"close\" i]",
                "[aria-label*=\"accept\" i]",
                "[aria-label*=\"agree\" i]",
            ]
            .map(String::from)
            .to_vec(),
            log_dir: "idor_logs".to_string(),
            navigation_timeout_secs: 20,
            settle_wait_ms: 2000,
            click_settle_ms: 1500,
            click_timeout_secs: 5,
            replay_timeout_secs: 10,
        }
    }
}

impl RunConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: RunConfig = serde_json::from_str(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            r#"{{"scope":["localhost:3000"],"start_urls":["http://localhost:3000/"],"keys":[7,"a@b.com"]}}"#
        )
        .unwrap();

        let config = RunConfig::from_file(f.path()).unwrap();
        assert_eq!(config.scope, vec!["localhost:3000"]);
        assert_eq!(config.keys.len(), 2);
        assert!(config.headless);
        assert_eq!(config.navigation_timeout_secs, 20);
        assert!(config.unauthorized_keywords.contains(&"forbidden".to_string()));
    }

    #[test]
    fn invalid_json_is_an_error() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "{{not json").unwrap();
        assert!(RunConfig::from_file(f.path()).is_err());
    }
}
