use url::Url;

/// Decides crawl/test eligibility of a URL against the configured scope.
///
/// Entries are plain hosts (`example.com`, `localhost:3000`) or wildcards
/// (`*.example.com`). A leading `www.` is ignored on both the rule and the
/// request host. Hosts on the exclusion list never match, even when a
/// wildcard would cover them.
#[derive(Debug, Clone)]
pub struct ScopeFilter {
    scope: Vec<String>,
    excluded: Vec<String>,
}

impl ScopeFilter {
    pub fn new(scope: &[String], excluded: &[String]) -> Self {
        Self {
            scope: scope.iter().map(|s| s.trim().to_lowercase()).collect(),
            excluded: excluded.iter().map(|s| strip_www(&s.trim().to_lowercase()).to_string()).collect(),
        }
    }

    pub fn is_in_scope(&self, url: &str) -> bool {
        let parsed = match Url::parse(url) {
            Ok(u) => u,
            Err(_) => return false,
        };
        let host = match host_key(&parsed) {
            Some(h) => h,
            None => return false,
        };
        let host = strip_www(&host);

        for entry in &self.scope {
            if let Some(suffix) = entry.strip_prefix("*.") {
                let suffix = strip_www(suffix);
                if host == suffix || host.ends_with(&format!(".{suffix}")) {
                    return !self.is_excluded(host);
                }
            } else if host == strip_www(entry) {
                return !self.is_excluded(host);
            }
        }
        false
    }

    fn is_excluded(&self, host: &str) -> bool {
        self.excluded.iter().any(|e| e == host)
    }
}

fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

/// Host plus explicit port, mirroring how scope entries like
/// `localhost:3000` are written.
fn host_key(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    match url.port() {
        Some(port) => Some(format!("{host}:{port}")),
        None => Some(host),
    }
}
