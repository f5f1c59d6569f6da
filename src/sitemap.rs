use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use parking_lot::Mutex;

/// Append-only record of discovered endpoint patterns.
///
/// `record_if_new` is the single serialization point that prevents duplicate
/// testing of structurally identical requests; it is consulted before the
/// comparatively expensive interest evaluation. The set and the sink share
/// one lock so on-disk order matches discovery order.
pub struct SitemapStore {
    inner: Mutex<Inner>,
}

struct Inner {
    seen: HashSet<String>,
    sink: File,
}

impl SitemapStore {
    /// Open (truncating) the sitemap sink for a fresh run.
    pub fn open(path: &Path) -> Result<Self> {
        let sink = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("failed to open sitemap log {}", path.display()))?;
        Ok(Self {
            inner: Mutex::new(Inner {
                seen: HashSet::new(),
                sink,
            }),
        })
    }

    /// Atomically check-and-insert. Returns true when the pattern was new,
    /// in which case it has also been appended to the sitemap sink.
    pub fn record_if_new(&self, pattern: &str) -> bool {
        let mut inner = self.inner.lock();
        if !inner.seen.insert(pattern.to_string()) {
            return false;
        }
        if let Err(e) = writeln!(inner.sink, "{pattern}") {
            tracing::error!(error = %e, "failed to append to sitemap log");
        }
        tracing::info!(pattern = %pattern, "new endpoint discovered");
        true
    }

    pub fn len(&self) -> usize {
        self.inner.lock().seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_if_new_dedupes() {
        let dir = tempfile::tempdir().unwrap();
        let store = SitemapStore::open(&dir.path().join("sitemap.log")).unwrap();
        assert!(store.record_if_new("GET /users/{id}"));
        assert!(!store.record_if_new("GET /users/{id}"));
        assert!(store.record_if_new("GET /orders/{id}"));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn sink_has_one_line_per_pattern_in_discovery_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sitemap.log");
        let store = SitemapStore::open(&path).unwrap();
        store.record_if_new("GET /b");
        store.record_if_new("GET /a");
        store.record_if_new("GET /b");
        drop(store);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines, vec!["GET /b", "GET /a"]);
    }

    #[test]
    fn open_truncates_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sitemap.log");
        std::fs::write(&path, "GET /stale\n").unwrap();
        let store = SitemapStore::open(&path).unwrap();
        assert!(store.record_if_new("GET /fresh"));
        drop(store);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "GET /fresh\n");
    }
}
