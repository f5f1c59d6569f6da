//! Scope-aware traversal controller.
//!
//! BFS over a work queue of URLs. Page keys (URL minus query) gate
//! navigation, element signatures gate interaction; both accumulate for the
//! whole crawl session so cyclic link graphs and repeated widgets terminate.
//! A failure on any single page is logged and skipped; the crawl only ends
//! when the queue is empty.

pub mod overlay;

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use anyhow::Result;
use url::Url;

use crate::browser::{BrowsingSession, ElementHandle};
use crate::config::RunConfig;
use crate::scope::ScopeFilter;

/// Everything on a page an authenticated user might activate.
const CLICKABLE_SELECTOR: &str = "a, button, [role='button'], [role='link'], [onclick]";

enum Interaction {
    Skipped,
    Clicked,
    /// The click navigated; the current DOM is stale.
    Navigated,
}

pub struct TraversalController<'a> {
    session: &'a dyn BrowsingSession,
    scope: &'a ScopeFilter,
    config: &'a RunConfig,
    queue: VecDeque<String>,
    visited: HashSet<String>,
    /// Element signatures interacted with; never cleared. Two elements with
    /// the same signature are clicked at most once combined, trading
    /// completeness for termination.
    interacted: HashSet<String>,
}

impl<'a> TraversalController<'a> {
    pub fn new(session: &'a dyn BrowsingSession, scope: &'a ScopeFilter, config: &'a RunConfig) -> Self {
        Self {
            session,
            scope,
            config,
            queue: config.start_urls.iter().cloned().collect(),
            visited: HashSet::new(),
            interacted: HashSet::new(),
        }
    }

    pub fn pages_visited(&self) -> usize {
        self.visited.len()
    }

    pub fn elements_interacted(&self) -> usize {
        self.interacted.len()
    }

    /// Drive the crawl until the work queue is empty.
    pub async fn run(&mut self) -> Result<()> {
        while let Some(url) = self.queue.pop_front() {
            let Some(key) = page_key(&url) else { continue };
            if self.visited.contains(&key) {
                continue;
            }
            // Mark before navigating so redirects back into the queue cannot
            // loop.
            self.visited.insert(key);

            if !self.scope.is_in_scope(&url) {
                continue;
            }

            tracing::info!(url = %url, "crawling page");
            if let Err(e) = self.crawl_page(&url).await {
                tracing::error!(url = %url, error = %e, "page failed, moving to next url");
            }
        }
        Ok(())
    }

    async fn crawl_page(&mut self, url: &str) -> Result<()> {
        self.session
            .navigate(url, Duration::from_secs(self.config.navigation_timeout_secs))
            .await?;
        // Extra wait for dynamic content.
        tokio::time::sleep(Duration::from_millis(self.config.settle_wait_ms)).await;

        overlay::suppress(self.session, self.config).await;

        let current = self.session.current_url().await?;
        // The final URL after redirects counts as visited too.
        if let Some(key) = page_key(&current) {
            self.visited.insert(key);
        }

        self.collect_links(&current).await?;
        self.interact_with_elements().await?;
        Ok(())
    }

    /// Enqueue every in-scope hyperlink target whose page is unvisited and
    /// not already queued.
    async fn collect_links(&mut self, current_url: &str) -> Result<()> {
        let Ok(base) = Url::parse(current_url) else {
            return Ok(());
        };
        let anchors = self.session.query_all("a[href]").await?;
        for anchor in &anchors {
            let href = match anchor.attribute("href").await {
                Ok(Some(h)) => h,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "could not read link target, skipping");
                    continue;
                }
            };
            let Ok(absolute) = base.join(&href) else { continue };
            let absolute = absolute.to_string();
            if !self.scope.is_in_scope(&absolute) {
                continue;
            }
            let Some(key) = page_key(&absolute) else { continue };
            if !self.visited.contains(&key) && !self.queue.contains(&absolute) {
                tracing::info!(url = %absolute, "found new url to visit");
                self.queue.push_back(absolute);
            }
        }
        Ok(())
    }

    /// Click each interactive element at most once per unique signature for
    /// the whole session.
    async fn interact_with_elements(&mut self) -> Result<()> {
        let count = self.session.query_all(CLICKABLE_SELECTOR).await?.len();
        tracing::info!(count, "clickable elements found");

        for index in 0..count {
            // Re-query every iteration; the DOM may have changed since the
            // last click.
            let elements = match self.session.query_all(CLICKABLE_SELECTOR).await {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(error = %e, "element query failed, leaving page");
                    break;
                }
            };
            let Some(element) = elements.get(index) else { break };

            match self.interact_once(element.as_ref()).await {
                Ok(Interaction::Navigated) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(index, error = %e, "could not interact with element, skipping");
                    if e.to_string().to_lowercase().contains("navigation") {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    async fn interact_once(&mut self, element: &dyn ElementHandle) -> Result<Interaction> {
        if !element.is_visible().await? || !element.is_enabled().await? {
            return Ok(Interaction::Skipped);
        }

        let tag = element.tag_name().await?.to_lowercase();
        let text = element
            .text_content()
            .await?
            .unwrap_or_default()
            .trim()
            .to_lowercase();

        let signature = if !text.is_empty() {
            format!("{tag}:{text}")
        } else if tag == "a" {
            // A text-less link is still identifiable by where it points.
            let href = element.attribute("href").await?.unwrap_or_default();
            let href = href.trim();
            if href.is_empty() || href.starts_with("javascript:") || href.starts_with('#') {
                return Ok(Interaction::Skipped);
            }
            format!("a:href:{}", href_path(href))
        } else {
            // Text-less non-anchor elements would mean blind icon-clicking.
            return Ok(Interaction::Skipped);
        };

        if !self.interacted.insert(signature.clone()) {
            return Ok(Interaction::Skipped);
        }

        tracing::info!(signature = %signature, "clicking element");
        let url_before = self.session.current_url().await?;
        element
            .click(Duration::from_secs(self.config.click_timeout_secs))
            .await?;
        tokio::time::sleep(Duration::from_millis(self.config.click_settle_ms)).await;

        let url_after = self.session.current_url().await?;
        if url_after != url_before {
            tracing::info!(from = %url_before, to = %url_after, "navigation detected after click");
            if self.scope.is_in_scope(&url_after) {
                if let Some(key) = page_key(&url_after) {
                    if !self.visited.contains(&key) && !self.queue.contains(&url_after) {
                        self.queue.push_back(url_after);
                    }
                }
            }
            return Ok(Interaction::Navigated);
        }

        overlay::suppress(self.session, self.config).await;
        Ok(Interaction::Clicked)
    }
}

/// URL stripped of query and fragment: the "already navigated" granularity.
pub fn page_key(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let authority = match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    Some(format!("{}://{}{}", parsed.scheme(), authority, parsed.path()))
}

/// Path portion of a possibly relative href, for signature purposes.
fn href_path(href: &str) -> String {
    if let Ok(parsed) = Url::parse(href) {
        return parsed.path().to_string();
    }
    let no_fragment = href.split('#').next().unwrap_or("");
    no_fragment.split('?').next().unwrap_or("").to_string()
}
