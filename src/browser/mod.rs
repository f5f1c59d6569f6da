//! Abstract browsing capability consumed by the traversal controller.
//!
//! The controller never talks to a concrete browser; it drives these traits
//! so the crawl logic stays testable against a scripted session. The one
//! real implementation lives in [`chrome`] on top of the Chrome DevTools
//! Protocol.

pub mod chrome;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait BrowsingSession: Send + Sync {
    /// Navigate and wait for network quiescence, bounded by the timeout.
    /// Timeout expiry means "assume settled", not failure.
    async fn navigate(&self, url: &str, quiescence_timeout: Duration) -> Result<()>;

    /// The page URL after any redirects.
    async fn current_url(&self) -> Result<String>;

    /// All elements currently matching a CSS selector.
    async fn query_all(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle>>>;
}

#[async_trait]
pub trait ElementHandle: Send + Sync {
    async fn is_visible(&self) -> Result<bool>;
    async fn is_enabled(&self) -> Result<bool>;
    /// Lowercase tag name.
    async fn tag_name(&self) -> Result<String>;
    async fn text_content(&self) -> Result<Option<String>>;
    async fn attribute(&self, name: &str) -> Result<Option<String>>;
    async fn click(&self, timeout: Duration) -> Result<()>;
}
