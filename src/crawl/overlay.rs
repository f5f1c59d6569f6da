//! Overlay suppression: cookie banners, modals, popups.
//!
//! Advisory only. An overlay that refuses to close is logged and the crawl
//! carries on; it may shadow parts of the page, never abort the run.

use std::time::Duration;

use anyhow::Result;

use crate::browser::{BrowsingSession, ElementHandle};
use crate::config::RunConfig;

const CLOSE_CLICK_TIMEOUT: Duration = Duration::from_secs(3);
const CLOSE_SETTLE: Duration = Duration::from_millis(500);

/// Try to close anything overlaying the page. Called before scanning a page
/// and after every click.
pub async fn suppress(session: &dyn BrowsingSession, config: &RunConfig) {
    for selector in &config.overlay_selectors {
        if let Err(e) = suppress_selector(session, config, selector).await {
            tracing::warn!(selector = %selector, error = %e, "error while handling overlay");
        }
    }
}

async fn suppress_selector(
    session: &dyn BrowsingSession,
    config: &RunConfig,
    selector: &str,
) -> Result<()> {
    if !any_visible(session, selector).await? {
        return Ok(());
    }
    tracing::info!(selector = %selector, "visible overlay found, searching for a close affordance");

    // First choice: a button-like descendant whose text is in the close
    // vocabulary.
    let candidates_selector = format!("{selector} button, {selector} a, {selector} [role='button']");
    for candidate in session.query_all(&candidates_selector).await? {
        if !candidate.is_visible().await.unwrap_or(false) {
            continue;
        }
        let text = candidate
            .text_content()
            .await
            .unwrap_or(None)
            .unwrap_or_default()
            .trim()
            .to_string();
        if text.is_empty() {
            continue;
        }
        if !config
            .close_button_texts
            .iter()
            .any(|t| t.eq_ignore_ascii_case(&text))
        {
            continue;
        }

        tracing::info!(text = %text, "clicking overlay close button");
        let _ = candidate.click(CLOSE_CLICK_TIMEOUT).await;
        tokio::time::sleep(CLOSE_SETTLE).await;
        if !any_visible(session, selector).await? {
            tracing::info!("overlay closed");
            return Ok(());
        }
        break;
    }

    // Fallback: ARIA-label heuristics scoped to the overlay.
    for aria in &config.aria_close_selectors {
        let scoped = format!("{selector} {aria}");
        let Ok(candidates) = session.query_all(&scoped).await else { continue };
        for candidate in candidates {
            if !candidate.is_visible().await.unwrap_or(false) {
                continue;
            }
            tracing::info!(selector = %scoped, "clicking aria-labelled close button");
            let _ = candidate.click(CLOSE_CLICK_TIMEOUT).await;
            tokio::time::sleep(CLOSE_SETTLE).await;
            if !any_visible(session, selector).await? {
                tracing::info!("overlay closed");
                return Ok(());
            }
        }
    }

    if any_visible(session, selector).await? {
        tracing::warn!(selector = %selector, "could not close overlay, it may interfere with the crawl");
    }
    Ok(())
}

async fn any_visible(session: &dyn BrowsingSession, selector: &str) -> Result<bool> {
    for element in session.query_all(selector).await? {
        if element.is_visible().await.unwrap_or(false) {
            return Ok(true);
        }
    }
    Ok(false)
}
