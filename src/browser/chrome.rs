//! Browsing session on headless Chrome via the DevTools Protocol.
//!
//! Every network request the page issues is captured at the moment of
//! observation, handed to the request interceptor, and paired with its
//! response once that arrives.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
    EventResponseReceived, Headers, Request, SetExtraHttpHeadersParams,
};
use chromiumoxide::{Element, Page};
use dashmap::DashMap;
use futures::StreamExt;
use serde_json::json;
use url::Url;

use crate::browser::{BrowsingSession, ElementHandle};
use crate::config::RunConfig;
use crate::intercept::{ObservedRequest, RequestInterceptor, ResponseHandle, ResponseInfo};

type PendingResponses = Arc<DashMap<String, (ResponseHandle, Instant)>>;

pub struct ChromeSession {
    browser: Browser,
    page: Page,
    /// Requests issued since the current navigation began, minus the ones
    /// that finished or failed. Quiescence polling treats <= 0 as settled.
    inflight: Arc<AtomicI64>,
}

impl ChromeSession {
    /// Launch the browser, inject the authenticated session (cookies and
    /// bearer header) and wire the network event stream into the
    /// interceptor. Failure here is fatal for the run.
    pub async fn launch(config: &RunConfig, interceptor: Arc<RequestInterceptor>) -> Result<Self> {
        tracing::info!(headless = config.headless, "launching browser session");

        let mut builder = BrowserConfig::builder()
            .arg(format!("--user-agent={}", config.user_agent));
        if config.headless {
            builder = builder.no_sandbox().args(vec![
                "--headless",
                "--disable-blink-features=AutomationControlled",
                "--disable-dev-shm-usage",
                "--no-sandbox",
                "--disable-gpu",
                "--window-size=1920,1080",
            ]);
        } else {
            builder = builder.with_head();
        }

        let (browser, mut handler) = Browser::launch(
            builder
                .build()
                .map_err(|e| anyhow!("browser config error: {e}"))?,
        )
        .await
        .context("failed to launch browser")?;

        tokio::spawn(async move {
            while handler.next().await.is_some() {}
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to open page")?;

        if let Some(bearer) = &config.bearer_header {
            page.execute(SetExtraHttpHeadersParams::new(Headers::new(json!({
                "Authorization": bearer,
            }))))
            .await
            .context("failed to set bearer header")?;
        }

        if !config.cookies.is_empty() {
            let cookies = session_cookies(config)?;
            page.set_cookies(cookies)
                .await
                .context("failed to inject session cookies")?;
        }

        let inflight = Arc::new(AtomicI64::new(0));
        Self::wire_network_events(&page, interceptor, inflight.clone()).await?;

        Ok(Self {
            browser,
            page,
            inflight,
        })
    }

    async fn wire_network_events(
        page: &Page,
        interceptor: Arc<RequestInterceptor>,
        inflight: Arc<AtomicI64>,
    ) -> Result<()> {
        let pending: PendingResponses = Arc::new(DashMap::new());

        let mut requests = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .context("failed to listen for requests")?;
        let mut responses = page
            .event_listener::<EventResponseReceived>()
            .await
            .context("failed to listen for responses")?;
        let mut finished = page
            .event_listener::<EventLoadingFinished>()
            .await
            .context("failed to listen for loading-finished")?;
        let mut failed = page
            .event_listener::<EventLoadingFailed>()
            .await
            .context("failed to listen for loading-failed")?;

        {
            let pending = pending.clone();
            let inflight = inflight.clone();
            tokio::spawn(async move {
                while let Some(event) = requests.next().await {
                    inflight.fetch_add(1, Ordering::Relaxed);
                    let handle = ObservedRequest::unresolved_response();
                    pending.insert(
                        event.request_id.inner().to_string(),
                        (handle.clone(), Instant::now()),
                    );
                    interceptor.observe(ObservedRequest {
                        method: event.request.method.clone(),
                        url: event.request.url.clone(),
                        headers: header_map(&event.request.headers),
                        body: post_data_bytes(&event.request),
                        response: handle,
                    });
                }
            });
        }

        {
            let pending = pending.clone();
            tokio::spawn(async move {
                while let Some(event) = responses.next().await {
                    let id = event.request_id.inner().to_string();
                    if let Some((_, (handle, started))) = pending.remove(&id) {
                        *handle.lock() = Some(ResponseInfo {
                            status: event.response.status as u16,
                            latency_ms: started.elapsed().as_millis() as u64,
                        });
                    }
                }
            });
        }

        {
            let inflight = inflight.clone();
            tokio::spawn(async move {
                while let Some(_event) = finished.next().await {
                    inflight.fetch_sub(1, Ordering::Relaxed);
                }
            });
        }

        tokio::spawn(async move {
            while let Some(_event) = failed.next().await {
                inflight.fetch_sub(1, Ordering::Relaxed);
            }
        });

        Ok(())
    }

    /// Close the browser process. Best-effort; the crawl is already done.
    pub async fn close(mut self) -> Result<()> {
        self.browser.close().await.context("failed to close browser")?;
        let _ = self.browser.wait().await;
        Ok(())
    }
}

#[async_trait]
impl BrowsingSession for ChromeSession {
    async fn navigate(&self, url: &str, quiescence_timeout: Duration) -> Result<()> {
        // Requests from the previous page are cancelled by the navigation;
        // stale decrements would only push the counter negative, which polls
        // as settled.
        self.inflight.store(0, Ordering::Relaxed);

        let deadline = Instant::now() + quiescence_timeout;
        tokio::time::timeout(quiescence_timeout, self.page.goto(url))
            .await
            .map_err(|_| anyhow!("navigation timed out: {url}"))?
            .context("navigation failed")?;

        let remaining = deadline.saturating_duration_since(Instant::now());
        let _ = tokio::time::timeout(remaining, self.page.wait_for_navigation()).await;

        // Poll for network quiescence; on expiry assume settled.
        loop {
            if self.inflight.load(Ordering::Relaxed) <= 0 {
                break;
            }
            if Instant::now() >= deadline {
                tracing::debug!(url = %url, "network quiescence timeout, assuming settled");
                break;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        self.page
            .url()
            .await
            .context("failed to read page url")?
            .ok_or_else(|| anyhow!("page has no url"))
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle>>> {
        let elements = self
            .page
            .find_elements(selector)
            .await
            .with_context(|| format!("query failed for selector {selector}"))?;
        Ok(elements
            .into_iter()
            .map(|inner| Box::new(ChromeElement { inner }) as Box<dyn ElementHandle>)
            .collect())
    }
}

struct ChromeElement {
    inner: Element,
}

impl ChromeElement {
    async fn eval_bool(&self, js: &str) -> Result<bool> {
        let ret = self
            .inner
            .call_js_fn(js, false)
            .await
            .context("element js evaluation failed")?;
        Ok(ret
            .result
            .value
            .as_ref()
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }
}

#[async_trait]
impl ElementHandle for ChromeElement {
    async fn is_visible(&self) -> Result<bool> {
        self.eval_bool(
            "function() { \
                const rect = this.getBoundingClientRect(); \
                const style = window.getComputedStyle(this); \
                return rect.width > 0 && rect.height > 0 \
                    && style.visibility !== 'hidden' && style.display !== 'none'; \
            }",
        )
        .await
    }

    async fn is_enabled(&self) -> Result<bool> {
        self.eval_bool("function() { return !this.disabled; }").await
    }

    async fn tag_name(&self) -> Result<String> {
        let ret = self
            .inner
            .call_js_fn("function() { return this.tagName.toLowerCase(); }", false)
            .await
            .context("failed to read tag name")?;
        Ok(ret
            .result
            .value
            .as_ref()
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string())
    }

    async fn text_content(&self) -> Result<Option<String>> {
        self.inner.inner_text().await.context("failed to read element text")
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>> {
        self.inner
            .attribute(name)
            .await
            .with_context(|| format!("failed to read attribute {name}"))
    }

    async fn click(&self, timeout: Duration) -> Result<()> {
        tokio::time::timeout(timeout, self.inner.click())
            .await
            .map_err(|_| anyhow!("click timed out"))?
            .context("click failed")?;
        Ok(())
    }
}

fn session_cookies(config: &RunConfig) -> Result<Vec<CookieParam>> {
    let start = config
        .start_urls
        .first()
        .ok_or_else(|| anyhow!("cookies configured but no start urls to derive a domain from"))?;
    let domain = Url::parse(start)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .ok_or_else(|| anyhow!("cannot derive cookie domain from start url {start}"))?;

    config
        .cookies
        .iter()
        .map(|(name, value)| {
            CookieParam::builder()
                .name(name.as_str())
                .value(value.as_str())
                .domain(domain.clone())
                .path("/")
                .build()
                .map_err(|e| anyhow!("invalid cookie {name}: {e}"))
        })
        .collect()
}

/// Reassemble the request body bytes from the CDP post-data entries, if any.
fn post_data_bytes(request: &Request) -> Option<Vec<u8>> {
    let entries = request.post_data_entries.as_ref()?;
    let mut bytes = Vec::new();
    for entry in entries {
        if let Some(chunk) = &entry.bytes {
            bytes.extend_from_slice(AsRef::<[u8]>::as_ref(chunk));
        }
    }
    Some(bytes)
}

/// CDP reports headers as a JSON object; flatten to an owned map.
fn header_map(headers: &Headers) -> HashMap<String, String> {
    serde_json::to_value(headers)
        .ok()
        .and_then(|v| v.as_object().cloned())
        .map(|obj| {
            obj.into_iter()
                .map(|(k, v)| {
                    let value = v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string());
                    (k, value)
                })
                .collect()
        })
        .unwrap_or_default()
}
