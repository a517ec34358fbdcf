// browser.rs
//! The page seam the workflow drives, and its Chromium implementation.

use crate::config::ScraperConfig;
use crate::scraper::BrowserError;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::Page;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Finds an element: a CSS selector, optionally narrowed to elements whose
/// text contains a fragment ("a" containing "Past Sales").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    pub css: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Locator {
    pub fn css(css: impl Into<String>) -> Self {
        Self {
            css: css.into(),
            text: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// JS expression evaluating to every matching element, as an array.
    fn js_all(&self) -> String {
        let css = js_string(&self.css);
        match &self.text {
            Some(text) => format!(
                "Array.from(document.querySelectorAll({css})).filter(el => (el.textContent || '').includes({}))",
                js_string(text)
            ),
            None => format!("Array.from(document.querySelectorAll({css}))"),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.text {
            Some(text) => write!(f, "{} containing \"{}\"", self.css, text),
            None => write!(f, "{}", self.css),
        }
    }
}

fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// Result of trying to click an element through the real hit-test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    Clicked,
    /// Another element sits on top of the target's centre point.
    Intercepted { blocker: String },
    Missing,
}

/// Everything the workflow needs from a browser tab.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError>;

    /// True once `document.readyState` is "complete".
    async fn document_ready(&self) -> Result<bool, BrowserError>;

    async fn exists(&self, locator: &Locator) -> Result<bool, BrowserError>;

    /// True if any matching element is rendered and not hidden.
    async fn is_visible(&self, locator: &Locator) -> Result<bool, BrowserError>;

    async fn click(&self, locator: &Locator) -> Result<ClickOutcome, BrowserError>;

    /// Hides every matching element, returning how many were hidden.
    async fn hide(&self, locator: &Locator) -> Result<usize, BrowserError>;

    async fn html(&self) -> Result<String, BrowserError>;

    async fn current_url(&self) -> Result<String, BrowserError>;
}

/// A launched Chromium with a single working tab.
pub struct ChromeSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
}

impl ChromeSession {
    pub async fn launch(config: &ScraperConfig) -> Result<Self, BrowserError> {
        let mut builder = BrowserConfig::builder()
            .window_size(config.viewport_width, config.viewport_height)
            .viewport(Viewport {
                width: config.viewport_width,
                height: config.viewport_height,
                device_scale_factor: None,
                emulating_mobile: false,
                is_landscape: false,
                has_touch: false,
            })
            .request_timeout(config.page_load_timeout())
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu");

        if !config.headless {
            builder = builder.with_head();
        }

        let browser_config = builder.build().map_err(BrowserError::Launch)?;

        info!(
            headless = config.headless,
            width = config.viewport_width,
            height = config.viewport_height,
            "launching browser"
        );
        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("browser handler event error: {e}");
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler_task.abort();
                return Err(BrowserError::Launch(e.to_string()));
            }
        };

        Ok(Self {
            browser,
            page,
            handler_task,
        })
    }

    /// Closes the browser and stops the event handler.
    pub async fn close(mut self) {
        info!("closing browser session");
        if let Err(e) = self.browser.close().await {
            warn!("browser close failed: {e}");
        }
        let _ = self.browser.wait().await;
        self.handler_task.abort();
    }

    async fn eval<T: serde::de::DeserializeOwned>(&self, js: String) -> Result<T, BrowserError> {
        self.page
            .evaluate(js)
            .await
            .map_err(|e| BrowserError::Script(e.to_string()))?
            .into_value::<T>()
            .map_err(|e| BrowserError::Protocol(e.to_string()))
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        // chromiumoxide kills the child process when `Browser` drops.
        self.handler_task.abort();
    }
}

#[derive(Deserialize)]
struct ClickReply {
    status: String,
    #[serde(default)]
    blocker: Option<String>,
}

#[async_trait]
impl PageDriver for ChromeSession {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        self.page
            .goto(url.to_string())
            .await
            .map_err(|e| BrowserError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn document_ready(&self) -> Result<bool, BrowserError> {
        let state: String = self.eval("document.readyState".to_string()).await?;
        Ok(state == "complete")
    }

    async fn exists(&self, locator: &Locator) -> Result<bool, BrowserError> {
        self.eval(format!("({}).length > 0", locator.js_all())).await
    }

    async fn is_visible(&self, locator: &Locator) -> Result<bool, BrowserError> {
        self.eval(format!(
            r#"({}).some(el => {{
                const style = window.getComputedStyle(el);
                return el.getClientRects().length > 0
                    && style.display !== 'none'
                    && style.visibility !== 'hidden'
                    && parseFloat(style.opacity || '1') > 0;
            }})"#,
            locator.js_all()
        ))
        .await
    }

    async fn click(&self, locator: &Locator) -> Result<ClickOutcome, BrowserError> {
        // Hit-test the centre point first: a plain el.click() would go through
        // even when a banner covers the element.
        let reply: ClickReply = self
            .eval(format!(
                r#"(() => {{
                    const el = ({})[0];
                    if (!el) return {{ status: 'missing' }};
                    el.scrollIntoView({{ block: 'center', inline: 'center' }});
                    const r = el.getBoundingClientRect();
                    const hit = document.elementFromPoint(r.left + r.width / 2, r.top + r.height / 2);
                    if (hit && hit !== el && !el.contains(hit)) {{
                        const cls = (typeof hit.className === 'string' && hit.className) ? '.' + hit.className.trim().split(/\s+/).join('.') : '';
                        const id = hit.id ? '#' + hit.id : '';
                        return {{ status: 'intercepted', blocker: hit.tagName.toLowerCase() + id + cls }};
                    }}
                    el.click();
                    return {{ status: 'clicked' }};
                }})()"#,
                locator.js_all()
            ))
            .await?;

        Ok(match reply.status.as_str() {
            "clicked" => ClickOutcome::Clicked,
            "intercepted" => ClickOutcome::Intercepted {
                blocker: reply.blocker.unwrap_or_else(|| "unknown element".to_string()),
            },
            _ => ClickOutcome::Missing,
        })
    }

    async fn hide(&self, locator: &Locator) -> Result<usize, BrowserError> {
        self.eval(format!(
            "(() => {{ const els = {}; els.forEach(el => el.style.setProperty('display', 'none', 'important')); return els.length; }})()",
            locator.js_all()
        ))
        .await
    }

    async fn html(&self) -> Result<String, BrowserError> {
        self.page
            .content()
            .await
            .map_err(|e| BrowserError::Protocol(e.to_string()))
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        Ok(self
            .page
            .url()
            .await
            .map_err(|e| BrowserError::Protocol(e.to_string()))?
            .unwrap_or_default())
    }
}
