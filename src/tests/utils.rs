use crate::config::{OverlayConfig, RetryConfig, ScraperConfig};
use crate::db::connection::{init_db, Database};
use crate::scraper::extract::locator_matches;
use crate::scraper::overlay::default_signatures;
use crate::scraper::{BrowserError, ClickOutcome, Locator, PageDriver};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub const COMMUNITY: &str = "https://homes.example/palm-springs/mesquite-country-club/";

/// Initialize a fresh history DB in its own temp directory. Keep the
/// `TempDir` alive for as long as the database is used.
pub fn init_test_db() -> (TempDir, Database) {
    let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir failed: {e}"));
    let db = Database::new(dir.path().join("history.sqlite3").to_string_lossy().to_string());

    init_db(&db).unwrap_or_else(|e| panic!("Database initialization failed: {e}"));

    (dir, db)
}

/// Config with short timeouts and no delays, pointed at `COMMUNITY`.
pub fn test_config() -> ScraperConfig {
    ScraperConfig {
        target_url: COMMUNITY.to_string(),
        page_load_timeout_secs: 1,
        element_timeout_secs: 1,
        visit_delay_ms: 0,
        retry: RetryConfig {
            max_attempts: 3,
            backoff_ms: 0,
            jitter_ms: 0,
        },
        overlay: OverlayConfig {
            timeout_ms: 300,
            poll_interval_ms: 20,
            signatures: default_signatures(),
        },
        ..ScraperConfig::default()
    }
}

pub fn community_page(cookie_banner: bool) -> String {
    let banner = if cookie_banner {
        r#"<div class="cookie-banner">We use cookies. <button>Accept</button></div>"#
    } else {
        ""
    };
    format!(
        r##"<html><body>
            {banner}
            <nav><a href="/palm-springs/mesquite-country-club/">Mesquite Country Club</a></nav>
            <h1>Mesquite Country Club</h1>
            <a href="#past">Past Sales</a>
        </body></html>"##
    )
}

/// The table revealed by clicking "Past Sales". The first unit is linked a
/// second time and the landing page once; both must be skipped.
pub fn sold_section(units: &[u32]) -> String {
    let first = units.first().copied().unwrap_or(1);
    let rows: String = units
        .iter()
        .map(|n| {
            format!(
                r#"<tr><td><a href="/palm-springs/mesquite-country-club/unit-{n}/">{n} Mesquite Ave</a></td>
                   <td>2024-0{m}-01</td><td>2024-0{m}-20</td><td>$40{n},000</td><td>$39{n},000</td><td>2 / 2</td></tr>"#,
                m = (n % 9) + 1
            )
        })
        .collect();
    format!(
        r#"<section id="properties-sold"><table>
            {rows}
            <tr><td><a href="/palm-springs/mesquite-country-club/unit-{first}/#photos">duplicate</a></td></tr>
            <tr><td><a href="/palm-springs/mesquite-country-club/">back to community</a></td></tr>
        </table></section>"#
    )
}

pub fn unit_url(n: u32) -> String {
    format!("{COMMUNITY}unit-{n}/")
}

pub fn detail_page(address: Option<&str>, courtesy: Option<&str>) -> String {
    let heading = address.map(|a| format!("<h1>{a}</h1>")).unwrap_or_default();
    let courtesy = courtesy
        .map(|c| format!("<p class=\"listing-info\">Listing courtesy of: {c}</p>"))
        .unwrap_or_default();
    format!("<html><body>{heading}<div class=\"details\">2 beds</div>{courtesy}</body></html>")
}

/// In-memory stand-in for a browser tab. Pages are HTML fixtures keyed by
/// URL; element lookups run against the current snapshot.
#[derive(Default)]
pub struct FakePage {
    state: Mutex<FakeState>,
}

#[derive(Default)]
struct FakeState {
    pages: HashMap<String, String>,
    never_ready: HashSet<String>,
    /// Navigations to the key URL left before the page ever becomes ready.
    slow_loads: HashMap<String, usize>,
    current_url: String,
    html: String,
    ready: bool,
    /// Containers taken out of view.
    hidden: HashSet<Locator>,
    /// Overlays that block clicks on anything else while visible.
    overlays: Vec<Locator>,
    /// Overlays that come straight back when hidden.
    persistent: HashSet<Locator>,
    /// Clicking the key control hides the value container.
    dismissers: HashMap<Locator, Locator>,
    /// Clicking the key control appends the value to the page body.
    reveals: HashMap<Locator, String>,
    /// Invisible element on top of non-dismiss clicks.
    interceptor: Option<String>,
    /// Clicks the interceptor still swallows; `None` means all of them.
    interceptions_left: Option<usize>,
    cancel_on_visit: Option<(String, CancellationToken)>,
    clicks: Vec<Locator>,
    navigations: Vec<String>,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.edit(|s| {
            s.pages.insert(url.into(), html.into());
        })
    }

    pub fn never_ready(self, url: impl Into<String>) -> Self {
        self.edit(|s| {
            s.never_ready.insert(url.into());
        })
    }

    /// The first `attempts` navigations to `url` never get ready.
    pub fn slow_to_load(self, url: impl Into<String>, attempts: usize) -> Self {
        self.edit(|s| {
            s.slow_loads.insert(url.into(), attempts);
        })
    }

    pub fn with_overlay(self, container: Locator, dismiss: Locator) -> Self {
        self.edit(|s| {
            s.overlays.push(container.clone());
            s.dismissers.insert(dismiss, container);
        })
    }

    /// An overlay whose dismiss control does nothing and that survives hiding.
    pub fn with_persistent_overlay(self, container: Locator) -> Self {
        self.edit(|s| {
            s.overlays.push(container.clone());
            s.persistent.insert(container);
        })
    }

    pub fn with_reveal(self, control: Locator, html: impl Into<String>) -> Self {
        self.edit(|s| {
            s.reveals.insert(control, html.into());
        })
    }

    pub fn with_interceptor(self, blocker: impl Into<String>) -> Self {
        self.edit(|s| s.interceptor = Some(blocker.into()))
    }

    /// An interceptor that gets out of the way after `clicks` blocked clicks.
    pub fn with_interceptor_for(self, blocker: impl Into<String>, clicks: usize) -> Self {
        self.edit(|s| {
            s.interceptor = Some(blocker.into());
            s.interceptions_left = Some(clicks);
        })
    }

    pub fn cancel_on_visit(self, url: impl Into<String>, token: CancellationToken) -> Self {
        self.edit(|s| s.cancel_on_visit = Some((url.into(), token)))
    }

    pub fn clicks(&self) -> Vec<Locator> {
        self.lock().clicks.clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.lock().navigations.clone()
    }

    fn edit(self, f: impl FnOnce(&mut FakeState)) -> Self {
        f(&mut self.lock());
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl FakeState {
    fn visible(&self, locator: &Locator) -> bool {
        locator_matches(&self.html, locator) && !self.hidden.contains(locator)
    }

    fn blocking_overlay(&self) -> Option<&Locator> {
        self.overlays.iter().find(|o| self.visible(o))
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        let mut s = self.lock();
        s.navigations.push(url.to_string());

        if let Some((trigger, token)) = &s.cancel_on_visit {
            if trigger == url {
                token.cancel();
            }
        }

        let still_slow = match s.slow_loads.get_mut(url) {
            Some(left) if *left > 0 => {
                *left -= 1;
                true
            }
            _ => false,
        };

        if still_slow || s.never_ready.contains(url) {
            s.current_url = url.to_string();
            s.html = String::new();
            s.ready = false;
            return Ok(());
        }

        match s.pages.get(url).cloned() {
            Some(html) => {
                s.current_url = url.to_string();
                s.html = html;
                s.ready = true;
                Ok(())
            }
            None => Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: "net::ERR_NAME_NOT_RESOLVED".to_string(),
            }),
        }
    }

    async fn document_ready(&self) -> Result<bool, BrowserError> {
        Ok(self.lock().ready)
    }

    async fn exists(&self, locator: &Locator) -> Result<bool, BrowserError> {
        Ok(locator_matches(&self.lock().html, locator))
    }

    async fn is_visible(&self, locator: &Locator) -> Result<bool, BrowserError> {
        Ok(self.lock().visible(locator))
    }

    async fn click(&self, locator: &Locator) -> Result<ClickOutcome, BrowserError> {
        let mut s = self.lock();
        s.clicks.push(locator.clone());

        if !locator_matches(&s.html, locator) {
            return Ok(ClickOutcome::Missing);
        }

        if let Some(container) = s.dismissers.get(locator).cloned() {
            s.hidden.insert(container);
            return Ok(ClickOutcome::Clicked);
        }

        if let Some(overlay) = s.blocking_overlay() {
            return Ok(ClickOutcome::Intercepted {
                blocker: overlay.css.clone(),
            });
        }
        if let Some(blocker) = s.interceptor.clone() {
            match s.interceptions_left {
                Some(0) => {}
                Some(left) => {
                    s.interceptions_left = Some(left - 1);
                    return Ok(ClickOutcome::Intercepted { blocker });
                }
                None => return Ok(ClickOutcome::Intercepted { blocker }),
            }
        }

        if let Some(snippet) = s.reveals.get(locator).cloned() {
            s.html = s.html.replace("</body>", &format!("{snippet}</body>"));
        }
        Ok(ClickOutcome::Clicked)
    }

    async fn hide(&self, locator: &Locator) -> Result<usize, BrowserError> {
        let mut s = self.lock();
        if !locator_matches(&s.html, locator) {
            return Ok(0);
        }
        if !s.persistent.contains(locator) {
            s.hidden.insert(locator.clone());
        }
        Ok(1)
    }

    async fn html(&self) -> Result<String, BrowserError> {
        Ok(self.lock().html.clone())
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        Ok(self.lock().current_url.clone())
    }
}
