// overlay.rs
//! Dismissing banners that sit on top of the page and swallow clicks.

use crate::config::OverlayConfig;
use crate::scraper::{ClickOutcome, Locator, PageDriver, ScrapeError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// A known kind of overlay: how to spot it and, in order, what to try to get
/// rid of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlaySignature {
    pub name: String,
    pub container: Locator,
    #[serde(default)]
    pub actions: Vec<DismissAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DismissAction {
    /// Click an accept/close control.
    Click { control: Locator },
    /// Force the container out of the layout.
    Hide,
}

pub fn default_signatures() -> Vec<OverlaySignature> {
    let cookie = "[class*='cookie']";
    let click = |css: &str, text: Option<&str>| {
        let control = Locator::css(css);
        DismissAction::Click {
            control: match text {
                Some(t) => control.with_text(t),
                None => control,
            },
        }
    };

    vec![
        OverlaySignature {
            name: "cookie-banner".to_string(),
            container: Locator::css(cookie),
            actions: vec![
                click(&format!("{cookie} button"), Some("Accept")),
                click(&format!("{cookie} button"), Some("OK")),
                click(&format!("{cookie} button"), Some("Close")),
                click(&format!("{cookie} button.close"), None),
                click(&format!("{cookie} a"), Some("Accept")),
                click(&format!("{cookie} span"), Some("×")),
                click("[class*='cookie-footer'] button", None),
                click("[class*='cookie-footer'] a", None),
                click("button[class*='cookie']", None),
                click("a[class*='cookie']", None),
                DismissAction::Hide,
            ],
        },
        OverlaySignature {
            name: "consent-dialog".to_string(),
            container: Locator::css("[id*='consent'], [class*='consent']"),
            actions: vec![
                click("[id*='consent'] button, [class*='consent'] button", Some("Accept")),
                click("[id*='consent'] button, [class*='consent'] button", Some("Agree")),
                DismissAction::Hide,
            ],
        },
    ]
}

pub struct OverlayResolver {
    signatures: Vec<OverlaySignature>,
    timeout: Duration,
    poll_interval: Duration,
}

impl OverlayResolver {
    pub fn new(signatures: Vec<OverlaySignature>, timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            signatures,
            timeout,
            poll_interval,
        }
    }

    pub fn from_config(config: &OverlayConfig) -> Self {
        Self::new(
            config.signatures.clone(),
            Duration::from_millis(config.timeout_ms),
            Duration::from_millis(config.poll_interval_ms),
        )
    }

    /// Dismisses every visible overlay. `Ok(true)` if at least one was found
    /// and cleared, `Ok(false)` if none was showing.
    ///
    /// Fails with `OverlayPersistent` when an overlay is still visible once
    /// the timeout has elapsed; callers must not click in that case.
    pub async fn resolve<P: PageDriver + ?Sized>(&self, page: &P) -> Result<bool, ScrapeError> {
        let deadline = Instant::now() + self.timeout;
        let mut dismissed_any = false;

        for signature in &self.signatures {
            if !page.is_visible(&signature.container).await? {
                continue;
            }

            info!(overlay = %signature.name, "overlay detected");
            if self.dismiss(page, signature, deadline).await? {
                info!(overlay = %signature.name, "overlay dismissed");
                dismissed_any = true;
            } else {
                warn!(overlay = %signature.name, selector = %signature.container, "overlay persists");
                return Err(ScrapeError::OverlayPersistent {
                    signature: signature.name.clone(),
                    selector: signature.container.to_string(),
                    waited: self.timeout,
                });
            }
        }

        Ok(dismissed_any)
    }

    async fn dismiss<P: PageDriver + ?Sized>(
        &self,
        page: &P,
        signature: &OverlaySignature,
        deadline: Instant,
    ) -> Result<bool, ScrapeError> {
        // Each action gets a slice of the budget to take effect.
        let settle = (self.timeout / 4).max(self.poll_interval);

        for action in &signature.actions {
            if Instant::now() >= deadline {
                break;
            }

            let acted = match action {
                DismissAction::Click { control } => match page.click(control).await? {
                    ClickOutcome::Clicked => true,
                    outcome => {
                        debug!(overlay = %signature.name, control = %control, ?outcome, "dismiss control not usable");
                        false
                    }
                },
                DismissAction::Hide => page.hide(&signature.container).await? > 0,
            };
            if !acted {
                continue;
            }

            let step_deadline = (Instant::now() + settle).min(deadline);
            if self.wait_hidden(page, &signature.container, step_deadline).await? {
                return Ok(true);
            }
        }

        // Nothing left to try; give a slow animation the rest of the budget.
        self.wait_hidden(page, &signature.container, deadline).await
    }

    async fn wait_hidden<P: PageDriver + ?Sized>(
        &self,
        page: &P,
        container: &Locator,
        deadline: Instant,
    ) -> Result<bool, ScrapeError> {
        loop {
            if !page.is_visible(container).await? {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}
