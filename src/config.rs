use crate::errors::AppError;
use crate::scraper::overlay::{default_signatures, OverlaySignature};
use crate::scraper::Locator;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

const BASE_URL: &str = "https://www.pscondos.com/palm-springs/mesquite-country-club/";

/// Everything the workflow reads at startup. Loaded once from TOML; every
/// key has a default, so an absent file means "scrape the default community".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    /// Community page holding the "Past Sales" section.
    #[serde(default = "default_target_url")]
    pub target_url: String,
    #[serde(default = "default_page_load_timeout")]
    pub page_load_timeout_secs: u64,
    /// Bound on waiting for a control or section to appear.
    #[serde(default = "default_element_timeout")]
    pub element_timeout_secs: u64,
    #[serde(default)]
    pub headless: bool,
    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,
    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,
    /// Extra readiness signal on top of `document.readyState`.
    #[serde(default)]
    pub ready_selector: Option<Locator>,
    #[serde(default = "default_sold_section_control")]
    pub sold_section_control: Locator,
    #[serde(default = "default_sold_section")]
    pub sold_section: Locator,
    #[serde(default = "default_listing_link_selector")]
    pub listing_link_selector: String,
    /// Tried in order on the detail page.
    #[serde(default = "default_address_selectors")]
    pub address_selectors: Vec<String>,
    #[serde(default = "default_courtesy_markers")]
    pub courtesy_markers: Vec<String>,
    #[serde(default = "default_courtesy_selectors")]
    pub courtesy_selectors: Vec<String>,
    /// Pause between detail visits.
    #[serde(default = "default_visit_delay")]
    pub visit_delay_ms: u64,
    /// Checked between detail visits; `None` means no overall limit.
    #[serde(default)]
    pub run_timeout_secs: Option<u64>,
    /// SQLite file for run history; `None` disables it.
    #[serde(default)]
    pub history_db: Option<String>,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub overlay: OverlayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts for page loads and intercepted clicks.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff")]
    pub backoff_ms: u64,
    #[serde(default = "default_jitter")]
    pub jitter_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayConfig {
    /// Bound on one resolve call, dismiss attempts included.
    #[serde(default = "default_overlay_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Checked in order. Adding a banner type only needs a new entry here.
    #[serde(default = "default_signatures")]
    pub signatures: Vec<OverlaySignature>,
}

fn default_target_url() -> String {
    BASE_URL.to_string()
}
fn default_page_load_timeout() -> u64 {
    10
}
fn default_element_timeout() -> u64 {
    10
}
fn default_viewport_width() -> u32 {
    1200
}
fn default_viewport_height() -> u32 {
    800
}
fn default_sold_section_control() -> Locator {
    Locator::css("a").with_text("Past Sales")
}
fn default_sold_section() -> Locator {
    Locator::css("#properties-sold")
}
fn default_listing_link_selector() -> String {
    "a[href*='/mesquite-country-club/']".to_string()
}
fn default_address_selectors() -> Vec<String> {
    vec!["h1".to_string(), "[class*='address']".to_string()]
}
fn default_courtesy_markers() -> Vec<String> {
    vec![
        "Courtesy of:".to_string(),
        "Listing courtesy of".to_string(),
        "courtesy of".to_string(),
    ]
}
fn default_courtesy_selectors() -> Vec<String> {
    vec![
        "span[class*='courtesy']".to_string(),
        "div[class*='courtesy']".to_string(),
    ]
}
fn default_visit_delay() -> u64 {
    2000
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff() -> u64 {
    1000
}
fn default_jitter() -> u64 {
    500
}
fn default_overlay_timeout() -> u64 {
    5000
}
fn default_poll_interval() -> u64 {
    250
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff(),
            jitter_ms: default_jitter(),
        }
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_overlay_timeout(),
            poll_interval_ms: default_poll_interval(),
            signatures: default_signatures(),
        }
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            target_url: default_target_url(),
            page_load_timeout_secs: default_page_load_timeout(),
            element_timeout_secs: default_element_timeout(),
            headless: false,
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
            ready_selector: None,
            sold_section_control: default_sold_section_control(),
            sold_section: default_sold_section(),
            listing_link_selector: default_listing_link_selector(),
            address_selectors: default_address_selectors(),
            courtesy_markers: default_courtesy_markers(),
            courtesy_selectors: default_courtesy_selectors(),
            visit_delay_ms: default_visit_delay(),
            run_timeout_secs: None,
            history_db: None,
            retry: RetryConfig::default(),
            overlay: OverlayConfig::default(),
        }
    }
}

impl ScraperConfig {
    /// Reads the config file if it exists, otherwise starts from defaults.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let config = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            let config: ScraperConfig = toml::from_str(&raw)
                .map_err(|e| AppError::Config(format!("{}: {e}", path.display())))?;
            info!(path = %path.display(), "loaded config");
            config
        } else {
            info!(path = %path.display(), "config file not found, using defaults");
            ScraperConfig::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if url::Url::parse(&self.target_url).is_err() {
            return Err(AppError::Config(format!(
                "target_url is not a valid URL: {}",
                self.target_url
            )));
        }
        if self.page_load_timeout_secs == 0 || self.element_timeout_secs == 0 {
            return Err(AppError::Config("timeouts must be greater than zero".into()));
        }
        if self.viewport_width == 0 || self.viewport_height == 0 {
            return Err(AppError::Config("viewport dimensions must be non-zero".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(AppError::Config("retry.max_attempts must be at least 1".into()));
        }
        if self.overlay.timeout_ms == 0 || self.overlay.poll_interval_ms == 0 {
            return Err(AppError::Config(
                "overlay timeout and poll interval must be greater than zero".into(),
            ));
        }
        if self.listing_link_selector.trim().is_empty() {
            return Err(AppError::Config("listing_link_selector is empty".into()));
        }

        let selectors = [
            &self.listing_link_selector,
            &self.sold_section.css,
            &self.sold_section_control.css,
        ]
        .into_iter()
        .chain(&self.address_selectors)
        .chain(&self.courtesy_selectors);
        for css in selectors {
            ::scraper::Selector::parse(css)
                .map_err(|e| AppError::Config(format!("invalid selector '{css}': {e}")))?;
        }
        Ok(())
    }

    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.page_load_timeout_secs)
    }

    pub fn element_timeout(&self) -> Duration {
        Duration::from_secs(self.element_timeout_secs)
    }

    pub fn visit_delay(&self) -> Duration {
        Duration::from_millis(self.visit_delay_ms)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }
}
