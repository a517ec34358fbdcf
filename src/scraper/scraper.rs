// scraper.rs
use crate::config::ScraperConfig;
use crate::domain::listing::PropertyListing;
use crate::scraper::extract::{enumerate_listings, extract_address, extract_courtesy};
use crate::scraper::{
    BrowserError, ChromeSession, ClickOutcome, ListingVisitError, Locator, OverlayResolver,
    PageDriver, ScrapeError,
};
use chrono::{DateTime, Utc};
use rand::Rng;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

/// How often waits re-check the page.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Idle,
    PageLoaded,
    OverlayClear,
    SoldSectionRevealed,
    ListingsEnumerated,
    VisitingDetail,
    Done,
    Failed,
}

/// What a run hands back, successful or not.
#[derive(Debug)]
pub struct RunOutcome {
    /// Listings whose detail page was read, in page order. Listings that
    /// failed are in `listing_errors`; ones never reached are left out.
    pub listings: Vec<PropertyListing>,
    pub listing_errors: Vec<ListingVisitError>,
    /// How many listings the sold section linked to.
    pub found: usize,
    /// Set when the run stopped early.
    pub failure: Option<ScrapeError>,
    pub final_state: WorkflowState,
    pub visited: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

struct RunProgress {
    state: WorkflowState,
    listings: Vec<PropertyListing>,
    errors: Vec<ListingVisitError>,
    found: usize,
    visited: usize,
}

impl RunProgress {
    fn transition(&mut self, next: WorkflowState) {
        info!(from = ?self.state, to = ?next, "workflow transition");
        self.state = next;
    }
}

pub struct SoldListingsScraper<'a, P: PageDriver + ?Sized> {
    page: &'a P,
    config: &'a ScraperConfig,
    overlays: OverlayResolver,
    cancel: CancellationToken,
}

impl<'a, P: PageDriver + ?Sized> SoldListingsScraper<'a, P> {
    pub fn new(page: &'a P, config: &'a ScraperConfig) -> Self {
        Self {
            page,
            config,
            overlays: OverlayResolver::from_config(&config.overlay),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Drives the whole workflow. Never returns early without the listings
    /// gathered so far: a fatal error is reported in `failure`.
    pub async fn run(&self) -> RunOutcome {
        let started_at = Utc::now();
        let mut progress = RunProgress {
            state: WorkflowState::Idle,
            listings: Vec::new(),
            errors: Vec::new(),
            found: 0,
            visited: 0,
        };

        let failure = match self.drive(&mut progress).await {
            Ok(()) => {
                progress.transition(WorkflowState::Done);
                None
            }
            Err(e) => {
                error!(kind = e.kind(), state = ?progress.state, "run failed: {e}");
                progress.transition(WorkflowState::Failed);
                Some(e)
            }
        };

        info!(
            found = progress.found,
            listings = progress.listings.len(),
            visited = progress.visited,
            listing_errors = progress.errors.len(),
            "run finished"
        );

        RunOutcome {
            listings: progress.listings,
            listing_errors: progress.errors,
            found: progress.found,
            failure,
            final_state: progress.state,
            visited: progress.visited,
            started_at,
            finished_at: Utc::now(),
        }
    }

    async fn drive(&self, progress: &mut RunProgress) -> Result<(), ScrapeError> {
        let run_deadline = self.config.run_timeout().map(|t| Instant::now() + t);
        let target = self.config.target_url.as_str();
        let target_url = Url::parse(target).map_err(|e| BrowserError::Navigation {
            url: target.to_string(),
            reason: e.to_string(),
        })?;

        // 1. Community page
        self.load_with_retry(target).await?;
        progress.transition(WorkflowState::PageLoaded);

        self.overlays.resolve(self.page).await?;
        progress.transition(WorkflowState::OverlayClear);

        // 2. Reveal "Past Sales"
        let control = &self.config.sold_section_control;
        if !self.wait_for(control, self.config.element_timeout()).await? {
            return Err(self.mismatch(control, target));
        }
        self.click_with_overlay_retry(control, target).await?;

        let section = &self.config.sold_section;
        if !self.wait_for(section, self.config.element_timeout()).await? {
            return Err(self.mismatch(section, target));
        }
        progress.transition(WorkflowState::SoldSectionRevealed);

        // 3. Enumerate
        let html = self.page.html().await?;
        let base = self.base_url(target_url).await;
        let listings = enumerate_listings(&html, section, &self.config.listing_link_selector, &base)
            .ok_or_else(|| self.mismatch(section, target))?;
        if listings.is_empty() {
            warn!("sold section is present but lists no properties");
        } else {
            info!(count = listings.len(), "sold listings enumerated");
        }
        progress.found = listings.len();
        progress.transition(WorkflowState::ListingsEnumerated);

        // 4. Detail pages, one at a time
        let total = listings.len();
        for (i, mut listing) in listings.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!(visited = progress.visited, total, "cancellation requested");
                return Err(ScrapeError::Cancelled);
            }
            if let (Some(deadline), Some(limit)) = (run_deadline, self.config.run_timeout()) {
                if Instant::now() >= deadline {
                    warn!(visited = progress.visited, total, "run timeout reached");
                    return Err(ScrapeError::RunTimeout { limit });
                }
            }

            if progress.state != WorkflowState::VisitingDetail {
                progress.transition(WorkflowState::VisitingDetail);
            }

            info!(index = i + 1, total, url = %listing.url, "visiting listing");
            let visited = self.visit(&listing.url).await;
            match visited {
                Ok((address, courtesy)) => {
                    listing.address = address;
                    listing.raw_attribution = courtesy;
                    if !listing.has_attribution() {
                        warn!(url = %listing.url, "no courtesy line found");
                    }
                    progress.listings.push(listing);
                }
                Err(e) => {
                    warn!(url = %listing.url, kind = e.kind(), "listing visit failed: {e}");
                    progress.errors.push(ListingVisitError {
                        url: listing.url,
                        reason: e.to_string(),
                    });
                }
            }
            progress.visited += 1;

            if i + 1 < total {
                self.pause(self.config.visit_delay()).await;
            }
        }

        Ok(())
    }

    /// Loads a detail page and pulls the address and raw courtesy line.
    async fn visit(&self, url: &str) -> Result<(String, Option<String>), ScrapeError> {
        self.load_with_retry(url).await?;
        let html = self.page.html().await?;

        let address = extract_address(&html, &self.config.address_selectors).ok_or_else(|| {
            ScrapeError::StructuralMismatch {
                expected: format!("address element ({})", self.config.address_selectors.join(", ")),
                url: url.to_string(),
            }
        })?;
        let courtesy = extract_courtesy(
            &html,
            &self.config.courtesy_markers,
            &self.config.courtesy_selectors,
        );
        debug!(url, address = %address, courtesy = ?courtesy, "detail extracted");

        Ok((address, courtesy))
    }

    /// Navigates and waits for readiness, retrying with backoff. Each attempt
    /// is bounded by the page-load timeout. Running out of attempts is a
    /// page-load timeout whether navigation errored or the page stayed busy.
    async fn load_with_retry(&self, url: &str) -> Result<(), ScrapeError> {
        let attempts = self.config.retry.max_attempts;
        let waited = self.config.page_load_timeout();
        let mut reason = String::new();

        for attempt in 1..=attempts {
            let start = Instant::now();
            match self.page.navigate(url).await {
                Ok(()) => {
                    if self.wait_ready(start + waited).await {
                        debug!(url, attempt, elapsed = ?start.elapsed(), "page ready");
                        return Ok(());
                    }
                    warn!(url, attempt, "page not ready within {waited:?}");
                    reason = "document never became ready".to_string();
                }
                Err(e) => {
                    warn!(url, attempt, "navigation failed: {e}");
                    reason = e.to_string();
                }
            }

            if attempt < attempts {
                self.backoff().await;
            }
        }

        Err(ScrapeError::PageLoadTimeout {
            url: url.to_string(),
            attempts,
            waited,
            reason,
        })
    }

    async fn wait_ready(&self, deadline: Instant) -> bool {
        loop {
            if self.is_ready().await {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn is_ready(&self) -> bool {
        // Script errors while a navigation is settling just mean "not yet".
        match self.page.document_ready().await {
            Ok(true) => {}
            Ok(false) => return false,
            Err(e) => {
                debug!("readiness check failed: {e}");
                return false;
            }
        }
        match &self.config.ready_selector {
            Some(locator) => self.page.exists(locator).await.unwrap_or(false),
            None => true,
        }
    }

    /// Polls until `locator` exists or `timeout` runs out.
    async fn wait_for(&self, locator: &Locator, timeout: Duration) -> Result<bool, ScrapeError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.page.exists(locator).await? {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                warn!(element = %locator, "element did not appear within {timeout:?}");
                return Ok(false);
            }
            sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    /// Clears overlays and clicks, going round again when something still
    /// intercepts the click.
    async fn click_with_overlay_retry(&self, target: &Locator, url: &str) -> Result<(), ScrapeError> {
        let attempts = self.config.retry.max_attempts;
        let mut blocker = String::new();

        for attempt in 1..=attempts {
            self.overlays.resolve(self.page).await?;

            match self.page.click(target).await? {
                ClickOutcome::Clicked => {
                    info!(element = %target, attempt, "clicked");
                    return Ok(());
                }
                ClickOutcome::Intercepted { blocker: by } => {
                    warn!(element = %target, attempt, blocker = %by, "click intercepted");
                    blocker = by;
                }
                ClickOutcome::Missing => return Err(self.mismatch(target, url)),
            }

            if attempt < attempts {
                self.backoff().await;
            }
        }

        Err(ScrapeError::ElementBlocked {
            target: target.to_string(),
            blocker,
            attempts,
        })
    }

    async fn backoff(&self) {
        let retry = &self.config.retry;
        let jitter = rand::thread_rng().gen_range(0..=retry.jitter_ms);
        self.pause(Duration::from_millis(retry.backoff_ms + jitter))
            .await;
    }

    /// Sleeps, waking early on cancellation.
    async fn pause(&self, duration: Duration) {
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = sleep(duration) => {}
        }
    }

    /// Links are resolved against where the browser actually ended up.
    async fn base_url(&self, fallback: Url) -> Url {
        match self.page.current_url().await {
            Ok(current) => Url::parse(&current).unwrap_or(fallback),
            Err(_) => fallback,
        }
    }

    fn mismatch(&self, expected: &Locator, url: &str) -> ScrapeError {
        ScrapeError::StructuralMismatch {
            expected: expected.to_string(),
            url: url.to_string(),
        }
    }
}

/// Launches Chromium, runs the workflow and closes the browser on every path.
pub async fn scrape_with_chrome(
    config: &ScraperConfig,
    cancel: CancellationToken,
) -> Result<RunOutcome, BrowserError> {
    let session = ChromeSession::launch(config).await?;
    let outcome = SoldListingsScraper::new(&session, config)
        .with_cancel(cancel)
        .run()
        .await;
    session.close().await;
    Ok(outcome)
}
