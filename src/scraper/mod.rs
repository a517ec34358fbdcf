pub mod browser;
pub mod extract;
pub mod models;
pub mod overlay;
mod scraper;
mod scraper_error;

pub use self::browser::{ChromeSession, ClickOutcome, Locator, PageDriver};
pub use self::overlay::OverlayResolver;
pub use self::scraper::{scrape_with_chrome, RunOutcome, WorkflowState};
#[cfg(test)]
pub use self::scraper::SoldListingsScraper;
pub use self::scraper_error::{BrowserError, ListingVisitError, ScrapeError};
