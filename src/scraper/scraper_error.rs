use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Errors raised by the page driver itself (protocol, JS, launch).
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("JavaScript evaluation failed: {0}")]
    Script(String),

    #[error("browser protocol error: {0}")]
    Protocol(String),
}

/// Fatal workflow failures. Any of these ends the run; listings already
/// extracted are still handed back to the caller.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Covers both a page that never became ready and navigation that kept
    /// failing; `reason` carries the last attempt's error.
    #[error("page {url} not ready after {attempts} attempt(s) ({waited:?} each): {reason}")]
    PageLoadTimeout {
        url: String,
        attempts: u32,
        waited: Duration,
        reason: String,
    },

    #[error("overlay '{signature}' ({selector}) still visible after {waited:?}")]
    OverlayPersistent {
        signature: String,
        selector: String,
        waited: Duration,
    },

    #[error("click on {target} intercepted by {blocker} after {attempts} attempt(s)")]
    ElementBlocked {
        target: String,
        blocker: String,
        attempts: u32,
    },

    #[error("site structure changed: expected {expected} on {url}")]
    StructuralMismatch { expected: String, url: String },

    #[error("run cancelled before all listings were visited")]
    Cancelled,

    #[error("run timeout of {limit:?} reached before all listings were visited")]
    RunTimeout { limit: Duration },

    #[error(transparent)]
    Browser(#[from] BrowserError),
}

impl ScrapeError {
    /// Short machine-friendly tag, used for the history table and summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            ScrapeError::PageLoadTimeout { .. } => "page_load_timeout",
            ScrapeError::OverlayPersistent { .. } => "overlay_persistent",
            ScrapeError::ElementBlocked { .. } => "element_blocked",
            ScrapeError::StructuralMismatch { .. } => "structural_mismatch",
            ScrapeError::Cancelled => "cancelled",
            ScrapeError::RunTimeout { .. } => "run_timeout",
            ScrapeError::Browser(_) => "browser",
        }
    }
}

/// Non-fatal failure recorded against a single listing.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ListingVisitError {
    pub url: String,
    pub reason: String,
}
