use crate::scraper::{Locator, ScrapeError, SoldListingsScraper, WorkflowState};
use crate::tests::utils::{
    community_page, detail_page, sold_section, test_config, unit_url, FakePage, COMMUNITY,
};

fn past_sales() -> Locator {
    Locator::css("a").with_text("Past Sales")
}

fn site(units: &[u32]) -> FakePage {
    let mut page = FakePage::new()
        .with_page(COMMUNITY, community_page(true))
        .with_overlay(
            Locator::css("[class*='cookie']"),
            Locator::css("[class*='cookie'] button").with_text("Accept"),
        )
        .with_reveal(past_sales(), sold_section(units));
    for n in units {
        page = page.with_page(
            unit_url(*n),
            detail_page(
                Some(&format!("{n} Mesquite Avenue, Palm Springs, CA")),
                Some("Sarah Johnson, Desert Realty Group"),
            ),
        );
    }
    page
}

#[tokio::test]
async fn full_run_collects_every_listing_in_page_order() {
    let config = test_config();
    let page = site(&[1, 2, 3]);

    let outcome = SoldListingsScraper::new(&page, &config).run().await;

    assert!(outcome.succeeded(), "{:?}", outcome.failure);
    assert_eq!(outcome.final_state, WorkflowState::Done);
    assert!(outcome.listing_errors.is_empty());
    assert_eq!(outcome.found, 3);
    assert_eq!(outcome.visited, 3);

    // Duplicate link and the landing page are dropped.
    let urls: Vec<_> = outcome.listings.iter().map(|l| l.url.clone()).collect();
    assert_eq!(urls, vec![unit_url(1), unit_url(2), unit_url(3)]);

    let first = &outcome.listings[0];
    assert_eq!(first.address, "1 Mesquite Avenue, Palm Springs, CA");
    assert_eq!(
        first.raw_attribution.as_deref(),
        Some("Sarah Johnson, Desert Realty Group")
    );
    let sale = first.sale.as_ref().expect("row summary");
    assert_eq!(sale.list_price, Some(401_000));
    assert_eq!(sale.sold_price, Some(391_000));
    assert_eq!((sale.beds, sale.baths), (Some(2), Some(2.0)));
}

#[tokio::test]
async fn page_that_never_becomes_ready_times_out_after_retries() {
    let mut config = test_config();
    config.retry.max_attempts = 2;
    let page = FakePage::new().never_ready(COMMUNITY);

    let outcome = SoldListingsScraper::new(&page, &config).run().await;

    assert_eq!(outcome.final_state, WorkflowState::Failed);
    match outcome.failure {
        Some(ScrapeError::PageLoadTimeout { url, attempts, .. }) => {
            assert_eq!(url, COMMUNITY);
            assert_eq!(attempts, 2);
        }
        other => panic!("expected PageLoadTimeout, got {other:?}"),
    }
    assert_eq!(page.navigations().len(), 2);
    assert!(outcome.listings.is_empty());
}

#[tokio::test]
async fn page_that_is_slow_once_loads_on_the_next_attempt() {
    let config = test_config();
    let page = site(&[1]).slow_to_load(COMMUNITY, 1);

    let outcome = SoldListingsScraper::new(&page, &config).run().await;

    assert!(outcome.succeeded(), "{:?}", outcome.failure);
    assert_eq!(outcome.final_state, WorkflowState::Done);
    let community_loads = page.navigations().iter().filter(|u| *u == COMMUNITY).count();
    assert_eq!(community_loads, 2);
    assert_eq!(outcome.listings.len(), 1);
}

#[tokio::test]
async fn navigation_that_keeps_failing_is_a_page_load_timeout() {
    let config = test_config();
    // No fixture for the community page: every navigation errors.
    let page = FakePage::new();

    let outcome = SoldListingsScraper::new(&page, &config).run().await;

    assert_eq!(outcome.final_state, WorkflowState::Failed);
    match &outcome.failure {
        Some(ScrapeError::PageLoadTimeout {
            url,
            attempts,
            reason,
            ..
        }) => {
            assert_eq!(url, COMMUNITY);
            assert_eq!(*attempts, 3);
            assert!(reason.contains("ERR_NAME_NOT_RESOLVED"), "{reason}");
        }
        other => panic!("expected PageLoadTimeout, got {other:?}"),
    }
    assert_eq!(
        outcome.failure.as_ref().map(|e| e.kind()),
        Some("page_load_timeout")
    );
    assert_eq!(page.navigations().len(), 3);
}

#[tokio::test]
async fn missing_sold_control_is_a_structural_mismatch_without_clicking() {
    let config = test_config();
    let html = "<html><body><h1>Mesquite Country Club</h1><a href=\"/contact\">Contact</a></body></html>";
    let page = FakePage::new().with_page(COMMUNITY, html);

    let outcome = SoldListingsScraper::new(&page, &config).run().await;

    match &outcome.failure {
        Some(ScrapeError::StructuralMismatch { expected, url }) => {
            assert!(expected.contains("Past Sales"));
            assert_eq!(url, COMMUNITY);
        }
        other => panic!("expected StructuralMismatch, got {other:?}"),
    }
    assert!(page.clicks().is_empty());
    // Structural problems are not retried.
    assert_eq!(page.navigations().len(), 1);
}

#[tokio::test]
async fn click_that_stays_intercepted_ends_in_element_blocked() {
    let config = test_config();
    let page = site(&[1]).with_interceptor("div.sticky-header");

    let outcome = SoldListingsScraper::new(&page, &config).run().await;

    match &outcome.failure {
        Some(ScrapeError::ElementBlocked {
            target,
            blocker,
            attempts,
        }) => {
            assert_eq!(target, &past_sales().to_string());
            assert_eq!(blocker, "div.sticky-header");
            assert_eq!(*attempts, 3);
        }
        other => panic!("expected ElementBlocked, got {other:?}"),
    }
    let target_clicks = page.clicks().iter().filter(|c| **c == past_sales()).count();
    assert_eq!(target_clicks, 3);
    assert_eq!(outcome.final_state, WorkflowState::Failed);
}

#[tokio::test]
async fn click_intercepted_once_goes_through_on_the_second_attempt() {
    let config = test_config();
    let page = site(&[1, 2]).with_interceptor_for("div.sticky-header", 1);

    let outcome = SoldListingsScraper::new(&page, &config).run().await;

    assert!(outcome.succeeded(), "{:?}", outcome.failure);
    assert_eq!(outcome.final_state, WorkflowState::Done);
    let target_clicks = page.clicks().iter().filter(|c| **c == past_sales()).count();
    assert_eq!(target_clicks, 2);
    assert_eq!(outcome.listings.len(), 2);
}

#[tokio::test]
async fn persistent_overlay_stops_the_run_before_any_target_click() {
    let config = test_config();
    let page = FakePage::new()
        .with_page(COMMUNITY, community_page(true))
        .with_persistent_overlay(Locator::css("[class*='cookie']"))
        .with_reveal(past_sales(), sold_section(&[1]));

    let outcome = SoldListingsScraper::new(&page, &config).run().await;

    assert!(matches!(
        outcome.failure,
        Some(ScrapeError::OverlayPersistent { .. })
    ));
    assert!(!page.clicks().contains(&past_sales()));
}

#[tokio::test]
async fn sold_section_that_never_appears_is_a_structural_mismatch() {
    let config = test_config();
    let page = FakePage::new().with_page(COMMUNITY, community_page(false));

    let outcome = SoldListingsScraper::new(&page, &config).run().await;

    match &outcome.failure {
        Some(ScrapeError::StructuralMismatch { expected, .. }) => {
            assert_eq!(expected, "#properties-sold");
        }
        other => panic!("expected StructuralMismatch, got {other:?}"),
    }
    assert_eq!(page.clicks(), vec![past_sales()]);
}

#[tokio::test]
async fn empty_sold_section_is_a_valid_run() {
    let config = test_config();
    let page = FakePage::new()
        .with_page(COMMUNITY, community_page(false))
        .with_reveal(past_sales(), r#"<section id="properties-sold"><p>No recent sales</p></section>"#);

    let outcome = SoldListingsScraper::new(&page, &config).run().await;

    assert!(outcome.succeeded());
    assert_eq!(outcome.final_state, WorkflowState::Done);
    assert!(outcome.listings.is_empty());
}
