use crate::domain::attribution::parse_listings;
use crate::domain::stats::AggregateStats;
use crate::scraper::models::{read_listings_json, write_listings_json};
use crate::scraper::{Locator, ScrapeError, SoldListingsScraper, WorkflowState};
use crate::tests::utils::{
    community_page, detail_page, sold_section, test_config, unit_url, FakePage, COMMUNITY,
};
use tokio_util::sync::CancellationToken;

fn community(units: &[u32]) -> FakePage {
    FakePage::new()
        .with_page(COMMUNITY, community_page(false))
        .with_reveal(Locator::css("a").with_text("Past Sales"), sold_section(units))
}

#[tokio::test]
async fn one_failed_visit_does_not_stop_later_listings() {
    let config = test_config();
    let page = community(&[1, 2, 3, 4])
        .with_page(unit_url(1), detail_page(Some("1 Mesquite Ave"), Some("Sarah Johnson, Desert Realty Group")))
        // No address element on unit 2; unit 3 is not reachable at all.
        .with_page(unit_url(2), detail_page(None, Some("Lisa Wong, Palm Springs Properties")))
        .with_page(unit_url(4), detail_page(Some("4 Mesquite Ave"), Some("Michael Chen, Palm Springs Properties")));

    let outcome = SoldListingsScraper::new(&page, &config).run().await;

    assert!(outcome.succeeded());
    assert_eq!(outcome.final_state, WorkflowState::Done);
    assert_eq!(outcome.found, 4);
    assert_eq!(outcome.visited, 4);

    let failed: Vec<_> = outcome.listing_errors.iter().map(|e| e.url.clone()).collect();
    assert_eq!(failed, vec![unit_url(2), unit_url(3)]);

    // Failed visits are reported as errors, not as listings without attribution.
    let kept: Vec<_> = outcome.listings.iter().map(|l| l.url.clone()).collect();
    assert_eq!(kept, vec![unit_url(1), unit_url(4)]);
    assert_eq!(
        outcome.listings[1].raw_attribution.as_deref(),
        Some("Michael Chen, Palm Springs Properties")
    );

    let stats = AggregateStats::from_parsed(&parse_listings(&outcome.listings));
    assert_eq!(stats.total_properties, 2);
    assert!(stats.missing.is_empty());
}

#[tokio::test]
async fn missing_courtesy_line_is_not_an_error() {
    let config = test_config();
    let page = community(&[7]).with_page(unit_url(7), detail_page(Some("7 Mesquite Ave"), None));

    let outcome = SoldListingsScraper::new(&page, &config).run().await;

    assert!(outcome.succeeded());
    assert!(outcome.listing_errors.is_empty());
    assert_eq!(outcome.listings[0].address, "7 Mesquite Ave");
    assert_eq!(outcome.listings[0].raw_attribution, None);
}

#[tokio::test]
async fn cancellation_between_visits_keeps_partial_results() {
    let config = test_config();
    let cancel = CancellationToken::new();
    let mut page = community(&[1, 2, 3]).cancel_on_visit(unit_url(2), cancel.clone());
    for n in [1, 2, 3] {
        page = page.with_page(
            unit_url(n),
            detail_page(Some(&format!("{n} Mesquite Ave")), Some("Sarah Johnson, Desert Realty Group")),
        );
    }

    let outcome = SoldListingsScraper::new(&page, &config)
        .with_cancel(cancel)
        .run()
        .await;

    assert!(matches!(outcome.failure, Some(ScrapeError::Cancelled)));
    assert_eq!(outcome.final_state, WorkflowState::Failed);
    assert_eq!(outcome.found, 3);
    assert_eq!(outcome.visited, 2);
    assert_eq!(outcome.listings.len(), 2);
    assert!(outcome.listings.iter().all(|l| l.has_attribution()));
    assert!(!page.navigations().contains(&unit_url(3)));
}

#[tokio::test]
async fn listings_never_reached_are_not_written_or_counted() {
    let config = test_config();
    let cancel = CancellationToken::new();
    let mut page = community(&[1, 2, 3, 4]).cancel_on_visit(unit_url(2), cancel.clone());
    for n in [1, 2, 3, 4] {
        page = page.with_page(
            unit_url(n),
            detail_page(Some(&format!("{n} Mesquite Ave")), Some("Sarah Johnson, Desert Realty Group")),
        );
    }

    let outcome = SoldListingsScraper::new(&page, &config)
        .with_cancel(cancel)
        .run()
        .await;
    assert!(matches!(outcome.failure, Some(ScrapeError::Cancelled)));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("listings.json");
    write_listings_json(&path, &outcome.listings).unwrap();
    let written = read_listings_json(&path).unwrap();
    let urls: Vec<_> = written.iter().map(|l| l.url.clone()).collect();
    assert_eq!(urls, vec![unit_url(1), unit_url(2)]);

    let stats = AggregateStats::from_parsed(&parse_listings(&written));
    assert_eq!(stats.total_properties, 2);
    assert_eq!(stats.properties_with_attribution, 2);
    assert!(stats.missing.is_empty());
}

#[tokio::test]
async fn run_timeout_is_checked_before_each_visit() {
    let mut config = test_config();
    config.run_timeout_secs = Some(0);
    let page = community(&[1, 2]);

    let outcome = SoldListingsScraper::new(&page, &config).run().await;

    assert!(matches!(outcome.failure, Some(ScrapeError::RunTimeout { .. })));
    assert_eq!(outcome.found, 2);
    assert_eq!(outcome.visited, 0);
    assert!(outcome.listings.is_empty());
}

#[tokio::test]
async fn scraped_listings_feed_the_aggregator() {
    let config = test_config();
    let page = community(&[1, 2, 3])
        .with_page(unit_url(1), detail_page(Some("1 Mesquite Ave"), Some("Sarah Johnson, Desert Realty Group")))
        .with_page(unit_url(2), detail_page(Some("2 Mesquite Ave"), Some("Michael Chen & Lisa Wong, Palm Springs Properties")))
        .with_page(unit_url(3), detail_page(Some("3 Mesquite Ave"), None));

    let outcome = SoldListingsScraper::new(&page, &config).run().await;
    let parsed = parse_listings(&outcome.listings);
    let stats = AggregateStats::from_parsed(&parsed);

    assert_eq!(stats.total_properties, 3);
    assert_eq!(stats.properties_with_attribution, 2);
    assert_eq!(stats.missing, vec![unit_url(3)]);

    let share: f64 = stats.realtor_ranking().iter().map(|r| r.share).sum();
    assert!((share - 100.0).abs() < 1e-9);
    assert_eq!(stats.company_counts["Palm Springs Properties"], 1);
}
