// extract.rs
//! Reading listing data out of page snapshots. Pure functions over HTML so
//! the lookups can be tested without a browser.

use crate::domain::listing::{PropertyListing, SaleSummary};
use crate::scraper::Locator;
use chrono::NaiveDate;
use indexmap::IndexSet;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use url::Url;

static DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4}-\d{2}-\d{2})\b").expect("valid date regex"));
static PRICE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$(\d{1,3}(?:,\d{3})*)").expect("valid price regex"));
static BEDS_BATHS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d+)\s*/\s*(\d+(?:\.\d+)?)\b").expect("valid beds/baths regex")
});

/// How far up from a listing link we look for its table row.
const MAX_ROW_DEPTH: usize = 5;

/// Prices at or above this are totals, below are per-sqft figures.
const PER_SQFT_CEILING: i64 = 1000;

/// Collects the listing links inside the sold section, in page order,
/// deduplicated by absolute URL. `None` if the section is not in the page.
pub fn enumerate_listings(
    html: &str,
    section: &Locator,
    link_selector: &str,
    base_url: &Url,
) -> Option<Vec<PropertyListing>> {
    let document = Html::parse_document(html);
    let section_el = find_first(&document, section)?;
    let links = Selector::parse(link_selector).ok()?;

    let landing = without_fragment(base_url);
    let mut seen = IndexSet::new();
    let mut listings = Vec::new();

    for link in section_el.select(&links) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let Ok(url) = base_url.join(href.trim()) else {
            continue;
        };
        let url = without_fragment(&url);
        if url.trim_end_matches('/') == landing.trim_end_matches('/') {
            continue;
        }
        if !seen.insert(url.clone()) {
            continue;
        }

        let mut listing = PropertyListing::discovered(url, collapse_whitespace(&element_text(&link)));
        listing.sale = row_summary(&link).filter(|s| !s.is_empty());
        listings.push(listing);
    }

    Some(listings)
}

/// First non-empty text among the address selectors, tried in order.
pub fn extract_address(html: &str, selectors: &[String]) -> Option<String> {
    let document = Html::parse_document(html);
    selectors
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .find_map(|selector| {
            document
                .select(&selector)
                .map(|el| collapse_whitespace(&element_text(&el)))
                .find(|text| !text.is_empty())
        })
}

/// The attribution text following a "courtesy of" marker, or the text of a
/// courtesy-classed element. `None` when the page has neither.
pub fn extract_courtesy(html: &str, markers: &[String], selectors: &[String]) -> Option<String> {
    let document = Html::parse_document(html);
    let Ok(all) = Selector::parse("body *") else {
        return None;
    };

    for marker in markers {
        let marker_lc = marker.to_ascii_lowercase();
        let holder = document.select(&all).find(|el| {
            !matches!(el.value().name(), "script" | "style" | "noscript")
                && el
                    .children()
                    .filter_map(|c| c.value().as_text())
                    .any(|t| t.to_ascii_lowercase().contains(&marker_lc))
        });

        let Some(holder) = holder else {
            continue;
        };

        // The marker can live in its own label element with the names in a
        // sibling, so fall back to the parent's text.
        let candidates = std::iter::once(holder).chain(holder.parent().and_then(ElementRef::wrap));
        for el in candidates {
            if let Some(found) = text_after_marker(&collapse_whitespace(&element_text(&el)), &marker_lc) {
                return Some(found);
            }
        }
    }

    selectors
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .find_map(|selector| {
            document.select(&selector).find_map(|el| {
                let text = collapse_whitespace(&element_text(&el));
                markers
                    .iter()
                    .find_map(|m| text_after_marker(&text, &m.to_ascii_lowercase()))
                    .or_else(|| (!text.is_empty()).then_some(text))
            })
        })
}

/// Reads dates, prices and beds/baths out of a table row's text.
pub fn parse_sale_summary(text: &str) -> SaleSummary {
    let mut summary = SaleSummary::default();

    let dates: Vec<NaiveDate> = DATE
        .captures_iter(text)
        .filter_map(|c| NaiveDate::parse_from_str(&c[1], "%Y-%m-%d").ok())
        .collect();
    summary.list_date = dates.first().copied();
    summary.sold_date = dates.get(1).copied();

    let prices: Vec<i64> = PRICE
        .captures_iter(text)
        .filter_map(|c| c[1].replace(',', "").parse().ok())
        .collect();

    if prices.len() >= 4 {
        summary.list_price = Some(prices[0]);
        summary.list_price_per_sqft = Some(prices[1]);
        summary.sold_price = Some(prices[2]);
        summary.sold_price_per_sqft = Some(prices[3]);
    } else if prices.len() >= 2 {
        summary.list_price = prices.first().copied();
        summary.sold_price = prices.last().copied();
        for price in &prices[1..prices.len() - 1] {
            if *price < PER_SQFT_CEILING {
                if summary.list_price_per_sqft.is_none() {
                    summary.list_price_per_sqft = Some(*price);
                } else if summary.sold_price_per_sqft.is_none() {
                    summary.sold_price_per_sqft = Some(*price);
                }
            }
        }
    }

    if let Some(c) = BEDS_BATHS.captures(text) {
        summary.beds = c[1].parse().ok();
        summary.baths = c[2].parse().ok();
    }

    summary
}

fn row_summary(link: &ElementRef<'_>) -> Option<SaleSummary> {
    let anchor = Selector::parse("a").ok()?;
    for el in link.ancestors().filter_map(ElementRef::wrap).take(MAX_ROW_DEPTH) {
        // Past the row once the ancestor holds other links too.
        if el.select(&anchor).nth(1).is_some() {
            return None;
        }
        let text = collapse_whitespace(&element_text(&el));
        if text.contains('$') && DATE.is_match(&text) {
            return Some(parse_sale_summary(&text));
        }
    }
    None
}

fn find_first<'a>(document: &'a Html, locator: &Locator) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(&locator.css).ok()?;
    document.select(&selector).find(|el| match &locator.text {
        Some(text) => element_text(el).contains(text.as_str()),
        None => true,
    })
}

/// True if the locator matches an element of the snapshot.
#[cfg(test)]
pub fn locator_matches(html: &str, locator: &Locator) -> bool {
    let document = Html::parse_document(html);
    find_first(&document, locator).is_some()
}

fn text_after_marker(text: &str, marker_lc: &str) -> Option<String> {
    // ASCII lowercasing keeps byte offsets aligned with `text`.
    let idx = text.to_ascii_lowercase().rfind(marker_lc)?;
    let after = text[idx + marker_lc.len()..]
        .trim_start_matches([':', ' '])
        .trim();
    (!after.is_empty()).then(|| after.to_string())
}

fn element_text(el: &ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn without_fragment(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.to_string()
}
