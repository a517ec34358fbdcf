// report.rs
//! Plain-text report over one run's listings and their parsed attributions.

use crate::domain::attribution::ParsedAttribution;
use crate::domain::listing::PropertyListing;
use crate::domain::stats::{AggregateStats, RankedEntry};
use crate::errors::AppError;
use crate::scraper::ListingVisitError;
use chrono::{Datelike, NaiveDate};
use indexmap::IndexMap;
use std::fmt::Write;
use std::path::Path;

const RULE_WIDTH: usize = 80;
const TOP_N: usize = 10;
const SHARE_TOP_N: usize = 5;
const RECENT_MONTHS: usize = 6;
const MISSING_PREVIEW: usize = 5;

pub struct Report<'a> {
    pub title: &'a str,
    pub listings: &'a [PropertyListing],
    pub parsed: &'a [ParsedAttribution],
    pub stats: &'a AggregateStats,
    pub visit_errors: &'a [ListingVisitError],
}

impl<'a> Report<'a> {
    /// The console summary: overview, prices, mix, rankings, market share.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        self.write_summary(&mut out);
        out
    }

    /// Summary plus manual-review items and the complete ranked tables.
    pub fn full(&self) -> String {
        let mut out = String::new();
        self.write_summary(&mut out);
        self.write_manual_review(&mut out);
        self.write_visit_errors(&mut out);
        self.write_detailed_tables(&mut out);
        out
    }

    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        std::fs::write(path, self.full())?;
        tracing::info!(path = %path.display(), "report written");
        Ok(())
    }

    fn write_summary(&self, out: &mut String) {
        let stats = self.stats;
        let _ = writeln!(out, "{}", "=".repeat(RULE_WIDTH));
        let _ = writeln!(out, "{}", self.title.to_uppercase());
        let _ = writeln!(out, "{}", "=".repeat(RULE_WIDTH));

        let _ = writeln!(out, "\nOVERVIEW");
        let _ = writeln!(out, "Total Properties: {}", stats.total_properties);
        let _ = writeln!(
            out,
            "Properties with Courtesy Info: {}",
            stats.properties_with_attribution
        );
        let _ = writeln!(
            out,
            "Properties without Courtesy Info: {}",
            stats.properties_without_attribution()
        );
        if stats.total_properties > 0 {
            let rate = stats.properties_with_attribution as f64 / stats.total_properties as f64 * 100.0;
            let _ = writeln!(out, "Success Rate: {rate:.1}%");
        }

        self.write_price_analysis(out);
        self.write_bed_bath_mix(out);
        self.write_sales_by_month(out);

        let realtors = stats.realtor_ranking();
        let _ = writeln!(out, "\nREALTOR ANALYSIS");
        let _ = writeln!(out, "Total Unique Realtors: {}", realtors.len());
        write_top_counts(out, "Realtors", &realtors);

        let companies = stats.company_ranking();
        let _ = writeln!(out, "\nCOMPANY ANALYSIS");
        let _ = writeln!(out, "Total Unique Companies: {}", companies.len());
        write_top_counts(out, "Companies", &companies);

        write_market_share(out, "Realtors", &realtors);
        write_market_share(out, "Companies", &companies);

        let pairs = stats.pair_ranking();
        if !pairs.is_empty() {
            let _ = writeln!(out, "\nTop Realtor / Company Pairs:");
            let _ = writeln!(out, "{}", "-".repeat(50));
            for (i, ((realtor, company), count)) in pairs.iter().take(TOP_N).enumerate() {
                let _ = writeln!(out, "{:2}. {realtor} @ {company} ({count})", i + 1);
            }
        }

        if !stats.missing.is_empty() {
            let _ = writeln!(out, "\nPROPERTIES WITHOUT COURTESY INFO");
            let _ = writeln!(out, "{}", "-".repeat(50));
            for (i, url) in stats.missing.iter().take(MISSING_PREVIEW).enumerate() {
                let _ = writeln!(out, "{}. {}", i + 1, self.address_of(url));
            }
            if stats.missing.len() > MISSING_PREVIEW {
                let _ = writeln!(out, "... and {} more", stats.missing.len() - MISSING_PREVIEW);
            }
        }
    }

    fn write_price_analysis(&self, out: &mut String) {
        let sales: Vec<_> = self.listings.iter().filter_map(|l| l.sale.as_ref()).collect();
        let sold: Vec<i64> = sales.iter().filter_map(|s| s.sold_price).filter(|p| *p > 0).collect();
        if sold.is_empty() {
            return;
        }

        let _ = writeln!(out, "\nPRICE ANALYSIS");
        let _ = writeln!(out, "Average Sold Price: ${}", thousands(mean_i64(&sold).round() as i64));
        if let (Some(min), Some(max)) = (sold.iter().min(), sold.iter().max()) {
            let _ = writeln!(out, "Price Range: ${} - ${}", thousands(*min), thousands(*max));
        }

        let reductions: Vec<f64> = sales.iter().filter_map(|s| s.price_reduction_pct()).collect();
        if !reductions.is_empty() {
            let avg = reductions.iter().sum::<f64>() / reductions.len() as f64;
            let _ = writeln!(out, "Average Price Reduction: {avg:.1}%");
        }

        let psf: Vec<i64> = sales.iter().filter_map(|s| s.sold_price_per_sqft).collect();
        if !psf.is_empty() {
            let _ = writeln!(out, "Average Price per Sq Ft: ${:.0}", mean_i64(&psf));
        }
    }

    fn write_bed_bath_mix(&self, out: &mut String) {
        let mut mix: IndexMap<String, usize> = IndexMap::new();
        for sale in self.listings.iter().filter_map(|l| l.sale.as_ref()) {
            if let (Some(beds), Some(baths)) = (sale.beds, sale.baths) {
                *mix.entry(format!("{beds} bed / {baths} bath")).or_insert(0) += 1;
            }
        }
        if mix.is_empty() {
            return;
        }

        let mut rows: Vec<_> = mix.into_iter().collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1));

        let total = self.listings.len().max(1) as f64;
        let _ = writeln!(out, "\nPROPERTY TYPES");
        for (label, count) in rows {
            let _ = writeln!(
                out,
                "{label}: {count} properties ({:.1}%)",
                count as f64 / total * 100.0
            );
        }
    }

    fn write_sales_by_month(&self, out: &mut String) {
        let months = sales_by_month(self.listings);
        if months.is_empty() {
            return;
        }

        let _ = writeln!(out, "\nSALES BY MONTH (Recent)");
        let _ = writeln!(out, "{}", "-".repeat(40));
        for (month, count) in months.iter().take(RECENT_MONTHS) {
            let _ = writeln!(out, "{}: {count} sales", month.format("%B %Y"));
        }
    }

    fn write_manual_review(&self, out: &mut String) {
        let degraded: Vec<&ParsedAttribution> = self.parsed.iter().filter(|p| p.is_degraded()).collect();
        let bare_role = &self.stats.bare_role;
        if degraded.is_empty() && bare_role.is_empty() {
            return;
        }

        let _ = writeln!(out, "\n\nMANUAL REVIEW");
        let _ = writeln!(out, "{}", "=".repeat(RULE_WIDTH));
        for p in degraded {
            let _ = writeln!(
                out,
                "[unparsed]  {}  \"{}\"",
                self.address_of(&p.source_listing),
                p.raw.as_deref().unwrap_or("")
            );
        }
        for url in bare_role {
            let raw = self
                .parsed
                .iter()
                .find(|p| &p.source_listing == url)
                .and_then(|p| p.raw.as_deref())
                .unwrap_or("");
            let _ = writeln!(out, "[no company] {}  \"{raw}\"", self.address_of(url));
        }
    }

    fn write_visit_errors(&self, out: &mut String) {
        if self.visit_errors.is_empty() {
            return;
        }
        let _ = writeln!(out, "\n\nLISTINGS THAT COULD NOT BE VISITED");
        let _ = writeln!(out, "{}", "=".repeat(RULE_WIDTH));
        for e in self.visit_errors {
            let _ = writeln!(out, "{}  {}", e.url, e.reason);
        }
    }

    fn write_detailed_tables(&self, out: &mut String) {
        let _ = writeln!(out, "\n\nDETAILED REALTOR LISTINGS");
        let _ = writeln!(out, "{}", "=".repeat(RULE_WIDTH));
        for entry in self.stats.realtor_ranking() {
            let _ = writeln!(out, "{:<40} {:3} properties", entry.name, entry.count);
        }

        let _ = writeln!(out, "\n\nDETAILED COMPANY LISTINGS");
        let _ = writeln!(out, "{}", "=".repeat(RULE_WIDTH));
        for entry in self.stats.company_ranking() {
            let _ = writeln!(out, "{:<40} {:3} properties", entry.name, entry.count);
        }
    }

    fn address_of<'s>(&'s self, url: &'s str) -> &'s str {
        self.listings
            .iter()
            .find(|l| l.url == url)
            .map(|l| l.address.as_str())
            .unwrap_or(url)
    }
}

fn write_top_counts(out: &mut String, label: &str, ranking: &[RankedEntry]) {
    if ranking.is_empty() {
        return;
    }
    let _ = writeln!(out, "\nTop {TOP_N} {label} by Property Count:");
    let _ = writeln!(out, "{}", "-".repeat(50));
    for (i, entry) in ranking.iter().take(TOP_N).enumerate() {
        let _ = writeln!(out, "{:2}. {:<35} {:3} properties", i + 1, entry.name, entry.count);
    }
}

fn write_market_share(out: &mut String, label: &str, ranking: &[RankedEntry]) {
    if ranking.is_empty() {
        return;
    }
    let _ = writeln!(out, "\nMARKET SHARE (Top {SHARE_TOP_N} {label})");
    let _ = writeln!(out, "{}", "-".repeat(50));
    for (i, entry) in ranking.iter().take(SHARE_TOP_N).enumerate() {
        let _ = writeln!(out, "{}. {:<35} {:5.1}%", i + 1, entry.name, entry.share_display());
    }
}

/// Sold dates grouped by month, most recent month first.
fn sales_by_month(listings: &[PropertyListing]) -> Vec<(NaiveDate, usize)> {
    let mut months: IndexMap<NaiveDate, usize> = IndexMap::new();
    for date in listings.iter().filter_map(|l| l.sale.as_ref()?.sold_date) {
        if let Some(first) = date.with_day(1) {
            *months.entry(first).or_insert(0) += 1;
        }
    }
    let mut months: Vec<_> = months.into_iter().collect();
    months.sort_by(|a, b| b.0.cmp(&a.0));
    months
}

// Summed as f64: scraped prices are not trusted to fit an i64 total.
fn mean_i64(values: &[i64]) -> f64 {
    values.iter().map(|v| *v as f64).sum::<f64>() / values.len() as f64
}

/// 1234567 -> "1,234,567"
fn thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if n < 0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}
