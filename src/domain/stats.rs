// src/domain/stats.rs

use crate::domain::attribution::{AttributionFormat, ParsedAttribution};
use indexmap::{IndexMap, IndexSet};

/// Counts derived from one run's parsed attributions. Maps keep first-seen
/// order, which is what ranking falls back to on ties.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateStats {
    pub realtor_counts: IndexMap<String, usize>,
    pub company_counts: IndexMap<String, usize>,
    pub pair_counts: IndexMap<(String, String), usize>,
    pub total_properties: usize,
    pub properties_with_attribution: usize,
    /// Listings whose attribution only parsed in degraded form.
    pub degraded: Vec<String>,
    /// Listings attributed to a bare role such as "Broker" with no firm named.
    pub bare_role: Vec<String>,
    /// Listings with no attribution text at all.
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedEntry {
    pub name: String,
    pub count: usize,
    /// Share of the table total, unrounded.
    pub share: f64,
}

impl RankedEntry {
    /// Share rounded to one decimal place, as displayed.
    pub fn share_display(&self) -> f64 {
        (self.share * 10.0).round() / 10.0
    }
}

impl AggregateStats {
    /// Reduces parsed attributions, one per listing, into counts.
    ///
    /// A realtor is counted once per listing even if named twice, and a
    /// company once per listing however many co-agents share it.
    pub fn from_parsed(parsed: &[ParsedAttribution]) -> Self {
        let mut stats = AggregateStats {
            total_properties: parsed.len(),
            ..Default::default()
        };

        for p in parsed {
            match p.format {
                AttributionFormat::Blank => {
                    stats.missing.push(p.source_listing.clone());
                    continue;
                }
                AttributionFormat::Unparsed => stats.degraded.push(p.source_listing.clone()),
                AttributionFormat::NameOnlyBareRole => {
                    stats.bare_role.push(p.source_listing.clone())
                }
                _ => {}
            }

            if p.records.is_empty() {
                continue;
            }
            stats.properties_with_attribution += 1;

            let realtors: IndexSet<&str> =
                p.records.iter().map(|r| r.realtor_name.as_str()).collect();
            for realtor in &realtors {
                *stats.realtor_counts.entry(realtor.to_string()).or_insert(0) += 1;
            }

            if let Some(company) = p.company() {
                *stats.company_counts.entry(company.to_string()).or_insert(0) += 1;
                for realtor in &realtors {
                    *stats
                        .pair_counts
                        .entry((realtor.to_string(), company.to_string()))
                        .or_insert(0) += 1;
                }
            }
        }

        stats
    }

    pub fn properties_without_attribution(&self) -> usize {
        self.total_properties - self.properties_with_attribution
    }

    pub fn realtor_ranking(&self) -> Vec<RankedEntry> {
        rank(&self.realtor_counts)
    }

    pub fn company_ranking(&self) -> Vec<RankedEntry> {
        rank(&self.company_counts)
    }

    pub fn pair_ranking(&self) -> Vec<((String, String), usize)> {
        let mut pairs: Vec<_> = self
            .pair_counts
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        pairs.sort_by(|a, b| b.1.cmp(&a.1));
        pairs
    }
}

/// Descending by count; `sort_by` is stable so ties keep first-seen order.
fn rank(counts: &IndexMap<String, usize>) -> Vec<RankedEntry> {
    let total: usize = counts.values().sum();

    let mut ranked: Vec<RankedEntry> = counts
        .iter()
        .map(|(name, count)| RankedEntry {
            name: name.clone(),
            count: *count,
            share: if total == 0 {
                0.0
            } else {
                *count as f64 / total as f64 * 100.0
            },
        })
        .collect();

    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    ranked
}
