// src/domain/attribution.rs

use crate::domain::listing::PropertyListing;
use crate::scraper::models::LEGACY_NOT_FOUND;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Co-agent separators: `/`, `&`, or the standalone word "and".
static NAME_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*(?:/|&|\band\b)\s*").expect("valid separator regex"));

/// Title or licence tail glued onto a name, e.g. "Jane Roe DRE #01234567".
static TITLE_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*\b(?:realtor|agent|broker|dre|bre)\b.*$").expect("valid suffix regex")
});

/// Roles that name a function, not a firm. Compared lowercase, without
/// trailing punctuation or the registered mark.
const ROLE_TOKENS: &[&str] = &[
    "broker",
    "realtor",
    "agent",
    "listing agent",
    "broker associate",
    "associate broker",
    "broker/owner",
    "broker-owner",
    "sales associate",
    "salesperson",
    "realtor associate",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributionRecord {
    pub realtor_name: String,
    pub company: Option<String>,
    pub source_listing: String,
}

/// Which matcher recognised the attribution string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributionFormat {
    /// Nothing to parse (absent, blank or the legacy "Not found").
    Blank,
    /// "Name / Name, Broker": the trailing part is a role, the firm is unnamed.
    NameOnlyBareRole,
    SingleNameCompany,
    MultiNameCompany,
    /// No comma at all, names only.
    NamesOnly,
    /// Nothing matched; the whole string became the realtor name.
    Unparsed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseConfidence {
    Clean,
    Degraded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAttribution {
    pub source_listing: String,
    pub raw: Option<String>,
    pub format: AttributionFormat,
    pub records: Vec<AttributionRecord>,
}

impl ParsedAttribution {
    pub fn confidence(&self) -> ParseConfidence {
        if self.format == AttributionFormat::Unparsed {
            ParseConfidence::Degraded
        } else {
            ParseConfidence::Clean
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.confidence() == ParseConfidence::Degraded
    }

    /// The firm shared by every record, if one was named.
    pub fn company(&self) -> Option<&str> {
        self.records.first().and_then(|r| r.company.as_deref())
    }
}

/// Trailing segment after the names, classified.
#[derive(Debug, PartialEq)]
enum Trailing {
    BareRole,
    Company(String),
    Empty,
}

struct Segments {
    names: Vec<String>,
    names_well_formed: bool,
    trailing: Option<Trailing>,
}

struct Match {
    names: Vec<String>,
    company: Option<String>,
}

type Matcher = fn(&Segments) -> Option<Match>;

/// Tried in order; the first hit wins, otherwise the input degrades.
const MATCHERS: &[(AttributionFormat, Matcher)] = &[
    (AttributionFormat::NameOnlyBareRole, match_bare_role),
    (AttributionFormat::SingleNameCompany, match_single_name_company),
    (AttributionFormat::MultiNameCompany, match_multi_name_company),
    (AttributionFormat::NamesOnly, match_names_only),
];

fn match_bare_role(seg: &Segments) -> Option<Match> {
    match seg.trailing {
        Some(Trailing::BareRole) if seg.names_well_formed => Some(Match {
            names: seg.names.clone(),
            company: None,
        }),
        _ => None,
    }
}

fn match_single_name_company(seg: &Segments) -> Option<Match> {
    match &seg.trailing {
        Some(Trailing::Company(company)) if seg.names_well_formed && seg.names.len() == 1 => {
            Some(Match {
                names: seg.names.clone(),
                company: Some(company.clone()),
            })
        }
        _ => None,
    }
}

fn match_multi_name_company(seg: &Segments) -> Option<Match> {
    match &seg.trailing {
        Some(Trailing::Company(company)) if seg.names_well_formed && seg.names.len() > 1 => {
            Some(Match {
                names: seg.names.clone(),
                company: Some(company.clone()),
            })
        }
        _ => None,
    }
}

fn match_names_only(seg: &Segments) -> Option<Match> {
    if seg.trailing.is_none() && seg.names_well_formed {
        Some(Match {
            names: seg.names.clone(),
            company: None,
        })
    } else {
        None
    }
}

/// Parses a "courtesy of" string into one record per named realtor.
///
/// Never fails: input no matcher recognises becomes a single degraded record
/// holding the whole trimmed string, so the listing still counts.
pub fn parse_attribution(raw: Option<&str>, source_listing: &str) -> ParsedAttribution {
    let text = raw.map(str::trim).unwrap_or_default();

    if text.is_empty() || text.eq_ignore_ascii_case(LEGACY_NOT_FOUND) {
        return ParsedAttribution {
            source_listing: source_listing.to_string(),
            raw: None,
            format: AttributionFormat::Blank,
            records: Vec::new(),
        };
    }

    let segments = split_segments(text);

    let (format, matched) = MATCHERS
        .iter()
        .find_map(|(format, matcher)| matcher(&segments).map(|m| (*format, m)))
        .unwrap_or_else(|| {
            (
                AttributionFormat::Unparsed,
                Match {
                    names: vec![text.to_string()],
                    company: None,
                },
            )
        });

    let records = matched
        .names
        .into_iter()
        .map(|realtor_name| AttributionRecord {
            realtor_name,
            company: matched.company.clone(),
            source_listing: source_listing.to_string(),
        })
        .collect();

    ParsedAttribution {
        source_listing: source_listing.to_string(),
        raw: Some(text.to_string()),
        format,
        records,
    }
}

/// Parses every listing's attribution, logging the ones that need review.
pub fn parse_listings(listings: &[PropertyListing]) -> Vec<ParsedAttribution> {
    listings
        .iter()
        .map(|listing| {
            let parsed = parse_attribution(listing.raw_attribution.as_deref(), &listing.url);
            match parsed.format {
                AttributionFormat::Unparsed => warn!(
                    url = %listing.url,
                    raw = parsed.raw.as_deref().unwrap_or_default(),
                    "attribution degraded to a single unparsed record"
                ),
                AttributionFormat::NameOnlyBareRole => debug!(
                    url = %listing.url,
                    "attribution names a bare role, company left empty"
                ),
                _ => {}
            }
            parsed
        })
        .collect()
}

fn split_segments(text: &str) -> Segments {
    let parts = split_top_level_commas(text);

    let (names_part, trailing) = match parts.split_last() {
        Some((last, rest)) if !rest.is_empty() => {
            // Role parts sitting between the names and the firm belong to
            // the trailing segment: "Name, Realtor, Firm".
            let mut names_parts = rest.to_vec();
            let mut trailing_parts = vec![*last];
            while names_parts.len() > 1 && names_parts.last().is_some_and(|p| is_role(p)) {
                if let Some(role) = names_parts.pop() {
                    trailing_parts.insert(0, role);
                }
            }
            (
                names_parts.join(", "),
                Some(classify_trailing(&trailing_parts)),
            )
        }
        _ => (text.to_string(), None),
    };

    let names: Vec<String> = NAME_SEPARATOR
        .split(&names_part)
        .map(clean_name)
        .filter(|n| !n.is_empty())
        .collect();

    // A role word where a name should be ("Broker, Acme") is not a realtor.
    let names_well_formed = !names.is_empty()
        && names
            .iter()
            .all(|n| n.chars().any(char::is_alphabetic) && !n.contains(',') && !is_role(n));

    Segments {
        names,
        names_well_formed,
        trailing,
    }
}

fn classify_trailing(parts: &[&str]) -> Trailing {
    let remainder: Vec<&str> = parts
        .iter()
        .copied()
        .skip_while(|p| is_role(p))
        .collect();

    if remainder.is_empty() {
        return if parts.is_empty() {
            Trailing::Empty
        } else {
            Trailing::BareRole
        };
    }

    let company = remainder.join(", ");
    if company.trim().is_empty() {
        Trailing::Empty
    } else {
        Trailing::Company(company.trim().to_string())
    }
}

fn clean_name(candidate: &str) -> String {
    let candidate = candidate.trim();
    let stripped = match TITLE_SUFFIX.find(candidate) {
        // Only strip a tail; a name that starts with a title word stays intact.
        Some(m) if m.start() > 0 => &candidate[..m.start()],
        _ => candidate,
    };
    stripped
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, ',' | '.' | '-'))
        .to_string()
}

fn is_role(part: &str) -> bool {
    let normalized = part
        .trim()
        .trim_end_matches(['.', '®'])
        .trim()
        .to_lowercase();
    ROLE_TOKENS.contains(&normalized.as_str())
}

/// Splits on commas that are not inside parentheses, trimming each part.
fn split_top_level_commas(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(text[start..].trim());
    parts
}
