use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A sold listing as discovered by the workflow. The url is the identity;
/// the attribution is attached once, after the detail page was visited.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyListing {
    pub url: String,
    pub address: String,
    pub raw_attribution: Option<String>,
    pub sale: Option<SaleSummary>,
}

impl PropertyListing {
    pub fn discovered(url: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            address: address.into(),
            raw_attribution: None,
            sale: None,
        }
    }

    pub fn has_attribution(&self) -> bool {
        self.raw_attribution
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty())
    }
}

/// Figures read off the "Past Sales" table row next to the listing link.
/// Every field is optional: the table is loosely structured and rows vary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SaleSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sold_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_price: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_price_per_sqft: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sold_price: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sold_price_per_sqft: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baths: Option<f64>,
}

impl SaleSummary {
    pub fn is_empty(&self) -> bool {
        *self == SaleSummary::default()
    }

    /// Percentage drop from list to sold price, when both are known.
    pub fn price_reduction_pct(&self) -> Option<f64> {
        match (self.list_price, self.sold_price) {
            (Some(list), Some(sold)) if list > 0 && sold > 0 => {
                Some((list - sold) as f64 / list as f64 * 100.0)
            }
            _ => None,
        }
    }
}
