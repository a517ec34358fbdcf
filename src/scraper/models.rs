use crate::domain::listing::{PropertyListing, SaleSummary};
use crate::errors::AppError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

// Output file, one object per listing:
//  [
//    {
//      url
//      address
//      courtesy_of   (string | null)
//      sale          (optional)
//       ├── list_date / sold_date
//       ├── list_price / list_price_per_sqft
//       ├── sold_price / sold_price_per_sqft
//       └── beds / baths
//    }
//  ]

/// Value older runs wrote instead of null when no attribution was found.
pub const LEGACY_NOT_FOUND: &str = "Not found";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub url: String,
    pub address: String,
    // Always serialized, null when absent.
    #[serde(default)]
    pub courtesy_of: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sale: Option<SaleSummary>,
}

impl From<&PropertyListing> for ListingRecord {
    fn from(listing: &PropertyListing) -> Self {
        Self {
            url: listing.url.clone(),
            address: listing.address.clone(),
            courtesy_of: listing.raw_attribution.clone(),
            sale: listing.sale.clone().filter(|s| !s.is_empty()),
        }
    }
}

impl From<ListingRecord> for PropertyListing {
    fn from(record: ListingRecord) -> Self {
        let raw_attribution = record
            .courtesy_of
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case(LEGACY_NOT_FOUND));

        PropertyListing {
            url: record.url,
            address: record.address,
            raw_attribution,
            sale: record.sale,
        }
    }
}

pub fn to_records(listings: &[PropertyListing]) -> Vec<ListingRecord> {
    listings.iter().map(ListingRecord::from).collect()
}

/// Writes the listings as a pretty-printed JSON array.
pub fn write_listings_json(path: &Path, listings: &[PropertyListing]) -> Result<(), AppError> {
    let mut out = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut out, &to_records(listings))?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}

/// Reads a file written by `write_listings_json`, or by older runs.
pub fn read_listings_json(path: &Path) -> Result<Vec<PropertyListing>, AppError> {
    let records: Vec<ListingRecord> = serde_json::from_reader(BufReader::new(File::open(path)?))?;
    Ok(records.into_iter().map(PropertyListing::from).collect())
}
