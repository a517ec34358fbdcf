use crate::domain::attribution::ParsedAttribution;
use crate::domain::listing::PropertyListing;
use crate::domain::stats::{AggregateStats, RankedEntry};
use crate::errors::AppError;
use rust_xlsxwriter::{Workbook, Worksheet};
use std::path::Path;

/// Writes the Listings, Realtors and Companies sheets to `path`.
pub fn export_workbook(
    path: &Path,
    listings: &[PropertyListing],
    parsed: &[ParsedAttribution],
    stats: &AggregateStats,
) -> Result<(), AppError> {
    let mut workbook = build_workbook(listings, parsed, stats)?;
    workbook
        .save(path)
        .map_err(|e| AppError::XlsxError(format!("Failed to save workbook: {}", e)))?;
    tracing::info!(path = %path.display(), "spreadsheet written");
    Ok(())
}

pub fn build_workbook(
    listings: &[PropertyListing],
    parsed: &[ParsedAttribution],
    stats: &AggregateStats,
) -> Result<Workbook, AppError> {
    let mut workbook = Workbook::new();

    write_listings_sheet(workbook.add_worksheet(), listings, parsed)?;
    write_ranking_sheet(workbook.add_worksheet(), "Realtors", "Realtor", &stats.realtor_ranking())?;
    write_ranking_sheet(workbook.add_worksheet(), "Companies", "Company", &stats.company_ranking())?;

    Ok(workbook)
}

fn write_headers(sheet: &mut Worksheet, headers: &[&str]) -> Result<(), AppError> {
    for (col, header) in headers.iter().enumerate() {
        sheet.write_string(0, col as u16, *header).map_err(|e| {
            AppError::XlsxError(format!("Failed to write header '{}': {}", header, e))
        })?;
    }
    Ok(())
}

fn write_listings_sheet(
    sheet: &mut Worksheet,
    listings: &[PropertyListing],
    parsed: &[ParsedAttribution],
) -> Result<(), AppError> {
    sheet
        .set_name("Listings")
        .map_err(|e| AppError::XlsxError(format!("Failed to name sheet: {}", e)))?;

    write_headers(
        sheet,
        &[
            "Address",
            "URL",
            "Courtesy Of",
            "Realtors",
            "Company",
            "List Date",
            "Sold Date",
            "List Price",
            "Sold Price",
            "Sold $/SqFt",
            "Beds",
            "Baths",
        ],
    )?;

    for (i, listing) in listings.iter().enumerate() {
        let r = (i + 1) as u32;
        let parse = parsed.iter().find(|p| p.source_listing == listing.url);

        sheet
            .write_string(r, 0, &listing.address)
            .map_err(|e| AppError::XlsxError(format!("Failed to write address: {}", e)))?;
        sheet
            .write_string(r, 1, &listing.url)
            .map_err(|e| AppError::XlsxError(format!("Failed to write url: {}", e)))?;
        sheet
            .write_string(r, 2, listing.raw_attribution.as_deref().unwrap_or(""))
            .map_err(|e| AppError::XlsxError(format!("Failed to write courtesy: {}", e)))?;

        let realtors = parse
            .map(|p| {
                p.records
                    .iter()
                    .map(|rec| rec.realtor_name.as_str())
                    .collect::<Vec<_>>()
                    .join("; ")
            })
            .unwrap_or_default();
        sheet
            .write_string(r, 3, &realtors)
            .map_err(|e| AppError::XlsxError(format!("Failed to write realtors: {}", e)))?;
        sheet
            .write_string(r, 4, parse.and_then(|p| p.company()).unwrap_or(""))
            .map_err(|e| AppError::XlsxError(format!("Failed to write company: {}", e)))?;

        let Some(sale) = &listing.sale else {
            continue;
        };

        let dates = [(5, sale.list_date), (6, sale.sold_date)];
        for (col, date) in dates {
            if let Some(date) = date {
                sheet
                    .write_string(r, col, date.format("%Y-%m-%d").to_string())
                    .map_err(|e| AppError::XlsxError(format!("Failed to write date: {}", e)))?;
            }
        }

        let numbers = [
            (7, sale.list_price.map(|v| v as f64)),
            (8, sale.sold_price.map(|v| v as f64)),
            (9, sale.sold_price_per_sqft.map(|v| v as f64)),
            (10, sale.beds.map(f64::from)),
            (11, sale.baths),
        ];
        for (col, value) in numbers {
            if let Some(value) = value {
                sheet
                    .write_number(r, col, value)
                    .map_err(|e| AppError::XlsxError(format!("Failed to write number: {}", e)))?;
            }
        }
    }

    Ok(())
}

fn write_ranking_sheet(
    sheet: &mut Worksheet,
    name: &str,
    label: &str,
    ranking: &[RankedEntry],
) -> Result<(), AppError> {
    sheet
        .set_name(name)
        .map_err(|e| AppError::XlsxError(format!("Failed to name sheet: {}", e)))?;

    write_headers(sheet, &["Rank", label, "Properties", "Share %"])?;

    for (i, entry) in ranking.iter().enumerate() {
        let r = (i + 1) as u32;
        sheet
            .write_number(r, 0, r as f64)
            .map_err(|e| AppError::XlsxError(format!("Failed to write rank: {}", e)))?;
        sheet
            .write_string(r, 1, &entry.name)
            .map_err(|e| AppError::XlsxError(format!("Failed to write name: {}", e)))?;
        sheet
            .write_number(r, 2, entry.count as f64)
            .map_err(|e| AppError::XlsxError(format!("Failed to write count: {}", e)))?;
        sheet
            .write_number(r, 3, entry.share_display())
            .map_err(|e| AppError::XlsxError(format!("Failed to write share: {}", e)))?;
    }

    Ok(())
}
