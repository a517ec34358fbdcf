use crate::domain::listing::PropertyListing;
use crate::errors::AppError;
use rusqlite::{params, Connection};

#[derive(Debug)]
pub struct ScrapeRun {
    pub id: i64,
    pub target_url: String,
    pub started_at: i64,
    pub finished_at: Option<i64>,
    pub listings_found: Option<i64>,
    pub listings_visited: Option<i64>,
    pub listing_errors: Option<i64>,
    pub success: bool,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
}

/// Totals written when a run ends.
#[derive(Debug, Default)]
pub struct RunTotals {
    pub listings_found: usize,
    pub listings_visited: usize,
    pub listing_errors: usize,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
}

impl RunTotals {
    pub fn success(&self) -> bool {
        self.error_kind.is_none()
    }
}

#[derive(Debug, PartialEq)]
pub struct StoredListing {
    pub url: String,
    pub address: String,
    pub courtesy_of: Option<String>,
}

pub fn start_scrape_run(conn: &Connection, target_url: &str, now: i64) -> Result<i64, AppError> {
    conn.execute(
        "INSERT INTO scrape_runs (target_url, started_at, success) VALUES (?, ?, 0)",
        params![target_url, now],
    )
    .map_err(|e| AppError::DbError(e.to_string()))?;
    Ok(conn.last_insert_rowid())
}

pub fn end_scrape_run(
    conn: &Connection,
    run_id: i64,
    now: i64,
    totals: &RunTotals,
) -> Result<(), AppError> {
    conn.execute(
        "UPDATE scrape_runs SET finished_at = ?, listings_found = ?, listings_visited = ?, listing_errors = ?, success = ?, error_kind = ?, error_message = ? WHERE id = ?",
        params![
            now,
            totals.listings_found as i64,
            totals.listings_visited as i64,
            totals.listing_errors as i64,
            totals.success(),
            totals.error_kind,
            totals.error_message,
            run_id
        ],
    )
    .map_err(|e| AppError::DbError(e.to_string()))?;
    Ok(())
}

/// Stores the run's listings in one transaction. Re-saving a url for the
/// same run replaces the earlier row.
pub fn save_listings(
    conn: &mut Connection,
    run_id: i64,
    listings: &[PropertyListing],
) -> Result<usize, AppError> {
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO scraped_listings (run_id, url, address, courtesy_of, sold_price, sold_date)
             VALUES (?, ?, ?, ?, ?, ?)",
        )?;
        for listing in listings {
            let sale = listing.sale.as_ref();
            stmt.execute(params![
                run_id,
                listing.url,
                listing.address,
                listing.raw_attribution,
                sale.and_then(|s| s.sold_price),
                sale.and_then(|s| s.sold_date).map(|d| d.to_string()),
            ])?;
        }
    }
    tx.commit()?;
    Ok(listings.len())
}

pub fn get_recent_scrapes(conn: &Connection, limit: usize) -> Result<Vec<ScrapeRun>, AppError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, target_url, started_at, finished_at, listings_found, listings_visited, listing_errors, success, error_kind, error_message
             FROM scrape_runs ORDER BY started_at DESC, id DESC LIMIT ?",
        )
        .map_err(|e| AppError::DbError(e.to_string()))?;

    let rows = stmt
        .query_map(params![limit as i64], |row| {
            Ok(ScrapeRun {
                id: row.get(0)?,
                target_url: row.get(1)?,
                started_at: row.get(2)?,
                finished_at: row.get(3)?,
                listings_found: row.get(4)?,
                listings_visited: row.get(5)?,
                listing_errors: row.get(6)?,
                success: row.get(7)?,
                error_kind: row.get(8)?,
                error_message: row.get(9)?,
            })
        })
        .map_err(|e| AppError::DbError(e.to_string()))?;

    let mut runs = Vec::new();
    for r in rows {
        runs.push(r.map_err(|e| AppError::DbError(e.to_string()))?);
    }
    Ok(runs)
}

pub fn get_run_listings(conn: &Connection, run_id: i64) -> Result<Vec<StoredListing>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT url, address, courtesy_of FROM scraped_listings WHERE run_id = ? ORDER BY id",
    )?;
    let rows = stmt.query_map(params![run_id], |row| {
        Ok(StoredListing {
            url: row.get(0)?,
            address: row.get(1)?,
            courtesy_of: row.get(2)?,
        })
    })?;

    rows.collect::<Result<Vec<_>, _>>().map_err(AppError::from)
}
