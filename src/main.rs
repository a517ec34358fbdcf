use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::config::ScraperConfig;
use crate::db::scrapes::{self, RunTotals};
use crate::db::{init_db, Database};
use crate::domain::attribution::parse_listings;
use crate::domain::listing::PropertyListing;
use crate::domain::stats::AggregateStats;
use crate::report::Report;
use crate::scraper::models::{read_listings_json, write_listings_json};
use crate::scraper::{scrape_with_chrome, ListingVisitError, RunOutcome, WorkflowState};

mod config;
mod db;
mod domain;
mod errors;
mod report;
mod scraper;
mod spreadsheets;

#[cfg(test)]
mod tests;

#[derive(Parser, Debug)]
#[command(
    name = "courtesy-scraper",
    about = "Scrapes a community's past sales and ranks the realtors and brokerages credited on them"
)]
struct Cli {
    /// Path to scraper configuration file
    #[arg(short, long, global = true, default_value = "config/courtesy-scraper.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Drive the browser through the sold listings and write the results
    Scrape(ScrapeArgs),
    /// Re-run the analysis over a previously written listings file
    Analyze(AnalyzeArgs),
    /// Show recent runs from the history database
    History {
        /// History database (defaults to `history_db` from the config)
        #[arg(long)]
        db: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// List the listings stored for this run instead
        #[arg(long)]
        run: Option<i64>,
    },
}

#[derive(Args, Debug)]
struct ScrapeArgs {
    /// Community page to scrape, overriding the config
    #[arg(long)]
    url: Option<String>,
    #[arg(long)]
    headless: bool,
    #[arg(short, long, default_value = "mesquite_properties.json")]
    output: PathBuf,
    #[arg(long, default_value = "property_analysis_report.txt")]
    report: PathBuf,
    #[arg(long)]
    xlsx: Option<PathBuf>,
    /// Record the run in this SQLite file, overriding the config
    #[arg(long)]
    history_db: Option<String>,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    #[arg(short, long, default_value = "mesquite_properties.json")]
    input: PathBuf,
    #[arg(long, default_value = "property_analysis_report.txt")]
    report: PathBuf,
    #[arg(long)]
    xlsx: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = ScraperConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config: {}", cli.config.display()))?;

    match cli.command {
        Command::Scrape(args) => {
            if let Some(url) = args.url.clone() {
                config.target_url = url;
            }
            if args.headless {
                config.headless = true;
            }
            if let Some(path) = args.history_db.clone() {
                config.history_db = Some(path);
            }
            config.validate().context("Invalid configuration")?;
            scrape(config, args).await
        }
        Command::Analyze(args) => analyze(&config, args),
        Command::History { db, limit, run } => {
            let path = db
                .or(config.history_db)
                .context("No history database: pass --db or set history_db in the config")?;
            match run {
                Some(run_id) => run_listings(&path, run_id),
                None => history(&path, limit),
            }
        }
    }
}

async fn scrape(config: ScraperConfig, args: ScrapeArgs) -> Result<()> {
    let history = match &config.history_db {
        Some(path) => {
            let db = Database::new(path.clone());
            init_db(&db).with_context(|| format!("Failed to open history DB: {path}"))?;
            let run_id = db.with_conn(|conn| {
                scrapes::start_scrape_run(conn, &config.target_url, chrono::Utc::now().timestamp())
            })?;
            Some((db, run_id))
        }
        None => None,
    };

    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Received shutdown signal, stopping after the current listing");
        signal.cancel();
    });

    tracing::info!(url = %config.target_url, "starting scrape");
    let outcome = match scrape_with_chrome(&config, cancel).await {
        Ok(outcome) => outcome,
        Err(e) => {
            if let Some((db, run_id)) = &history {
                let totals = RunTotals {
                    error_kind: Some("browser".to_string()),
                    error_message: Some(e.to_string()),
                    ..Default::default()
                };
                if let Err(history_err) = db.with_conn(|conn| {
                    scrapes::end_scrape_run(conn, *run_id, chrono::Utc::now().timestamp(), &totals)
                }) {
                    tracing::warn!(run_id = *run_id, "failed to record launch failure: {history_err}");
                }
            }
            return Err(anyhow::anyhow!("Browser error: {e}"));
        }
    };

    // Partial results are written even when the run failed.
    write_listings_json(&args.output, &outcome.listings)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    tracing::info!(path = %args.output.display(), count = outcome.listings.len(), "listings written");

    publish(
        &config.target_url,
        &outcome.listings,
        &outcome.listing_errors,
        &args.report,
        args.xlsx.as_deref(),
    )?;

    if let Some((db, run_id)) = &history {
        let totals = run_totals(&outcome);
        let finished = outcome.finished_at.timestamp();
        db.with_conn(|conn| {
            scrapes::save_listings(conn, *run_id, &outcome.listings)?;
            scrapes::end_scrape_run(conn, *run_id, finished, &totals)
        })
        .context("Failed to record run history")?;
    }

    let elapsed = (outcome.finished_at - outcome.started_at)
        .to_std()
        .unwrap_or_default();
    match outcome.final_state {
        WorkflowState::Done => tracing::info!(?elapsed, "scrape complete"),
        state => tracing::warn!(?state, ?elapsed, "scrape stopped early"),
    }

    if outcome.succeeded() {
        return Ok(());
    }
    let failure = outcome
        .failure
        .map(|e| e.to_string())
        .unwrap_or_default();
    Err(anyhow::anyhow!(
        "Scrape failed after {} of {} listing(s): {failure}",
        outcome.visited,
        outcome.found
    ))
}

fn run_totals(outcome: &RunOutcome) -> RunTotals {
    RunTotals {
        listings_found: outcome.found,
        listings_visited: outcome.visited,
        listing_errors: outcome.listing_errors.len(),
        error_kind: outcome.failure.as_ref().map(|e| e.kind().to_string()),
        error_message: outcome.failure.as_ref().map(|e| e.to_string()),
    }
}

fn analyze(config: &ScraperConfig, args: AnalyzeArgs) -> Result<()> {
    let listings = read_listings_json(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    tracing::info!(path = %args.input.display(), count = listings.len(), "loaded listings");

    publish(&config.target_url, &listings, &[], &args.report, args.xlsx.as_deref())
}

/// Parses, aggregates, prints the summary and writes the report files.
fn publish(
    target_url: &str,
    listings: &[PropertyListing],
    visit_errors: &[ListingVisitError],
    report_path: &Path,
    xlsx_path: Option<&Path>,
) -> Result<()> {
    let parsed = parse_listings(listings);
    let stats = AggregateStats::from_parsed(&parsed);
    let title = report_title(target_url);

    let report = Report {
        title: &title,
        listings,
        parsed: &parsed,
        stats: &stats,
        visit_errors,
    };
    println!("{}", report.summary());
    report
        .save(report_path)
        .with_context(|| format!("Failed to write report {}", report_path.display()))?;

    if let Some(path) = xlsx_path {
        spreadsheets::export_workbook(path, listings, &parsed, &stats)
            .with_context(|| format!("Failed to write spreadsheet {}", path.display()))?;
    }
    Ok(())
}

fn history(path: &str, limit: usize) -> Result<()> {
    let db = Database::new(path);
    init_db(&db).with_context(|| format!("Failed to open history DB: {path}"))?;
    let runs = db.with_conn(|conn| scrapes::get_recent_scrapes(conn, limit))?;

    if runs.is_empty() {
        println!("No runs recorded in {path}");
        return Ok(());
    }

    for run in runs {
        let started = chrono::DateTime::from_timestamp(run.started_at, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| run.started_at.to_string());
        let status = if run.success {
            "ok".to_string()
        } else {
            run.error_kind.clone().unwrap_or_else(|| "unfinished".to_string())
        };
        let took = run
            .finished_at
            .map(|end| format!("{}s", end - run.started_at))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "#{:<4} {started} {:>6}  {:<20} found {:>3}  visited {:>3}  errors {:>3}  {}",
            run.id,
            took,
            status,
            run.listings_found.unwrap_or(0),
            run.listings_visited.unwrap_or(0),
            run.listing_errors.unwrap_or(0),
            run.target_url
        );
        if let Some(message) = &run.error_message {
            println!("      {message}");
        }
    }
    Ok(())
}

fn run_listings(path: &str, run_id: i64) -> Result<()> {
    let db = Database::new(path);
    init_db(&db).with_context(|| format!("Failed to open history DB: {path}"))?;
    let listings = db.with_conn(|conn| scrapes::get_run_listings(conn, run_id))?;

    if listings.is_empty() {
        println!("No listings stored for run #{run_id}");
        return Ok(());
    }
    for listing in listings {
        println!(
            "{:<40} {:<50} {}",
            listing.address,
            listing.courtesy_of.as_deref().unwrap_or("(no attribution)"),
            listing.url
        );
    }
    Ok(())
}

/// "…/mesquite-country-club/" -> "Mesquite Country Club Property Listings Analysis"
fn report_title(target_url: &str) -> String {
    let slug = url::Url::parse(target_url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.rfind(|s| !s.is_empty()).map(str::to_string))
        })
        .unwrap_or_default();

    let name = slug
        .split('-')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ");

    if name.is_empty() {
        "Property Listings Analysis".to_string()
    } else {
        format!("{name} Property Listings Analysis")
    }
}
