mod db;
mod fetch;
mod model;
mod parser;
mod pipeline;
mod settings;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};

use model::{PriceTrend, SearchContext};
use parser::PageOutcome;
use settings::Settings;

#[derive(Parser)]
#[command(name = "flight_offers", about = "Flight offer extraction from search-result pages")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a saved page dump (one line per token) and print offers as JSON
    Parse {
        file: PathBuf,
        #[arg(long)]
        origin: String,
        #[arg(long)]
        dest: String,
        /// Departure date (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,
        /// Return date, for round-trip searches
        #[arg(long)]
        return_date: Option<NaiveDate>,
        /// Price-trend text; read from the dump when omitted
        #[arg(long)]
        trend: Option<String>,
        /// Also store the offers in the database
        #[arg(long)]
        save: bool,
    },
    /// Fetch, parse and store every configured search
    Run {
        /// Max pages to fetch (default: all)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Show stored offer statistics
    Stats,
    /// List the searches the configured routes expand into
    Routes,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;

    let result = match cli.command {
        Commands::Parse { file, origin, dest, date, return_date, trend, save } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let lines: Vec<String> = text.lines().map(str::to_string).collect();

            let price_trend = match trend.as_deref() {
                Some(t) => PriceTrend::from_fragment(Some(t)),
                None => parser::normalize::find_price_trend(&lines),
            };
            let mut ctx = SearchContext::one_way(&origin, &dest, date).with_price_trend(price_trend);
            if let Some(r) = return_date {
                ctx = ctx.with_return(r);
            }
            let accessed_at = Local::now().naive_local();

            let outcome = parser::parse_page(&lines, &ctx, accessed_at, &settings.markers());
            match &outcome {
                Ok(PageOutcome::Parsed(report)) => {
                    println!("{}", serde_json::to_string_pretty(&report.offers)?);
                    for d in &report.dropped {
                        eprintln!("dropped segment at {}: {}", d.offset, d.reason);
                    }
                    for u in &report.unclassified {
                        eprintln!("unclassified at {}: {:?}", u.offset, u.token);
                    }
                }
                Ok(PageOutcome::NoOffersFound) => eprintln!("No offers found."),
                Err(e) => eprintln!("{}", e),
            }

            if save {
                let conn = db::connect(&settings.db_path)?;
                db::init_schema(&conn)?;
                let row = pipeline::page_row(ctx, accessed_at, outcome);
                let saved = db::save_pages(&conn, std::slice::from_ref(&row))?;
                eprintln!("Saved {} offers to {}", saved, settings.db_path);
            }
            Ok(())
        }
        Commands::Run { limit } => {
            if settings.routes.is_empty() {
                println!("No routes configured. Add [[routes]] to flights.toml.");
                return Ok(());
            }
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let summary = pipeline::run(&conn, &settings, limit).await?;
            summary.print();
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Pages:      {}", s.pages);
            println!("  ok:       {}", s.pages_ok);
            println!("  empty:    {}", s.pages_no_offers);
            println!("  failed:   {}", s.pages_failed);
            println!("Offers:     {}", s.offers);
            println!("Dropped:    {}", s.dropped);

            let routes = db::route_stats(&conn)?;
            if !routes.is_empty() {
                println!();
                println!(
                    "{:<8} | {:>6} | {:>9} | {:>6} | {:<14}",
                    "Route", "Offers", "Avg", "Min", "Avg time"
                );
                println!("{}", "-".repeat(55));
                for r in &routes {
                    let avg = r.avg_price.map(|p| format!("{:.2}", p)).unwrap_or_else(|| "-".into());
                    let min = r.min_price.map(|p| p.to_string()).unwrap_or_else(|| "-".into());
                    println!(
                        "{:<8} | {:>6} | {:>9} | {:>6} | {:<14}",
                        format!("{}-{}", r.origin, r.destination),
                        r.offers,
                        avg,
                        min,
                        parser::duration::format_duration(r.avg_travel_minutes)
                    );
                }
            }
            if let Some(c) = db::cheapest_offer(&conn)? {
                println!(
                    "\nCheapest: {} {} {}-{} {} ({})",
                    c.price,
                    settings.currency,
                    c.origin,
                    c.destination,
                    c.departure,
                    c.airlines.join(", ")
                );
            }
            Ok(())
        }
        Commands::Routes => {
            let contexts = settings.contexts(Local::now().date_naive());
            for ctx in &contexts {
                println!("{}  {}", ctx, fetch::search_url(ctx, &settings.currency, &settings.country));
            }
            println!("\n{} searches", contexts.len());
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        eprintln!("\nDone in {}", format_elapsed(elapsed));
    }

    result
}

fn format_elapsed(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
