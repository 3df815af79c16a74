use anyhow::Result;
use chrono::{Local, NaiveDateTime};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::db::{self, PageRow, PageStatus};
use crate::fetch::{self, FetchedPage};
use crate::model::SearchContext;
use crate::parser::error::PageError;
use crate::parser::normalize::find_price_trend;
use crate::parser::segment::ListingBounds;
use crate::parser::{self, PageOutcome, PageReport};
use crate::settings::Settings;

const CHUNK: usize = 500;

#[derive(Debug, Default)]
pub struct RunSummary {
    pub pages: usize,
    pub ok: usize,
    pub no_offers: usize,
    pub failed: usize,
    pub offers: usize,
    pub dropped: usize,
    pub unclassified: usize,
}

impl RunSummary {
    fn add(&mut self, row: &PageRow) {
        self.pages += 1;
        match row.status {
            PageStatus::Ok => self.ok += 1,
            PageStatus::NoOffers => self.no_offers += 1,
            PageStatus::AnchorNotFound | PageStatus::FetchError => self.failed += 1,
        }
        self.offers += row.offers.len();
        self.dropped += row.dropped;
        self.unclassified += row.unclassified;
    }

    pub fn print(&self) {
        println!(
            "{} pages ({} ok, {} without offers, {} failed): saved {} offers, dropped {}, {} unclassified tokens.",
            self.pages, self.ok, self.no_offers, self.failed, self.offers, self.dropped, self.unclassified,
        );
    }
}

/// Fetch → parse → save for every configured search, up to `limit` pages.
pub async fn run(conn: &Connection, settings: &Settings, limit: Option<usize>) -> Result<RunSummary> {
    let mut contexts = settings.contexts(Local::now().date_naive());
    if let Some(n) = limit {
        contexts.truncate(n);
    }
    if contexts.is_empty() {
        return Ok(RunSummary::default());
    }

    info!("Fetching {} pages", contexts.len());
    let pages = fetch::fetch_pages(settings, contexts).await?;
    process_pages(conn, &pages, &settings.markers())
}

/// Parse fetched pages in parallel and persist them chunk by chunk.
pub fn process_pages(
    conn: &Connection,
    pages: &[FetchedPage],
    bounds: &(dyn ListingBounds + Sync),
) -> Result<RunSummary> {
    let pb = ProgressBar::new(pages.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let mut summary = RunSummary::default();
    for chunk in pages.chunks(CHUNK) {
        let rows: Vec<PageRow> = chunk.par_iter().map(|p| process_page(p, bounds)).collect();
        for row in &rows {
            summary.add(row);
        }
        db::save_pages(conn, &rows)?;
        pb.inc(chunk.len() as u64);
    }
    pb.finish_and_clear();

    info!(
        "Processed {} pages: {} offers saved, {} dropped",
        summary.pages, summary.offers, summary.dropped
    );
    Ok(summary)
}

fn process_page(page: &FetchedPage, bounds: &dyn ListingBounds) -> PageRow {
    match &page.lines {
        Err(e) => PageRow::failed(page.ctx.clone(), page.accessed_at, PageStatus::FetchError, e.clone()),
        Ok(lines) => {
            let ctx = page.ctx.clone().with_price_trend(find_price_trend(lines));
            let outcome = parser::parse_page(lines, &ctx, page.accessed_at, bounds);
            page_row(ctx, page.accessed_at, outcome)
        }
    }
}

/// Fold a parse outcome into the row recorded for its page, logging what
/// the parser reported along the way.
pub fn page_row(
    ctx: SearchContext,
    accessed_at: NaiveDateTime,
    outcome: Result<PageOutcome, PageError>,
) -> PageRow {
    match outcome {
        Err(e) => {
            warn!("{}: {}", ctx, e);
            PageRow::failed(ctx, accessed_at, PageStatus::AnchorNotFound, e.to_string())
        }
        Ok(PageOutcome::NoOffersFound) => {
            debug!("{}: no offers", ctx);
            PageRow {
                ctx,
                accessed_at,
                status: PageStatus::NoOffers,
                segments: 0,
                expected_offers: None,
                offers: Vec::new(),
                dropped: 0,
                unclassified: 0,
                error: None,
            }
        }
        Ok(PageOutcome::Parsed(report)) => {
            log_report(&ctx, &report);
            PageRow {
                ctx,
                accessed_at,
                status: PageStatus::Ok,
                segments: report.segments,
                expected_offers: report.expected_offers,
                dropped: report.dropped.len(),
                unclassified: report.unclassified.len(),
                offers: report.offers,
                error: None,
            }
        }
    }
}

fn log_report(ctx: &SearchContext, report: &PageReport) {
    for d in &report.dropped {
        debug!("{}: dropped segment at {}: {}", ctx, d.offset, d.reason);
    }
    for u in &report.unclassified {
        debug!("{}: unclassified token at {}: {:?}", ctx, u.offset, u.token);
    }
    if let Some(expected) = report.expected_offers {
        if expected != report.segments {
            warn!(
                "{}: page announced {} results but {} segments were found",
                ctx, expected, report.segments
            );
        }
    }
}
