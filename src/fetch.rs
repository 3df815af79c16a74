use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, bail, Result};
use chrono::{Local, NaiveDateTime};
use indicatif::{ProgressBar, ProgressStyle};
use spider_client::shapes::request::{ReturnFormat, ReturnFormatHandling};
use spider_client::{RequestParams, Spider};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::model::SearchContext;
use crate::settings::Settings;

const SEARCH_URL: &str = "https://www.google.com/travel/flights";
const CONSENT_MARKER: &str = "Before you continue to Google";

/// A page as handed to the parser: its lines, and when it was read.
pub struct FetchedPage {
    pub ctx: SearchContext,
    pub accessed_at: NaiveDateTime,
    pub lines: Result<Vec<String>, String>,
}

/// Flight search URL for one context, priced in `currency` for `country`.
pub fn search_url(ctx: &SearchContext, currency: &str, country: &str) -> String {
    let dates = match ctx.return_date {
        Some(ret) => format!("from%20{}%20to%20{}", ctx.departure_date, ret),
        None => format!("on%20{}%20oneway", ctx.departure_date),
    };
    format!(
        "{}?q=Flights%20to%20{}%20from%20{}%20{}&curr={}&gl={}",
        SEARCH_URL, ctx.destination, ctx.origin, dates, currency, country
    )
}

/// Split page text into lines, rejecting the cookie-consent interstitial.
pub fn page_lines(text: &str) -> Result<Vec<String>> {
    if text.contains(CONSENT_MARKER) {
        bail!("consent page served instead of results");
    }
    Ok(text.lines().map(str::to_string).collect())
}

/// Fetch every context's page concurrently. Failures are per page; the
/// batch never aborts because one page could not be read.
pub async fn fetch_pages(settings: &Settings, contexts: Vec<SearchContext>) -> Result<Vec<FetchedPage>> {
    let api_key = std::env::var("SPIDER_API_KEY")
        .map_err(|_| anyhow!("SPIDER_API_KEY environment variable must be set"))?;
    let spider = Arc::new(
        Spider::new(Some(api_key)).map_err(|e| anyhow!("Failed to create Spider client: {}", e))?,
    );
    let semaphore = Arc::new(Semaphore::new(settings.concurrency));

    let pb = ProgressBar::new(contexts.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} pages ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let (tx, mut rx) = tokio::sync::mpsc::channel::<FetchedPage>(settings.concurrency * 2);

    for ctx in contexts {
        let spider = Arc::clone(&spider);
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();
        let url = search_url(&ctx, &settings.currency, &settings.country);

        tokio::spawn(async move {
            let lines = match sem.acquire().await {
                Ok(_permit) => fetch_text(&spider, &url).await.and_then(|t| page_lines(&t)),
                Err(e) => Err(e.into()),
            };
            // Every offer on the page shares this instant.
            let accessed_at = Local::now().naive_local();
            let lines = lines.map_err(|e| {
                warn!("Fetch failed for {}: {}", ctx, e);
                e.to_string()
            });
            let _ = tx.send(FetchedPage { ctx, accessed_at, lines }).await;
        });
    }

    drop(tx);

    let mut pages = Vec::new();
    while let Some(page) = rx.recv().await {
        pages.push(page);
        pb.inc(1);
    }
    pb.finish_and_clear();
    Ok(pages)
}

async fn fetch_text(spider: &Spider, url: &str) -> Result<String> {
    let params = RequestParams {
        return_format: Some(ReturnFormatHandling::Single(ReturnFormat::Text)),
        ..Default::default()
    };

    let start = Instant::now();
    let response = spider
        .scrape_url(url, Some(params), "application/json")
        .await
        .map_err(|e| anyhow!("Spider scrape failed: {}", e))?;
    debug!("Fetched {} in {}ms", url, start.elapsed().as_millis());

    let parsed: serde_json::Value = match response.as_str() {
        Some(s) => serde_json::from_str(s).unwrap_or(response.clone()),
        None => response,
    };

    parsed
        .as_array()
        .and_then(|arr| arr.first())
        .and_then(|obj| obj.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("No content in spider response"))
}
