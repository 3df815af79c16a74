pub mod assemble;
pub mod classify;
pub mod duration;
pub mod error;
pub mod normalize;
pub mod segment;

use chrono::NaiveDateTime;
use rayon::prelude::*;

use crate::model::{FlightOffer, SearchContext};
use error::{DropReason, PageError};
use normalize::Normalized;
use segment::{ListingBounds, Segment};

#[derive(Debug)]
pub enum PageOutcome {
    /// The page said so, or no offer could be located.
    NoOffersFound,
    Parsed(PageReport),
}

#[derive(Debug, Default)]
pub struct PageReport {
    pub offers: Vec<FlightOffer>,
    pub dropped: Vec<DroppedOffer>,
    pub unclassified: Vec<UnclassifiedToken>,
    pub segments: usize,
    /// Result count the page announced, when it did.
    pub expected_offers: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedOffer {
    /// Offset of the segment's first token within the listing.
    pub offset: usize,
    pub reason: DropReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnclassifiedToken {
    pub offset: usize,
    pub token: String,
}

/// Four-stage pipeline: raw lines → clean tokens → segments → offers.
///
/// Segments are classified in parallel; the report keeps page order.
pub fn parse_page(
    raw: &[String],
    ctx: &SearchContext,
    accessed_at: NaiveDateTime,
    bounds: &dyn ListingBounds,
) -> Result<PageOutcome, PageError> {
    let tokens = match normalize::normalize(raw) {
        Normalized::NoOffersFound => return Ok(PageOutcome::NoOffersFound),
        Normalized::Tokens(t) => t,
    };

    let segments = segment::split_segments(&tokens, bounds)?;
    if segments.is_empty() {
        return Ok(PageOutcome::NoOffersFound);
    }

    let results: Vec<_> = segments
        .par_iter()
        .map(|seg| parse_segment(seg, ctx, accessed_at))
        .collect();

    let mut report = PageReport {
        segments: segments.len(),
        expected_offers: normalize::expected_result_count(&tokens),
        ..Default::default()
    };
    for (seg, (leftovers, result)) in segments.iter().zip(results) {
        report
            .unclassified
            .extend(leftovers.into_iter().map(|token| UnclassifiedToken {
                offset: seg.offset,
                token,
            }));
        match result {
            Ok(offer) => report.offers.push(offer),
            Err(reason) => report.dropped.push(DroppedOffer {
                offset: seg.offset,
                reason,
            }),
        }
    }
    Ok(PageOutcome::Parsed(report))
}

fn parse_segment(
    seg: &Segment<'_>,
    ctx: &SearchContext,
    accessed_at: NaiveDateTime,
) -> (Vec<String>, Result<FlightOffer, DropReason>) {
    match classify::classify_segment(seg.tokens, ctx) {
        Err(reason) => (Vec::new(), Err(reason)),
        Ok(mut state) => {
            let leftovers = std::mem::take(&mut state.unclassified);
            (leftovers, assemble::assemble(state, ctx, accessed_at))
        }
    }
}

// ── Tests ──
