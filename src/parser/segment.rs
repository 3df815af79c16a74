use std::ops::Range;

use super::duration::TIME_RE;
use super::error::PageError;

/// Time tokens closer than this belong to the same offer.
const MIN_GAP: usize = 4;

/// Locates the part of the page that holds the listing.
pub trait ListingBounds {
    fn bounds(&self, tokens: &[String]) -> Result<Range<usize>, PageError>;
}

/// Bounds the listing between two literal marker lines (prefix match).
/// The start marker itself is excluded, as is everything from the end
/// marker on.
#[derive(Debug, Clone)]
pub struct LiteralMarkers {
    pub start: String,
    pub end: String,
}

impl Default for LiteralMarkers {
    fn default() -> Self {
        LiteralMarkers {
            start: "Sort by:".to_string(),
            end: "Language".to_string(),
        }
    }
}

impl ListingBounds for LiteralMarkers {
    fn bounds(&self, tokens: &[String]) -> Result<Range<usize>, PageError> {
        let start = tokens
            .iter()
            .position(|t| t.starts_with(&self.start))
            .map(|i| i + 1)
            .ok_or_else(|| PageError::AnchorNotFound {
                marker: self.start.clone(),
            })?;
        let end = tokens[start..]
            .iter()
            .position(|t| t.starts_with(&self.end))
            .map(|i| start + i)
            .ok_or_else(|| PageError::AnchorNotFound {
                marker: self.end.clone(),
            })?;
        Ok(start..end)
    }
}

/// Contiguous tokens believed to describe one offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    /// Position of the first token within the bounded listing.
    pub offset: usize,
    pub tokens: &'a [String],
}

/// Split the listing into per-offer segments, anchored on time tokens.
pub fn split_segments<'a>(
    tokens: &'a [String],
    bounds: &dyn ListingBounds,
) -> Result<Vec<Segment<'a>>, PageError> {
    let listing = &tokens[bounds.bounds(tokens)?];
    Ok(split_listing(listing))
}

fn split_listing(listing: &[String]) -> Vec<Segment<'_>> {
    let matches: Vec<usize> = listing
        .iter()
        .enumerate()
        .filter(|(_, t)| TIME_RE.is_match(t))
        .map(|(i, _)| i)
        .collect();
    if matches.len() < 2 {
        return Vec::new();
    }

    let mut boundaries = vec![matches[0]];
    for pair in matches.windows(2) {
        if pair[1] - pair[0] >= MIN_GAP {
            boundaries.push(pair[1]);
        }
    }
    boundaries.push(listing.len());

    boundaries
        .windows(2)
        .map(|w| Segment {
            offset: w[0],
            tokens: &listing[w[0]..w[1]],
        })
        .collect()
}
