//! Failure taxonomy for parsing one results page.
//!
//! Only [`PageError`] aborts a page. Everything per offer is a
//! [`DropReason`] that ends up in the page report next to the offers that
//! did make it.

/// Fatal for the whole page: no reliable segmentation is possible.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PageError {
    #[error("listing marker not found: {marker:?}")]
    AnchorNotFound { marker: String },
}

/// Why a single segment did not become an offer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DropReason {
    #[error("segment too short: {tokens} usable tokens")]
    MalformedSegment { tokens: usize },

    #[error("missing required field: {0}")]
    MissingSlot(&'static str),

    #[error("unparseable duration: {0:?}")]
    UnparseableDuration(String),

    #[error("unparseable time: {0:?}")]
    UnparseableTime(String),
}
