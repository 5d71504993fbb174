//! Error taxonomy for session creation and page rendering

use thiserror::Error;

/// Fatal error opening a document source.
///
/// No partial session is constructed when opening fails.
#[derive(Debug, Error)]
pub enum OpenError {
    /// The engine rejected the source (unreadable, corrupt, unsupported)
    #[error("cannot open document: {0}")]
    Engine(String),

    /// The document opened but contains no pages
    #[error("document has no pages")]
    EmptyDocument,
}

/// A single page failed to rasterize.
///
/// Contained at page granularity: the slot keeps its previously published
/// image and the session stays usable for every other page.
#[derive(Clone, Debug, Error)]
#[error("page {page} failed to render: {detail}")]
pub struct RenderError {
    /// Page number (0-indexed)
    pub page: usize,
    /// Engine-specific failure description
    pub detail: String,
}

impl RenderError {
    /// Create a render error for a page
    pub fn new(page: usize, detail: impl Into<String>) -> Self {
        Self {
            page,
            detail: detail.into(),
        }
    }
}

/// Requested page index outside the document bounds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("page index {page} out of range (document has {page_count} pages)")]
pub struct PageRangeError {
    /// The rejected page index
    pub page: usize,
    /// Total pages in the document
    pub page_count: usize,
}

/// Rejection of a single render request.
///
/// Rejections are per-index: one rejected request never aborts the rest
/// of a batch.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum RequestError {
    /// Page index outside the document bounds
    #[error(transparent)]
    OutOfRange(#[from] PageRangeError),

    /// Scale must be a finite positive multiplier
    #[error("invalid scale factor {0}")]
    InvalidScale(f32),

    /// The session has been closed; no further requests are accepted
    #[error("session is closed")]
    Closed,
}
