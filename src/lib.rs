//! On-demand, memory-bounded page rasterization for document viewers.
//!
//! A [`DocumentSession`] owns one open document: the backend handle that
//! decodes pages, a byte-bounded LRU [`PageCache`] of rendered images,
//! and one coordination slot per page. The presentation layer feeds it
//! the visible page indices and the current scale on every viewport
//! change; the session renders on a worker pool, reuses cached images,
//! cancels superseded in-flight work, and publishes results to per-page
//! [`PageObserver`] subscriptions.
//!
//! Rendering engines plug in through the [`RenderBackend`] trait; a
//! MuPDF adapter ships behind the default `pdf` feature.

pub mod backend;
pub mod cache;
pub mod error;
pub mod session;
pub mod slot;
pub mod types;
pub mod zoom;

mod worker;

#[cfg(feature = "pdf")]
pub mod pdf;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use backend::RenderBackend;
pub use cache::PageCache;
pub use error::{OpenError, PageRangeError, RenderError, RequestError};
pub use session::{DocumentSession, SessionConfig};
pub use slot::{PageObserver, PageUpdate};
pub use types::{PageKey, PixelFormat, RenderedImage};
pub use zoom::Zoom;

#[cfg(feature = "pdf")]
pub use pdf::PdfBackend;

/// Default cache budget in bytes
pub const DEFAULT_CACHE_BUDGET: usize = 4 * 1024 * 1024;

/// Fallback worker count when available parallelism cannot be queried
pub const DEFAULT_WORKERS: usize = 2;

/// Pages prefetched on each side of the visible range
pub const DEFAULT_PREFETCH_RADIUS: usize = 1;
