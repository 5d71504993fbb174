//! Contract for the underlying rasterization capability

use crate::error::RenderError;
use crate::types::RenderedImage;

/// An opaque rasterization capability wrapping one open document handle.
///
/// The session drives this contract but does not implement it; adapters
/// wrap whatever engine actually decodes pages. Output pixel dimensions
/// are `round(intrinsic_width * scale)` by `round(intrinsic_height * scale)`,
/// where the intrinsic size is the page's point size.
pub trait RenderBackend: Send + Sync + 'static {
    /// Number of pages in the document; fixed for the handle's lifetime
    fn page_count(&self) -> usize;

    /// Rasterize one page at the given positive scale multiplier.
    ///
    /// Callers guarantee `page < page_count()` and a finite positive
    /// scale. A failure here is a per-page condition; the session
    /// recovers and keeps serving other pages.
    fn render_page(&self, page: usize, scale: f32) -> Result<RenderedImage, RenderError>;

    /// Whether `render_page` may be invoked concurrently for different
    /// pages.
    ///
    /// Engines that share mutable decode state across pages return
    /// `false`; the session then serializes every backend call through a
    /// single session-wide lock instead of per-page locks, trading
    /// parallelism for correctness.
    fn concurrent_renders(&self) -> bool {
        true
    }
}
