//! MuPDF-backed rasterization backend

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use mupdf::{Colorspace, Document, Matrix, Pixmap};

use crate::backend::RenderBackend;
use crate::error::{OpenError, RenderError};
use crate::types::{PixelFormat, RenderedImage};

/// Rasterization backend driving a MuPDF document handle.
///
/// MuPDF document handles are not safe for concurrent page access, so
/// the handle lives behind a mutex and [`RenderBackend::concurrent_renders`]
/// reports `false`: the session serializes all backend calls instead of
/// only same-page calls.
pub struct PdfBackend {
    doc: Mutex<Document>,
    page_count: usize,
}

impl PdfBackend {
    /// Open a document from a file path
    pub fn open(path: &Path) -> Result<Self, OpenError> {
        let doc = Document::open(path.to_string_lossy().as_ref())
            .map_err(|e| OpenError::Engine(e.to_string()))?;
        let page_count = doc
            .page_count()
            .map_err(|e| OpenError::Engine(e.to_string()))? as usize;
        if page_count == 0 {
            return Err(OpenError::EmptyDocument);
        }

        Ok(Self {
            doc: Mutex::new(doc),
            page_count,
        })
    }
}

impl RenderBackend for PdfBackend {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn render_page(&self, page: usize, scale: f32) -> Result<RenderedImage, RenderError> {
        let doc = self.doc.lock().unwrap_or_else(PoisonError::into_inner);
        let loaded = doc
            .load_page(page as i32)
            .map_err(|e| RenderError::new(page, e.to_string()))?;

        let transform = Matrix::new_scale(scale, scale);
        let rgb = Colorspace::device_rgb();
        let pixmap = loaded
            .to_pixmap(&transform, &rgb, false, false)
            .map_err(|e| RenderError::new(page, e.to_string()))?;

        let pixels = pixmap_to_rgb(&pixmap).map_err(|detail| RenderError::new(page, detail))?;

        Ok(RenderedImage {
            width: pixmap.width(),
            height: pixmap.height(),
            format: PixelFormat::Rgb8,
            pixels,
        })
    }

    fn concurrent_renders(&self) -> bool {
        false
    }
}

/// Repack pixmap samples into tight RGB rows, dropping any alpha channel
fn pixmap_to_rgb(pixmap: &Pixmap) -> Result<Vec<u8>, String> {
    let n = pixmap.n() as usize;
    if n < 3 {
        return Err(format!("unsupported pixmap format: {n} channels"));
    }

    let width = pixmap.width() as usize;
    let height = pixmap.height() as usize;
    let stride = pixmap.stride() as usize;
    let samples = pixmap.samples();
    let row_bytes = width * n;
    let expected_min = stride.saturating_mul(height);
    if samples.len() < expected_min || row_bytes > stride {
        return Err("pixmap buffer size mismatch".to_string());
    }

    let mut out = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        let row_start = y * stride;
        let row = &samples[row_start..row_start + row_bytes];
        if n == 3 {
            out.extend_from_slice(row);
        } else {
            for px in row.chunks_exact(n) {
                out.extend_from_slice(&px[..3]);
            }
        }
    }

    Ok(out)
}
