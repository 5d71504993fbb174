//! Core types for page rasterization

/// Pixel layout of a rendered page image
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 3 bytes per pixel: R, G, B
    Rgb8,
    /// 4 bytes per pixel: R, G, B, A
    Rgba8,
}

impl PixelFormat {
    /// Bytes occupied by one pixel in this format
    #[must_use]
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb8 => 3,
            Self::Rgba8 => 4,
        }
    }
}

/// Cache key identifying one renderable artifact: a page at a scale.
///
/// The same page at two different scales is two distinct artifacts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PageKey {
    /// Page number (0-indexed)
    pub page: usize,
    /// Scale factor (stored as millionths for stable hashing)
    pub scale_millionths: u32,
}

impl PageKey {
    /// Create a key from a page index and a scale factor
    #[must_use]
    pub fn new(page: usize, scale: f32) -> Self {
        Self {
            page,
            scale_millionths: (scale * 1_000_000.0) as u32,
        }
    }

    /// Scale factor this key encodes
    #[must_use]
    pub fn scale(&self) -> f32 {
        self.scale_millionths as f32 / 1_000_000.0
    }
}

/// Owned pixel buffer produced by one successful page render.
///
/// Immutable after creation. Shared behind [`std::sync::Arc`]; the buffer is freed
/// when the last reference drops (cache eviction, replacement, or session
/// close), so a released image can never be read.
#[derive(Clone)]
pub struct RenderedImage {
    /// Tightly packed pixel rows, `width * height * bytes_per_pixel` bytes
    pub pixels: Vec<u8>,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Pixel layout of `pixels`
    pub format: PixelFormat,
}

impl RenderedImage {
    /// Size of the pixel buffer in bytes
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}

impl std::fmt::Debug for RenderedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_key_distinguishes_scales() {
        let a = PageKey::new(3, 1.0);
        let b = PageKey::new(3, 2.0);
        assert_ne!(a, b);
        assert_eq!(a, PageKey::new(3, 1.0));
    }

    #[test]
    fn page_key_scale_roundtrip() {
        let key = PageKey::new(0, 1.25);
        assert!((key.scale() - 1.25).abs() < 1e-5);
    }
}
