//! Deterministic mock backend for tests

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::backend::RenderBackend;
use crate::error::RenderError;
use crate::types::{PageKey, PixelFormat, RenderedImage};

#[derive(Debug)]
struct MockState {
    failing: Mutex<HashSet<usize>>,
    total_calls: AtomicUsize,
    calls_by_key: Mutex<HashMap<PageKey, usize>>,
}

/// Test backend with a configurable page count, per-render delay and
/// per-page failure injection.
///
/// Counts every backend invocation so tests can assert on duplicate
/// suppression and close() safety. Clones share counters and the
/// failure set, letting a test keep a handle after the session takes
/// ownership of the backend.
#[derive(Clone, Debug)]
pub struct MockBackend {
    pages: usize,
    intrinsic: (u32, u32),
    delay: Duration,
    concurrent: bool,
    state: Arc<MockState>,
}

impl MockBackend {
    /// Create a backend with `pages` pages of 100x100 intrinsic points
    #[must_use]
    pub fn new(pages: usize) -> Self {
        Self {
            pages,
            intrinsic: (100, 100),
            delay: Duration::ZERO,
            concurrent: true,
            state: Arc::new(MockState {
                failing: Mutex::new(HashSet::new()),
                total_calls: AtomicUsize::new(0),
                calls_by_key: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Make every render call sleep for `delay` before returning
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Override the intrinsic page size in points
    #[must_use]
    pub fn with_intrinsic_size(mut self, width: u32, height: u32) -> Self {
        self.intrinsic = (width, height);
        self
    }

    /// Declare the backend unsafe for cross-page concurrency, forcing
    /// the session into its serialization fallback
    #[must_use]
    pub fn serial_only(mut self) -> Self {
        self.concurrent = false;
        self
    }

    /// Make every subsequent render of `page` fail
    pub fn fail_page(&self, page: usize) {
        self.state
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(page);
    }

    /// Let `page` render successfully again
    pub fn heal_page(&self, page: usize) {
        self.state
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&page);
    }

    /// Total number of render invocations so far
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.state.total_calls.load(Ordering::SeqCst)
    }

    /// Render invocations for one (page, scale) key
    #[must_use]
    pub fn calls_for(&self, page: usize, scale: f32) -> usize {
        self.state
            .calls_by_key
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&PageKey::new(page, scale))
            .copied()
            .unwrap_or(0)
    }
}

impl RenderBackend for MockBackend {
    fn page_count(&self) -> usize {
        self.pages
    }

    fn render_page(&self, page: usize, scale: f32) -> Result<RenderedImage, RenderError> {
        self.state.total_calls.fetch_add(1, Ordering::SeqCst);
        *self
            .state
            .calls_by_key
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(PageKey::new(page, scale))
            .or_insert(0) += 1;

        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        let failing = self
            .state
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&page);
        if failing {
            return Err(RenderError::new(page, "injected failure"));
        }

        let width = (self.intrinsic.0 as f32 * scale).round() as u32;
        let height = (self.intrinsic.1 as f32 * scale).round() as u32;
        let format = PixelFormat::Rgb8;
        Ok(RenderedImage {
            // Fill with the page index so tests can tell results apart.
            pixels: vec![page as u8; width as usize * height as usize * format.bytes_per_pixel()],
            width,
            height,
            format,
        })
    }

    fn concurrent_renders(&self) -> bool {
        self.concurrent
    }
}
