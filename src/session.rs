//! Document session - owns the backend handle, cache, slots and workers

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use flume::Sender;
use log::{debug, warn};

use crate::backend::RenderBackend;
use crate::cache::PageCache;
use crate::error::{OpenError, PageRangeError, RequestError};
use crate::slot::{PageObserver, PageSlot};
use crate::types::{PageKey, RenderedImage};
use crate::worker::{RenderJob, WorkerContext, WorkerMsg, render_worker};
use crate::{DEFAULT_CACHE_BUDGET, DEFAULT_PREFETCH_RADIUS, DEFAULT_WORKERS};

/// Session tuning knobs
#[derive(Clone, Copy, Debug)]
pub struct SessionConfig {
    /// Cache budget in bytes
    pub cache_budget: usize,
    /// Number of render worker threads
    pub workers: usize,
    /// Pages prefetched on each side of the visible range
    pub prefetch_radius: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cache_budget: DEFAULT_CACHE_BUDGET,
            workers: std::thread::available_parallelism()
                .map_or(DEFAULT_WORKERS, std::num::NonZeroUsize::get),
            prefetch_radius: DEFAULT_PREFETCH_RADIUS,
        }
    }
}

/// One open document: the unit of resource ownership.
///
/// Owns exactly one backend handle, one [`PageCache`] and one page slot
/// per page. Render requests are handed to a worker pool; results are
/// published to per-page observers. [`DocumentSession::close`] tears
/// everything down deterministically and is idempotent; dropping the
/// session closes it as well.
#[derive(Debug)]
pub struct DocumentSession<B: RenderBackend> {
    backend: Mutex<Option<Arc<B>>>,
    cache: Arc<Mutex<PageCache>>,
    slots: Arc<Vec<Arc<PageSlot>>>,
    jobs: Sender<WorkerMsg>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    page_count: usize,
    prefetch_radius: usize,
    workers: usize,
    closed: AtomicBool,
}

impl<B: RenderBackend> DocumentSession<B> {
    /// Open a session over an already-acquired backend handle with the
    /// default configuration
    pub fn open(backend: B) -> Result<Self, OpenError> {
        Self::open_with_config(backend, SessionConfig::default())
    }

    /// Open a session with explicit configuration
    pub fn open_with_config(backend: B, config: SessionConfig) -> Result<Self, OpenError> {
        let page_count = backend.page_count();
        if page_count == 0 {
            return Err(OpenError::EmptyDocument);
        }

        let backend = Arc::new(backend);
        let cache = Arc::new(Mutex::new(PageCache::new(config.cache_budget)));
        let slots: Arc<Vec<Arc<PageSlot>>> =
            Arc::new((0..page_count).map(|p| Arc::new(PageSlot::new(p))).collect());
        let serial_lock = if backend.concurrent_renders() {
            None
        } else {
            Some(Arc::new(Mutex::new(())))
        };

        let (jobs_tx, jobs_rx) = flume::unbounded();

        let workers = config.workers.max(1);
        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let ctx = WorkerContext {
                backend: backend.clone(),
                cache: cache.clone(),
                slots: slots.clone(),
                serial_lock: serial_lock.clone(),
            };
            let rx = jobs_rx.clone();
            handles.push(std::thread::spawn(move || render_worker(ctx, rx)));
        }

        debug!(
            "session opened: {page_count} pages, {workers} workers, {} byte cache budget",
            config.cache_budget
        );

        Ok(Self {
            backend: Mutex::new(Some(backend)),
            cache,
            slots,
            jobs: jobs_tx,
            handles: Mutex::new(handles),
            page_count,
            prefetch_radius: config.prefetch_radius,
            workers,
            closed: AtomicBool::new(false),
        })
    }

    /// Number of pages in the open document
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Whether the session has been closed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Request a render of one page at the given scale.
    ///
    /// A cache hit publishes synchronously without a backend call. A miss
    /// cancels any superseded in-flight render for the page and hands the
    /// job to the worker pool; a request for the key already being
    /// rendered coalesces onto the pending work instead.
    pub fn request_page(&self, page: usize, scale: f32) -> Result<(), RequestError> {
        self.submit(page, scale, false)
    }

    /// Batch request: render every index at `scale`.
    ///
    /// Returns per-index rejections; a rejected index never aborts the
    /// rest of the batch.
    pub fn request_pages(&self, pages: &[usize], scale: f32) -> Vec<(usize, RequestError)> {
        let mut rejected = Vec::new();
        for &page in pages {
            if let Err(error) = self.request_page(page, scale) {
                rejected.push((page, error));
            }
        }
        rejected
    }

    /// Viewport-driven request: render the visible pages, then prefetch
    /// neighbours within the configured radius that are neither cached
    /// nor already in flight.
    pub fn request_visible(&self, visible: &[usize], scale: f32) -> Vec<(usize, RequestError)> {
        let rejected = self.request_pages(visible, scale);

        if self.prefetch_radius > 0 && !visible.is_empty() {
            let lo = visible.iter().copied().min().unwrap_or(0);
            let hi = visible.iter().copied().max().unwrap_or(0);
            for offset in 1..=self.prefetch_radius {
                if hi + offset < self.page_count {
                    self.maybe_prefetch(hi + offset, scale);
                }
                if lo >= offset {
                    self.maybe_prefetch(lo - offset, scale);
                }
            }
        }

        rejected
    }

    fn maybe_prefetch(&self, page: usize, scale: f32) {
        if self.lock_cache().contains(&PageKey::new(page, scale)) {
            return;
        }
        // begin_request coalesces onto an identical in-flight render.
        let _ = self.submit(page, scale, true);
    }

    fn submit(&self, page: usize, scale: f32, prefetch: bool) -> Result<(), RequestError> {
        if self.is_closed() {
            return Err(RequestError::Closed);
        }
        if page >= self.page_count {
            return Err(PageRangeError {
                page,
                page_count: self.page_count,
            }
            .into());
        }
        if !scale.is_finite() || scale <= 0.0 {
            return Err(RequestError::InvalidScale(scale));
        }

        let key = PageKey::new(page, scale);
        let slot = &self.slots[page];
        let Some((generation, cancel)) = slot.begin_request(key) else {
            // Same key already in flight (or slot closed underneath us);
            // the pending render publishes for this request too.
            return Ok(());
        };

        // Fast path: publish straight from the cache, no worker round-trip.
        if let Some(image) = self.lock_cache().get(&key) {
            slot.publish(generation, image);
            return Ok(());
        }

        let job = RenderJob {
            key,
            scale,
            generation,
            cancel,
            prefetch,
        };
        if self.jobs.send(WorkerMsg::Render(job)).is_err() {
            warn!("render pool unavailable for page {page}");
        }
        Ok(())
    }

    /// Subscribe to a page's published renders
    pub fn observe(&self, page: usize) -> Result<PageObserver, PageRangeError> {
        if page >= self.page_count {
            return Err(PageRangeError {
                page,
                page_count: self.page_count,
            });
        }
        Ok(PageObserver::new(self.slots[page].clone()))
    }

    /// Probe the cache for a rendered page without scheduling anything
    #[must_use]
    pub fn cached_image(&self, page: usize, scale: f32) -> Option<Arc<RenderedImage>> {
        self.lock_cache().get(&PageKey::new(page, scale))
    }

    /// Tear the session down: cancel every in-flight render, stop and
    /// join the worker pool, release all cached images and close the
    /// backend handle.
    ///
    /// Safe to call from any thread and idempotent; a second call
    /// returns immediately. In-flight backend calls are awaited and
    /// their results discarded, so once this returns no further backend
    /// call can occur.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        for slot in self.slots.iter() {
            slot.close();
        }

        for _ in 0..self.workers {
            let _ = self.jobs.send(WorkerMsg::Shutdown);
        }

        let handles = std::mem::take(
            &mut *self
                .handles
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for handle in handles {
            if handle.join().is_err() {
                warn!("render worker panicked during shutdown");
            }
        }

        self.lock_cache().clear();

        // Workers are gone; dropping the last reference closes the
        // native handle here.
        self.backend
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        debug!("session closed");
    }

    fn lock_cache(&self) -> MutexGuard<'_, PageCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<B: RenderBackend> Drop for DocumentSession<B> {
    fn drop(&mut self) {
        self.close();
    }
}
