//! Render worker loop - runs on the session's worker threads

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use flume::Receiver;
use log::{debug, trace, warn};

use crate::backend::RenderBackend;
use crate::cache::PageCache;
use crate::slot::{CancelFlag, PageSlot};
use crate::types::PageKey;

/// Message consumed by render workers
pub(crate) enum WorkerMsg {
    Render(RenderJob),
    Shutdown,
}

/// One render task for a page slot
pub(crate) struct RenderJob {
    pub key: PageKey,
    /// Original scale value; the key only carries its quantized form
    pub scale: f32,
    /// Request generation this job publishes under
    pub generation: u64,
    pub cancel: CancelFlag,
    /// Whether this job was scheduled speculatively (neighbour prefetch)
    pub prefetch: bool,
}

/// Shared state handed to each worker thread
pub(crate) struct WorkerContext<B: RenderBackend> {
    pub backend: Arc<B>,
    pub cache: Arc<Mutex<PageCache>>,
    pub slots: Arc<Vec<Arc<PageSlot>>>,
    /// Session-wide critical section, present only when the backend
    /// cannot take concurrent calls across pages
    pub serial_lock: Option<Arc<Mutex<()>>>,
}

impl<B: RenderBackend> Clone for WorkerContext<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            cache: self.cache.clone(),
            slots: self.slots.clone(),
            serial_lock: self.serial_lock.clone(),
        }
    }
}

/// Worker entry point; loops until a `Shutdown` message arrives
pub(crate) fn render_worker<B: RenderBackend>(ctx: WorkerContext<B>, jobs: Receiver<WorkerMsg>) {
    for msg in jobs {
        match msg {
            WorkerMsg::Render(job) => run_job(&ctx, job),
            WorkerMsg::Shutdown => break,
        }
    }
}

fn run_job<B: RenderBackend>(ctx: &WorkerContext<B>, job: RenderJob) {
    let slot = &ctx.slots[job.key.page];
    trace!(
        "{} page {} at {:.2}x",
        if job.prefetch { "prefetch" } else { "render" },
        job.key.page,
        job.scale
    );

    if job.cancel.load(Ordering::Acquire) {
        slot.discard(job.generation);
        return;
    }

    // Another request may have populated the key while this job queued.
    if let Some(image) = lock_cache(&ctx.cache).get(&job.key) {
        slot.publish(job.generation, image);
        return;
    }

    // Per-page exclusion: renders for the same page never overlap, while
    // different pages proceed in parallel. Backends that cannot handle
    // cross-page concurrency get one session-wide critical section on top.
    let _serial = ctx
        .serial_lock
        .as_ref()
        .map(|lock| lock.lock().unwrap_or_else(PoisonError::into_inner));
    let _page = slot
        .render_lock
        .lock()
        .unwrap_or_else(PoisonError::into_inner);

    if job.cancel.load(Ordering::Acquire) {
        slot.discard(job.generation);
        return;
    }

    // Re-check under the render lock: a racing request for the same key
    // may have finished while this job waited on it.
    if let Some(image) = lock_cache(&ctx.cache).get(&job.key) {
        slot.publish(job.generation, image);
        return;
    }

    match ctx.backend.render_page(job.key.page, job.scale) {
        Ok(image) => {
            // Cancellation is cooperative: the backend call completed,
            // now decide whether anyone still wants the result. A
            // superseded render is dropped without touching the cache.
            if job.cancel.load(Ordering::Acquire) || !slot.is_current(job.generation) {
                slot.discard(job.generation);
                return;
            }
            let bytes = image.byte_len();
            let image = Arc::new(image);
            lock_cache(&ctx.cache).put(job.key, image.clone());
            slot.publish(job.generation, image);
            debug!(
                "rendered page {} at {:.2}x ({bytes} bytes)",
                job.key.page, job.scale
            );
        }
        Err(error) => {
            warn!("render failed: {error}");
            slot.fail(job.generation, error);
        }
    }
}

fn lock_cache(cache: &Mutex<PageCache>) -> MutexGuard<'_, PageCache> {
    cache.lock().unwrap_or_else(PoisonError::into_inner)
}
