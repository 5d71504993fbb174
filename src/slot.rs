//! Per-page render coordination and result observation
//!
//! Each page of an open document owns one [`PageSlot`] for the session's
//! lifetime. The slot tracks the latest published image, the in-flight
//! render task (at most one per page), and hands out [`PageObserver`]
//! subscriptions to the presentation layer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::RenderError;
use crate::types::{PageKey, RenderedImage};

/// Cooperative cancellation flag handed to an in-flight render task.
///
/// Checked at task start and again after the backend call returns, never
/// mid-call: the backend is allowed to finish, then its result is
/// discarded.
pub(crate) type CancelFlag = Arc<AtomicBool>;

#[derive(Debug)]
struct SlotState {
    /// Monotonic publication counter; bumps on publish, failure and close
    version: u64,
    /// Latest published image; survives later render failures
    image: Option<Arc<RenderedImage>>,
    /// Most recent failure, cleared by the next successful publish
    last_error: Option<RenderError>,
    /// Key and cancel flag of the in-flight render task, if any
    inflight: Option<(PageKey, CancelFlag)>,
    /// Generation of the most recently admitted request; publications
    /// from older generations are discarded
    generation: u64,
    closed: bool,
}

/// Per-page coordination unit: publication state, in-flight task
/// tracking, and the per-page render exclusion.
#[derive(Debug)]
pub(crate) struct PageSlot {
    page: usize,
    state: Mutex<SlotState>,
    updated: Condvar,
    /// Held across the backend call so renders for the same page never
    /// overlap; renders for different pages take different locks
    pub(crate) render_lock: Mutex<()>,
}

impl PageSlot {
    pub(crate) fn new(page: usize) -> Self {
        Self {
            page,
            state: Mutex::new(SlotState {
                version: 0,
                image: None,
                last_error: None,
                inflight: None,
                generation: 0,
                closed: false,
            }),
            updated: Condvar::new(),
            render_lock: Mutex::new(()),
        }
    }

    pub(crate) fn page(&self) -> usize {
        self.page
    }

    /// Admit a new render request for this page.
    ///
    /// Cancels the previous in-flight task, unless that task is already
    /// rendering the same key: then the new request coalesces onto it and
    /// `None` is returned (the pending render will publish for both).
    /// Also returns `None` once the slot is closed.
    pub(crate) fn begin_request(&self, key: PageKey) -> Option<(u64, CancelFlag)> {
        let mut state = self.lock_state();
        if state.closed {
            return None;
        }

        if let Some((inflight_key, cancel)) = &state.inflight {
            if *inflight_key == key && !cancel.load(Ordering::Acquire) {
                return None;
            }
            cancel.store(true, Ordering::Release);
        }

        state.generation += 1;
        let cancel: CancelFlag = Arc::new(AtomicBool::new(false));
        state.inflight = Some((key, cancel.clone()));
        Some((state.generation, cancel))
    }

    /// Publish a rendered image for the given request generation.
    ///
    /// Stale generations and closed slots are no-ops, which is what
    /// keeps an older, slower render from overwriting a newer result.
    pub(crate) fn publish(&self, generation: u64, image: Arc<RenderedImage>) {
        let mut state = self.lock_state();
        if state.closed || generation != state.generation {
            return;
        }
        state.inflight = None;
        state.image = Some(image);
        state.last_error = None;
        state.version += 1;
        drop(state);
        self.updated.notify_all();
    }

    /// Record a per-page render failure.
    ///
    /// The previously published image stays in place so the presentation
    /// layer never flickers to blank on a transient failure.
    pub(crate) fn fail(&self, generation: u64, error: RenderError) {
        let mut state = self.lock_state();
        if state.closed || generation != state.generation {
            return;
        }
        state.inflight = None;
        state.last_error = Some(error);
        state.version += 1;
        drop(state);
        self.updated.notify_all();
    }

    /// A superseded task finished; drop its in-flight claim without
    /// publishing anything.
    pub(crate) fn discard(&self, generation: u64) {
        let mut state = self.lock_state();
        if generation == state.generation {
            state.inflight = None;
        }
    }

    /// Whether the given generation is still the latest admitted request
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        let state = self.lock_state();
        !state.closed && generation == state.generation
    }

    /// Cancel the in-flight task, drop the published image reference and
    /// refuse all further transitions. Late task completions become
    /// no-ops.
    pub(crate) fn close(&self) {
        let mut state = self.lock_state();
        if state.closed {
            return;
        }
        if let Some((_, cancel)) = &state.inflight {
            cancel.store(true, Ordering::Release);
        }
        state.inflight = None;
        state.image = None;
        state.closed = true;
        state.version += 1;
        drop(state);
        self.updated.notify_all();
    }

    fn lock_state(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(state: &SlotState) -> PageUpdate {
        PageUpdate {
            version: state.version,
            image: state.image.clone(),
            error: state.last_error.clone(),
            closed: state.closed,
        }
    }
}

/// One observed publication state of a page
#[derive(Clone, Debug)]
pub struct PageUpdate {
    /// Monotonic publication counter; 0 before the first transition
    pub version: u64,
    /// Latest published image, if any
    pub image: Option<Arc<RenderedImage>>,
    /// Most recent render failure, cleared by the next successful render
    pub error: Option<RenderError>,
    /// Whether the owning session has been closed
    pub closed: bool,
}

/// Continuously updated view of one page's latest render.
///
/// Starts at "no image" and transitions each time a render publishes.
/// For one page, observed results arrive in request order: a superseded
/// render's output is discarded before it can reach an observer.
pub struct PageObserver {
    slot: Arc<PageSlot>,
}

impl PageObserver {
    pub(crate) fn new(slot: Arc<PageSlot>) -> Self {
        Self { slot }
    }

    /// Page index this observer is subscribed to
    #[must_use]
    pub fn page(&self) -> usize {
        self.slot.page()
    }

    /// Latest published image, if any
    #[must_use]
    pub fn latest(&self) -> Option<Arc<RenderedImage>> {
        self.current().image
    }

    /// Snapshot of the current publication state
    #[must_use]
    pub fn current(&self) -> PageUpdate {
        PageSlot::snapshot(&self.slot.lock_state())
    }

    /// Block until the page publishes a version newer than `seen`, the
    /// session closes, or the timeout elapses; returns the state at that
    /// point. Compare [`PageUpdate::version`] against `seen` to tell a
    /// timeout from a transition.
    pub fn wait_for_update(&self, seen: u64, timeout: Duration) -> PageUpdate {
        let deadline = Instant::now() + timeout;
        let mut state = self.slot.lock_state();
        loop {
            if state.version > seen || state.closed {
                return PageSlot::snapshot(&state);
            }
            let now = Instant::now();
            if now >= deadline {
                return PageSlot::snapshot(&state);
            }
            state = self
                .slot
                .updated
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PixelFormat;

    fn img() -> Arc<RenderedImage> {
        Arc::new(RenderedImage {
            pixels: vec![0; 3],
            width: 1,
            height: 1,
            format: PixelFormat::Rgb8,
        })
    }

    #[test]
    fn stale_generation_cannot_publish() {
        let slot = PageSlot::new(0);
        let (old_gen, old_cancel) = slot.begin_request(PageKey::new(0, 1.0)).unwrap();
        let (new_gen, _) = slot.begin_request(PageKey::new(0, 2.0)).unwrap();

        assert!(old_cancel.load(Ordering::Acquire));

        slot.publish(old_gen, img());
        let state = slot.lock_state();
        assert!(state.image.is_none());
        assert_eq!(state.version, 0);
        drop(state);

        slot.publish(new_gen, img());
        let state = slot.lock_state();
        assert!(state.image.is_some());
        assert_eq!(state.version, 1);
    }

    #[test]
    fn same_key_request_coalesces() {
        let slot = PageSlot::new(0);
        let key = PageKey::new(0, 1.5);
        let (generation, cancel) = slot.begin_request(key).unwrap();

        assert!(slot.begin_request(key).is_none());
        assert!(!cancel.load(Ordering::Acquire));
        assert!(slot.is_current(generation));
    }

    #[test]
    fn failure_keeps_previous_image() {
        let slot = PageSlot::new(7);
        let (generation, _) = slot.begin_request(PageKey::new(7, 1.0)).unwrap();
        slot.publish(generation, img());

        let (generation, _) = slot.begin_request(PageKey::new(7, 2.0)).unwrap();
        slot.fail(generation, RenderError::new(7, "boom"));

        let state = slot.lock_state();
        assert!(state.image.is_some());
        assert!(state.last_error.is_some());
        assert_eq!(state.version, 2);
    }

    #[test]
    fn closed_slot_is_terminal() {
        let slot = PageSlot::new(0);
        let (generation, cancel) = slot.begin_request(PageKey::new(0, 1.0)).unwrap();

        slot.close();
        assert!(cancel.load(Ordering::Acquire));

        // Late completion is a no-op.
        slot.publish(generation, img());
        let state = slot.lock_state();
        assert!(state.closed);
        assert!(state.image.is_none());
        drop(state);

        assert!(slot.begin_request(PageKey::new(0, 1.0)).is_none());
    }

    #[test]
    fn observer_wait_sees_publication() {
        let slot = Arc::new(PageSlot::new(0));
        let observer = PageObserver::new(slot.clone());
        assert_eq!(observer.current().version, 0);

        let (generation, _) = slot.begin_request(PageKey::new(0, 1.0)).unwrap();
        let publisher = std::thread::spawn(move || {
            slot.publish(generation, img());
        });

        let update = observer.wait_for_update(0, Duration::from_secs(5));
        publisher.join().unwrap();
        assert_eq!(update.version, 1);
        assert!(update.image.is_some());
    }
}
