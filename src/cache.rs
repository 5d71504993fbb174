//! Byte-bounded LRU cache for rendered page images

use std::sync::Arc;

use log::trace;
use lru::LruCache;

use crate::types::{PageKey, RenderedImage};

/// LRU cache mapping [`PageKey`] to rendered images, bounded by the total
/// byte size of its entries rather than by entry count.
///
/// Eviction is global across pages: the least-recently-used entry goes
/// first regardless of which page it belongs to. An image larger than the
/// whole budget is still admitted (the cache may temporarily hold one
/// oversized entry); the next insertion evicts it.
///
/// Not internally synchronized; the session wraps it in a mutex so that
/// `get`/`put`/`clear` are atomic with respect to each other.
#[derive(Debug)]
pub struct PageCache {
    entries: LruCache<PageKey, Arc<RenderedImage>>,
    total_bytes: usize,
    budget: usize,
}

impl PageCache {
    /// Create a cache with the given byte budget
    #[must_use]
    pub fn new(budget: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            total_bytes: 0,
            budget,
        }
    }

    /// Get a cached image, promoting it in the LRU order
    #[must_use]
    pub fn get(&mut self, key: &PageKey) -> Option<Arc<RenderedImage>> {
        self.entries.get(key).cloned()
    }

    /// Check if a key is present without promoting it
    #[must_use]
    pub fn contains(&self, key: &PageKey) -> bool {
        self.entries.contains(key)
    }

    /// Insert an image, then evict least-recently-used entries until the
    /// total size fits the budget again.
    ///
    /// Replacing an existing key drops only the old image's reference;
    /// the buffer itself is freed once no observer holds it.
    pub fn put(&mut self, key: PageKey, image: Arc<RenderedImage>) {
        let added = image.byte_len();
        if let Some(old) = self.entries.put(key, image) {
            self.total_bytes -= old.byte_len();
        }
        self.total_bytes += added;
        self.evict_to_budget();
    }

    fn evict_to_budget(&mut self) {
        // The just-inserted entry is most-recently-used, so the len() > 1
        // guard stops eviction before it would remove that entry. This is
        // what lets a single oversized image sit in the cache until the
        // next insertion pushes it out.
        while self.total_bytes > self.budget && self.entries.len() > 1 {
            let Some((key, evicted)) = self.entries.pop_lru() else {
                break;
            };
            self.total_bytes -= evicted.byte_len();
            trace!(
                "evicted page {} at {:.2}x ({} bytes)",
                key.page,
                key.scale(),
                evicted.byte_len()
            );
        }
    }

    /// Release and remove all entries (used at session close)
    pub fn clear(&mut self) {
        self.entries.clear();
        self.total_bytes = 0;
    }

    /// Number of cached images
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current total size of all entries in bytes
    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Configured byte budget
    #[must_use]
    pub fn budget(&self) -> usize {
        self.budget
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PixelFormat;

    fn img(bytes: usize) -> Arc<RenderedImage> {
        Arc::new(RenderedImage {
            pixels: vec![0; bytes],
            width: 1,
            height: 1,
            format: PixelFormat::Rgb8,
        })
    }

    #[test]
    fn insert_and_get() {
        let mut cache = PageCache::new(100);
        let key = PageKey::new(0, 1.0);
        cache.put(key, img(10));

        assert!(cache.contains(&key));
        assert!(cache.get(&key).is_some());
        assert_eq!(cache.total_bytes(), 10);
    }

    #[test]
    fn evicts_least_recently_used_first() {
        let mut cache = PageCache::new(3);
        let a = PageKey::new(0, 1.0);
        let b = PageKey::new(1, 1.0);
        let c = PageKey::new(2, 1.0);
        let d = PageKey::new(3, 1.0);

        cache.put(a, img(1));
        cache.put(b, img(1));
        cache.put(c, img(1));
        cache.put(d, img(1));

        assert!(!cache.contains(&a));
        assert!(cache.contains(&b));
        assert!(cache.contains(&c));
        assert!(cache.contains(&d));
        assert_eq!(cache.total_bytes(), 3);
    }

    #[test]
    fn get_refreshes_recency() {
        let mut cache = PageCache::new(3);
        let a = PageKey::new(0, 1.0);
        let b = PageKey::new(1, 1.0);
        let c = PageKey::new(2, 1.0);
        let d = PageKey::new(3, 1.0);

        cache.put(a, img(1));
        cache.put(b, img(1));
        cache.put(c, img(1));

        // Touch A so B becomes the eviction candidate.
        assert!(cache.get(&a).is_some());
        cache.put(d, img(1));

        assert!(cache.contains(&a));
        assert!(!cache.contains(&b));
        assert!(cache.contains(&c));
        assert!(cache.contains(&d));
    }

    #[test]
    fn oversized_entry_is_admitted_then_evicted_on_next_insert() {
        let mut cache = PageCache::new(10);
        let big = PageKey::new(0, 1.0);
        let small = PageKey::new(1, 1.0);

        cache.put(big, img(50));
        assert!(cache.contains(&big));
        assert_eq!(cache.total_bytes(), 50);

        cache.put(small, img(2));
        assert!(!cache.contains(&big));
        assert!(cache.contains(&small));
        assert_eq!(cache.total_bytes(), 2);
    }

    #[test]
    fn replacing_a_key_accounts_bytes_once() {
        let mut cache = PageCache::new(100);
        let key = PageKey::new(0, 1.0);

        cache.put(key, img(30));
        cache.put(key, img(40));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.total_bytes(), 40);
    }

    #[test]
    fn zero_byte_image_is_accepted() {
        let mut cache = PageCache::new(10);
        let key = PageKey::new(0, 1.0);
        cache.put(key, img(0));

        assert!(cache.contains(&key));
        assert_eq!(cache.total_bytes(), 0);
    }

    #[test]
    fn clear_releases_everything() {
        let mut cache = PageCache::new(10);
        for page in 0..5 {
            cache.put(PageKey::new(page, 1.0), img(2));
        }

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.total_bytes(), 0);
    }
}
