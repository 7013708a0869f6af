//! In-memory LRU image cache bounded by decoded byte size.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use image::DynamicImage;
use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::domain::entities::CacheKey;

/// Default memory budget (5 MiB).
pub const DEFAULT_MEM_CACHE_SIZE: u64 = 5 * 1024 * 1024;

struct Inner {
    entries: LruCache<CacheKey, Arc<DynamicImage>>,
    total_bytes: u64,
}

/// In-memory LRU cache for decoded images.
pub struct MemoryImageCache {
    inner: Mutex<Inner>,
    max_bytes: u64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryImageCache {
    /// Creates a cache holding at most `max_bytes` of decoded pixels.
    #[must_use]
    pub fn new(max_bytes: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                total_bytes: 0,
            }),
            max_bytes,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Byte size charged for `image`.
    #[must_use]
    pub fn size_of(image: &DynamicImage) -> u64 {
        image.as_bytes().len() as u64
    }

    /// Returns the image for `key`, promoting it.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<DynamicImage>> {
        let mut inner = self.inner.lock();
        if let Some(img) = inner.entries.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache hit");
            Some(img.clone())
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache miss");
            None
        }
    }

    /// Peeks at an image without promoting it or touching the statistics.
    pub fn peek(&self, key: &CacheKey) -> Option<Arc<DynamicImage>> {
        self.inner.lock().entries.peek(key).cloned()
    }

    /// Returns true if `key` is cached.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner.lock().entries.contains(key)
    }

    /// Inserts `image` under `key`. An existing entry keeps its value and is
    /// only promoted; images larger than the whole budget are not cached.
    pub fn put(&self, key: CacheKey, image: Arc<DynamicImage>) {
        let size = Self::size_of(&image);
        let mut inner = self.inner.lock();
        if inner.entries.get(&key).is_some() {
            trace!(key = %key, "Memory cache entry exists, promoting");
            return;
        }
        if size > self.max_bytes {
            debug!(key = %key, size, max_bytes = self.max_bytes, "Image exceeds memory budget");
            return;
        }

        inner.total_bytes += size;
        debug!(key = %key, size, "Storing image in memory cache");
        inner.entries.put(key, image);

        while inner.total_bytes > self.max_bytes {
            let Some((evicted, img)) = inner.entries.pop_lru() else {
                break;
            };
            inner.total_bytes = inner.total_bytes.saturating_sub(Self::size_of(&img));
            trace!(key = %evicted, "Evicted image from memory cache");
        }
    }

    /// Drops every entry.
    pub fn evict_all(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.total_bytes = 0;
        debug!("Cleared memory image cache");
    }

    /// Number of cached images.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decoded bytes currently held.
    pub fn current_size(&self) -> u64 {
        self.inner.lock().total_bytes
    }

    /// Returns cache statistics.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        let inner = self.inner.lock();
        CacheStats {
            hits,
            misses,
            hit_rate,
            size: inner.entries.len(),
            bytes: inner.total_bytes,
        }
    }
}

impl Default for MemoryImageCache {
    fn default() -> Self {
        Self::new(DEFAULT_MEM_CACHE_SIZE)
    }
}

/// Statistics about cache performance.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Hit rate as a percentage.
    pub hit_rate: f64,
    /// Current number of cached images.
    pub size: usize,
    /// Decoded bytes held.
    pub bytes: u64,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache: {} images ({} bytes), {:.1}% hit rate ({} hits, {} misses)",
            self.size, self.bytes, self.hit_rate, self.hits, self.misses
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{LoadKey, Transform};

    fn key(name: &str) -> CacheKey {
        CacheKey::raw(&LoadKey::new(name))
    }

    fn rgba(side: u32) -> Arc<DynamicImage> {
        Arc::new(DynamicImage::new_rgba8(side, side))
    }

    #[test]
    fn test_size_of_is_pixel_buffer() {
        assert_eq!(MemoryImageCache::size_of(&DynamicImage::new_rgba8(10, 10)), 400);
        assert_eq!(MemoryImageCache::size_of(&DynamicImage::new_rgb8(10, 10)), 300);
    }

    #[test]
    fn test_distinct_keys_do_not_collide() {
        let cache = MemoryImageCache::new(1024 * 1024);
        cache.put(key("one"), Arc::new(DynamicImage::new_rgba8(3, 4)));
        cache.put(key("two"), Arc::new(DynamicImage::new_rgba8(5, 6)));

        assert_eq!(cache.get(&key("one")).unwrap().width(), 3);
        assert_eq!(cache.get(&key("two")).unwrap().width(), 5);
    }

    #[test]
    fn test_transformed_variant_is_separate() {
        let cache = MemoryImageCache::new(1024 * 1024);
        let load_key = LoadKey::new("x");
        cache.put(CacheKey::raw(&load_key), rgba(4));
        cache.put(CacheKey::new(&load_key, Transform::round_corner(2)), rgba(2));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&CacheKey::raw(&load_key)).unwrap().width(), 4);
    }

    #[test]
    fn test_prefixed_identifier_does_not_hit_rounded_entry() {
        let cache = MemoryImageCache::new(1024 * 1024);
        cache.put(
            CacheKey::new(&LoadKey::new("x.png"), Transform::round_corner(2)),
            rgba(2),
        );

        assert!(cache.get(&key("Corner_2_x.png")).is_none());
        cache.put(key("Corner_2_x.png"), rgba(6));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&key("Corner_2_x.png")).unwrap().width(), 6);
    }

    #[test]
    fn test_evicts_lru_until_under_budget() {
        // Each 10x10 RGBA image is 400 bytes.
        let cache = MemoryImageCache::new(1000);
        cache.put(key("a"), rgba(10));
        cache.put(key("b"), rgba(10));
        let _ = cache.get(&key("a"));
        cache.put(key("c"), rgba(10));

        assert!(cache.contains(&key("a")));
        assert!(!cache.contains(&key("b")));
        assert!(cache.contains(&key("c")));
        assert_eq!(cache.current_size(), 800);
    }

    #[test]
    fn test_put_existing_key_keeps_first_value() {
        let cache = MemoryImageCache::new(1024 * 1024);
        cache.put(key("a"), rgba(4));
        cache.put(key("a"), rgba(8));

        assert_eq!(cache.get(&key("a")).unwrap().width(), 4);
        assert_eq!(cache.current_size(), 64);
    }

    #[test]
    fn test_oversized_image_is_skipped() {
        let cache = MemoryImageCache::new(100);
        cache.put(key("a"), rgba(2));
        cache.put(key("huge"), rgba(10));

        assert!(cache.contains(&key("a")));
        assert!(!cache.contains(&key("huge")));
    }

    #[test]
    fn test_evict_all() {
        let cache = MemoryImageCache::default();
        cache.put(key("a"), rgba(4));
        cache.put(key("b"), rgba(4));
        cache.evict_all();

        assert!(cache.is_empty());
        assert_eq!(cache.current_size(), 0);
    }

    #[test]
    fn test_cache_stats() {
        let cache = MemoryImageCache::new(1024);
        cache.put(key("a"), rgba(2));

        let _ = cache.get(&key("a"));
        let _ = cache.get(&key("missing"));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
        assert_eq!(stats.bytes, 16);
    }

    #[test]
    fn test_peek_does_not_promote() {
        let cache = MemoryImageCache::new(1000);
        cache.put(key("a"), rgba(10));
        cache.put(key("b"), rgba(10));

        let _ = cache.peek(&key("a"));
        cache.put(key("c"), rgba(10));

        assert!(cache.peek(&key("a")).is_none());
    }
}
