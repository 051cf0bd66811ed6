//! Per-line shaping memoization.
//!
//! Keyed by exact line content: identical lines anywhere in the document
//! share one entry, and a line's entry never goes stale on its own —
//! only capacity pressure (via the freshness epoch) can push it out.

use crate::cache::FreshnessCache;

use super::{FaceCollection, ShapedLine, resolver};

/// Lines held beyond the visible set. Sized to comfortably exceed the
/// visible plus recently-scrolled-past line count at any sane window
/// height.
pub const SHAPING_CACHE_CAPACITY: usize = 1024;

/// Cache from raw line text to its resolved face/glyph assignment.
pub struct ShapingCache {
    cache: FreshnessCache<String, ShapedLine>,
}

impl ShapingCache {
    pub fn new() -> Self {
        Self::with_capacity(SHAPING_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cache: FreshnessCache::new(capacity),
        }
    }

    /// Return the cached assignment for `line`, shaping and caching it on
    /// miss. When the cache is full with nothing stale, the result is
    /// returned uncached — the line simply shapes again next frame.
    pub fn get_or_shape(&mut self, line: &str, faces: &FaceCollection) -> ShapedLine {
        if let Some(shaped) = self.cache.get(line) {
            return shaped.clone();
        }

        let shaped = resolver::shape_line(line, faces);
        if !self.cache.put(line.to_owned(), shaped.clone()) {
            log::debug!("shaping cache full, line of {} glyphs not cached", shaped.len());
        }
        shaped
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Frame boundary: entries untouched before the next invalidation
    /// become eviction candidates.
    pub fn invalidate(&mut self) {
        self.cache.invalidate();
    }
}

impl Default for ShapingCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::discovery;

    fn test_faces() -> Option<FaceCollection> {
        let path = discovery::any_monospace()?;
        FaceCollection::load(&[path], 17.0).ok()
    }

    #[test]
    fn repeated_lookup_returns_equal_results() {
        let Some(fc) = test_faces() else { return };
        let mut cache = ShapingCache::new();

        let first = cache.get_or_shape("let x = 42;", &fc);
        let second = cache.get_or_shape("let x = 42;", &fc);
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn distinct_lines_do_not_collide() {
        let Some(fc) = test_faces() else { return };
        let mut cache = ShapingCache::new();

        let a = cache.get_or_shape("alpha", &fc);
        let b = cache.get_or_shape("beta!", &fc);
        assert_eq!(cache.len(), 2);
        assert_ne!(a, b);
    }

    #[test]
    fn capacity_pressure_degrades_to_uncached_shaping() {
        let Some(fc) = test_faces() else { return };
        let mut cache = ShapingCache::with_capacity(2);

        let _ = cache.get_or_shape("one", &fc);
        let _ = cache.get_or_shape("two", &fc);
        // Full, everything fresh: the third line still shapes correctly,
        // it just isn't retained.
        let three = cache.get_or_shape("three", &fc);
        assert!(!three.is_empty());
        assert_eq!(cache.len(), 2);

        // After the frame boundary the cache admits new lines again.
        cache.invalidate();
        let _ = cache.get_or_shape("three", &fc);
        assert_eq!(cache.len(), 2);
    }
}
