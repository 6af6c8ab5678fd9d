use std::num::NonZeroUsize;

use lru::LruCache;

/// Identifies a page across every tree sharing a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageKey {
    /// The identity of the backing file (the worker id owning the tree).
    pub file: u64,
    /// The page number within the file (offset divided by page size).
    pub page: u64,
}

/// A read-through page cache that may sit in front of the backing file.
///
/// The page store consults [`PageCache::lookup`] before reading a page from the file,
/// and reports every page it reads or writes, so the cache decides what it admits.
/// Writes always reach the file before [`PageCache::on_write`] is called; a cache is
/// never the sole record of a page.
pub trait PageCache: Send {
    /// Returns the cached image of the page, if any.
    fn lookup(&mut self, key: PageKey) -> Option<Vec<u8>>;

    /// Called after a page was read from the file.
    fn on_read(&mut self, _key: PageKey, _page: &[u8]) {}

    /// Called after a page was written to the file.
    ///
    /// Implementations holding an older image of the page must refresh or drop it.
    fn on_write(&mut self, _key: PageKey, _page: &[u8]) {}
}

/// The default capability: every lookup misses.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

impl PageCache for NoCache {
    #[inline]
    fn lookup(&mut self, _key: PageKey) -> Option<Vec<u8>> {
        None
    }
}

/// A bounded least-recently-used page cache.
pub struct LruPageCache {
    pages: LruCache<PageKey, Vec<u8>>,
}

impl LruPageCache {
    /// Creates a cache holding at most `capacity` pages.
    #[inline]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            pages: LruCache::new(capacity),
        }
    }

    /// The number of pages currently cached.
    #[inline]
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

impl PageCache for LruPageCache {
    #[inline]
    fn lookup(&mut self, key: PageKey) -> Option<Vec<u8>> {
        self.pages.get(&key).cloned()
    }

    #[inline]
    fn on_read(&mut self, key: PageKey, page: &[u8]) {
        self.pages.put(key, page.to_vec());
    }

    #[inline]
    fn on_write(&mut self, key: PageKey, page: &[u8]) {
        self.pages.put(key, page.to_vec());
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use super::{LruPageCache, NoCache, PageCache, PageKey};

    fn key(page: u64) -> PageKey {
        PageKey { file: 7, page }
    }

    #[test]
    fn test_no_cache() {
        let mut cache = NoCache;
        cache.on_read(key(1), &[1, 2, 3]);
        cache.on_write(key(1), &[1, 2, 3]);
        assert_eq!(cache.lookup(key(1)), None);
    }

    #[test]
    fn test_lru_eviction() {
        let mut cache = LruPageCache::new(NonZeroUsize::new(2).unwrap());
        assert!(cache.is_empty());

        cache.on_read(key(1), &[1]);
        cache.on_read(key(2), &[2]);
        // Touch page 1 so page 2 becomes the eviction candidate.
        assert_eq!(cache.lookup(key(1)), Some(vec![1]));

        cache.on_read(key(3), &[3]);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.lookup(key(2)), None);
        assert_eq!(cache.lookup(key(3)), Some(vec![3]));
    }

    #[test]
    fn test_lru_write_refresh() {
        let mut cache = LruPageCache::new(NonZeroUsize::new(4).unwrap());
        cache.on_read(key(1), &[1, 1]);
        cache.on_write(key(1), &[9, 9]);
        assert_eq!(cache.lookup(key(1)), Some(vec![9, 9]));

        // Pages of another file do not collide.
        let other = PageKey { file: 8, page: 1 };
        assert_eq!(cache.lookup(other), None);
    }
}
