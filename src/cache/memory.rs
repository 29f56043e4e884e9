//! In-memory cache gateway.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::RwLock;

use super::{CacheEntry, CacheGateway};
use crate::{Error, Result};

/// Bounded in-memory cache with least-recently-used eviction.
///
/// # Thread Safety
///
/// Uses a `RwLock` around the LRU map. Reads take the write lock because
/// a lookup updates recency. A poisoned lock surfaces as
/// [`Error::OperationFailed`].
///
/// # Example
///
/// ```rust
/// use citemerge::cache::{CacheEntry, CacheGateway, MemoryCache};
/// use citemerge::models::PublicationEntry;
///
/// let cache = MemoryCache::new(16).unwrap();
/// let entry = CacheEntry::new("doi:10.1/x", PublicationEntry::default(), Some(1), "fp");
/// cache.set("lab/doi:10.1/x", entry).unwrap();
/// assert!(cache.get("lab/doi:10.1/x").unwrap().is_some());
/// ```
pub struct MemoryCache {
    entries: RwLock<LruCache<String, CacheEntry>>,
}

impl MemoryCache {
    /// Default number of entries kept.
    pub const DEFAULT_CAPACITY: usize = 4096;

    /// Creates a cache holding at most `capacity` entries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity)
            .ok_or_else(|| Error::InvalidInput("cache capacity must be > 0".to_string()))?;
        Ok(Self {
            entries: RwLock::new(LruCache::new(capacity)),
        })
    }

    /// Returns the number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().map_or(0, |entries| entries.len())
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned<T>(operation: &str) -> Result<T> {
        Err(Error::OperationFailed {
            operation: operation.to_string(),
            cause: "cache lock poisoned".to_string(),
        })
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        let capacity = NonZeroUsize::new(Self::DEFAULT_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
        }
    }
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("len", &self.len())
            .finish()
    }
}

impl CacheGateway for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let Ok(mut entries) = self.entries.write() else {
            return Self::poisoned("cache_get");
        };
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, entry: CacheEntry) -> Result<()> {
        let Ok(mut entries) = self.entries.write() else {
            return Self::poisoned("cache_set");
        };
        entries.put(key.to_string(), entry);
        metrics::gauge!("citemerge_memory_cache_size").set(entries.len() as f64);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PublicationEntry;

    fn entry(id: &str) -> CacheEntry {
        CacheEntry::new(id, PublicationEntry::default(), None, "fp")
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        assert!(matches!(MemoryCache::new(0), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_get_and_set() {
        let cache = MemoryCache::new(4).unwrap();
        assert!(cache.get("a").unwrap().is_none());
        cache.set("a", entry("a")).unwrap();
        assert_eq!(cache.get("a").unwrap().unwrap().id, "a");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_set_overwrites() {
        let cache = MemoryCache::new(4).unwrap();
        cache.set("a", entry("first")).unwrap();
        cache.set("a", entry("second")).unwrap();
        assert_eq!(cache.get("a").unwrap().unwrap().id, "second");
    }

    #[test]
    fn test_least_recently_used_is_evicted() {
        let cache = MemoryCache::new(2).unwrap();
        cache.set("a", entry("a")).unwrap();
        cache.set("b", entry("b")).unwrap();
        let _ = cache.get("a").unwrap();
        cache.set("c", entry("c")).unwrap();

        assert!(cache.get("a").unwrap().is_some());
        assert!(cache.get("b").unwrap().is_none());
        assert!(cache.get("c").unwrap().is_some());
    }
}
