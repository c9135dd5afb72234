//! Bounded artwork cache.
//!
//! Entries are keyed by artwork URL so a cached image stays valid for any row
//! that shows the same artwork, whatever its position. The least recently
//! used entry is evicted once the cache is full.

use crate::types::Artwork;
use lru::LruCache;
use std::num::NonZeroUsize;

/// Hit/miss counters for an [`ArtworkCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub clears: u64,
}

impl CacheStats {
    /// Fraction of lookups served from the cache, or 0.0 before any lookup.
    pub fn hit_ratio(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

/// Least-recently-used map from artwork URL to decoded [`Artwork`].
pub struct ArtworkCache {
    entries: LruCache<String, Artwork>,
    stats: CacheStats,
}

impl ArtworkCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
            stats: CacheStats::default(),
        }
    }

    /// Look up artwork, marking it as recently used.
    pub fn get(&mut self, url: &str) -> Option<Artwork> {
        match self.entries.get(url) {
            Some(artwork) => {
                self.stats.hits += 1;
                Some(artwork.clone())
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Whether `url` is cached. Does not touch recency or counters.
    pub fn contains(&self, url: &str) -> bool {
        self.entries.contains(url)
    }

    /// Insert artwork under its URL, evicting the least recently used entry
    /// when the cache is full.
    pub fn insert(&mut self, artwork: Artwork) {
        let url = artwork.url.clone();
        if let Some((evicted, _)) = self.entries.push(url.clone(), artwork) {
            if evicted != url {
                self.stats.evictions += 1;
                log::debug!("Evicted artwork {evicted}");
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.stats.clears += 1;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> NonZeroUsize {
        self.entries.cap()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

impl std::fmt::Debug for ArtworkCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtworkCache")
            .field("len", &self.entries.len())
            .field("capacity", &self.entries.cap())
            .field("stats", &self.stats)
            .finish()
    }
}
