//! Candidate index cache.
//!
//! Candidate lookup for a primary index is repeated across structurally
//! similar queries, so the optimizer keeps the covering secondaries of the
//! most recently used primaries. The cache is owned by an optimizer (or
//! shared explicitly by the caller) rather than being process-global.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::provider::{IndexId, IndexInfo};

/// Candidate indexes for one primary index, primary first.
pub type Candidates = Arc<[Arc<IndexInfo>]>;

/// Lookup counters for candidate resolution, updated without the map lock.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl CacheStats {
    /// Lookups answered from a cached candidate list.
    pub fn hits(&self) -> u64 {
        self.hits.load(AtomicOrdering::Relaxed)
    }

    /// Lookups that had to ask the catalog.
    pub fn misses(&self) -> u64 {
        self.misses.load(AtomicOrdering::Relaxed)
    }

    /// Primaries dropped to make room for a newer one.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(AtomicOrdering::Relaxed)
    }

    /// Share of lookups that skipped the catalog; zero before any lookup.
    pub fn hit_rate(&self) -> f64 {
        match self.hits() + self.misses() {
            0 => 0.0,
            lookups => self.hits() as f64 / lookups as f64,
        }
    }
}

struct Entry {
    candidates: Candidates,
    last_used: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<IndexId, Entry>,
    tick: u64,
}

impl Inner {
    fn touch(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}

/// Bounded LRU of candidate indexes keyed by primary index.
pub struct IndexMetadataCache {
    capacity: usize,
    inner: Mutex<Inner>,
    stats: CacheStats,
}

impl IndexMetadataCache {
    /// Create a cache holding at most `capacity` primaries.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner::default()),
            stats: CacheStats::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Cached candidates for `primary`, marking them recently used.
    pub fn get(&self, primary: IndexId) -> Option<Candidates> {
        let mut inner = self.inner.lock();
        let tick = inner.touch();
        match inner.entries.get_mut(&primary) {
            Some(entry) => {
                entry.last_used = tick;
                self.stats.hits.fetch_add(1, AtomicOrdering::Relaxed);
                Some(entry.candidates.clone())
            }
            None => {
                self.stats.misses.fetch_add(1, AtomicOrdering::Relaxed);
                None
            }
        }
    }

    /// Insert candidates, evicting the least recently used entry if full.
    pub fn insert(&self, primary: IndexId, candidates: Candidates) {
        if self.capacity == 0 {
            return;
        }
        let mut inner = self.inner.lock();
        let tick = inner.touch();
        if inner.entries.len() >= self.capacity && !inner.entries.contains_key(&primary) {
            let victim = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(id, _)| *id);
            if let Some(victim) = victim {
                trace!(%victim, "evicting index candidates");
                inner.entries.remove(&victim);
                self.stats.evictions.fetch_add(1, AtomicOrdering::Relaxed);
            }
        }
        inner.entries.insert(
            primary,
            Entry {
                candidates,
                last_used: tick,
            },
        );
    }

    /// Cached candidates, computing and inserting them on a miss.
    ///
    /// `compute` runs without the lock held; concurrent misses for the same
    /// primary may both compute, and the last insert wins.
    pub fn get_or_insert_with(
        &self,
        primary: IndexId,
        compute: impl FnOnce() -> Vec<Arc<IndexInfo>>,
    ) -> Candidates {
        if let Some(candidates) = self.get(primary) {
            return candidates;
        }
        let candidates: Candidates = compute().into();
        self.insert(primary, candidates.clone());
        candidates
    }

    /// Drop the entry for `primary`. Returns whether it was cached.
    pub fn invalidate(&self, primary: IndexId) -> bool {
        self.inner.lock().entries.remove(&primary).is_some()
    }

    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

impl Default for IndexMetadataCache {
    fn default() -> Self {
        Self::new(20)
    }
}

impl std::fmt::Debug for IndexMetadataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexMetadataCache")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}
