//! Cache hit/miss statistics.

use std::sync::atomic::{AtomicU64, Ordering};

use bytesize::ByteSize;
use serde::Serialize;

/// Snapshot returned by [`crate::cache::ResultCache::statistics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStatistics {
    /// Lookups answered from the cache since construction or the last clear.
    pub total_hits: u64,
    /// Lookups that had to compute (or found nothing) since the same point.
    pub total_misses: u64,
    /// `hits / (hits + misses)`, or 0 without accesses.
    pub hit_rate: f64,
    /// Distinct files with at least one cached analyzer result.
    pub cached_file_count: usize,
    /// Live key/value entries.
    pub cached_entry_count: usize,
    /// Rough estimate of memory held by both stores.
    pub approximate_memory_bytes: u64,
}

impl CacheStatistics {
    /// Total number of recorded lookups.
    #[must_use]
    pub fn total_accesses(&self) -> u64 {
        self.total_hits + self.total_misses
    }

    /// Memory estimate formatted for humans (e.g. "1.2 KiB").
    #[must_use]
    pub fn memory_display(&self) -> String {
        ByteSize::b(self.approximate_memory_bytes).to_string()
    }
}

/// Hit ratio, 0 when there were no accesses.
#[must_use]
pub fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

/// Lock-free hit/miss counters.
#[derive(Debug, Default)]
pub(crate) struct StatCounters {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl StatCounters {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub(crate) fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub(crate) fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}
