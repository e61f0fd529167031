//! Result caching for analyzers.
//!
//! This module keeps expensive computations from being repeated while a
//! batch runs. Nothing is persisted: the cache lives as long as the process.
//!
//! # Architecture
//!
//! * [`traits`]: The object-safe [`ResultCache`] contract and typed [`CacheExt`] helpers.
//! * [`manager`]: The in-memory [`CacheManager`].
//! * [`disabled`]: The no-op [`DisabledCache`].
//! * [`entry`]: Entry types and validity rules.
//! * [`stats`]: Hit/miss statistics.
//!
//! # Cache Invalidation
//!
//! Key/value entries expire after their optional TTL. Analyzer results are
//! tied to the source file and validated on every read against:
//! * File path and analyzer kind (key)
//! * Modification time (mtime)
//!
//! If the file was modified or deleted the entry is removed and the lookup is
//! a miss, so a stale result is never returned.

pub mod disabled;
pub mod entry;
pub mod manager;
pub mod stats;
pub mod traits;

use std::sync::Arc;

pub use disabled::DisabledCache;
pub use entry::{file_mtime, CacheEntry, CacheKey, CachedValue, FileResultEntry};
pub use manager::CacheManager;
pub use stats::{hit_rate, CacheStatistics};
pub use traits::{CacheExt, ResultCache};

/// Build the cache implementation selected by `enabled`.
///
/// # Example
///
/// ```
/// use scanguard::cache::build_cache;
///
/// assert!(build_cache(true).is_enabled());
/// assert!(!build_cache(false).is_enabled());
/// ```
#[must_use]
pub fn build_cache(enabled: bool) -> Arc<dyn ResultCache> {
    if enabled {
        Arc::new(CacheManager::new())
    } else {
        log::debug!("Result caching disabled");
        Arc::new(DisabledCache)
    }
}
