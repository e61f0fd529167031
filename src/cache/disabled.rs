//! Cache that never stores anything.

use std::path::Path;
use std::time::{Duration, SystemTime};

use super::entry::{CacheKey, CachedValue};
use super::stats::CacheStatistics;
use super::traits::ResultCache;

/// Drop-in replacement for [`crate::cache::CacheManager`] when caching is
/// turned off. Every factory runs, nothing is remembered, and the statistics
/// stay at zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledCache;

impl ResultCache for DisabledCache {
    fn lookup_or_compute(
        &self,
        _key: &CacheKey,
        _ttl: Option<Duration>,
        factory: &mut dyn FnMut() -> Option<CachedValue>,
    ) -> Option<CachedValue> {
        factory()
    }

    fn remove(&self, _key: &CacheKey) -> bool {
        false
    }

    fn store_analysis_result(&self, _path: &Path, _analyzer_kind: &str, _result: CachedValue) {}

    fn store_analysis_result_at(
        &self,
        _path: &Path,
        _analyzer_kind: &str,
        _result: CachedValue,
        _observed_mtime: SystemTime,
    ) {
    }

    fn load_analysis_result(&self, _path: &Path, _analyzer_kind: &str) -> Option<CachedValue> {
        None
    }

    fn is_file_cache_valid(&self, _path: &Path) -> bool {
        false
    }

    fn invalidate_file(&self, _path: &Path) -> bool {
        false
    }

    fn clear_cache(&self) {}

    fn statistics(&self) -> CacheStatistics {
        CacheStatistics::default()
    }

    fn is_enabled(&self) -> bool {
        false
    }
}
