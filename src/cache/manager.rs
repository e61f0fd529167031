//! In-memory cache manager.
//!
//! Two stores live side by side:
//!
//! * a key/value store with optional TTL, keyed by [`CacheKey`];
//! * a file-validity store keyed by `(path, analyzer kind)`, where each result
//!   remembers the file's modification time at cache time.
//!
//! Expired and stale entries are removed lazily when a read notices them.
//!
//! # Concurrency
//!
//! Each store sits behind its own `RwLock`. Concurrent misses on the same key
//! are single-flight: one caller runs the factory while the others wait on a
//! per-key lock and then read the stored value. [`ResultCache::clear_cache`]
//! takes both write locks and bumps a generation counter, so a computation
//! that started before the clear never writes into the emptied cache.

use std::collections::HashMap;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant, SystemTime};

use super::entry::{file_mtime, CacheEntry, CacheKey, CachedValue, FileResultEntry};
use super::stats::{hit_rate, CacheStatistics, StatCounters};
use super::traits::ResultCache;

type FileStore = HashMap<PathBuf, HashMap<String, FileResultEntry>>;

/// Thread-safe in-memory cache.
///
/// Share one instance between workers with `Arc<CacheManager>` (or as
/// `Arc<dyn ResultCache>`).
#[derive(Debug, Default)]
pub struct CacheManager {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    files: RwLock<FileStore>,
    in_flight: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
    generation: AtomicU64,
    counters: StatCounters,
}

impl CacheManager {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read_entries(&self) -> RwLockReadGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_files(&self) -> RwLockReadGuard<'_, FileStore> {
        self.files.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_files(&self) -> RwLockWriteGuard<'_, FileStore> {
        self.files.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// The live value for `key`, removing it if it has expired.
    fn live_value(&self, key: &CacheKey) -> Option<CachedValue> {
        let now = Instant::now();
        {
            let entries = self.read_entries();
            match entries.get(key) {
                None => return None,
                Some(entry) if entry.is_valid_at(now) => return Some(Arc::clone(entry.value())),
                Some(_) => {}
            }
        }

        let mut entries = self.write_entries();
        if entries.get(key).is_some_and(|entry| !entry.is_valid_at(now)) {
            entries.remove(key);
            log::trace!("Cache entry expired: {}/{}", key.namespace(), key.key());
        }
        None
    }

    fn flight_slot(&self, key: &CacheKey) -> Arc<Mutex<()>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            in_flight
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    fn release_slot(&self, key: &CacheKey, slot: &Arc<Mutex<()>>) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        // New holders can only appear through the map, which we have locked:
        // two references means the map and us.
        let unused = in_flight
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, slot) && Arc::strong_count(slot) <= 2);
        if unused {
            in_flight.remove(key);
        }
    }

    fn compute_and_store(
        &self,
        key: &CacheKey,
        ttl: Option<Duration>,
        factory: &mut dyn FnMut() -> Option<CachedValue>,
    ) -> Option<CachedValue> {
        // Another caller may have finished the computation while we waited
        if let Some(value) = self.live_value(key) {
            self.counters.record_hit();
            log::trace!("Cache hit after wait: {}/{}", key.namespace(), key.key());
            return Some(value);
        }

        self.counters.record_miss();
        log::trace!("Cache miss: {}/{}", key.namespace(), key.key());

        let generation = self.generation.load(Ordering::Acquire);
        let computed = factory()?;

        let mut entries = self.write_entries();
        if self.generation.load(Ordering::Acquire) == generation {
            entries.insert(key.clone(), CacheEntry::new(Arc::clone(&computed), ttl));
        } else {
            log::debug!(
                "Cache cleared during computation of {}/{}, result not stored",
                key.namespace(),
                key.key()
            );
        }
        Some(computed)
    }

    fn insert_file_result(
        &self,
        path: &Path,
        analyzer_kind: &str,
        result: CachedValue,
        mtime: SystemTime,
    ) {
        self.write_files()
            .entry(path.to_path_buf())
            .or_default()
            .insert(analyzer_kind.to_string(), FileResultEntry::new(result, mtime));
        log::trace!("Cached {} result for {}", analyzer_kind, path.display());
    }

    fn estimate_memory(&self) -> u64 {
        let entries = self.read_entries();
        let files = self.read_files();

        let entry_bytes: usize = entries
            .iter()
            .map(|(key, entry)| {
                mem::size_of::<CacheKey>()
                    + key.heap_bytes()
                    + mem::size_of::<CacheEntry>()
                    + mem::size_of_val(&**entry.value())
            })
            .sum();

        let file_bytes: usize = files
            .iter()
            .map(|(path, results)| {
                mem::size_of::<PathBuf>()
                    + path.as_os_str().len()
                    + results
                        .iter()
                        .map(|(kind, entry)| {
                            mem::size_of::<String>()
                                + kind.len()
                                + mem::size_of::<FileResultEntry>()
                                + mem::size_of_val(&**entry.result())
                        })
                        .sum::<usize>()
            })
            .sum();

        (entry_bytes + file_bytes) as u64
    }
}

impl ResultCache for CacheManager {
    fn lookup_or_compute(
        &self,
        key: &CacheKey,
        ttl: Option<Duration>,
        factory: &mut dyn FnMut() -> Option<CachedValue>,
    ) -> Option<CachedValue> {
        if let Some(value) = self.live_value(key) {
            self.counters.record_hit();
            log::trace!("Cache hit: {}/{}", key.namespace(), key.key());
            return Some(value);
        }

        let slot = self.flight_slot(key);
        let result = {
            let _flight = slot.lock().unwrap_or_else(PoisonError::into_inner);
            self.compute_and_store(key, ttl, factory)
        };
        self.release_slot(key, &slot);
        result
    }

    fn remove(&self, key: &CacheKey) -> bool {
        self.write_entries().remove(key).is_some()
    }

    fn store_analysis_result(&self, path: &Path, analyzer_kind: &str, result: CachedValue) {
        match file_mtime(path) {
            Ok(mtime) => self.insert_file_result(path, analyzer_kind, result, mtime),
            Err(e) => log::debug!(
                "Not caching {} result for {}: {}",
                analyzer_kind,
                path.display(),
                e
            ),
        }
    }

    fn store_analysis_result_at(
        &self,
        path: &Path,
        analyzer_kind: &str,
        result: CachedValue,
        observed_mtime: SystemTime,
    ) {
        match file_mtime(path) {
            Ok(mtime) if mtime == observed_mtime => {
                self.insert_file_result(path, analyzer_kind, result, mtime);
            }
            Ok(_) => log::debug!(
                "Not caching {} result for {}: file changed during analysis",
                analyzer_kind,
                path.display()
            ),
            Err(e) => log::debug!(
                "Not caching {} result for {}: {}",
                analyzer_kind,
                path.display(),
                e
            ),
        }
    }

    fn load_analysis_result(&self, path: &Path, analyzer_kind: &str) -> Option<CachedValue> {
        let current = file_mtime(path).ok();

        let recorded = {
            let files = self.read_files();
            let Some(entry) = files.get(path).and_then(|results| results.get(analyzer_kind))
            else {
                self.counters.record_miss();
                return None;
            };
            if current.is_some_and(|mtime| entry.matches(mtime)) {
                self.counters.record_hit();
                log::trace!("File cache hit: {} ({})", path.display(), analyzer_kind);
                return Some(Arc::clone(entry.result()));
            }
            entry.recorded_mtime()
        };

        // Stale: the file changed or disappeared since it was cached
        let mut files = self.write_files();
        if let Some(results) = files.get_mut(path) {
            if results
                .get(analyzer_kind)
                .is_some_and(|entry| entry.matches(recorded))
            {
                results.remove(analyzer_kind);
            }
            if results.is_empty() {
                files.remove(path);
            }
        }
        self.counters.record_miss();
        log::debug!(
            "File cache invalidated: {} ({}) changed since it was cached",
            path.display(),
            analyzer_kind
        );
        None
    }

    fn is_file_cache_valid(&self, path: &Path) -> bool {
        let Ok(mtime) = file_mtime(path) else {
            return false;
        };
        self.read_files()
            .get(path)
            .is_some_and(|results| results.values().any(|entry| entry.matches(mtime)))
    }

    fn invalidate_file(&self, path: &Path) -> bool {
        self.write_files().remove(path).is_some()
    }

    fn clear_cache(&self) {
        let mut entries = self.write_entries();
        let mut files = self.write_files();
        self.generation.fetch_add(1, Ordering::AcqRel);
        entries.clear();
        files.clear();
        self.counters.reset();
        log::debug!("Cache cleared");
    }

    fn statistics(&self) -> CacheStatistics {
        let hits = self.counters.hits();
        let misses = self.counters.misses();
        let (cached_file_count, cached_entry_count) = {
            let entries = self.read_entries();
            let files = self.read_files();
            (files.len(), entries.len())
        };

        CacheStatistics {
            total_hits: hits,
            total_misses: misses,
            hit_rate: hit_rate(hits, misses),
            cached_file_count,
            cached_entry_count,
            approximate_memory_bytes: self.estimate_memory(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheExt;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_get_or_set_caches_value() {
        let cache = CacheManager::new();
        let mut calls = 0;

        let first = cache.get_or_set("ns", "k", None, || {
            calls += 1;
            42u32
        });
        let second = cache.get_or_set("ns", "k", None, || {
            calls += 1;
            0u32
        });

        assert_eq!(first, 42);
        assert_eq!(second, 42);
        assert_eq!(calls, 1);

        let stats = cache.statistics();
        assert_eq!(stats.total_hits, 1);
        assert_eq!(stats.total_misses, 1);
        assert_eq!(stats.cached_entry_count, 1);
    }

    #[test]
    fn test_types_do_not_collide() {
        let cache = CacheManager::new();
        let number = cache.get_or_set("ns", "k", None, || 1u32);
        let text = cache.get_or_set("ns", "k", None, || "one".to_string());
        assert_eq!(number, 1);
        assert_eq!(text, "one");
        assert_eq!(cache.statistics().cached_entry_count, 2);
    }

    #[test]
    fn test_expired_entry_is_removed_on_read() {
        let cache = CacheManager::new();
        cache.get_or_set("ns", "k", Some(Duration::from_millis(1)), || 1u32);
        std::thread::sleep(Duration::from_millis(5));

        let value = cache.get_or_set("ns", "k", None, || 2u32);
        assert_eq!(value, 2);
        assert_eq!(cache.statistics().total_misses, 2);
    }

    #[test]
    fn test_try_get_or_set_does_not_cache_errors() {
        let cache = CacheManager::new();

        let failed: Result<u32, String> =
            cache.try_get_or_set("ns", "k", None, || Err("boom".to_string()));
        assert_eq!(failed, Err("boom".to_string()));
        assert_eq!(cache.statistics().cached_entry_count, 0);

        let ok: Result<u32, String> = cache.try_get_or_set("ns", "k", None, || Ok(5));
        assert_eq!(ok, Ok(5));
        let cached: Result<u32, String> =
            cache.try_get_or_set("ns", "k", None, || Err("unused".to_string()));
        assert_eq!(cached, Ok(5));
    }

    #[test]
    fn test_invalidate_key() {
        let cache = CacheManager::new();
        cache.get_or_set("ns", "k", None, || 1u32);
        assert!(cache.invalidate::<u32>("ns", "k"));
        assert!(!cache.invalidate::<u32>("ns", "k"));
        assert_eq!(cache.get_or_set("ns", "k", None, || 2u32), 2);
    }

    #[test]
    fn test_file_result_roundtrip_and_invalidate_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("crash.log");
        fs::write(&path, "stack trace").unwrap();

        let cache = CacheManager::new();
        cache.cache_analysis_result(&path, "plugins", vec!["a.esp".to_string()]);

        let cached: Option<Vec<String>> = cache.get_cached_analysis_result(&path, "plugins");
        assert_eq!(cached, Some(vec!["a.esp".to_string()]));
        assert!(cache.is_file_cache_valid(&path));
        assert_eq!(cache.statistics().cached_file_count, 1);

        assert!(cache.invalidate_file(&path));
        assert!(!cache.is_file_cache_valid(&path));
    }

    #[test]
    fn test_missing_file_is_not_cached() {
        let cache = CacheManager::new();
        let path = Path::new("/no/such/crash.log");
        cache.cache_analysis_result(path, "plugins", 1u32);
        assert_eq!(cache.statistics().cached_file_count, 0);
    }

    #[test]
    fn test_result_for_changed_file_is_not_stored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("crash.log");
        fs::write(&path, "v1").unwrap();
        let observed = file_mtime(&path).unwrap();

        let cache = CacheManager::new();
        let earlier = observed - Duration::from_secs(60);
        cache.cache_analysis_result_at(&path, "plugins", 1u32, earlier);
        assert_eq!(cache.statistics().cached_file_count, 0);

        cache.cache_analysis_result_at(&path, "plugins", 2u32, observed);
        assert_eq!(cache.get_cached_analysis_result::<u32>(&path, "plugins"), Some(2));
    }

    #[test]
    fn test_memory_estimate_grows() {
        let cache = CacheManager::new();
        let empty = cache.statistics().approximate_memory_bytes;
        cache.get_or_set("namespace", "a-fairly-long-key", None, || [0u8; 256]);
        assert!(cache.statistics().approximate_memory_bytes > empty);
    }

    #[test]
    fn test_in_flight_slots_are_released() {
        let cache = CacheManager::new();
        cache.get_or_set("ns", "k", None, || 1u32);
        assert!(cache.in_flight.lock().unwrap().is_empty());
    }
}
