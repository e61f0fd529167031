//! The cache contract and its typed helpers.
//!
//! [`ResultCache`] is object-safe so callers can hold an
//! `Arc<dyn ResultCache>` and swap [`crate::cache::CacheManager`] for
//! [`crate::cache::DisabledCache`] at construction time. The generic,
//! typed API lives on [`CacheExt`], implemented for every `ResultCache`.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use super::entry::{CacheKey, CachedValue};
use super::stats::CacheStatistics;

/// Object-safe cache contract.
pub trait ResultCache: Send + Sync {
    /// Return the live value for `key`, or run `factory` and store what it
    /// produces. A `None` from the factory is returned as-is and not stored.
    ///
    /// Implementations must not run `factory` when a live value exists.
    fn lookup_or_compute(
        &self,
        key: &CacheKey,
        ttl: Option<Duration>,
        factory: &mut dyn FnMut() -> Option<CachedValue>,
    ) -> Option<CachedValue>;

    /// Remove the entry for `key`. Returns whether an entry was removed.
    fn remove(&self, key: &CacheKey) -> bool;

    /// Store `result` for `(path, analyzer_kind)` with the file's current mtime.
    fn store_analysis_result(&self, path: &Path, analyzer_kind: &str, result: CachedValue);

    /// Store `result` computed from the file as it was at `observed_mtime`.
    ///
    /// Nothing is stored if the file's mtime no longer equals
    /// `observed_mtime`: the result describes content that is already gone.
    fn store_analysis_result_at(
        &self,
        path: &Path,
        analyzer_kind: &str,
        result: CachedValue,
        observed_mtime: SystemTime,
    );

    /// Load the result for `(path, analyzer_kind)` if the file is unchanged.
    fn load_analysis_result(&self, path: &Path, analyzer_kind: &str) -> Option<CachedValue>;

    /// Whether the file exists and matches a recorded mtime for any analyzer.
    fn is_file_cache_valid(&self, path: &Path) -> bool;

    /// Drop every result recorded for `path`. Returns whether any was removed.
    fn invalidate_file(&self, path: &Path) -> bool;

    /// Empty both stores and reset the counters.
    fn clear_cache(&self);

    /// Snapshot of the counters.
    fn statistics(&self) -> CacheStatistics;

    /// Whether this cache stores anything at all.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Typed helpers over [`ResultCache`].
///
/// # Example
///
/// ```
/// use scanguard::cache::{CacheExt, CacheManager};
///
/// let cache = CacheManager::new();
/// let mut calls = 0;
///
/// let a = cache.get_or_set("yaml", "game_version", None, || {
///     calls += 1;
///     "1.10.984".to_string()
/// });
/// let b = cache.get_or_set("yaml", "game_version", None, || {
///     calls += 1;
///     "unused".to_string()
/// });
///
/// assert_eq!(a, b);
/// assert_eq!(calls, 1);
/// ```
pub trait CacheExt: ResultCache {
    /// Return the cached `T` for `(namespace, key)`, computing it with
    /// `factory` on a miss.
    fn get_or_set<T, F>(&self, namespace: &str, key: &str, ttl: Option<Duration>, factory: F) -> T
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        let key = CacheKey::new::<T>(namespace, key);
        let mut factory = Some(factory);
        let mut produced: Option<T> = None;

        let cached = self.lookup_or_compute(&key, ttl, &mut || {
            let factory = factory.take()?;
            let value = factory();
            produced = Some(value.clone());
            Some(Arc::new(value) as CachedValue)
        });

        if let Some(value) = produced {
            return value;
        }
        if let Some(value) = cached.as_deref().and_then(|v| v.downcast_ref::<T>()) {
            return value.clone();
        }
        match factory.take() {
            Some(factory) => factory(),
            None => unreachable!("factory consumed without producing a value"),
        }
    }

    /// Like [`get_or_set`](Self::get_or_set) with a fallible factory.
    /// Errors are returned to the caller and never cached.
    ///
    /// # Errors
    ///
    /// Whatever `factory` returns.
    fn try_get_or_set<T, E, F>(
        &self,
        namespace: &str,
        key: &str,
        ttl: Option<Duration>,
        factory: F,
    ) -> Result<T, E>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Result<T, E>,
    {
        let key = CacheKey::new::<T>(namespace, key);
        let mut factory = Some(factory);
        let mut produced: Option<Result<T, E>> = None;

        let cached = self.lookup_or_compute(&key, ttl, &mut || {
            let factory = factory.take()?;
            match factory() {
                Ok(value) => {
                    produced = Some(Ok(value.clone()));
                    Some(Arc::new(value) as CachedValue)
                }
                Err(err) => {
                    produced = Some(Err(err));
                    None
                }
            }
        });

        if let Some(result) = produced {
            return result;
        }
        if let Some(value) = cached.as_deref().and_then(|v| v.downcast_ref::<T>()) {
            return Ok(value.clone());
        }
        match factory.take() {
            Some(factory) => factory(),
            None => unreachable!("factory consumed without producing a value"),
        }
    }

    /// Drop the `T` entry for `(namespace, key)`.
    fn invalidate<T: 'static>(&self, namespace: &str, key: &str) -> bool {
        self.remove(&CacheKey::new::<T>(namespace, key))
    }

    /// Store an analyzer result for `path` keyed by `analyzer_kind`.
    fn cache_analysis_result<T>(&self, path: &Path, analyzer_kind: &str, result: T)
    where
        T: Send + Sync + 'static,
    {
        self.store_analysis_result(path, analyzer_kind, Arc::new(result));
    }

    /// Store an analyzer result computed from `path` as it was at
    /// `observed_mtime`. See [`ResultCache::store_analysis_result_at`].
    fn cache_analysis_result_at<T>(
        &self,
        path: &Path,
        analyzer_kind: &str,
        result: T,
        observed_mtime: SystemTime,
    ) where
        T: Send + Sync + 'static,
    {
        self.store_analysis_result_at(path, analyzer_kind, Arc::new(result), observed_mtime);
    }

    /// The cached analyzer result for `path`, if the file is unchanged and
    /// the stored result is a `T`.
    fn get_cached_analysis_result<T>(&self, path: &Path, analyzer_kind: &str) -> Option<T>
    where
        T: Clone + 'static,
    {
        let cached = self.load_analysis_result(path, analyzer_kind)?;
        let value = cached.downcast_ref::<T>().cloned();
        if value.is_none() {
            log::debug!(
                "Cached {} result for {} has an unexpected type",
                analyzer_kind,
                path.display()
            );
        }
        value
    }
}

impl<C: ResultCache + ?Sized> CacheExt for C {}
