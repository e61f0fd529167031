//! Cache entry definitions.

use std::any::{Any, TypeId};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

/// Type-erased cached value.
pub type CachedValue = Arc<dyn Any + Send + Sync>;

/// Key of a key/value entry.
///
/// The value type is part of the key, so `get_or_set::<u32>("ns", "k", ..)`
/// and `get_or_set::<String>("ns", "k", ..)` never observe each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    namespace: String,
    key: String,
    type_id: TypeId,
}

impl CacheKey {
    /// Build the key for values of type `T`.
    #[must_use]
    pub fn new<T: 'static>(namespace: &str, key: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            key: key.to_string(),
            type_id: TypeId::of::<T>(),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    pub(crate) fn heap_bytes(&self) -> usize {
        self.namespace.len() + self.key.len()
    }
}

/// A key/value entry with an optional expiry.
#[derive(Clone)]
pub struct CacheEntry {
    value: CachedValue,
    created_at: Instant,
    expires_at: Option<Instant>,
}

impl std::fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl CacheEntry {
    /// Create an entry that expires `ttl` from now, or never if `ttl` is `None`.
    #[must_use]
    pub fn new(value: CachedValue, ttl: Option<Duration>) -> Self {
        let created_at = Instant::now();
        Self {
            value,
            created_at,
            // A TTL too large to represent means no expiry
            expires_at: ttl.and_then(|ttl| created_at.checked_add(ttl)),
        }
    }

    /// Valid iff there is no expiry or `now` is before it.
    #[must_use]
    pub fn is_valid_at(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|expires_at| now < expires_at)
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        !self.is_valid_at(Instant::now())
    }

    #[must_use]
    pub fn value(&self) -> &CachedValue {
        &self.value
    }

    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    #[must_use]
    pub fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }
}

/// An analyzer result tied to the source file's modification time.
#[derive(Clone)]
pub struct FileResultEntry {
    result: CachedValue,
    recorded_mtime: SystemTime,
}

impl std::fmt::Debug for FileResultEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileResultEntry")
            .field("recorded_mtime", &self.recorded_mtime)
            .finish_non_exhaustive()
    }
}

impl FileResultEntry {
    #[must_use]
    pub fn new(result: CachedValue, recorded_mtime: SystemTime) -> Self {
        Self {
            result,
            recorded_mtime,
        }
    }

    #[must_use]
    pub fn result(&self) -> &CachedValue {
        &self.result
    }

    #[must_use]
    pub fn recorded_mtime(&self) -> SystemTime {
        self.recorded_mtime
    }

    /// Whether the recorded timestamp equals `mtime`.
    #[must_use]
    pub fn matches(&self, mtime: SystemTime) -> bool {
        self.recorded_mtime == mtime
    }
}

/// Current modification time of `path`.
///
/// # Errors
///
/// Any error from reading the file's metadata, including `NotFound` for
/// deleted files.
pub fn file_mtime(path: &Path) -> io::Result<SystemTime> {
    fs::metadata(path)?.modified()
}
