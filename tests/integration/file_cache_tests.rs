use filetime::{set_file_mtime, FileTime};
use scanguard::cache::{file_mtime, CacheExt, CacheManager, ResultCache};
use std::fs;
use std::sync::Arc;
use std::thread;
use tempfile::tempdir;

#[derive(Debug, Clone, PartialEq)]
struct PluginList(Vec<String>);

fn plugins() -> PluginList {
    PluginList(vec!["Skyrim.esm".to_string(), "Unofficial Patch.esp".to_string()])
}

#[test]
fn test_unchanged_file_is_served_from_cache() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("crash-2024.log");
    fs::write(&path, "Unhandled exception").unwrap();

    let cache = CacheManager::new();
    cache.cache_analysis_result(&path, "plugins", plugins());

    assert!(cache.is_file_cache_valid(&path));
    assert_eq!(
        cache.get_cached_analysis_result::<PluginList>(&path, "plugins"),
        Some(plugins())
    );
}

#[test]
fn test_modified_file_invalidates_entry() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("crash.log");
    fs::write(&path, "first").unwrap();
    set_file_mtime(&path, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();

    let cache = CacheManager::new();
    cache.cache_analysis_result(&path, "plugins", plugins());
    assert!(cache.is_file_cache_valid(&path));

    set_file_mtime(&path, FileTime::from_unix_time(1_600_000_100, 0)).unwrap();

    assert!(!cache.is_file_cache_valid(&path));
    assert_eq!(
        cache.get_cached_analysis_result::<PluginList>(&path, "plugins"),
        None
    );
    // The stale entry was dropped on read
    assert_eq!(cache.statistics().cached_file_count, 0);
}

#[test]
fn test_older_mtime_also_invalidates() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("crash.log");
    fs::write(&path, "content").unwrap();
    set_file_mtime(&path, FileTime::from_unix_time(1_700_000_000, 0)).unwrap();

    let cache = CacheManager::new();
    cache.cache_analysis_result(&path, "digest", 42u64);

    // Restored from backup with an earlier timestamp
    set_file_mtime(&path, FileTime::from_unix_time(1_500_000_000, 0)).unwrap();
    assert_eq!(cache.get_cached_analysis_result::<u64>(&path, "digest"), None);
}

#[test]
fn test_deleted_file_is_invalid() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("crash.log");
    fs::write(&path, "content").unwrap();

    let cache = CacheManager::new();
    cache.cache_analysis_result(&path, "digest", 1u64);
    fs::remove_file(&path).unwrap();

    assert!(!cache.is_file_cache_valid(&path));
    assert_eq!(cache.get_cached_analysis_result::<u64>(&path, "digest"), None);
    assert!(file_mtime(&path).is_err());
}

#[test]
fn test_missing_file_is_never_cached() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("never-written.log");

    let cache = CacheManager::new();
    cache.cache_analysis_result(&path, "digest", 1u64);

    assert_eq!(cache.statistics().cached_file_count, 0);
    assert!(!cache.is_file_cache_valid(&path));
}

#[test]
fn test_unknown_file_is_invalid() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("crash.log");
    fs::write(&path, "content").unwrap();

    let cache = CacheManager::new();
    assert!(!cache.is_file_cache_valid(&path));
}

#[test]
fn test_analyzer_kinds_are_independent() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("crash.log");
    fs::write(&path, "content").unwrap();

    let cache = CacheManager::new();
    cache.cache_analysis_result(&path, "plugins", plugins());
    cache.cache_analysis_result(&path, "digest", 7u64);

    assert_eq!(cache.get_cached_analysis_result::<u64>(&path, "digest"), Some(7));
    assert_eq!(
        cache.get_cached_analysis_result::<PluginList>(&path, "plugins"),
        Some(plugins())
    );
    assert_eq!(cache.get_cached_analysis_result::<u64>(&path, "records"), None);
    assert_eq!(cache.statistics().cached_file_count, 1);
}

#[test]
fn test_wrong_type_is_a_miss() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("crash.log");
    fs::write(&path, "content").unwrap();

    let cache = CacheManager::new();
    cache.cache_analysis_result(&path, "digest", 7u64);
    assert_eq!(cache.get_cached_analysis_result::<String>(&path, "digest"), None);
}

#[test]
fn test_recache_after_change() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("crash.log");
    fs::write(&path, "v1").unwrap();
    set_file_mtime(&path, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();

    let cache = CacheManager::new();
    cache.cache_analysis_result(&path, "digest", 1u64);

    fs::write(&path, "v2").unwrap();
    set_file_mtime(&path, FileTime::from_unix_time(1_600_000_500, 0)).unwrap();
    assert_eq!(cache.get_cached_analysis_result::<u64>(&path, "digest"), None);

    cache.cache_analysis_result(&path, "digest", 2u64);
    assert_eq!(cache.get_cached_analysis_result::<u64>(&path, "digest"), Some(2));
}

#[test]
fn test_invalidate_file_and_clear() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a.log");
    let b = dir.path().join("b.log");
    fs::write(&a, "a").unwrap();
    fs::write(&b, "b").unwrap();

    let cache = CacheManager::new();
    cache.cache_analysis_result(&a, "digest", 1u64);
    cache.cache_analysis_result(&b, "digest", 2u64);

    assert!(cache.invalidate_file(&a));
    assert!(!cache.invalidate_file(&a));
    assert!(cache.is_file_cache_valid(&b));

    cache.clear_cache();
    assert!(!cache.is_file_cache_valid(&b));
    assert_eq!(cache.statistics().cached_file_count, 0);
}

#[test]
fn test_concurrent_file_results() {
    let dir = tempdir().unwrap();
    let paths: Vec<_> = (0..8)
        .map(|i| {
            let path = dir.path().join(format!("crash-{i}.log"));
            fs::write(&path, format!("log {i}")).unwrap();
            path
        })
        .collect();

    let cache = Arc::new(CacheManager::new());
    let handles: Vec<_> = paths
        .iter()
        .cloned()
        .enumerate()
        .map(|(i, path)| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                cache.cache_analysis_result(&path, "digest", i as u64);
                cache.get_cached_analysis_result::<u64>(&path, "digest")
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.join().unwrap(), Some(i as u64));
    }
    assert_eq!(cache.statistics().cached_file_count, 8);
}
