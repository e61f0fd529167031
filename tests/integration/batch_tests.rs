use filetime::{set_file_mtime, FileTime};
use scanguard::batch::{BatchConfig, BatchRunner, FailureOutcome};
use scanguard::cache::{CacheManager, DisabledCache, ResultCache};
use scanguard::progress::ProgressCallback;
use scanguard::resilience::{CircuitBreaker, DefaultErrorPolicy, ErrorKind, ResilientExecutor};
use scanguard::scanner::{
    Analyzer, DigestAnalyzer, FileEntry, ScanError, Walker, WalkerConfig,
};
use scanguard::signal::CancellationToken;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::{tempdir, TempDir};

/// Fails every file `failures` times with a transient error, then succeeds.
struct FlakyAnalyzer {
    failures: u32,
    attempts: Mutex<HashMap<PathBuf, u32>>,
}

impl FlakyAnalyzer {
    fn new(failures: u32) -> Self {
        Self {
            failures,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    fn attempts(&self, path: &Path) -> u32 {
        self.attempts.lock().unwrap().get(path).copied().unwrap_or(0)
    }
}

impl Analyzer for FlakyAnalyzer {
    type Output = u64;

    fn kind(&self) -> &str {
        "flaky"
    }

    fn analyze(&self, path: &Path, _cancel: &CancellationToken) -> Result<u64, ScanError> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let count = attempts.entry(path.to_path_buf()).or_insert(0);
            *count += 1;
            *count
        };
        if attempt <= self.failures {
            return Err(ScanError::Io {
                path: path.to_path_buf(),
                source: io::Error::new(io::ErrorKind::ConnectionReset, "share went away"),
            });
        }
        Ok(fs::metadata(path).map_err(|e| ScanError::from_io(path, e))?.len())
    }
}

/// Fails files whose name contains `needle` with the given error kind.
struct FailingAnalyzer {
    needle: &'static str,
    error: io::ErrorKind,
    calls: AtomicUsize,
}

impl FailingAnalyzer {
    fn new(needle: &'static str, error: io::ErrorKind) -> Self {
        Self {
            needle,
            error,
            calls: AtomicUsize::new(0),
        }
    }
}

impl Analyzer for FailingAnalyzer {
    type Output = String;

    fn kind(&self) -> &str {
        "failing"
    }

    fn analyze(&self, path: &Path, _cancel: &CancellationToken) -> Result<String, ScanError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        if name.contains(self.needle) {
            Err(ScanError::Io {
                path: path.to_path_buf(),
                source: io::Error::new(self.error, "analysis failed"),
            })
        } else {
            Ok(name)
        }
    }
}

/// Returns the file's contents, rewriting it to "v2" during the first call.
#[derive(Default)]
struct RewritingAnalyzer {
    calls: AtomicUsize,
}

impl Analyzer for RewritingAnalyzer {
    type Output = String;

    fn kind(&self) -> &str {
        "contents"
    }

    fn analyze(&self, path: &Path, _cancel: &CancellationToken) -> Result<String, ScanError> {
        let contents = fs::read_to_string(path).map_err(|e| ScanError::from_io(path, e))?;
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            fs::write(path, "v2").unwrap();
            set_file_mtime(path, FileTime::from_unix_time(2_000_000_000, 0)).unwrap();
        }
        Ok(contents)
    }
}

#[derive(Default)]
struct RecordingProgress {
    started: Mutex<Vec<(String, usize)>>,
    ticks: AtomicUsize,
    ended: Mutex<Vec<String>>,
}

impl ProgressCallback for RecordingProgress {
    fn on_phase_start(&self, phase: &str, total: usize) {
        self.started.lock().unwrap().push((phase.to_string(), total));
    }

    fn on_progress(&self, _current: usize, _path: &str) {
        self.ticks.fetch_add(1, Ordering::SeqCst);
    }

    fn on_phase_end(&self, phase: &str) {
        self.ended.lock().unwrap().push(phase.to_string());
    }
}

fn crash_logs(count: usize) -> (TempDir, Vec<FileEntry>) {
    let dir = tempdir().unwrap();
    for i in 0..count {
        fs::write(
            dir.path().join(format!("crash-{i:02}.log")),
            format!("Unhandled exception {i}\n"),
        )
        .unwrap();
    }
    let files = Walker::new(dir.path(), WalkerConfig::default())
        .walk()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    (dir, files)
}

fn fast_executor(max_retries: u32) -> Arc<ResilientExecutor> {
    Arc::new(ResilientExecutor::new(Arc::new(
        DefaultErrorPolicy::new()
            .with_max_retries(max_retries)
            .with_retry_delay(Duration::from_millis(1)),
    )))
}

#[test]
fn test_transient_failures_are_retried_transparently() {
    let (_dir, files) = crash_logs(4);
    let runner = BatchRunner::new(
        BatchConfig::default()
            .with_executor(fast_executor(3))
            .with_io_threads(2),
    );
    let analyzer = FlakyAnalyzer::new(2);

    let report = runner.run(files.clone(), &analyzer);

    assert!(report.summary.is_complete());
    assert_eq!(report.summary.analyzed, 4);
    for file in &files {
        assert_eq!(analyzer.attempts(&file.path), 3);
    }
    for result in &report.results {
        assert!(result.output > 0);
    }
}

#[test]
fn test_exhausted_retries_skip_the_file() {
    let (_dir, files) = crash_logs(3);
    let runner = BatchRunner::new(BatchConfig::default().with_executor(fast_executor(1)));
    let analyzer = FlakyAnalyzer::new(5);

    let report = runner.run(files, &analyzer);

    assert_eq!(report.summary.skipped, 3);
    assert!(!report.summary.aborted);
    assert!(report
        .failures
        .iter()
        .all(|f| f.kind == Some(ErrorKind::TransientIo)));
}

#[test]
fn test_fatal_failure_stops_batch() {
    let (_dir, files) = crash_logs(6);
    let runner = BatchRunner::new(BatchConfig::default().with_io_threads(1));
    let analyzer = FailingAnalyzer::new("crash-01", io::ErrorKind::OutOfMemory);

    let report = runner.run(files, &analyzer);

    assert!(report.summary.aborted);
    assert!(!report.summary.interrupted);
    assert_eq!(report.summary.analyzed, 1);
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.not_processed, 4);
    assert_eq!(report.failures[0].outcome, FailureOutcome::Failed);
    assert_eq!(report.failures[0].kind, Some(ErrorKind::ResourceExhausted));
    assert_eq!(analyzer.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_open_breaker_rejections_without_stopping() {
    let (_dir, files) = crash_logs(5);
    let breaker = Arc::new(CircuitBreaker::new(2, Duration::from_secs(60)));
    let runner = BatchRunner::new(
        BatchConfig::default()
            .with_io_threads(1)
            .with_breaker(Arc::clone(&breaker))
            .with_stop_on_open_circuit(false),
    );
    let analyzer = FailingAnalyzer::new("crash", io::ErrorKind::PermissionDenied);

    let report = runner.run(files, &analyzer);

    assert!(!report.summary.aborted);
    assert_eq!(report.summary.skipped, 2);
    assert_eq!(report.summary.rejected, 3);
    assert_eq!(report.summary.not_processed, 0);
    assert_eq!(analyzer.calls.load(Ordering::SeqCst), 2);
    assert!(report
        .failures
        .iter()
        .filter(|f| f.outcome == FailureOutcome::Rejected)
        .all(|f| f.kind.is_none()));
}

#[test]
fn test_cache_shared_between_runners() {
    let (_dir, files) = crash_logs(3);
    let cache: Arc<dyn ResultCache> = Arc::new(CacheManager::new());
    let analyzer = DigestAnalyzer::new();

    let first = BatchRunner::new(BatchConfig::default().with_cache(Arc::clone(&cache)))
        .run(files.clone(), &analyzer);
    let second = BatchRunner::new(BatchConfig::default().with_cache(Arc::clone(&cache)))
        .run(files, &analyzer);

    assert_eq!(first.summary.cache_hits, 0);
    assert_eq!(second.summary.cache_hits, 3);
    assert_eq!(second.summary.cache_hit_rate(), 1.0);
    for (a, b) in first.results.iter().zip(&second.results) {
        assert_eq!(a.path, b.path);
        assert_eq!(a.output, b.output);
    }

    let stats = cache.statistics();
    assert_eq!(stats.cached_file_count, 3);
    assert_eq!(stats.total_hits, 3);
    assert_eq!(stats.total_misses, 3);
}

#[test]
fn test_file_rewritten_during_analysis_is_not_cached() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("crash-00.log");
    fs::write(&path, "v1").unwrap();
    set_file_mtime(&path, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();
    let files = vec![FileEntry::new(path.clone(), 2, std::time::SystemTime::now())];

    let cache: Arc<dyn ResultCache> = Arc::new(CacheManager::new());
    let runner = BatchRunner::new(BatchConfig::default().with_cache(Arc::clone(&cache)));
    let analyzer = RewritingAnalyzer::default();

    let first = runner.run(files.clone(), &analyzer);
    assert_eq!(first.results[0].output, "v1");
    assert_eq!(cache.statistics().cached_file_count, 0);

    let second = runner.run(files.clone(), &analyzer);
    assert_eq!(second.results[0].output, "v2");
    assert!(!second.results[0].from_cache);

    // Unchanged since the second analysis, so now it is served from cache
    let third = runner.run(files, &analyzer);
    assert_eq!(third.results[0].output, "v2");
    assert!(third.results[0].from_cache);
    assert_eq!(analyzer.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_disabled_cache_always_analyzes() {
    let (_dir, files) = crash_logs(2);
    let runner = BatchRunner::new(BatchConfig::default().with_cache(Arc::new(DisabledCache)));
    let analyzer = FailingAnalyzer::new("never-matches", io::ErrorKind::Other);

    runner.run(files.clone(), &analyzer);
    let report = runner.run(files, &analyzer);

    assert_eq!(report.summary.cache_hits, 0);
    assert_eq!(analyzer.calls.load(Ordering::SeqCst), 4);
}

#[test]
fn test_progress_reported_per_file() {
    let (_dir, files) = crash_logs(5);
    let progress = Arc::new(RecordingProgress::default());
    let callback: Arc<dyn ProgressCallback> = Arc::clone(&progress) as _;
    let runner = BatchRunner::new(BatchConfig::default().with_progress_callback(callback));

    runner.run(files, &DigestAnalyzer::new());

    assert_eq!(
        *progress.started.lock().unwrap(),
        vec![("analyzing".to_string(), 5)]
    );
    assert_eq!(progress.ticks.load(Ordering::SeqCst), 5);
    assert_eq!(*progress.ended.lock().unwrap(), vec!["analyzing".to_string()]);
}

#[test]
fn test_results_keep_input_order() {
    let (_dir, files) = crash_logs(12);
    let runner = BatchRunner::new(BatchConfig::default().with_io_threads(4));

    let report = runner.run(files.clone(), &DigestAnalyzer::new());

    let expected: Vec<_> = files.iter().map(|f| f.path.clone()).collect();
    let actual: Vec<_> = report.results.iter().map(|r| r.path.clone()).collect();
    assert_eq!(actual, expected);
}
