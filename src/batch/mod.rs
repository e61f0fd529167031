//! Batch analysis over discovered files.
//!
//! # Overview
//!
//! The batch runner is the caller that ties the crate together. For every
//! file it:
//! 1. Serves the result from the file result cache when the file is unchanged
//! 2. Otherwise runs the analyzer through the resilient executor, guarded by
//!    the circuit breaker when one is configured
//! 3. Records Skip-classified failures and keeps going
//! 4. Stops the batch on Fail-classified failures, cancellation, or (when
//!    configured) an open breaker
//!
//! # Example
//!
//! ```no_run
//! use scanguard::batch::{BatchConfig, BatchRunner};
//! use scanguard::scanner::{DigestAnalyzer, Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let files: Vec<_> = Walker::new(Path::new("logs"), WalkerConfig::default())
//!     .walk()
//!     .filter_map(Result::ok)
//!     .collect();
//!
//! let runner = BatchRunner::new(BatchConfig::default());
//! let report = runner.run(files, &DigestAnalyzer::new());
//! println!("{} analyzed, {} skipped", report.summary.analyzed, report.summary.skipped);
//! ```

pub mod runner;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::cache::{build_cache, ResultCache};
use crate::progress::{NoOpProgress, ProgressCallback};
use crate::resilience::{CircuitBreaker, ErrorKind, ResilientExecutor};
use crate::signal::CancellationToken;

pub use runner::BatchRunner;

/// Default number of I/O worker threads.
pub const DEFAULT_IO_THREADS: usize = 4;

/// Configuration for a batch run.
#[derive(Clone)]
pub struct BatchConfig {
    /// Number of I/O threads for parallel analysis.
    /// Default is 4 to prevent disk thrashing.
    pub io_threads: usize,
    /// Result cache consulted before every analysis.
    pub cache: Arc<dyn ResultCache>,
    /// Executor wrapping every analysis.
    pub executor: Arc<ResilientExecutor>,
    /// Optional breaker guarding every analysis.
    pub breaker: Option<Arc<CircuitBreaker>>,
    /// Stop the batch when the breaker rejects a file.
    pub stop_on_open_circuit: bool,
    /// Cancellation token for graceful termination.
    pub cancel: CancellationToken,
    /// Progress sink.
    pub progress: Arc<dyn ProgressCallback>,
}

impl std::fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchConfig")
            .field("io_threads", &self.io_threads)
            .field("cache_enabled", &self.cache.is_enabled())
            .field("executor", &self.executor)
            .field("breaker", &self.breaker)
            .field("stop_on_open_circuit", &self.stop_on_open_circuit)
            .field("cancel", &self.cancel)
            .field("progress", &"<callback>")
            .finish()
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            io_threads: DEFAULT_IO_THREADS,
            cache: build_cache(true),
            executor: Arc::new(ResilientExecutor::default()),
            breaker: None,
            stop_on_open_circuit: true,
            cancel: CancellationToken::new(),
            progress: Arc::new(NoOpProgress),
        }
    }
}

impl BatchConfig {
    /// Set the I/O thread count (at least 1).
    #[must_use]
    pub fn with_io_threads(mut self, threads: usize) -> Self {
        self.io_threads = threads.max(1);
        self
    }

    /// Set the result cache.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn ResultCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Set the executor.
    #[must_use]
    pub fn with_executor(mut self, executor: Arc<ResilientExecutor>) -> Self {
        self.executor = executor;
        self
    }

    /// Guard every analysis with `breaker`.
    #[must_use]
    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Whether an open breaker aborts the batch.
    #[must_use]
    pub fn with_stop_on_open_circuit(mut self, stop: bool) -> Self {
        self.stop_on_open_circuit = stop;
        self
    }

    /// Set the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }
}

/// A successfully analyzed file.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzedFile<O> {
    /// Path of the file
    pub path: PathBuf,
    /// Analyzer output
    pub output: O,
    /// Whether the output came from the result cache
    pub from_cache: bool,
}

/// How a file failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureOutcome {
    /// Skip-classified; the batch continued.
    Skipped,
    /// Fail-classified; the batch stopped.
    Failed,
    /// Rejected by an open circuit breaker without running.
    Rejected,
}

/// A file that produced no result.
#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    /// Path of the file
    pub path: PathBuf,
    /// What happened to the file
    pub outcome: FailureOutcome,
    /// Classification of the error, absent for breaker rejections
    pub kind: Option<ErrorKind>,
    /// Human-readable error message
    pub message: String,
}

/// Counters for a batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Files handed to the runner
    pub total_files: usize,
    /// Files with a result (including cache hits)
    pub analyzed: usize,
    /// Results served from the cache
    pub cache_hits: usize,
    /// Skip-classified failures
    pub skipped: usize,
    /// Fail-classified failures
    pub failed: usize,
    /// Breaker rejections
    pub rejected: usize,
    /// Files never attempted because the batch stopped early
    pub not_processed: usize,
    /// Whether cancellation stopped the batch
    pub interrupted: bool,
    /// Whether a fatal failure or an open breaker stopped the batch
    pub aborted: bool,
    /// Wall-clock time of the run
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
}

impl BatchSummary {
    /// Whether every file produced a result.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.interrupted
            && !self.aborted
            && self.analyzed == self.total_files
    }

    /// Share of results served from the cache (0.0 to 1.0).
    #[must_use]
    pub fn cache_hit_rate(&self) -> f64 {
        if self.analyzed == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.analyzed as f64
        }
    }
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

/// Everything a batch run produced.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport<O> {
    /// Results in input order
    pub results: Vec<AnalyzedFile<O>>,
    /// Failures in input order
    pub failures: Vec<FileFailure>,
    /// Counters
    pub summary: BatchSummary,
}

impl<O> BatchReport<O> {
    /// Failures that were skipped while the batch continued.
    pub fn skipped(&self) -> impl Iterator<Item = &FileFailure> {
        self.failures
            .iter()
            .filter(|f| f.outcome == FailureOutcome::Skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_config_default() {
        let config = BatchConfig::default();
        assert_eq!(config.io_threads, DEFAULT_IO_THREADS);
        assert!(config.cache.is_enabled());
        assert!(config.breaker.is_none());
        assert!(config.stop_on_open_circuit);
    }

    #[test]
    fn test_batch_config_io_threads_minimum() {
        let config = BatchConfig::default().with_io_threads(0);
        assert_eq!(config.io_threads, 1);
    }

    #[test]
    fn test_summary_cache_hit_rate() {
        let summary = BatchSummary {
            total_files: 4,
            analyzed: 4,
            cache_hits: 3,
            ..Default::default()
        };
        assert!((summary.cache_hit_rate() - 0.75).abs() < f64::EPSILON);
        assert!(summary.is_complete());
        assert_eq!(BatchSummary::default().cache_hit_rate(), 0.0);
    }

    #[test]
    fn test_summary_serializes_duration_as_millis() {
        let summary = BatchSummary {
            duration: Duration::from_millis(1500),
            ..Default::default()
        };
        let json = serde_json::to_value(summary).unwrap();
        assert_eq!(json["duration_ms"], 1500);
        assert_eq!(json["interrupted"], false);
    }
}
