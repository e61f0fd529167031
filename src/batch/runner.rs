//! Parallel batch execution.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

use rayon::prelude::*;

use super::{AnalyzedFile, BatchConfig, BatchReport, BatchSummary, FailureOutcome, FileFailure};
use crate::cache::{file_mtime, CacheExt};
use crate::progress::PHASE_ANALYZING;
use crate::resilience::{BreakerError, ClassifyError, ErrorAction, ErrorKind};
use crate::scanner::{Analyzer, FileEntry, ScanError};
use crate::signal::CancellationToken;

enum Outcome<O> {
    Analyzed { output: O, from_cache: bool },
    Failed(FileFailure),
    Interrupted,
    NotProcessed,
}

/// Runs an [`Analyzer`] over a set of files.
#[derive(Debug, Clone, Default)]
pub struct BatchRunner {
    config: BatchConfig,
}

impl BatchRunner {
    /// Create a runner.
    #[must_use]
    pub fn new(config: BatchConfig) -> Self {
        Self { config }
    }

    /// The runner's configuration.
    #[must_use]
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Analyze `files` with `analyzer`.
    ///
    /// Results and failures come back in input order. The run never returns
    /// an error: per-file failures are recorded in the report and a stopped
    /// batch is flagged in [`BatchSummary`].
    pub fn run<A: Analyzer>(&self, files: Vec<FileEntry>, analyzer: &A) -> BatchReport<A::Output> {
        let started = Instant::now();
        let total = files.len();
        let config = &self.config;

        log::info!(
            "Analyzing {} files with '{}' on {} threads",
            total,
            analyzer.kind(),
            config.io_threads
        );
        config.progress.on_phase_start(PHASE_ANALYZING, total);

        let abort = AtomicBool::new(false);
        let completed = AtomicUsize::new(0);

        let work = || -> Vec<(FileEntry, Outcome<A::Output>)> {
            files
                .into_par_iter()
                .map(|file| {
                    let outcome = self.process_file(&file, analyzer, &abort);
                    let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                    config
                        .progress
                        .on_progress(done, file.path.to_string_lossy().as_ref());
                    (file, outcome)
                })
                .collect()
        };

        // Limited parallelism for I/O
        let outcomes = match rayon::ThreadPoolBuilder::new()
            .num_threads(config.io_threads)
            .build()
        {
            Ok(pool) => pool.install(work),
            Err(e) => {
                log::warn!(
                    "Failed to create custom thread pool ({}), using global pool with {} threads",
                    e,
                    rayon::current_num_threads()
                );
                work()
            }
        };

        config.progress.on_phase_end(PHASE_ANALYZING);

        let mut report = BatchReport {
            results: Vec::new(),
            failures: Vec::new(),
            summary: BatchSummary {
                total_files: total,
                ..Default::default()
            },
        };

        for (file, outcome) in outcomes {
            match outcome {
                Outcome::Analyzed { output, from_cache } => {
                    report.summary.analyzed += 1;
                    if from_cache {
                        report.summary.cache_hits += 1;
                    }
                    report.results.push(AnalyzedFile {
                        path: file.path,
                        output,
                        from_cache,
                    });
                }
                Outcome::Failed(failure) => {
                    match failure.outcome {
                        FailureOutcome::Skipped => report.summary.skipped += 1,
                        FailureOutcome::Failed => report.summary.failed += 1,
                        FailureOutcome::Rejected => report.summary.rejected += 1,
                    }
                    report.failures.push(failure);
                }
                Outcome::Interrupted | Outcome::NotProcessed => {
                    report.summary.not_processed += 1;
                }
            }
        }

        report.summary.interrupted = config.cancel.is_cancelled();
        report.summary.aborted = abort.load(Ordering::SeqCst) && !report.summary.interrupted;
        report.summary.duration = started.elapsed();

        if report.summary.interrupted {
            log::info!("Batch interrupted by cancellation");
        } else if report.summary.aborted {
            log::warn!(
                "Batch aborted: {} files not processed",
                report.summary.not_processed
            );
        }
        log::info!(
            "Batch complete: {} analyzed ({} from cache), {} skipped, {} failed, {} rejected in {:?}",
            report.summary.analyzed,
            report.summary.cache_hits,
            report.summary.skipped,
            report.summary.failed,
            report.summary.rejected,
            report.summary.duration
        );

        report
    }

    fn process_file<A: Analyzer>(
        &self,
        file: &FileEntry,
        analyzer: &A,
        abort: &AtomicBool,
    ) -> Outcome<A::Output> {
        let config = &self.config;
        if config.cancel.is_cancelled() {
            return Outcome::Interrupted;
        }
        if abort.load(Ordering::SeqCst) {
            return Outcome::NotProcessed;
        }

        let path = file.path.as_path();
        let kind = analyzer.kind();

        if let Some(output) = config
            .cache
            .get_cached_analysis_result::<A::Output>(path, kind)
        {
            log::trace!("Result cache hit: {}", path.display());
            return Outcome::Analyzed {
                output,
                from_cache: true,
            };
        }

        // Results are tied to the content seen when the analysis started
        let observed_mtime = file_mtime(path).ok();
        let context = format!("{} {}", kind, path.display());
        let analyze = |token: &CancellationToken| analyzer.analyze(path, token);

        let result = match config.breaker.as_deref() {
            Some(breaker) => {
                config
                    .executor
                    .execute_guarded(breaker, &context, &config.cancel, analyze)
            }
            None => config
                .executor
                .execute(&context, &config.cancel, analyze)
                .map_err(BreakerError::Inner),
        };

        match result {
            Ok(output) => {
                if let Some(mtime) = observed_mtime {
                    config
                        .cache
                        .cache_analysis_result_at(path, kind, output.clone(), mtime);
                }
                Outcome::Analyzed {
                    output,
                    from_cache: false,
                }
            }
            Err(BreakerError::Open { failures, .. }) => {
                if config.stop_on_open_circuit && !abort.swap(true, Ordering::SeqCst) {
                    log::warn!(
                        "Circuit breaker open after {} failures, stopping batch",
                        failures
                    );
                }
                Outcome::Failed(FileFailure {
                    path: path.to_path_buf(),
                    outcome: FailureOutcome::Rejected,
                    kind: None,
                    message: format!("Circuit breaker open after {failures} consecutive failures"),
                })
            }
            Err(BreakerError::Inner(err)) => self.classify_failure(path, &context, &err, abort),
        }
    }

    fn classify_failure<O>(
        &self,
        path: &Path,
        context: &str,
        err: &ScanError,
        abort: &AtomicBool,
    ) -> Outcome<O> {
        let kind = err.error_kind();
        if kind == ErrorKind::Cancelled {
            return Outcome::Interrupted;
        }

        // The executor already logged this decision; only the action matters here.
        let decision = self
            .config
            .executor
            .policy()
            .handle_error(err, context, u32::MAX);
        let outcome = if decision.action() == ErrorAction::Fail {
            if !abort.swap(true, Ordering::SeqCst) {
                log::error!("Fatal error, stopping batch: {}", err);
            }
            FailureOutcome::Failed
        } else {
            FailureOutcome::Skipped
        };

        Outcome::Failed(FileFailure {
            path: path.to_path_buf(),
            outcome,
            kind: Some(kind),
            message: err.to_string(),
        })
    }
}
