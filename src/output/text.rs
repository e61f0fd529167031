//! Human-readable summary of a batch run.

use std::io::{self, Write};

use bytesize::ByteSize;

use crate::batch::{BatchReport, BatchSummary, FailureOutcome};
use crate::cache::CacheStatistics;

/// Failures listed before the rest are summarized as "... and N more".
pub const MAX_LISTED_FAILURES: usize = 20;

/// Plain-text report writer.
#[derive(Debug)]
pub struct TextOutput<'a, O> {
    report: &'a BatchReport<O>,
    passes: &'a [BatchSummary],
    cache: CacheStatistics,
    total_bytes: u64,
}

impl<'a, O> TextOutput<'a, O> {
    /// Create a text report.
    ///
    /// # Arguments
    ///
    /// * `report` - Report of the final pass
    /// * `passes` - Summaries of every pass
    /// * `cache` - Cache statistics after the run
    /// * `total_bytes` - Size of the discovered files
    #[must_use]
    pub fn new(
        report: &'a BatchReport<O>,
        passes: &'a [BatchSummary],
        cache: CacheStatistics,
        total_bytes: u64,
    ) -> Self {
        Self {
            report,
            passes,
            cache,
            total_bytes,
        }
    }

    /// Write the report.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let last = &self.report.summary;
        writeln!(
            writer,
            "Scanned {} files ({})",
            last.total_files,
            ByteSize::b(self.total_bytes)
        )?;

        for (index, pass) in self.passes.iter().enumerate() {
            writeln!(
                writer,
                "Pass {}: {} analyzed ({} from cache), {} skipped, {} failed, {} rejected in {:.2?}",
                index + 1,
                pass.analyzed,
                pass.cache_hits,
                pass.skipped,
                pass.failed,
                pass.rejected,
                pass.duration
            )?;
        }

        if last.interrupted {
            writeln!(writer, "Interrupted: {} files not processed", last.not_processed)?;
        } else if last.aborted {
            writeln!(writer, "Aborted: {} files not processed", last.not_processed)?;
        }

        if !self.report.failures.is_empty() {
            writeln!(writer)?;
            writeln!(writer, "Files without a result:")?;
            for failure in self.report.failures.iter().take(MAX_LISTED_FAILURES) {
                let label = match failure.outcome {
                    FailureOutcome::Skipped => "skipped",
                    FailureOutcome::Failed => "failed",
                    FailureOutcome::Rejected => "rejected",
                };
                writeln!(
                    writer,
                    "  [{}] {}: {}",
                    label,
                    failure.path.display(),
                    failure.message
                )?;
            }
            let remaining = self
                .report
                .failures
                .len()
                .saturating_sub(MAX_LISTED_FAILURES);
            if remaining > 0 {
                writeln!(writer, "  ... and {remaining} more")?;
            }
        }

        writeln!(writer)?;
        writeln!(
            writer,
            "Cache: {} hits, {} misses ({:.1}% hit rate), {} files cached, ~{}",
            self.cache.total_hits,
            self.cache.total_misses,
            self.cache.hit_rate * 100.0,
            self.cache.cached_file_count,
            self.cache.memory_display()
        )?;
        Ok(())
    }
}
