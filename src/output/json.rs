//! JSON output formatter for batch results.
//!
//! Provides machine-readable JSON output for scripting and automation.
//!
//! # Output Schema
//!
//! ```json
//! {
//!   "results": [
//!     {
//!       "path": "/logs/crash-1.log",
//!       "from_cache": false,
//!       "output": { "hash": "abc123...", "size": 1024, "line_count": 40 }
//!     }
//!   ],
//!   "failures": [
//!     {
//!       "path": "/logs/locked.log",
//!       "outcome": "skipped",
//!       "kind": "permission_denied",
//!       "message": "Permission denied: /logs/locked.log"
//!     }
//!   ],
//!   "passes": [
//!     { "total_files": 2, "analyzed": 1, "cache_hits": 0, "skipped": 1, "duration_ms": 12, "...": "..." }
//!   ],
//!   "cache": { "total_hits": 0, "total_misses": 2, "hit_rate": 0.0, "...": "..." },
//!   "exit_code": 3,
//!   "exit_code_name": "SG003"
//! }
//! ```

use std::io::Write;

use serde::Serialize;

use crate::batch::{BatchReport, BatchSummary, FileFailure};
use crate::cache::CacheStatistics;
use crate::error::ExitCode;

/// A single analyzed file in JSON format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonFileResult<'a, O> {
    /// Absolute path where possible
    pub path: String,
    /// Whether the result came from the cache
    pub from_cache: bool,
    /// Analyzer output
    pub output: &'a O,
}

/// Complete JSON output structure.
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutput<'a, O> {
    /// Results of the final pass
    pub results: Vec<JsonFileResult<'a, O>>,
    /// Failures of the final pass
    pub failures: &'a [FileFailure],
    /// Summary of every pass, in order
    pub passes: &'a [BatchSummary],
    /// Cache statistics after the final pass
    pub cache: CacheStatistics,
    /// The exit code number
    pub exit_code: i32,
    /// The machine-readable exit code name (e.g., "SG000")
    pub exit_code_name: &'static str,
}

impl<'a, O: Serialize> JsonOutput<'a, O> {
    /// Create a new JSON output.
    ///
    /// # Arguments
    ///
    /// * `report` - Report of the final pass
    /// * `passes` - Summaries of every pass
    /// * `cache` - Cache statistics after the run
    /// * `exit_code` - The exit code for this run
    #[must_use]
    pub fn new(
        report: &'a BatchReport<O>,
        passes: &'a [BatchSummary],
        cache: CacheStatistics,
        exit_code: ExitCode,
    ) -> Self {
        Self {
            results: report
                .results
                .iter()
                .map(|r| JsonFileResult {
                    path: normalize_path(&r.path),
                    from_cache: r.from_cache,
                    output: &r.output,
                })
                .collect(),
            failures: &report.failures,
            passes,
            cache,
            exit_code: exit_code.as_i32(),
            exit_code_name: exit_code.code_prefix(),
        }
    }

    /// Serialize to compact JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails (unlikely for valid data).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to pretty-printed JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails (unlikely for valid data).
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write JSON to a writer.
    ///
    /// # Arguments
    ///
    /// * `writer` - The writer to output to (e.g., stdout)
    /// * `pretty` - Whether to pretty-print the output
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W, pretty: bool) -> Result<(), JsonOutputError> {
        let json = if pretty {
            self.to_json_pretty()?
        } else {
            self.to_json()?
        };
        writer.write_all(json.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

/// Normalize a path to an absolute path string.
///
/// Attempts to canonicalize the path. If that fails (e.g., file no longer exists),
/// falls back to the display representation.
fn normalize_path(path: &std::path::Path) -> String {
    match path.canonicalize() {
        Ok(canonical) => canonical.to_string_lossy().into_owned(),
        Err(_) => path.to_string_lossy().into_owned(),
    }
}

/// Errors that can occur during JSON output.
#[derive(thiserror::Error, Debug)]
pub enum JsonOutputError {
    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error during writing
    #[error("I/O error during JSON generation: {0}")]
    Io(#[from] std::io::Error),
}
