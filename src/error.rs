//! Structured error handling and exit codes.

use serde::Serialize;

use crate::batch::BatchSummary;

/// Exit codes for the scanguard binary.
///
/// - 0: Success (every file produced a result)
/// - 1: General error (unexpected failure)
/// - 2: Aborted (fatal failure or open circuit breaker stopped the batch)
/// - 3: Partial success (some files were skipped or rejected)
/// - 130: Interrupted by user (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Success: every file was analyzed.
    Success = 0,
    /// General error: An unexpected error occurred.
    GeneralError = 1,
    /// Aborted: the batch stopped before every file was attempted.
    Aborted = 2,
    /// Partial success: the batch finished but some files have no result.
    PartialSuccess = 3,
    /// Interrupted: Scan was interrupted by user (Ctrl+C).
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "SG000",
            Self::GeneralError => "SG001",
            Self::Aborted => "SG002",
            Self::PartialSuccess => "SG003",
            Self::Interrupted => "SG130",
        }
    }

    /// Exit code describing a finished batch.
    #[must_use]
    pub fn from_summary(summary: &BatchSummary) -> Self {
        if summary.interrupted {
            Self::Interrupted
        } else if summary.aborted {
            Self::Aborted
        } else if summary.skipped + summary.failed + summary.rejected > 0 {
            Self::PartialSuccess
        } else {
            Self::Success
        }
    }

    /// The worse of two exit codes, for runs made of several batches.
    #[must_use]
    pub fn combine(self, other: Self) -> Self {
        fn rank(code: ExitCode) -> u8 {
            match code {
                ExitCode::Success => 0,
                ExitCode::PartialSuccess => 1,
                ExitCode::Aborted => 2,
                ExitCode::GeneralError => 3,
                ExitCode::Interrupted => 4,
            }
        }
        if rank(other) > rank(self) {
            other
        } else {
            self
        }
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "SG001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message
    pub message: String,
    /// Whether the operation was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
