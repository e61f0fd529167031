//! Error classification policies.
//!
//! A policy maps an error plus the current attempt number to an
//! [`ErrorHandlingResult`] that tells the caller whether to retry, skip the
//! current unit of work, or fail. Policies are pure: they describe the log
//! record the caller should emit but never emit it themselves.
//!
//! # Classification
//!
//! | kind                | action | severity    |
//! |---------------------|--------|-------------|
//! | `Cancelled`         | Fail   | Information |
//! | `PermissionDenied`  | Skip   | Warning     |
//! | `NotFound`          | Skip   | Warning     |
//! | `TransientIo`       | Retry  | Warning     |
//! | `Timeout`           | Retry  | Warning     |
//! | `ResourceExhausted` | Fail   | Critical    |
//! | `Unclassified`      | Skip   | Error       |
//!
//! Retryable kinds degrade to `Skip` once the attempt number exceeds the
//! configured maximum.

use std::fmt;
use std::io;
use std::time::Duration;

use serde::Serialize;

use crate::scanner::ScanError;
use crate::signal::Cancelled;

/// Default number of retries granted to retryable errors.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Smallest delay a retry decision may carry.
pub const MIN_RETRY_DELAY: Duration = Duration::from_millis(1);

/// Failure categories understood by the policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The operation was cancelled by the caller.
    Cancelled,
    /// Access to a file or resource was denied.
    PermissionDenied,
    /// The file or resource does not exist.
    NotFound,
    /// A transient I/O failure that may succeed on retry.
    TransientIo,
    /// The operation timed out.
    Timeout,
    /// Memory or storage exhausted.
    ResourceExhausted,
    /// Anything else.
    Unclassified,
}

impl ErrorKind {
    /// Whether the kind is eligible for retry at all.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::TransientIo | Self::Timeout)
    }

    /// Whether a batch should stop when this kind surfaces.
    #[must_use]
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::Cancelled | Self::ResourceExhausted)
    }

    /// Map a standard I/O error kind onto a classification.
    ///
    /// `Interrupted` is treated as cancellation: the crate raises it for
    /// [`Cancelled`] and `ctrlc` shutdowns.
    #[must_use]
    pub fn from_io_kind(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::Interrupted => Self::Cancelled,
            io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            io::ErrorKind::NotFound => Self::NotFound,
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Self::Timeout,
            io::ErrorKind::OutOfMemory | io::ErrorKind::StorageFull => Self::ResourceExhausted,
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ResourceBusy => Self::TransientIo,
            _ => Self::Unclassified,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Cancelled => "cancelled",
            Self::PermissionDenied => "permission_denied",
            Self::NotFound => "not_found",
            Self::TransientIo => "transient_io",
            Self::Timeout => "timeout",
            Self::ResourceExhausted => "resource_exhausted",
            Self::Unclassified => "unclassified",
        };
        f.write_str(name)
    }
}

/// Errors that can be classified by an [`ErrorPolicy`].
pub trait ClassifyError: fmt::Display {
    /// The classification of this error.
    fn error_kind(&self) -> ErrorKind;
}

impl ClassifyError for io::Error {
    fn error_kind(&self) -> ErrorKind {
        if self
            .get_ref()
            .is_some_and(|inner| inner.downcast_ref::<Cancelled>().is_some())
        {
            return ErrorKind::Cancelled;
        }
        ErrorKind::from_io_kind(self.kind())
    }
}

impl ClassifyError for Cancelled {
    fn error_kind(&self) -> ErrorKind {
        ErrorKind::Cancelled
    }
}

impl ClassifyError for anyhow::Error {
    fn error_kind(&self) -> ErrorKind {
        for cause in self.chain() {
            if cause.downcast_ref::<Cancelled>().is_some() {
                return ErrorKind::Cancelled;
            }
            if let Some(err) = cause.downcast_ref::<ScanError>() {
                return err.error_kind();
            }
            if let Some(err) = cause.downcast_ref::<io::Error>() {
                return err.error_kind();
            }
        }
        ErrorKind::Unclassified
    }
}

/// What the caller should do with a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Carry on as if nothing happened.
    Continue,
    /// Wait for the retry delay and run the operation again.
    Retry,
    /// Give up on this unit of work but keep the batch going.
    Skip,
    /// Give up and propagate.
    Fail,
}

/// Severity attached to a decision.
///
/// `log` has no critical level, so [`Severity::Critical`] is emitted at
/// [`log::Level::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Severity {
    Information,
    Warning,
    #[default]
    Error,
    Critical,
}

impl Severity {
    /// The `log` level records of this severity are emitted at.
    #[must_use]
    pub fn log_level(self) -> log::Level {
        match self {
            Self::Information => log::Level::Info,
            Self::Warning => log::Level::Warn,
            Self::Error | Self::Critical => log::Level::Error,
        }
    }
}

/// Decision returned by [`ErrorPolicy::handle_error`].
///
/// A retry delay is present exactly when the action is [`ErrorAction::Retry`],
/// and it is never zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorHandlingResult {
    action: ErrorAction,
    message: String,
    should_log: bool,
    severity: Severity,
    retry_delay: Option<Duration>,
}

impl ErrorHandlingResult {
    fn with_action(action: ErrorAction, message: impl Into<String>) -> Self {
        Self {
            action,
            message: message.into(),
            should_log: true,
            severity: Severity::default(),
            retry_delay: None,
        }
    }

    /// A retry decision. Zero delays are raised to [`MIN_RETRY_DELAY`].
    #[must_use]
    pub fn retry(message: impl Into<String>, delay: Duration) -> Self {
        Self {
            retry_delay: Some(delay.max(MIN_RETRY_DELAY)),
            ..Self::with_action(ErrorAction::Retry, message)
        }
    }

    /// A skip decision.
    #[must_use]
    pub fn skip(message: impl Into<String>) -> Self {
        Self::with_action(ErrorAction::Skip, message)
    }

    /// A fail decision.
    #[must_use]
    pub fn fail(message: impl Into<String>) -> Self {
        Self::with_action(ErrorAction::Fail, message)
    }

    /// A continue decision.
    #[must_use]
    pub fn proceed(message: impl Into<String>) -> Self {
        Self::with_action(ErrorAction::Continue, message)
    }

    /// Set the severity.
    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Mark the decision as not worth logging.
    #[must_use]
    pub fn silent(mut self) -> Self {
        self.should_log = false;
        self
    }

    #[must_use]
    pub fn action(&self) -> ErrorAction {
        self.action
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn should_log(&self) -> bool {
        self.should_log
    }

    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    #[must_use]
    pub fn retry_delay(&self) -> Option<Duration> {
        self.retry_delay
    }
}

/// Strategy deciding how failures are handled.
///
/// Implementations must be pure so they can be consulted from any thread and
/// outside the executor.
pub trait ErrorPolicy: Send + Sync {
    /// Classify `error` raised by the operation named `context` on `attempt`
    /// (1-based).
    fn handle_error(
        &self,
        error: &dyn ClassifyError,
        context: &str,
        attempt: u32,
    ) -> ErrorHandlingResult;

    /// Whether another attempt should follow `attempt`.
    fn should_retry(&self, error: &dyn ClassifyError, attempt: u32) -> bool;
}

/// The standard classification policy.
///
/// # Example
///
/// ```
/// use scanguard::resilience::{DefaultErrorPolicy, ErrorAction, ErrorPolicy};
/// use std::io;
/// use std::time::Duration;
///
/// let policy = DefaultErrorPolicy::new()
///     .with_max_retries(2)
///     .with_retry_delay(Duration::from_millis(10));
///
/// let err = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
/// assert_eq!(policy.handle_error(&err, "read log", 1).action(), ErrorAction::Retry);
/// assert_eq!(policy.handle_error(&err, "read log", 3).action(), ErrorAction::Skip);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultErrorPolicy {
    max_retries: u32,
    retry_delay: Duration,
}

impl Default for DefaultErrorPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl DefaultErrorPolicy {
    /// Create a policy with the default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of retries.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the delay between attempts. Zero is raised to [`MIN_RETRY_DELAY`].
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay.max(MIN_RETRY_DELAY);
        self
    }

    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    fn retry_or_skip(
        &self,
        label: &str,
        error: &dyn ClassifyError,
        context: &str,
        attempt: u32,
    ) -> ErrorHandlingResult {
        if attempt <= self.max_retries {
            ErrorHandlingResult::retry(
                format!(
                    "{} in {} (attempt {}/{}), retrying in {:?}: {}",
                    label, context, attempt, self.max_retries, self.retry_delay, error
                ),
                self.retry_delay,
            )
            .with_severity(Severity::Warning)
        } else {
            ErrorHandlingResult::skip(format!(
                "{} in {} persisted after {} retries: {}",
                label, context, self.max_retries, error
            ))
            .with_severity(Severity::Warning)
        }
    }
}

impl ErrorPolicy for DefaultErrorPolicy {
    fn handle_error(
        &self,
        error: &dyn ClassifyError,
        context: &str,
        attempt: u32,
    ) -> ErrorHandlingResult {
        match error.error_kind() {
            ErrorKind::Cancelled => {
                ErrorHandlingResult::fail(format!("Operation was cancelled: {}", context))
                    .with_severity(Severity::Information)
            }
            ErrorKind::PermissionDenied => {
                ErrorHandlingResult::skip(format!("Permission denied in {}: {}", context, error))
                    .with_severity(Severity::Warning)
            }
            ErrorKind::NotFound => {
                ErrorHandlingResult::skip(format!("Resource not found in {}: {}", context, error))
                    .with_severity(Severity::Warning)
            }
            ErrorKind::TransientIo => {
                self.retry_or_skip("Transient I/O error", error, context, attempt)
            }
            ErrorKind::Timeout => self.retry_or_skip("Timeout", error, context, attempt),
            ErrorKind::ResourceExhausted => {
                ErrorHandlingResult::fail(format!("Resource exhausted in {}: {}", context, error))
                    .with_severity(Severity::Critical)
            }
            ErrorKind::Unclassified => {
                ErrorHandlingResult::skip(format!("Error in {}: {}", context, error))
                    .with_severity(Severity::Error)
            }
        }
    }

    fn should_retry(&self, error: &dyn ClassifyError, attempt: u32) -> bool {
        error.error_kind().is_retryable() && attempt <= self.max_retries
    }
}

/// Policy that never retries.
///
/// Cancellation still fails; everything else is skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoRetryPolicy;

impl ErrorPolicy for NoRetryPolicy {
    fn handle_error(
        &self,
        error: &dyn ClassifyError,
        context: &str,
        _attempt: u32,
    ) -> ErrorHandlingResult {
        if error.error_kind() == ErrorKind::Cancelled {
            ErrorHandlingResult::fail("Operation was cancelled")
                .with_severity(Severity::Information)
        } else {
            ErrorHandlingResult::skip(format!("Error in {}: {}", context, error))
                .with_severity(Severity::Error)
        }
    }

    fn should_retry(&self, _error: &dyn ClassifyError, _attempt: u32) -> bool {
        false
    }
}
