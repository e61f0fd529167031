//! Retrying operation executor.
//!
//! [`ResilientExecutor`] runs a unit of work, consults its [`ErrorPolicy`] on
//! every failure, sleeps for the decided delay and tries again. The final
//! error handed back to the caller is always the one raised by the last
//! attempt, untouched.
//!
//! # Example
//!
//! ```
//! use scanguard::resilience::{DefaultErrorPolicy, ResilientExecutor};
//! use scanguard::signal::CancellationToken;
//! use std::io;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let policy = DefaultErrorPolicy::new().with_retry_delay(Duration::from_millis(1));
//! let executor = ResilientExecutor::new(Arc::new(policy));
//! let token = CancellationToken::new();
//!
//! let mut calls = 0;
//! let value = executor.execute("flaky read", &token, |_| {
//!     calls += 1;
//!     if calls < 3 {
//!         Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
//!     } else {
//!         Ok(calls)
//!     }
//! });
//!
//! assert_eq!(value.unwrap(), 3);
//! ```

use std::sync::Arc;

use super::breaker::{BreakerError, CircuitBreaker};
use super::policy::{
    ClassifyError, DefaultErrorPolicy, ErrorAction, ErrorKind, ErrorPolicy, NoRetryPolicy,
};
use crate::signal::{CancellationToken, Cancelled};

/// Executes operations under an [`ErrorPolicy`].
///
/// The executor holds no mutable state, so one instance can be shared by any
/// number of worker threads.
#[derive(Clone)]
pub struct ResilientExecutor {
    policy: Arc<dyn ErrorPolicy>,
}

impl std::fmt::Debug for ResilientExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientExecutor")
            .field("policy", &"<policy>")
            .finish()
    }
}

impl Default for ResilientExecutor {
    fn default() -> Self {
        Self::new(Arc::new(DefaultErrorPolicy::default()))
    }
}

impl ResilientExecutor {
    /// Create an executor driven by `policy`.
    #[must_use]
    pub fn new(policy: Arc<dyn ErrorPolicy>) -> Self {
        Self { policy }
    }

    /// Create an executor that runs every operation exactly once.
    #[must_use]
    pub fn without_retries() -> Self {
        Self::new(Arc::new(NoRetryPolicy))
    }

    /// The policy consulted on failures.
    #[must_use]
    pub fn policy(&self) -> &Arc<dyn ErrorPolicy> {
        &self.policy
    }

    /// Run `operation` until it succeeds or the policy stops retrying.
    ///
    /// The operation receives the cancellation token so it can abort
    /// in-flight work.
    ///
    /// # Arguments
    ///
    /// * `context` - Label for log records, e.g. `"analyze crash-0412.log"`
    /// * `cancel` - Token that aborts the loop and any pending delay
    /// * `operation` - The unit of work
    ///
    /// # Errors
    ///
    /// - The last attempt's error, unmodified, when the policy decides
    ///   `Skip`, `Fail` or `Continue`
    /// - The operation's own error if it classifies as cancelled or the token
    ///   was cancelled while it ran
    /// - `E::from(Cancelled)` if the token is cancelled before an attempt or
    ///   during a retry delay
    pub fn execute<T, E, F>(
        &self,
        context: &str,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, E>
    where
        F: FnMut(&CancellationToken) -> Result<T, E>,
        E: ClassifyError + From<Cancelled>,
    {
        let mut attempt: u32 = 1;

        loop {
            if cancel.is_cancelled() {
                log::debug!("{}: cancelled before attempt {}", context, attempt);
                return Err(E::from(Cancelled));
            }

            let error = match operation(cancel) {
                Ok(value) => {
                    if attempt > 1 {
                        log::debug!("{}: succeeded on attempt {}", context, attempt);
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            // Cancellation bypasses the policy entirely
            if error.error_kind() == ErrorKind::Cancelled || cancel.is_cancelled() {
                log::debug!("{}: cancelled during attempt {}", context, attempt);
                return Err(error);
            }

            let decision = self.policy.handle_error(&error, context, attempt);
            if decision.should_log() {
                log::log!(decision.severity().log_level(), "{}", decision.message());
            }

            match (decision.action(), decision.retry_delay()) {
                (ErrorAction::Retry, Some(delay)) => {
                    if cancel.wait_timeout(delay) {
                        log::debug!("{}: cancelled while waiting to retry", context);
                        return Err(E::from(Cancelled));
                    }
                    attempt = attempt.saturating_add(1);
                }
                _ => return Err(error),
            }
        }
    }

    /// Run `operation` through the executor with `breaker` as the outer guard.
    ///
    /// The breaker sees one outcome per executor run, so a file that fails
    /// after all retries counts as a single failure. A cancelled run is not
    /// counted at all.
    ///
    /// # Errors
    ///
    /// [`BreakerError::Open`] when the breaker rejects the call (the operation
    /// is not invoked), otherwise [`BreakerError::Inner`] with the error that
    /// [`execute`](Self::execute) would have returned.
    pub fn execute_guarded<T, E, F>(
        &self,
        breaker: &CircuitBreaker,
        context: &str,
        cancel: &CancellationToken,
        operation: F,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnMut(&CancellationToken) -> Result<T, E>,
        E: ClassifyError + From<Cancelled>,
    {
        breaker.call_filtered(
            || self.execute(context, cancel, operation),
            |err: &E| err.error_kind() != ErrorKind::Cancelled,
        )
    }
}
