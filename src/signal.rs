//! Cancellation and Ctrl+C handling.
//!
//! This module provides the [`CancellationToken`] shared by the executor, the
//! batch runner and analyzers. A token wraps an atomic flag for cheap polling
//! plus a condition variable so that retry delays can be cut short the moment
//! cancellation is requested.
//!
//! # Usage
//!
//! ```rust,no_run
//! use scanguard::signal::install_handler;
//!
//! // Create the process-wide token and hook Ctrl+C into it
//! let token = install_handler().expect("Failed to install signal handler");
//!
//! // Pass clones of the token to workers
//! let worker_token = token.clone();
//! if worker_token.is_cancelled() {
//!     return;
//! }
//! ```
//!
//! # Exit Codes
//!
//! When a signal is received:
//! - The token is cancelled and every pending retry delay wakes up
//! - A message "Interrupted. Cleaning up..." is printed to stderr
//! - The application should exit with code 130 (128 + SIGINT)

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};

/// Error returned when an operation observes a cancelled token.
///
/// The executor converts this into the caller's error type (hence the
/// `E: From<Cancelled>` bound on [`crate::resilience::ResilientExecutor::execute`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Operation was cancelled")]
pub struct Cancelled;

impl From<Cancelled> for std::io::Error {
    fn from(err: Cancelled) -> Self {
        std::io::Error::new(std::io::ErrorKind::Interrupted, err)
    }
}

#[derive(Debug, Default)]
struct TokenInner {
    cancelled: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
}

/// Cooperative cancellation signal shared across threads.
///
/// Cloning a token is cheap; all clones observe the same state.
///
/// # Thread Safety
///
/// `CancellationToken` is `Send` and `Sync`. The flag uses `SeqCst` atomics and
/// waiters are woken through a `Condvar`, so a cancellation is never missed by
/// a thread that is about to sleep.
///
/// # Example
///
/// ```
/// use scanguard::signal::CancellationToken;
/// use std::time::Duration;
///
/// let token = CancellationToken::new();
/// let worker = token.clone();
///
/// token.cancel();
/// assert!(worker.is_cancelled());
/// // Returns immediately because the token is already cancelled
/// assert!(worker.wait_timeout(Duration::from_secs(60)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl CancellationToken {
    /// Create a new token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Request cancellation and wake every thread blocked in [`wait_timeout`].
    ///
    /// [`wait_timeout`]: CancellationToken::wait_timeout
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        let _guard = self
            .inner
            .lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.inner.wake.notify_all();
    }

    /// Reset the token to the non-cancelled state.
    ///
    /// This is primarily useful for reusing the process-wide token between runs.
    pub fn reset(&self) {
        self.inner.cancelled.store(false, Ordering::SeqCst);
    }

    /// Return `Err(Cancelled)` if cancellation has been requested.
    ///
    /// Convenient for analyzers that poll between chunks of work:
    ///
    /// ```
    /// use scanguard::signal::{CancellationToken, Cancelled};
    ///
    /// fn work(token: &CancellationToken) -> Result<u32, Cancelled> {
    ///     token.check()?;
    ///     Ok(42)
    /// }
    ///
    /// assert_eq!(work(&CancellationToken::new()), Ok(42));
    /// ```
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Block for up to `timeout`, returning early if the token is cancelled.
    ///
    /// # Returns
    ///
    /// `true` if the token was cancelled (before or during the wait),
    /// `false` if the full timeout elapsed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut guard = self
            .inner
            .lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        loop {
            if self.is_cancelled() {
                return true;
            }

            let remaining = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    deadline - now
                }
                // Timeout too large to represent: wait in long slices
                None => Duration::from_secs(3600),
            };

            let (next, _) = self
                .inner
                .wake
                .wait_timeout(guard, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            guard = next;
        }
    }
}

/// Error type for signal handler installation.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// Failed to install the Ctrl+C handler.
    #[error("Failed to install signal handler: {0}")]
    InstallFailed(#[from] ctrlc::Error),
}

static GLOBAL_TOKEN: OnceLock<CancellationToken> = OnceLock::new();

/// Install a Ctrl+C handler that cancels the process-wide token.
///
/// Call this once, early in startup, before any batch begins.
///
/// If a handler is already installed (e.g. in tests), the existing token is
/// reset and returned, so repeated calls to `run_app()` within one process
/// keep working.
///
/// # Errors
///
/// Never fails in practice: when `ctrlc` refuses a second registration the
/// function falls back to an unhooked token that still supports manual
/// [`CancellationToken::cancel`].
pub fn install_handler() -> Result<CancellationToken, SignalError> {
    if let Some(token) = GLOBAL_TOKEN.get() {
        token.reset();
        return Ok(token.clone());
    }

    let token = CancellationToken::new();
    let hooked = token.clone();

    match ctrlc::set_handler(move || {
        hooked.cancel();

        let _ = writeln!(std::io::stderr(), "\nInterrupted. Cleaning up...");
        let _ = std::io::stderr().flush();

        log::info!("Cancellation signal received");
    }) {
        Ok(()) => {
            let _ = GLOBAL_TOKEN.set(token.clone());
            Ok(token)
        }
        Err(e) => {
            if let Some(existing) = GLOBAL_TOKEN.get() {
                existing.reset();
                return Ok(existing.clone());
            }
            log::debug!("Ctrl+C handler unavailable ({}), using unhooked token", e);
            let fallback = CancellationToken::new();
            let _ = GLOBAL_TOKEN.set(fallback.clone());
            Ok(fallback)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_token_new_not_cancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.check().is_ok());
    }

    #[test]
    fn test_cancel_and_reset() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(token.is_cancelled());
        assert_eq!(token.check(), Err(Cancelled));

        token.reset();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_clone_shares_state() {
        let token = CancellationToken::new();
        let cloned = token.clone();

        token.cancel();
        assert!(cloned.is_cancelled());
    }

    #[test]
    fn test_wait_timeout_elapses() {
        let token = CancellationToken::new();
        let start = Instant::now();
        assert!(!token.wait_timeout(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_wait_timeout_wakes_on_cancel() {
        let token = CancellationToken::new();
        let canceller = token.clone();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            canceller.cancel();
        });

        let start = Instant::now();
        assert!(token.wait_timeout(Duration::from_secs(30)));
        assert!(start.elapsed() < Duration::from_secs(10));
        handle.join().unwrap();
    }

    #[test]
    fn test_cancelled_into_io_error() {
        let err: std::io::Error = Cancelled.into();
        assert_eq!(err.kind(), std::io::ErrorKind::Interrupted);
        assert_eq!(err.to_string(), "Operation was cancelled");
    }

    #[test]
    fn test_token_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CancellationToken>();
    }

    #[test]
    fn test_signal_error_display() {
        fn assert_display<T: std::fmt::Display>() {}
        assert_display::<SignalError>();
    }
}
