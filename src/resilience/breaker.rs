//! Circuit breaker guarding a failing operation.
//!
//! # States
//! - Closed: calls pass through, consecutive failures are counted
//! - Open: calls are rejected without running the operation
//! - HalfOpen: a single trial call is admitted
//!
//! # State Transitions
//! ```text
//! Closed → Open:      consecutive failures reach the threshold
//! Open → HalfOpen:    first call after the open timeout (no timer thread)
//! HalfOpen → Closed:  trial succeeds, failure count resets
//! HalfOpen → Open:    trial fails, timeout restarts
//! ```
//!
//! Status, failure count and trial flag live behind one mutex. While a trial
//! is in flight every other caller is rejected.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Default consecutive failures before the breaker opens.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default time the breaker stays open before admitting a trial.
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(30);

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation.
    Closed,
    /// Failing fast.
    Open,
    /// Testing recovery with one trial call.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Error returned by [`CircuitBreaker::call`].
#[derive(Debug)]
pub enum BreakerError<E> {
    /// The breaker rejected the call; the operation was not run.
    Open {
        /// Consecutive failures recorded when the call was rejected.
        failures: u32,
        /// Time until a trial call will be admitted.
        retry_after: Duration,
    },
    /// The operation ran and failed with its own error.
    Inner(E),
}

impl<E> BreakerError<E> {
    /// Whether this is a rejection by an open breaker.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    /// The operation's own error, if the operation ran.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(err) => Some(err),
            Self::Open { .. } => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for BreakerError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open {
                failures,
                retry_after,
            } => write!(
                f,
                "Circuit breaker open after {} consecutive failures, retry in {:.1}s",
                failures,
                retry_after.as_secs_f64()
            ),
            Self::Inner(err) => fmt::Display::fmt(err, f),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for BreakerError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Inner(err) => Some(err),
            Self::Open { .. } => None,
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    status: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Thread-safe circuit breaker.
///
/// # Example
///
/// ```
/// use scanguard::resilience::{BreakerError, CircuitBreaker, CircuitState};
/// use std::time::Duration;
///
/// let breaker = CircuitBreaker::new(2, Duration::from_secs(60));
///
/// for _ in 0..2 {
///     let _ = breaker.call(|| Err::<(), _>("db locked"));
/// }
/// assert_eq!(breaker.state(), CircuitState::Open);
///
/// let mut ran = false;
/// let result = breaker.call(|| {
///     ran = true;
///     Ok::<_, &str>(())
/// });
/// assert!(matches!(result, Err(BreakerError::Open { .. })));
/// assert!(!ran);
/// ```
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    open_timeout: Duration,
    state: Mutex<BreakerState>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD, DEFAULT_OPEN_TIMEOUT)
    }
}

impl CircuitBreaker {
    /// Create a breaker.
    ///
    /// # Arguments
    ///
    /// * `failure_threshold` - Consecutive failures that open the breaker (at least 1)
    /// * `open_timeout` - Time spent open before a trial (at least 1ms)
    #[must_use]
    pub fn new(failure_threshold: u32, open_timeout: Duration) -> Self {
        Self {
            name: "circuit".to_string(),
            failure_threshold: failure_threshold.max(1),
            open_timeout: open_timeout.max(Duration::from_millis(1)),
            state: Mutex::new(BreakerState {
                status: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    /// Name used in log records.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    #[must_use]
    pub fn open_timeout(&self) -> Duration {
        self.open_timeout
    }

    /// Current status. An expired Open status is only promoted to HalfOpen by
    /// the next call.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.lock().status
    }

    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Force the breaker back to Closed.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.status = CircuitState::Closed;
        state.consecutive_failures = 0;
        state.opened_at = None;
        state.trial_in_flight = false;
        log::debug!("Circuit breaker '{}' reset", self.name);
    }

    /// Run `operation` unless the breaker is open.
    ///
    /// # Errors
    ///
    /// - [`BreakerError::Open`] if the breaker is open and the timeout has not
    ///   elapsed, or another caller's trial is in flight
    /// - [`BreakerError::Inner`] with the operation's error otherwise
    pub fn call<T, E, F>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.call_filtered(operation, |_| true)
    }

    /// Like [`call`](Self::call), but only errors for which `is_failure`
    /// returns `true` are counted. Other errors leave the failure count
    /// untouched; a trial that ends with one is released without closing or
    /// reopening the breaker.
    ///
    /// # Errors
    ///
    /// Same as [`call`](Self::call).
    pub fn call_filtered<T, E, F, P>(
        &self,
        operation: F,
        is_failure: P,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Result<T, E>,
        P: FnOnce(&E) -> bool,
    {
        let mut permit = self.admit().map_err(|(failures, retry_after)| BreakerError::Open {
            failures,
            retry_after,
        })?;

        let result = operation();
        match &result {
            Ok(_) => permit.settle(true),
            Err(err) => {
                if is_failure(err) {
                    permit.settle(false);
                } else {
                    permit.release();
                }
            }
        }
        result.map_err(BreakerError::Inner)
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn admit(&self) -> Result<Permit<'_>, (u32, Duration)> {
        let mut state = self.lock();

        match state.status {
            CircuitState::Closed => Ok(Permit::new(self, false)),
            CircuitState::Open => {
                let elapsed = state.opened_at.map_or(self.open_timeout, |at| at.elapsed());
                if elapsed >= self.open_timeout {
                    state.status = CircuitState::HalfOpen;
                    state.trial_in_flight = true;
                    log::info!(
                        "Circuit breaker '{}' half-open, admitting trial call",
                        self.name
                    );
                    Ok(Permit::new(self, true))
                } else {
                    Err((state.consecutive_failures, self.open_timeout - elapsed))
                }
            }
            CircuitState::HalfOpen => {
                if state.trial_in_flight {
                    Err((state.consecutive_failures, Duration::ZERO))
                } else {
                    state.trial_in_flight = true;
                    Ok(Permit::new(self, true))
                }
            }
        }
    }

    fn release(&self, trial: bool) {
        if trial {
            self.lock().trial_in_flight = false;
            log::debug!(
                "Circuit breaker '{}' trial released without an outcome",
                self.name
            );
        }
    }

    fn record(&self, success: bool, trial: bool) {
        let mut state = self.lock();

        if trial {
            state.trial_in_flight = false;
            if success {
                state.status = CircuitState::Closed;
                state.consecutive_failures = 0;
                state.opened_at = None;
                log::info!("Circuit breaker '{}' closed after successful trial", self.name);
            } else {
                state.status = CircuitState::Open;
                state.consecutive_failures = state.consecutive_failures.saturating_add(1);
                state.opened_at = Some(Instant::now());
                log::warn!(
                    "Circuit breaker '{}' trial failed, reopening for {:?}",
                    self.name,
                    self.open_timeout
                );
            }
            return;
        }

        if success {
            if state.status == CircuitState::Closed {
                state.consecutive_failures = 0;
            }
            return;
        }

        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        if state.status == CircuitState::Closed
            && state.consecutive_failures >= self.failure_threshold
        {
            state.status = CircuitState::Open;
            state.opened_at = Some(Instant::now());
            log::warn!(
                "Circuit breaker '{}' opened after {} consecutive failures",
                self.name,
                state.consecutive_failures
            );
        }
    }
}

/// Admission ticket for one call. Dropping an unsettled permit (the operation
/// panicked) records a failure so a trial can never stay in flight forever.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl<'a> Permit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            settled: false,
        }
    }

    fn settle(&mut self, success: bool) {
        self.settled = true;
        self.breaker.record(success, self.trial);
    }

    fn release(&mut self) {
        self.settled = true;
        self.breaker.release(self.trial);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.record(false, self.trial);
        }
    }
}
