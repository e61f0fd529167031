//! Failure handling for batch analysis.
//!
//! # Architecture
//!
//! * [`policy`]: Pure error classification ([`DefaultErrorPolicy`], [`NoRetryPolicy`]).
//! * [`executor`]: The attempt loop driven by a policy ([`ResilientExecutor`]).
//! * [`breaker`]: The circuit breaker state machine ([`CircuitBreaker`]).
//!
//! The executor and the breaker are independent. When both are used the
//! breaker is the outer guard, see [`ResilientExecutor::execute_guarded`].

pub mod breaker;
pub mod executor;
pub mod policy;

pub use breaker::{
    BreakerError, CircuitBreaker, CircuitState, DEFAULT_FAILURE_THRESHOLD, DEFAULT_OPEN_TIMEOUT,
};
pub use executor::ResilientExecutor;
pub use policy::{
    ClassifyError, DefaultErrorPolicy, ErrorAction, ErrorHandlingResult, ErrorKind, ErrorPolicy,
    NoRetryPolicy, Severity, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY, MIN_RETRY_DELAY,
};
