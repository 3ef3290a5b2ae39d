//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to a dependency:
//!     → operation.rs (one named dependency: retry around breaker)
//!     → retries.rs (check if retryable, wait with backoff.rs, retry)
//!     → circuit_breaker.rs (track outcomes, fail fast while open)
//! ```
//!
//! # Design Decisions
//! - Every wait is bounded by the caller's context or an internal timer
//! - Retries target transient failures only; an open circuit is not retried
//! - One breaker per dependency, no implicit registry

pub mod backoff;
pub mod circuit_breaker;
pub mod operation;
pub mod retries;

pub use circuit_breaker::{
    default_ready_to_trip, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState, Counts,
};
pub use operation::RetryableOperation;
pub use retries::{default_retryable_errors, retry, retry_with_config, retry_with_result, Retrier, RetryConfig};
