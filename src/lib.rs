//! Fault-tolerance engine for a security-scanning platform.
//!
//! Scanning tools, Git providers and notification endpoints are unreliable.
//! This crate decides whether and when to attempt, retry, suppress or
//! escalate calls to them:
//!
//! - [`resilience`]: circuit breaker, retrier, and their composition
//! - [`health`]: per-service health, system degradation level, agent
//!   selection, background monitor
//! - [`alerting`]: rate-limited alert routing and error classification
//!
//! Every component takes its logger and clock at construction; cancellation
//! flows through [`lifecycle::Context`].

pub mod alerting;
pub mod clock;
pub mod config;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use alerting::{Alert, AlertHandler, AlertManager, AlertSeverity, ErrorAlertGenerator, LoggingAlertHandler};
pub use config::ResilienceConfig;
pub use error::{AppError, Error, ErrorKind, Result};
pub use health::{AgentDegradationHandler, DegradationLevel, DegradationManager, ServiceHealth, SystemHealthMonitor};
pub use lifecycle::{Context, Shutdown};
pub use resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState, Counts, Retrier, RetryConfig,
    RetryableOperation,
};
