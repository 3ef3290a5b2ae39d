//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (read & deserialize)
//!     → validation.rs (semantic checks)
//!     → ResilienceConfig (validated, immutable)
//!     → manager, agent and monitor settings wired by the daemon
//!     → breaker and retry sections converted by dependency callers
//!       (to_breaker_config / to_retry_config); the daemon only logs them
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Library constructors never read config themselves; the daemon wires it

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AgentConfig, AgentsSettings, AlertingSettings, CircuitBreakerSettings, DegradationSettings,
    LogFormat, LoggingConfig, MetricsConfig, MonitorSettings, ResilienceConfig, RetrySettings,
};
pub use validation::{validate_config, ValidationError};
