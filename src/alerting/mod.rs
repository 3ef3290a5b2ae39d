//! Alerting subsystem.
//!
//! # Data Flow
//! ```text
//! Error from an operation:
//!     → errors.rs (classify: severity, title, tags)
//!     → manager.rs (rate limit per source via rate_limit.rs, fill defaults)
//!     → every AlertHandler (handlers.rs, or channels owned elsewhere)
//! ```

pub mod alert;
pub mod errors;
pub mod handlers;
pub mod manager;
pub mod rate_limit;

pub use alert::{Alert, AlertSeverity};
pub use errors::ErrorAlertGenerator;
pub use handlers::LoggingAlertHandler;
pub use manager::{AlertHandler, AlertManager};
