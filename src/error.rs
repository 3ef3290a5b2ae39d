//! Error taxonomy shared by every resilience component.
//!
//! # Responsibilities
//! - Classify failures (transient, structural, systemic)
//! - Carry stable codes used for alert tags and retry decisions
//! - Preserve the underlying cause for diagnostics
//!
//! # Design Decisions
//! - `RetriesExhausted` is transparent for classification: `kind()`,
//!   `code()` and `is_circuit_breaker()` look at the last attempt's error
//! - Anything that is not an application error classifies as `Internal`

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::loader::ConfigError;
use crate::lifecycle::ContextError;
use crate::resilience::circuit_breaker::CircuitBreakerError;

/// Boxed cause attached to an [`AppError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Coarse failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Authentication,
    Authorization,
    NotFound,
    Conflict,
    RateLimit,
    Internal,
    External,
    Timeout,
}

impl ErrorKind {
    /// Stable name used in tags and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Authorization => "authorization",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Internal => "internal",
            ErrorKind::External => "external",
            ErrorKind::Timeout => "timeout",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An application error raised by a guarded operation.
#[derive(Debug)]
pub struct AppError {
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
    pub details: HashMap<String, String>,
    pub cause: Option<BoxError>,
}

impl AppError {
    pub fn new(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            details: HashMap::new(),
            cause: None,
        }
    }

    /// Attach the underlying cause.
    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Attach a detail key/value.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, "VALIDATION_ERROR", message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, "AUTHENTICATION_ERROR", message)
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authorization, "AUTHORIZATION_ERROR", message)
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new(ErrorKind::NotFound, "NOT_FOUND", format!("{resource} not found"))
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, "CONFLICT", message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimit, "RATE_LIMIT_EXCEEDED", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, "INTERNAL_ERROR", message)
    }

    pub fn external(service: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::External, "EXTERNAL_SERVICE_ERROR", message).with_detail("service", service)
    }

    pub fn timeout(operation: &str) -> Self {
        Self::new(ErrorKind::Timeout, "TIMEOUT", format!("{operation} timed out"))
    }

    /// Failure reported by a scanning agent.
    pub fn agent(agent: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, "AGENT_ERROR", message).with_detail("agent", agent)
    }

    /// Failure attributed to a whole scan.
    pub fn scan(scan_id: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, "SCAN_ERROR", message).with_detail("scan_id", scan_id)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, " (caused by: {cause})")?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_deref().map(|c| c as &(dyn std::error::Error + 'static))
    }
}

/// Top-level error for the resilience engine.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    App(#[from] AppError),

    #[error(transparent)]
    CircuitOpen(#[from] CircuitBreakerError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("operation failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<Error>,
    },

    #[error("alert rate limit exceeded for source: {source_name}")]
    AlertRateLimited { source_name: String },

    #[error("all alert handlers failed: {last}")]
    AllHandlersFailed {
        #[source]
        last: Box<Error>,
    },

    #[error("insufficient healthy agents: have {}, need {required} (unavailable: {unavailable:?})", .available.len())]
    InsufficientAgents {
        available: Vec<String>,
        unavailable: Vec<String>,
        required: usize,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// The error that decides classification.
    fn root(&self) -> &Error {
        match self {
            Error::RetriesExhausted { last, .. } => last.root(),
            other => other,
        }
    }

    /// Category used for retry and alert decisions.
    pub fn kind(&self) -> ErrorKind {
        match self.root() {
            Error::App(app) => app.kind,
            Error::Context(ContextError::DeadlineExceeded) => ErrorKind::Timeout,
            Error::AlertRateLimited { .. } => ErrorKind::RateLimit,
            Error::Config(_) => ErrorKind::Validation,
            _ => ErrorKind::Internal,
        }
    }

    /// Stable error code; `UNKNOWN_ERROR` for non-application errors.
    pub fn code(&self) -> &str {
        match self.root() {
            Error::App(app) => &app.code,
            Error::CircuitOpen(_) => "CIRCUIT_BREAKER_OPEN",
            _ => "UNKNOWN_ERROR",
        }
    }

    /// Whether the breaker rejected the call (directly or on the last retry).
    pub fn is_circuit_breaker(&self) -> bool {
        matches!(self.root(), Error::CircuitOpen(_))
    }

    pub fn is_kind(&self, kind: ErrorKind) -> bool {
        matches!(self.root(), Error::App(app) if app.kind == kind)
    }
}
