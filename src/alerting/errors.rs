//! Turns operation errors into alerts.

use std::collections::HashMap;
use std::sync::Arc;

use crate::alerting::alert::{Alert, AlertSeverity};
use crate::alerting::manager::AlertManager;
use crate::error::{Error, ErrorKind, Result};
use crate::lifecycle::Context;
use crate::observability::Logger;

#[derive(Debug)]
pub struct ErrorAlertGenerator {
    manager: Arc<AlertManager>,
    logger: Logger,
}

impl ErrorAlertGenerator {
    pub fn new(manager: Arc<AlertManager>) -> Self {
        Self {
            manager,
            logger: Logger::default(),
        }
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Classify `err` and send an alert for it. Delivery failures are
    /// logged, never returned.
    pub async fn handle_error(
        &self,
        ctx: &Context,
        err: &Error,
        source: &str,
        metadata: HashMap<String, serde_json::Value>,
    ) {
        let mut alert = Alert::new(severity_for(err), title_for(err), source)
            .with_description(err.to_string())
            .with_tag("error_type", err.kind().as_str())
            .with_tag("error_code", err.code());
        if err.is_circuit_breaker() {
            alert = alert.with_tag("circuit_breaker", "true");
        }
        alert.metadata = metadata;

        if let Err(alert_err) = self.manager.send_alert(ctx, alert).await {
            self.logger.in_scope(|| {
                tracing::error!(
                    original_error = %err,
                    alert_error = %alert_err,
                    source,
                    "Failed to send error alert"
                )
            });
        }
    }

    /// [`handle_error`](Self::handle_error) for the error side of `result`.
    pub async fn handle_result<T>(
        &self,
        ctx: &Context,
        result: &Result<T>,
        source: &str,
        metadata: HashMap<String, serde_json::Value>,
    ) {
        if let Err(err) = result {
            self.handle_error(ctx, err, source, metadata).await;
        }
    }
}

fn severity_for(err: &Error) -> AlertSeverity {
    if err.is_circuit_breaker() {
        return AlertSeverity::Error;
    }

    match err.kind() {
        ErrorKind::Timeout | ErrorKind::External => AlertSeverity::Warning,
        ErrorKind::Internal => AlertSeverity::Error,
        ErrorKind::Validation => AlertSeverity::Info,
        ErrorKind::Authentication | ErrorKind::Authorization => AlertSeverity::Warning,
        _ => AlertSeverity::Error,
    }
}

fn title_for(err: &Error) -> String {
    if err.is_circuit_breaker() {
        return "Circuit Breaker Open".to_string();
    }

    match err.kind() {
        ErrorKind::Timeout => "Operation Timeout".to_string(),
        ErrorKind::External => "External Service Error".to_string(),
        ErrorKind::Internal => "Internal System Error".to_string(),
        ErrorKind::Validation => "Validation Error".to_string(),
        ErrorKind::Authentication => "Authentication Error".to_string(),
        ErrorKind::Authorization => "Authorization Error".to_string(),
        _ => format!("Error: {}", err.code()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::resilience::{CircuitBreakerError, CircuitState};

    #[test]
    fn test_classification() {
        let cases: Vec<(Error, AlertSeverity, &str)> = vec![
            (AppError::timeout("clone").into(), AlertSeverity::Warning, "Operation Timeout"),
            (AppError::external("github", "502").into(), AlertSeverity::Warning, "External Service Error"),
            (AppError::internal("oops").into(), AlertSeverity::Error, "Internal System Error"),
            (AppError::validation("bad").into(), AlertSeverity::Info, "Validation Error"),
            (AppError::authentication("token").into(), AlertSeverity::Warning, "Authentication Error"),
            (AppError::authorization("scope").into(), AlertSeverity::Warning, "Authorization Error"),
            (AppError::not_found("repository").into(), AlertSeverity::Error, "Error: NOT_FOUND"),
            (
                CircuitBreakerError {
                    name: "github".into(),
                    state: CircuitState::Open,
                }
                .into(),
                AlertSeverity::Error,
                "Circuit Breaker Open",
            ),
        ];

        for (err, severity, title) in cases {
            assert_eq!(severity_for(&err), severity, "{err}");
            assert_eq!(title_for(&err), title, "{err}");
        }
    }
}
