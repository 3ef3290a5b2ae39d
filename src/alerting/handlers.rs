//! Built-in alert handlers.

use async_trait::async_trait;

use crate::alerting::alert::{Alert, AlertSeverity};
use crate::alerting::manager::AlertHandler;
use crate::error::Result;
use crate::lifecycle::Context;
use crate::observability::Logger;

/// Writes every alert to the log at a level matching its severity.
#[derive(Debug, Clone, Default)]
pub struct LoggingAlertHandler {
    logger: Logger,
}

impl LoggingAlertHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_logger(logger: Logger) -> Self {
        Self { logger }
    }
}

macro_rules! log_alert {
    ($level:ident, $prefix:literal, $alert:expr, $tags:expr, $metadata:expr) => {
        tracing::$level!(
            alert_id = $alert.id.as_deref().unwrap_or_default(),
            severity = %$alert.severity,
            source = %$alert.source,
            description = %$alert.description,
            timestamp = ?$alert.timestamp,
            tags = %$tags,
            metadata = %$metadata,
            "{}{}",
            $prefix,
            $alert.title
        )
    };
}

#[async_trait]
impl AlertHandler for LoggingAlertHandler {
    async fn handle_alert(&self, _ctx: &Context, alert: &Alert) -> Result<()> {
        let tags = serde_json::to_string(&alert.tags).unwrap_or_default();
        let metadata = serde_json::to_string(&alert.metadata).unwrap_or_default();

        self.logger.in_scope(|| match alert.severity {
            AlertSeverity::Info => log_alert!(info, "ALERT: ", alert, tags, metadata),
            AlertSeverity::Warning => log_alert!(warn, "ALERT: ", alert, tags, metadata),
            AlertSeverity::Error => log_alert!(error, "ALERT: ", alert, tags, metadata),
            AlertSeverity::Critical => log_alert!(error, "CRITICAL ALERT: ", alert, tags, metadata),
        });

        Ok(())
    }

    fn name(&self) -> &str {
        "logging"
    }
}
