//! Alert routing.
//!
//! # Responsibilities
//! - Keep the ordered list of delivery handlers
//! - Enforce the per-source rate limit before any handler runs
//! - Fill in alert id and timestamp defaults
//! - Fan out to every handler; best-effort delivery
//!
//! # Design Decisions
//! - Delivery succeeds if at least one handler succeeds
//! - Handlers are snapshotted before awaiting, so a slow handler never
//!   holds the registry lock

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::alerting::alert::Alert;
use crate::alerting::rate_limit::AlertRateLimiter;
use crate::clock::{self, SharedClock};
use crate::error::{Error, Result};
use crate::lifecycle::Context;
use crate::observability::{metrics, Logger};

pub const DEFAULT_RATE_LIMIT: u32 = 100;
pub const DEFAULT_RESET_INTERVAL: Duration = Duration::from_secs(3600);

/// A delivery channel for alerts.
#[async_trait]
pub trait AlertHandler: Send + Sync {
    async fn handle_alert(&self, ctx: &Context, alert: &Alert) -> Result<()>;

    fn name(&self) -> &str;
}

pub struct AlertManager {
    handlers: RwLock<Vec<Arc<dyn AlertHandler>>>,
    limiter: Mutex<AlertRateLimiter>,
    clock: SharedClock,
    logger: Logger,
}

impl Default for AlertManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertManager {
    pub fn new() -> Self {
        Self::with_clock(clock::system())
    }

    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
            limiter: Mutex::new(AlertRateLimiter::new(DEFAULT_RATE_LIMIT, DEFAULT_RESET_INTERVAL, clock.now())),
            clock,
            logger: Logger::default(),
        }
    }

    /// Allow `limit` alerts per source within each `reset_interval`.
    pub fn with_rate_limit(self, limit: u32, reset_interval: Duration) -> Self {
        let limiter = AlertRateLimiter::new(limit, reset_interval, self.clock.now());
        Self {
            limiter: Mutex::new(limiter),
            ..self
        }
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn add_handler(&self, handler: Arc<dyn AlertHandler>) {
        let name = handler.name().to_string();
        self.handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(handler);
        self.logger.in_scope(|| tracing::info!(handler = %name, "Alert handler added"));
    }

    /// Registered handler names, in delivery order.
    pub fn handler_names(&self) -> Vec<String> {
        self.snapshot_handlers()
            .iter()
            .map(|h| h.name().to_string())
            .collect()
    }

    /// Deliver `alert` to every handler.
    ///
    /// Fails with [`Error::AlertRateLimited`] without invoking any handler
    /// when the source is over its limit, and with
    /// [`Error::AllHandlersFailed`] when no handler accepted the alert.
    pub async fn send_alert(&self, ctx: &Context, mut alert: Alert) -> Result<()> {
        let allowed = self
            .limiter
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .try_acquire(&alert.source, self.clock.now());
        if !allowed {
            metrics::record_alert_rate_limited(&alert.source);
            self.logger.in_scope(|| {
                tracing::warn!(source = %alert.source, title = %alert.title, "Alert rate limit exceeded")
            });
            return Err(Error::AlertRateLimited {
                source_name: alert.source,
            });
        }

        let timestamp = *alert.timestamp.get_or_insert_with(|| self.clock.utc_now());
        let id = alert
            .id
            .get_or_insert_with(|| format!("{}-{}", alert.source, Uuid::new_v4()))
            .clone();

        self.logger.in_scope(|| {
            tracing::info!(
                id = %id,
                severity = %alert.severity,
                source = %alert.source,
                title = %alert.title,
                timestamp = %timestamp,
                "Sending alert"
            )
        });
        metrics::record_alert(&alert.source, alert.severity);

        let handlers = self.snapshot_handlers();
        let mut last_err = None;
        let mut delivered = 0usize;

        for handler in &handlers {
            match handler.handle_alert(ctx, &alert).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    metrics::record_alert_handler_failure(handler.name());
                    self.logger.in_scope(|| {
                        tracing::error!(handler = handler.name(), alert_id = %id, error = %e, "Alert handler failed")
                    });
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(last) if delivered == 0 => Err(Error::AllHandlersFailed { last: Box::new(last) }),
            _ => Ok(()),
        }
    }

    fn snapshot_handlers(&self) -> Vec<Arc<dyn AlertHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl std::fmt::Debug for AlertManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertManager")
            .field("handlers", &self.handler_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::alert::AlertSeverity;
    use crate::clock::MockClock;
    use crate::error::AppError;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingHandler {
        name: &'static str,
        fail: bool,
        calls: AtomicU32,
        last: Mutex<Option<Alert>>,
    }

    impl CountingHandler {
        fn new(name: &'static str, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                fail,
                calls: AtomicU32::new(0),
                last: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl AlertHandler for CountingHandler {
        async fn handle_alert(&self, _ctx: &Context, alert: &Alert) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some(alert.clone());
            if self.fail {
                Err(AppError::external(self.name, "webhook returned 500").into())
            } else {
                Ok(())
            }
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    fn alert(source: &str) -> Alert {
        Alert::new(AlertSeverity::Warning, "Operation Timeout", source)
    }

    #[tokio::test]
    async fn test_fills_id_and_timestamp() {
        let manager = AlertManager::new();
        let handler = CountingHandler::new("slack", false);
        manager.add_handler(handler.clone());

        manager.send_alert(&Context::background(), alert("scanner")).await.unwrap();

        let delivered = handler.last.lock().unwrap().clone().unwrap();
        assert!(delivered.id.unwrap().starts_with("scanner-"));
        assert!(delivered.timestamp.is_some());

        let explicit = alert("scanner").with_id("fixed-id");
        manager.send_alert(&Context::background(), explicit).await.unwrap();
        let delivered = handler.last.lock().unwrap().clone().unwrap();
        assert_eq!(delivered.id.as_deref(), Some("fixed-id"));
    }

    #[tokio::test]
    async fn test_partial_failure_succeeds() {
        let manager = AlertManager::new();
        let broken = CountingHandler::new("email", true);
        let working = CountingHandler::new("logging", false);
        manager.add_handler(broken.clone());
        manager.add_handler(working.clone());

        manager.send_alert(&Context::background(), alert("scanner")).await.unwrap();
        assert_eq!(broken.calls.load(Ordering::SeqCst), 1);
        assert_eq!(working.calls.load(Ordering::SeqCst), 1);
        assert_eq!(manager.handler_names(), vec!["email".to_string(), "logging".to_string()]);
    }

    #[tokio::test]
    async fn test_all_handlers_failing_is_an_error() {
        let manager = AlertManager::new();
        manager.add_handler(CountingHandler::new("email", true));
        manager.add_handler(CountingHandler::new("pagerduty", true));

        let err = manager
            .send_alert(&Context::background(), alert("scanner"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AllHandlersFailed { .. }));
        assert_eq!(
            err.to_string(),
            "all alert handlers failed: EXTERNAL_SERVICE_ERROR: webhook returned 500"
        );
    }

    #[tokio::test]
    async fn test_no_handlers_is_ok() {
        let manager = AlertManager::new();
        assert!(manager.send_alert(&Context::background(), alert("scanner")).await.is_ok());
    }

    #[tokio::test]
    async fn test_rate_limit_skips_handlers_until_reset() {
        let clock = Arc::new(MockClock::new());
        let manager = AlertManager::with_clock(clock.clone()).with_rate_limit(2, Duration::from_secs(60));
        let handler = CountingHandler::new("slack", false);
        manager.add_handler(handler.clone());
        let ctx = Context::background();

        manager.send_alert(&ctx, alert("scanner")).await.unwrap();
        manager.send_alert(&ctx, alert("scanner")).await.unwrap();
        let err = manager.send_alert(&ctx, alert("scanner")).await.unwrap_err();
        assert!(matches!(err, Error::AlertRateLimited { ref source_name } if source_name == "scanner"));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 2);

        manager.send_alert(&ctx, alert("monitor")).await.unwrap();

        clock.advance(Duration::from_secs(61));
        manager.send_alert(&ctx, alert("scanner")).await.unwrap();
        assert_eq!(handler.calls.load(Ordering::SeqCst), 4);
    }
}
