//! Background system health monitoring.
//!
//! # Responsibilities
//! - Periodically poll the degradation manager
//! - Alert when the system-wide level changes
//! - Alert for every unhealthy service on every cycle
//!
//! # Design Decisions
//! - Exactly one polling task per monitor; `start` and `stop` are
//!   serialized and idempotent
//! - `stop` waits for the task to exit before returning
//! - The task also ends when the context given to `start` is done
//! - Per-service alerts are rate-limited under their own source; a level
//!   change the alert manager refused is sent again on the next cycle

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::alerting::{Alert, AlertManager, AlertSeverity};
use crate::health::degradation::DegradationManager;
use crate::health::state::{DegradationLevel, ServiceHealth};
use crate::lifecycle::{Context, Shutdown};
use crate::observability::Logger;

pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Source of the monitor's level-change alerts.
pub const MONITOR_SOURCE: &str = "system_health_monitor";

/// Rate-limit key for one service's alerts, kept apart from the level-change
/// alerts so a persistently unhealthy service cannot starve them.
pub fn service_source(service: &str) -> String {
    format!("{MONITOR_SOURCE}:{service}")
}

/// State shared between the monitor handle and its polling task.
#[derive(Debug, Clone)]
struct Poller {
    alerts: Arc<AlertManager>,
    degradation: Arc<DegradationManager>,
    last_level: Arc<Mutex<DegradationLevel>>,
    logger: Logger,
}

#[derive(Debug)]
struct Running {
    stop: Shutdown,
    task: JoinHandle<()>,
}

#[derive(Debug)]
pub struct SystemHealthMonitor {
    poller: Poller,
    check_interval: Duration,
    running: AsyncMutex<Option<Running>>,
}

impl SystemHealthMonitor {
    pub fn new(alerts: Arc<AlertManager>, degradation: Arc<DegradationManager>) -> Self {
        Self {
            poller: Poller {
                alerts,
                degradation,
                last_level: Arc::new(Mutex::new(DegradationLevel::Normal)),
                logger: Logger::default(),
            },
            check_interval: DEFAULT_CHECK_INTERVAL,
            running: AsyncMutex::new(None),
        }
    }

    /// Polling period. Zero keeps the default.
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.check_interval = interval;
        }
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.poller.logger = logger;
        self
    }

    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    /// Spawn the polling task. No-op while a task is already running.
    pub async fn start(&self, ctx: &Context) {
        let mut running = self.running.lock().await;
        if running.as_ref().is_some_and(|r| !r.task.is_finished()) {
            return;
        }

        let stop = Shutdown::new();
        let task = tokio::spawn(run(
            self.poller.clone(),
            self.check_interval,
            ctx.clone(),
            stop.context(),
        ));
        *running = Some(Running { stop, task });

        self.poller.logger.in_scope(|| {
            tracing::info!(
                interval_secs = self.check_interval.as_secs_f64(),
                "System health monitor started"
            )
        });
    }

    /// Stop the polling task and wait for it to exit. No-op when stopped.
    pub async fn stop(&self) {
        let mut running = self.running.lock().await;
        let Some(Running { stop, task }) = running.take() else {
            return;
        };

        stop.trigger();
        if let Err(e) = task.await {
            self.poller
                .logger
                .in_scope(|| tracing::error!(error = %e, "System health monitor task failed"));
        }

        self.poller
            .logger
            .in_scope(|| tracing::info!("System health monitor stopped"));
    }

    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }

    /// Run one poll cycle now.
    pub async fn check_system_health(&self, ctx: &Context) {
        self.poller.check(ctx).await;
    }

    /// Level observed by the most recent poll cycle.
    pub fn last_level(&self) -> DegradationLevel {
        self.poller.last_level()
    }
}

async fn run(poller: Poller, period: Duration, ctx: Context, stop: Context) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                poller.check(&ctx).await;
            }
            e = ctx.done() => {
                poller.logger.in_scope(|| {
                    tracing::info!(reason = %e, "System health monitor context done, exiting loop")
                });
                break;
            }
            _ = stop.done() => {
                break;
            }
        }
    }
}

impl Poller {
    fn last_level(&self) -> DegradationLevel {
        *self.last_level.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn check(&self, ctx: &Context) {
        let current = self.degradation.current_degradation_level();
        let previous = {
            let mut last = self.last_level.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::replace(&mut *last, current)
        };

        // An undelivered level change is retried on the next cycle.
        if current != previous && !self.send_degradation_alert(ctx, previous, current).await {
            let mut last = self.last_level.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if *last == current {
                *last = previous;
            }
        }

        for name in self.degradation.unhealthy_services() {
            if let Some(health) = self.degradation.service_health(&name) {
                self.send_service_health_alert(ctx, &health).await;
            }
        }
    }

    /// True once the alert was delivered.
    async fn send_degradation_alert(&self, ctx: &Context, from: DegradationLevel, to: DegradationLevel) -> bool {
        let snapshot = serde_json::to_value(self.degradation.all_service_health()).unwrap_or_default();
        let alert = Alert::new(AlertSeverity::from(to), "System Degradation Level Changed", MONITOR_SOURCE)
            .with_description(format!("System degradation level changed from {from} to {to}"))
            .with_tag("component", "system")
            .with_tag("previous_level", from.as_str())
            .with_tag("current_level", to.as_str())
            .with_metadata("degradation_status", snapshot);

        match self.alerts.send_alert(ctx, alert).await {
            Ok(()) => true,
            Err(e) => {
                self.logger
                    .in_scope(|| tracing::error!(error = %e, "Failed to send degradation alert"));
                false
            }
        }
    }

    async fn send_service_health_alert(&self, ctx: &Context, health: &ServiceHealth) {
        let alert = Alert::new(AlertSeverity::Error, "Service Health Alert", service_source(&health.name))
            .with_description(format!("Service '{}' is unhealthy: {}", health.name, health.message))
            .with_tag("component", "service")
            .with_tag("service_name", health.name.as_str())
            .with_tag("healthy", health.healthy.to_string())
            .with_metadata("error_count", health.error_count)
            .with_metadata("response_time_ms", health.response_time.as_millis() as u64)
            .with_metadata("last_check", health.last_check.to_rfc3339());

        if let Err(e) = self.alerts.send_alert(ctx, alert).await {
            self.logger.in_scope(|| {
                tracing::error!(service = %health.name, error = %e, "Failed to send service health alert")
            });
        }
    }
}
