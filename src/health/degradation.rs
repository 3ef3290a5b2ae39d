//! System-wide degradation tracking.
//!
//! # Responsibilities
//! - Track per-service health reports
//! - Derive one [`DegradationLevel`] for the whole system
//! - Hand out copies of health state for dashboards and the monitor
//!
//! # Level Derivation
//! ```text
//! impact  = max registered impact level among unhealthy services
//! share   = unhealthy / registered
//!           >= 75% → Critical, >= 50% → Severe, >= 25% → Partial
//! level   = max(impact, share)
//! ```

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use crate::clock::{self, SharedClock};
use crate::health::state::{DegradationLevel, ServiceHealth};
use crate::observability::{metrics, Logger};

pub const DEFAULT_UNHEALTHY_THRESHOLD: u32 = 3;

#[derive(Debug, Default)]
struct Registry {
    services: HashMap<String, ServiceHealth>,
    impact: HashMap<String, DegradationLevel>,
}

#[derive(Debug)]
pub struct DegradationManager {
    registry: RwLock<Registry>,
    unhealthy_threshold: u32,
    clock: SharedClock,
    logger: Logger,
}

impl Default for DegradationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DegradationManager {
    pub fn new() -> Self {
        Self::with_clock(clock::system())
    }

    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            unhealthy_threshold: DEFAULT_UNHEALTHY_THRESHOLD,
            clock,
            logger: Logger::default(),
        }
    }

    /// Consecutive unhealthy reports before a service is marked unhealthy.
    pub fn with_unhealthy_threshold(mut self, threshold: u32) -> Self {
        self.unhealthy_threshold = threshold.max(1);
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn unhealthy_threshold(&self) -> u32 {
        self.unhealthy_threshold
    }

    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start tracking `name` as healthy. Re-registering resets its state.
    pub fn register_service(&self, name: &str, impact_level: DegradationLevel) {
        {
            let mut registry = self.write();
            registry
                .services
                .insert(name.to_string(), ServiceHealth::new(name, self.clock.utc_now()));
            registry.impact.insert(name.to_string(), impact_level);
        }

        metrics::record_service_health(name, true);
        self.logger
            .in_scope(|| tracing::debug!(service = name, impact_level = %impact_level, "Service registered"));
    }

    /// Apply a health report. Reports for unregistered services are ignored.
    pub fn update_service_health(&self, name: &str, healthy: bool, response_time: Duration, message: &str) {
        let now = self.clock.utc_now();
        let snapshot = {
            let mut registry = self.write();
            let Some(service) = registry.services.get_mut(name) else {
                self.logger
                    .in_scope(|| tracing::warn!(service = name, "Attempted to update health for unregistered service"));
                return;
            };
            let flipped = service.record(healthy, response_time, message, self.unhealthy_threshold, now);
            (service.healthy, service.error_count, flipped)
        };
        let (is_healthy, error_count, flipped) = snapshot;

        metrics::record_service_health(name, is_healthy);
        self.logger.in_scope(|| {
            if flipped && !is_healthy {
                tracing::warn!(service = name, error_count, detail = message, "Service marked unhealthy");
            } else if flipped {
                tracing::info!(service = name, "Service recovered");
            }
            tracing::debug!(
                service = name,
                healthy = is_healthy,
                error_count,
                response_time_ms = response_time.as_millis() as u64,
                detail = message,
                "Service health updated"
            );
        });
    }

    pub fn current_degradation_level(&self) -> DegradationLevel {
        let level = {
            let registry = self.read();
            let total = registry.services.len();
            let mut unhealthy = 0usize;
            let mut level = DegradationLevel::Normal;

            for (name, service) in &registry.services {
                if service.healthy {
                    continue;
                }
                unhealthy += 1;
                if let Some(&impact) = registry.impact.get(name) {
                    level = level.max(impact);
                }
            }

            if total > 0 {
                let share = unhealthy as f64 / total as f64;
                let by_share = if share >= 0.75 {
                    DegradationLevel::Critical
                } else if share >= 0.5 {
                    DegradationLevel::Severe
                } else if share >= 0.25 {
                    DegradationLevel::Partial
                } else {
                    DegradationLevel::Normal
                };
                level = level.max(by_share);
            }
            level
        };

        metrics::record_degradation_level(level);
        level
    }

    pub fn service_health(&self, name: &str) -> Option<ServiceHealth> {
        self.read().services.get(name).cloned()
    }

    pub fn all_service_health(&self) -> HashMap<String, ServiceHealth> {
        self.read().services.clone()
    }

    /// False for unknown services.
    pub fn is_service_healthy(&self, name: &str) -> bool {
        self.read().services.get(name).is_some_and(|s| s.healthy)
    }

    /// Names of healthy services, sorted.
    pub fn healthy_services(&self) -> Vec<String> {
        self.names_where(true)
    }

    /// Names of unhealthy services, sorted.
    pub fn unhealthy_services(&self) -> Vec<String> {
        self.names_where(false)
    }

    fn names_where(&self, healthy: bool) -> Vec<String> {
        let mut names: Vec<String> = self
            .read()
            .services
            .values()
            .filter(|s| s.healthy == healthy)
            .map(|s| s.name.clone())
            .collect();
        names.sort();
        names
    }
}
