//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! resilience engine. All types derive Serde traits for deserialization from
//! config files, and every field has a default.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::health::DegradationLevel;
use crate::resilience::{CircuitBreakerConfig, RetryConfig};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Defaults applied to every circuit breaker.
    pub circuit_breaker: CircuitBreakerSettings,

    /// Retry policy.
    pub retry: RetrySettings,

    /// Service health tracking.
    pub degradation: DegradationSettings,

    /// Alert delivery.
    pub alerting: AlertingSettings,

    /// Background health monitor.
    pub monitor: MonitorSettings,

    /// Scanning agents and their fallbacks.
    pub agents: AgentsSettings,

    pub logging: LoggingConfig,

    pub metrics: MetricsConfig,
}

/// Circuit breaker defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    /// Trial requests allowed while half-open.
    pub max_requests: u32,

    /// Closed-state counter reset period (0 = never).
    pub interval_secs: u64,

    /// Open-state duration before probing.
    pub timeout_secs: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            max_requests: 1,
            interval_secs: 0,
            timeout_secs: 60,
        }
    }
}

impl CircuitBreakerSettings {
    /// Build a runtime breaker config for the named dependency.
    pub fn to_breaker_config(&self, name: &str) -> CircuitBreakerConfig {
        CircuitBreakerConfig::new(name)
            .with_max_requests(self.max_requests)
            .with_interval(Duration::from_secs(self.interval_secs))
            .with_timeout(Duration::from_secs(self.timeout_secs))
    }
}

/// Retry defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig::new()
            .with_max_attempts(self.max_attempts)
            .with_initial_delay(Duration::from_millis(self.initial_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_backoff_multiplier(self.backoff_multiplier)
            .with_jitter(self.jitter)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DegradationSettings {
    /// Consecutive unhealthy reports before a service is marked unhealthy.
    pub unhealthy_threshold: u32,
}

impl Default for DegradationSettings {
    fn default() -> Self {
        Self {
            unhealthy_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AlertingSettings {
    /// Alerts allowed per source within one reset interval.
    pub rate_limit: u32,

    pub reset_interval_secs: u64,
}

impl Default for AlertingSettings {
    fn default() -> Self {
        Self {
            rate_limit: 100,
            reset_interval_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub enabled: bool,
    pub check_interval_secs: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AgentsSettings {
    /// Minimum healthy agents a scan needs.
    pub min_required: usize,

    #[serde(rename = "agent")]
    pub agents: Vec<AgentConfig>,
}

/// A scanning agent registered with the degradation handler.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentConfig {
    pub name: String,

    /// Degradation level implied while this agent is unhealthy.
    #[serde(default)]
    pub impact_level: DegradationLevel,

    /// Agents tried in order when this one is unhealthy.
    #[serde(default)]
    pub fallbacks: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "scan_resilience=info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "127.0.0.1:9464".to_string(),
        }
    }
}
