//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define resilience metrics (breaker state, retries, degradation, alerts)
//! - Expose Prometheus-compatible metrics endpoint for the daemon
//!
//! # Metrics
//! - `resilience_circuit_state` (gauge): 0=closed, 1=open, 2=half-open, by name
//! - `resilience_circuit_rejections_total` (counter): calls rejected by a breaker
//! - `resilience_retry_attempts_total` (counter): retries scheduled
//! - `resilience_retries_exhausted_total` (counter): operations that ran out of attempts
//! - `resilience_degradation_level` (gauge): 0=normal .. 3=critical
//! - `resilience_service_health` (gauge): 1=healthy, 0=unhealthy, by service
//! - `resilience_alerts_total` (counter): alerts delivered, by source and severity
//! - `resilience_alerts_rate_limited_total` (counter): alerts dropped by the limiter
//! - `resilience_alert_handler_failures_total` (counter): failed handler calls
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so library users
//!   pay nothing unless they opt in

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::alerting::AlertSeverity;
use crate::health::DegradationLevel;
use crate::resilience::CircuitState;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_circuit_state(name: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::Open => 1.0,
        CircuitState::HalfOpen => 2.0,
    };
    metrics::gauge!("resilience_circuit_state", "name" => name.to_string()).set(value);
}

pub fn record_circuit_rejection(name: &str) {
    metrics::counter!("resilience_circuit_rejections_total", "name" => name.to_string()).increment(1);
}

pub fn record_retry_attempt() {
    metrics::counter!("resilience_retry_attempts_total").increment(1);
}

pub fn record_retries_exhausted() {
    metrics::counter!("resilience_retries_exhausted_total").increment(1);
}

pub fn record_degradation_level(level: DegradationLevel) {
    metrics::gauge!("resilience_degradation_level").set(level as u8 as f64);
}

pub fn record_service_health(service: &str, healthy: bool) {
    let value = if healthy { 1.0 } else { 0.0 };
    metrics::gauge!("resilience_service_health", "service" => service.to_string()).set(value);
}

pub fn record_alert(source: &str, severity: AlertSeverity) {
    metrics::counter!(
        "resilience_alerts_total",
        "source" => source.to_string(),
        "severity" => severity.as_str()
    )
    .increment(1);
}

pub fn record_alert_rate_limited(source: &str) {
    metrics::counter!("resilience_alerts_rate_limited_total", "source" => source.to_string()).increment(1);
}

pub fn record_alert_handler_failure(handler: &str) {
    metrics::counter!("resilience_alert_handler_failures_total", "handler" => handler.to_string()).increment(1);
}
