//! Service health state.
//!
//! # States
//! - Healthy: service is usable
//! - Unhealthy: service excluded from selection
//!
//! # State Transitions
//! ```text
//! Healthy → Unhealthy: consecutive unhealthy reports >= unhealthy_threshold
//! Unhealthy → Healthy: any healthy report
//! ```
//!
//! # Design Decisions
//! - The threshold absorbs single blips
//! - Recovery is immediate and clears the error count

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

/// System-wide severity tier, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum DegradationLevel {
    /// All services are operational.
    #[default]
    Normal = 0,
    /// Some services are degraded but core functionality works.
    Partial = 1,
    /// Only essential services work.
    Severe = 2,
    /// The system is barely functional.
    Critical = 3,
}

impl DegradationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DegradationLevel::Normal => "NORMAL",
            DegradationLevel::Partial => "PARTIAL",
            DegradationLevel::Severe => "SEVERE",
            DegradationLevel::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for DegradationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time health of one service. Always handed out as a copy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceHealth {
    pub name: String,
    pub healthy: bool,
    pub last_check: DateTime<Utc>,
    /// Consecutive unhealthy reports since the last healthy one.
    pub error_count: u32,
    #[serde(rename = "response_time_ms", serialize_with = "serialize_millis")]
    pub response_time: Duration,
    pub message: String,
}

impl ServiceHealth {
    pub(crate) fn new(name: &str, now: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            healthy: true,
            last_check: now,
            error_count: 0,
            response_time: Duration::ZERO,
            message: String::new(),
        }
    }

    /// Apply one report. Returns whether `healthy` flipped.
    pub(crate) fn record(
        &mut self,
        healthy: bool,
        response_time: Duration,
        message: &str,
        threshold: u32,
        now: DateTime<Utc>,
    ) -> bool {
        let was_healthy = self.healthy;

        self.last_check = now;
        self.response_time = response_time;
        self.message = message.to_string();

        if healthy {
            self.healthy = true;
            self.error_count = 0;
        } else {
            self.error_count = self.error_count.saturating_add(1);
            if self.error_count >= threshold {
                self.healthy = false;
            }
        }

        was_healthy != self.healthy
    }
}

fn serialize_millis<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
}
