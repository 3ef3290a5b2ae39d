//! Alert model.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::health::DegradationLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertSeverity {
    /// Informational.
    Info,
    /// Needs attention.
    Warning,
    /// Needs immediate attention.
    Error,
    /// Needs urgent attention.
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "INFO",
            AlertSeverity::Warning => "WARNING",
            AlertSeverity::Error => "ERROR",
            AlertSeverity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<DegradationLevel> for AlertSeverity {
    fn from(level: DegradationLevel) -> Self {
        match level {
            DegradationLevel::Normal => AlertSeverity::Info,
            DegradationLevel::Partial => AlertSeverity::Warning,
            DegradationLevel::Severe => AlertSeverity::Error,
            DegradationLevel::Critical => AlertSeverity::Critical,
        }
    }
}

/// A notification routed to every registered handler.
///
/// `id` and `timestamp` are filled in by the manager when left empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub id: Option<String>,
    pub severity: AlertSeverity,
    pub title: String,
    pub description: String,
    /// Rate-limit key.
    pub source: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub tags: HashMap<String, String>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Alert {
    pub fn new(severity: AlertSeverity, title: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: None,
            severity,
            title: title.into(),
            description: String::new(),
            source: source.into(),
            timestamp: None,
            tags: HashMap::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_from_level() {
        assert_eq!(AlertSeverity::from(DegradationLevel::Normal), AlertSeverity::Info);
        assert_eq!(AlertSeverity::from(DegradationLevel::Partial), AlertSeverity::Warning);
        assert_eq!(AlertSeverity::from(DegradationLevel::Severe), AlertSeverity::Error);
        assert_eq!(AlertSeverity::from(DegradationLevel::Critical), AlertSeverity::Critical);
    }

    #[test]
    fn test_alert_serializes_with_uppercase_severity() {
        let alert = Alert::new(AlertSeverity::Warning, "Operation Timeout", "scanner")
            .with_tag("error_code", "TIMEOUT")
            .with_metadata("attempts", 3);

        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["severity"], "WARNING");
        assert_eq!(json["tags"]["error_code"], "TIMEOUT");
        assert_eq!(json["metadata"]["attempts"], 3);
        assert!(json["id"].is_null());
    }
}
