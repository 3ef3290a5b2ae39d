//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (fallbacks reference known agents)
//! - Validate value ranges (attempts > 0, intervals > 0, delays ordered)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ResilienceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use thiserror::Error;

use crate::config::schema::ResilienceConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("retry.backoff_multiplier must be at least 1.0")]
    Multiplier,

    #[error("retry.initial_delay_ms ({initial}) exceeds retry.max_delay_ms ({max})")]
    DelayOrder { initial: u64, max: u64 },

    #[error("duplicate agent '{0}'")]
    DuplicateAgent(String),

    #[error("agent '{agent}' lists unknown fallback '{fallback}'")]
    UnknownFallback { agent: String, fallback: String },

    #[error("agents.min_required ({required}) exceeds the {configured} configured agents")]
    MinRequired { required: usize, configured: usize },

    #[error("metrics.address '{0}' is not a socket address")]
    MetricsAddress(String),
}

pub fn validate_config(config: &ResilienceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let zero_checks = [
        ("circuit_breaker.max_requests", config.circuit_breaker.max_requests == 0),
        ("circuit_breaker.timeout_secs", config.circuit_breaker.timeout_secs == 0),
        ("retry.max_attempts", config.retry.max_attempts == 0),
        ("degradation.unhealthy_threshold", config.degradation.unhealthy_threshold == 0),
        ("alerting.rate_limit", config.alerting.rate_limit == 0),
        ("alerting.reset_interval_secs", config.alerting.reset_interval_secs == 0),
        ("monitor.check_interval_secs", config.monitor.check_interval_secs == 0),
    ];
    for (field, is_zero) in zero_checks {
        if is_zero {
            errors.push(ValidationError::Zero { field });
        }
    }

    let retry = &config.retry;
    if retry.backoff_multiplier.is_nan() || retry.backoff_multiplier < 1.0 {
        errors.push(ValidationError::Multiplier);
    }
    if retry.initial_delay_ms > retry.max_delay_ms {
        errors.push(ValidationError::DelayOrder {
            initial: retry.initial_delay_ms,
            max: retry.max_delay_ms,
        });
    }

    let mut names = HashSet::new();
    for agent in &config.agents.agents {
        if !names.insert(agent.name.as_str()) {
            errors.push(ValidationError::DuplicateAgent(agent.name.clone()));
        }
    }
    for agent in &config.agents.agents {
        for fallback in &agent.fallbacks {
            if !names.contains(fallback.as_str()) {
                errors.push(ValidationError::UnknownFallback {
                    agent: agent.name.clone(),
                    fallback: fallback.clone(),
                });
            }
        }
    }
    if config.agents.min_required > config.agents.agents.len() {
        errors.push(ValidationError::MinRequired {
            required: config.agents.min_required,
            configured: config.agents.agents.len(),
        });
    }

    if config.metrics.enabled && config.metrics.address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(ValidationError::MetricsAddress(config.metrics.address.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
