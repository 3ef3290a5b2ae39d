//! Agent selection under degradation.
//!
//! # Responsibilities
//! - Register scanning agents with their impact level and fallbacks
//! - Pick usable agents for a scan, substituting fallbacks
//! - Gate scan types by the current degradation level
//!
//! # Scan Policy
//! ```text
//! Normal   → everything
//! Partial  → no "full" scans
//! Severe   → no "full" or "comprehensive" scans
//! Critical → nothing
//! ```

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::health::degradation::DegradationManager;
use crate::health::state::DegradationLevel;
use crate::observability::Logger;

/// Snapshot returned by [`AgentDegradationHandler::degradation_status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DegradationStatus {
    pub degradation_level: DegradationLevel,
    pub healthy_agents: Vec<String>,
    pub unhealthy_agents: Vec<String>,
    pub total_agents: usize,
    pub can_scan: bool,
}

#[derive(Debug)]
pub struct AgentDegradationHandler {
    manager: Arc<DegradationManager>,
    min_required_agents: usize,
    fallbacks: RwLock<HashMap<String, Vec<String>>>,
    logger: Logger,
}

impl AgentDegradationHandler {
    pub fn new(min_required_agents: usize) -> Self {
        Self::with_manager(Arc::new(DegradationManager::new()), min_required_agents)
    }

    /// Build over an existing manager, e.g. one the health monitor polls.
    pub fn with_manager(manager: Arc<DegradationManager>, min_required_agents: usize) -> Self {
        Self {
            manager,
            min_required_agents,
            fallbacks: RwLock::new(HashMap::new()),
            logger: Logger::default(),
        }
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn manager(&self) -> &Arc<DegradationManager> {
        &self.manager
    }

    pub fn register_agent<I, S>(&self, name: &str, impact_level: DegradationLevel, fallbacks: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.manager.register_service(name, impact_level);

        let fallbacks: Vec<String> = fallbacks.into_iter().map(Into::into).collect();
        let mut map = self.fallbacks.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        if fallbacks.is_empty() {
            map.remove(name);
        } else {
            map.insert(name.to_string(), fallbacks);
        }
    }

    pub fn update_agent_health(&self, name: &str, healthy: bool, response_time: Duration, message: &str) {
        self.manager.update_service_health(name, healthy, response_time, message);
    }

    /// Healthy agents for `requested`, in request order.
    ///
    /// An unhealthy agent is replaced by its first healthy fallback that is
    /// not already selected. Each agent appears at most once. When fewer
    /// than the required minimum remain, the error carries the partial list.
    pub fn available_agents<S: AsRef<str>>(&self, requested: &[S]) -> Result<Vec<String>> {
        let fallbacks = self.fallbacks.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut available: Vec<String> = Vec::new();
        let mut unavailable: Vec<String> = Vec::new();

        for agent in requested.iter().map(AsRef::as_ref) {
            if self.manager.is_service_healthy(agent) {
                if !available.iter().any(|a| a == agent) {
                    available.push(agent.to_string());
                }
                continue;
            }

            unavailable.push(agent.to_string());

            let substitute = fallbacks.get(agent).and_then(|candidates| {
                candidates
                    .iter()
                    .find(|f| self.manager.is_service_healthy(f) && !available.contains(f))
            });
            if let Some(fallback) = substitute {
                self.logger
                    .in_scope(|| tracing::info!(original = agent, fallback = %fallback, "Using fallback agent"));
                available.push(fallback.clone());
            }
        }

        if available.len() < self.min_required_agents {
            return Err(Error::InsufficientAgents {
                available,
                unavailable,
                required: self.min_required_agents,
            });
        }

        if !unavailable.is_empty() {
            self.logger.in_scope(|| {
                tracing::warn!(unavailable = ?unavailable, available = ?available, "Some agents are unavailable")
            });
        }

        Ok(available)
    }

    /// Whether a scan of `scan_type` may run now, with a human-readable reason.
    pub fn can_perform_scan(&self, scan_type: &str) -> (bool, &'static str) {
        match self.manager.current_degradation_level() {
            DegradationLevel::Normal => (true, ""),
            DegradationLevel::Partial => {
                if scan_type == "full" {
                    (false, "full scans are disabled during partial degradation")
                } else {
                    (true, "operating with reduced agent set")
                }
            }
            DegradationLevel::Severe => {
                if scan_type == "full" || scan_type == "comprehensive" {
                    (false, "only basic scans are available during severe degradation")
                } else {
                    (true, "operating with minimal agent set")
                }
            }
            DegradationLevel::Critical => (false, "scanning is disabled during critical system degradation"),
        }
    }

    pub fn degradation_status(&self) -> DegradationStatus {
        let degradation_level = self.manager.current_degradation_level();
        let healthy_agents = self.manager.healthy_services();
        let unhealthy_agents = self.manager.unhealthy_services();

        DegradationStatus {
            degradation_level,
            total_agents: healthy_agents.len() + unhealthy_agents.len(),
            can_scan: healthy_agents.len() >= self.min_required_agents,
            healthy_agents,
            unhealthy_agents,
        }
    }
}
