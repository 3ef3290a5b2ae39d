//! Health tracking subsystem.
//!
//! # Data Flow
//! ```text
//! Health reports (agents, dependencies):
//!     → degradation.rs (per-service state from state.rs)
//!     → system-wide DegradationLevel
//!
//! Scan requests:
//!     → agents.rs (pick healthy agents or fallbacks, gate scan type)
//!
//! Background monitor (monitor.rs):
//!     Periodic timer
//!     → Poll degradation level
//!     → Alert on level change and for each unhealthy service
//! ```
//!
//! # Design Decisions
//! - Unhealthy requires consecutive failed reports; recovery is immediate
//! - Health state is per-service; the level is derived, never stored
//! - The monitor and agent handler share one manager through an `Arc`

pub mod agents;
pub mod degradation;
pub mod monitor;
pub mod state;

pub use agents::{AgentDegradationHandler, DegradationStatus};
pub use degradation::DegradationManager;
pub use monitor::SystemHealthMonitor;
pub use state::{DegradationLevel, ServiceHealth};
