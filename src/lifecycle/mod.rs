//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Caller / daemon:
//!     Shutdown::new() → context() handed to operations and pollers
//!     Context::with_timeout() → per-call deadline
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger()
//!
//! Observers:
//!     Retrier backoff sleep, SystemHealthMonitor loop → ctx.done()
//! ```
//!
//! # Design Decisions
//! - Cancellation is explicit: no component reads a global signal
//! - A trigger fired before an observer subscribes is still seen
//! - Deadlines only ever tighten when a context is derived

pub mod shutdown;
pub mod signals;

pub use shutdown::{Context, ContextError, Shutdown};
