//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for SIGTERM / SIGINT (Ctrl-C elsewhere)
//! - Translate the first signal into a [`Shutdown`] trigger

use std::future;
use std::io;

use crate::lifecycle::Shutdown;

/// Resolves when the process is asked to stop.
pub async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler, falling back to Ctrl-C only");
                ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c().await;
    }
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn ctrl_c() {
    park_on_error(tokio::signal::ctrl_c().await).await;
}

async fn park_on_error(result: io::Result<()>) {
    if let Err(e) = result {
        tracing::error!(error = %e, "Failed to install Ctrl-C handler");
        future::pending::<()>().await;
    }
}

/// Trigger `shutdown` once a stop signal arrives.
pub async fn trigger_on_signal(shutdown: &Shutdown) {
    wait_for_shutdown_signal().await;
    tracing::info!("Shutdown signal received");
    shutdown.trigger();
}
