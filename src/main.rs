//! scan-resilience daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!   config.toml ──▶ load_config ──▶ ResilienceConfig
//!                                        │
//!        ┌───────────────────────────────┼──────────────────────────────┐
//!        ▼                               ▼                              ▼
//!  ┌───────────────┐            ┌──────────────────┐           ┌────────────────┐
//!  │ AgentDegrad-  │  shares    │ Degradation-     │  polled   │ SystemHealth-  │
//!  │ ationHandler  │──────────▶ │ Manager          │ ◀──────── │ Monitor        │
//!  └───────────────┘            └──────────────────┘           └───────┬────────┘
//!                                                                      │ alerts
//!                                                                      ▼
//!                                                              ┌────────────────┐
//!                                                              │ AlertManager   │
//!                                                              │ └─ logging     │
//!                                                              └────────────────┘
//! ```
//!
//! Runs until SIGTERM / Ctrl-C, then stops the monitor and exits.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use scan_resilience::config::{load_config, ResilienceConfig};
use scan_resilience::health::{AgentDegradationHandler, DegradationManager, SystemHealthMonitor};
use scan_resilience::lifecycle::{signals, Shutdown};
use scan_resilience::observability::{init_logging, metrics};
use scan_resilience::{AlertManager, LoggingAlertHandler, Retrier};

#[derive(Parser)]
#[command(name = "scan-resilience")]
#[command(about = "Resilience engine for the scanning platform", long_about = None)]
struct Cli {
    /// TOML configuration file; built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter directive, overrides the configured level
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the health monitor until a shutdown signal (default)
    Run,
    /// Validate the configuration and print the effective settings
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ResilienceConfig::default(),
    };
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::CheckConfig => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Run => run(config).await,
    }
}

async fn run(config: ResilienceConfig) -> Result<(), Box<dyn std::error::Error>> {
    init_logging(&config.logging)?;

    tracing::info!("scan-resilience v{} starting", env!("CARGO_PKG_VERSION"));

    if config.metrics.enabled {
        match config.metrics.address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.metrics.address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let degradation = Arc::new(
        DegradationManager::new().with_unhealthy_threshold(config.degradation.unhealthy_threshold),
    );
    let agents = AgentDegradationHandler::with_manager(degradation.clone(), config.agents.min_required);
    for agent in &config.agents.agents {
        agents.register_agent(&agent.name, agent.impact_level, agent.fallbacks.iter().cloned());
    }

    let alerts = Arc::new(AlertManager::new().with_rate_limit(
        config.alerting.rate_limit,
        Duration::from_secs(config.alerting.reset_interval_secs),
    ));
    alerts.add_handler(Arc::new(LoggingAlertHandler::new()));

    let monitor = SystemHealthMonitor::new(alerts.clone(), degradation.clone())
        .with_check_interval(Duration::from_secs(config.monitor.check_interval_secs));

    let status = agents.degradation_status();
    tracing::info!(
        agents = status.total_agents,
        min_required = config.agents.min_required,
        level = %status.degradation_level,
        can_scan = status.can_scan,
        "Configuration loaded"
    );

    // Dependency callers build their breakers and retriers from these sections.
    let breaker = config.circuit_breaker.to_breaker_config("default");
    let retrier = Retrier::new(config.retry.to_retry_config());
    let retry = retrier.config();
    tracing::info!(
        breaker_max_requests = breaker.max_requests,
        breaker_interval_secs = breaker.interval.as_secs(),
        breaker_timeout_secs = breaker.timeout.as_secs(),
        retry_max_attempts = retry.max_attempts,
        retry_initial_delay_ms = retry.initial_delay.as_millis() as u64,
        retry_max_delay_ms = retry.max_delay.as_millis() as u64,
        retry_backoff_multiplier = retry.backoff_multiplier,
        retry_jitter = retry.jitter,
        "Dependency policy defaults"
    );

    let shutdown = Shutdown::new();
    if config.monitor.enabled {
        monitor.start(&shutdown.context()).await;
    } else {
        tracing::info!("System health monitor disabled");
    }

    signals::trigger_on_signal(&shutdown).await;
    monitor.stop().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
