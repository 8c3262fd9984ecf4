mod bootstrap;
mod health;
mod inbound;
mod report;

use std::time::Duration;

use anyhow::{Context, Result};
use casedesk_agent::IntervalScheduler;
use casedesk_core::config::{AppConfig, LoadOptions};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::bootstrap::Application;

fn init_logging(config: &AppConfig) {
    use casedesk_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Logging needs the loaded config, so it starts before bootstrap.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = spawn_worker(&app, shutdown_rx);

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        worker_enabled = worker.is_some(),
        "casedesk-server listening"
    );

    axum::serve(listener, app.router()).with_graceful_shutdown(wait_for_shutdown()).await?;

    info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "casedesk-server stopping"
    );
    let _ = shutdown_tx.send(true);
    if let Some(handle) = worker {
        let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
        if tokio::time::timeout(grace, handle).await.is_err() {
            warn!(
                event_name = "system.server.worker_timeout",
                correlation_id = "shutdown",
                grace_secs = grace.as_secs(),
                "lead worker did not stop within the grace period"
            );
        }
    }
    app.db_pool.close().await;

    Ok(())
}

fn spawn_worker(app: &Application, shutdown: watch::Receiver<bool>) -> Option<JoinHandle<()>> {
    if !app.config.worker.enabled {
        info!(
            event_name = "system.server.worker_disabled",
            correlation_id = "bootstrap",
            "lead worker disabled by configuration"
        );
        return None;
    }

    let worker = app.runtime.worker();
    let period = Duration::from_secs(app.config.worker.poll_interval_secs);
    Some(tokio::spawn(async move {
        let scheduler = IntervalScheduler::new(period);
        worker.run(&scheduler, shutdown).await;
    }))
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(
            event_name = "system.server.signal_error",
            correlation_id = "shutdown",
            error = %error,
            "could not listen for the shutdown signal"
        );
    }
}
