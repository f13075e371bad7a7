use anyhow::Result;
use outdial_core::config::{AppConfig, LoadOptions};
use outdial_server::{bootstrap, health, webhooks};

fn init_logging(config: &AppConfig) {
    use outdial_core::config::LogFormat::*;
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
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.db_pool.clone(),
    )
    .await?;

    webhooks::spawn(
        &app.config.server.bind_address,
        app.config.server.webhook_port,
        app.orchestrator.clone(),
    )
    .await?;

    let dispatch_handle = app.dispatcher.clone().spawn_interval(app.config.dispatcher.interval_secs);

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        call_id = "unknown",
        task_id = "unknown",
        "outdial-server started"
    );
    wait_for_shutdown().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        call_id = "unknown",
        task_id = "unknown",
        "outdial-server stopping"
    );
    dispatch_handle.abort();

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
