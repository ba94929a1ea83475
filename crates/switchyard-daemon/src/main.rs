use anyhow::{Context, Result};
use std::path::PathBuf;
use switchyard_core::{MessageBus, MultiAgentSystem, SystemConfig, TaskSchedule};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = SystemConfig::load(config_path.as_deref()).context("loading configuration")?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(config = ?config_path, "Starting switchyardd daemon...");

    let mut system = MultiAgentSystem::with_config(MessageBus::new(), &config);
    system.populate(&config.topology);
    let coordinator = system
        .coordinator()
        .context("topology must include a coordinator")?;
    let started = system.start_agents();
    info!(agents = started, "Agent system running");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let schedule = tokio::spawn(TaskSchedule::new(config.schedule.clone()).run(coordinator, shutdown_rx));

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    info!("Shutdown requested");

    shutdown_tx.send_replace(true);
    schedule.await.context("task schedule panicked")?;
    system.shutdown().await;

    let stats = system.bus().stats();
    info!(
        published = stats.total_published,
        delivered = stats.total_delivered,
        dropped = stats.dropped_deliveries,
        "switchyardd stopped"
    );
    Ok(())
}
