use anyhow::{Context, Result};
use serde_json::json;
use std::time::Duration;
use switchyard_core::{payload, AgentRole, MessageBus, MultiAgentSystem, SystemConfig};
use tracing_subscriber::EnvFilter;

/// Runs one assignment round trip through a small system and prints the coordinator ledger
#[tokio::main]
async fn main() -> Result<()> {
    let config = SystemConfig::load(None).context("loading configuration")?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("Starting Switchyard demo...");

    let mut system = MultiAgentSystem::with_config(MessageBus::new(), &config);
    let coordinator = system.create_coordinator();
    system.create_agent(AgentRole::DataCollector);
    system.create_agent(AgentRole::ModelTrainer);
    system.start_agents();

    let collect = coordinator
        .assign_task(
            AgentRole::DataCollector,
            payload(json!({"task": "collect_data", "source": "noaa"})),
        )
        .await;
    let train = coordinator
        .assign_task(
            AgentRole::ModelTrainer,
            payload(json!({"task": "train_model", "model_type": "temperature_lstm"})),
        )
        .await;

    let settled = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let ledger = coordinator.snapshot().await;
            let done = [&collect, &train]
                .iter()
                .all(|id| ledger.tasks.get(*id).is_some_and(|t| t.status == "completed"));
            if done {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    if settled.is_err() {
        tracing::warn!("Timed out waiting for task completions");
    }

    let ledger = coordinator.snapshot().await;
    println!("{}", serde_json::to_string_pretty(&ledger)?);

    system.shutdown().await;
    Ok(())
}
