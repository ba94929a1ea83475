//! Periodic task source feeding the coordinator

use crate::coordinator::CoordinatorAgent;
use crate::settings::ScheduleConfig;
use serde_json::json;
use std::sync::Arc;
use switchyard_types::{payload, AgentRole, MessageId, Payload};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Builds and assigns one cycle of collection, training, prediction and anomaly tasks
#[derive(Debug, Clone)]
pub struct TaskSchedule {
    config: ScheduleConfig,
}

impl TaskSchedule {
    pub fn new(config: ScheduleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    /// Assignments for one cycle, in the order they are sent
    pub fn assignments(&self) -> Vec<(AgentRole, Payload)> {
        let config = &self.config;
        let mut assignments = Vec::new();

        for source in &config.data_sources {
            let priority = if config.high_priority_sources.contains(source) {
                "high"
            } else {
                "medium"
            };
            assignments.push((
                AgentRole::DataCollector,
                payload(json!({"task": "collect_data", "source": source, "priority": priority})),
            ));
        }

        for model_type in &config.model_types {
            assignments.push((
                AgentRole::ModelTrainer,
                payload(json!({
                    "task": "train_model",
                    "model_type": model_type,
                    "parameters": config.training,
                })),
            ));
        }

        assignments.push((
            AgentRole::PredictionEngine,
            payload(json!({
                "task": "generate_predictions",
                "location": config.prediction.location,
                "prediction_type": config.prediction.prediction_type,
                "time_range": config.prediction.time_range,
            })),
        ));
        assignments.push((
            AgentRole::AnomalyDetector,
            payload(json!({
                "task": "detect_anomalies",
                "data_types": config.anomaly.data_types,
                "sensitivity": config.anomaly.sensitivity,
            })),
        ));

        assignments
    }

    /// Assign one full cycle and return the assignment message ids
    pub async fn run_cycle(&self, coordinator: &CoordinatorAgent) -> Vec<MessageId> {
        let mut ids = Vec::new();
        for (role, task) in self.assignments() {
            ids.push(coordinator.assign_task(role, task).await);
        }
        if let Some(keep) = self.config.history_limit {
            coordinator.truncate_history(keep).await;
        }
        info!(agent_id = %coordinator.id(), assigned = ids.len(), "Task cycle assigned");
        ids
    }

    /// Run a cycle every `interval_secs` until `shutdown` turns true or its sender is dropped.
    /// The first cycle runs immediately.
    pub async fn run(self, coordinator: Arc<CoordinatorAgent>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.run_cycle(&coordinator).await;
                }
            }
        }
        debug!("Task schedule stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MessageBus;
    use std::time::Duration;

    #[test]
    fn test_default_cycle_shape() {
        let assignments = TaskSchedule::new(ScheduleConfig::default()).assignments();
        assert_eq!(assignments.len(), 8 + 3 + 2);

        let (role, noaa) = &assignments[0];
        assert_eq!(*role, AgentRole::DataCollector);
        assert_eq!(noaa["priority"], json!("high"));
        assert_eq!(assignments[2].1["priority"], json!("medium"));

        let (role, training) = &assignments[8];
        assert_eq!(*role, AgentRole::ModelTrainer);
        assert_eq!(training["parameters"]["epochs"], json!(100));

        let (role, anomaly) = assignments.last().unwrap();
        assert_eq!(*role, AgentRole::AnomalyDetector);
        assert_eq!(anomaly["data_types"], json!(["ion", "vorticity", "seismic"]));
    }

    #[tokio::test]
    async fn test_run_cycle_records_every_assignment() {
        let coordinator = CoordinatorAgent::new("coordinator_1", MessageBus::new());
        let schedule = TaskSchedule::new(ScheduleConfig {
            data_sources: vec!["noaa".into()],
            model_types: vec![],
            ..ScheduleConfig::default()
        });

        let ids = schedule.run_cycle(&coordinator).await;
        assert_eq!(ids.len(), 3);
        let ledger = coordinator.snapshot().await;
        assert!(ids.iter().all(|id| ledger.tasks[id].status == "assigned"));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let coordinator = Arc::new(CoordinatorAgent::new("coordinator_1", MessageBus::new()));
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(TaskSchedule::new(ScheduleConfig::default()).run(Arc::clone(&coordinator), rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send_replace(true);
        tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();

        assert_eq!(coordinator.snapshot().await.tasks.len(), 13);
    }
}
