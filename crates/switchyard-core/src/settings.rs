//! System configuration: defaults, optional TOML file, `SWITCHYARD_*` environment overrides

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use switchyard_types::AgentRole;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),
}

/// How many agents of a role to create
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleCount {
    pub role: AgentRole,
    pub count: usize,
}

impl RoleCount {
    pub fn new(role: AgentRole, count: usize) -> Self {
        Self { role, count }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub log_filter: String,
    /// Per-loop wait for a stopped agent before its task is aborted
    pub shutdown_grace_ms: u64,
    pub topology: Vec<RoleCount>,
    pub schedule: ScheduleConfig,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            shutdown_grace_ms: 1000,
            topology: vec![
                RoleCount::new(AgentRole::Coordinator, 1),
                RoleCount::new(AgentRole::DataCollector, 3),
                RoleCount::new(AgentRole::DataProcessor, 2),
                RoleCount::new(AgentRole::ModelTrainer, 2),
                RoleCount::new(AgentRole::PredictionEngine, 1),
                RoleCount::new(AgentRole::AnomalyDetector, 1),
                RoleCount::new(AgentRole::FeedbackAnalyzer, 1),
                RoleCount::new(AgentRole::SystemMonitor, 1),
            ],
            schedule: ScheduleConfig::default(),
        }
    }
}

impl SystemConfig {
    /// Layer defaults, the optional TOML file at `path` and `SWITCHYARD_*` variables.
    ///
    /// Nested keys use `__`, e.g. `SWITCHYARD_SCHEDULE__INTERVAL_SECS=5`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&SystemConfig::default())?);
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix("SWITCHYARD")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// What the periodic task source assigns each cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub interval_secs: u64,
    pub data_sources: Vec<String>,
    /// Sources collected with `priority: high`; the rest get `medium`
    pub high_priority_sources: Vec<String>,
    pub model_types: Vec<String>,
    pub training: TrainingParameters,
    pub prediction: PredictionTarget,
    pub anomaly: AnomalyScan,
    /// Ledger history kept after each cycle; unbounded when unset
    pub history_limit: Option<usize>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            data_sources: strings(&[
                "noaa",
                "eccc",
                "satellite",
                "social_media",
                "seismic",
                "cosmic_ray",
                "ion",
                "vorticity",
            ]),
            high_priority_sources: strings(&["noaa", "eccc"]),
            model_types: strings(&["temperature_lstm", "hybrid_cnn_lstm", "anomaly_detector"]),
            training: TrainingParameters::default(),
            prediction: PredictionTarget::default(),
            anomaly: AnomalyScan::default(),
            history_limit: None,
        }
    }
}

impl ScheduleConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingParameters {
    pub epochs: u32,
    pub batch_size: u32,
    pub learning_rate: f64,
}

impl Default for TrainingParameters {
    fn default() -> Self {
        Self {
            epochs: 100,
            batch_size: 64,
            learning_rate: 0.001,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionTarget {
    pub location: String,
    pub prediction_type: String,
    pub time_range: String,
}

impl Default for PredictionTarget {
    fn default() -> Self {
        Self {
            location: "toronto".to_string(),
            prediction_type: "temperature".to_string(),
            time_range: "24h".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyScan {
    pub data_types: Vec<String>,
    pub sensitivity: String,
}

impl Default for AnomalyScan {
    fn default() -> Self {
        Self {
            data_types: strings(&["ion", "vorticity", "seismic"]),
            sensitivity: "medium".to_string(),
        }
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SystemConfig::default();
        assert_eq!(config.shutdown_grace(), Duration::from_secs(1));
        assert_eq!(config.topology.iter().map(|t| t.count).sum::<usize>(), 12);
        assert_eq!(config.schedule.data_sources.len(), 8);
        assert_eq!(config.schedule.training.batch_size, 64);
        assert!(config.schedule.history_limit.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = SystemConfig::from_toml_str(
            r#"
            shutdown_grace_ms = 250

            [[topology]]
            role = "coordinator"
            count = 1

            [[topology]]
            role = "data_collector"
            count = 2

            [schedule]
            interval_secs = 5
            history_limit = 50

            [schedule.training]
            epochs = 10

            [schedule.anomaly]
            data_types = ["seismic"]
            "#,
        )
        .unwrap();

        assert_eq!(config.shutdown_grace_ms, 250);
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.topology[1], RoleCount::new(AgentRole::DataCollector, 2));
        assert_eq!(config.schedule.interval_secs, 5);
        assert_eq!(config.schedule.history_limit, Some(50));
        assert_eq!(config.schedule.training.epochs, 10);
        assert_eq!(config.schedule.training.batch_size, 64);
        assert_eq!(config.schedule.prediction.location, "toronto");
        assert_eq!(config.schedule.anomaly.data_types, vec!["seismic".to_string()]);
        assert_eq!(config.schedule.anomaly.sensitivity, "medium");
    }

    #[test]
    fn test_unknown_role_rejected() {
        let result = SystemConfig::from_toml_str(
            r#"
            [[topology]]
            role = "janitor"
            count = 1
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_load_without_file_yields_defaults() {
        let config = SystemConfig::load(None).unwrap();
        assert_eq!(config.topology, SystemConfig::default().topology);
        assert_eq!(config.schedule.anomaly.sensitivity, "medium");
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = SystemConfig::load(Some(Path::new("/nonexistent/switchyard.toml")));
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }
}
