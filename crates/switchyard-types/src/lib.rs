//! Core types for the Switchyard message bus

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub use message::*;

mod message;

/// Agent identifier type, conventionally `"{role}_{sequence}"`
pub type AgentId = String;

/// Message identifier type
pub type MessageId = String;

/// Opaque key/value message payload
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Role an agent plays in the system. Fixed for the agent's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    DataCollector,
    DataProcessor,
    ModelTrainer,
    PredictionEngine,
    AnomalyDetector,
    FeedbackAnalyzer,
    SystemMonitor,
    Coordinator,
}

impl AgentRole {
    pub const ALL: [AgentRole; 8] = [
        AgentRole::DataCollector,
        AgentRole::DataProcessor,
        AgentRole::ModelTrainer,
        AgentRole::PredictionEngine,
        AgentRole::AnomalyDetector,
        AgentRole::FeedbackAnalyzer,
        AgentRole::SystemMonitor,
        AgentRole::Coordinator,
    ];

    /// Wire name of the role
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::DataCollector => "data_collector",
            AgentRole::DataProcessor => "data_processor",
            AgentRole::ModelTrainer => "model_trainer",
            AgentRole::PredictionEngine => "prediction_engine",
            AgentRole::AnomalyDetector => "anomaly_detector",
            AgentRole::FeedbackAnalyzer => "feedback_analyzer",
            AgentRole::SystemMonitor => "system_monitor",
            AgentRole::Coordinator => "coordinator",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentRole {
    type Err = MalformedMessageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AgentRole::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| MalformedMessageError::UnknownRole(s.to_string()))
    }
}

/// Closed set of message kinds exchanged between agents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Request,
    Response,
    Notification,
    TaskAssignment,
    TaskCompletion,
    ModelUpdate,
    PerformanceMetric,
    AnomalyAlert,
    SystemStatus,
}

impl MessageType {
    pub const ALL: [MessageType; 9] = [
        MessageType::Request,
        MessageType::Response,
        MessageType::Notification,
        MessageType::TaskAssignment,
        MessageType::TaskCompletion,
        MessageType::ModelUpdate,
        MessageType::PerformanceMetric,
        MessageType::AnomalyAlert,
        MessageType::SystemStatus,
    ];

    /// Wire name of the message type
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Request => "request",
            MessageType::Response => "response",
            MessageType::Notification => "notification",
            MessageType::TaskAssignment => "task_assignment",
            MessageType::TaskCompletion => "task_completion",
            MessageType::ModelUpdate => "model_update",
            MessageType::PerformanceMetric => "performance_metric",
            MessageType::AnomalyAlert => "anomaly_alert",
            MessageType::SystemStatus => "system_status",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = MalformedMessageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| MalformedMessageError::UnknownMessageType(s.to_string()))
    }
}

/// A serialized message could not be turned back into a [`Message`]
#[derive(Debug, Error)]
pub enum MalformedMessageError {
    #[error("missing required key `{0}`")]
    MissingKey(&'static str),
    #[error("key `{key}` must be {expected}")]
    InvalidField {
        key: &'static str,
        expected: &'static str,
    },
    #[error("unknown agent role: {0}")]
    UnknownRole(String),
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),
    #[error("recipient_id and recipient_role are mutually exclusive")]
    ConflictingRecipients,
    #[error("invalid timestamp `{0}`")]
    InvalidTimestamp(String),
    #[error("serialized message is not an object")]
    NotAnObject,
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Turn a `json!({...})` object literal into a [`Payload`].
///
/// Non-object values yield an empty payload.
pub fn payload(value: serde_json::Value) -> Payload {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Payload::new(),
    }
}
