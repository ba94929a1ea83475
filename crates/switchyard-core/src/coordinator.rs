//! Coordinator agent: assigns tasks by role and keeps the task, metric, anomaly and status ledgers

use crate::agent::{handler_fn, Agent, HandlerResult};
use crate::bus::MessageBus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use switchyard_types::{payload, AgentId, AgentRole, Message, MessageId, MessageType, Payload};
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Ledger entry for one assigned or completed task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task: Option<String>,
    pub status: String,
    pub assigned_to_role: Option<AgentRole>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub completed_by: Option<AgentId>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricObservation {
    pub value: Value,
    pub timestamp: DateTime<Utc>,
    pub reported_by: AgentId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    #[serde(rename = "type")]
    pub anomaly_type: Option<String>,
    pub severity: Option<String>,
    pub reported_by: AgentId,
    pub timestamp: DateTime<Utc>,
    pub details: Value,
}

/// Latest reported status of a component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentStatus {
    pub status: String,
    pub updated_at: DateTime<Utc>,
    pub reported_by: AgentId,
}

/// Everything the coordinator has recorded so far
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorLedger {
    pub tasks: HashMap<MessageId, TaskRecord>,
    pub performance_metrics: HashMap<String, Vec<MetricObservation>>,
    pub anomalies: Vec<AnomalyRecord>,
    pub system_status: HashMap<String, ComponentStatus>,
}

/// Read-only copy of the ledger handed to observers
pub type LedgerSnapshot = CoordinatorLedger;

impl CoordinatorLedger {
    pub fn record_assignment(&mut self, message: &Message, role: AgentRole) {
        self.tasks.insert(
            message.id().to_string(),
            TaskRecord {
                task: message.content_str("task").map(str::to_string),
                status: "assigned".to_string(),
                assigned_to_role: Some(role),
                assigned_at: Some(message.timestamp()),
                completed_by: None,
                completed_at: None,
            },
        );
    }

    /// Merge a completion into the entry keyed by `in_reply_to`, creating it if needed.
    /// Returns false when the message carries no correlation id.
    pub fn record_completion(&mut self, message: &Message) -> bool {
        let Some(task_id) = message.in_reply_to() else {
            return false;
        };
        let status = status_of(message.content());
        let task = message.content_str("task").map(str::to_string);

        let record = self
            .tasks
            .entry(task_id.to_string())
            .or_insert_with(|| TaskRecord {
                task: None,
                status: String::new(),
                assigned_to_role: None,
                assigned_at: None,
                completed_by: None,
                completed_at: None,
            });
        if task.is_some() {
            record.task = task;
        }
        record.status = status;
        record.completed_by = Some(message.sender_id().to_string());
        record.completed_at = Some(Utc::now());
        true
    }

    pub fn record_metric(&mut self, message: &Message) -> bool {
        let Some(metric_type) = message.content_str("metric_type") else {
            return false;
        };
        self.performance_metrics
            .entry(metric_type.to_string())
            .or_default()
            .push(MetricObservation {
                value: message.content().get("value").cloned().unwrap_or(Value::Null),
                timestamp: Utc::now(),
                reported_by: message.sender_id().to_string(),
            });
        true
    }

    pub fn record_anomaly(&mut self, message: &Message) {
        self.anomalies.push(AnomalyRecord {
            anomaly_type: message.content_str("anomaly_type").map(str::to_string),
            severity: message.content_str("severity").map(str::to_string),
            reported_by: message.sender_id().to_string(),
            timestamp: Utc::now(),
            details: message
                .content()
                .get("details")
                .cloned()
                .unwrap_or_else(|| Value::Object(Payload::new())),
        });
    }

    pub fn record_status(&mut self, message: &Message) -> bool {
        let Some(component) = message.content_str("component") else {
            return false;
        };
        self.system_status.insert(
            component.to_string(),
            ComponentStatus {
                status: status_of(message.content()),
                updated_at: Utc::now(),
                reported_by: message.sender_id().to_string(),
            },
        );
        true
    }

    /// Keep only the newest `keep` observations per metric type and the newest `keep` anomalies
    pub fn truncate_history(&mut self, keep: usize) {
        for observations in self.performance_metrics.values_mut() {
            trim_front(observations, keep);
        }
        trim_front(&mut self.anomalies, keep);
    }
}

fn trim_front<T>(items: &mut Vec<T>, keep: usize) {
    if items.len() > keep {
        items.drain(..items.len() - keep);
    }
}

fn status_of(content: &Payload) -> String {
    content
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string()
}

/// Agent in the coordinator role
#[derive(Debug)]
pub struct CoordinatorAgent {
    agent: Arc<Agent>,
    ledger: Arc<RwLock<CoordinatorLedger>>,
}

impl CoordinatorAgent {
    pub fn new(id: impl Into<AgentId>, bus: MessageBus) -> Self {
        let agent = Arc::new(Agent::new(id, AgentRole::Coordinator, bus));
        let ledger = Arc::new(RwLock::new(CoordinatorLedger::default()));

        let shared = Arc::clone(&ledger);
        agent.register_handler(
            MessageType::TaskCompletion,
            handler_fn(move |message: Message| {
                let ledger = Arc::clone(&shared);
                async move { on_task_completion(&ledger, message).await }
            }),
        );

        let shared = Arc::clone(&ledger);
        agent.register_handler(
            MessageType::PerformanceMetric,
            handler_fn(move |message: Message| {
                let ledger = Arc::clone(&shared);
                async move { on_performance_metric(&ledger, message).await }
            }),
        );

        let shared = Arc::clone(&ledger);
        let coordinator_id = agent.id().to_string();
        agent.register_handler(
            MessageType::AnomalyAlert,
            handler_fn(move |message: Message| {
                let ledger = Arc::clone(&shared);
                let coordinator_id = coordinator_id.clone();
                async move { on_anomaly_alert(&ledger, &coordinator_id, message).await }
            }),
        );

        let shared = Arc::clone(&ledger);
        agent.register_handler(
            MessageType::SystemStatus,
            handler_fn(move |message: Message| {
                let ledger = Arc::clone(&shared);
                async move { on_system_status(&ledger, message).await }
            }),
        );

        Self { agent, ledger }
    }

    pub fn id(&self) -> &str {
        self.agent.id()
    }

    /// Underlying agent, for running and stopping its loop
    pub fn agent(&self) -> &Arc<Agent> {
        &self.agent
    }

    /// Send a TASK_ASSIGNMENT to every agent of `role` and return its message id.
    ///
    /// The ledger entry is written before the message is published. Delivery is
    /// not awaited; completions are correlated later through `in_reply_to`.
    pub async fn assign_task(&self, role: AgentRole, task: Payload) -> MessageId {
        let message = Message::new(
            self.agent.id(),
            AgentRole::Coordinator,
            MessageType::TaskAssignment,
            task,
        )
        .to_role(role);
        let message_id = message.id().to_string();

        self.ledger.write().await.record_assignment(&message, role);
        let delivered = self.agent.send_message(message);
        info!(
            agent_id = %self.id(),
            message_id = %message_id,
            role = %role,
            delivered,
            "Assigned task"
        );
        message_id
    }

    pub async fn snapshot(&self) -> LedgerSnapshot {
        self.ledger.read().await.clone()
    }

    pub async fn task(&self, message_id: &str) -> Option<TaskRecord> {
        self.ledger.read().await.tasks.get(message_id).cloned()
    }

    pub async fn truncate_history(&self, keep: usize) {
        self.ledger.write().await.truncate_history(keep);
    }
}

async fn on_task_completion(ledger: &RwLock<CoordinatorLedger>, message: Message) -> HandlerResult {
    if ledger.write().await.record_completion(&message) {
        info!(
            message_id = %message.id(),
            task = message.content_str("task").unwrap_or("unknown"),
            status = message.content_str("status").unwrap_or("unknown"),
            completed_by = %message.sender_id(),
            "Task completed"
        );
    } else {
        warn!(message_id = %message.id(), "Task completion without in_reply_to ignored");
    }
    Ok(None)
}

async fn on_performance_metric(ledger: &RwLock<CoordinatorLedger>, message: Message) -> HandlerResult {
    if ledger.write().await.record_metric(&message) {
        info!(
            metric_type = message.content_str("metric_type").unwrap_or_default(),
            reported_by = %message.sender_id(),
            "Performance metric recorded"
        );
    } else {
        warn!(message_id = %message.id(), "Performance metric without metric_type ignored");
    }
    Ok(None)
}

async fn on_anomaly_alert(
    ledger: &RwLock<CoordinatorLedger>,
    coordinator_id: &str,
    message: Message,
) -> HandlerResult {
    ledger.write().await.record_anomaly(&message);
    warn!(
        anomaly_type = message.content_str("anomaly_type").unwrap_or("unknown"),
        severity = message.content_str("severity").unwrap_or("unknown"),
        reported_by = %message.sender_id(),
        "Anomaly alert"
    );

    Ok(Some(message.reply(
        coordinator_id,
        AgentRole::Coordinator,
        MessageType::Response,
        payload(serde_json::json!({"status": "acknowledged"})),
    )))
}

async fn on_system_status(ledger: &RwLock<CoordinatorLedger>, message: Message) -> HandlerResult {
    if ledger.write().await.record_status(&message) {
        info!(
            component = message.content_str("component").unwrap_or_default(),
            status = message.content_str("status").unwrap_or("unknown"),
            "System status update"
        );
    } else {
        warn!(message_id = %message.id(), "System status without component ignored");
    }
    Ok(None)
}
