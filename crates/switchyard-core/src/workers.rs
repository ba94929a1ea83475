//! Role worker agents and the work implementations behind them

use crate::agent::{handler_fn, Agent, HandlerError, HandlerResult};
use crate::bus::MessageBus;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use switchyard_types::{payload, AgentId, AgentRole, Message, MessageType, Payload};
use tracing::{info, warn};

/// The work a role worker performs when it receives a matching task assignment.
///
/// `perform` gets the assignment content and returns the completion summary that
/// is merged into the TASK_COMPLETION reply. An error produces no reply at all.
#[async_trait]
pub trait RoleWork: Send + Sync {
    /// `content.task` value this work answers to
    fn task_name(&self) -> &str;

    /// `content.request_type` value answered with [`RoleWork::status`]
    fn status_request(&self) -> &str;

    async fn perform(&self, assignment: &Payload) -> anyhow::Result<Payload>;

    fn status(&self) -> Payload;
}

/// Stubbed data collection from a named source
#[derive(Debug, Default, Clone)]
pub struct DataCollection;

#[async_trait]
impl RoleWork for DataCollection {
    fn task_name(&self) -> &str {
        "collect_data"
    }

    fn status_request(&self) -> &str {
        "data_source_status"
    }

    async fn perform(&self, assignment: &Payload) -> anyhow::Result<Payload> {
        let source = assignment.get("source").cloned().unwrap_or(Value::Null);
        info!(source = %source, "Collecting data");
        Ok(payload(json!({
            "source": source,
            "data_summary": {
                "records": 100,
                "timestamp": Utc::now().to_rfc3339(),
            },
        })))
    }

    fn status(&self) -> Payload {
        payload(json!({
            "data_sources": {
                "noaa": "active",
                "eccc": "active",
                "satellite": "active",
                "social_media": "active",
            }
        }))
    }
}

/// Stubbed model training
#[derive(Debug, Default, Clone)]
pub struct ModelTraining;

#[async_trait]
impl RoleWork for ModelTraining {
    fn task_name(&self) -> &str {
        "train_model"
    }

    fn status_request(&self) -> &str {
        "model_status"
    }

    async fn perform(&self, assignment: &Payload) -> anyhow::Result<Payload> {
        let model_type = assignment.get("model_type").cloned().unwrap_or(Value::Null);
        info!(model_type = %model_type, "Training model");
        Ok(payload(json!({
            "model_type": model_type,
            "performance": {
                "accuracy": 0.92,
                "loss": 0.08,
            },
        })))
    }

    fn status(&self) -> Payload {
        payload(json!({
            "models": {
                "temperature_lstm": {
                    "status": "trained",
                    "version": "1.0.0",
                    "accuracy": 0.92,
                },
                "hybrid_cnn_lstm": {
                    "status": "training",
                    "progress": 0.75,
                },
            }
        }))
    }
}

/// Agent that answers task assignments and status requests through a [`RoleWork`]
pub struct WorkerAgent {
    agent: Arc<Agent>,
    work: Arc<dyn RoleWork>,
}

impl WorkerAgent {
    pub fn new(id: impl Into<AgentId>, role: AgentRole, bus: MessageBus, work: Arc<dyn RoleWork>) -> Self {
        let agent = Arc::new(Agent::new(id, role, bus));

        let (sender, shared) = (Responder::of(&agent), Arc::clone(&work));
        agent.register_handler(
            MessageType::TaskAssignment,
            handler_fn(move |message: Message| {
                let (sender, work) = (sender.clone(), Arc::clone(&shared));
                async move { on_task_assignment(sender, work.as_ref(), message).await }
            }),
        );

        let (sender, shared) = (Responder::of(&agent), Arc::clone(&work));
        agent.register_handler(
            MessageType::Request,
            handler_fn(move |message: Message| {
                let (sender, work) = (sender.clone(), Arc::clone(&shared));
                async move { on_request(sender, work.as_ref(), message) }
            }),
        );

        Self { agent, work }
    }

    /// DATA_COLLECTOR worker backed by the stubbed [`DataCollection`]
    pub fn data_collector(id: impl Into<AgentId>, bus: MessageBus) -> Self {
        Self::new(id, AgentRole::DataCollector, bus, Arc::new(DataCollection))
    }

    /// MODEL_TRAINER worker backed by the stubbed [`ModelTraining`]
    pub fn model_trainer(id: impl Into<AgentId>, bus: MessageBus) -> Self {
        Self::new(id, AgentRole::ModelTrainer, bus, Arc::new(ModelTraining))
    }

    pub fn id(&self) -> &str {
        self.agent.id()
    }

    pub fn role(&self) -> AgentRole {
        self.agent.role()
    }

    pub fn agent(&self) -> &Arc<Agent> {
        &self.agent
    }

    pub fn work(&self) -> &Arc<dyn RoleWork> {
        &self.work
    }
}

impl fmt::Debug for WorkerAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerAgent")
            .field("agent", &self.agent)
            .field("task", &self.work.task_name())
            .finish()
    }
}

// Identity stamped on replies.
#[derive(Debug, Clone)]
struct Responder {
    id: AgentId,
    role: AgentRole,
}

impl Responder {
    fn of(agent: &Agent) -> Self {
        Self {
            id: agent.id().to_string(),
            role: agent.role(),
        }
    }

    fn reply(&self, to: &Message, message_type: MessageType, content: Payload) -> Message {
        to.reply(self.id.clone(), self.role, message_type, content)
    }

    fn error(&self, to: &Message, error: &str) -> Message {
        self.reply(to, MessageType::Response, payload(json!({ "error": error })))
    }
}

async fn on_task_assignment(sender: Responder, work: &dyn RoleWork, message: Message) -> HandlerResult {
    let task = message.content_str("task");
    if task != Some(work.task_name()) {
        warn!(
            agent_id = %sender.id,
            message_id = %message.id(),
            task = task.unwrap_or("<none>"),
            "Unknown task"
        );
        return Ok(Some(sender.error(&message, "Unknown task")));
    }

    let summary = work.perform(message.content()).await.map_err(HandlerError::Work)?;

    let mut content = summary;
    content.insert("task".into(), Value::from(work.task_name()));
    content.insert("status".into(), Value::from("completed"));

    info!(agent_id = %sender.id, message_id = %message.id(), task = work.task_name(), "Task completed");
    Ok(Some(sender.reply(&message, MessageType::TaskCompletion, content)))
}

fn on_request(sender: Responder, work: &dyn RoleWork, message: Message) -> HandlerResult {
    match message.content_str("request_type") {
        Some(kind) if kind == work.status_request() => {
            Ok(Some(sender.reply(&message, MessageType::Response, work.status())))
        }
        other => {
            warn!(
                agent_id = %sender.id,
                request_type = other.unwrap_or("<none>"),
                "Unknown request type"
            );
            Ok(Some(sender.error(&message, "Unknown request type")))
        }
    }
}
