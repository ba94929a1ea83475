//! System harness for scenario tests
//!
//! Wraps a [`MultiAgentSystem`] on a fresh bus with a short shutdown grace, so a
//! stuck loop fails a test quickly instead of hanging it.

use crate::{wait_for, MailboxProbe, ScriptedWork};
use std::sync::Arc;
use std::time::Duration;
use switchyard_core::{
    AgentId, AgentRole, CoordinatorAgent, MessageBus, MultiAgentSystem, SystemConfig, TaskRecord, WorkerAgent,
};

pub struct TestSystem {
    pub system: MultiAgentSystem,
}

impl TestSystem {
    pub fn new() -> Self {
        Self::with_grace(Duration::from_millis(200))
    }

    pub fn with_grace(grace: Duration) -> Self {
        let config = SystemConfig {
            shutdown_grace_ms: grace.as_millis() as u64,
            ..SystemConfig::default()
        };
        Self {
            system: MultiAgentSystem::with_config(MessageBus::new(), &config),
        }
    }

    pub fn bus(&self) -> &MessageBus {
        self.system.bus()
    }

    /// Subscribe a probe that observes what the bus delivers under `id`
    pub fn probe(&self, id: impl Into<AgentId>, role: AgentRole) -> MailboxProbe {
        MailboxProbe::subscribed(self.system.bus(), id, role)
    }

    pub fn coordinator(&mut self) -> Arc<CoordinatorAgent> {
        self.system.create_coordinator()
    }

    pub fn scripted_worker(&mut self, role: AgentRole, work: Arc<ScriptedWork>) -> Arc<WorkerAgent> {
        self.system.create_worker(role, work)
    }

    /// Wait until the coordinator's ledger shows `status` for `task_id`
    pub async fn await_task_status(
        coordinator: &CoordinatorAgent,
        task_id: &str,
        status: &str,
        timeout: Duration,
    ) -> Option<TaskRecord> {
        let settled = wait_for(
            move || async move {
                coordinator
                    .task(task_id)
                    .await
                    .is_some_and(|record| record.status == status)
            },
            timeout,
        )
        .await;
        if settled {
            coordinator.task(task_id).await
        } else {
            None
        }
    }
}

impl Default for TestSystem {
    fn default() -> Self {
        Self::new()
    }
}
