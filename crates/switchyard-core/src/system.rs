//! Multi-agent system: creates role agents, runs their loops and stops them within a bounded time

use crate::agent::{Agent, AgentError};
use crate::bus::MessageBus;
use crate::coordinator::CoordinatorAgent;
use crate::settings::{RoleCount, SystemConfig};
use crate::workers::{RoleWork, WorkerAgent};
use std::sync::Arc;
use std::time::Duration;
use switchyard_types::{AgentId, AgentRole};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum SystemError {
    #[error("Agent {0} not found")]
    AgentNotFound(AgentId),
}

/// An agent created by the system, typed by its specialization
#[derive(Debug, Clone)]
pub enum ManagedAgent {
    Coordinator(Arc<CoordinatorAgent>),
    Worker(Arc<WorkerAgent>),
    /// Role without a specialized implementation: no handlers registered
    Generic(Arc<Agent>),
}

impl ManagedAgent {
    pub fn agent(&self) -> &Arc<Agent> {
        match self {
            ManagedAgent::Coordinator(coordinator) => coordinator.agent(),
            ManagedAgent::Worker(worker) => worker.agent(),
            ManagedAgent::Generic(agent) => agent,
        }
    }

    pub fn id(&self) -> &str {
        self.agent().id()
    }

    pub fn role(&self) -> AgentRole {
        self.agent().role()
    }

    pub fn as_coordinator(&self) -> Option<&Arc<CoordinatorAgent>> {
        match self {
            ManagedAgent::Coordinator(coordinator) => Some(coordinator),
            _ => None,
        }
    }
}

/// Owns a set of agents on one bus together with their run-loop tasks
#[derive(Debug)]
pub struct MultiAgentSystem {
    bus: MessageBus,
    agents: Vec<ManagedAgent>,
    created: usize,
    loops: Vec<(AgentId, JoinHandle<Result<(), AgentError>>)>,
    shutdown_grace: Duration,
}

impl MultiAgentSystem {
    pub fn new(bus: MessageBus) -> Self {
        Self::with_config(bus, &SystemConfig::default())
    }

    pub fn with_config(bus: MessageBus, config: &SystemConfig) -> Self {
        Self {
            bus,
            agents: Vec::new(),
            created: 0,
            loops: Vec::new(),
            shutdown_grace: config.shutdown_grace(),
        }
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    /// Create, subscribe and record an agent for `role`.
    ///
    /// Ids are `"{role}_{n}"` where `n` counts creations in this system, starting at 1.
    pub fn create_agent(&mut self, role: AgentRole) -> ManagedAgent {
        let id = self.next_id(role);
        let bus = self.bus.clone();

        let agent = match role {
            AgentRole::Coordinator => ManagedAgent::Coordinator(Arc::new(CoordinatorAgent::new(id, bus))),
            AgentRole::DataCollector => ManagedAgent::Worker(Arc::new(WorkerAgent::data_collector(id, bus))),
            AgentRole::ModelTrainer => ManagedAgent::Worker(Arc::new(WorkerAgent::model_trainer(id, bus))),
            _ => ManagedAgent::Generic(Arc::new(Agent::new(id, role, bus))),
        };
        self.register(agent.clone());
        agent
    }

    /// Create a coordinator agent
    pub fn create_coordinator(&mut self) -> Arc<CoordinatorAgent> {
        let id = self.next_id(AgentRole::Coordinator);
        let coordinator = Arc::new(CoordinatorAgent::new(id, self.bus.clone()));
        self.register(ManagedAgent::Coordinator(Arc::clone(&coordinator)));
        coordinator
    }

    /// Create a worker for `role` backed by custom work instead of the built-in stub
    pub fn create_worker(&mut self, role: AgentRole, work: Arc<dyn RoleWork>) -> Arc<WorkerAgent> {
        let id = self.next_id(role);
        let worker = Arc::new(WorkerAgent::new(id, role, self.bus.clone(), work));
        self.register(ManagedAgent::Worker(Arc::clone(&worker)));
        worker
    }

    /// Create every agent of a topology, in order
    pub fn populate(&mut self, topology: &[RoleCount]) -> Vec<ManagedAgent> {
        let mut created = Vec::new();
        for entry in topology {
            for _ in 0..entry.count {
                created.push(self.create_agent(entry.role));
            }
        }
        created
    }

    fn next_id(&mut self, role: AgentRole) -> AgentId {
        self.created += 1;
        format!("{}_{}", role, self.created)
    }

    fn register(&mut self, agent: ManagedAgent) {
        self.bus.subscribe(agent.agent().handle());
        info!(agent_id = %agent.id(), role = %agent.role(), "Created agent");
        self.agents.push(agent);
    }

    pub fn agent(&self, id: &str) -> Option<&ManagedAgent> {
        self.agents.iter().find(|agent| agent.id() == id)
    }

    pub fn agents(&self) -> &[ManagedAgent] {
        &self.agents
    }

    /// First coordinator created, if any
    pub fn coordinator(&self) -> Option<Arc<CoordinatorAgent>> {
        self.agents
            .iter()
            .find_map(ManagedAgent::as_coordinator)
            .map(Arc::clone)
    }

    /// Spawn a run loop for every agent that has not been started yet; returns how many were spawned
    pub fn start_agents(&mut self) -> usize {
        let mut spawned = 0;
        for managed in &self.agents {
            let agent = managed.agent();
            if agent.is_stopped() || !agent.try_claim_start() {
                continue;
            }
            let task = tokio::spawn(Arc::clone(agent).run_claimed());
            self.loops.push((agent.id().to_string(), task));
            spawned += 1;
        }
        info!(spawned, total = self.agents.len(), "Started agents");
        spawned
    }

    /// Stop every agent and wait for its loop.
    ///
    /// A loop that has not exited within the shutdown grace period (for example,
    /// stuck in a handler) is aborted. Safe to call more than once.
    pub async fn stop_agents(&mut self) {
        for managed in &self.agents {
            managed.agent().stop();
        }

        for (agent_id, task) in self.loops.drain(..) {
            join_loop(&agent_id, task, self.shutdown_grace).await;
        }
        info!("Stopped agents");
    }

    /// Stop an agent, unsubscribe it and drop it from the system
    pub async fn remove_agent(&mut self, id: &str) -> Result<ManagedAgent, SystemError> {
        let index = self
            .agents
            .iter()
            .position(|agent| agent.id() == id)
            .ok_or_else(|| SystemError::AgentNotFound(id.to_string()))?;
        let managed = self.agents.remove(index);

        managed.agent().stop();
        self.bus.unsubscribe(id);
        if let Some(index) = self.loops.iter().position(|(agent_id, _)| agent_id == id) {
            let (agent_id, task) = self.loops.remove(index);
            join_loop(&agent_id, task, self.shutdown_grace).await;
        }
        info!(agent_id = %id, "Removed agent");
        Ok(managed)
    }

    /// Stop all loops and unsubscribe every agent from the bus
    pub async fn shutdown(&mut self) {
        self.stop_agents().await;
        for managed in &self.agents {
            self.bus.unsubscribe(managed.id());
        }
        info!(agents = self.agents.len(), "Multi-agent system shut down");
    }

    /// Loops spawned and not yet joined
    pub fn running_loops(&self) -> usize {
        self.loops.iter().filter(|(_, task)| !task.is_finished()).count()
    }
}

async fn join_loop(agent_id: &str, mut task: JoinHandle<Result<(), AgentError>>, grace: Duration) {
    match tokio::time::timeout(grace, &mut task).await {
        Ok(Ok(Ok(()))) => debug!(agent_id = %agent_id, "Agent loop joined"),
        Ok(Ok(Err(e))) => warn!(agent_id = %agent_id, error = %e, "Agent loop ended with error"),
        Ok(Err(e)) => warn!(agent_id = %agent_id, error = %e, "Agent loop task failed"),
        Err(_) => {
            warn!(agent_id = %agent_id, grace_ms = grace.as_millis() as u64, "Agent loop did not stop in time; aborting");
            task.abort();
            let _ = task.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_follow_creation_order() {
        let mut system = MultiAgentSystem::new(MessageBus::new());
        let coordinator = system.create_coordinator();
        let collector = system.create_agent(AgentRole::DataCollector);
        let monitor = system.create_agent(AgentRole::SystemMonitor);

        assert_eq!(coordinator.id(), "coordinator_1");
        assert_eq!(collector.id(), "data_collector_2");
        assert_eq!(monitor.id(), "system_monitor_3");
        assert!(matches!(monitor, ManagedAgent::Generic(_)));
        assert!(system.bus().is_subscribed("data_collector_2"));
        assert_eq!(system.coordinator().unwrap().id(), "coordinator_1");
    }

    #[tokio::test]
    async fn test_removed_ids_are_not_reused() {
        let mut system = MultiAgentSystem::new(MessageBus::new());
        system.create_agent(AgentRole::DataProcessor);
        system.remove_agent("data_processor_1").await.unwrap();
        assert!(!system.bus().is_subscribed("data_processor_1"));

        let next = system.create_agent(AgentRole::DataProcessor);
        assert_eq!(next.id(), "data_processor_2");
        assert!(matches!(
            system.remove_agent("ghost_7").await,
            Err(SystemError::AgentNotFound(_))
        ));
    }

    #[test]
    fn test_populate_topology() {
        let mut system = MultiAgentSystem::new(MessageBus::new());
        let created = system.populate(&SystemConfig::default().topology);
        assert_eq!(created.len(), 12);
        assert_eq!(system.bus().agents_in_role(AgentRole::DataCollector).len(), 3);
        assert_eq!(created.last().unwrap().id(), "system_monitor_12");
    }

    #[tokio::test]
    async fn test_start_and_stop_twice() {
        let mut system = MultiAgentSystem::new(MessageBus::new());
        system.create_coordinator();
        system.create_agent(AgentRole::ModelTrainer);

        assert_eq!(system.start_agents(), 2);
        assert_eq!(system.start_agents(), 0);

        system.stop_agents().await;
        assert_eq!(system.running_loops(), 0);
        assert!(system.agents().iter().all(|a| !a.agent().is_running()));

        system.stop_agents().await;
        assert_eq!(system.start_agents(), 0);
    }

    #[tokio::test]
    async fn test_back_to_back_starts_spawn_one_loop_each() {
        let mut system = MultiAgentSystem::new(MessageBus::new());
        system.create_agent(AgentRole::DataCollector);
        system.create_agent(AgentRole::SystemMonitor);

        // No yield between the calls, so neither loop has been polled yet.
        assert_eq!(system.start_agents(), 2);
        assert_eq!(system.start_agents(), 0);
        assert_eq!(system.loops.len(), 2);

        system.stop_agents().await;
    }
}
