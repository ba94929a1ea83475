//! Message bus: directory of subscribed agents and sole routing authority

use crate::agent::AgentHandle;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use switchyard_types::{AgentId, AgentRole, Message, Recipient};
use tracing::{debug, info, warn};

/// Bus delivery counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusStats {
    pub total_published: u64,
    pub total_delivered: u64,
    pub dropped_deliveries: u64,
    pub subscribed_agents: usize,
}

/// Shared routing directory.
///
/// Cloning yields another reference to the same directory. One bus per process is a
/// caller convention: construct it once and hand it to every agent and system.
#[derive(Debug, Clone, Default)]
pub struct MessageBus {
    inner: Arc<Directory>,
}

#[derive(Debug, Default)]
struct Directory {
    // agent id -> handle
    agents: DashMap<AgentId, AgentHandle>,
    // role -> handles in subscription order
    roles: DashMap<AgentRole, Vec<AgentHandle>>,
    // serializes subscribe/unsubscribe so both maps change together
    mutation: Mutex<()>,
    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an agent to both directories.
    ///
    /// Idempotent per agent id: subscribing an id again replaces its entries
    /// instead of adding a second role-list slot.
    pub fn subscribe(&self, agent: AgentHandle) {
        let _guard = self.inner.mutation.lock().unwrap_or_else(PoisonError::into_inner);
        let agent_id = agent.id().to_string();
        let role = agent.role();

        if let Some(previous) = self.inner.agents.insert(agent_id.clone(), agent.clone()) {
            self.remove_from_role(previous.role(), &agent_id);
            debug!(agent_id = %agent_id, "Replacing existing subscription");
        }
        self.inner.roles.entry(role).or_default().push(agent);

        info!(agent_id = %agent_id, role = %role, "Agent subscribed to message bus");
    }

    /// Remove an agent from both directories. Unknown ids are a no-op.
    pub fn unsubscribe(&self, agent_id: &str) -> bool {
        let _guard = self.inner.mutation.lock().unwrap_or_else(PoisonError::into_inner);
        match self.inner.agents.remove(agent_id) {
            Some((_, handle)) => {
                self.remove_from_role(handle.role(), agent_id);
                info!(agent_id = %agent_id, "Agent unsubscribed from message bus");
                true
            }
            None => {
                debug!(agent_id = %agent_id, "Unsubscribe for unknown agent ignored");
                false
            }
        }
    }

    /// Route a message and return how many inboxes it reached.
    ///
    /// Direct messages to unknown ids are logged and dropped. Fan-out follows
    /// role-list insertion order and a failed delivery never stops the rest.
    pub fn publish(&self, message: Message) -> usize {
        self.inner.published.fetch_add(1, Ordering::Relaxed);

        // Snapshot recipients so no directory lock is held while delivering.
        let recipients: Vec<AgentHandle> = match message.recipient() {
            Recipient::Agent(agent_id) => match self.inner.agents.get(agent_id) {
                Some(entry) => vec![entry.value().clone()],
                None => {
                    warn!(
                        recipient_id = %agent_id,
                        message_id = %message.id(),
                        message_type = %message.message_type(),
                        "Recipient agent not found; dropping message"
                    );
                    self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                    return 0;
                }
            },
            Recipient::Role(role) => self
                .inner
                .roles
                .get(role)
                .map(|entry| entry.value().clone())
                .unwrap_or_default(),
            Recipient::Broadcast => self
                .inner
                .agents
                .iter()
                .map(|entry| entry.value().clone())
                .collect(),
        };

        if recipients.is_empty() {
            debug!(message_id = %message.id(), recipient = ?message.recipient(), "No subscribers for message");
            return 0;
        }

        let mut delivered = 0;
        for handle in &recipients {
            match handle.receive_message(message.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(agent_id = %handle.id(), message_id = %message.id(), error = %e, "Delivery failed");
                    self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        self.inner
            .delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);

        debug!(
            message_id = %message.id(),
            message_type = %message.message_type(),
            delivered,
            "Published message"
        );
        delivered
    }

    pub fn is_subscribed(&self, agent_id: &str) -> bool {
        self.inner.agents.contains_key(agent_id)
    }

    /// Ids subscribed under `role`, in role-list order
    pub fn agents_in_role(&self, role: AgentRole) -> Vec<AgentId> {
        self.inner
            .roles
            .get(&role)
            .map(|entry| entry.value().iter().map(|h| h.id().to_string()).collect())
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.agents.len()
    }

    pub fn stats(&self) -> BusStats {
        BusStats {
            total_published: self.inner.published.load(Ordering::Relaxed),
            total_delivered: self.inner.delivered.load(Ordering::Relaxed),
            dropped_deliveries: self.inner.dropped.load(Ordering::Relaxed),
            subscribed_agents: self.inner.agents.len(),
        }
    }

    fn remove_from_role(&self, role: AgentRole, agent_id: &str) {
        if let Some(mut list) = self.inner.roles.get_mut(&role) {
            list.retain(|handle| handle.id() != agent_id);
        }
    }
}
