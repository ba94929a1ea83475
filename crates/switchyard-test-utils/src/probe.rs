use std::time::Duration;
use switchyard_core::{AgentHandle, AgentId, AgentRole, Message, MessageBus};
use tokio::sync::mpsc;

/// A bus subscriber whose inbox the test reads directly
#[derive(Debug)]
pub struct MailboxProbe {
    handle: AgentHandle,
    inbox: mpsc::UnboundedReceiver<Message>,
}

impl MailboxProbe {
    pub fn new(id: impl Into<AgentId>, role: AgentRole) -> Self {
        let (sender, inbox) = mpsc::unbounded_channel();
        Self {
            handle: AgentHandle::new(id, role, sender),
            inbox,
        }
    }

    /// Create a probe and subscribe it to `bus`
    pub fn subscribed(bus: &MessageBus, id: impl Into<AgentId>, role: AgentRole) -> Self {
        let probe = Self::new(id, role);
        bus.subscribe(probe.handle());
        probe
    }

    pub fn handle(&self) -> AgentHandle {
        self.handle.clone()
    }

    pub fn id(&self) -> &str {
        self.handle.id()
    }

    /// Everything delivered so far, oldest first
    pub fn drain(&mut self) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Ok(message) = self.inbox.try_recv() {
            messages.push(message);
        }
        messages
    }

    pub async fn next_within(&mut self, timeout: Duration) -> Option<Message> {
        tokio::time::timeout(timeout, self.inbox.recv()).await.ok().flatten()
    }

    /// True if nothing arrives within `window`
    pub async fn stays_empty(&mut self, window: Duration) -> bool {
        self.next_within(window).await.is_none()
    }
}
