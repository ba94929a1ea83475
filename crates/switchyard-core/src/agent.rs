//! Agent runtime: inbox, per-type handler registry and the receive/dispatch/reply loop

use crate::bus::MessageBus;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use switchyard_types::{AgentId, AgentRole, Message, MessageType};
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, warn};

/// Outcome of a handler: an optional reply, or a failure that the agent logs and swallows
pub type HandlerResult = Result<Option<Message>, HandlerError>;

/// Errors a message handler may report
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("handler failed: {0}")]
    Failed(String),
    #[error("work failed: {0}")]
    Work(#[from] anyhow::Error),
}

/// Errors from the agent lifecycle
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("run loop of agent {0} was already started")]
    AlreadyStarted(AgentId),
    #[error("inbox of agent {0} is closed")]
    InboxClosed(AgentId),
}

/// Handler invoked for every inbox message of the type it is registered under
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &Message) -> HandlerResult;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, message: &Message) -> HandlerResult {
        (self.0)(message.clone()).await
    }
}

/// Wrap an async closure as a [`MessageHandler`]
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn MessageHandler>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Cheap addressable reference to an agent's inbox.
///
/// This is what the bus stores: it can deliver to the agent but does not own it.
#[derive(Debug, Clone)]
pub struct AgentHandle {
    id: AgentId,
    role: AgentRole,
    inbox: mpsc::UnboundedSender<Message>,
}

impl AgentHandle {
    pub fn new(id: impl Into<AgentId>, role: AgentRole, inbox: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            id: id.into(),
            role,
            inbox,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }

    /// Enqueue a message. Never blocks; fails only once the inbox receiver is gone.
    pub fn receive_message(&self, message: Message) -> Result<(), AgentError> {
        self.inbox
            .send(message)
            .map_err(|_| AgentError::InboxClosed(self.id.clone()))
    }
}

/// A unit of concurrent execution with a role, an inbox and message handlers
pub struct Agent {
    handle: AgentHandle,
    handlers: DashMap<MessageType, Arc<dyn MessageHandler>>,
    inbox: Mutex<mpsc::UnboundedReceiver<Message>>,
    bus: MessageBus,
    started: AtomicBool,
    running: AtomicBool,
    stop_signal: watch::Sender<bool>,
}

impl Agent {
    /// Create an agent with an empty handler table, bound to `bus` for outgoing messages
    pub fn new(id: impl Into<AgentId>, role: AgentRole, bus: MessageBus) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (stop_signal, _) = watch::channel(false);
        Self {
            handle: AgentHandle::new(id, role, sender),
            handlers: DashMap::new(),
            inbox: Mutex::new(receiver),
            bus,
            started: AtomicBool::new(false),
            running: AtomicBool::new(false),
            stop_signal,
        }
    }

    pub fn id(&self) -> &str {
        self.handle.id()
    }

    pub fn role(&self) -> AgentRole {
        self.handle.role()
    }

    /// Bus-facing handle for this agent
    pub fn handle(&self) -> AgentHandle {
        self.handle.clone()
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    /// Register `handler` for `message_type`, replacing any previous one
    pub fn register_handler(&self, message_type: MessageType, handler: Arc<dyn MessageHandler>) {
        if self.handlers.insert(message_type, handler).is_some() {
            debug!(agent_id = %self.id(), %message_type, "Replaced message handler");
        }
    }

    pub fn has_handler(&self, message_type: MessageType) -> bool {
        self.handlers.contains_key(&message_type)
    }

    /// Enqueue a message into the inbox.
    ///
    /// Still accepted after `stop()`; such messages are never processed.
    pub fn receive_message(&self, message: Message) -> Result<(), AgentError> {
        self.handle.receive_message(message)
    }

    /// Dispatch to the handler registered for the message type.
    ///
    /// Unhandled types, handler errors and handler panics are logged and yield no reply.
    pub async fn handle_message(&self, message: &Message) -> Option<Message> {
        let handler = self
            .handlers
            .get(&message.message_type())
            .map(|entry| Arc::clone(entry.value()));

        let Some(handler) = handler else {
            warn!(
                agent_id = %self.id(),
                message_id = %message.id(),
                message_type = %message.message_type(),
                "No handler for message type"
            );
            return None;
        };

        match AssertUnwindSafe(handler.handle(message)).catch_unwind().await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                error!(
                    agent_id = %self.id(),
                    message_id = %message.id(),
                    message_type = %message.message_type(),
                    error = %e,
                    "Message handler failed"
                );
                None
            }
            Err(panic) => {
                error!(
                    agent_id = %self.id(),
                    message_id = %message.id(),
                    message_type = %message.message_type(),
                    panic = %panic_message(panic.as_ref()),
                    "Message handler panicked"
                );
                None
            }
        }
    }

    /// Hand a message to the bus. Returns the number of inboxes it reached.
    pub fn send_message(&self, message: Message) -> usize {
        self.bus.publish(message)
    }

    /// Request the run loop to exit. Takes effect even while the loop waits on an empty inbox.
    pub fn stop(&self) {
        if !self.stop_signal.send_replace(true) {
            debug!(agent_id = %self.id(), "Stop requested");
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop_signal.borrow()
    }

    /// Whether the run loop is currently active
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn has_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Mark the run loop as started. Returns false if it was already claimed.
    pub fn try_claim_start(&self) -> bool {
        !self.started.swap(true, Ordering::SeqCst)
    }

    /// Receive, dispatch and reply until `stop()` is observed.
    ///
    /// The inbox wait is the only suspension point besides the handlers themselves.
    /// Messages still queued when the loop exits are abandoned.
    pub async fn run(self: Arc<Self>) -> Result<(), AgentError> {
        if !self.try_claim_start() {
            return Err(AgentError::AlreadyStarted(self.id().to_string()));
        }
        self.run_claimed().await
    }

    /// Run loop body for a caller that already won [`Agent::try_claim_start`]
    pub(crate) async fn run_claimed(self: Arc<Self>) -> Result<(), AgentError> {
        // The receiver never leaves the mutex, so an aborted loop still leaves the inbox open.
        let mut inbox = self.inbox.lock().await;
        let mut stop = self.stop_signal.subscribe();
        let _running = RunningFlag::raise(&self.running);
        info!(agent_id = %self.id(), role = %self.role(), "Agent loop started");

        loop {
            let stopped = *stop.borrow_and_update();
            if stopped {
                break;
            }

            let message = tokio::select! {
                biased;
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                next = inbox.recv() => match next {
                    Some(message) => message,
                    None => break,
                },
            };

            if self.is_stopped() {
                debug!(agent_id = %self.id(), message_id = %message.id(), "Dropping message received after stop");
                break;
            }

            debug!(
                agent_id = %self.id(),
                message_id = %message.id(),
                message_type = %message.message_type(),
                "Processing message"
            );
            if let Some(reply) = self.handle_message(&message).await {
                self.send_message(reply);
            }
        }

        info!(agent_id = %self.id(), "Agent loop stopped");
        Ok(())
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id())
            .field("role", &self.role())
            .field("handlers", &self.handlers.iter().map(|e| *e.key()).collect::<Vec<_>>())
            .field("running", &self.is_running())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Keeps `running` true for the lifetime of a run loop, including when its task is aborted
struct RunningFlag<'a>(&'a AtomicBool);

impl<'a> RunningFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for RunningFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
