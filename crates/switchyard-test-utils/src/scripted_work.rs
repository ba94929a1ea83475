use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use switchyard_core::{payload, Payload, RoleWork};

#[derive(Debug, Clone)]
pub enum WorkBehavior {
    /// Return the summary
    Succeed(Payload),
    /// Return an error with this text
    Fail(String),
    /// Panic with this text
    Panic(String),
    /// Never finish
    Hang,
}

/// [`RoleWork`] that behaves as scripted and counts its invocations
#[derive(Debug)]
pub struct ScriptedWork {
    task: String,
    behavior: WorkBehavior,
    calls: AtomicUsize,
}

impl ScriptedWork {
    pub fn new(task: impl Into<String>, behavior: WorkBehavior) -> Self {
        Self {
            task: task.into(),
            behavior,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn succeeding(task: impl Into<String>) -> Self {
        Self::new(task, WorkBehavior::Succeed(payload(json!({"scripted": true}))))
    }

    pub fn failing(task: impl Into<String>, error: impl Into<String>) -> Self {
        Self::new(task, WorkBehavior::Fail(error.into()))
    }

    pub fn panicking(task: impl Into<String>) -> Self {
        Self::new(task, WorkBehavior::Panic("scripted panic".into()))
    }

    pub fn hanging(task: impl Into<String>) -> Self {
        Self::new(task, WorkBehavior::Hang)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RoleWork for ScriptedWork {
    fn task_name(&self) -> &str {
        &self.task
    }

    fn status_request(&self) -> &str {
        "scripted_status"
    }

    async fn perform(&self, _assignment: &Payload) -> anyhow::Result<Payload> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            WorkBehavior::Succeed(summary) => Ok(summary.clone()),
            WorkBehavior::Fail(error) => Err(anyhow::anyhow!("{error}")),
            WorkBehavior::Panic(text) => panic!("{text}"),
            WorkBehavior::Hang => std::future::pending().await,
        }
    }

    fn status(&self) -> Payload {
        payload(json!({"calls": self.calls()}))
    }
}
