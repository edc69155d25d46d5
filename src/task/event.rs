//! Lifecycle events and their observers.
//!
//! Events are fire-and-forget: a sink that fails or a broadcast channel with
//! no subscribers never affects task processing.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::{TaskId, TaskStatus};

/// What happened to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskEventKind {
    Submitted,
    Status,
    Decomposed,
    Aggregated,
    Completed,
    Failed,
}

/// An immutable lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub kind: TaskEventKind,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<TaskId>,
}

impl TaskEvent {
    pub fn new(task_id: TaskId, status: TaskStatus, kind: TaskEventKind) -> Self {
        Self {
            task_id,
            status,
            kind,
            timestamp: Utc::now(),
            message: None,
            parent_id: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_parent(mut self, parent_id: Option<TaskId>) -> Self {
        self.parent_id = parent_id;
        self
    }
}

/// An external observer of lifecycle events.
pub trait EventSink: Send + Sync {
    /// Deliver one event. Errors are logged and dropped by the caller.
    fn publish(&self, event: &TaskEvent) -> anyhow::Result<()>;
}

/// Sink that writes every event to the log.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn publish(&self, event: &TaskEvent) -> anyhow::Result<()> {
        tracing::info!(
            task_id = %event.task_id,
            status = %event.status,
            kind = ?event.kind,
            "{}",
            event.message.as_deref().unwrap_or("")
        );
        Ok(())
    }
}

/// Fan-out of events to a broadcast channel and registered sinks.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<TaskEvent>,
    sinks: Arc<RwLock<Vec<Arc<dyn EventSink>>>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            sinks: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Register an observer. Clones of this bus share the sink list.
    pub fn add_sink(&self, sink: Arc<dyn EventSink>) {
        match self.sinks.write() {
            Ok(mut sinks) => sinks.push(sink),
            Err(poisoned) => poisoned.into_inner().push(sink),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.sender.subscribe()
    }

    /// Publish to everyone. Never fails.
    pub fn publish(&self, event: TaskEvent) {
        let sinks = match self.sinks.read() {
            Ok(sinks) => sinks.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        for sink in &sinks {
            if let Err(e) = sink.publish(&event) {
                tracing::debug!("Event sink failed: {}", e);
            }
        }
        // No receivers is not an error worth reporting.
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
