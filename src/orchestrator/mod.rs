//! Orchestrator - drains the work queue and drives tasks through the pipeline.
//!
//! A fixed pool of workers pulls task ids from one FIFO queue. Workers start
//! lazily on the first submission. Every task is processed end to end by
//! whichever worker dequeued it; errors and panics become a Failed task and
//! never take the worker down.

mod worker;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::agents::AgentContext;
use crate::config::Config;
use crate::llm::LlmClient;
use crate::structured::{StructuredCaller, StructuredConfig};
use crate::task::{
    EventBus, EventSink, ProgressCounts, Task, TaskError, TaskEvent, TaskEventKind, TaskId,
    TaskRegistry,
};

use worker::Inner;
pub use worker::CANCELLED_MESSAGE;

/// Scheduling and escalation settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Worker-pool size, fixed for the lifetime of the orchestrator
    pub max_concurrency: usize,
    /// Initial decomposition depth limit
    pub max_depth: usize,
    /// Declines after which execution is forced
    pub escalate_after_attempts: u32,
    /// Declines after which the task fails outright
    pub max_execution_attempts: u32,
    /// Review results at or past the depth limit too. Turning this off
    /// bounds follow-up chains at the limit.
    pub assess_at_depth_limit: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            max_depth: 3,
            escalate_after_attempts: 1,
            max_execution_attempts: 3,
            assess_at_depth_limit: true,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_concurrency: config.max_concurrency,
            max_depth: config.max_depth,
            ..Self::default()
        }
    }
}

/// Handle to a running orchestrator. Cheap to clone.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    /// Orchestrator with default rules and no similarity lookup.
    pub fn new(llm: Arc<dyn LlmClient>, config: &Config) -> Self {
        let structured = StructuredCaller::new(llm, StructuredConfig::from_config(config));
        let ctx = AgentContext::new(Arc::new(structured), TaskRegistry::new());
        Self::with_context(ctx, OrchestratorConfig::from_config(config))
    }

    pub fn with_context(ctx: AgentContext, config: OrchestratorConfig) -> Self {
        Self {
            inner: Arc::new(Inner::new(ctx, config, EventBus::default())),
        }
    }

    /// Create a root task and queue it.
    pub async fn submit(
        &self,
        description: impl Into<String>,
        priority: i32,
    ) -> Result<TaskId, TaskError> {
        let description = description.into();
        if description.trim().is_empty() {
            return Err(TaskError::EmptyDescription);
        }

        let task = Task::new(description.trim(), priority);
        let id = task.id();
        self.inner.registry.insert(task.clone()).await;
        tracing::info!(task_id = %id, priority, "Task submitted");
        self.inner.emit(&task, TaskEventKind::Submitted, None);
        self.inner.enqueue(id);
        self.inner.ensure_started();
        Ok(id)
    }

    /// Flag a task as cancelled. Takes effect the next time it is dequeued.
    pub async fn cancel(&self, id: TaskId) -> Result<(), TaskError> {
        self.inner
            .registry
            .update(id, |t| t.metadata.cancelled = true)
            .await?;
        tracing::info!(task_id = %id, "Task cancellation requested");
        Ok(())
    }

    /// Reset a task to Pending and run it again from scratch.
    pub async fn retry(&self, id: TaskId) -> Result<(), TaskError> {
        let task = self
            .inner
            .registry
            .update(id, |t| {
                t.reset();
                t.clone()
            })
            .await?;
        tracing::info!(task_id = %id, "Task retry requested");
        self.inner
            .emit(&task, TaskEventKind::Status, Some("retry".to_string()));
        self.inner.enqueue(id);
        self.inner.ensure_started();
        Ok(())
    }

    /// Skip analysis and execute the task directly, whatever its state.
    pub async fn force_execute(&self, id: TaskId) -> Result<(), TaskError> {
        self.inner
            .registry
            .update(id, |t| t.metadata.force_execute = true)
            .await?;
        tracing::info!(task_id = %id, "Forced execution requested");
        self.inner.enqueue(id);
        self.inner.ensure_started();
        Ok(())
    }

    /// Change the depth limit for tasks dequeued from now on.
    pub fn set_max_depth(&self, depth: usize) {
        self.inner.max_depth.store(depth, Ordering::Relaxed);
    }

    pub fn max_depth(&self) -> usize {
        self.inner.max_depth.load(Ordering::Relaxed)
    }

    /// Toggle verbatim prompt/reply logging.
    pub fn set_log_prompts(&self, enabled: bool) {
        self.inner.ctx.structured.set_log_prompts(enabled);
    }

    pub async fn task(&self, id: TaskId) -> Option<Task> {
        self.inner.registry.get(id).await
    }

    pub async fn children(&self, id: TaskId) -> Vec<Task> {
        self.inner.registry.children_of(id).await
    }

    pub async fn progress(&self) -> ProgressCounts {
        self.inner.registry.progress().await
    }

    /// Text report of a task and all its registered descendants.
    pub async fn report(&self, id: TaskId) -> Option<String> {
        self.inner.registry.render_report(id).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.inner.events.subscribe()
    }

    pub fn add_sink(&self, sink: Arc<dyn EventSink>) {
        self.inner.events.add_sink(sink);
    }

    /// Poll until the task reaches Completed or Failed.
    pub async fn wait_for(&self, id: TaskId, poll: Duration) -> Result<Task, TaskError> {
        loop {
            let task = self
                .inner
                .registry
                .get(id)
                .await
                .ok_or(TaskError::NotFound(id))?;
            if task.status.is_terminal() {
                return Ok(task);
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Poll until nothing is queued or being processed.
    pub async fn wait_idle(&self, poll: Duration) {
        while self.inner.active.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(poll).await;
        }
    }

    /// Stop the workers after their current task. Queued tasks stay queued.
    pub fn shutdown(&self) {
        tracing::info!("Orchestrator shutting down");
        self.inner.shutdown.cancel();
    }
}
