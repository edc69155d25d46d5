//! Worker pool and the per-task state machine.
//!
//! # Per-task flow
//! ```text
//! cancelled?             -> Failed
//! Aggregating?           -> Aggregate -> Completed -> trigger grandparent
//! depth < max, !forced   -> Analyzing -> Analyze -> children? -> Pending (wait)
//!                                          \-> Merge
//! depth >= max           -> force flag
//! Executing -> Execute -> Completed -> trigger parent -> Assess -> follow-ups
//!                  \-> declined -> escalate (force) | re-analyze | Failed
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Context as _;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use super::OrchestratorConfig;
use crate::agents::{
    Agent, AgentContext, AgentOutcome, Aggregator, Analyzer, Assessor, Executor, Merger,
};
use crate::task::{
    EventBus, Task, TaskEvent, TaskEventKind, TaskId, TaskQueue, TaskRegistry, TaskResult,
    TaskStatus,
};

pub const CANCELLED_MESSAGE: &str = "Task was cancelled";

/// State shared by the public handle and every worker.
pub(super) struct Inner {
    pub(super) registry: TaskRegistry,
    pub(super) queue: TaskQueue,
    pub(super) events: EventBus,
    pub(super) ctx: AgentContext,
    pub(super) config: OrchestratorConfig,
    pub(super) max_depth: AtomicUsize,
    /// Tasks queued or being processed
    pub(super) active: AtomicUsize,
    started: AtomicBool,
    pub(super) shutdown: CancellationToken,
}

impl Inner {
    pub(super) fn new(ctx: AgentContext, config: OrchestratorConfig, events: EventBus) -> Self {
        Self {
            registry: ctx.registry.clone(),
            queue: TaskQueue::new(),
            events,
            max_depth: AtomicUsize::new(config.max_depth),
            active: AtomicUsize::new(0),
            started: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            ctx,
            config,
        }
    }

    /// Spawn the worker pool the first time it is needed.
    pub(super) fn ensure_started(self: &Arc<Self>) {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let workers = self.config.max_concurrency.max(1);
        tracing::info!(workers, "Starting worker pool");
        for worker in 0..workers {
            let inner = Arc::clone(self);
            tokio::spawn(async move { inner.run_worker(worker).await });
        }
    }

    pub(super) fn enqueue(&self, id: TaskId) {
        self.active.fetch_add(1, Ordering::SeqCst);
        self.queue.push(id);
    }

    pub(super) fn emit(&self, task: &Task, kind: TaskEventKind, message: Option<String>) {
        let mut event = TaskEvent::new(task.id(), task.status, kind).with_parent(task.parent_id());
        if let Some(message) = message {
            event = event.with_message(message);
        }
        self.events.publish(event);
    }

    async fn run_worker(self: Arc<Self>, worker: usize) {
        tracing::debug!(worker, "Worker started");
        loop {
            let id = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                next = self.queue.pop() => match next {
                    Some(id) => id,
                    None => break,
                },
            };

            let outcome = AssertUnwindSafe(self.process(id)).catch_unwind().await;
            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(format!("{e:#}")),
                Err(panic) => Some(panic_message(panic.as_ref())),
            };
            if let Some(message) = failure {
                tracing::error!(task_id = %id, worker, "Task failed: {}", message);
                self.fail_task(id, message).await;
            }
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
        tracing::debug!(worker, "Worker stopped");
    }

    async fn fail_task(&self, id: TaskId, message: String) {
        let event_message = message.clone();
        match self
            .registry
            .update(id, move |t| {
                t.fail(message);
                t.clone()
            })
            .await
        {
            Ok(task) => self.emit(&task, TaskEventKind::Failed, Some(event_message)),
            Err(e) => tracing::warn!("Could not record failure: {}", e),
        }
    }

    async fn set_status(&self, id: TaskId, status: TaskStatus) -> anyhow::Result<Task> {
        let task = self
            .registry
            .update(id, |t| {
                t.status = status;
                t.clone()
            })
            .await?;
        self.emit(&task, TaskEventKind::Status, None);
        Ok(task)
    }

    /// Drive one dequeued task as far as it can go.
    async fn process(&self, id: TaskId) -> anyhow::Result<()> {
        let Some(mut task) = self.registry.get(id).await else {
            tracing::warn!(task_id = %id, "Dequeued unknown task");
            return Ok(());
        };

        if task.metadata.cancelled {
            self.fail_task(id, CANCELLED_MESSAGE.to_string()).await;
            return Ok(());
        }

        if task.status == TaskStatus::Aggregating {
            let task = self.registry.take_aggregation(id).await?;
            return self.aggregate(&task).await;
        }

        let depth = self.registry.depth_of(id).await;
        let max_depth = self.max_depth.load(Ordering::Relaxed);
        tracing::debug!(task_id = %id, depth, max_depth, "Processing task");

        // A forced task skips analysis at any depth.
        if !task.metadata.force_execute {
            if depth < max_depth {
                task = self.set_status(id, TaskStatus::Analyzing).await?;
                if self.analyze(&task).await? {
                    return Ok(());
                }
                task = self.merge(task).await?;
            } else {
                task = self
                    .registry
                    .update(id, |t| {
                        t.metadata.force_execute = true;
                        t.clone()
                    })
                    .await?;
            }
        }

        self.execute(task, depth).await
    }

    /// Run one pipeline stage for `task`, tagging failures with the stage name.
    async fn run_stage<A: Agent>(
        &self,
        agent: &A,
        task: &Task,
    ) -> anyhow::Result<AgentOutcome<A::Output>> {
        tracing::debug!(task_id = %task.id(), stage = agent.name(), "Running stage");
        agent
            .run(task, &self.ctx)
            .await
            .with_context(|| format!("{} stage failed", agent.name()))
    }

    /// Returns `true` when the task was decomposed and now waits on children.
    async fn analyze(&self, task: &Task) -> anyhow::Result<bool> {
        let Some(analysis) = self.run_stage(&Analyzer, task).await?.done() else {
            return Ok(false);
        };

        let complexity = analysis.complexity.clone();
        let subtasks = analysis.subtasks.clone();
        self.registry
            .update(task.id(), move |t| {
                t.metadata.complexity = Some(complexity);
                if !subtasks.is_empty() {
                    t.metadata.decomposition = Some(subtasks);
                }
            })
            .await?;

        if analysis.subtasks.is_empty() {
            return Ok(false);
        }

        let count = analysis.subtasks.len();
        let children = self.register_children(task, analysis.subtasks).await?;
        // The parent must be waiting before any child can finish and
        // trigger its aggregation.
        let parent = self.set_status(task.id(), TaskStatus::Pending).await?;
        tracing::info!(task_id = %task.id(), subtasks = count, "Task decomposed");
        self.emit(
            &parent,
            TaskEventKind::Decomposed,
            Some(format!("{count} subtasks")),
        );
        self.dispatch(&children);
        Ok(true)
    }

    async fn register_children(
        &self,
        parent: &Task,
        descriptions: Vec<String>,
    ) -> anyhow::Result<Vec<Task>> {
        let children: Vec<Task> = descriptions
            .into_iter()
            .map(|d| Task::new_child(d, parent))
            .collect();
        self.registry
            .attach_children(parent.id(), children.clone())
            .await?;
        Ok(children)
    }

    /// Announce and enqueue freshly registered tasks.
    fn dispatch(&self, tasks: &[Task]) {
        for task in tasks {
            self.emit(task, TaskEventKind::Submitted, None);
            self.enqueue(task.id());
        }
    }

    async fn merge(&self, task: Task) -> anyhow::Result<Task> {
        match self.run_stage(&Merger, &task).await? {
            AgentOutcome::Done(description) => {
                tracing::info!(task_id = %task.id(), "Adopting merged description");
                Ok(self
                    .registry
                    .update(task.id(), move |t| {
                        t.description = description;
                        t.clone()
                    })
                    .await?)
            }
            AgentOutcome::Declined(_) => Ok(task),
        }
    }

    async fn execute(&self, task: Task, depth: usize) -> anyhow::Result<()> {
        let id = task.id();
        let task = self.set_status(id, TaskStatus::Executing).await?;

        let reason = match self.run_stage(&Executor, &task).await? {
            AgentOutcome::Done(result) => return self.complete_executed(id, result, depth).await,
            AgentOutcome::Declined(reason) => reason,
        };

        let attempts = self
            .registry
            .update(id, |t| {
                t.metadata.execution_attempts += 1;
                t.metadata.execution_attempts
            })
            .await?;
        let max_depth = self.max_depth.load(Ordering::Relaxed);
        tracing::debug!(task_id = %id, attempts, "Execution declined: {}", reason);

        if depth >= max_depth || attempts >= self.config.escalate_after_attempts {
            let forced = self
                .registry
                .update(id, |t| {
                    t.metadata.force_execute = true;
                    t.clone()
                })
                .await?;
            match self.run_stage(&Executor, &forced).await? {
                AgentOutcome::Done(result) => self.complete_executed(id, result, depth).await,
                AgentOutcome::Declined(reason) => {
                    self.fail_task(id, reason).await;
                    Ok(())
                }
            }
        } else if attempts >= self.config.max_execution_attempts {
            self.fail_task(
                id,
                format!("Execution declined {attempts} times: {reason}"),
            )
            .await;
            Ok(())
        } else {
            self.set_status(id, TaskStatus::Analyzing).await?;
            self.enqueue(id);
            Ok(())
        }
    }

    async fn complete_executed(
        &self,
        id: TaskId,
        result: TaskResult,
        depth: usize,
    ) -> anyhow::Result<()> {
        let task = self
            .registry
            .update(id, move |t| {
                t.complete(result);
                t.clone()
            })
            .await?;
        tracing::info!(task_id = %id, depth, "Task completed");
        self.emit(&task, TaskEventKind::Completed, None);
        self.trigger_aggregation(task.parent_id()).await;

        let at_limit = depth >= self.max_depth.load(Ordering::Relaxed);
        if at_limit && !self.config.assess_at_depth_limit {
            return Ok(());
        }
        // The answer stands even if the review fails.
        if let Err(e) = self.assess(&task).await {
            tracing::warn!(task_id = %id, "Assessment failed: {:#}", e);
        }
        Ok(())
    }

    async fn assess(&self, task: &Task) -> anyhow::Result<()> {
        let Some(assessment) = self.run_stage(&Assessor, task).await?.done() else {
            return Ok(());
        };
        let quality = assessment.quality.clone();
        self.registry
            .update(task.id(), move |t| t.metadata.quality = Some(quality))
            .await?;

        if !assessment.follow_ups.is_empty() {
            tracing::info!(
                task_id = %task.id(),
                follow_ups = assessment.follow_ups.len(),
                "Scheduling follow-up research"
            );
            let children = self.register_children(task, assessment.follow_ups).await?;
            self.dispatch(&children);
        }
        Ok(())
    }

    async fn aggregate(&self, task: &Task) -> anyhow::Result<()> {
        match self.run_stage(&Aggregator, task).await? {
            AgentOutcome::Done(result) => {
                let id = task.id();
                let task = self
                    .registry
                    .update(id, move |t| {
                        t.complete(result);
                        t.clone()
                    })
                    .await?;
                tracing::info!(task_id = %id, "Task aggregated");
                self.emit(&task, TaskEventKind::Aggregated, None);
                self.emit(&task, TaskEventKind::Completed, None);
                self.trigger_aggregation(task.parent_id()).await;
            }
            AgentOutcome::Declined(reason) => {
                // Stays Aggregating; the next completing child queues it again.
                tracing::warn!(task_id = %task.id(), "Aggregation declined: {}", reason);
            }
        }
        Ok(())
    }

    /// Queue `parent` for aggregation once every registered child is Completed.
    async fn trigger_aggregation(&self, parent: Option<TaskId>) {
        let Some(parent) = parent else { return };
        if self.registry.try_begin_aggregation(parent).await {
            if let Some(task) = self.registry.get(parent).await {
                self.emit(&task, TaskEventKind::Status, None);
            }
            self.enqueue(parent);
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic: unknown payload".to_string()
    }
}
