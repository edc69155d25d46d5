//! Core Task type, its lifecycle states, and typed metadata.
//!
//! # Invariants
//! - `id` is unique for the lifetime of the process
//! - `children` only ever grows; child ids are appended in creation order
//! - `parent_id` is set at creation and never changes

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::TaskResult;

/// Unique identifier for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Create a new unique task ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Status of a task in its lifecycle.
///
/// # State Machine
/// ```text
/// Pending -> Analyzing -> Executing -> Completed
///                 |            \-----> Failed
///                 \-> Pending (decomposed, awaiting children)
///                        \-> Aggregating -> Completed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Analyzing,
    Executing,
    /// Parent-only: all children done, result being synthesized
    Aggregating,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Completed or Failed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub const ALL: [TaskStatus; 6] = [
        TaskStatus::Pending,
        TaskStatus::Analyzing,
        TaskStatus::Executing,
        TaskStatus::Aggregating,
        TaskStatus::Completed,
        TaskStatus::Failed,
    ];
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TaskStatus::Pending => "Pending",
            TaskStatus::Analyzing => "Analyzing",
            TaskStatus::Executing => "Executing",
            TaskStatus::Aggregating => "Aggregating",
            TaskStatus::Completed => "Completed",
            TaskStatus::Failed => "Failed",
        };
        f.write_str(label)
    }
}

/// The oracle's verdict on whether a task needs decomposition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ComplexityAnalysis {
    /// True if the task should be split into independent subtasks
    pub requires_decomposition: bool,
    /// Brief explanation of the verdict
    #[serde(default)]
    pub reasoning: String,
}

/// The oracle's judgment on a completed result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct QualityAssessment {
    /// True if the result leaves important questions open
    pub needs_more_research: bool,
    #[serde(default)]
    pub reasoning: String,
    /// Named gaps that follow-up research should cover
    #[serde(default)]
    pub gaps: Vec<String>,
}

/// Side-channel data written by pipeline stages.
///
/// Each known channel has its own typed slot; `extensions` is kept for
/// data that has no slot yet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskMetadata {
    pub complexity: Option<ComplexityAnalysis>,
    /// Sub-descriptions produced by the last decomposition
    pub decomposition: Option<Vec<String>>,
    pub quality: Option<QualityAssessment>,
    /// Number of times execution declined this task
    pub execution_attempts: u32,
    /// Skip analysis and the atomicity check on the next pass
    pub force_execute: bool,
    /// Cooperative cancellation flag, checked when processing starts
    pub cancelled: bool,
    /// Set while the task sits in the queue for aggregation; cleared on dequeue
    #[serde(default)]
    pub aggregation_queued: bool,
    #[serde(default)]
    pub extensions: HashMap<String, serde_json::Value>,
}

/// A unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    pub description: String,
    pub status: TaskStatus,
    /// Stored and reported; has no effect on scheduling order.
    pub priority: i32,
    parent_id: Option<TaskId>,
    children: Vec<TaskId>,
    pub result: Option<TaskResult>,
    pub metadata: TaskMetadata,
    created_at: DateTime<Utc>,
}

impl Task {
    /// Create a new root task.
    ///
    /// # Postconditions
    /// - `status == Pending`, no parent, no children, no result
    pub fn new(description: impl Into<String>, priority: i32) -> Self {
        Self {
            id: TaskId::new(),
            description: description.into(),
            status: TaskStatus::Pending,
            priority,
            parent_id: None,
            children: Vec::new(),
            result: None,
            metadata: TaskMetadata::default(),
            created_at: Utc::now(),
        }
    }

    /// Create a child task. Inherits the parent's priority.
    pub fn new_child(description: impl Into<String>, parent: &Task) -> Self {
        let mut task = Self::new(description, parent.priority);
        task.parent_id = Some(parent.id);
        task
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn parent_id(&self) -> Option<TaskId> {
        self.parent_id
    }

    pub fn children(&self) -> &[TaskId] {
        &self.children
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn add_child(&mut self, child: TaskId) {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }

    /// Record a successful result and mark the task Completed.
    pub fn complete(&mut self, result: TaskResult) {
        self.result = Some(result);
        self.status = TaskStatus::Completed;
    }

    /// Mark the task Failed with the message as result content and zero confidence.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.result = Some(TaskResult::failure(message));
        self.status = TaskStatus::Failed;
    }

    /// Reset to Pending for another independent run.
    ///
    /// Clears the result, the attempt counter, and the force/cancel flags.
    /// Children from earlier runs stay attached.
    pub fn reset(&mut self) {
        self.status = TaskStatus::Pending;
        self.result = None;
        self.metadata.execution_attempts = 0;
        self.metadata.force_execute = false;
        self.metadata.cancelled = false;
    }
}

/// Errors from task lookups and mutations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TaskError {
    #[error("Task not found: {0}")]
    NotFound(TaskId),

    #[error("Task description cannot be empty")]
    EmptyDescription,
}
