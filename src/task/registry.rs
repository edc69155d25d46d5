//! Process-lifetime store of every task ever submitted.
//!
//! Tasks are never removed; the map grows with the total number of tasks
//! created. All reads hand out clones, all writes go through short closures
//! under the write lock.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use async_recursion::async_recursion;
use serde::Serialize;
use tokio::sync::RwLock;

use super::{Task, TaskError, TaskId, TaskStatus};

/// Task counts by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgressCounts {
    pub pending: usize,
    pub analyzing: usize,
    pub executing: usize,
    pub aggregating: usize,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

impl ProgressCounts {
    fn record(&mut self, status: TaskStatus) {
        self.total += 1;
        match status {
            TaskStatus::Pending => self.pending += 1,
            TaskStatus::Analyzing => self.analyzing += 1,
            TaskStatus::Executing => self.executing += 1,
            TaskStatus::Aggregating => self.aggregating += 1,
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::Failed => self.failed += 1,
        }
    }

    /// Completed + Failed.
    pub fn finished(&self) -> usize {
        self.completed + self.failed
    }
}

#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<RwLock<HashMap<TaskId, Task>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, task: Task) {
        self.tasks.write().await.insert(task.id(), task);
    }

    pub async fn get(&self, id: TaskId) -> Option<Task> {
        self.tasks.read().await.get(&id).cloned()
    }

    /// Mutate one task in place.
    pub async fn update<R>(
        &self,
        id: TaskId,
        f: impl FnOnce(&mut Task) -> R,
    ) -> Result<R, TaskError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks.get_mut(&id).ok_or(TaskError::NotFound(id))?;
        Ok(f(task))
    }

    /// Every registered task whose parent pointer is `id`.
    ///
    /// Follows the parent's child list, then appends registered tasks that
    /// point at `id` without being listed, oldest first.
    pub async fn children_of(&self, id: TaskId) -> Vec<Task> {
        let tasks = self.tasks.read().await;
        let listed: &[TaskId] = tasks.get(&id).map(|t| t.children()).unwrap_or_default();

        let mut children: Vec<Task> = listed
            .iter()
            .filter_map(|child| tasks.get(child))
            .filter(|t| t.parent_id() == Some(id))
            .cloned()
            .collect();

        let mut orphans: Vec<Task> = tasks
            .values()
            .filter(|t| t.parent_id() == Some(id) && !listed.contains(&t.id()))
            .cloned()
            .collect();
        orphans.sort_by_key(|t| t.created_at());
        children.extend(orphans);
        children
    }

    /// Number of parent hops from `id` to its root. A root has depth 0.
    pub async fn depth_of(&self, id: TaskId) -> usize {
        let tasks = self.tasks.read().await;
        let mut depth = 0;
        let mut current = tasks.get(&id).and_then(|t| t.parent_id());
        while let Some(parent) = current {
            depth += 1;
            if depth > tasks.len() {
                tracing::error!(task_id = %id, "Parent chain does not terminate");
                break;
            }
            current = tasks.get(&parent).and_then(|t| t.parent_id());
        }
        depth
    }

    /// Register children of `parent_id` and append them to its child list
    /// in one step.
    pub async fn attach_children(
        &self,
        parent_id: TaskId,
        children: Vec<Task>,
    ) -> Result<Vec<TaskId>, TaskError> {
        let mut tasks = self.tasks.write().await;
        let ids: Vec<TaskId> = children.iter().map(|c| c.id()).collect();
        let parent = tasks
            .get_mut(&parent_id)
            .ok_or(TaskError::NotFound(parent_id))?;
        for id in &ids {
            parent.add_child(*id);
        }
        for child in children {
            tasks.insert(child.id(), child);
        }
        Ok(ids)
    }

    /// Move `parent_id` to Aggregating and mark it queued if every
    /// registered child is Completed.
    ///
    /// Only Completed counts here: a single Failed child keeps the parent
    /// waiting. Returns `true` only for the caller that set the queued flag;
    /// while it stays set, further calls return `false`.
    pub async fn try_begin_aggregation(&self, parent_id: TaskId) -> bool {
        let mut tasks = self.tasks.write().await;

        let mut child_count = 0;
        let all_completed = tasks
            .values()
            .filter(|t| t.parent_id() == Some(parent_id))
            .inspect(|_| child_count += 1)
            .all(|t| t.status == TaskStatus::Completed);

        if child_count == 0 || !all_completed {
            return false;
        }

        match tasks.get_mut(&parent_id) {
            Some(parent) if !parent.metadata.aggregation_queued => {
                parent.status = TaskStatus::Aggregating;
                parent.metadata.aggregation_queued = true;
                true
            }
            _ => false,
        }
    }

    /// Clear the queued flag of a task taken off the queue for aggregation,
    /// so the next completing child can queue it again.
    pub async fn take_aggregation(&self, id: TaskId) -> Result<Task, TaskError> {
        self.update(id, |t| {
            t.metadata.aggregation_queued = false;
            t.clone()
        })
        .await
    }

    pub async fn progress(&self) -> ProgressCounts {
        let tasks = self.tasks.read().await;
        let mut counts = ProgressCounts::default();
        for task in tasks.values() {
            counts.record(task.status);
        }
        counts
    }

    /// Render a task and all registered descendants as an indented text report.
    pub async fn render_report(&self, id: TaskId) -> Option<String> {
        let root = self.get(id).await?;
        let mut out = String::new();
        self.render_node(root, 0, &mut out).await;
        Some(out)
    }

    #[async_recursion]
    async fn render_node(&self, task: Task, level: usize, out: &mut String) {
        let indent = "  ".repeat(level);
        let _ = writeln!(
            out,
            "{indent}- [{}] {} (priority {})",
            task.status, task.description, task.priority
        );

        if let Some(result) = &task.result {
            let _ = writeln!(out, "{indent}  confidence: {:.2}", result.confidence);
            for line in result.content.lines() {
                let _ = writeln!(out, "{indent}  > {line}");
            }
            if !result.sources.is_empty() {
                let _ = writeln!(out, "{indent}  sources: {}", result.sources.join(", "));
            }
        }

        for child in self.children_of(task.id()).await {
            self.render_node(child, level + 1, out).await;
        }
    }
}
