//! Merge: fold similar pending tasks into one unified description.

use async_trait::async_trait;

use crate::agents::{prompts, Agent, AgentContext, AgentOutcome, UnifiedTask};
use crate::task::Task;

pub struct Merger;

#[async_trait]
impl Agent for Merger {
    /// The unified description
    type Output = String;

    fn name(&self) -> &'static str {
        "merge"
    }

    async fn run(&self, task: &Task, ctx: &AgentContext) -> anyhow::Result<AgentOutcome<String>> {
        let similar = ctx.similarity.find_similar(task, &ctx.registry).await;
        if similar.is_empty() {
            return Ok(AgentOutcome::declined("no similar tasks"));
        }

        tracing::debug!(task_id = %task.id(), similar = similar.len(), "Merging similar tasks");
        let unified: UnifiedTask = ctx
            .structured
            .request(&prompts::merge(task, &similar))
            .await?;

        let description = unified.unified_description.trim();
        if description.is_empty() {
            return Ok(AgentOutcome::declined("empty unified description"));
        }
        Ok(AgentOutcome::Done(description.to_string()))
    }
}
