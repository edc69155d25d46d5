//! Execute: answer an atomic (or forced) task.
//!
//! # Algorithm
//! 1. Unless forced, ask whether the task is atomic; decline if not
//! 2. Ask for content with sources
//! 3. Ask separately for a quality score and completeness verdict
//! 4. Confidence is the clamped score; incomplete answers need more research

use async_trait::async_trait;
use serde_json::json;

use crate::agents::{
    prompts, Agent, AgentContext, AgentOutcome, AtomicityCheck, QualityScore, SourcedContent,
};
use crate::task::{Task, TaskResult};

pub struct Executor;

#[async_trait]
impl Agent for Executor {
    type Output = TaskResult;

    fn name(&self) -> &'static str {
        "execute"
    }

    async fn run(
        &self,
        task: &Task,
        ctx: &AgentContext,
    ) -> anyhow::Result<AgentOutcome<TaskResult>> {
        if !task.metadata.force_execute {
            let check: AtomicityCheck = ctx
                .structured
                .request(&prompts::atomicity(&task.description))
                .await?;
            if !check.is_atomic {
                return Ok(AgentOutcome::Declined(if check.reasoning.is_empty() {
                    "not atomic".to_string()
                } else {
                    check.reasoning
                }));
            }
        }

        let answer: SourcedContent = ctx
            .structured
            .request(&prompts::execute(&task.description))
            .await?;
        let quality: QualityScore = ctx
            .structured
            .request(&prompts::quality(&task.description, &answer.content))
            .await?;

        let result = TaskResult::new(answer.content, quality.score)
            .with_sources(answer.sources)
            .with_needs_more_research(!quality.is_complete)
            .with_metadata("quality_reasoning", json!(quality.reasoning))
            .with_metadata("forced", json!(task.metadata.force_execute));

        Ok(AgentOutcome::Done(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::context;
    use crate::llm::testing::ScriptedLlm;
    use std::sync::Arc;

    fn answering_llm() -> ScriptedLlm {
        ScriptedLlm::new()
            .on(
                "Answer this task directly",
                r#"{"content": "Paris", "sources": ["atlas"]}"#,
            )
            .on(
                "Score the quality",
                r#"{"score": 1.4, "is_complete": false, "reasoning": "brief"}"#,
            )
    }

    #[tokio::test]
    async fn test_atomic_task_executes() {
        let llm = Arc::new(answering_llm().on("is atomic", r#"{"is_atomic": true}"#));
        let task = Task::new("What is the capital of France?", 0);
        let result = Executor.run(&task, &context(llm)).await.unwrap().done().unwrap();

        assert_eq!(result.content, "Paris");
        assert_eq!(result.sources, vec!["atlas"]);
        assert_eq!(result.confidence, 1.0);
        assert!(result.needs_more_research);
    }

    #[tokio::test]
    async fn test_non_atomic_task_declines() {
        let llm = Arc::new(answering_llm().on(
            "is atomic",
            r#"{"is_atomic": false, "reasoning": "too broad"}"#,
        ));
        let task = Task::new("History of Europe", 0);
        let outcome = Executor.run(&task, &context(llm.clone())).await.unwrap();

        assert_eq!(outcome, AgentOutcome::Declined("too broad".to_string()));
        assert_eq!(llm.calls_matching("Answer this task directly"), 0);
    }

    #[tokio::test]
    async fn test_forced_task_skips_atomicity_check() {
        let llm = Arc::new(answering_llm());
        let mut task = Task::new("History of Europe", 0);
        task.metadata.force_execute = true;

        let outcome = Executor.run(&task, &context(llm.clone())).await.unwrap();
        assert!(outcome.is_done());
        assert_eq!(llm.calls_matching("is atomic"), 0);
    }
}
