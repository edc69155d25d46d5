//! Aggregate: synthesize finished children into the parent's result.
//!
//! Accepts children that are Completed or Failed. Only Completed children
//! feed the summary, the source fallback and the confidence mean.

use async_trait::async_trait;
use serde_json::json;

use crate::agents::{prompts, Agent, AgentContext, AgentOutcome, SourcedContent};
use crate::task::{dedupe_sources, Task, TaskResult, TaskStatus};

/// Characters of each child's content included in the summary block.
pub const SUMMARY_CHARS: usize = 800;

pub struct Aggregator;

#[async_trait]
impl Agent for Aggregator {
    type Output = TaskResult;

    fn name(&self) -> &'static str {
        "aggregate"
    }

    async fn run(
        &self,
        task: &Task,
        ctx: &AgentContext,
    ) -> anyhow::Result<AgentOutcome<TaskResult>> {
        let children = ctx.registry.children_of(task.id()).await;
        if children.is_empty() {
            return Ok(AgentOutcome::declined("no children"));
        }
        let unfinished = children.iter().filter(|c| !c.status.is_terminal()).count();
        if unfinished > 0 {
            return Ok(AgentOutcome::Declined(format!("{unfinished} children still running")));
        }

        let completed: Vec<&Task> = children
            .iter()
            .filter(|c| c.status == TaskStatus::Completed)
            .collect();

        // A parent that was executed before gaining follow-up children keeps
        // its earlier answer in the synthesis.
        let mut summaries = task
            .result
            .as_ref()
            .map(|r| summary_block(&format!("{} (earlier result)", task.description), &r.content))
            .unwrap_or_default();
        for child in &completed {
            if let Some(r) = &child.result {
                summaries.push_str(&summary_block(&child.description, &r.content));
            }
        }

        let report: SourcedContent = ctx
            .structured
            .request(&prompts::aggregate(&task.description, &summaries))
            .await?;

        let sources = if report.sources.is_empty() {
            dedupe_sources(
                completed
                    .iter()
                    .filter_map(|c| c.result.as_ref())
                    .flat_map(|r| r.sources.iter().cloned()),
            )
        } else {
            report.sources
        };

        let confidence = mean_confidence(&completed);
        let result = TaskResult::new(report.content, confidence)
            .with_sources(sources)
            .with_metadata("children_completed", json!(completed.len()))
            .with_metadata("children_failed", json!(children.len() - completed.len()));

        Ok(AgentOutcome::Done(result))
    }
}

fn summary_block(title: &str, content: &str) -> String {
    let excerpt: String = content.chars().take(SUMMARY_CHARS).collect();
    format!("### {title}\n{excerpt}\n\n")
}

/// Mean confidence of the given children; 0 when there are none.
fn mean_confidence(completed: &[&Task]) -> f64 {
    let scores: Vec<f64> = completed
        .iter()
        .map(|c| c.result.as_ref().map_or(0.0, |r| r.confidence))
        .collect();
    if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::context;
    use crate::llm::testing::ScriptedLlm;
    use std::sync::Arc;

    async fn parent_with_children(
        ctx: &AgentContext,
        children: Vec<(&str, Option<TaskResult>)>,
    ) -> Task {
        let parent = Task::new("Compare tides", 0);
        ctx.registry.insert(parent.clone()).await;
        for (description, result) in children {
            let mut child = Task::new_child(description, &parent);
            match result {
                Some(result) => child.complete(result),
                None => child.fail("oracle down"),
            }
            ctx.registry
                .attach_children(parent.id(), vec![child])
                .await
                .unwrap();
        }
        parent
    }

    #[tokio::test]
    async fn test_confidence_is_mean_of_completed_children() {
        let llm = Arc::new(ScriptedLlm::new().on(
            "Synthesize the subtask results",
            r#"{"content": "combined", "sources": []}"#,
        ));
        let ctx = context(llm.clone());
        let parent = parent_with_children(
            &ctx,
            vec![
                ("a", Some(TaskResult::new("alpha", 0.9).with_sources(vec!["s1".into(), "s2".into()]))),
                ("b", Some(TaskResult::new("beta", 0.5).with_sources(vec!["s2".into(), "s3".into()]))),
                ("c", None),
            ],
        )
        .await;

        let result = Aggregator.run(&parent, &ctx).await.unwrap().done().unwrap();
        assert!((result.confidence - 0.7).abs() < 1e-9);
        assert_eq!(result.sources, vec!["s1", "s2", "s3"]);
        assert_eq!(result.content, "combined");

        let prompt = &llm.prompts()[0];
        assert!(prompt.contains("### a\nalpha"));
        assert!(!prompt.contains("oracle down"));
    }

    #[tokio::test]
    async fn test_oracle_sources_win_when_present() {
        let llm = Arc::new(ScriptedLlm::new().on(
            "Synthesize the subtask results",
            r#"{"content": "combined", "sources": ["report source"]}"#,
        ));
        let ctx = context(llm);
        let parent = parent_with_children(
            &ctx,
            vec![("a", Some(TaskResult::new("alpha", 1.0).with_sources(vec!["s1".into()])))],
        )
        .await;

        let result = Aggregator.run(&parent, &ctx).await.unwrap().done().unwrap();
        assert_eq!(result.sources, vec!["report source"]);
    }

    #[tokio::test]
    async fn test_all_failed_children_give_zero_confidence() {
        let llm = Arc::new(ScriptedLlm::new().on(
            "Synthesize the subtask results",
            r#"{"content": "nothing usable", "sources": []}"#,
        ));
        let ctx = context(llm);
        let parent = parent_with_children(&ctx, vec![("a", None), ("b", None)]).await;

        let result = Aggregator.run(&parent, &ctx).await.unwrap().done().unwrap();
        assert_eq!(result.confidence, 0.0);
        assert!(result.sources.is_empty());
    }

    #[tokio::test]
    async fn test_long_child_content_is_truncated() {
        let llm = Arc::new(ScriptedLlm::new().on(
            "Synthesize the subtask results",
            r#"{"content": "ok", "sources": []}"#,
        ));
        let ctx = context(llm.clone());
        let long = "z".repeat(SUMMARY_CHARS + 200);
        let parent = parent_with_children(&ctx, vec![("a", Some(TaskResult::new(long, 1.0)))]).await;

        Aggregator.run(&parent, &ctx).await.unwrap();
        let prompt = &llm.prompts()[0];
        assert!(prompt.contains(&"z".repeat(SUMMARY_CHARS)));
        assert!(!prompt.contains(&"z".repeat(SUMMARY_CHARS + 1)));
    }

    #[tokio::test]
    async fn test_earlier_parent_result_is_summarized() {
        let llm = Arc::new(ScriptedLlm::new().on(
            "Synthesize the subtask results",
            r#"{"content": "ok", "sources": []}"#,
        ));
        let ctx = context(llm.clone());
        let parent = parent_with_children(&ctx, vec![("gap", Some(TaskResult::new("filled", 0.4)))]).await;
        ctx.registry
            .update(parent.id(), |t| t.result = Some(TaskResult::new("first pass", 0.9)))
            .await
            .unwrap();
        let parent = ctx.registry.get(parent.id()).await.unwrap();

        let result = Aggregator.run(&parent, &ctx).await.unwrap().done().unwrap();
        assert!(llm.prompts()[0].contains("### Compare tides (earlier result)\nfirst pass"));
        assert!((result.confidence - 0.4).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_running_child_declines() {
        let llm = Arc::new(ScriptedLlm::new());
        let ctx = context(llm.clone());
        let parent = Task::new("p", 0);
        ctx.registry.insert(parent.clone()).await;
        ctx.registry
            .attach_children(parent.id(), vec![Task::new_child("still going", &parent)])
            .await
            .unwrap();

        let outcome = Aggregator.run(&parent, &ctx).await.unwrap();
        assert!(!outcome.is_done());
        assert!(llm.prompts().is_empty());
    }
}
