//! Assess: judge a completed result and propose follow-up research.

use async_trait::async_trait;

use crate::agents::{prompts, Agent, AgentContext, AgentOutcome, Assessment};
use crate::task::{QualityAssessment, Task};

/// Follow-ups kept per assessment.
pub const MAX_FOLLOW_UPS: usize = 3;

pub struct Assessor;

#[async_trait]
impl Agent for Assessor {
    type Output = Assessment;

    fn name(&self) -> &'static str {
        "assess"
    }

    async fn run(
        &self,
        task: &Task,
        ctx: &AgentContext,
    ) -> anyhow::Result<AgentOutcome<Assessment>> {
        let Some(result) = &task.result else {
            return Ok(AgentOutcome::declined("no result to assess"));
        };

        let quality: QualityAssessment = ctx
            .structured
            .request(&prompts::assess(&task.description, &result.content))
            .await?;

        let follow_ups = if quality.needs_more_research {
            let gaps = if quality.gaps.is_empty() {
                vec![quality.reasoning.clone()]
            } else {
                quality.gaps.clone()
            };
            let proposed: Vec<String> = ctx
                .structured
                .request(&prompts::follow_ups(&task.description, &gaps))
                .await?;
            proposed
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .take(MAX_FOLLOW_UPS)
                .collect()
        } else {
            Vec::new()
        };

        Ok(AgentOutcome::Done(Assessment {
            quality,
            follow_ups,
        }))
    }
}
