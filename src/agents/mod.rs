//! Agent pipeline - the five stages a task passes through.
//!
//! # Stages
//! - **Analyzer**: decides whether to decompose, produces subtasks
//! - **Merger**: folds similar pending tasks into one description
//! - **Executor**: answers atomic or forced tasks
//! - **Assessor**: judges a result, proposes follow-up tasks
//! - **Aggregator**: combines finished children into the parent's result
//!
//! Every stage talks to the oracle only through the structured layer.

mod aggregator;
mod analyzer;
mod assessor;
mod context;
mod executor;
pub mod heuristics;
mod merger;
pub mod prompts;
mod types;

pub use aggregator::Aggregator;
pub use analyzer::Analyzer;
pub use assessor::Assessor;
pub use context::{AgentContext, NoSimilarTasks, SimilarityLookup};
pub use executor::Executor;
pub use heuristics::{DecompositionRules, DefaultRules};
pub use merger::Merger;
pub use types::{
    AgentOutcome, Analysis, Assessment, AtomicityCheck, QualityScore, SourcedContent, UnifiedTask,
};

use async_trait::async_trait;

use crate::task::Task;

/// One pipeline stage.
///
/// # Contract
/// - `Ok(Declined(_))` is an expected decision the orchestrator escalates on
/// - `Err(_)` means the oracle could not be made to cooperate; the task fails
/// - Stages never mutate the task; the orchestrator records their output
#[async_trait]
pub trait Agent: Send + Sync {
    type Output: Send;

    /// Short stage name used in logs.
    fn name(&self) -> &'static str;

    async fn run(
        &self,
        task: &Task,
        ctx: &AgentContext,
    ) -> anyhow::Result<AgentOutcome<Self::Output>>;
}
