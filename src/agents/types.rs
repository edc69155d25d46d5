//! Outcome and payload types shared by the pipeline stages.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::task::{ComplexityAnalysis, QualityAssessment};

/// Result of one stage run.
///
/// `Declined` is an expected decision ("not atomic", "children still
/// running"), not an error. Errors travel separately as `anyhow::Error`.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentOutcome<T> {
    Done(T),
    Declined(String),
}

impl<T> AgentOutcome<T> {
    pub fn declined(reason: impl Into<String>) -> Self {
        Self::Declined(reason.into())
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }

    pub fn done(self) -> Option<T> {
        match self {
            Self::Done(value) => Some(value),
            Self::Declined(_) => None,
        }
    }
}

/// What Analyze decided for one task.
#[derive(Debug, Clone)]
pub struct Analysis {
    /// Final verdict after local rules were applied
    pub complexity: ComplexityAnalysis,
    /// Empty unless `complexity.requires_decomposition`
    pub subtasks: Vec<String>,
}

/// What Assess decided for one completed task.
#[derive(Debug, Clone)]
pub struct Assessment {
    pub quality: QualityAssessment,
    pub follow_ups: Vec<String>,
}

/// Oracle reply: is the task answerable in one step.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct AtomicityCheck {
    pub is_atomic: bool,
    #[serde(default)]
    pub reasoning: String,
}

/// Oracle reply: a content answer with its sources.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct SourcedContent {
    pub content: String,
    #[serde(default)]
    pub sources: Vec<String>,
}

/// Oracle reply: quality score for an answer.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct QualityScore {
    /// Between 0 and 1
    pub score: f64,
    pub is_complete: bool,
    #[serde(default)]
    pub reasoning: String,
}

/// Oracle reply: one description covering several similar tasks.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct UnifiedTask {
    pub unified_description: String,
}
