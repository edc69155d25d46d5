//! Shared state handed to every pipeline stage.

use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::{DecompositionRules, DefaultRules};
use crate::structured::StructuredCaller;
use crate::task::{Task, TaskRegistry};

/// Finds pending tasks similar to a given one, for Merge.
#[async_trait]
pub trait SimilarityLookup: Send + Sync {
    async fn find_similar(&self, task: &Task, registry: &TaskRegistry) -> Vec<Task>;
}

/// Lookup that never finds anything.
pub struct NoSimilarTasks;

#[async_trait]
impl SimilarityLookup for NoSimilarTasks {
    async fn find_similar(&self, _task: &Task, _registry: &TaskRegistry) -> Vec<Task> {
        Vec::new()
    }
}

/// Context passed to all stages.
///
/// # Thread Safety
/// Cheap to clone; every field is shared.
#[derive(Clone)]
pub struct AgentContext {
    /// Reliability layer over the oracle
    pub structured: Arc<StructuredCaller>,

    /// Read access to sibling and child state
    pub registry: TaskRegistry,

    pub rules: Arc<dyn DecompositionRules>,

    pub similarity: Arc<dyn SimilarityLookup>,
}

impl AgentContext {
    pub fn new(structured: Arc<StructuredCaller>, registry: TaskRegistry) -> Self {
        Self {
            structured,
            registry,
            rules: Arc::new(DefaultRules::new()),
            similarity: Arc::new(NoSimilarTasks),
        }
    }

    pub fn with_rules(mut self, rules: Arc<dyn DecompositionRules>) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_similarity(mut self, similarity: Arc<dyn SimilarityLookup>) -> Self {
        self.similarity = similarity;
        self
    }
}
