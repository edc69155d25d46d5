//! The outcome attached to a task.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Result of executing or aggregating a task.
///
/// Replaced wholesale on re-execution, never patched in place.
///
/// # Invariants
/// - `confidence` is in `[0.0, 1.0]` (clamped on construction)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub content: String,
    pub confidence: f64,
    /// Claimed source citations, in the order given
    pub sources: Vec<String>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub needs_more_research: bool,
}

impl TaskResult {
    pub fn new(content: impl Into<String>, confidence: f64) -> Self {
        Self {
            content: content.into(),
            confidence: clamp_confidence(confidence),
            sources: Vec::new(),
            metadata: HashMap::new(),
            needs_more_research: false,
        }
    }

    /// Result recorded for a failed task.
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(message, 0.0)
    }

    pub fn with_sources(mut self, sources: Vec<String>) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_needs_more_research(mut self, needs_more_research: bool) -> Self {
        self.needs_more_research = needs_more_research;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Clamp into `[0, 1]`; NaN becomes 0.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Remove duplicates, keeping the first occurrence of each entry.
pub fn dedupe_sources<I>(sources: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = std::collections::HashSet::new();
    sources
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && seen.insert(s.clone()))
        .collect()
}
