//! Analyze: decide whether a task needs decomposition and produce subtasks.
//!
//! # Algorithm
//! 1. Ask the oracle for a [`ComplexityAnalysis`]
//! 2. Local rules may force decomposition regardless of the verdict
//! 3. If decomposing, ask for 3-5 subtasks, accepting three reply shapes
//! 4. Guarantee at least one subtask, then pad to the rules' minimum

use std::collections::HashMap;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use crate::agents::heuristics::pad_subtasks;
use crate::agents::{prompts, Agent, AgentContext, AgentOutcome, Analysis};
use crate::structured::{decode, extract_json_payload, schema_of, StructuredError};
use crate::task::{ComplexityAnalysis, Task};

pub struct Analyzer;

impl Analyzer {
    async fn request_subtasks(&self, task: &Task, ctx: &AgentContext) -> Vec<String> {
        let prompt = prompts::decompose(&task.description);
        let schema = schema_of::<Vec<String>>();
        let decode_schema = schema.clone();

        let subtasks = match ctx
            .structured
            .request_with(&prompt, schema, move |reply| {
                decode_subtasks(reply, &decode_schema)
            })
            .await
        {
            Ok(subtasks) => subtasks,
            Err(e) => {
                tracing::warn!(task_id = %task.id(), "Decomposition reply unusable: {}", e);
                Vec::new()
            }
        };

        let mut subtasks: Vec<String> = subtasks
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if subtasks.is_empty() {
            subtasks.push(task.description.clone());
        }

        let minimum = ctx.rules.minimum_subtasks(&task.description);
        pad_subtasks(&mut subtasks, &task.description, minimum);
        subtasks
    }
}

#[async_trait]
impl Agent for Analyzer {
    type Output = Analysis;

    fn name(&self) -> &'static str {
        "analyze"
    }

    async fn run(&self, task: &Task, ctx: &AgentContext) -> anyhow::Result<AgentOutcome<Analysis>> {
        let mut complexity: ComplexityAnalysis = ctx
            .structured
            .request(&prompts::complexity(&task.description))
            .await?;

        if let Some(reason) = ctx.rules.forced_reason(&task.description) {
            if !complexity.requires_decomposition {
                tracing::debug!(task_id = %task.id(), "Decomposition forced: {}", reason);
            }
            complexity.requires_decomposition = true;
            complexity.reasoning = if complexity.reasoning.is_empty() {
                reason
            } else {
                format!("{} ({})", complexity.reasoning, reason)
            };
        }

        let subtasks = if complexity.requires_decomposition {
            self.request_subtasks(task, ctx).await
        } else {
            Vec::new()
        };

        Ok(AgentOutcome::Done(Analysis {
            complexity,
            subtasks,
        }))
    }
}

/// Accept a list of strings, a list of single-key maps, or any array of
/// objects whose string values can be scanned out of the raw text.
fn decode_subtasks(reply: &str, schema: &Value) -> Result<Vec<String>, StructuredError> {
    let primary = match decode::<Vec<String>>(reply, schema) {
        Ok(list) => return Ok(list),
        Err(e) => e,
    };

    if let Ok(maps) = decode::<Vec<HashMap<String, String>>>(reply, schema) {
        let values: Vec<String> = maps.into_iter().flat_map(|m| m.into_values()).collect();
        if !values.is_empty() {
            return Ok(values);
        }
    }

    let scanned = scan_object_values(reply);
    if scanned.is_empty() {
        Err(primary)
    } else {
        Ok(scanned)
    }
}

/// Pull every `"key": "value"` string value out of the payload text, in order.
fn scan_object_values(reply: &str) -> Vec<String> {
    let payload = extract_json_payload(reply).unwrap_or(reply);
    let Ok(re) = Regex::new(r#""[^"\\]*"\s*:\s*"((?:[^"\\]|\\.)*)""#) else {
        return Vec::new();
    };
    re.captures_iter(payload)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().replace("\\\"", "\"").replace("\\n", " "))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::context;
    use crate::llm::testing::ScriptedLlm;
    use std::sync::Arc;

    const NOT_COMPLEX: &str = r#"{"requires_decomposition": false, "reasoning": "single fact"}"#;
    const COMPLEX: &str = r#"{"requires_decomposition": true, "reasoning": "broad"}"#;

    #[test]
    fn test_decode_accepts_plain_list() {
        let schema = schema_of::<Vec<String>>();
        assert_eq!(decode_subtasks(r#"["a", "b"]"#, &schema).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_decode_accepts_single_key_maps() {
        let schema = schema_of::<Vec<String>>();
        let reply = r#"[{"task": "a"}, {"task": "b"}]"#;
        assert_eq!(decode_subtasks(reply, &schema).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_decode_scans_mixed_objects() {
        let schema = schema_of::<Vec<String>>();
        let reply = r#"Here: [{"id": 1, "description": "first"}, {"id": 2, "description": "second"}]"#;
        assert_eq!(decode_subtasks(reply, &schema).unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let schema = schema_of::<Vec<String>>();
        assert!(decode_subtasks("no list here", &schema).is_err());
    }

    #[tokio::test]
    async fn test_atomic_verdict_has_no_subtasks() {
        let llm = Arc::new(ScriptedLlm::new().on("needs decomposition", NOT_COMPLEX));
        let task = Task::new("What is the capital of France?", 0);
        let analysis = Analyzer.run(&task, &context(llm.clone())).await.unwrap().done().unwrap();

        assert!(!analysis.complexity.requires_decomposition);
        assert!(analysis.subtasks.is_empty());
        assert_eq!(llm.calls_matching("Split this task"), 0);
    }

    #[tokio::test]
    async fn test_locale_markers_override_oracle() {
        let llm = Arc::new(
            ScriptedLlm::new()
                .on("needs decomposition", NOT_COMPLEX)
                .on("Split this task", r#"["English news", "Spanish news", "Compare"]"#),
        );
        let task = Task::new("Summarize today's news (English) and (Español)", 0);
        let analysis = Analyzer.run(&task, &context(llm)).await.unwrap().done().unwrap();

        assert!(analysis.complexity.requires_decomposition);
        assert!(analysis.complexity.reasoning.contains("locale markers"));
        assert_eq!(analysis.subtasks.len(), 3);
    }

    #[tokio::test]
    async fn test_long_description_padded_to_five() {
        let llm = Arc::new(
            ScriptedLlm::new()
                .on("needs decomposition", COMPLEX)
                .on("Split this task", r#"["part one", "part two"]"#),
        );
        let task = Task::new("x".repeat(320), 0);
        let analysis = Analyzer.run(&task, &context(llm)).await.unwrap().done().unwrap();

        assert_eq!(analysis.subtasks.len(), 5);
        assert_eq!(analysis.subtasks[0], "part one");
        assert!(analysis.subtasks[4].starts_with("Supplementary research 5"));
    }

    #[tokio::test]
    async fn test_unusable_decomposition_falls_back_to_description() {
        let llm = Arc::new(
            ScriptedLlm::new()
                .on("needs decomposition", COMPLEX)
                .on("Split this task", "I cannot split this."),
        );
        let task = Task::new("Explain tides", 0);
        let analysis = Analyzer.run(&task, &context(llm)).await.unwrap().done().unwrap();
        assert_eq!(analysis.subtasks, vec!["Explain tides"]);
    }
}
