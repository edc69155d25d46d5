//! Structured output on top of an unreliable oracle.
//!
//! # Call Flow
//! ```text
//! prompt + schema instructions -> oracle -> extract payload -> decode (case-insensitive)
//!                                                 \-> repair string literals -> decode
//! any failure -> retry with the error appended, after 2^(n-1) x backoff_base
//! ```
//!
//! Every pipeline stage goes through [`StructuredCaller`].

mod error;
mod extract;

pub use error::StructuredError;
pub use extract::{decode, extract_json_payload, repair_string_literals};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::Config;
use crate::llm::{ChatMessage, ChatOptions, LlmClient};

const SYSTEM_PROMPT: &str =
    "You are a precise research assistant. You always answer with JSON only.";

/// Settings for [`StructuredCaller`].
#[derive(Debug, Clone)]
pub struct StructuredConfig {
    /// Model passed to the oracle on every call
    pub model: String,
    /// Total attempts per call (first try included)
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry
    pub backoff_base: Duration,
    /// Timeout for one oracle round trip
    pub call_timeout: Option<Duration>,
    /// Initial value of the prompt-logging toggle
    pub log_prompts: bool,
}

impl Default for StructuredConfig {
    fn default() -> Self {
        Self {
            model: "anthropic/claude-sonnet-4.5".to_string(),
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
            call_timeout: None,
            log_prompts: false,
        }
    }
}

impl StructuredConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.default_model.clone(),
            max_retries: config.structured_max_retries,
            backoff_base: Duration::from_secs(1),
            call_timeout: Some(config.task_timeout),
            log_prompts: config.log_prompts,
        }
    }
}

/// JSON schema for `T`, as a plain JSON value.
pub fn schema_of<T: JsonSchema>() -> Value {
    serde_json::to_value(schemars::schema_for!(T)).unwrap_or_default()
}

/// Append machine-readable schema instructions to a prompt.
pub fn with_schema_instructions(prompt: &str, schema: &Value) -> String {
    let schema_text = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
    format!(
        "{prompt}\n\nRespond with JSON only, matching this JSON schema:\n{schema_text}\n\nDo not add any text before or after the JSON."
    )
}

/// Typed, retried calls to the oracle.
pub struct StructuredCaller {
    llm: Arc<dyn LlmClient>,
    config: StructuredConfig,
    log_prompts: AtomicBool,
}

impl StructuredCaller {
    pub fn new(llm: Arc<dyn LlmClient>, config: StructuredConfig) -> Self {
        let log_prompts = AtomicBool::new(config.log_prompts);
        Self {
            llm,
            config,
            log_prompts,
        }
    }

    pub fn config(&self) -> &StructuredConfig {
        &self.config
    }

    /// Toggle verbatim prompt/reply logging for this caller.
    pub fn set_log_prompts(&self, enabled: bool) {
        self.log_prompts.store(enabled, Ordering::Relaxed);
    }

    pub fn log_prompts(&self) -> bool {
        self.log_prompts.load(Ordering::Relaxed)
    }

    /// Ask the oracle for a `T`, retrying on any failure.
    pub async fn request<T>(&self, prompt: &str) -> Result<T, StructuredError>
    where
        T: DeserializeOwned + JsonSchema,
    {
        let schema = schema_of::<T>();
        let decode_schema = schema.clone();
        self.request_with(prompt, schema, move |reply| decode::<T>(reply, &decode_schema))
            .await
    }

    /// Like [`request`](Self::request) but with a caller-supplied decoder,
    /// for stages that accept several reply shapes.
    pub async fn request_with<T, F>(
        &self,
        prompt: &str,
        schema: Value,
        decoder: F,
    ) -> Result<T, StructuredError>
    where
        F: Fn(&str) -> Result<T, StructuredError>,
    {
        let base_prompt = with_schema_instructions(prompt, &schema);
        let attempts = self.config.max_retries.max(1);
        let mut last_error: Option<StructuredError> = None;

        for attempt in 1..=attempts {
            let prompt = match &last_error {
                None => base_prompt.clone(),
                Some(error) => {
                    let delay = self.config.backoff_base * 2u32.saturating_pow(attempt - 2);
                    tracing::warn!(
                        attempt,
                        ?delay,
                        "Structured call failed, retrying: {}",
                        error.feedback()
                    );
                    tokio::time::sleep(delay).await;
                    format!(
                        "{base_prompt}\n\nYour previous reply could not be used: {}\nReply again with valid JSON only.",
                        error.feedback()
                    )
                }
            };

            match self.call_once(&prompt, &schema).await {
                Ok(reply) => match decoder(&reply) {
                    Ok(value) => return Ok(value),
                    Err(error) => last_error = Some(error),
                },
                Err(error) => last_error = Some(error),
            }
        }

        let last = last_error.unwrap_or_else(|| StructuredError::Oracle("no attempts made".to_string()));
        tracing::error!(attempts, "Structured call exhausted retries: {}", last);
        Err(StructuredError::Exhausted {
            attempts,
            last: Box::new(last),
        })
    }

    /// One oracle round trip, returning the raw reply text.
    async fn call_once(&self, prompt: &str, schema: &Value) -> Result<String, StructuredError> {
        let messages = [ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)];
        let options = ChatOptions::with_schema(schema.clone());

        if self.log_prompts() {
            tracing::info!(target: "taskweave::prompts", "prompt:\n{}", prompt);
        }

        let call = self
            .llm
            .chat_completion(&self.config.model, &messages, options);
        let response = match self.config.call_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| StructuredError::Timeout(limit))?,
            None => call.await,
        }
        .map_err(|e| StructuredError::Oracle(e.to_string()))?;

        let reply = response.content.unwrap_or_default();
        if self.log_prompts() {
            tracing::info!(target: "taskweave::prompts", "reply:\n{}", reply);
        }
        Ok(reply)
    }
}
