//! Configuration management for taskweave.
//!
//! Configuration can be set via environment variables:
//! - `OPENROUTER_API_KEY` - Required. Your OpenRouter API key.
//! - `DEFAULT_MODEL` - Optional. Model used by every pipeline stage. Defaults to `anthropic/claude-sonnet-4.5`.
//! - `MAX_CONCURRENCY` - Optional. Number of orchestrator workers. Defaults to `4`.
//! - `MAX_DEPTH` - Optional. Initial maximum decomposition depth. Defaults to `3`.
//! - `STRUCTURED_MAX_RETRIES` - Optional. Attempts per structured oracle call. Defaults to `3`.
//! - `LOG_PROMPTS` - Optional. Log every prompt and reply verbatim. Defaults to `false`.
//! - `TASK_TIMEOUT_SECS` - Optional. Timeout applied to each oracle call. Defaults to `120`.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// OpenRouter API key
    pub api_key: String,

    /// LLM model identifier (OpenRouter format)
    pub default_model: String,

    /// Worker pool size. Fixed once the orchestrator is built.
    pub max_concurrency: usize,

    /// Initial maximum decomposition depth (root is depth 0)
    pub max_depth: usize,

    /// Attempts per structured oracle call before giving up
    pub structured_max_retries: u32,

    /// Initial value of the prompt-logging toggle
    pub log_prompts: bool,

    /// Timeout for a single oracle call
    pub task_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `OPENROUTER_API_KEY` is not set,
    /// and `ConfigError::InvalidValue` if a numeric or boolean variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("OPENROUTER_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("OPENROUTER_API_KEY".to_string()))?;

        let mut config = Self::new(api_key);

        if let Ok(model) = std::env::var("DEFAULT_MODEL") {
            config.default_model = model;
        }
        config.max_concurrency = env_or("MAX_CONCURRENCY", config.max_concurrency)?;
        config.max_depth = env_or("MAX_DEPTH", config.max_depth)?;
        config.structured_max_retries =
            env_or("STRUCTURED_MAX_RETRIES", config.structured_max_retries)?;
        config.log_prompts = env_or("LOG_PROMPTS", config.log_prompts)?;
        let timeout_secs: u64 = env_or("TASK_TIMEOUT_SECS", config.task_timeout.as_secs())?;
        config.task_timeout = Duration::from_secs(timeout_secs);

        if config.max_concurrency == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_CONCURRENCY".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(config)
    }

    /// Create a config with default values (useful for testing).
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            default_model: "anthropic/claude-sonnet-4.5".to_string(),
            max_concurrency: 4,
            max_depth: 3,
            structured_max_retries: 3,
            log_prompts: false,
            task_timeout: Duration::from_secs(120),
        }
    }
}

fn env_or<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_uses_defaults() {
        let config = Config::new("key");
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.max_depth, 3);
        assert_eq!(config.structured_max_retries, 3);
        assert!(!config.log_prompts);
        assert_eq!(config.task_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_env_or_rejects_garbage() {
        std::env::set_var("TASKWEAVE_TEST_BAD_NUMBER", "twelve");
        let err = env_or::<usize>("TASKWEAVE_TEST_BAD_NUMBER", 1).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(name, _) if name == "TASKWEAVE_TEST_BAD_NUMBER"));
        std::env::remove_var("TASKWEAVE_TEST_BAD_NUMBER");
    }

    #[test]
    fn test_env_or_falls_back_when_unset() {
        let value = env_or::<u32>("TASKWEAVE_TEST_UNSET_VARIABLE", 7).unwrap();
        assert_eq!(value, 7);
    }
}
