use std::time::Duration;

/// Errors from a structured oracle call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StructuredError {
    #[error("Oracle call failed: {0}")]
    Oracle(String),

    #[error("Oracle call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Could not decode oracle reply as {type_name}: {message}. Raw reply: {raw}")]
    Parse {
        type_name: &'static str,
        message: String,
        raw: String,
    },

    #[error("Structured call failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<StructuredError>,
    },
}

impl StructuredError {
    pub(crate) fn parse<T>(message: impl Into<String>, raw: &str) -> Self {
        Self::Parse {
            type_name: std::any::type_name::<T>(),
            message: message.into(),
            raw: raw.to_string(),
        }
    }

    /// Short form fed back to the oracle on retry (no raw reply echo).
    pub fn feedback(&self) -> String {
        match self {
            Self::Parse { message, .. } => message.clone(),
            Self::Exhausted { last, .. } => last.feedback(),
            other => other.to_string(),
        }
    }

    /// The raw reply that failed to decode, if there was one.
    pub fn raw_reply(&self) -> Option<&str> {
        match self {
            Self::Parse { raw, .. } => Some(raw),
            Self::Exhausted { last, .. } => last.raw_reply(),
            _ => None,
        }
    }
}
