pub mod types;
pub mod prompt;
pub mod retry;
pub mod completion;
pub mod groq;
pub mod parser;
pub mod validation;
pub mod aggregate;
pub mod orchestrator;
pub mod report;

pub use types::*;
pub use prompt::*;
pub use retry::*;
pub use completion::*;
pub use groq::*;
pub use parser::*;
pub use validation::*;
pub use aggregate::*;
pub use orchestrator::*;
pub use report::*;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a single completion attempt, classified for retry decisions.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompletionError {
    #[error("Completion service rejected the credential: {0}")]
    Authentication(String),

    #[error("Completion service rate limit exceeded: {message}")]
    RateLimited {
        retry_after: Option<std::time::Duration>,
        message: String,
    },

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Content policy refusal: {0}")]
    ContentPolicy(String),

    #[error("Request timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Completion service returned error (status {status}): {body}")]
    Provider { status: u16, body: String },

    #[error("Malformed completion envelope: {0}")]
    MalformedEnvelope(String),
}

impl CompletionError {
    /// Only rate limiting and network-level failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Transport(_))
    }
}

/// Error surfaced to callers of the analysis pipeline.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Invalid input: {0}")]
    InputValidation(String),

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error("Completion output failed schema validation after {attempts} attempt(s): {}", violations.join("; "))]
    SchemaValidation {
        attempts: usize,
        violations: Vec<String>,
        raw_response: String,
    },

    #[error("Analysis task failed: {0}")]
    TaskFailed(String),
}

/// Stable classification of an `AnalysisError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InputValidation,
    Authentication,
    RateLimit,
    Transport,
    ContentPolicy,
    Timeout,
    Provider,
    SchemaValidation,
    Internal,
}

/// Serializable error payload: kind, message, and optional diagnostic text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl AnalysisError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InputValidation(_) => ErrorKind::InputValidation,
            Self::Completion(e) => match e {
                CompletionError::Authentication(_) => ErrorKind::Authentication,
                CompletionError::RateLimited { .. } => ErrorKind::RateLimit,
                CompletionError::Transport(_) => ErrorKind::Transport,
                CompletionError::ContentPolicy(_) => ErrorKind::ContentPolicy,
                CompletionError::Timeout { .. } => ErrorKind::Timeout,
                CompletionError::Provider { .. } | CompletionError::MalformedEnvelope(_) => {
                    ErrorKind::Provider
                }
            },
            Self::SchemaValidation { .. } => ErrorKind::SchemaValidation,
            Self::TaskFailed(_) => ErrorKind::Internal,
        }
    }

    /// Convert into the payload handed to callers. Only schema failures carry
    /// a diagnostic (the last raw completion text).
    pub fn to_structured(&self) -> StructuredError {
        let diagnostic = match self {
            Self::SchemaValidation { raw_response, .. } => Some(raw_response.clone()),
            _ => None,
        };
        StructuredError {
            kind: self.kind(),
            message: self.to_string(),
            diagnostic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rate_limit_and_transport_are_retryable() {
        assert!(CompletionError::Transport("reset".into()).is_retryable());
        assert!(CompletionError::RateLimited {
            retry_after: None,
            message: "slow down".into()
        }
        .is_retryable());
        assert!(!CompletionError::Authentication("bad key".into()).is_retryable());
        assert!(!CompletionError::ContentPolicy("refused".into()).is_retryable());
        assert!(!CompletionError::Timeout { secs: 30 }.is_retryable());
        assert!(!CompletionError::Provider {
            status: 400,
            body: String::new()
        }
        .is_retryable());
    }

    #[test]
    fn completion_errors_map_to_kinds() {
        let err: AnalysisError = CompletionError::Authentication("bad".into()).into();
        assert_eq!(err.kind(), ErrorKind::Authentication);
        let err: AnalysisError = CompletionError::Timeout { secs: 15 }.into();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(err.to_string().contains("15s"));
    }

    #[test]
    fn schema_error_carries_raw_response_as_diagnostic() {
        let err = AnalysisError::SchemaValidation {
            attempts: 3,
            violations: vec!["missing field `summary`".into()],
            raw_response: "{\"risk_level\":\"High\"}".into(),
        };
        let structured = err.to_structured();
        assert_eq!(structured.kind, ErrorKind::SchemaValidation);
        assert!(structured.message.contains("missing field `summary`"));
        assert_eq!(structured.diagnostic.as_deref(), Some("{\"risk_level\":\"High\"}"));
    }

    #[test]
    fn input_error_has_no_diagnostic() {
        let structured = AnalysisError::InputValidation("too short".into()).to_structured();
        assert_eq!(structured.kind, ErrorKind::InputValidation);
        assert!(structured.diagnostic.is_none());
        let json = serde_json::to_string(&structured).unwrap();
        assert!(json.contains("\"input_validation\""));
        assert!(!json.contains("diagnostic"));
    }
}
