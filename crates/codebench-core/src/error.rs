//! Error types for the orchestrator, providers and analyzers.

use std::time::Duration;
use thiserror::Error;

/// Errors that stop a batch, either before dispatch or as a model-less failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// Malformed request; nothing was started.
    #[error("validation error: {0}")]
    Validation(String),

    /// Invalid weight/retry configuration; nothing was started.
    #[error("configuration error: {0}")]
    Config(String),

    /// Failure unrelated to any single model.
    #[error("batch failed: {0}")]
    BatchFatal(String),
}

impl EvalError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn batch_fatal(message: impl Into<String>) -> Self {
        Self::BatchFatal(message.into())
    }
}

/// Errors a generation provider can surface for one attempt.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    /// The attempt did not finish in time. Retryable.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// Provider asked us to slow down. Retryable.
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    /// Network-level failure. Retryable.
    #[error("transport error: {0}")]
    Transport(String),

    /// Well-formed refusal from the provider. Not retried.
    #[error("provider rejected request{}: {message}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Rejected {
        status: Option<u16>,
        message: String,
    },

    /// Response could not be understood. Not retried.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The batch was abandoned by its consumer. A provider returning it
    /// fails its own model only.
    #[error("cancelled")]
    Cancelled,
}

impl ProviderError {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            status: None,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::RateLimited { .. } | Self::Transport(_) => true,
            Self::Rejected { .. } | Self::Malformed(_) | Self::Cancelled => false,
        }
    }

    /// Short error code for logging.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::RateLimited { .. } => "rate_limited",
            Self::Transport(_) => "transport",
            Self::Rejected { .. } => "rejected",
            Self::Malformed(_) => "malformed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            // reqwest does not report the configured duration
            Self::Transport(format!("request timed out: {e}"))
        } else if e.is_decode() {
            Self::Malformed(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Why a single metric could not be scored. Always recovered into a zero score.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalyzerError {
    #[error("analysis failed: {0}")]
    Failed(String),

    #[error("score {0} is outside 0-10")]
    OutOfRange(f64),

    #[error("analysis timed out after {0:?}")]
    Timeout(Duration),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_retry() {
        assert!(ProviderError::Timeout(Duration::from_secs(30)).is_retryable());
        assert!(ProviderError::RateLimited { retry_after: None }.is_retryable());
        assert!(ProviderError::Transport("reset".into()).is_retryable());
        assert!(!ProviderError::rejected("bad model").is_retryable());
        assert!(!ProviderError::Malformed("no code".into()).is_retryable());
        assert!(!ProviderError::Cancelled.is_retryable());
    }

    #[test]
    fn rejected_message_includes_status() {
        let err = ProviderError::Rejected {
            status: Some(400),
            message: "unknown model".into(),
        };
        assert_eq!(err.to_string(), "provider rejected request (HTTP 400): unknown model");
        assert_eq!(
            ProviderError::rejected("nope").to_string(),
            "provider rejected request: nope"
        );
    }
}
