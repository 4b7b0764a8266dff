//! Error types for Reply Pilot.

use std::time::Duration;

/// Top-level error type for the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Composition error: {0}")]
    Composition(#[from] CompositionError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Send log error: {0}")]
    Log(#[from] LogError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("Provider rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Invalid response from provider: {reason}")]
    InvalidResponse { reason: String },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LlmError {
    /// Transient errors are worth another attempt; schema/auth problems are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RequestFailed { .. } | Self::RateLimited { .. } | Self::Timeout(_)
        )
    }
}

/// Entity extraction errors — fatal for the run.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Input email text is empty")]
    EmptyInput,

    #[error("No sender email address found in email or model output")]
    MissingSenderEmail,

    #[error("Sender email address is not syntactically valid: {0}")]
    InvalidSenderEmail(String),

    #[error("Model output did not match the entity schema after {attempts} attempt(s): {reason}")]
    Malformed { attempts: u32, reason: String },

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// Search provider errors — branch-local, degraded to empty fact buckets.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Search request failed: {0}")]
    RequestFailed(String),

    #[error("Search request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unexpected search response shape: {0}")]
    InvalidResponse(String),
}

/// Draft composition errors — fatal for the run, no fallback text.
#[derive(Debug, thiserror::Error)]
pub enum CompositionError {
    #[error("Model output did not match the draft schema after {attempts} attempt(s): {reason}")]
    Malformed { attempts: u32, reason: String },

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// Send transport errors, classified for the dispatcher's retry decision.
///
/// Transient failures (connection drops, SMTP 4xx) are retried with backoff.
/// Permanent failures (bad credentials, malformed addresses, SMTP 5xx) abort
/// the attempt loop immediately — retrying cannot fix configuration.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Transient send failure: {0}")]
    Transient(String),

    #[error("Permanent send failure: {0}")]
    Permanent(String),
}

impl TransportError {
    pub fn detail(&self) -> &str {
        match self {
            Self::Transient(d) | Self::Permanent(d) => d,
        }
    }
}

/// Send-log sink errors.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for the pipeline.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn llm_transient_classification() {
        assert!(LlmError::Timeout(Duration::from_secs(10)).is_transient());
        assert!(
            LlmError::RequestFailed {
                reason: "503".into()
            }
            .is_transient()
        );
        assert!(
            !LlmError::InvalidResponse {
                reason: "not json".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn transport_error_detail() {
        let e = TransportError::Transient("connection reset".into());
        assert_eq!(e.detail(), "connection reset");
        let e = TransportError::Permanent("535 bad credentials".into());
        assert_eq!(e.detail(), "535 bad credentials");
    }

    #[test]
    fn extraction_error_wraps_llm() {
        let e: ExtractionError = LlmError::RequestFailed {
            reason: "boom".into(),
        }
        .into();
        assert!(e.to_string().contains("boom"));
    }
}
