//! Configuration types.
//!
//! All configuration is explicit: components receive these structs at
//! construction and never read process environment state themselves.
//! Environment reads happen only in the `from_env` builders, called once
//! from the binary.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Configuration for the LLM and embedding provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API.
    pub api_base: String,
    pub api_key: SecretString,
    /// Chat model used for extraction, research summaries, and composition.
    pub model: String,
    /// Embedding model used by the style retriever.
    pub embed_model: String,
    /// Per-request timeout. External calls are the pipeline's only
    /// suspension points; every one of them must be bounded.
    pub request_timeout: Duration,
}

impl LlmConfig {
    /// Build config from environment variables. `OPENAI_API_KEY` is required.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("OPENAI_API_KEY".into()))?;

        let api_base = std::env::var("REPLY_PILOT_API_BASE")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let model =
            std::env::var("REPLY_PILOT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let embed_model = std::env::var("REPLY_PILOT_EMBED_MODEL")
            .unwrap_or_else(|_| "text-embedding-3-small".to_string());

        Ok(Self {
            api_base,
            api_key: SecretString::from(api_key),
            model,
            embed_model,
            request_timeout: Duration::from_secs(30),
        })
    }
}

/// Entity extractor configuration.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Re-ask bound when the model returns output that fails schema
    /// validation. Retries, not total attempts.
    pub max_retries: u32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self { max_retries: 2 }
    }
}

/// Style retriever configuration.
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// Maximum number of style exemplars in a profile.
    pub top_k: usize,
    /// Tone descriptor used when the branch degrades.
    pub default_tone: String,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            default_tone: "neutral and professional".to_string(),
        }
    }
}

/// Context researcher configuration.
#[derive(Debug, Clone)]
pub struct ResearchConfig {
    /// Independent timeout for each category sub-query (search + summary).
    pub query_timeout: Duration,
    /// Maximum facts kept per category bucket.
    pub max_facts: usize,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_secs(10),
            max_facts: 3,
        }
    }
}

/// Response composer configuration.
#[derive(Debug, Clone)]
pub struct ComposerConfig {
    /// Re-ask bound on malformed draft output.
    pub max_retries: u32,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self { max_retries: 2 }
    }
}

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Maximum transport attempts (first try included).
    pub max_attempts: u32,
    /// Base backoff between attempts; doubles per retry, with jitter.
    pub backoff: Duration,
    /// When a send error persists, fall back to a simulated send instead
    /// of reporting failure.
    pub fallback_enabled: bool,
    /// Never contact the transport; always simulate. Lets the pipeline run
    /// end-to-end without credentials.
    pub force_simulation: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff: Duration::from_millis(500),
            fallback_enabled: true,
            force_simulation: false,
        }
    }
}

impl DispatchConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_attempts = std::env::var("REPLY_PILOT_SEND_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_attempts);

        let fallback_enabled = std::env::var("REPLY_PILOT_FALLBACK")
            .map(|s| s != "0" && !s.eq_ignore_ascii_case("false"))
            .unwrap_or(defaults.fallback_enabled);

        let force_simulation = std::env::var("REPLY_PILOT_FORCE_DEMO")
            .map(|s| s == "1" || s.eq_ignore_ascii_case("true"))
            .unwrap_or(defaults.force_simulation);

        Self {
            max_attempts,
            fallback_enabled,
            force_simulation,
            ..defaults
        }
    }
}

/// SMTP transport configuration.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

impl SmtpConfig {
    /// Build config from environment variables.
    /// Returns `None` if `SMTP_HOST` is not set (transport unavailable —
    /// the dispatcher runs in simulation).
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("SMTP_HOST").ok()?;

        let port: u16 = std::env::var("SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let username = std::env::var("SMTP_USERNAME").unwrap_or_default();
        let password = std::env::var("SMTP_PASSWORD").unwrap_or_default();
        let from_address = std::env::var("SMTP_FROM_ADDRESS").unwrap_or_else(|_| username.clone());

        Some(Self {
            host,
            port,
            username,
            password: SecretString::from(password),
            from_address,
        })
    }
}
