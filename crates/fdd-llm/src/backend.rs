//! Model backend abstraction.
//!
//! Every backend exposes the same structured-extraction call; errors are
//! classified into the three classes the engine's fallback logic keys on:
//! transient (retry on the same backend), invalid response (next backend),
//! fatal (next backend, no retry).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// The fixed backend set: one local model and two large hosted models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendId {
    Ollama,
    Gemini,
    OpenAi,
}

impl std::fmt::Display for BackendId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BackendId::Ollama => "ollama",
            BackendId::Gemini => "gemini",
            BackendId::OpenAi => "openai",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    /// Network failures, 5xx responses, rate limits. Retried with backoff.
    #[error("transient backend error: {message}")]
    Transient {
        message: String,
        retry_after_ms: Option<u64>,
    },
    /// The model answered but the payload is not usable JSON.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    /// Auth, permissions, bad request. Not retryable on this backend.
    #[error("fatal backend error ({status:?}): {message}")]
    Fatal {
        status: Option<u16>,
        message: String,
    },
}

impl BackendError {
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Transient { .. })
    }

    /// Classify an HTTP status: 429 and 5xx are transient, everything
    /// else in the error range is fatal.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if status == 429 {
            BackendError::Transient {
                message: format!("rate limited: {message}"),
                retry_after_ms: Some(1000),
            }
        } else if status >= 500 {
            BackendError::Transient {
                message: format!("server error {status}: {message}"),
                retry_after_ms: None,
            }
        } else {
            BackendError::Fatal {
                status: Some(status),
                message,
            }
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        // Connection-level failures are worth retrying.
        BackendError::Transient {
            message: e.to_string(),
            retry_after_ms: None,
        }
    }
}

/// Token usage reported by a backend, when it reports one.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// A model capable of schema-constrained structured extraction.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    fn id(&self) -> BackendId;

    /// Concrete model identifier (e.g. "llama3.2", "gemini-1.5-pro").
    fn model_id(&self) -> &str;

    /// Whether the backend's credentials are configured. Unavailable
    /// backends are dropped from fallback chains.
    fn is_available(&self) -> bool;

    /// Blended USD cost per token; zero for local models.
    fn cost_per_token(&self) -> f64;

    /// Run one extraction call. The response must be a single JSON value
    /// shaped by `response_schema`; schema conformance is checked by the
    /// caller, not the backend.
    async fn extract(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        response_schema: &Value,
        temperature: f32,
    ) -> Result<(Value, Option<Usage>), BackendError>;
}
