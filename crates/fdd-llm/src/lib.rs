//! # FDD LLM
//!
//! Model routing and structured extraction for FDD sections.
//!
//! ## Key types
//!
//! - [`ModelBackend`] - the backend contract: one schema-constrained
//!   extraction call with classified errors
//! - [`ModelRouter`] - complexity-tiered routing, fallback chains, the
//!   process-wide concurrency gate, and circuit breakers
//! - [`PromptCatalog`] - per-item prompt templates with `{{ var }}`
//!   substitution and few-shot assembly
//! - [`ExtractionEngine`] - runs one section through the chain with
//!   retries, timeouts, and store-backed state transitions
//! - [`CancelToken`] - cooperative cancellation checked at every
//!   suspension point

pub mod backend;
pub mod cancel;
pub mod config;
pub mod engine;
pub mod prompts;
pub mod providers;
pub mod router;

pub use backend::{BackendError, BackendId, ModelBackend, Usage};
pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use config::LlmSettings;
pub use engine::ExtractionEngine;
pub use prompts::{FewShotExample, PromptCatalog, PromptTemplate, RenderedPrompt};
pub use providers::{GeminiBackend, MockBackend, OllamaBackend, OpenAiBackend};
pub use router::{CircuitBreakerConfig, ModelRouter, RetryPolicy};

use std::sync::Arc;

/// Assemble the standard backend set from settings: the local model plus
/// the two hosted models. Backends without credentials stay registered
/// but report themselves unavailable.
pub fn build_backends(settings: &LlmSettings) -> Vec<Arc<dyn ModelBackend>> {
    vec![
        Arc::new(OllamaBackend::new(
            settings.ollama_base_url.clone(),
            settings.ollama_model.clone(),
        )),
        Arc::new(GeminiBackend::new(
            settings.gemini_base_url.clone(),
            settings.gemini_model.clone(),
            settings.gemini_api_key.clone(),
        )),
        Arc::new(OpenAiBackend::new(
            settings.openai_base_url.clone(),
            settings.openai_model.clone(),
            settings.openai_api_key.clone(),
        )),
    ]
}
