//! Environment-driven settings for the extraction stack.

use std::time::Duration;

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Runtime configuration for backends, routing, and the engine.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub gemini_base_url: String,
    pub gemini_model: String,
    pub gemini_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub openai_api_key: Option<String>,
    /// Process-wide cap on in-flight extraction calls.
    pub max_concurrent_extractions: usize,
    /// Per-model call timeout; the per-section budget is three times this.
    pub model_timeout: Duration,
    /// Few-shot examples appended to system prompts.
    pub max_few_shot_examples: usize,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            ollama_base_url: "http://localhost:11434".into(),
            ollama_model: "llama3.2".into(),
            gemini_base_url: "https://generativelanguage.googleapis.com".into(),
            gemini_model: "gemini-1.5-pro".into(),
            gemini_api_key: None,
            openai_base_url: "https://api.openai.com/v1".into(),
            openai_model: "gpt-4-turbo-preview".into(),
            openai_api_key: None,
            max_concurrent_extractions: 5,
            model_timeout: Duration::from_secs(60),
            max_few_shot_examples: 2,
        }
    }
}

impl LlmSettings {
    /// Load settings from the environment (a `.env` file is honored).
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();
        Self {
            ollama_base_url: env_var("OLLAMA_BASE_URL").unwrap_or(defaults.ollama_base_url),
            ollama_model: env_var("OLLAMA_MODEL").unwrap_or(defaults.ollama_model),
            gemini_base_url: env_var("GEMINI_BASE_URL").unwrap_or(defaults.gemini_base_url),
            gemini_model: env_var("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            gemini_api_key: env_var("GEMINI_API_KEY"),
            openai_base_url: env_var("OPENAI_BASE_URL").unwrap_or(defaults.openai_base_url),
            openai_model: env_var("OPENAI_MODEL").unwrap_or(defaults.openai_model),
            openai_api_key: env_var("OPENAI_API_KEY"),
            max_concurrent_extractions: env_var("MAX_CONCURRENT_EXTRACTIONS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_concurrent_extractions),
            model_timeout: env_var("MODEL_TIMEOUT_SECONDS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.model_timeout),
            max_few_shot_examples: env_var("MAX_FEW_SHOT_EXAMPLES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_few_shot_examples),
        }
    }

    /// Whole-section extraction budget: three model-call timeouts.
    pub fn section_timeout(&self) -> Duration {
        self.model_timeout * 3
    }

    pub fn with_concurrency(mut self, max: usize) -> Self {
        self.max_concurrent_extractions = max;
        self
    }

    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let settings = LlmSettings::default();
        assert_eq!(settings.max_concurrent_extractions, 5);
        assert_eq!(settings.model_timeout, Duration::from_secs(60));
        assert_eq!(settings.section_timeout(), Duration::from_secs(180));
        assert!(settings.gemini_api_key.is_none());
    }

    #[test]
    fn builder_overrides() {
        let settings = LlmSettings::default()
            .with_concurrency(2)
            .with_model_timeout(Duration::from_secs(5));
        assert_eq!(settings.max_concurrent_extractions, 2);
        assert_eq!(settings.section_timeout(), Duration::from_secs(15));
    }
}
