//! Backend implementations: Ollama (local), Gemini and OpenAI (hosted),
//! and a scriptable mock for tests.
//!
//! All hosted calls go through reqwest with JSON bodies. Ollama receives
//! the response schema natively via its `format` field; the hosted
//! backends get a JSON response mode plus the schema appended to the
//! system prompt.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use tracing::debug;

use crate::backend::{BackendError, BackendId, ModelBackend, Usage};

/// Strip markdown code fences and parse the model's reply as JSON.
fn parse_json_content(content: &str) -> Result<Value, BackendError> {
    let trimmed = content.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix("```").unwrap_or(trimmed).trim();
    serde_json::from_str(trimmed)
        .map_err(|e| BackendError::InvalidResponse(format!("response is not valid JSON: {e}")))
}

fn schema_suffix(schema: &Value) -> String {
    format!(
        "\n\nRespond with a single JSON object conforming to this JSON Schema:\n{}",
        serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string())
    )
}

async fn error_for_response(response: reqwest::Response) -> BackendError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    BackendError::from_status(status, body)
}

// =============================================================================
// Ollama (local)
// =============================================================================

pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaBackend {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl ModelBackend for OllamaBackend {
    fn id(&self) -> BackendId {
        BackendId::Ollama
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn is_available(&self) -> bool {
        // Local model: no credentials to check.
        true
    }

    fn cost_per_token(&self) -> f64 {
        0.0
    }

    async fn extract(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        response_schema: &Value,
        temperature: f32,
    ) -> Result<(Value, Option<Usage>), BackendError> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt },
            ],
            "stream": false,
            "format": response_schema,
            "options": { "temperature": temperature },
        });

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_for_response(response).await);
        }

        let payload: Value = response.json().await?;
        let content = payload["message"]["content"]
            .as_str()
            .ok_or_else(|| BackendError::InvalidResponse("missing message content".into()))?;
        let value = parse_json_content(content)?;

        let usage = match (
            payload["prompt_eval_count"].as_u64(),
            payload["eval_count"].as_u64(),
        ) {
            (Some(input_tokens), Some(output_tokens)) => Some(Usage {
                input_tokens,
                output_tokens,
            }),
            _ => None,
        };

        debug!(model = self.model, "ollama extraction call complete");
        Ok((value, usage))
    }
}

// =============================================================================
// Gemini (hosted A)
// =============================================================================

pub struct GeminiBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl GeminiBackend {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            api_key,
        }
    }
}

#[async_trait]
impl ModelBackend for GeminiBackend {
    fn id(&self) -> BackendId {
        BackendId::Gemini
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    fn cost_per_token(&self) -> f64 {
        // Blended gemini-1.5-pro rate.
        0.000_005
    }

    async fn extract(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        response_schema: &Value,
        temperature: f32,
    ) -> Result<(Value, Option<Usage>), BackendError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| BackendError::Fatal {
            status: None,
            message: "gemini API key not configured".into(),
        })?;

        let body = json!({
            "systemInstruction": {
                "parts": [{ "text": format!("{system_prompt}{}", schema_suffix(response_schema)) }]
            },
            "contents": [{
                "role": "user",
                "parts": [{ "text": user_prompt }]
            }],
            "generationConfig": {
                "temperature": temperature,
                "responseMimeType": "application/json",
            },
        });

        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, self.model
            ))
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_for_response(response).await);
        }

        let payload: Value = response.json().await?;
        let content = payload["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| BackendError::InvalidResponse("missing candidate text".into()))?;
        let value = parse_json_content(content)?;

        let usage = match (
            payload["usageMetadata"]["promptTokenCount"].as_u64(),
            payload["usageMetadata"]["candidatesTokenCount"].as_u64(),
        ) {
            (Some(input_tokens), Some(output_tokens)) => Some(Usage {
                input_tokens,
                output_tokens,
            }),
            _ => None,
        };

        debug!(model = self.model, "gemini extraction call complete");
        Ok((value, usage))
    }
}

// =============================================================================
// OpenAI (hosted B)
// =============================================================================

pub struct OpenAiBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiBackend {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            api_key,
        }
    }
}

#[async_trait]
impl ModelBackend for OpenAiBackend {
    fn id(&self) -> BackendId {
        BackendId::OpenAi
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    fn cost_per_token(&self) -> f64 {
        0.000_03
    }

    async fn extract(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        response_schema: &Value,
        temperature: f32,
    ) -> Result<(Value, Option<Usage>), BackendError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| BackendError::Fatal {
            status: None,
            message: "openai API key not configured".into(),
        })?;

        let body = json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": format!("{system_prompt}{}", schema_suffix(response_schema)),
                },
                { "role": "user", "content": user_prompt },
            ],
            "temperature": temperature,
            "response_format": { "type": "json_object" },
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_for_response(response).await);
        }

        let payload: Value = response.json().await?;
        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| BackendError::InvalidResponse("missing message content".into()))?;
        let value = parse_json_content(content)?;

        let usage = match (
            payload["usage"]["prompt_tokens"].as_u64(),
            payload["usage"]["completion_tokens"].as_u64(),
        ) {
            (Some(input_tokens), Some(output_tokens)) => Some(Usage {
                input_tokens,
                output_tokens,
            }),
            _ => None,
        };

        debug!(model = self.model, "openai extraction call complete");
        Ok((value, usage))
    }
}

// =============================================================================
// Mock (tests)
// =============================================================================

/// Scriptable backend for tests: plays back a queue of responses, then a
/// configurable default.
pub struct MockBackend {
    id: BackendId,
    model: String,
    available: bool,
    latency_ms: u64,
    responses: Mutex<VecDeque<Result<Value, BackendError>>>,
    default_response: Option<Value>,
    calls: AtomicU32,
}

impl MockBackend {
    pub fn new(id: BackendId, model: impl Into<String>) -> Self {
        Self {
            id,
            model: model.into(),
            available: true,
            latency_ms: 0,
            responses: Mutex::new(VecDeque::new()),
            default_response: None,
            calls: AtomicU32::new(0),
        }
    }

    pub fn with_responses(self, responses: Vec<Result<Value, BackendError>>) -> Self {
        *self.responses.lock().unwrap() = responses.into();
        self
    }

    pub fn with_default_response(mut self, value: Value) -> Self {
        self.default_response = Some(value);
        self
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Number of extract calls made so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelBackend for MockBackend {
    fn id(&self) -> BackendId {
        self.id
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn cost_per_token(&self) -> f64 {
        0.0
    }

    async fn extract(
        &self,
        _system_prompt: &str,
        _user_prompt: &str,
        _response_schema: &Value,
        _temperature: f32,
    ) -> Result<(Value, Option<Usage>), BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.latency_ms)).await;
        }

        let scripted = self.responses.lock().unwrap().pop_front();
        match scripted {
            Some(Ok(value)) => Ok((
                value,
                Some(Usage {
                    input_tokens: 100,
                    output_tokens: 50,
                }),
            )),
            Some(Err(e)) => Err(e),
            None => match &self.default_response {
                Some(value) => Ok((value.clone(), None)),
                None => Err(BackendError::InvalidResponse("mock exhausted".into())),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_fences_are_stripped() {
        let fenced = "```json\n{\"a\": 1}\n```";
        assert_eq!(parse_json_content(fenced).unwrap(), json!({"a": 1}));
        assert_eq!(parse_json_content("{\"a\": 1}").unwrap(), json!({"a": 1}));
        assert!(parse_json_content("not json").is_err());
    }

    #[tokio::test]
    async fn mock_plays_back_scripted_responses() {
        let backend = MockBackend::new(BackendId::Ollama, "mock-model").with_responses(vec![
            Err(BackendError::InvalidResponse("bad".into())),
            Ok(json!({"ok": true})),
        ]);

        let schema = json!({"type": "object"});
        assert!(backend.extract("s", "u", &schema, 0.1).await.is_err());
        let (value, usage) = backend.extract("s", "u", &schema, 0.1).await.unwrap();
        assert_eq!(value, json!({"ok": true}));
        assert!(usage.is_some());
        assert_eq!(backend.calls(), 2);
    }
}
