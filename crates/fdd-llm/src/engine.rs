//! The extraction engine: prompt assembly, fallback-chain execution,
//! schema validation, and section state transitions.
//!
//! Per section the engine runs `pending → processing → terminal`. The
//! processing transition acquires the router's concurrency gate and
//! increments the attempt counter; terminal transitions update the store
//! and record the result alongside any earlier attempts. Within one
//! section everything is sequential: retries on a backend, then the next
//! backend in the chain.

use chrono::Utc;
use fdd_core::schema::response_schema;
use fdd_core::{ExtractionResult, ExtractionStatus, ItemData};
use fdd_observe::{estimate_tokens, ExtractionMonitor, TokenUsage};
use fdd_store::SectionStore;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backend::{BackendError, BackendId, ModelBackend, Usage};
use crate::cancel::CancelToken;
use crate::config::LlmSettings;
use crate::prompts::{PromptCatalog, RenderedPrompt};
use crate::router::ModelRouter;

/// Extraction temperature is pinned low for determinism.
const TEMPERATURE: f32 = 0.1;

enum ChainOutcome {
    Success {
        data: ItemData,
        model: String,
        usage: TokenUsage,
    },
    Failed {
        last_error: String,
    },
    Cancelled,
}

/// Structured extraction over a routed fallback chain.
pub struct ExtractionEngine {
    router: Arc<ModelRouter>,
    catalog: Arc<PromptCatalog>,
    monitor: Arc<ExtractionMonitor>,
    store: Arc<dyn SectionStore>,
    model_timeout: Duration,
    max_few_shot: usize,
}

impl ExtractionEngine {
    pub fn new(
        router: Arc<ModelRouter>,
        catalog: Arc<PromptCatalog>,
        monitor: Arc<ExtractionMonitor>,
        store: Arc<dyn SectionStore>,
        settings: &LlmSettings,
    ) -> Self {
        Self {
            router,
            catalog,
            monitor,
            store,
            model_timeout: settings.model_timeout,
            max_few_shot: settings.max_few_shot_examples,
        }
    }

    pub fn router(&self) -> &Arc<ModelRouter> {
        &self.router
    }

    /// Extract one section's structured record.
    ///
    /// Never returns an error: every outcome is an [`ExtractionResult`]
    /// with `success`, `failed`, or `skipped` status, mirrored to the
    /// store.
    pub async fn extract_section(
        &self,
        fdd_id: Uuid,
        item_no: u8,
        content: &str,
        franchise_name: Option<&str>,
        preference: Option<BackendId>,
        cancel: &CancelToken,
    ) -> ExtractionResult {
        // Items without a registered schema or template are skipped
        // before consuming a concurrency slot.
        let Some(schema) = response_schema(item_no) else {
            return self
                .finish_skipped(fdd_id, item_no, "no response schema registered")
                .await;
        };
        let Some(template) = self.catalog.template_for_item(item_no) else {
            return self
                .finish_skipped(fdd_id, item_no, "no prompt template registered")
                .await;
        };

        let trimmed = content.trim();
        if trimmed.is_empty() {
            let scope = self.monitor.start_extraction(fdd_id, item_no, "none");
            scope.set_failed("no text content");
            return self.finish_failed(fdd_id, item_no, "no text content").await;
        }

        let mut vars: HashMap<&str, String> = HashMap::new();
        vars.insert("section_content", trimmed.to_string());
        if let Some(name) = franchise_name {
            vars.insert("franchise_name", name.to_string());
        }
        let rendered = self.catalog.render(template, &vars, self.max_few_shot);

        // The processing transition holds the gate for the whole section.
        let _permit = tokio::select! {
            _ = cancel.cancelled() => {
                let scope = self.monitor.start_extraction(fdd_id, item_no, "none");
                scope.set_failed("cancelled");
                return self.finish_failed(fdd_id, item_no, "cancelled").await;
            }
            permit = self.router.acquire() => permit,
        };

        let primary = preference.unwrap_or_else(|| ModelRouter::primary_for(item_no));
        self.store_status(
            fdd_id,
            item_no,
            ExtractionStatus::Processing,
            Some(&primary.to_string()),
            None,
            None,
        )
        .await;
        let mut scope = self.monitor.start_extraction(fdd_id, item_no, primary.to_string());

        let chain = self.router.fallback_chain(item_no, preference);
        if chain.is_empty() {
            scope.set_failed("no model backends available");
            return self
                .finish_failed(fdd_id, item_no, "no model backends available")
                .await;
        }

        let outcome = tokio::time::timeout(
            self.model_timeout * 3,
            self.run_chain(&chain, &rendered, &schema, item_no, cancel),
        )
        .await;

        match outcome {
            Ok(ChainOutcome::Success { data, model, usage }) => {
                let result = ExtractionResult::success(item_no, model.clone(), data);
                self.store_status(
                    fdd_id,
                    item_no,
                    ExtractionStatus::Success,
                    Some(&model),
                    None,
                    Some(result.attempted_at),
                )
                .await;
                self.record(fdd_id, &result).await;
                scope.set_model(model);
                scope.set_success(usage);
                result
            }
            Ok(ChainOutcome::Cancelled) => {
                scope.set_failed("cancelled");
                self.finish_failed(fdd_id, item_no, "cancelled").await
            }
            Ok(ChainOutcome::Failed { last_error }) => {
                let message = format!("all models failed: {last_error}");
                scope.set_failed(&message);
                self.finish_failed(fdd_id, item_no, &message).await
            }
            Err(_) => {
                scope.set_failed("section extraction timed out");
                self.finish_failed(fdd_id, item_no, "section extraction timed out")
                    .await
            }
        }
    }

    /// Walk the fallback chain: retries with backoff on transient errors,
    /// immediate advance on schema violations and fatal errors.
    async fn run_chain(
        &self,
        chain: &[Arc<dyn ModelBackend>],
        rendered: &RenderedPrompt,
        schema: &Value,
        item_no: u8,
        cancel: &CancelToken,
    ) -> ChainOutcome {
        let retry = self.router.retry_policy().clone();
        let mut last_error = String::from("no backends attempted");

        'backends: for backend in chain {
            let mut attempt = 1u32;
            loop {
                if cancel.is_cancelled() {
                    return ChainOutcome::Cancelled;
                }

                debug!(backend = %backend.id(), item_no, attempt, "calling model backend");
                let call = backend.extract(&rendered.system, &rendered.user, schema, TEMPERATURE);
                let call_result = tokio::select! {
                    _ = cancel.cancelled() => return ChainOutcome::Cancelled,
                    result = tokio::time::timeout(self.model_timeout, call) => match result {
                        Ok(inner) => inner,
                        Err(_) => Err(BackendError::Transient {
                            message: "model call timed out".into(),
                            retry_after_ms: None,
                        }),
                    },
                };

                match call_result {
                    Ok((value, usage)) => match ItemData::from_value(item_no, value) {
                        Ok(data) => {
                            self.router.record_success(backend.id());
                            let model = format!("{}/{}", backend.id(), backend.model_id());
                            let usage = self.account_usage(backend, usage, rendered);
                            return ChainOutcome::Success { data, model, usage };
                        }
                        Err(violation) => {
                            // Schema validation is authoritative: a reply
                            // that does not conform is this model's failure.
                            warn!(backend = %backend.id(), item_no, error = %violation, "schema violation");
                            self.router.record_failure(backend.id());
                            last_error = violation.to_string();
                            continue 'backends;
                        }
                    },
                    Err(error) if error.is_transient() && attempt < retry.max_attempts => {
                        let mut delay = retry.delay_for(attempt);
                        if let BackendError::Transient {
                            retry_after_ms: Some(hint),
                            ..
                        } = &error
                        {
                            delay = delay.max(Duration::from_millis(*hint));
                        }
                        warn!(
                            backend = %backend.id(),
                            item_no,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %error,
                            "transient backend error, backing off"
                        );
                        tokio::select! {
                            _ = cancel.cancelled() => return ChainOutcome::Cancelled,
                            _ = tokio::time::sleep(delay) => {}
                        }
                        attempt += 1;
                    }
                    Err(error) => {
                        warn!(backend = %backend.id(), item_no, error = %error, "backend exhausted, moving to next");
                        self.router.record_failure(backend.id());
                        last_error = error.to_string();
                        continue 'backends;
                    }
                }
            }
        }

        ChainOutcome::Failed { last_error }
    }

    fn account_usage(
        &self,
        backend: &Arc<dyn ModelBackend>,
        usage: Option<Usage>,
        rendered: &RenderedPrompt,
    ) -> TokenUsage {
        let (input_tokens, output_tokens) = match usage {
            Some(u) => (u.input_tokens, u.output_tokens),
            // No reported usage: estimate from prompt size.
            None => (
                estimate_tokens(&rendered.system) + estimate_tokens(&rendered.user),
                0,
            ),
        };
        let cost_usd = (input_tokens + output_tokens) as f64 * backend.cost_per_token();
        TokenUsage {
            input_tokens,
            output_tokens,
            cost_usd,
        }
    }

    async fn finish_skipped(&self, fdd_id: Uuid, item_no: u8, reason: &str) -> ExtractionResult {
        let result = ExtractionResult::skipped(item_no, reason);
        self.store_status(fdd_id, item_no, ExtractionStatus::Skipped, None, Some(reason), None)
            .await;
        self.record(fdd_id, &result).await;
        let scope = self.monitor.start_extraction(fdd_id, item_no, "none");
        scope.set_skipped(reason);
        result
    }

    async fn finish_failed(&self, fdd_id: Uuid, item_no: u8, error: &str) -> ExtractionResult {
        let result = ExtractionResult::failed(item_no, error);
        self.store_status(fdd_id, item_no, ExtractionStatus::Failed, None, Some(error), None)
            .await;
        self.record(fdd_id, &result).await;
        result
    }

    async fn store_status(
        &self,
        fdd_id: Uuid,
        item_no: u8,
        status: ExtractionStatus,
        model: Option<&str>,
        error: Option<&str>,
        extracted_at: Option<chrono::DateTime<Utc>>,
    ) {
        self.store
            .update_status(fdd_id, item_no, status, model, error, extracted_at)
            .await
            .unwrap_or_else(|e| warn!(%fdd_id, item_no, error = %e, "store update failed"));
    }

    async fn record(&self, fdd_id: Uuid, result: &ExtractionResult) {
        self.store
            .record_result(fdd_id, result.item_no, result.clone())
            .await
            .unwrap_or_else(|e| warn!(%fdd_id, item_no = result.item_no, error = %e, "result record failed"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::{FewShotExample, PromptTemplate};
    use crate::providers::MockBackend;
    use crate::router::RetryPolicy;
    use fdd_core::{SectionArtifact, SectionBoundary, ValidationReport};
    use fdd_store::MemorySectionStore;
    use serde_json::json;

    fn test_catalog() -> PromptCatalog {
        let template = |name: &str| PromptTemplate {
            name: name.into(),
            system_prompt: "Extract structured data for {{ franchise_name }}.".into(),
            user_prompt: "Section:\n{{ section_content }}".into(),
            few_shot_examples: vec![FewShotExample {
                input: "fee of $45,000".into(),
                output: r#"{"initial_franchise_fee_cents": 4500000}"#.into(),
            }],
            validation_rules: vec![],
        };
        PromptCatalog::from_templates(vec![
            template("item5_fees"),
            template("item19_fpr"),
            template("item21_financials"),
        ])
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
        }
    }

    async fn seeded_store(fdd_id: Uuid, item_no: u8) -> Arc<MemorySectionStore> {
        let store = Arc::new(MemorySectionStore::new());
        let boundary = SectionBoundary {
            item_no,
            item_name: format!("Section {item_no}"),
            start_page: 10,
            end_page: 12,
            confidence: 0.9,
        };
        let report = ValidationReport {
            is_valid: true,
            page_count: 3,
            byte_size: 9_000,
            has_text: true,
            text_sample: Some("sample".into()),
            errors: vec![],
            quality_score: 1.0,
        };
        let artifact = SectionArtifact::new(fdd_id, &boundary, b"%PDF-1.5".to_vec(), report);
        store.upsert_artifact(&artifact).await.unwrap();
        store
    }

    fn engine_with(
        backends: Vec<Arc<dyn ModelBackend>>,
        store: Arc<MemorySectionStore>,
    ) -> ExtractionEngine {
        let settings = LlmSettings::default().with_model_timeout(Duration::from_secs(2));
        let router =
            Arc::new(ModelRouter::new(backends, 5).with_retry_policy(fast_retry()));
        ExtractionEngine::new(
            router,
            Arc::new(test_catalog()),
            Arc::new(ExtractionMonitor::new()),
            store,
            &settings,
        )
    }

    fn valid_item5() -> Value {
        json!({
            "initial_franchise_fee_cents": 4_500_000,
            "due_at": "signing",
            "refundable": false,
        })
    }

    #[tokio::test]
    async fn unsupported_item_is_skipped() {
        let fdd_id = Uuid::new_v4();
        let store = seeded_store(fdd_id, 12).await;
        let engine = engine_with(
            vec![Arc::new(MockBackend::new(BackendId::Ollama, "llama3.2"))],
            Arc::clone(&store),
        );

        let result = engine
            .extract_section(fdd_id, 12, "Territory text", None, None, &CancelToken::never())
            .await;

        assert_eq!(result.status, ExtractionStatus::Skipped);
        let stored = store.get_by_fdd(fdd_id).await.unwrap();
        assert_eq!(stored[0].extraction_status, ExtractionStatus::Skipped);
        assert_eq!(stored[0].extraction_attempts, 0);
    }

    #[tokio::test]
    async fn empty_content_fails_without_model_calls() {
        let fdd_id = Uuid::new_v4();
        let store = seeded_store(fdd_id, 5).await;
        let backend = Arc::new(MockBackend::new(BackendId::Ollama, "llama3.2"));
        let engine = engine_with(vec![backend.clone()], Arc::clone(&store));

        let result = engine
            .extract_section(fdd_id, 5, "   \n  ", None, None, &CancelToken::never())
            .await;

        assert_eq!(result.status, ExtractionStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("no text content"));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn first_success_wins() {
        let fdd_id = Uuid::new_v4();
        let store = seeded_store(fdd_id, 5).await;
        let primary = Arc::new(
            MockBackend::new(BackendId::Ollama, "llama3.2")
                .with_responses(vec![Ok(valid_item5())]),
        );
        let secondary = Arc::new(MockBackend::new(BackendId::Gemini, "gemini-1.5-pro"));
        let engine = engine_with(vec![primary.clone(), secondary.clone()], Arc::clone(&store));

        let result = engine
            .extract_section(fdd_id, 5, "ITEM 5 INITIAL FEES ...", Some("Valvoline"), None, &CancelToken::never())
            .await;

        assert!(result.is_success());
        assert_eq!(result.model_used.as_deref(), Some("ollama/llama3.2"));
        assert_eq!(primary.calls(), 1);
        assert_eq!(secondary.calls(), 0);

        let stored = store.get_by_fdd(fdd_id).await.unwrap();
        assert_eq!(stored[0].extraction_status, ExtractionStatus::Success);
        assert_eq!(stored[0].extraction_attempts, 1);
        assert!(stored[0].extracted_at.is_some());
        assert_eq!(stored[0].results.len(), 1);
    }

    #[tokio::test]
    async fn invalid_primary_falls_back_to_secondary() {
        let fdd_id = Uuid::new_v4();
        let store = seeded_store(fdd_id, 5).await;
        // Primary answers with JSON that fails schema validation.
        let primary = Arc::new(
            MockBackend::new(BackendId::Ollama, "llama3.2")
                .with_responses(vec![Ok(json!({ "unexpected": true }))]),
        );
        let secondary = Arc::new(
            MockBackend::new(BackendId::Gemini, "gemini-1.5-pro")
                .with_responses(vec![Ok(valid_item5())]),
        );
        let engine = engine_with(vec![primary.clone(), secondary.clone()], Arc::clone(&store));

        let result = engine
            .extract_section(fdd_id, 5, "ITEM 5 INITIAL FEES", None, None, &CancelToken::never())
            .await;

        assert!(result.is_success());
        assert_eq!(result.model_used.as_deref(), Some("gemini/gemini-1.5-pro"));
        assert_eq!(primary.calls(), 1);
        assert_eq!(secondary.calls(), 1);
    }

    #[tokio::test]
    async fn out_of_range_values_are_a_schema_violation() {
        let fdd_id = Uuid::new_v4();
        let store = seeded_store(fdd_id, 5).await;
        let primary = Arc::new(
            MockBackend::new(BackendId::Ollama, "llama3.2")
                .with_responses(vec![Ok(json!({ "initial_franchise_fee_cents": 900_000_000 }))]),
        );
        let secondary = Arc::new(
            MockBackend::new(BackendId::Gemini, "gemini-1.5-pro")
                .with_responses(vec![Ok(valid_item5())]),
        );
        let engine = engine_with(vec![primary, secondary.clone()], Arc::clone(&store));

        let result = engine
            .extract_section(fdd_id, 5, "ITEM 5", None, None, &CancelToken::never())
            .await;

        assert!(result.is_success());
        assert_eq!(secondary.calls(), 1);
    }

    #[tokio::test]
    async fn transient_errors_are_retried_on_the_same_backend() {
        let fdd_id = Uuid::new_v4();
        let store = seeded_store(fdd_id, 5).await;
        let flaky = Arc::new(
            MockBackend::new(BackendId::Ollama, "llama3.2").with_responses(vec![
                Err(BackendError::Transient {
                    message: "connection reset".into(),
                    retry_after_ms: None,
                }),
                Err(BackendError::Transient {
                    message: "rate limited".into(),
                    retry_after_ms: Some(1),
                }),
                Ok(valid_item5()),
            ]),
        );
        let engine = engine_with(vec![flaky.clone()], Arc::clone(&store));

        let result = engine
            .extract_section(fdd_id, 5, "ITEM 5", None, None, &CancelToken::never())
            .await;

        assert!(result.is_success());
        assert_eq!(flaky.calls(), 3);
    }

    #[tokio::test]
    async fn fatal_errors_skip_to_next_backend_without_retry() {
        let fdd_id = Uuid::new_v4();
        let store = seeded_store(fdd_id, 5).await;
        let broken = Arc::new(
            MockBackend::new(BackendId::Ollama, "llama3.2").with_responses(vec![Err(
                BackendError::Fatal {
                    status: Some(401),
                    message: "bad key".into(),
                },
            )]),
        );
        let fallback = Arc::new(
            MockBackend::new(BackendId::Gemini, "gemini-1.5-pro")
                .with_responses(vec![Ok(valid_item5())]),
        );
        let engine = engine_with(vec![broken.clone(), fallback], Arc::clone(&store));

        let result = engine
            .extract_section(fdd_id, 5, "ITEM 5", None, None, &CancelToken::never())
            .await;

        assert!(result.is_success());
        assert_eq!(broken.calls(), 1);
    }

    #[tokio::test]
    async fn all_backends_failing_fails_the_section() {
        let fdd_id = Uuid::new_v4();
        let store = seeded_store(fdd_id, 19).await;
        let backends: Vec<Arc<dyn ModelBackend>> = vec![
            Arc::new(MockBackend::new(BackendId::Gemini, "gemini-1.5-pro").with_responses(vec![
                Err(BackendError::Fatal { status: Some(403), message: "denied".into() }),
            ])),
            Arc::new(MockBackend::new(BackendId::Ollama, "llama3.2").with_responses(vec![Err(
                BackendError::InvalidResponse("not json".into()),
            )])),
        ];
        let engine = engine_with(backends, Arc::clone(&store));

        let result = engine
            .extract_section(fdd_id, 19, "ITEM 19 FPR", None, None, &CancelToken::never())
            .await;

        assert_eq!(result.status, ExtractionStatus::Failed);
        assert!(result.data.is_none());
        let error = result.error.unwrap();
        assert!(error.starts_with("all models failed"), "error: {error}");

        let stored = store.get_by_fdd(fdd_id).await.unwrap();
        assert_eq!(stored[0].extraction_status, ExtractionStatus::Failed);
        assert!(stored[0].needs_review);
    }

    #[tokio::test]
    async fn explicit_preference_reorders_the_chain() {
        let fdd_id = Uuid::new_v4();
        let store = seeded_store(fdd_id, 5).await;
        let ollama = Arc::new(MockBackend::new(BackendId::Ollama, "llama3.2"));
        let openai = Arc::new(
            MockBackend::new(BackendId::OpenAi, "gpt-4-turbo-preview")
                .with_responses(vec![Ok(valid_item5())]),
        );
        let engine = engine_with(vec![ollama.clone(), openai.clone()], Arc::clone(&store));

        let result = engine
            .extract_section(
                fdd_id,
                5,
                "ITEM 5",
                None,
                Some(BackendId::OpenAi),
                &CancelToken::never(),
            )
            .await;

        assert!(result.is_success());
        assert_eq!(result.model_used.as_deref(), Some("openai/gpt-4-turbo-preview"));
        assert_eq!(ollama.calls(), 0);
    }

    #[tokio::test]
    async fn cancellation_aborts_in_flight_extraction() {
        let fdd_id = Uuid::new_v4();
        let store = seeded_store(fdd_id, 5).await;
        let slow = Arc::new(
            MockBackend::new(BackendId::Ollama, "llama3.2")
                .with_default_response(valid_item5())
                .with_latency(5_000),
        );
        let engine = engine_with(vec![slow], Arc::clone(&store));

        let (handle, token) = crate::cancel::cancel_pair();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            handle.cancel();
        });

        let result = engine
            .extract_section(fdd_id, 5, "ITEM 5", None, None, &token)
            .await;

        assert_eq!(result.status, ExtractionStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("cancelled"));
    }

    #[tokio::test]
    async fn prior_results_survive_reruns() {
        let fdd_id = Uuid::new_v4();
        let store = seeded_store(fdd_id, 5).await;
        let backend = Arc::new(
            MockBackend::new(BackendId::Ollama, "llama3.2")
                .with_responses(vec![
                    Err(BackendError::Fatal { status: Some(400), message: "nope".into() }),
                ])
                .with_default_response(valid_item5()),
        );
        let engine = engine_with(vec![backend], Arc::clone(&store));

        let first = engine
            .extract_section(fdd_id, 5, "ITEM 5", None, None, &CancelToken::never())
            .await;
        assert_eq!(first.status, ExtractionStatus::Failed);

        let second = engine
            .extract_section(fdd_id, 5, "ITEM 5", None, None, &CancelToken::never())
            .await;
        assert!(second.is_success());

        let stored = store.get_by_fdd(fdd_id).await.unwrap();
        assert_eq!(stored[0].results.len(), 2);
        assert_eq!(stored[0].extraction_attempts, 2);
        assert_eq!(stored[0].results[0].status, ExtractionStatus::Failed);
        assert!(stored[0].results[1].is_success());
    }
}
