//! Observability utilities for the FDD pipeline: tracing setup and
//! per-extraction monitoring.

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

/// Initialize tracing with default configuration
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

/// Initialize tracing with compact output
pub fn init_tracing_compact() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().compact())
        .init();
}

/// Token accounting for one extraction attempt. When a backend reports no
/// usage, callers estimate with [`estimate_tokens`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Rough token estimate for text without reported usage: ~4 characters
/// per token.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.len() / 4) as u64
}

/// Aggregate extraction metrics for the process lifetime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionMetrics {
    pub total_extractions: u64,
    pub successful_extractions: u64,
    pub failed_extractions: u64,
    pub skipped_extractions: u64,
    pub total_tokens_used: u64,
    pub total_cost_usd: f64,
    /// Rolling mean latency across all recorded extractions.
    pub average_response_ms: f64,
    pub model_usage_count: HashMap<String, u64>,
}

impl ExtractionMetrics {
    fn record(&mut self, outcome: Outcome, model: &str, usage: &TokenUsage, elapsed_ms: u64) {
        self.total_extractions += 1;
        match outcome {
            Outcome::Success => self.successful_extractions += 1,
            Outcome::Failed => self.failed_extractions += 1,
            Outcome::Skipped => self.skipped_extractions += 1,
        }
        self.total_tokens_used += usage.total();
        self.total_cost_usd += usage.cost_usd;
        if !model.is_empty() {
            *self.model_usage_count.entry(model.to_string()).or_insert(0) += 1;
        }

        let n = self.total_extractions as f64;
        self.average_response_ms =
            self.average_response_ms * (n - 1.0) / n + elapsed_ms as f64 / n;
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_extractions == 0 {
            0.0
        } else {
            self.successful_extractions as f64 / self.total_extractions as f64
        }
    }
}

/// Snapshot of the monitor's state, embedded in coordinator results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub started_at: DateTime<Utc>,
    pub snapshot_at: DateTime<Utc>,
    pub metrics: ExtractionMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Failed,
    Skipped,
}

/// Process-wide extraction monitor. Constructed once and passed to the
/// coordinator as a dependency; all updates go through the scoped
/// [`MonitoredExtraction`] guard.
pub struct ExtractionMonitor {
    started_at: DateTime<Utc>,
    metrics: Mutex<ExtractionMetrics>,
}

impl Default for ExtractionMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionMonitor {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            metrics: Mutex::new(ExtractionMetrics::default()),
        }
    }

    /// Begin a monitored extraction scope.
    pub fn start_extraction(
        &self,
        fdd_id: Uuid,
        item_no: u8,
        model: impl Into<String>,
    ) -> MonitoredExtraction<'_> {
        let model = model.into();
        info!(%fdd_id, item_no, model, "extraction started");
        MonitoredExtraction {
            monitor: self,
            fdd_id,
            item_no,
            model,
            started: Instant::now(),
            finished: false,
        }
    }

    pub fn session_summary(&self) -> SessionSummary {
        SessionSummary {
            started_at: self.started_at,
            snapshot_at: Utc::now(),
            metrics: self.metrics.lock().expect("metrics lock poisoned").clone(),
        }
    }

    fn record(&self, outcome: Outcome, model: &str, usage: &TokenUsage, elapsed_ms: u64) {
        let outcome_label = match outcome {
            Outcome::Success => "success",
            Outcome::Failed => "failed",
            Outcome::Skipped => "skipped",
        };
        counter!("fdd_extractions_total", "outcome" => outcome_label).increment(1);
        histogram!("fdd_extraction_duration_ms").record(elapsed_ms as f64);

        let mut metrics = self.metrics.lock().expect("metrics lock poisoned");
        metrics.record(outcome, model, usage, elapsed_ms);
    }
}

/// Scoped measurement of one extraction. Terminal methods consume the
/// guard; dropping it without one records a failure so a panicked task
/// still shows up in the metrics.
pub struct MonitoredExtraction<'a> {
    monitor: &'a ExtractionMonitor,
    fdd_id: Uuid,
    item_no: u8,
    model: String,
    started: Instant,
    finished: bool,
}

impl MonitoredExtraction<'_> {
    /// The model actually used may differ from the primary the scope was
    /// opened with (fallback chain).
    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub fn set_success(mut self, usage: TokenUsage) {
        let elapsed_ms = self.elapsed_ms();
        info!(
            fdd_id = %self.fdd_id,
            item_no = self.item_no,
            model = self.model,
            elapsed_ms,
            tokens = usage.total(),
            "extraction succeeded"
        );
        self.monitor
            .record(Outcome::Success, &self.model, &usage, elapsed_ms);
        self.finished = true;
    }

    pub fn set_failed(mut self, error: &str) {
        let elapsed_ms = self.elapsed_ms();
        warn!(
            fdd_id = %self.fdd_id,
            item_no = self.item_no,
            model = self.model,
            elapsed_ms,
            error,
            "extraction failed"
        );
        self.monitor
            .record(Outcome::Failed, &self.model, &TokenUsage::default(), elapsed_ms);
        self.finished = true;
    }

    pub fn set_skipped(mut self, reason: &str) {
        let elapsed_ms = self.elapsed_ms();
        info!(
            fdd_id = %self.fdd_id,
            item_no = self.item_no,
            reason,
            "extraction skipped"
        );
        self.monitor
            .record(Outcome::Skipped, "", &TokenUsage::default(), elapsed_ms);
        self.finished = true;
    }
}

impl Drop for MonitoredExtraction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let elapsed_ms = self.elapsed_ms();
            warn!(
                fdd_id = %self.fdd_id,
                item_no = self.item_no,
                "extraction scope dropped without an outcome"
            );
            self.monitor.record(
                Outcome::Failed,
                &self.model,
                &TokenUsage::default(),
                elapsed_ms,
            );
        }
    }
}
