//! # FDD Pipeline Coordinator
//!
//! Runs one document end to end: layout ingestion, section detection,
//! segmentation, persistence, then parallel per-section extraction.
//!
//! Stage errors before extraction (unparseable layout, broken boundary
//! invariants, unreadable source PDF) abort the run as `failed`. From
//! extraction onward failure is per-section: the run finishes `completed`
//! when every targeted section succeeded, `partial` when some did, and
//! `failed` when none did. Cancellation is cooperative; sections finished
//! before the signal keep their results.

use chrono::{DateTime, Utc};
use fdd_core::catalog::DEFAULT_TARGET_ITEMS;
use fdd_core::{
    parse_layout, verify_boundaries, BoundaryViolation, ExtractionResult, LayoutError,
    SectionBoundary,
};
use fdd_detect::SectionDetector;
use fdd_llm::{BackendId, CancelToken, ExtractionEngine};
use fdd_observe::{ExtractionMonitor, SessionSummary};
use fdd_segment::{SegmentError, Segmenter};
use fdd_store::{SectionStore, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// Per-run configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Items handed to the extraction engine; everything else is
    /// segmented and stored but not extracted.
    pub target_items: Vec<u8>,
    pub franchise_name: Option<String>,
    /// Explicit primary model, overriding complexity-tier routing.
    pub primary_preference: Option<BackendId>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_items: DEFAULT_TARGET_ITEMS.to_vec(),
            franchise_name: None,
            primary_preference: None,
        }
    }
}

/// Aggregate outcome of one document run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Partial,
    Failed,
}

/// Segmentation accounting surfaced alongside results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentationSummary {
    pub total_sections: usize,
    pub valid_sections: usize,
    pub needs_review: usize,
}

/// Everything one run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRunResult {
    pub fdd_id: Uuid,
    pub status: RunStatus,
    pub boundaries: Vec<SectionBoundary>,
    pub segmentation: SegmentationSummary,
    pub results: Vec<ExtractionResult>,
    pub session: SessionSummary,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Boundaries(#[from] BoundaryViolation),
    #[error(transparent)]
    Segment(#[from] SegmentError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Coordinates the stages for a single document.
pub struct PipelineCoordinator {
    engine: Arc<ExtractionEngine>,
    store: Arc<dyn SectionStore>,
    monitor: Arc<ExtractionMonitor>,
    detector: SectionDetector,
    config: PipelineConfig,
}

impl PipelineCoordinator {
    pub fn new(
        engine: Arc<ExtractionEngine>,
        store: Arc<dyn SectionStore>,
        monitor: Arc<ExtractionMonitor>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            engine,
            store,
            monitor,
            detector: SectionDetector::new(),
            config,
        }
    }

    /// Process one document. Stage-level errors surface as a `failed`
    /// result rather than an `Err`; the caller always gets a run record.
    pub async fn process_document(
        &self,
        fdd_id: Uuid,
        source_pdf: &[u8],
        layout_json: &str,
        cancel: CancelToken,
    ) -> DocumentRunResult {
        let started_at = Utc::now();
        match self.run(fdd_id, source_pdf, layout_json, &cancel).await {
            Ok(mut result) => {
                result.started_at = started_at;
                result.finished_at = Utc::now();
                result
            }
            Err(error) => {
                warn!(%fdd_id, %error, "document run aborted");
                DocumentRunResult {
                    fdd_id,
                    status: RunStatus::Failed,
                    boundaries: Vec::new(),
                    segmentation: SegmentationSummary::default(),
                    results: Vec::new(),
                    session: self.monitor.session_summary(),
                    error: Some(error.to_string()),
                    started_at,
                    finished_at: Utc::now(),
                }
            }
        }
    }

    async fn run(
        &self,
        fdd_id: Uuid,
        source_pdf: &[u8],
        layout_json: &str,
        cancel: &CancelToken,
    ) -> Result<DocumentRunResult, PipelineError> {
        let doc = parse_layout(layout_json)?;
        info!(%fdd_id, total_pages = doc.total_pages, "starting document run");

        let boundaries = self.detector.detect(&doc);
        // Segmentation relies on the full invariant set; a detector bug
        // must abort here, not corrupt section PDFs downstream.
        verify_boundaries(&boundaries, doc.total_pages())?;

        let artifacts = Segmenter::segment_document(fdd_id, source_pdf, &boundaries)?;
        let segmentation = SegmentationSummary {
            total_sections: artifacts.len(),
            valid_sections: artifacts.iter().filter(|a| a.validation.is_valid).count(),
            needs_review: artifacts.iter().filter(|a| a.needs_review).count(),
        };

        for artifact in &artifacts {
            self.store.upsert_artifact(artifact).await?;
        }

        let targets: HashSet<u8> = self.config.target_items.iter().copied().collect();
        let mut handles = Vec::new();
        for artifact in artifacts.into_iter().filter(|a| targets.contains(&a.item_no)) {
            let engine = Arc::clone(&self.engine);
            let cancel = cancel.clone();
            let franchise_name = self.config.franchise_name.clone();
            let preference = self.config.primary_preference;

            handles.push(tokio::spawn(async move {
                let content = Segmenter::extract_text(&artifact.bytes);
                engine
                    .extract_section(
                        fdd_id,
                        artifact.item_no,
                        &content,
                        franchise_name.as_deref(),
                        preference,
                        &cancel,
                    )
                    .await
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => warn!(%fdd_id, "extraction task failed to join: {e}"),
            }
        }
        results.sort_by_key(|r| r.item_no);

        // A run completes only when every targeted section succeeded;
        // zero sections succeeding (including an empty target list) is a
        // failed run, never a vacuous completion.
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        let status = if !results.is_empty() && succeeded == results.len() {
            RunStatus::Completed
        } else if succeeded > 0 {
            RunStatus::Partial
        } else {
            RunStatus::Failed
        };

        info!(
            %fdd_id,
            ?status,
            targeted = results.len(),
            succeeded,
            "document run finished"
        );

        Ok(DocumentRunResult {
            fdd_id,
            status,
            boundaries,
            segmentation,
            results,
            session: self.monitor.session_summary(),
            error: None,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        })
    }
}
