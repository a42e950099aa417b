//! # FDD Section Store
//!
//! Persistence contract for segmented sections and their extraction
//! lifecycle, plus the in-memory implementation used by the coordinator's
//! tests and single-process runs.
//!
//! The store is keyed by `(fdd_id, item_no)` and idempotent under
//! re-runs: upserting an artifact a second time refreshes its metadata
//! without resetting the attempt counter or discarding recorded results.
//! Extraction results are appended, never overwritten, so prior attempts
//! stay auditable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fdd_core::{ExtractionResult, ExtractionStatus, SectionArtifact, ValidationReport};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no stored section for fdd {fdd_id} item {item_no}")]
    NotFound { fdd_id: Uuid, item_no: u8 },
}

/// A section's stored record: artifact metadata plus extraction lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSection {
    pub fdd_id: Uuid,
    pub item_no: u8,
    pub item_name: String,
    pub start_page: u32,
    pub end_page: u32,
    pub digest: String,
    pub validation: ValidationReport,
    pub needs_review: bool,
    pub extraction_status: ExtractionStatus,
    pub extraction_attempts: u32,
    pub extraction_model: Option<String>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub extracted_at: Option<DateTime<Utc>>,
    /// Every recorded extraction outcome, oldest first.
    pub results: Vec<ExtractionResult>,
}

impl StoredSection {
    fn from_artifact(artifact: &SectionArtifact) -> Self {
        Self {
            fdd_id: artifact.fdd_id,
            item_no: artifact.item_no,
            item_name: artifact.item_name.clone(),
            start_page: artifact.start_page,
            end_page: artifact.end_page,
            digest: artifact.digest.clone(),
            validation: artifact.validation.clone(),
            needs_review: artifact.needs_review,
            extraction_status: ExtractionStatus::Pending,
            extraction_attempts: 0,
            extraction_model: None,
            last_error: None,
            created_at: artifact.created_at,
            extracted_at: None,
            results: Vec::new(),
        }
    }
}

/// Persistence contract required by the pipeline coordinator.
///
/// Implementations must be idempotent under repeated coordinator runs and
/// safe for concurrent per-section updates.
#[async_trait]
pub trait SectionStore: Send + Sync {
    /// Insert or refresh the artifact record for `(fdd_id, item_no)`.
    async fn upsert_artifact(&self, artifact: &SectionArtifact) -> Result<(), StoreError>;

    /// Advance a section's extraction status. A transition to
    /// `processing` increments the attempt counter.
    async fn update_status(
        &self,
        fdd_id: Uuid,
        item_no: u8,
        status: ExtractionStatus,
        model: Option<&str>,
        error: Option<&str>,
        extracted_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    /// Append an extraction outcome; prior results are retained.
    async fn record_result(
        &self,
        fdd_id: Uuid,
        item_no: u8,
        result: ExtractionResult,
    ) -> Result<(), StoreError>;

    /// All sections recorded for a document, ordered by item number.
    async fn get_by_fdd(&self, fdd_id: Uuid) -> Result<Vec<StoredSection>, StoreError>;
}

/// In-memory [`SectionStore`].
#[derive(Default)]
pub struct MemorySectionStore {
    sections: RwLock<HashMap<(Uuid, u8), StoredSection>>,
}

impl MemorySectionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SectionStore for MemorySectionStore {
    async fn upsert_artifact(&self, artifact: &SectionArtifact) -> Result<(), StoreError> {
        let mut sections = self.sections.write().await;
        let key = (artifact.fdd_id, artifact.item_no);
        match sections.get_mut(&key) {
            Some(existing) => {
                // Refresh artifact metadata; extraction history survives.
                existing.item_name = artifact.item_name.clone();
                existing.start_page = artifact.start_page;
                existing.end_page = artifact.end_page;
                existing.digest = artifact.digest.clone();
                existing.validation = artifact.validation.clone();
                existing.needs_review = artifact.needs_review;
                debug!(fdd_id = %artifact.fdd_id, item_no = artifact.item_no, "refreshed artifact");
            }
            None => {
                sections.insert(key, StoredSection::from_artifact(artifact));
                debug!(fdd_id = %artifact.fdd_id, item_no = artifact.item_no, "stored new artifact");
            }
        }
        Ok(())
    }

    async fn update_status(
        &self,
        fdd_id: Uuid,
        item_no: u8,
        status: ExtractionStatus,
        model: Option<&str>,
        error: Option<&str>,
        extracted_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let mut sections = self.sections.write().await;
        let section = sections
            .get_mut(&(fdd_id, item_no))
            .ok_or(StoreError::NotFound { fdd_id, item_no })?;

        if status == ExtractionStatus::Processing {
            section.extraction_attempts += 1;
        }
        section.extraction_status = status;
        if let Some(model) = model {
            section.extraction_model = Some(model.to_string());
        }
        if let Some(error) = error {
            section.last_error = Some(error.to_string());
            if status == ExtractionStatus::Failed {
                section.needs_review = true;
            }
        }
        if extracted_at.is_some() {
            section.extracted_at = extracted_at;
        }
        Ok(())
    }

    async fn record_result(
        &self,
        fdd_id: Uuid,
        item_no: u8,
        result: ExtractionResult,
    ) -> Result<(), StoreError> {
        let mut sections = self.sections.write().await;
        let section = sections
            .get_mut(&(fdd_id, item_no))
            .ok_or(StoreError::NotFound { fdd_id, item_no })?;
        section.results.push(result);
        Ok(())
    }

    async fn get_by_fdd(&self, fdd_id: Uuid) -> Result<Vec<StoredSection>, StoreError> {
        let sections = self.sections.read().await;
        let mut found: Vec<StoredSection> = sections
            .values()
            .filter(|s| s.fdd_id == fdd_id)
            .cloned()
            .collect();
        found.sort_by_key(|s| s.item_no);
        Ok(found)
    }
}
