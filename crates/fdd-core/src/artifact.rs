//! Segmented section PDFs and their validation reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::boundary::SectionBoundary;

/// Lifecycle of a section's extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    Pending,
    Processing,
    Success,
    Failed,
    Skipped,
}

impl ExtractionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExtractionStatus::Success | ExtractionStatus::Failed | ExtractionStatus::Skipped
        )
    }
}

impl std::fmt::Display for ExtractionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ExtractionStatus::Pending => "pending",
            ExtractionStatus::Processing => "processing",
            ExtractionStatus::Success => "success",
            ExtractionStatus::Failed => "failed",
            ExtractionStatus::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

/// Quality assessment of a segmented section PDF.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub page_count: u32,
    pub byte_size: u64,
    pub has_text: bool,
    /// First 200 characters of the first page's text, when any.
    pub text_sample: Option<String>,
    pub errors: Vec<String>,
    /// Heuristic in [0, 1]; see the segmenter for the scoring rules.
    pub quality_score: f64,
}

impl ValidationReport {
    /// A section needs human review when it is invalid or scores below 0.7.
    pub fn needs_review(&self) -> bool {
        !self.is_valid || self.quality_score < 0.7
    }

    /// Report for bytes that could not be produced at all.
    pub fn unusable(byte_size: u64, error: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            page_count: 0,
            byte_size,
            has_text: false,
            text_sample: None,
            errors: vec![error.into()],
            quality_score: 0.0,
        }
    }
}

/// One segmented section: its byte payload, range, and validation outcome.
///
/// The bytes are kept out of serialized forms; the digest identifies the
/// payload across stores and re-runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionArtifact {
    pub fdd_id: Uuid,
    pub item_no: u8,
    pub item_name: String,
    pub start_page: u32,
    pub end_page: u32,
    pub digest: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub validation: ValidationReport,
    pub needs_review: bool,
    pub created_at: DateTime<Utc>,
}

impl SectionArtifact {
    pub fn new(
        fdd_id: Uuid,
        boundary: &SectionBoundary,
        bytes: Vec<u8>,
        validation: ValidationReport,
    ) -> Self {
        let needs_review = validation.needs_review();
        Self {
            fdd_id,
            item_no: boundary.item_no,
            item_name: boundary.item_name.clone(),
            start_page: boundary.start_page,
            end_page: boundary.end_page,
            digest: sha256_hex(&bytes),
            bytes,
            validation,
            needs_review,
            created_at: Utc::now(),
        }
    }
}

/// Hex-encoded SHA-256 of a byte payload.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
