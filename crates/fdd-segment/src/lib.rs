//! # FDD Segmentation
//!
//! Splits a source FDD PDF into per-section PDFs along detected
//! boundaries, and scores each section's extractability.
//!
//! Splitting is byte-exact page surgery via `lopdf`: the source document
//! is reloaded per section, pages outside the inclusive range are deleted,
//! and the remainder is re-serialized. Validation re-parses the produced
//! bytes from scratch, so a corrupt write is caught here rather than at
//! extraction time.

use fdd_core::{SectionArtifact, SectionBoundary, ValidationReport};
use lopdf::Document;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Byte-size floor below which a PDF cannot plausibly be a real section.
const MIN_VIABLE_PDF_BYTES: usize = 100;

/// Characters of first-page text captured as the validation sample.
const TEXT_SAMPLE_LEN: usize = 200;

#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("invalid page range {start_page}-{end_page}: {reason}")]
    InvalidRange {
        start_page: u32,
        end_page: u32,
        reason: String,
    },
    #[error("source PDF is unreadable: {0}")]
    InvalidPdf(String),
}

/// PDF splitter and validator.
pub struct Segmenter;

impl Segmenter {
    /// Page count of a source PDF. Fails with [`SegmentError::InvalidPdf`]
    /// when the bytes do not parse or contain no pages.
    pub fn page_count(source: &[u8]) -> Result<u32, SegmentError> {
        let doc = Document::load_mem(source).map_err(|e| SegmentError::InvalidPdf(e.to_string()))?;
        let pages = doc.get_pages().len() as u32;
        if pages == 0 {
            return Err(SegmentError::InvalidPdf("document has no pages".into()));
        }
        Ok(pages)
    }

    /// Extract the inclusive 1-based page range as a standalone PDF.
    ///
    /// `start_page < 1`, `end_page < start_page`, or `start_page` past the
    /// document end are [`SegmentError::InvalidRange`]. An `end_page` past
    /// the document end is clamped with a warning.
    pub fn split(source: &[u8], start_page: u32, end_page: u32) -> Result<Vec<u8>, SegmentError> {
        if start_page < 1 || end_page < start_page {
            return Err(SegmentError::InvalidRange {
                start_page,
                end_page,
                reason: "start must be >= 1 and end must be >= start".into(),
            });
        }

        let mut doc =
            Document::load_mem(source).map_err(|e| SegmentError::InvalidPdf(e.to_string()))?;
        let total_pages = doc.get_pages().len() as u32;
        if total_pages == 0 {
            return Err(SegmentError::InvalidPdf("document has no pages".into()));
        }
        if start_page > total_pages {
            return Err(SegmentError::InvalidRange {
                start_page,
                end_page,
                reason: format!("start exceeds document length {total_pages}"),
            });
        }

        let actual_end = if end_page > total_pages {
            warn!(end_page, total_pages, "end page clamped to document length");
            total_pages
        } else {
            end_page
        };

        let delete: Vec<u32> = (1..=total_pages)
            .filter(|page| *page < start_page || *page > actual_end)
            .collect();
        if !delete.is_empty() {
            doc.delete_pages(&delete);
        }
        doc.prune_objects();
        doc.renumber_objects();

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)
            .map_err(|e| SegmentError::InvalidPdf(format!("failed to serialize section: {e}")))?;

        debug!(
            start_page,
            end_page = actual_end,
            pages = actual_end - start_page + 1,
            bytes = bytes.len(),
            "section split complete"
        );
        Ok(bytes)
    }

    /// Parse section bytes and report structure, text presence, and a
    /// quality score. Never fails: unparseable bytes yield a zero-score
    /// report.
    pub fn validate(bytes: &[u8]) -> ValidationReport {
        let mut errors: Vec<String> = Vec::new();

        if bytes.len() < MIN_VIABLE_PDF_BYTES {
            errors.push(format!("PDF file too small ({} bytes)", bytes.len()));
        }

        let mut page_count = 0u32;
        let mut has_text = false;
        let mut text_sample = None;

        match Document::load_mem(bytes) {
            Ok(doc) => {
                page_count = doc.get_pages().len() as u32;
                if page_count == 0 {
                    errors.push("PDF contains no pages".into());
                } else {
                    match doc.extract_text(&[1]) {
                        Ok(text) => {
                            let trimmed = text.trim();
                            if trimmed.is_empty() {
                                errors.push("no extractable text found".into());
                            } else {
                                has_text = true;
                                text_sample =
                                    Some(trimmed.chars().take(TEXT_SAMPLE_LEN).collect());
                            }
                        }
                        Err(e) => errors.push(format!("text extraction failed: {e}")),
                    }
                }
            }
            Err(e) => errors.push(format!("PDF structure invalid: {e}")),
        }

        let quality_score =
            quality_score(bytes.len(), page_count, has_text, errors.len() as u32);

        ValidationReport {
            is_valid: errors.is_empty(),
            page_count,
            byte_size: bytes.len() as u64,
            has_text,
            text_sample,
            errors,
            quality_score,
        }
    }

    /// Concatenated text of every page of a section PDF. Extraction
    /// failures yield an empty string; the caller treats empty text as a
    /// failed section, not an aborted run.
    pub fn extract_text(bytes: &[u8]) -> String {
        let Ok(doc) = Document::load_mem(bytes) else {
            return String::new();
        };
        let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
        if pages.is_empty() {
            return String::new();
        }
        doc.extract_text(&pages).unwrap_or_default()
    }

    /// Split every boundary out of the source and wrap the results as
    /// artifacts. A per-section failure degrades to an unusable artifact;
    /// an unreadable source aborts the whole call.
    pub fn segment_document(
        fdd_id: Uuid,
        source: &[u8],
        boundaries: &[SectionBoundary],
    ) -> Result<Vec<SectionArtifact>, SegmentError> {
        // Surface a bad source once, up front, rather than 25 times below.
        let total_pages = Self::page_count(source)?;
        info!(%fdd_id, total_pages, sections = boundaries.len(), "segmenting document");

        let mut artifacts = Vec::with_capacity(boundaries.len());
        for boundary in boundaries {
            let artifact = match Self::split(source, boundary.start_page, boundary.end_page) {
                Ok(bytes) => {
                    let report = Self::validate(&bytes);
                    SectionArtifact::new(fdd_id, boundary, bytes, report)
                }
                Err(e) => {
                    warn!(
                        item_no = boundary.item_no,
                        start_page = boundary.start_page,
                        end_page = boundary.end_page,
                        error = %e,
                        "section split failed"
                    );
                    SectionArtifact::new(
                        fdd_id,
                        boundary,
                        Vec::new(),
                        ValidationReport::unusable(0, e.to_string()),
                    )
                }
            };
            artifacts.push(artifact);
        }

        let needing_review = artifacts.iter().filter(|a| a.needs_review).count();
        info!(%fdd_id, total = artifacts.len(), needing_review, "segmentation complete");
        Ok(artifacts)
    }
}

/// Quality heuristic in [0, 1]. Starts at 1.0 and subtracts: 0.3 per
/// structural error, 0.4 for files under 1000 bytes (0.2 under 5000),
/// 0.5 for zero pages, and 0.3 for missing text.
fn quality_score(byte_size: usize, page_count: u32, has_text: bool, error_count: u32) -> f64 {
    let mut score = 1.0;
    score -= f64::from(error_count) * 0.3;
    if byte_size < 1000 {
        score -= 0.4;
    } else if byte_size < 5000 {
        score -= 0.2;
    }
    if page_count == 0 {
        score -= 0.5;
    }
    if !has_text {
        score -= 0.3;
    }
    score.clamp(0.0, 1.0)
}
