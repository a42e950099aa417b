//! Section candidates and boundaries.
//!
//! The detector pools [`SectionCandidate`]s from several evidence methods
//! and resolves them into exactly [`crate::catalog::ITEM_COUNT`] ordered
//! [`SectionBoundary`] records. Adjacent boundaries overlap by one page:
//! a section's end page equals the next section's start page, so the page
//! carrying the next header is included in both section PDFs.

use crate::catalog::ITEM_COUNT;
use crate::layout::BlockKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a candidate was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMethod {
    Title,
    Pattern,
    Fuzzy,
    Cosine,
    Interpolated,
    Fallback,
}

impl std::fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DetectionMethod::Title => "title",
            DetectionMethod::Pattern => "pattern",
            DetectionMethod::Fuzzy => "fuzzy",
            DetectionMethod::Cosine => "cosine",
            DetectionMethod::Interpolated => "interpolated",
            DetectionMethod::Fallback => "fallback",
        };
        f.write_str(name)
    }
}

/// A potential section start found on one page by one evidence method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionCandidate {
    pub item_no: u8,
    pub item_name: String,
    /// 1-based page number.
    pub page_number: u32,
    pub confidence: f64,
    pub text: String,
    pub bbox: [f64; 4],
    pub method: DetectionMethod,
    pub element_kind: BlockKind,
}

/// Final inclusive page range assigned to one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionBoundary {
    pub item_no: u8,
    pub item_name: String,
    pub start_page: u32,
    pub end_page: u32,
    pub confidence: f64,
}

impl SectionBoundary {
    pub fn page_count(&self) -> u32 {
        self.end_page - self.start_page + 1
    }
}

/// A violated boundary-list invariant.
#[derive(Debug, Error)]
pub enum BoundaryViolation {
    #[error("expected {ITEM_COUNT} boundaries, got {0}")]
    Count(usize),
    #[error("boundary at index {index} is item {found}, expected item {expected}")]
    ItemOrder {
        index: usize,
        found: u8,
        expected: u8,
    },
    #[error("item 0 starts on page {0}, must start on page 1")]
    FirstStart(u32),
    #[error("item {item_no} has start_page {start_page} > end_page {end_page}")]
    Inverted {
        item_no: u8,
        start_page: u32,
        end_page: u32,
    },
    #[error("item {item_no} starts on page {start_page}, before item {prev_item} on page {prev_start}")]
    StartOrder {
        item_no: u8,
        start_page: u32,
        prev_item: u8,
        prev_start: u32,
    },
    #[error("item {item_no} ends on page {end_page} but item {next_item} starts on page {next_start}")]
    Overlap {
        item_no: u8,
        end_page: u32,
        next_item: u8,
        next_start: u32,
    },
    #[error("item {item_no} ends on page {end_page}, past the document end {total_pages}")]
    PastEnd {
        item_no: u8,
        end_page: u32,
        total_pages: u32,
    },
    #[error("item {item_no} has confidence {confidence} outside [0, 1]")]
    Confidence { item_no: u8, confidence: f64 },
}

/// Check the full boundary-list contract: exactly one boundary per item in
/// order, item 0 starting on page 1, monotone starts, the one-page overlap
/// rule (the last section ends at the document end, earlier sections end
/// at or past the next section's start), and confidences in [0, 1].
pub fn verify_boundaries(
    boundaries: &[SectionBoundary],
    total_pages: u32,
) -> Result<(), BoundaryViolation> {
    if boundaries.len() != ITEM_COUNT {
        return Err(BoundaryViolation::Count(boundaries.len()));
    }

    for (index, boundary) in boundaries.iter().enumerate() {
        if boundary.item_no as usize != index {
            return Err(BoundaryViolation::ItemOrder {
                index,
                found: boundary.item_no,
                expected: index as u8,
            });
        }
        if !(0.0..=1.0).contains(&boundary.confidence) {
            return Err(BoundaryViolation::Confidence {
                item_no: boundary.item_no,
                confidence: boundary.confidence,
            });
        }
        if boundary.start_page > boundary.end_page {
            return Err(BoundaryViolation::Inverted {
                item_no: boundary.item_no,
                start_page: boundary.start_page,
                end_page: boundary.end_page,
            });
        }
        if boundary.end_page > total_pages {
            return Err(BoundaryViolation::PastEnd {
                item_no: boundary.item_no,
                end_page: boundary.end_page,
                total_pages,
            });
        }
    }

    if boundaries[0].start_page != 1 {
        return Err(BoundaryViolation::FirstStart(boundaries[0].start_page));
    }

    for pair in boundaries.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if next.start_page < prev.start_page {
            return Err(BoundaryViolation::StartOrder {
                item_no: next.item_no,
                start_page: next.start_page,
                prev_item: prev.item_no,
                prev_start: prev.start_page,
            });
        }
        // Minimum-length extension may push end_page past the raw overlap,
        // so "at least the next start" is the contract here.
        if prev.end_page < next.start_page {
            return Err(BoundaryViolation::Overlap {
                item_no: prev.item_no,
                end_page: prev.end_page,
                next_item: next.item_no,
                next_start: next.start_page,
            });
        }
    }

    let last = &boundaries[ITEM_COUNT - 1];
    if last.end_page != total_pages {
        return Err(BoundaryViolation::PastEnd {
            item_no: last.item_no,
            end_page: last.end_page,
            total_pages,
        });
    }

    Ok(())
}
