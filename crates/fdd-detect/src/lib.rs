//! # FDD Section Detection
//!
//! Maps the 25 FDD sections to starting pages in a layout-analyzed
//! document. Four evidence methods contribute candidates:
//!
//! 1. **Title** (confidence 0.95) - analyzer title blocks opening with
//!    "Item N", or the cover/appendix header patterns
//! 2. **Pattern** (0.80) - "Item N" references anywhere, including
//!    table-of-contents listings
//! 3. **Fuzzy** (score/100) - partial-ratio matches against the canonical
//!    headers, gated by a header-shape heuristic and keyword signatures
//! 4. **Cosine** (similarity) - TF-IDF similarity against the canonical
//!    headers
//!
//! Candidates are resolved sequentially (item 0 to 24) under a running
//! minimum page, interpolating where evidence is missing, then shaped into
//! overlapping boundaries with per-item minimum lengths. Detection never
//! fails: bad evidence degrades confidence, it does not abort.

mod assign;
mod candidates;
mod fuzzy;
mod patterns;
mod tfidf;

use fdd_core::{catalog, LayoutDocument, SectionBoundary};
use tfidf::TfidfIndex;
use tracing::info;

/// Tunable thresholds for the evidence methods.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Minimum accepted fuzzy score, 0-100.
    pub min_fuzzy_score: u8,
    /// Minimum accepted cosine similarity.
    pub min_cosine_similarity: f64,
    /// Fraction of the document after which fuzzy/cosine are skipped.
    pub appendix_fraction: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_fuzzy_score: 75,
            min_cosine_similarity: 0.5,
            appendix_fraction: 0.8,
        }
    }
}

/// Section boundary detector. Construction fits the TF-IDF reference
/// index once; `detect` is then cheap to call per document.
pub struct SectionDetector {
    pub(crate) config: DetectorConfig,
    pub(crate) index: TfidfIndex,
}

impl Default for SectionDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl SectionDetector {
    pub fn new() -> Self {
        Self::with_config(DetectorConfig::default())
    }

    pub fn with_config(config: DetectorConfig) -> Self {
        let references = catalog::reference_headers();
        Self {
            config,
            index: TfidfIndex::fit(&references),
        }
    }

    /// Assign all 25 sections to page ranges. Always returns exactly 25
    /// ordered boundaries satisfying the overlap and minimum-length rules;
    /// deterministic for a given document.
    pub fn detect(&self, doc: &LayoutDocument) -> Vec<SectionBoundary> {
        let total_pages = doc.total_pages().max(1);
        let pool = candidates::extract_candidates(doc, &self.config, &self.index);
        let chosen = assign::resolve(pool, total_pages);

        let mut boundaries = assign::build_boundaries(&chosen, total_pages);
        assign::adjust_for_minimum_pages(&mut boundaries, total_pages);
        assign::normalize(&mut boundaries, total_pages);

        info!(
            total_pages,
            high_confidence = boundaries.iter().filter(|b| b.confidence >= 0.8).count(),
            "section detection complete"
        );
        boundaries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fdd_core::{parse_layout, verify_boundaries};
    use serde_json::json;

    fn block(kind: &str, text: &str) -> serde_json::Value {
        json!({
            "type": kind,
            "bbox": [40.0, 50.0, 560.0, 80.0],
            "lines": [{ "spans": [{ "content": text }] }],
        })
    }

    /// A document of `total` pages with title blocks at the given
    /// (page_number, text) positions.
    fn doc_with_titles(total: usize, titles: &[(u32, &str)]) -> LayoutDocument {
        let pages: Vec<serde_json::Value> = (0..total)
            .map(|idx| {
                let blocks: Vec<serde_json::Value> = titles
                    .iter()
                    .filter(|(page, _)| *page == idx as u32 + 1)
                    .map(|(_, text)| block("title", text))
                    .collect();
                json!({ "page_idx": idx, "para_blocks": blocks })
            })
            .collect();
        parse_layout(&json!({ "pdf_info": pages }).to_string()).unwrap()
    }

    #[test]
    fn clean_document_pins_titled_items() {
        // A 75-page document with clean "Item N" title blocks.
        let doc = doc_with_titles(
            75,
            &[
                (9, "Item 1: The Franchisor, and any Parents, Predecessors, and Affiliates"),
                (17, "Item 5: Initial Fees"),
                (50, "Item 19: Financial Performance Representations"),
                (65, "Item 21: Financial Statements"),
            ],
        );
        let detector = SectionDetector::new();
        let boundaries = detector.detect(&doc);

        verify_boundaries(&boundaries, 75).unwrap();
        assert_eq!(boundaries.len(), 25);
        assert_eq!(boundaries[0].start_page, 1);
        assert_eq!(boundaries[1].start_page, 9);
        assert_eq!(boundaries[5].start_page, 17);
        assert_eq!(boundaries[19].start_page, 50);
        assert_eq!(boundaries[21].start_page, 65);
        assert!((boundaries[5].confidence - 0.95).abs() < 1e-9);
    }

    #[test]
    fn toc_only_document_uses_pattern_evidence() {
        // No title blocks anywhere; a single TOC page lists every item.
        let toc = "Item 1 The Franchisor 5\n\
                   Item 2 Business Experience 8\n\
                   Item 3 Litigation 9\n\
                   Item 4 Bankruptcy 10\n\
                   Item 5 Initial Fees 11\n\
                   Item 6 Other Fees 13\n\
                   Item 7 Estimated Initial Investment 15\n\
                   Item 8 Restrictions On Sources Of Products And Services 18\n\
                   Item 9 Franchisee's Obligations 20\n\
                   Item 10 Financing 22";
        let pages: Vec<serde_json::Value> = (0..40)
            .map(|idx| {
                let blocks = if idx == 1 {
                    vec![block("text", toc)]
                } else {
                    vec![]
                };
                json!({ "page_idx": idx, "para_blocks": blocks })
            })
            .collect();
        let doc = parse_layout(&json!({ "pdf_info": pages }).to_string()).unwrap();

        let detector = SectionDetector::new();
        let boundaries = detector.detect(&doc);
        verify_boundaries(&boundaries, 40).unwrap();

        // Items land on the TOC-listed pages with pattern confidence.
        assert_eq!(boundaries[2].start_page, 8);
        assert_eq!(boundaries[3].start_page, 9);
        assert_eq!(boundaries[4].start_page, 10);
        assert!((boundaries[3].confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn document_with_no_evidence_yields_fallback_boundaries() {
        let doc = doc_with_titles(30, &[]);
        let detector = SectionDetector::new();
        let boundaries = detector.detect(&doc);

        verify_boundaries(&boundaries, 30).unwrap();
        assert!(boundaries.iter().all(|b| (b.confidence - 0.1).abs() < 1e-9));
    }

    #[test]
    fn twenty_page_document_never_exceeds_its_end() {
        let doc = doc_with_titles(20, &[(3, "Item 1: The Franchisor"), (8, "Item 5: Initial Fees")]);
        let detector = SectionDetector::new();
        let boundaries = detector.detect(&doc);

        verify_boundaries(&boundaries, 20).unwrap();
        assert!(boundaries.iter().all(|b| b.end_page <= 20));
    }

    #[test]
    fn detection_is_deterministic() {
        let doc = doc_with_titles(
            60,
            &[(10, "Item 5: Initial Fees"), (40, "Item 19: Financial Performance Representations")],
        );
        let detector = SectionDetector::new();
        let first = detector.detect(&doc);
        let second = detector.detect(&doc);
        assert_eq!(first, second);
    }
}
