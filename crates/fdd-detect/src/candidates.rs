//! Candidate extraction: the four evidence methods pooled over every page.

use fdd_core::catalog;
use fdd_core::{Block, BlockKind, DetectionMethod, LayoutDocument, SectionCandidate};
use tracing::debug;

use crate::patterns;
use crate::tfidf::TfidfIndex;
use crate::DetectorConfig;

/// Keyword signature check for items that have one. Candidates from the
/// inexact methods (fuzzy, cosine) must carry at least one required
/// keyword and none of the disqualifying ones.
pub(crate) fn passes_keyword_rules(item_no: u8, text: &str) -> bool {
    let Some(rule) = catalog::keyword_rule(item_no) else {
        return true;
    };
    let lower = text.to_lowercase();
    if !rule.required.iter().any(|k| lower.contains(k)) {
        return false;
    }
    if rule.disqualifying.iter().any(|k| lower.contains(k)) {
        return false;
    }
    true
}

fn candidate(
    item_no: u8,
    item_name: String,
    page_number: u32,
    confidence: f64,
    text: &str,
    block: &Block,
    method: DetectionMethod,
) -> SectionCandidate {
    SectionCandidate {
        item_no,
        item_name,
        page_number,
        confidence,
        text: text.to_string(),
        bbox: block.bbox,
        method,
        element_kind: block.kind,
    }
}

fn titles_on_page(blocks: &[Block], page_number: u32, pool: &mut Vec<SectionCandidate>) {
    for block in blocks {
        if block.kind != BlockKind::Title {
            continue;
        }
        if let Some((item_no, description)) = patterns::match_leading_item(&block.text) {
            let item_name = if description.len() >= 5 {
                description
            } else {
                catalog::canonical_name(item_no).to_string()
            };
            pool.push(candidate(
                item_no,
                item_name,
                page_number,
                0.95,
                &block.text,
                block,
                DetectionMethod::Title,
            ));
        }
    }
}

fn patterns_on_page(
    blocks: &[Block],
    page_number: u32,
    total_pages: u32,
    pool: &mut Vec<SectionCandidate>,
) {
    for block in blocks {
        for reference in patterns::find_all_item_patterns(&block.text) {
            // Table-of-contents lines carry the section's printed page;
            // place the candidate there rather than on the TOC page.
            let target_page = match reference.listed_page {
                Some(listed) if listed >= 1 && listed <= total_pages => listed,
                _ => page_number,
            };
            pool.push(candidate(
                reference.item_no,
                catalog::canonical_name(reference.item_no).to_string(),
                target_page,
                0.80,
                &reference.description,
                block,
                DetectionMethod::Pattern,
            ));
        }
    }
}

fn fuzzy_on_page(
    blocks: &[Block],
    page_number: u32,
    min_score: u8,
    pool: &mut Vec<SectionCandidate>,
) {
    for block in blocks {
        let text = block.text.as_str();
        if text.len() < 5 || text.len() > 200 {
            continue;
        }
        if patterns::is_boilerplate(text) || !patterns::looks_like_section_header(text) {
            continue;
        }
        let Some((item_no, score, matched_header)) = crate::fuzzy::best_fuzzy_match(text, min_score)
        else {
            continue;
        };
        if !passes_keyword_rules(item_no, text) {
            debug!(item_no, page_number, text, "fuzzy match rejected by keyword rules");
            continue;
        }
        pool.push(candidate(
            item_no,
            matched_header.to_string(),
            page_number,
            f64::from(score) / 100.0,
            text,
            block,
            DetectionMethod::Fuzzy,
        ));
    }
}

fn cosine_on_page(
    blocks: &[Block],
    page_number: u32,
    index: &TfidfIndex,
    min_similarity: f64,
    pool: &mut Vec<SectionCandidate>,
) {
    for block in blocks {
        let text = block.text.as_str();
        if text.len() < 10 {
            continue;
        }
        let Some((item_no, similarity)) = index.best_match(text) else {
            continue;
        };
        if similarity < min_similarity {
            continue;
        }
        if !passes_keyword_rules(item_no, text) {
            continue;
        }
        pool.push(candidate(
            item_no,
            catalog::canonical_name(item_no).to_string(),
            page_number,
            similarity.min(1.0),
            text,
            block,
            DetectionMethod::Cosine,
        ));
    }
}

/// Run the four evidence methods over every page and pool the results.
///
/// Fuzzy and cosine are skipped beyond the first 80% of the document to
/// avoid re-matching section headers quoted inside appendix exhibits. The
/// pool is deduplicated per `(item_no, page, method)`, keeping the most
/// confident candidate, and sorted by page then confidence.
pub(crate) fn extract_candidates(
    doc: &LayoutDocument,
    config: &DetectorConfig,
    index: &TfidfIndex,
) -> Vec<SectionCandidate> {
    let total_pages = doc.total_pages().max(1);
    let appendix_threshold =
        ((f64::from(total_pages) * config.appendix_fraction) as u32).max(1);

    let mut pool = Vec::new();
    for page in &doc.pages {
        let page_number = page.page_number();
        titles_on_page(&page.blocks, page_number, &mut pool);
        patterns_on_page(&page.blocks, page_number, total_pages, &mut pool);
        if page_number <= appendix_threshold {
            fuzzy_on_page(&page.blocks, page_number, config.min_fuzzy_score, &mut pool);
            cosine_on_page(
                &page.blocks,
                page_number,
                index,
                config.min_cosine_similarity,
                &mut pool,
            );
        }
    }

    // One candidate per (item, page, method): the phased assignment filters
    // by method, so dedup must not let one method's hit evict another's.
    let before = pool.len();
    let mut deduped: Vec<SectionCandidate> = Vec::with_capacity(pool.len());
    for cand in pool {
        match deduped.iter_mut().find(|existing| {
            existing.item_no == cand.item_no
                && existing.page_number == cand.page_number
                && existing.method == cand.method
        }) {
            Some(existing) => {
                if cand.confidence > existing.confidence {
                    *existing = cand;
                }
            }
            None => deduped.push(cand),
        }
    }

    deduped.sort_by(|a, b| {
        a.page_number
            .cmp(&b.page_number)
            .then(b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal))
    });

    debug!(
        pooled = before,
        kept = deduped.len(),
        title = deduped.iter().filter(|c| c.method == DetectionMethod::Title).count(),
        pattern = deduped.iter().filter(|c| c.method == DetectionMethod::Pattern).count(),
        fuzzy = deduped.iter().filter(|c| c.method == DetectionMethod::Fuzzy).count(),
        cosine = deduped.iter().filter(|c| c.method == DetectionMethod::Cosine).count(),
        "extracted section candidates"
    );

    deduped
}
