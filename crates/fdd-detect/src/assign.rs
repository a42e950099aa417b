//! Sequential section assignment and boundary construction.
//!
//! Items are assigned in order 0..24 against a running `min_page`, so a
//! later item can never start before an earlier one. Each item is resolved
//! through four phases in strict priority order; interpolation fills the
//! gaps. Boundary construction then applies the one-page overlap rule and
//! the per-item minimum-length constraints.

use fdd_core::catalog;
use fdd_core::{BlockKind, DetectionMethod, SectionBoundary, SectionCandidate};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::patterns;

/// Resolve the candidate pool into one chosen candidate per item.
pub(crate) fn resolve(
    candidates: Vec<SectionCandidate>,
    total_pages: u32,
) -> Vec<SectionCandidate> {
    if candidates.is_empty() {
        warn!("no section candidates found, falling back to even distribution");
        return fallback_sections(total_pages);
    }

    let mut by_item: HashMap<u8, Vec<SectionCandidate>> = HashMap::new();
    for candidate in candidates {
        by_item.entry(candidate.item_no).or_default().push(candidate);
    }

    let mut chosen = Vec::with_capacity(catalog::ITEM_COUNT);
    let mut min_page = 1u32;

    for item_no in 0..catalog::ITEM_COUNT as u8 {
        let mut section = match find_sequential_section(item_no, &by_item, min_page, total_pages) {
            Some(found) => found,
            None => {
                let anchor = next_anchor(item_no, &by_item, min_page);
                interpolated_section(item_no, min_page, total_pages, anchor)
            }
        };

        if item_no == 0 {
            // The cover always owns page 1, whatever the evidence said.
            if section.page_number != 1 {
                debug!(from = section.page_number, "forcing item 0 to page 1");
                section.page_number = 1;
            }
            min_page = 2;
        } else {
            min_page = section.page_number;
        }

        debug!(
            item_no,
            page = section.page_number,
            method = %section.method,
            confidence = section.confidence,
            "assigned section start"
        );
        chosen.push(section);
    }

    chosen
}

/// Earliest reachable candidate `(page, item)` of any later item, used to
/// keep interpolation from overshooting or crowding evidence that has not
/// been assigned yet.
fn next_anchor(
    item_no: u8,
    by_item: &HashMap<u8, Vec<SectionCandidate>>,
    min_page: u32,
) -> Option<(u32, u8)> {
    by_item
        .iter()
        .filter(|(other, _)| **other > item_no)
        .flat_map(|(other, list)| list.iter().map(move |c| (c.page_number, *other)))
        .filter(|(page, _)| *page >= min_page)
        .min()
}

/// Pick the best candidate for one item within `[min_page, max_page)`,
/// trying the four phases in priority order. `None` means no phase had a
/// candidate in range.
fn find_sequential_section(
    item_no: u8,
    by_item: &HashMap<u8, Vec<SectionCandidate>>,
    min_page: u32,
    total_pages: u32,
) -> Option<SectionCandidate> {
    let max_page = total_pages;
    let all = by_item.get(&item_no)?;

    let in_range =
        |c: &&SectionCandidate| c.page_number >= min_page && c.page_number < max_page;

    // Phase A: title blocks opening with the exact "Item N" pattern.
    let phase_a = all
        .iter()
        .filter(in_range)
        .filter(|c| c.method == DetectionMethod::Title && c.element_kind == BlockKind::Title)
        .filter(|c| patterns::has_exact_item_pattern(&c.text, item_no))
        .max_by(|a, b| compare_by_confidence_then_earlier_page(a, b));
    if let Some(best) = phase_a {
        info!(item_no, page = best.page_number, "phase A: exact title match");
        return Some(best.clone());
    }

    // Phase B: fuzzy matches, title blocks winning ties.
    let phase_b = all
        .iter()
        .filter(in_range)
        .filter(|c| c.method == DetectionMethod::Fuzzy)
        .max_by(|a, b| {
            let a_title = a.element_kind == BlockKind::Title;
            let b_title = b.element_kind == BlockKind::Title;
            a_title
                .cmp(&b_title)
                .then_with(|| compare_by_confidence_then_earlier_page(a, b))
        });
    if let Some(best) = phase_b {
        info!(item_no, page = best.page_number, "phase B: fuzzy match");
        return Some(best.clone());
    }

    // Phase C: pattern matches (covers table-of-contents listings).
    let phase_c = all
        .iter()
        .filter(in_range)
        .filter(|c| c.method == DetectionMethod::Pattern)
        .max_by(|a, b| compare_by_confidence_then_earlier_page(a, b));
    if let Some(best) = phase_c {
        info!(item_no, page = best.page_number, "phase C: pattern match");
        return Some(best.clone());
    }

    // Phase D: cosine similarity.
    let phase_d = all
        .iter()
        .filter(in_range)
        .filter(|c| c.method == DetectionMethod::Cosine)
        .max_by(|a, b| compare_by_confidence_then_earlier_page(a, b));
    if let Some(best) = phase_d {
        info!(item_no, page = best.page_number, "phase D: cosine match");
        return Some(best.clone());
    }

    warn!(item_no, min_page, max_page, "no candidate in range for item");
    None
}

fn compare_by_confidence_then_earlier_page(
    a: &SectionCandidate,
    b: &SectionCandidate,
) -> std::cmp::Ordering {
    a.confidence
        .partial_cmp(&b.confidence)
        .unwrap_or(std::cmp::Ordering::Equal)
        .then_with(|| b.page_number.cmp(&a.page_number))
}

/// Placeholder candidate for an item with no usable evidence.
///
/// With evidence for a later item in sight, the missing run is spread
/// evenly across the gap up to that anchor, so anchored items keep their
/// detected pages and minimum-length adjustment has room to work. With no
/// anchor, the estimate is the item's proportional position in the
/// document. Either way the result is clamped to `[min_page, total_pages
/// - remaining_items]`.
fn interpolated_section(
    item_no: u8,
    min_page: u32,
    total_pages: u32,
    anchor: Option<(u32, u8)>,
) -> SectionCandidate {
    let estimated = match anchor {
        Some((anchor_page, anchor_item)) => {
            let slots = u32::from(anchor_item - item_no) + 1;
            let step =
                (f64::from(anchor_page - min_page) / f64::from(slots)).round() as u32;
            min_page + step
        }
        None => {
            let proportion = f64::from(item_no) / f64::from(catalog::LAST_ITEM);
            (1.0 + f64::from(total_pages.saturating_sub(1)) * proportion).round() as u32
        }
    };

    let remaining = u32::from(catalog::LAST_ITEM - item_no);
    let upper = total_pages.saturating_sub(remaining).max(1);

    let mut page = estimated.max(min_page).min(upper).max(min_page);
    if let Some((anchor_page, _)) = anchor {
        page = page.min(anchor_page.max(min_page));
    }
    if page > total_pages {
        page = total_pages.min(min_page);
    }

    info!(item_no, page, min_page, estimated, "interpolated section start");

    SectionCandidate {
        item_no,
        item_name: catalog::canonical_name(item_no).to_string(),
        page_number: page,
        confidence: 0.3,
        text: String::new(),
        bbox: [0.0; 4],
        method: DetectionMethod::Interpolated,
        element_kind: BlockKind::Text,
    }
}

/// Evenly distributed placeholder sections for documents with no usable
/// evidence at all.
fn fallback_sections(total_pages: u32) -> Vec<SectionCandidate> {
    let pages_per_section = (total_pages / catalog::ITEM_COUNT as u32).max(1);
    (0..catalog::ITEM_COUNT as u8)
        .map(|item_no| {
            let start = (u32::from(item_no) * pages_per_section + 1).min(total_pages.max(1));
            SectionCandidate {
                item_no,
                item_name: catalog::canonical_name(item_no).to_string(),
                page_number: start,
                confidence: 0.1,
                text: String::new(),
                bbox: [0.0; 4],
                method: DetectionMethod::Fallback,
                element_kind: BlockKind::Text,
            }
        })
        .collect()
}

/// Turn chosen candidates into boundaries with the one-page overlap rule:
/// each section ends on the page where the next one starts, and the last
/// section runs to the document end.
pub(crate) fn build_boundaries(
    chosen: &[SectionCandidate],
    total_pages: u32,
) -> Vec<SectionBoundary> {
    let mut boundaries = Vec::with_capacity(chosen.len());
    for (i, candidate) in chosen.iter().enumerate() {
        let end_page = if i + 1 < chosen.len() {
            chosen[i + 1].page_number.max(candidate.page_number)
        } else {
            total_pages.max(candidate.page_number)
        };
        boundaries.push(SectionBoundary {
            item_no: candidate.item_no,
            item_name: candidate.item_name.clone(),
            start_page: candidate.page_number,
            end_page,
            confidence: candidate.confidence.clamp(0.0, 1.0),
        });
    }
    boundaries
}

/// Extend sections below their minimum page count, working backward from
/// item 24. Extension pushes later sections forward; when the document end
/// blocks extension, the section's start moves earlier instead, up to (but
/// not into) the previous section's start page.
pub(crate) fn adjust_for_minimum_pages(boundaries: &mut [SectionBoundary], total_pages: u32) {
    for i in (0..boundaries.len()).rev() {
        let min_pages = catalog::min_page_requirement(boundaries[i].item_no);
        let current = boundaries[i].page_count();
        if current >= min_pages {
            continue;
        }

        let item_no = boundaries[i].item_no;
        let pages_needed = min_pages - current;
        warn!(item_no, current, min_pages, "section below minimum page count");

        let mut new_end = boundaries[i].end_page + pages_needed;
        if new_end > total_pages {
            if i > 0 && boundaries[i].start_page > boundaries[i - 1].start_page + 1 {
                let max_move_back = boundaries[i].start_page - (boundaries[i - 1].start_page + 1);
                let move_back = pages_needed.min(max_move_back);
                boundaries[i].start_page -= move_back;
                boundaries[i - 1].end_page = boundaries[i].start_page;
                info!(item_no, move_back, "moved section start earlier");
            }
            new_end = new_end.min(total_pages);
        }

        let old_end = boundaries[i].end_page;
        boundaries[i].end_page = new_end;

        if i + 1 < boundaries.len() && boundaries[i + 1].start_page <= new_end {
            let shift = new_end - boundaries[i + 1].start_page + 1;
            shift_sections_forward(boundaries, i + 1, shift, total_pages);
        }

        info!(item_no, old_end, new_end = boundaries[i].end_page, "extended section");
    }
}

fn shift_sections_forward(
    boundaries: &mut [SectionBoundary],
    start_idx: usize,
    shift: u32,
    total_pages: u32,
) {
    for i in start_idx..boundaries.len() {
        let start = boundaries[i].start_page;
        if start + shift > total_pages {
            // Compress against the document end.
            boundaries[i].start_page = (start + shift).min(total_pages);
            boundaries[i].end_page = (boundaries[i].end_page + shift).min(total_pages);
            if boundaries[i].start_page >= boundaries[i].end_page {
                boundaries[i].end_page = (boundaries[i].start_page + 1).min(total_pages);
            }
        } else {
            boundaries[i].start_page += shift;
            boundaries[i].end_page = (boundaries[i].end_page + shift).min(total_pages);
        }
        if i > 0 {
            boundaries[i - 1].end_page = boundaries[i].start_page;
        }
    }
}

/// Final repair pass: re-impose the invariants the adjustment may have
/// disturbed, logging every repair. The detector never fails; it always
/// hands back a usable boundary list.
pub(crate) fn normalize(boundaries: &mut [SectionBoundary], total_pages: u32) {
    if boundaries.is_empty() {
        return;
    }

    if boundaries[0].start_page != 1 {
        warn!(start = boundaries[0].start_page, "repairing item 0 start page");
        boundaries[0].start_page = 1;
    }

    for i in 1..boundaries.len() {
        if boundaries[i].start_page < boundaries[i - 1].start_page {
            warn!(
                item_no = boundaries[i].item_no,
                start = boundaries[i].start_page,
                prev_start = boundaries[i - 1].start_page,
                "repairing start-page ordering"
            );
            boundaries[i].start_page = boundaries[i - 1].start_page;
        }
        if boundaries[i].start_page > total_pages {
            boundaries[i].start_page = total_pages;
        }
    }

    let last = boundaries.len() - 1;
    for boundary in boundaries.iter_mut() {
        let floor = boundary.start_page;
        let ceiling = total_pages.max(floor);
        boundary.end_page = boundary.end_page.clamp(floor, ceiling);
        boundary.confidence = boundary.confidence.clamp(0.0, 1.0);
    }

    // Overlap rule: a section may end past the next start (minimum-length
    // extension) but never before it.
    for i in 0..last {
        if boundaries[i].end_page < boundaries[i + 1].start_page {
            debug!(
                item_no = boundaries[i].item_no,
                end = boundaries[i].end_page,
                next_start = boundaries[i + 1].start_page,
                "closing gap to next section"
            );
            boundaries[i].end_page = boundaries[i + 1].start_page;
        }
    }
    boundaries[last].end_page = total_pages.max(boundaries[last].start_page);
}

#[cfg(test)]
mod tests {
    use super::*;
    use fdd_core::verify_boundaries;

    fn candidate(item_no: u8, page: u32, method: DetectionMethod) -> SectionCandidate {
        SectionCandidate {
            item_no,
            item_name: catalog::canonical_name(item_no).to_string(),
            page_number: page,
            confidence: match method {
                DetectionMethod::Title => 0.95,
                DetectionMethod::Pattern => 0.8,
                _ => 0.85,
            },
            text: format!("Item {item_no} {}", catalog::canonical_name(item_no)),
            bbox: [0.0; 4],
            method,
            element_kind: if method == DetectionMethod::Title {
                BlockKind::Title
            } else {
                BlockKind::Text
            },
        }
    }

    /// Title candidates at plausible pages for items 1..=n.
    fn dense_pool(pages: &[(u8, u32)]) -> Vec<SectionCandidate> {
        pages
            .iter()
            .map(|(item_no, page)| candidate(*item_no, *page, DetectionMethod::Title))
            .collect()
    }

    fn finish(chosen: &[SectionCandidate], total_pages: u32) -> Vec<SectionBoundary> {
        let mut boundaries = build_boundaries(chosen, total_pages);
        adjust_for_minimum_pages(&mut boundaries, total_pages);
        normalize(&mut boundaries, total_pages);
        boundaries
    }

    #[test]
    fn empty_pool_falls_back_to_even_distribution() {
        let chosen = resolve(vec![], 75);
        assert_eq!(chosen.len(), 25);
        assert!(chosen.iter().all(|c| c.method == DetectionMethod::Fallback));
        assert!((chosen[0].confidence - 0.1).abs() < f64::EPSILON);
        verify_boundaries(&finish(&chosen, 75), 75).unwrap();
    }

    #[test]
    fn sparse_title_evidence_keeps_later_candidates_reachable() {
        // Only items 1, 5, 19 and 21 carry title evidence; interpolation
        // of the in-between items must not march past page 50 and strand
        // item 19's real header.
        let pool = dense_pool(&[(1, 9), (5, 17), (19, 50), (21, 65)]);
        let chosen = resolve(pool, 75);

        assert_eq!(chosen[5].page_number, 17);
        assert_eq!(chosen[5].method, DetectionMethod::Title);
        assert_eq!(chosen[19].page_number, 50);
        assert_eq!(chosen[19].method, DetectionMethod::Title);
        assert_eq!(chosen[21].page_number, 65);
        assert_eq!(chosen[0].page_number, 1);
        assert_eq!(chosen[3].method, DetectionMethod::Interpolated);
        for pair in chosen.windows(2) {
            assert!(pair[1].page_number >= pair[0].page_number);
        }
    }

    #[test]
    fn phase_priority_prefers_exact_title_over_later_fuzzy() {
        let mut fuzzy = candidate(5, 30, DetectionMethod::Fuzzy);
        fuzzy.confidence = 1.0;
        let pool = vec![candidate(5, 17, DetectionMethod::Title), fuzzy];
        let chosen = resolve(pool, 75);
        assert_eq!(chosen[5].page_number, 17);
        assert_eq!(chosen[5].method, DetectionMethod::Title);
    }

    #[test]
    fn candidates_before_min_page_are_rejected() {
        // A TOC mention of item 10 on page 2 must lose to the sequential
        // constraint once item 9 is placed on page 30.
        let pool = vec![
            candidate(9, 30, DetectionMethod::Title),
            candidate(10, 2, DetectionMethod::Pattern),
            candidate(10, 33, DetectionMethod::Pattern),
        ];
        let chosen = resolve(pool, 75);
        assert_eq!(chosen[10].page_number, 33);
    }

    #[test]
    fn minimum_length_extension_pushes_following_sections() {
        // Item 20 on page 50 and item 21 on page 51 leave item 20 only two
        // pages; the adjustment extends it to three and pushes item 21 out.
        let pool = dense_pool(&[
            (1, 5),
            (2, 7),
            (3, 8),
            (4, 9),
            (5, 10),
            (6, 12),
            (7, 14),
            (8, 18),
            (9, 20),
            (10, 22),
            (11, 24),
            (12, 28),
            (13, 30),
            (14, 32),
            (15, 34),
            (16, 36),
            (17, 38),
            (18, 46),
            (19, 48),
            (20, 50),
            (21, 51),
        ]);
        let chosen = resolve(pool, 75);
        let boundaries = finish(&chosen, 75);

        assert!(boundaries[20].end_page >= 52, "end was {}", boundaries[20].end_page);
        assert!(boundaries[20].page_count() >= 3);
        assert_eq!(boundaries[21].start_page, 53);
        assert_eq!(boundaries[24].end_page, 75);
        verify_boundaries(&boundaries, 75).unwrap();
    }

    #[test]
    fn tiny_document_still_yields_valid_boundaries() {
        let pool = dense_pool(&[(1, 3), (5, 8)]);
        let chosen = resolve(pool, 20);
        let boundaries = finish(&chosen, 20);

        verify_boundaries(&boundaries, 20).unwrap();
        assert!(boundaries.iter().all(|b| b.end_page <= 20));
    }

    #[test]
    fn interpolation_leaves_room_for_remaining_items() {
        let section = interpolated_section(22, 1, 75, None);
        // Items 23 and 24 must still fit after this one.
        assert!(section.page_number <= 73);
        assert!((section.confidence - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn interpolation_spreads_toward_later_anchors() {
        // Item 19 has evidence on page 50; items 16-18 divide the gap.
        let section = interpolated_section(16, 40, 75, Some((50, 19)));
        assert!(section.page_number > 40);
        assert!(section.page_number < 50);

        // A single missing item lands mid-gap, not on the anchor itself.
        let section = interpolated_section(20, 50, 75, Some((65, 21)));
        assert!(section.page_number >= 55 && section.page_number <= 60);
    }
}
