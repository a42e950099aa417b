//! Partial-ratio fuzzy matching against the canonical section headers.

use fdd_core::catalog;

/// Best similarity between the shorter string and any equally-long window
/// of the longer string, scaled to 0-100. Equivalent in spirit to a
/// token-level partial ratio: "INITIAL FEES" scores 100 against
/// "ITEM 5 INITIAL FEES".
pub fn partial_ratio(a: &str, b: &str) -> u8 {
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let (needle, haystack) = if a_chars.len() <= b_chars.len() {
        (a_chars, b_chars)
    } else {
        (b_chars, a_chars)
    };

    let needle_str: String = needle.iter().collect();
    let window = needle.len();
    let mut best = 0.0f64;

    for start in 0..=(haystack.len() - window) {
        let slice: String = haystack[start..start + window].iter().collect();
        let score = strsim::normalized_levenshtein(&needle_str, &slice);
        if score > best {
            best = score;
            if best >= 1.0 {
                break;
            }
        }
    }

    (best * 100.0).round() as u8
}

/// Best fuzzy match of block text against every canonical header and
/// variation. Returns `(item_no, score, matched_header)` when the best
/// score clears `min_score`.
pub fn best_fuzzy_match(text: &str, min_score: u8) -> Option<(u8, u8, &'static str)> {
    let text_lower = text.to_lowercase();
    let mut best: Option<(u8, u8, &'static str)> = None;

    for (item_no, header) in catalog::reference_headers() {
        let score = partial_ratio(&text_lower, &header.to_lowercase());
        if best.map_or(true, |(_, best_score, _)| score > best_score) {
            best = Some((item_no, score, header));
        }
    }

    best.filter(|(_, score, _)| *score >= min_score)
}
