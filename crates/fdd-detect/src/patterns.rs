//! Regex patterns and header heuristics shared by the evidence methods.

use once_cell::sync::Lazy;
use regex::Regex;

/// "Item N" at the start of a block, optionally followed by a separator and
/// the section description.
pub static ITEM_AT_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*item\s+(\d{1,2})\b\s*[:.\-]?\s*(.*)").unwrap());

/// Cover / introduction / table-of-contents headers marking item 0.
pub static COVER_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)^\s*franchise\s+disclosure\s+document",
        r"(?i)^\s*fdd\b",
        r"(?i)^\s*table\s+of\s+contents",
        r"(?i)^\s*introduction\b",
        r"(?i)^\s*cover\s+page",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Appendix / exhibit headers marking item 24.
pub static APPENDIX_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r"(?i)^\s*appendix\b", r"(?i)^\s*exhibit\b", r"(?i)^\s*attachment\b"]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
});

/// "Item N" lines, with an optional trailing page number as printed in
/// table-of-contents entries ("Item 5 Initial Fees ... 17").
static ITEM_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)\bitem\s+(\d{1,2})\b[:\-]?\s*([^.\n]*?)[\s.]*(?:\s(\d{1,4}))?\s*$").unwrap()
});

/// Numbered list format at line start: "5. Initial Fees    17".
static NUMBERED_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(\d{1,2})\.\s+(\S[^\n]*?)[\s.]*(?:\s(\d{1,4}))?\s*$").unwrap()
});

/// Inline "Item N Description" references without line structure.
static ITEM_INLINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bitem\s+(\d{1,2})\s+([A-Za-z][^.\n]*)").unwrap());

/// Legal boilerplate that fuzzy matching must never treat as a header.
pub const BOILERPLATE_PHRASES: [&str; 8] = [
    "the franchisor is",
    "this disclosure document",
    "if we offer you",
    "if we do not deliver",
    "receipt (your copy)",
    "receipt (copy - submit",
    "list of administrators",
    "agents for service",
];

/// Uppercased header phrases that strongly suggest a section heading.
const HEADER_PHRASES: [&str; 19] = [
    "INITIAL FEES",
    "OTHER FEES",
    "ESTIMATED INITIAL INVESTMENT",
    "BUSINESS EXPERIENCE",
    "LITIGATION",
    "BANKRUPTCY",
    "FINANCING",
    "TERRITORY",
    "TRADEMARKS",
    "PATENTS",
    "CONTRACTS",
    "RECEIPTS",
    "FRANCHISEE'S OBLIGATIONS",
    "FINANCIAL PERFORMANCE",
    "FINANCIAL STATEMENTS",
    "RESTRICTIONS ON",
    "FRANCHISOR'S ASSISTANCE",
    "PUBLIC FIGURES",
    "OUTLETS AND FRANCHISE",
];

/// Python-style title case check: every cased word starts uppercase and has
/// no further uppercase letters.
fn is_title_case(text: &str) -> bool {
    let mut saw_cased_word = false;
    for word in text.split_whitespace() {
        let mut chars = word.chars().filter(|c| c.is_alphabetic());
        match chars.next() {
            None => continue,
            Some(first) => {
                if !first.is_uppercase() {
                    return false;
                }
                if chars.any(|c| c.is_uppercase()) {
                    return false;
                }
                saw_cased_word = true;
            }
        }
    }
    saw_cased_word
}

/// Whether a block reads like a section header rather than body text:
/// short, and either all-caps/title-case, an "Item N" line, or a known
/// header phrase.
pub fn looks_like_section_header(text: &str) -> bool {
    if text.len() > 150 {
        return false;
    }

    let upper = text.to_uppercase();
    if upper == text || is_title_case(text) {
        return true;
    }

    if upper.contains("ITEM ") && text.chars().any(|c| c.is_ascii_digit()) {
        return true;
    }

    if text.len() < 100 && HEADER_PHRASES.iter().any(|p| upper.contains(p)) {
        return true;
    }

    false
}

/// Whether text contains known legal boilerplate.
pub fn is_boilerplate(text: &str) -> bool {
    let lower = text.to_lowercase();
    BOILERPLATE_PHRASES.iter().any(|p| lower.contains(p))
}

/// Match a block-leading "Item N" header (or the cover/appendix patterns
/// for items 0 and 24). Returns the item number and trailing description.
pub fn match_leading_item(text: &str) -> Option<(u8, String)> {
    if let Some(caps) = ITEM_AT_START.captures(text) {
        let item_no: u8 = caps.get(1)?.as_str().parse().ok()?;
        if item_no <= 24 {
            return Some((item_no, caps.get(2).map_or(String::new(), |m| m.as_str().trim().to_string())));
        }
    }
    if COVER_PATTERNS.iter().any(|p| p.is_match(text)) {
        return Some((0, String::new()));
    }
    if APPENDIX_PATTERNS.iter().any(|p| p.is_match(text)) {
        return Some((24, String::new()));
    }
    None
}

/// Whether text opens with an exact "Item N" pattern for a specific item
/// (or the item 0 / item 24 equivalents). Stricter than
/// [`match_leading_item`]: used for the highest-priority assignment phase.
pub fn has_exact_item_pattern(text: &str, item_no: u8) -> bool {
    let trimmed = text.trim();
    match item_no {
        0 => COVER_PATTERNS.iter().any(|p| p.is_match(trimmed)),
        24 => APPENDIX_PATTERNS.iter().any(|p| p.is_match(trimmed)),
        _ => ITEM_AT_START
            .captures(trimmed)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u8>().ok())
            .map_or(false, |found| found == item_no),
    }
}

/// An "Item N" style reference found inside a block.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemReference {
    pub item_no: u8,
    pub description: String,
    /// Page number printed at the end of a table-of-contents line, if any.
    pub listed_page: Option<u32>,
}

/// All "Item N" style references in a block, item numbers 0-24 with a
/// non-trivial description. Handles table-of-contents blocks listing many
/// items at once; one reference per item per block, preferring matches
/// that carry a printed page number.
pub fn find_all_item_patterns(text: &str) -> Vec<ItemReference> {
    let mut found: Vec<ItemReference> = Vec::new();
    let mut push = |item_no: u8, description: String, listed_page: Option<u32>| {
        if item_no > 24 || description.len() <= 3 {
            return;
        }
        match found.iter_mut().find(|r| r.item_no == item_no) {
            Some(existing) => {
                if existing.listed_page.is_none() && listed_page.is_some() {
                    existing.description = description;
                    existing.listed_page = listed_page;
                }
            }
            None => found.push(ItemReference {
                item_no,
                description,
                listed_page,
            }),
        }
    };

    for pattern in [&*ITEM_LINE, &*NUMBERED_LINE] {
        for caps in pattern.captures_iter(text) {
            let Some(item_no) = caps.get(1).and_then(|m| m.as_str().parse::<u8>().ok()) else {
                continue;
            };
            let description = caps
                .get(2)
                .map_or(String::new(), |m| m.as_str().trim().to_string());
            let listed_page = caps.get(3).and_then(|m| m.as_str().parse::<u32>().ok());
            push(item_no, description, listed_page);
        }
    }
    for caps in ITEM_INLINE.captures_iter(text) {
        let Some(item_no) = caps.get(1).and_then(|m| m.as_str().parse::<u8>().ok()) else {
            continue;
        };
        let description = caps
            .get(2)
            .map_or(String::new(), |m| m.as_str().trim().to_string());
        push(item_no, description, None);
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_item_patterns() {
        assert_eq!(match_leading_item("Item 5: Initial Fees"), Some((5, "Initial Fees".into())));
        assert_eq!(match_leading_item("ITEM 19 - FINANCIAL PERFORMANCE").map(|m| m.0), Some(19));
        assert_eq!(match_leading_item("Item 23. Receipts").map(|m| m.0), Some(23));
        assert_eq!(match_leading_item("TABLE OF CONTENTS").map(|m| m.0), Some(0));
        assert_eq!(match_leading_item("EXHIBIT A").map(|m| m.0), Some(24));
        assert!(match_leading_item("See Item 5 for details").is_none());
        assert!(match_leading_item("Item 99").is_none());
    }

    #[test]
    fn exact_item_pattern_is_anchored() {
        assert!(has_exact_item_pattern("Item 7 Estimated Initial Investment", 7));
        assert!(has_exact_item_pattern("  ITEM 7.", 7));
        assert!(!has_exact_item_pattern("Item 17 something", 7));
        assert!(!has_exact_item_pattern("refer to Item 7", 7));
        assert!(has_exact_item_pattern("APPENDIX B", 24));
        assert!(has_exact_item_pattern("FRANCHISE DISCLOSURE DOCUMENT", 0));
    }

    #[test]
    fn toc_block_yields_many_items_with_listed_pages() {
        let toc = "Item 1 The Franchisor 5\nItem 2 Business Experience 8\nItem 3 Litigation 9";
        let found = find_all_item_patterns(toc);
        let get = |item_no: u8| found.iter().find(|r| r.item_no == item_no).unwrap();
        assert_eq!(get(1).listed_page, Some(5));
        assert_eq!(get(2).listed_page, Some(8));
        assert_eq!(get(3).listed_page, Some(9));
        assert_eq!(get(2).description, "Business Experience");
    }

    #[test]
    fn toc_dot_leaders_are_stripped() {
        let found = find_all_item_patterns("Item 5 Initial Fees ......... 17");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].item_no, 5);
        assert_eq!(found[0].description, "Initial Fees");
        assert_eq!(found[0].listed_page, Some(17));
    }

    #[test]
    fn plain_header_has_no_listed_page() {
        let found = find_all_item_patterns("Item 6: Other Fees");
        assert_eq!(found[0].listed_page, None);
        assert_eq!(found[0].description, "Other Fees");
    }

    #[test]
    fn numbered_list_lines_match() {
        let found = find_all_item_patterns("7. Estimated Initial Investment    15");
        assert_eq!(found[0].item_no, 7);
        assert_eq!(found[0].listed_page, Some(15));
    }

    #[test]
    fn header_shape_heuristic() {
        assert!(looks_like_section_header("INITIAL FEES"));
        assert!(looks_like_section_header("Estimated Initial Investment"));
        assert!(looks_like_section_header("Item 12 Territory"));
        assert!(!looks_like_section_header(
            "The initial franchise fee is payable in full upon execution of the franchise \
             agreement and is not refundable under any circumstances except as described below"
        ));
    }

    #[test]
    fn boilerplate_is_flagged() {
        assert!(is_boilerplate("The Franchisor is Valvoline Instant Oil Change Franchising, Inc."));
        assert!(!is_boilerplate("Initial Fees"));
    }
}
