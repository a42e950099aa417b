//! Reference data for the 25 FDD sections.
//!
//! Canonical names follow the FTC Rule 436 headers. Item 17 uses the
//! FTC-standard "Renewal, Termination, Transfer, and Dispute Resolution"
//! mapping.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Number of logical sections: cover (0), items 1-23, appendix (24).
pub const ITEM_COUNT: usize = 25;

/// Highest item number.
pub const LAST_ITEM: u8 = 24;

/// Items extracted by default when no explicit target list is given.
pub const DEFAULT_TARGET_ITEMS: [u8; 6] = [5, 6, 7, 19, 20, 21];

static CANONICAL_NAMES: [&str; ITEM_COUNT] = [
    "Cover/Introduction/Table of Contents",
    "The Franchisor, and any Parents, Predecessors, and Affiliates",
    "Business Experience",
    "Litigation",
    "Bankruptcy",
    "Initial Fees",
    "Other Fees",
    "Estimated Initial Investment",
    "Restrictions on Sources of Products and Services",
    "Franchisee's Obligations",
    "Financing",
    "Franchisor's Assistance, Advertising, Computer Systems, and Training",
    "Territory",
    "Trademarks",
    "Patents, Copyrights, and Proprietary Information",
    "Obligation to Participate in the Actual Operation of the Franchise Business",
    "Restrictions on What the Franchisee May Sell",
    "Renewal, Termination, Transfer, and Dispute Resolution",
    "Public Figures",
    "Financial Performance Representations",
    "Outlets and Franchisee Information",
    "Financial Statements",
    "Contracts",
    "Receipts",
    "Appendix/Exhibits",
];

/// Canonical FTC header for an item. Out-of-range items fall back to a
/// generic label rather than panicking; the detector never produces them.
pub fn canonical_name(item_no: u8) -> &'static str {
    CANONICAL_NAMES
        .get(item_no as usize)
        .copied()
        .unwrap_or("Unknown Item")
}

static VARIATIONS: Lazy<HashMap<u8, Vec<&'static str>>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert(
        1,
        vec![
            "The Franchisor",
            "Franchisor and Parents",
            "The Franchisor and Any Parents",
        ],
    );
    m.insert(5, vec!["Initial Fees", "Initial Fee", "Franchise Fee"]);
    m.insert(6, vec!["Other Fees", "Ongoing Fees", "Additional Fees"]);
    m.insert(
        7,
        vec![
            "Estimated Initial Investment",
            "Initial Investment",
            "Total Investment",
        ],
    );
    m.insert(11, vec!["Franchisor's Assistance", "Training", "Support"]);
    m.insert(17, vec!["Renewal, Termination", "Contract Terms"]);
    m.insert(
        19,
        vec![
            "Financial Performance",
            "Earnings Claims",
            "Financial Performance Representations",
        ],
    );
    m.insert(
        20,
        vec![
            "Outlets and Franchisee Information",
            "Outlet Information",
            "System Information",
        ],
    );
    m.insert(21, vec!["Financial Statements", "Financials"]);
    m
});

/// Accepted alternative phrasings for an item's header, if any.
pub fn variations(item_no: u8) -> &'static [&'static str] {
    VARIATIONS.get(&item_no).map(Vec::as_slice).unwrap_or(&[])
}

/// All reference strings (canonical name plus variations) paired with the
/// item that owns them. Used to build the fuzzy and cosine reference sets.
pub fn reference_headers() -> Vec<(u8, &'static str)> {
    let mut refs = Vec::new();
    for item_no in 0..ITEM_COUNT as u8 {
        refs.push((item_no, canonical_name(item_no)));
        for v in variations(item_no) {
            refs.push((item_no, *v));
        }
    }
    refs
}

/// Keyword signature used to reject implausible header matches.
pub struct KeywordRule {
    /// At least one of these must appear in the matched text.
    pub required: &'static [&'static str],
    /// None of these may appear.
    pub disqualifying: &'static [&'static str],
}

static KEYWORD_RULES: Lazy<HashMap<u8, KeywordRule>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert(
        5,
        KeywordRule {
            required: &["initial", "fee", "franchise fee"],
            disqualifying: &["adjusted gross revenue", "royalty fee"],
        },
    );
    m.insert(
        6,
        KeywordRule {
            required: &["other", "fee", "ongoing", "royalty"],
            disqualifying: &[],
        },
    );
    m.insert(
        7,
        KeywordRule {
            required: &["investment", "initial", "estimated"],
            disqualifying: &[],
        },
    );
    m.insert(
        8,
        KeywordRule {
            required: &["restrictions", "sources", "products", "services"],
            disqualifying: &["financial statements", "audited", "balance sheet"],
        },
    );
    m.insert(
        19,
        KeywordRule {
            required: &["financial", "performance", "representation", "earnings"],
            disqualifying: &[],
        },
    );
    m.insert(
        21,
        KeywordRule {
            required: &["financial", "statement", "audit"],
            disqualifying: &[],
        },
    );
    m
});

/// Keyword signature for an item, if one is defined.
pub fn keyword_rule(item_no: u8) -> Option<&'static KeywordRule> {
    KEYWORD_RULES.get(&item_no)
}

/// Minimum page counts for sections that are structurally long: detailed
/// tables (7, 20), lengthy assistance and legal sections (11, 17), and
/// financial exhibits (19, 21).
pub fn min_page_requirement(item_no: u8) -> u32 {
    match item_no {
        7 => 2,
        11 => 3,
        17 => 3,
        19 => 2,
        20 => 3,
        21 => 2,
        _ => 1,
    }
}

/// Section complexity tier, used by the model router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    /// Simple structured tables - a small local model handles these.
    Simple,
    /// Complex narratives and financials.
    Complex,
    /// Everything else.
    Medium,
}

/// Complexity tier for an item.
pub fn complexity_for(item_no: u8) -> Complexity {
    match item_no {
        5 | 6 | 7 => Complexity::Simple,
        19 | 21 => Complexity::Complex,
        _ => Complexity::Medium,
    }
}

/// Prompt-catalog template name for an item, when extraction is supported.
pub fn prompt_name_for(item_no: u8) -> Option<&'static str> {
    match item_no {
        5 => Some("item5_fees"),
        6 => Some("item6_other_fees"),
        7 => Some("item7_investment"),
        19 => Some("item19_fpr"),
        20 => Some("item20_outlets"),
        21 => Some("item21_financials"),
        _ => None,
    }
}
