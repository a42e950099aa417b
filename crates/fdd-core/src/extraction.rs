//! Typed extraction responses for the supported disclosure items.
//!
//! Model backends return loosely-shaped JSON; these types are the
//! authoritative boundary check. A response that deserializes but fails
//! [`ItemData::validate`] counts as that backend's failure, exactly like a
//! malformed response. All monetary values are integer cents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::artifact::ExtractionStatus;

/// Maximum plausible initial franchise fee: $1M in cents.
const MAX_INITIAL_FEE_CENTS: i64 = 100_000_000;

/// A model response that does not conform to the item's schema.
#[derive(Debug, Error)]
#[error("item {item_no} response failed validation: {reason}")]
pub struct SchemaViolation {
    pub item_no: u8,
    pub reason: String,
}

impl SchemaViolation {
    fn new(item_no: u8, reason: impl Into<String>) -> Self {
        Self {
            item_no,
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Item 5 - Initial Fees
// =============================================================================

/// When a fee falls due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DueAt {
    #[default]
    Signing,
    Training,
    Opening,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    Veteran,
    MultiUnit,
    Conversion,
    Promotional,
    Other,
}

/// A discount on the initial fee: a fixed amount or a percentage, never both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitialFeeDiscount {
    pub discount_type: DiscountType,
    #[serde(default)]
    pub amount_cents: Option<i64>,
    #[serde(default)]
    pub percentage: Option<f64>,
    pub description: String,
    #[serde(default)]
    pub conditions: Option<String>,
}

impl InitialFeeDiscount {
    fn validate(&self, item_no: u8) -> Result<(), SchemaViolation> {
        match (self.amount_cents, self.percentage) {
            (Some(_), Some(_)) => Err(SchemaViolation::new(
                item_no,
                "discount specifies both amount_cents and percentage",
            )),
            (None, None) => Err(SchemaViolation::new(
                item_no,
                "discount specifies neither amount_cents nor percentage",
            )),
            (Some(amount), None) if amount < 0 => Err(SchemaViolation::new(
                item_no,
                "discount amount_cents is negative",
            )),
            (None, Some(pct)) if !(0.0..=100.0).contains(&pct) => Err(SchemaViolation::new(
                item_no,
                format!("discount percentage {pct} outside [0, 100]"),
            )),
            _ => Ok(()),
        }
    }
}

/// A named initial fee beyond the primary franchise fee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdditionalFee {
    pub fee_name: String,
    pub amount_cents: i64,
    #[serde(default)]
    pub due_at: Option<DueAt>,
    #[serde(default)]
    pub refundable: bool,
    #[serde(default)]
    pub refund_conditions: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Item 5 - Initial Fees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item5Fees {
    pub initial_franchise_fee_cents: i64,
    #[serde(default)]
    pub additional_fees: Vec<AdditionalFee>,
    #[serde(default)]
    pub additional_unit_fee_cents: Option<i64>,
    #[serde(default)]
    pub discounts: Vec<InitialFeeDiscount>,
    #[serde(default)]
    pub payment_terms: Option<String>,
    #[serde(default)]
    pub due_at: DueAt,
    #[serde(default)]
    pub refundable: bool,
    #[serde(default)]
    pub refund_conditions: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Item5Fees {
    pub fn validate(&self) -> Result<(), SchemaViolation> {
        if !(0..=MAX_INITIAL_FEE_CENTS).contains(&self.initial_franchise_fee_cents) {
            return Err(SchemaViolation::new(
                5,
                format!(
                    "initial_franchise_fee_cents {} outside [0, {MAX_INITIAL_FEE_CENTS}]",
                    self.initial_franchise_fee_cents
                ),
            ));
        }
        if let Some(unit_fee) = self.additional_unit_fee_cents {
            if unit_fee < 0 {
                return Err(SchemaViolation::new(5, "additional_unit_fee_cents is negative"));
            }
        }
        for fee in &self.additional_fees {
            if fee.fee_name.trim().is_empty() {
                return Err(SchemaViolation::new(5, "additional fee with empty name"));
            }
            if fee.amount_cents < 0 {
                return Err(SchemaViolation::new(
                    5,
                    format!("additional fee '{}' has negative amount", fee.fee_name),
                ));
            }
        }
        for discount in &self.discounts {
            discount.validate(5)?;
        }
        Ok(())
    }

    /// Primary fee plus all additional initial fees.
    pub fn total_minimum_investment_cents(&self) -> i64 {
        self.initial_franchise_fee_cents
            + self
                .additional_fees
                .iter()
                .map(|fee| fee.amount_cents)
                .sum::<i64>()
    }
}

// =============================================================================
// Item 6 - Other Fees
// =============================================================================

/// A recurring or conditional fee from the Item 6 table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringFee {
    pub name: String,
    /// Dollar figure or formula text ("6% of gross sales").
    pub amount_or_formula: String,
    pub frequency: String,
    #[serde(default)]
    pub due_on: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Item 6 - Other Fees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item6OtherFees {
    pub fees: Vec<RecurringFee>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Item6OtherFees {
    pub fn validate(&self) -> Result<(), SchemaViolation> {
        for fee in &self.fees {
            if fee.name.trim().is_empty() {
                return Err(SchemaViolation::new(6, "fee with empty name"));
            }
            if fee.amount_or_formula.trim().is_empty() {
                return Err(SchemaViolation::new(
                    6,
                    format!("fee '{}' has empty amount_or_formula", fee.name),
                ));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Item 7 - Estimated Initial Investment
// =============================================================================

/// One row of the Item 7 investment table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestmentRow {
    pub category: String,
    pub amount_low_cents: i64,
    pub amount_high_cents: i64,
    #[serde(default)]
    pub method_of_payment: Option<String>,
    #[serde(default)]
    pub when_due: Option<String>,
    #[serde(default)]
    pub to_whom: Option<String>,
}

/// Item 7 - Estimated Initial Investment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item7Investment {
    pub rows: Vec<InvestmentRow>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Item7Investment {
    pub fn validate(&self) -> Result<(), SchemaViolation> {
        for row in &self.rows {
            if row.category.trim().is_empty() {
                return Err(SchemaViolation::new(7, "investment row with empty category"));
            }
            if row.amount_low_cents < 0 {
                return Err(SchemaViolation::new(
                    7,
                    format!("'{}' has negative low estimate", row.category),
                ));
            }
            if row.amount_high_cents < row.amount_low_cents {
                return Err(SchemaViolation::new(
                    7,
                    format!("'{}' has high estimate below low estimate", row.category),
                ));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Item 19 - Financial Performance Representations
// =============================================================================

/// A single table of financial performance data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FprTable {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Item 19 - Financial Performance Representations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item19Fpr {
    pub tables: Vec<FprTable>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Item19Fpr {
    pub fn validate(&self) -> Result<(), SchemaViolation> {
        for table in &self.tables {
            if table.name.trim().is_empty() {
                return Err(SchemaViolation::new(19, "table with empty name"));
            }
            if table.headers.is_empty() && !table.rows.is_empty() {
                return Err(SchemaViolation::new(
                    19,
                    format!("table '{}' has rows but no headers", table.name),
                ));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Item 20 - Outlets and Franchisee Information
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutletType {
    Franchised,
    CompanyOwned,
}

/// Outlet counts and transfers for one state and year.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutletRow {
    pub state: String,
    pub year: i32,
    pub outlet_type: OutletType,
    pub count_start: i64,
    #[serde(default)]
    pub opened: i64,
    #[serde(default)]
    pub closed: i64,
    #[serde(default)]
    pub transferred: i64,
    pub count_end: i64,
}

/// Item 20 - Outlets and Franchisee Information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item20Outlets {
    pub rows: Vec<OutletRow>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Item20Outlets {
    pub fn validate(&self) -> Result<(), SchemaViolation> {
        for row in &self.rows {
            if row.state.trim().is_empty() {
                return Err(SchemaViolation::new(20, "outlet row with empty state"));
            }
            if !(1980..=2100).contains(&row.year) {
                return Err(SchemaViolation::new(
                    20,
                    format!("outlet row year {} out of range", row.year),
                ));
            }
            if row.count_start < 0 || row.count_end < 0 || row.opened < 0 || row.closed < 0 {
                return Err(SchemaViolation::new(
                    20,
                    format!("negative outlet count for {} {}", row.state, row.year),
                ));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Item 21 - Financial Statements
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementType {
    BalanceSheet,
    IncomeStatement,
    CashFlow,
    EquityStatement,
    Other,
}

/// Reference to one financial statement included with the FDD.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementRef {
    pub statement_type: StatementType,
    #[serde(default)]
    pub fiscal_year_end: Option<String>,
    #[serde(default)]
    pub audited: bool,
    #[serde(default)]
    pub auditor: Option<String>,
    #[serde(default)]
    pub page_reference: Option<String>,
}

/// Item 21 - Financial Statements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item21Financials {
    pub statements: Vec<StatementRef>,
    #[serde(default)]
    pub audit_notes: Option<String>,
}

impl Item21Financials {
    pub fn validate(&self) -> Result<(), SchemaViolation> {
        for statement in &self.statements {
            if statement.audited && statement.auditor.as_deref().map_or(false, |a| a.trim().is_empty()) {
                return Err(SchemaViolation::new(21, "audited statement with blank auditor"));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Discriminated union + result envelope
// =============================================================================

/// Extracted data for one item, discriminated by item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "item", rename_all = "snake_case")]
pub enum ItemData {
    Fees(Item5Fees),
    OtherFees(Item6OtherFees),
    Investment(Item7Investment),
    Fpr(Item19Fpr),
    Outlets(Item20Outlets),
    Financials(Item21Financials),
}

impl ItemData {
    /// Items with a registered response schema.
    pub fn supports(item_no: u8) -> bool {
        matches!(item_no, 5 | 6 | 7 | 19 | 20 | 21)
    }

    pub fn item_no(&self) -> u8 {
        match self {
            ItemData::Fees(_) => 5,
            ItemData::OtherFees(_) => 6,
            ItemData::Investment(_) => 7,
            ItemData::Fpr(_) => 19,
            ItemData::Outlets(_) => 20,
            ItemData::Financials(_) => 21,
        }
    }

    /// Deserialize and validate a backend's JSON response for an item.
    pub fn from_value(item_no: u8, value: serde_json::Value) -> Result<Self, SchemaViolation> {
        fn decode<T: serde::de::DeserializeOwned>(
            item_no: u8,
            value: serde_json::Value,
        ) -> Result<T, SchemaViolation> {
            serde_json::from_value(value).map_err(|e| SchemaViolation::new(item_no, e.to_string()))
        }

        let data = match item_no {
            5 => ItemData::Fees(decode(item_no, value)?),
            6 => ItemData::OtherFees(decode(item_no, value)?),
            7 => ItemData::Investment(decode(item_no, value)?),
            19 => ItemData::Fpr(decode(item_no, value)?),
            20 => ItemData::Outlets(decode(item_no, value)?),
            21 => ItemData::Financials(decode(item_no, value)?),
            _ => {
                return Err(SchemaViolation::new(
                    item_no,
                    "no response schema registered for this item",
                ))
            }
        };
        data.validate()?;
        Ok(data)
    }

    pub fn validate(&self) -> Result<(), SchemaViolation> {
        match self {
            ItemData::Fees(d) => d.validate(),
            ItemData::OtherFees(d) => d.validate(),
            ItemData::Investment(d) => d.validate(),
            ItemData::Fpr(d) => d.validate(),
            ItemData::Outlets(d) => d.validate(),
            ItemData::Financials(d) => d.validate(),
        }
    }
}

/// Outcome of one extraction attempt for one section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub item_no: u8,
    pub status: ExtractionStatus,
    pub model_used: Option<String>,
    pub data: Option<ItemData>,
    pub error: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

impl ExtractionResult {
    pub fn success(item_no: u8, model_used: impl Into<String>, data: ItemData) -> Self {
        Self {
            item_no,
            status: ExtractionStatus::Success,
            model_used: Some(model_used.into()),
            data: Some(data),
            error: None,
            attempted_at: Utc::now(),
        }
    }

    pub fn failed(item_no: u8, error: impl Into<String>) -> Self {
        Self {
            item_no,
            status: ExtractionStatus::Failed,
            model_used: None,
            data: None,
            error: Some(error.into()),
            attempted_at: Utc::now(),
        }
    }

    pub fn skipped(item_no: u8, reason: impl Into<String>) -> Self {
        Self {
            item_no,
            status: ExtractionStatus::Skipped,
            model_used: None,
            data: None,
            error: Some(reason.into()),
            attempted_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExtractionStatus::Success
    }
}
