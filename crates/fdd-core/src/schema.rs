//! Wire-level JSON schemas for the supported items.
//!
//! These are handed to model backends that accept a response schema
//! (structured-output modes). They describe the same shapes as the typed
//! structs in [`crate::extraction`]; the typed structs remain the
//! authoritative check.

use serde_json::{json, Value};

fn money(description: &str) -> Value {
    json!({ "type": "integer", "minimum": 0, "description": description })
}

/// JSON schema for an item's expected response, when the item is supported.
pub fn response_schema(item_no: u8) -> Option<Value> {
    match item_no {
        5 => Some(item5_schema()),
        6 => Some(item6_schema()),
        7 => Some(item7_schema()),
        19 => Some(item19_schema()),
        20 => Some(item20_schema()),
        21 => Some(item21_schema()),
        _ => None,
    }
}

fn item5_schema() -> Value {
    json!({
        "type": "object",
        "required": ["initial_franchise_fee_cents"],
        "properties": {
            "initial_franchise_fee_cents": {
                "type": "integer",
                "minimum": 0,
                "maximum": 100_000_000,
                "description": "Primary initial franchise fee in cents"
            },
            "additional_fees": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["fee_name", "amount_cents"],
                    "properties": {
                        "fee_name": { "type": "string" },
                        "amount_cents": money("Fee amount in cents"),
                        "due_at": { "type": "string", "enum": ["signing", "training", "opening", "other"] },
                        "refundable": { "type": "boolean" },
                        "refund_conditions": { "type": "string" },
                        "notes": { "type": "string" }
                    }
                }
            },
            "additional_unit_fee_cents": money("Fee for additional units in cents"),
            "discounts": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["discount_type", "description"],
                    "properties": {
                        "discount_type": {
                            "type": "string",
                            "enum": ["veteran", "multi_unit", "conversion", "promotional", "other"]
                        },
                        "amount_cents": money("Fixed discount in cents (exclusive with percentage)"),
                        "percentage": { "type": "number", "minimum": 0, "maximum": 100 },
                        "description": { "type": "string" },
                        "conditions": { "type": "string" }
                    }
                }
            },
            "payment_terms": { "type": "string" },
            "due_at": { "type": "string", "enum": ["signing", "training", "opening", "other"] },
            "refundable": { "type": "boolean" },
            "refund_conditions": { "type": "string" },
            "notes": { "type": "string" }
        }
    })
}

fn item6_schema() -> Value {
    json!({
        "type": "object",
        "required": ["fees"],
        "properties": {
            "fees": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["name", "amount_or_formula", "frequency"],
                    "properties": {
                        "name": { "type": "string" },
                        "amount_or_formula": {
                            "type": "string",
                            "description": "Dollar figure or formula, e.g. '6% of gross sales'"
                        },
                        "frequency": { "type": "string" },
                        "due_on": { "type": "string" },
                        "description": { "type": "string" }
                    }
                }
            },
            "notes": { "type": "string" }
        }
    })
}

fn item7_schema() -> Value {
    json!({
        "type": "object",
        "required": ["rows"],
        "properties": {
            "rows": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["category", "amount_low_cents", "amount_high_cents"],
                    "properties": {
                        "category": { "type": "string" },
                        "amount_low_cents": money("Low estimate in cents"),
                        "amount_high_cents": money("High estimate in cents"),
                        "method_of_payment": { "type": "string" },
                        "when_due": { "type": "string" },
                        "to_whom": { "type": "string" }
                    }
                }
            },
            "notes": { "type": "string" }
        }
    })
}

fn item19_schema() -> Value {
    json!({
        "type": "object",
        "required": ["tables"],
        "properties": {
            "tables": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["name", "headers", "rows"],
                    "properties": {
                        "name": { "type": "string" },
                        "headers": { "type": "array", "items": { "type": "string" } },
                        "rows": {
                            "type": "array",
                            "items": { "type": "array", "items": { "type": "string" } }
                        },
                        "notes": { "type": "string" }
                    }
                }
            },
            "summary": { "type": "string" },
            "notes": { "type": "string" }
        }
    })
}

fn item20_schema() -> Value {
    json!({
        "type": "object",
        "required": ["rows"],
        "properties": {
            "rows": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["state", "year", "outlet_type", "count_start", "count_end"],
                    "properties": {
                        "state": { "type": "string", "description": "Two-letter state code" },
                        "year": { "type": "integer" },
                        "outlet_type": { "type": "string", "enum": ["franchised", "company_owned"] },
                        "count_start": { "type": "integer", "minimum": 0 },
                        "opened": { "type": "integer", "minimum": 0 },
                        "closed": { "type": "integer", "minimum": 0 },
                        "transferred": { "type": "integer" },
                        "count_end": { "type": "integer", "minimum": 0 }
                    }
                }
            },
            "notes": { "type": "string" }
        }
    })
}

fn item21_schema() -> Value {
    json!({
        "type": "object",
        "required": ["statements"],
        "properties": {
            "statements": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["statement_type", "audited"],
                    "properties": {
                        "statement_type": {
                            "type": "string",
                            "enum": ["balance_sheet", "income_statement", "cash_flow", "equity_statement", "other"]
                        },
                        "fiscal_year_end": { "type": "string" },
                        "audited": { "type": "boolean" },
                        "auditor": { "type": "string" },
                        "page_reference": { "type": "string" }
                    }
                }
            },
            "audit_notes": { "type": "string" }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schemas_exist_only_for_supported_items() {
        for item_no in [5u8, 6, 7, 19, 20, 21] {
            assert!(response_schema(item_no).is_some(), "item {item_no}");
        }
        for item_no in [0u8, 1, 4, 12, 24] {
            assert!(response_schema(item_no).is_none(), "item {item_no}");
        }
    }

    #[test]
    fn schemas_are_objects_with_properties() {
        for item_no in [5u8, 6, 7, 19, 20, 21] {
            let schema = response_schema(item_no).unwrap();
            assert_eq!(schema["type"], "object");
            assert!(schema["properties"].is_object());
        }
    }
}
