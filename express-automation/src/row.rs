use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Column names every input workbook must carry, in template order.
pub const REQUIRED_COLUMNS: [&str; 7] = [
    "Dept", "Date", "Supplier", "Invoice", "Code", "Qty", "UnitCost",
];

/// One spreadsheet record before normalization. All cells are already
/// coerced to strings with blanks as `""`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InputRow {
    pub dept: String,
    pub date: String,
    pub supplier: String,
    pub invoice: String,
    pub code: String,
    pub qty: String,
    pub unit_cost: String,
}

impl InputRow {
    /// Builds a row from a header-keyed record. Missing keys become `""`;
    /// the schema check runs before this is ever reached.
    pub fn from_record(record: &HashMap<String, String>) -> Self {
        let get = |key: &str| record.get(key).cloned().unwrap_or_default();
        Self {
            dept: get("Dept"),
            date: get("Date"),
            supplier: get("Supplier"),
            invoice: get("Invoice"),
            code: get("Code"),
            qty: get("Qty"),
            unit_cost: get("UnitCost"),
        }
    }
}

/// A row after normalization, ready for literal keystroke replay.
///
/// `qty` and `unit_cost` are kept normalized but the current form protocol
/// does not type them yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CanonicalRow {
    pub dept: String,
    pub date: String,
    pub supplier: String,
    pub invoice: String,
    pub code: String,
    pub qty: String,
    pub unit_cost: String,
}
