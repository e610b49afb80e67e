//! Field normalization for replay.
//!
//! Every function here is total: malformed input degrades to a trimmed
//! passthrough instead of an error, so one bad cell never stops a batch.
//! The target form may reject or coerce the value itself.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

use crate::row::{CanonicalRow, InputRow};

/// Day-first formats, tried before the month-first ones.
const DAY_FIRST_FORMATS: &[&str] = &[
    "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%d/%m/%y", "%d-%m-%y", "%d %b %Y", "%d %B %Y",
    "%d-%b-%Y", "%d-%b-%y", "%Y-%m-%d", "%Y/%m/%d",
];

const MONTH_FIRST_FORMATS: &[&str] = &[
    "%m/%d/%Y", "%m-%d-%Y", "%m/%d/%y", "%b %d %Y", "%b %d, %Y", "%B %d %Y", "%B %d, %Y",
];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d/%m/%Y %H:%M:%S"];

/// Converts a raw date cell into `DDMMYY`.
///
/// A 6-digit value is taken as already being `DDMMYY`; an 8-digit value is
/// `DDMMYYYY` with the century digits dropped. Anything else is parsed as a
/// calendar date, day-first then month-first.
pub fn normalize_date(raw: &str) -> String {
    let trimmed = raw.trim();
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();

    match digits.len() {
        6 => digits,
        8 => format!("{}{}", &digits[..4], &digits[6..]),
        _ => parse_calendar_date(trimmed)
            .map(|date| date.format("%d%m%y").to_string())
            .unwrap_or_else(|| trimmed.to_string()),
    }
}

pub(crate) fn parse_calendar_date(s: &str) -> Option<NaiveDate> {
    if s.is_empty() {
        return None;
    }
    DAY_FIRST_FORMATS
        .iter()
        .chain(MONTH_FIRST_FORMATS)
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|dt| dt.date())
        })
}

/// Converts a raw quantity into an integer string. Empty input is `"0"`.
pub fn normalize_qty(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return "0".to_string();
    }
    match parse_decimal(trimmed) {
        Some(value) => {
            let mut rounded = value.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
            rounded.rescale(0);
            rounded.to_string()
        }
        None => trimmed.to_string(),
    }
}

/// Converts a raw unit cost into a string with exactly two fraction digits.
/// Empty input is `"0.00"`.
pub fn normalize_cost(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return "0.00".to_string();
    }
    match parse_decimal(trimmed) {
        Some(value) => {
            let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
            rounded.rescale(2);
            rounded.to_string()
        }
        None => trimmed.to_string(),
    }
}

/// Parses a number with thousands separators removed, using exact decimal
/// arithmetic.
fn parse_decimal(s: &str) -> Option<Decimal> {
    let cleaned: String = s.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .ok()
}

/// Normalizes a whole row. Text fields are only trimmed.
pub fn normalize_row(row: &InputRow) -> CanonicalRow {
    CanonicalRow {
        dept: row.dept.trim().to_string(),
        date: normalize_date(&row.date),
        supplier: row.supplier.trim().to_string(),
        invoice: row.invoice.trim().to_string(),
        code: row.code.trim().to_string(),
        qty: normalize_qty(&row.qty),
        unit_cost: normalize_cost(&row.unit_cost),
    }
}
