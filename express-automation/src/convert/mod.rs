//! Converts vendor invoice exports into replay templates.
//!
//! The vendor sends either a real workbook or an HTML page saved with an
//! `.xls` extension. Both are read into a [`Table`], each row is mapped onto
//! the seven template columns, and the result is written as
//! `{COMPANY}-{YEAR}-{SUFFIX}.xlsx` into the watched template folder.

mod source;

pub use source::{looks_like_html, parse_html_table, read_export, resolve_source};

use chrono::NaiveDate;
use rust_xlsxwriter::{Workbook, XlsxError};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, instrument};

use crate::errors::AutomationError;
use crate::normalize::parse_calendar_date;
use crate::row::{InputRow, REQUIRED_COLUMNS};
use crate::workbook::{Table, PREFERRED_SHEET};

pub const SUPPLIER_FIXED: &str = "026959000";
pub const CODE_FIXED: &str = "001";
pub const QTY_FIXED: &str = "1";
pub const DEFAULT_SUFFIX: &str = "RR";

const BRANCH_CODE_COLUMN: &str = "Ship-to-Branch-Code";
const INVOICE_DATE_COLUMN: &str = "Invoice Date";
const LOCAL_INVOICE_COLUMN: &str = "Local Invoice No";
const INVOICE_COLUMN: &str = "Invoice No";
const AMOUNT_COLUMN: &str = "Amount";

/// Ship-to branch codes known out of the box.
pub fn default_branch_map() -> HashMap<String, String> {
    [
        ("0002198490", "BKK"),
        ("0006093962", "FPR"),
        ("0005785271", "TMB"),
        ("0002266232", "CSP"),
        ("0004374861", "RYY"),
    ]
    .into_iter()
    .map(|(code, dept)| (code.to_string(), dept.to_string()))
    .collect()
}

/// Companies the Express installation keeps books for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Company {
    Eds,
    Fix,
}

impl fmt::Display for Company {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Company::Eds => write!(f, "EDS"),
            Company::Fix => write!(f, "FIX"),
        }
    }
}

impl FromStr for Company {
    type Err = AutomationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EDS" => Ok(Company::Eds),
            "FIX" => Ok(Company::Fix),
            other => Err(AutomationError::InvalidArgument(format!(
                "Unknown company '{other}'; expected EDS or FIX"
            ))),
        }
    }
}

/// Where and under which name a converted template is written.
#[derive(Debug, Clone)]
pub struct ConvertRequest {
    pub company: Company,
    pub year: String,
    pub suffix: String,
}

impl ConvertRequest {
    pub fn new(company: Company, year: &str, suffix: &str) -> Result<Self, AutomationError> {
        let year = year.trim();
        if year.len() != 4 || !year.chars().all(|c| c.is_ascii_digit()) {
            return Err(AutomationError::InvalidArgument(format!(
                "Year must be 4 digits, e.g. 2025 (got '{year}')"
            )));
        }
        let suffix = suffix.trim();
        Ok(Self {
            company,
            year: year.to_string(),
            suffix: if suffix.is_empty() {
                DEFAULT_SUFFIX.to_string()
            } else {
                suffix.to_string()
            },
        })
    }

    pub fn file_name(&self) -> String {
        format!("{}-{}-{}.xlsx", self.company, self.year, self.suffix)
    }
}

/// `yyyymmdd` becomes `dd/mm/yy`; other recognisable dates are reformatted
/// the same way; anything else is kept.
pub fn export_date_to_template(raw: &str) -> String {
    let s = raw.trim();
    if s.is_empty() {
        return String::new();
    }
    if s.len() == 8 && s.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y%m%d") {
            return date.format("%d/%m/%y").to_string();
        }
    }
    parse_calendar_date(s)
        .map(|date| date.format("%d/%m/%y").to_string())
        .unwrap_or_else(|| s.to_string())
}

/// Maps one export record onto the template columns.
pub fn map_row_to_template(
    record: &HashMap<String, String>,
    branch_map: &HashMap<String, String>,
) -> InputRow {
    let field = |name: &str| record.get(name).map(|v| v.trim()).unwrap_or("");

    let dept = branch_map
        .get(field(BRANCH_CODE_COLUMN))
        .cloned()
        .unwrap_or_default();
    let invoice = match field(LOCAL_INVOICE_COLUMN) {
        "" => field(INVOICE_COLUMN),
        local => local,
    };

    InputRow {
        dept,
        date: export_date_to_template(field(INVOICE_DATE_COLUMN)),
        supplier: SUPPLIER_FIXED.to_string(),
        invoice: invoice.to_string(),
        code: CODE_FIXED.to_string(),
        qty: QTY_FIXED.to_string(),
        unit_cost: field(AMOUNT_COLUMN).replace(',', ""),
    }
}

pub fn map_table(table: &Table, branch_map: &HashMap<String, String>) -> Vec<InputRow> {
    table
        .records()
        .iter()
        .map(|record| map_row_to_template(record, branch_map))
        .collect()
}

fn xlsx_err(path: &Path) -> impl Fn(XlsxError) -> AutomationError + '_ {
    move |e| AutomationError::Workbook {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

/// Writes rows in template layout. Supplier and Code stay text so their
/// leading zeros survive; Qty and numeric costs are written as numbers.
pub fn write_template(rows: &[InputRow], path: &Path) -> Result<(), AutomationError> {
    let err = xlsx_err(path);
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(PREFERRED_SHEET).map_err(&err)?;

    for (col, name) in REQUIRED_COLUMNS.iter().enumerate() {
        sheet.write_string(0, col as u16, *name).map_err(&err)?;
    }

    for (i, row) in rows.iter().enumerate() {
        let r = (i + 1) as u32;
        let cells = [
            &row.dept,
            &row.date,
            &row.supplier,
            &row.invoice,
            &row.code,
            &row.qty,
            &row.unit_cost,
        ];
        for (col, value) in cells.into_iter().enumerate() {
            let numeric = col >= 5 && !value.is_empty();
            match value.parse::<f64>() {
                Ok(n) if numeric => sheet.write_number(r, col as u16, n).map_err(&err)?,
                _ => sheet.write_string(r, col as u16, value.as_str()).map_err(&err)?,
            };
        }
    }

    workbook.save(path).map_err(&err)?;
    Ok(())
}

/// Reads `input`, maps it, and writes the template into `target_dir`.
/// The workbook is written to a `.tmp` sibling first and renamed into
/// place, so a folder watcher never sees a half-written file.
#[instrument(skip(input, branch_map), fields(input = %input.display()))]
pub fn convert_and_write(
    input: &Path,
    request: &ConvertRequest,
    target_dir: &Path,
    branch_map: &HashMap<String, String>,
) -> Result<PathBuf, AutomationError> {
    let table = read_export(input)?;
    let rows = map_table(&table, branch_map);

    std::fs::create_dir_all(target_dir)?;
    let target = target_dir.join(request.file_name());
    let tmp = target_dir.join(format!("{}.tmp", request.file_name()));

    if let Err(e) = write_template(&rows, &tmp) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }
    std::fs::rename(&tmp, &target)?;

    info!("Converted {} rows -> {}", rows.len(), target.display());
    Ok(target)
}
