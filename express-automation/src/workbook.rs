//! Reading spreadsheet files into string tables.

use calamine::{open_workbook_auto, Data, DataType, Reader};
use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::errors::AutomationError;
use crate::normalize::normalize_row;
use crate::row::{CanonicalRow, InputRow};
use crate::schema::validate_columns;

/// Sheet preferred over the first sheet when present.
pub const PREFERRED_SHEET: &str = "input";

/// Header names plus data rows, every cell as a string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Rows keyed by header name. Short rows are blank-filled.
    pub fn records(&self) -> Vec<HashMap<String, String>> {
        self.rows
            .iter()
            .map(|row| {
                self.headers
                    .iter()
                    .enumerate()
                    .map(|(i, h)| (h.clone(), row.get(i).cloned().unwrap_or_default()))
                    .collect()
            })
            .collect()
    }
}

/// A validated input workbook.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub rows: Vec<InputRow>,
}

impl Dataset {
    /// Builds a dataset from a table, rejecting it when required columns are
    /// missing.
    pub fn from_table(table: Table) -> Result<Self, AutomationError> {
        validate_columns(&table.headers)?;
        let rows = table
            .records()
            .iter()
            .map(InputRow::from_record)
            .collect();
        Ok(Self {
            columns: table.headers,
            rows,
        })
    }

    pub fn canonical_rows(&self) -> Vec<CanonicalRow> {
        self.rows.iter().map(normalize_row).collect()
    }
}

/// Reads the `input` sheet (or the first sheet) of a binary workbook.
/// Entirely blank rows are dropped.
pub fn read_table(path: &Path) -> Result<Table, AutomationError> {
    let workbook_err = |message: String| AutomationError::Workbook {
        path: path.to_path_buf(),
        message,
    };

    let mut workbook =
        open_workbook_auto(path).map_err(|e| workbook_err(format!("Could not open: {e}")))?;
    let sheet_names = workbook.sheet_names().to_vec();
    let sheet = sheet_names
        .iter()
        .find(|name| name.as_str() == PREFERRED_SHEET)
        .or_else(|| sheet_names.first())
        .cloned()
        .ok_or_else(|| workbook_err("Workbook has no sheets".to_string()))?;

    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| workbook_err(format!("Sheet '{sheet}' unreadable: {e}")))?;

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(header) => header.iter().map(|c| cell_to_string(c).trim().to_string()).collect(),
        None => return Ok(Table::default()),
    };
    let rows: Vec<Vec<String>> = rows
        .map(|row| row.iter().map(cell_to_string).collect::<Vec<_>>())
        .filter(|row| row.iter().any(|c| !c.is_empty()))
        .collect();

    debug!(
        "Read sheet '{}' from {}: {} columns, {} rows",
        sheet,
        path.display(),
        headers.len(),
        rows.len()
    );
    Ok(Table { headers, rows })
}

/// Loads and schema-checks an input workbook.
pub fn load_dataset(path: &Path) -> Result<Dataset, AutomationError> {
    Dataset::from_table(read_table(path)?)
}

/// Coerces any cell to text. Integral floats drop their fraction so a
/// numeric `1000` cell reads as `"1000"`; dates read day-first.
pub fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => float_to_string(*f),
        Data::Bool(b) => b.to_string(),
        other => other
            .as_datetime()
            .map(|dt| dt.format("%d/%m/%Y").to_string())
            .unwrap_or_else(|| other.to_string()),
    }
}

fn float_to_string(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

/// Waits until the file size stays the same for `window`. Returns `false`
/// when the file vanishes or `timeout` elapses first.
pub async fn wait_until_stable(
    path: &Path,
    window: Duration,
    poll: Duration,
    timeout: Duration,
) -> bool {
    let start = Instant::now();
    let mut last_size: Option<u64> = None;
    let mut stable_since: Option<Instant> = None;

    while start.elapsed() < timeout {
        let size = match tokio::fs::metadata(path).await {
            Ok(meta) => Some(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return false,
            Err(e) => {
                warn!("Could not stat {}: {}", path.display(), e);
                None
            }
        };

        let now = Instant::now();
        if size.is_some() && size == last_size {
            match stable_since {
                None => stable_since = Some(now),
                Some(since) if now.duration_since(since) >= window => return true,
                Some(_) => {}
            }
        } else {
            stable_since = None;
        }
        last_size = size;
        tokio::time::sleep(poll).await;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_floats_print_without_fraction() {
        assert_eq!(cell_to_string(&Data::Float(1000.0)), "1000");
        assert_eq!(cell_to_string(&Data::Float(1234.5)), "1234.5");
        assert_eq!(cell_to_string(&Data::Int(7)), "7");
        assert_eq!(cell_to_string(&Data::Empty), "");
        assert_eq!(cell_to_string(&Data::String("001".into())), "001");
    }

    #[test]
    fn records_blank_fill_short_rows() {
        let table = Table {
            headers: vec!["Dept".into(), "Date".into()],
            rows: vec![vec!["BKK".into()]],
        };
        let records = table.records();
        assert_eq!(records[0]["Dept"], "BKK");
        assert_eq!(records[0]["Date"], "");
    }

    #[test]
    fn dataset_rejects_missing_columns() {
        let table = Table {
            headers: vec!["Dept".into()],
            rows: vec![],
        };
        assert!(matches!(
            Dataset::from_table(table),
            Err(AutomationError::Schema { .. })
        ));
    }

    #[tokio::test]
    async fn stable_file_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.xlsx");
        std::fs::write(&path, b"data").unwrap();
        let ready = wait_until_stable(
            &path,
            Duration::from_millis(20),
            Duration::from_millis(5),
            Duration::from_secs(2),
        )
        .await;
        assert!(ready);
    }

    #[tokio::test]
    async fn missing_file_is_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let ready = wait_until_stable(
            &dir.path().join("gone.xlsx"),
            Duration::from_millis(20),
            Duration::from_millis(5),
            Duration::from_millis(100),
        )
        .await;
        assert!(!ready);
    }
}
