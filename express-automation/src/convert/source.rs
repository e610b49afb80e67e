//! Locating and reading a vendor export, whatever shape it arrives in.

use scraper::{ElementRef, Html, Selector};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

use crate::errors::AutomationError;
use crate::workbook::{read_table, Table};

const SNIFF_BYTES: usize = 512;
const SHEET_PAGES: &[&str] = &["sheet001.htm", "sheet001.html"];

/// Picks the file to read. A directory (an unpacked download) is searched
/// for `sheet001.htm[l]`, then any HTML page, then any workbook.
pub fn resolve_source(path: &Path) -> Result<PathBuf, AutomationError> {
    if !path.is_dir() {
        return Ok(path.to_path_buf());
    }

    for name in SHEET_PAGES {
        let candidate = path.join(name);
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    let mut entries: Vec<PathBuf> = std::fs::read_dir(path)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    entries.sort();

    for wanted in [&["htm", "html"][..], &["xls", "xlsx"][..]] {
        if let Some(found) = entries.iter().find(|p| has_extension(p, wanted)) {
            return Ok(found.clone());
        }
    }

    Err(AutomationError::Conversion(format!(
        "No usable sheet/html/xls found inside folder: {}",
        path.display()
    )))
}

fn has_extension(path: &Path, wanted: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| wanted.iter().any(|w| e.eq_ignore_ascii_case(w)))
        .unwrap_or(false)
}

/// True when the leading bytes look like an HTML document, regardless of
/// the file extension.
pub fn looks_like_html(head: &[u8]) -> bool {
    let head = &head[..head.len().min(SNIFF_BYTES)];
    let lower = head.to_ascii_lowercase();
    let trimmed = lower
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .map(|i| &lower[i..])
        .unwrap_or(&[]);
    trimmed.starts_with(b"<!doctype")
        || trimmed.starts_with(b"<html")
        || lower.windows(5).any(|w| w == b"<html")
}

fn sniff_file(path: &Path) -> bool {
    use std::io::Read;
    let mut buf = vec![0u8; SNIFF_BYTES];
    match std::fs::File::open(path).and_then(|mut f| f.read(&mut buf)) {
        Ok(n) => looks_like_html(&buf[..n]),
        Err(_) => false,
    }
}

/// Reads the export as a table, dispatching on content rather than
/// extension.
pub fn read_export(path: &Path) -> Result<Table, AutomationError> {
    let source = resolve_source(path)?;
    let is_html = has_extension(&source, &["htm", "html"]) || sniff_file(&source);
    debug!("Reading export {} (html: {})", source.display(), is_html);

    if is_html {
        let bytes = std::fs::read(&source)?;
        let text = String::from_utf8_lossy(&bytes);
        return parse_html_table(&text).map_err(|e| {
            AutomationError::Conversion(format!(
                "Failed to parse HTML table from {}: {e}",
                source.display()
            ))
        });
    }

    read_table(&source).map_err(|e| {
        AutomationError::Conversion(format!(
            "{e}. The file may be an HTML export or corrupt; open it in Excel and save as .xlsx, \
             or provide the extracted sheet (sheet001.htm)"
        ))
    })
}

fn table_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("table").expect("invalid table selector"))
}

fn row_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("tr").expect("invalid tr selector"))
}

fn cell_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("th, td").expect("invalid cell selector"))
}

fn cell_text(cell: ElementRef) -> String {
    cell.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// First `<table>` of the document; its first row is the header.
pub fn parse_html_table(html: &str) -> Result<Table, String> {
    let document = Html::parse_document(html);
    let table = document
        .select(table_selector())
        .next()
        .ok_or_else(|| "No tables found in HTML".to_string())?;

    let mut rows = table
        .select(row_selector())
        .map(|tr| tr.select(cell_selector()).map(cell_text).collect::<Vec<_>>());

    let headers = rows.next().ok_or_else(|| "Table has no rows".to_string())?;
    let rows = rows
        .filter(|r| r.iter().any(|c| !c.is_empty()))
        .collect();
    Ok(Table { headers, rows })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_html_content() {
        assert!(looks_like_html(b"  <!DOCTYPE html><html>"));
        assert!(looks_like_html(b"<HTML xmlns:o=\"urn:schemas\">"));
        assert!(looks_like_html(b"\xef\xbb\xbf<meta><html>"));
        assert!(!looks_like_html(b"PK\x03\x04binary"));
        assert!(!looks_like_html(b"\xd0\xcf\x11\xe0legacy xls"));
        assert!(!looks_like_html(b""));
    }

    #[test]
    fn parses_first_table() {
        let html = r#"<html><body>
            <table>
              <tr><th>Ship-to-Branch-Code</th><th> Amount </th></tr>
              <tr><td>0002198490</td><td>1,234.50</td></tr>
              <tr><td></td><td></td></tr>
            </table>
            <table><tr><td>ignored</td></tr></table>
        </body></html>"#;
        let table = parse_html_table(html).unwrap();
        assert_eq!(table.headers, vec!["Ship-to-Branch-Code", "Amount"]);
        assert_eq!(table.rows, vec![vec!["0002198490".to_string(), "1,234.50".to_string()]]);
    }

    #[test]
    fn no_table_is_an_error() {
        assert!(parse_html_table("<html><p>nothing</p></html>").is_err());
    }

    #[test]
    fn directory_prefers_sheet_page_then_html_then_workbook() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.xlsx"), b"").unwrap();
        assert_eq!(resolve_source(dir.path()).unwrap(), dir.path().join("b.xlsx"));

        std::fs::write(dir.path().join("page.htm"), b"").unwrap();
        assert_eq!(resolve_source(dir.path()).unwrap(), dir.path().join("page.htm"));

        std::fs::write(dir.path().join("sheet001.htm"), b"").unwrap();
        assert_eq!(
            resolve_source(dir.path()).unwrap(),
            dir.path().join("sheet001.htm")
        );
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            resolve_source(dir.path()),
            Err(AutomationError::Conversion(_))
        ));
    }

    #[test]
    fn html_disguised_as_xls_is_read_as_html() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.xls");
        std::fs::write(
            &path,
            "<html><table><tr><td>Amount</td></tr><tr><td>5</td></tr></table></html>",
        )
        .unwrap();
        let table = read_export(&path).unwrap();
        assert_eq!(table.headers, vec!["Amount"]);
        assert_eq!(table.rows, vec![vec!["5".to_string()]]);
    }
}
