use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Company and year embedded in a file name like `EDS-2025-RR.xlsx`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanyTag {
    pub company: String,
    pub year: String,
}

impl CompanyTag {
    /// Key typed into the company selection screen, e.g. `EDS2025`.
    pub fn search_key(&self) -> String {
        format!("{}{}", self.company, self.year)
    }
}

fn company_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^([A-Z]+)-(\d{4})(?:-[^.]*)?$").expect("invalid company tag regex")
    })
}

/// Parses `COMPANY-YYYY[-suffix]` from the file stem, case-insensitively.
/// The company is returned upper-cased.
pub fn parse_company_tag(path: &Path) -> Option<CompanyTag> {
    let stem = path.file_stem()?.to_str()?;
    let caps = company_tag_re().captures(stem)?;
    Some(CompanyTag {
        company: caps[1].to_uppercase(),
        year: caps[2].to_string(),
    })
}
