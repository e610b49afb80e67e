//! Console questions asked before converting a vendor export.

use express_automation::convert::{Company, ConvertRequest, DEFAULT_SUFFIX};
use std::io::{self, BufRead, Write};

/// Asks for company, year and suffix. An empty answer takes the default
/// shown in brackets; end of input cancels.
pub fn ask_convert_request<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    default_year: i32,
) -> io::Result<Option<ConvertRequest>> {
    let company = loop {
        let Some(answer) = ask(input, out, "Enter company (EDS or FIX)", "EDS")? else {
            return Ok(None);
        };
        match answer.parse::<Company>() {
            Ok(company) => break company,
            Err(_) => writeln!(out, "Please enter EDS or FIX.")?,
        }
    };

    let default_year = default_year.to_string();
    let year = loop {
        let Some(answer) = ask(input, out, "Enter year (YYYY)", &default_year)? else {
            return Ok(None);
        };
        if answer.len() == 4 && answer.chars().all(|c| c.is_ascii_digit()) {
            break answer;
        }
        writeln!(out, "Please enter 4-digit year, e.g. 2025")?;
    };

    let Some(suffix) = ask(input, out, "Enter suffix (e.g. RR)", DEFAULT_SUFFIX)? else {
        return Ok(None);
    };

    ConvertRequest::new(company, &year, &suffix)
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))
}

fn ask<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    question: &str,
    default: &str,
) -> io::Result<Option<String>> {
    write!(out, "{question} [{default}]: ")?;
    out.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let answer = line.trim();
    Ok(Some(if answer.is_empty() {
        default.to_string()
    } else {
        answer.to_string()
    }))
}
