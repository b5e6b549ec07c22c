//! Comma or tab separated text.
//!
//! The first non-blank line holds the headers. There is no quoting or
//! escaping; tab separated files avoid collisions with commas in sentences.

use super::{normalize_header, RowRecord, Table};
use crate::error::{ImportError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delimiter {
    Comma,
    #[default]
    Tab,
}

impl Delimiter {
    pub fn as_char(self) -> char {
        match self {
            Self::Comma => ',',
            Self::Tab => '\t',
        }
    }

    /// Pick from a file name: `.csv` is comma separated, anything else tab.
    pub fn for_filename(filename: &str) -> Self {
        if filename.to_ascii_lowercase().ends_with(".csv") {
            Self::Comma
        } else {
            Self::Tab
        }
    }
}

/// Parse delimited text into headers and records.
pub fn parse_delimited(content: &str, delimiter: Delimiter) -> Result<Table> {
    let content = content.trim_start_matches('\u{FEFF}');
    let sep = delimiter.as_char();
    let mut lines = content
        .lines()
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.trim().is_empty());

    let header_line = lines.next().ok_or(ImportError::EmptyFile)?;
    let headers: Vec<String> = header_line.split(sep).map(normalize_header).collect();

    let rows = lines
        .map(|line| {
            let mut record = RowRecord::new();
            for (header, value) in headers.iter().zip(line.split(sep)) {
                if header.is_empty() {
                    continue;
                }
                record.entry(header.clone()).or_insert_with(|| value.trim().to_string());
            }
            record
        })
        .collect();

    Ok(Table {
        headers: headers.into_iter().filter(|h| !h.is_empty()).collect(),
        rows,
    })
}
