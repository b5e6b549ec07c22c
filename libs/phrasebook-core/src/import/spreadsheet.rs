//! Spreadsheet input through an external parser.

use super::{normalize_header, RowRecord, Table};
use crate::error::{ImportError, Result};

/// Workbook parser supplied by the host.
pub trait SpreadsheetReader {
    /// Sheet names in workbook order.
    fn list_sheets(&self, bytes: &[u8]) -> Result<Vec<String>>;

    /// Cell text of the named sheet, row by row in column order. The first
    /// row holds the headers.
    fn read_sheet(&self, bytes: &[u8], sheet: &str) -> Result<Vec<Vec<String>>>;
}

/// Read the chosen sheet, or the first one, into a table.
///
/// Headers keep their column order, so ambiguous header matches resolve to
/// the leftmost column as they do for delimited files.
pub fn read_spreadsheet(reader: &dyn SpreadsheetReader, bytes: &[u8], sheet: Option<&str>) -> Result<Table> {
    let sheets = reader.list_sheets(bytes)?;
    let name = match sheet {
        Some(wanted) => sheets
            .iter()
            .find(|s| s.as_str() == wanted)
            .cloned()
            .ok_or_else(|| ImportError::UnknownSheet {
                name: wanted.to_string(),
                available: sheets.clone(),
            })?,
        None => sheets.first().cloned().ok_or(ImportError::EmptyFile)?,
    };

    let mut grid = reader.read_sheet(bytes, &name)?.into_iter();
    let columns: Vec<String> = grid
        .next()
        .ok_or(ImportError::EmptyFile)?
        .iter()
        .map(|cell| normalize_header(cell))
        .collect();

    let rows: Vec<RowRecord> = grid
        .filter(|cells| cells.iter().any(|c| !c.trim().is_empty()))
        .map(|cells| {
            let mut record = RowRecord::new();
            for (header, value) in columns.iter().zip(cells) {
                if header.is_empty() {
                    continue;
                }
                record.entry(header.clone()).or_insert_with(|| value.trim().to_string());
            }
            record
        })
        .collect();

    let headers: Vec<String> = columns.into_iter().filter(|h| !h.is_empty()).collect();
    if headers.is_empty() {
        return Err(ImportError::EmptyFile);
    }
    Ok(Table { headers, rows })
}
