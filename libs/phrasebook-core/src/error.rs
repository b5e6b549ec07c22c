//! Error types for phrasebook-core.

use thiserror::Error;

/// Result type alias using ImportError.
pub type Result<T> = std::result::Result<T, ImportError>;

/// Errors caused by the content of an uploaded file.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("empty file")]
    EmptyFile,

    #[error("no {column} column found; headers were: {}", found.join(", "))]
    MissingColumn { column: String, found: Vec<String> },

    #[error("no rows with source or target text")]
    NoRows,

    #[error("sheet {name:?} not found; sheets were: {}", available.join(", "))]
    UnknownSheet { name: String, available: Vec<String> },

    #[error("spreadsheet could not be read: {0}")]
    Spreadsheet(String),
}

/// Errors raised while upgrading a backup document.
#[derive(Debug, Error)]
pub enum RepairError {
    #[error("backup document must be a JSON object")]
    NotAnObject,

    #[error("backup field {0} must be an array")]
    NotAnArray(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_column_lists_found_headers() {
        let err = ImportError::MissingColumn {
            column: "target".into(),
            found: vec!["english".into(), "notes".into()],
        };
        assert_eq!(
            err.to_string(),
            "no target column found; headers were: english, notes"
        );
    }
}
