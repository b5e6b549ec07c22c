//! Database error types.

use phrasebook_core::{ImportError, RepairError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("migration to version {version} failed: {message}")]
    Migration { version: i32, message: String },

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error("backup could not be read: {0}")]
    Backup(#[from] RepairError),
}
