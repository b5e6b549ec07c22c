//! Runtime configuration from the environment.

use crate::services::importer::DEFAULT_BATCH_SIZE;
use std::env;
use std::path::{Path, PathBuf};
use tracing::warn;

const APP_DIR: &str = "phrasebook";
const DB_FILE: &str = "phrasebook.db";
const SESSION_FILE: &str = "session.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
    pub session_path: PathBuf,
    pub import_batch_size: usize,
}

fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join(DB_FILE)
}

fn session_beside(db_path: &Path) -> PathBuf {
    db_path
        .parent()
        .map_or_else(|| PathBuf::from(SESSION_FILE), |dir| dir.join(SESSION_FILE))
}

fn parse_batch_size(raw: Option<String>) -> usize {
    match raw {
        None => DEFAULT_BATCH_SIZE,
        Some(raw) => match raw.trim().parse::<usize>() {
            Ok(size) if size > 0 => size,
            _ => {
                warn!(value = %raw, "ignoring invalid PHRASEBOOK_IMPORT_BATCH");
                DEFAULT_BATCH_SIZE
            }
        },
    }
}

impl Config {
    /// Read `PHRASEBOOK_*` variables, loading a `.env` file first if present.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_vars(
            env::var("PHRASEBOOK_DB").ok(),
            env::var("PHRASEBOOK_SESSION").ok(),
            env::var("PHRASEBOOK_IMPORT_BATCH").ok(),
        )
    }

    fn from_vars(db: Option<String>, session: Option<String>, batch: Option<String>) -> Self {
        let db_path = db.map_or_else(default_db_path, PathBuf::from);
        let session_path = session.map_or_else(|| session_beside(&db_path), PathBuf::from);
        Self {
            db_path,
            session_path,
            import_batch_size: parse_batch_size(batch),
        }
    }

    /// Use another database; a session file that was derived from the old
    /// path follows the new one.
    pub fn with_db_path(mut self, db_path: PathBuf) -> Self {
        if self.session_path == session_beside(&self.db_path) {
            self.session_path = session_beside(&db_path);
        }
        self.db_path = db_path;
        self
    }
}
