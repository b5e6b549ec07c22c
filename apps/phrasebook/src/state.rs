//! Application state.

use crate::config::Config;
use crate::db::repository::Result;
use crate::db::{DeckRepository, LanguageRepository, SqliteRepository};
use phrasebook_core::algorithm::Sm2;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

/// The language and deck being studied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    pub language_id: Option<String>,
    pub deck_id: Option<String>,
}

impl SessionContext {
    /// Read a saved session; a missing or unreadable file gives an empty one.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "ignoring unreadable session file");
                Self::default()
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read session file");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)
    }

    /// Check the selection against the store.
    ///
    /// A language or deck that no longer exists is replaced by the first
    /// language and its default deck. Returns `None` when the store has no
    /// language at all, and whether the selection changed.
    pub fn resolve(&mut self, conn: &Connection) -> Result<(Option<(String, String)>, bool)> {
        let before = self.clone();
        let language = match self.language_id.as_deref() {
            Some(id) => conn.get_language(id)?,
            None => None,
        };
        let language = match language {
            Some(language) => language,
            None => match conn.list_languages()?.into_iter().next() {
                Some(first) => {
                    self.deck_id = None;
                    first
                }
                None => {
                    *self = Self::default();
                    return Ok((None, *self != before));
                }
            },
        };

        let deck = match self.deck_id.as_deref() {
            Some(deck_id) => conn.get_deck(&language.id, deck_id)?,
            None => None,
        };
        let deck = match deck {
            Some(deck) => Some(deck),
            None => conn.default_deck(&language.id)?,
        };
        let Some(deck) = deck else {
            *self = Self {
                language_id: Some(language.id),
                deck_id: None,
            };
            return Ok((None, *self != before));
        };

        self.language_id = Some(language.id.clone());
        self.deck_id = Some(deck.id.clone());
        let changed = *self != before;
        if changed {
            debug!(language = %language.id, deck = %deck.id, "session selection moved");
        }
        Ok((Some((language.id, deck.id)), changed))
    }
}

/// Global application state.
pub struct AppState {
    pub repository: Arc<Mutex<SqliteRepository>>,
    pub algorithm: Sm2,
    pub session: AsyncMutex<SessionContext>,
    pub session_path: PathBuf,
    pub import_batch_size: usize,
}

impl AppState {
    pub fn new(repository: SqliteRepository, config: &Config) -> Self {
        Self {
            repository: Arc::new(Mutex::new(repository)),
            algorithm: Sm2::default(),
            session: AsyncMutex::new(SessionContext::load(&config.session_path)),
            session_path: config.session_path.clone(),
            import_batch_size: config.import_batch_size,
        }
    }
}
