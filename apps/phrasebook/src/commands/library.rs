//! Language, deck and selection commands.

use crate::db::{DbError, SqliteRepository};
use crate::services::languages::{self, DeckSummary, LanguageSettings};
use crate::state::{AppState, SessionContext};
use chrono::Utc;
use phrasebook_core::types::{Deck, Language};
use std::sync::MutexGuard;

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct CommandError {
    pub message: String,
}

impl CommandError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CommandError {}

impl From<DbError> for CommandError {
    fn from(e: DbError) -> Self {
        Self { message: e.to_string() }
    }
}

impl From<phrasebook_core::ImportError> for CommandError {
    fn from(e: phrasebook_core::ImportError) -> Self {
        Self { message: e.to_string() }
    }
}

impl From<std::io::Error> for CommandError {
    fn from(e: std::io::Error) -> Self {
        Self { message: e.to_string() }
    }
}

impl From<serde_json::Error> for CommandError {
    fn from(e: serde_json::Error) -> Self {
        Self { message: e.to_string() }
    }
}

pub(crate) fn lock_repository(state: &AppState) -> Result<MutexGuard<'_, SqliteRepository>, CommandError> {
    state
        .repository
        .lock()
        .map_err(|_| CommandError::new("repository lock poisoned"))
}

/// Language and deck to act on, falling back to the first language when the
/// saved selection is gone. The repaired selection is saved.
pub(crate) async fn current_selection(state: &AppState) -> Result<(String, String), CommandError> {
    let mut session = state.session.lock().await;
    let (selection, changed) = {
        let repo = lock_repository(state)?;
        session.resolve(&repo)?
    };
    if changed {
        session.save(&state.session_path)?;
    }
    selection.ok_or_else(|| CommandError::new("no language to study; create or restore one first"))
}

/// List all languages.
pub async fn list_languages(state: &AppState) -> Result<Vec<Language>, CommandError> {
    let repo = lock_repository(state)?;
    languages::list_languages(&repo).map_err(Into::into)
}

/// Create a language and select it.
pub async fn create_language(settings: LanguageSettings, state: &AppState) -> Result<Language, CommandError> {
    let language = {
        let mut repo = lock_repository(state)?;
        languages::create_language(&mut repo, settings, Utc::now())?
    };
    select(language.id.clone(), None, state).await?;
    Ok(language)
}

pub async fn update_language(
    language_id: String,
    settings: LanguageSettings,
    state: &AppState,
) -> Result<Language, CommandError> {
    let repo = lock_repository(state)?;
    languages::update_language_settings(&repo, &language_id, settings).map_err(Into::into)
}

/// Delete a language, moving its sentences into `reassign_to`.
pub async fn delete_language(
    language_id: String,
    reassign_to: String,
    state: &AppState,
) -> Result<usize, CommandError> {
    let moved = {
        let mut repo = lock_repository(state)?;
        languages::delete_language(&mut repo, &language_id, &reassign_to, Utc::now())?
    };
    current_selection(state).await.ok();
    Ok(moved)
}

pub async fn list_decks(language_id: String, state: &AppState) -> Result<Vec<Deck>, CommandError> {
    let repo = lock_repository(state)?;
    languages::list_decks(&repo, &language_id).map_err(Into::into)
}

pub async fn create_deck(language_id: String, name: String, state: &AppState) -> Result<Deck, CommandError> {
    let mut repo = lock_repository(state)?;
    languages::create_deck(&mut repo, &language_id, &name, Utc::now()).map_err(Into::into)
}

pub async fn rename_deck(
    language_id: String,
    deck_id: String,
    name: String,
    state: &AppState,
) -> Result<Deck, CommandError> {
    let repo = lock_repository(state)?;
    languages::rename_deck(&repo, &language_id, &deck_id, &name).map_err(Into::into)
}

pub async fn delete_deck(language_id: String, deck_id: String, state: &AppState) -> Result<usize, CommandError> {
    let removed = {
        let mut repo = lock_repository(state)?;
        languages::delete_deck(&mut repo, &language_id, &deck_id)?
    };
    current_selection(state).await.ok();
    Ok(removed)
}

/// Switch to a language and optionally one of its decks, saving the session.
pub async fn select(
    language_id: String,
    deck_id: Option<String>,
    state: &AppState,
) -> Result<SessionContext, CommandError> {
    let mut session = state.session.lock().await;
    {
        let repo = lock_repository(state)?;
        let mut wanted = SessionContext {
            language_id: Some(language_id.clone()),
            deck_id: deck_id.clone(),
        };
        let (resolved, _) = wanted.resolve(&repo)?;
        match resolved {
            Some((language, deck)) if language == language_id && deck_id.as_ref().map_or(true, |d| *d == deck) => {}
            _ => return Err(CommandError::new(format!("unknown language or deck: {language_id}"))),
        }
        *session = wanted;
    }
    session.save(&state.session_path)?;
    Ok(session.clone())
}

/// Counters for the selected deck.
pub async fn deck_summary(state: &AppState) -> Result<DeckSummary, CommandError> {
    let (language_id, deck_id) = current_selection(state).await?;
    let repo = lock_repository(state)?;
    languages::deck_summary(&repo, &language_id, &deck_id, Utc::now()).map_err(Into::into)
}

/// Create the sample language on first run.
pub async fn ensure_seeded(state: &AppState) -> Result<Option<Language>, CommandError> {
    let mut repo = lock_repository(state)?;
    languages::ensure_seeded(&mut repo, Utc::now()).map_err(Into::into)
}

/// Delete everything in the store and forget the selection.
pub async fn reset_store(state: &AppState) -> Result<(), CommandError> {
    let mut session = state.session.lock().await;
    {
        let mut repo = lock_repository(state)?;
        languages::reset_store(&mut repo)?;
    }
    *session = SessionContext::default();
    session.save(&state.session_path)?;
    Ok(())
}
