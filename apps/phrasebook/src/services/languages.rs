//! Language and deck management.

use crate::db::repository::Result;
use crate::db::{
    clear_all, DbError, DeckRepository, ImportBatchRepository, LanguageRepository, LegacyProgressRepository,
    ProgressRepository, SentenceRepository, SqliteRepository, SrsRepository, VocabularyRepository,
};
use crate::services::scheduler::load_progress;
use chrono::{DateTime, Utc};
use phrasebook_core::repair::default_deck_id;
use phrasebook_core::tokenizer::token_count_u32;
use phrasebook_core::types::{DatasetStats, Deck, Language, PathProgress, RtlMode, Sentence, StudyMode, DEFAULT_DECK_NAME};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

const SAMPLE_LANGUAGE: &str = "Greek (sample)";

const SAMPLE_SENTENCES: &[(&str, &str, &str)] = &[
    ("Hello!", "Γεια σου!", "Geia sou!"),
    ("Good morning.", "Καλημέρα.", "Kaliméra."),
    ("Thank you very much.", "Ευχαριστώ πολύ.", "Efcharistó polý."),
    ("How are you?", "Τι κάνεις;", "Ti káneis?"),
    ("I would like a coffee, please.", "Θα ήθελα έναν καφέ, παρακαλώ.", "Tha íthela énan kafé, parakaló."),
    ("Where is the station?", "Πού είναι ο σταθμός;", "Poú eínai o stathmós?"),
    ("I don't understand.", "Δεν καταλαβαίνω.", "Den katalavaíno."),
    ("See you tomorrow.", "Τα λέμε αύριο.", "Ta léme ávrio."),
];

/// Editable language settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageSettings {
    pub name: String,
    pub lang_tag: String,
    pub rtl_mode: RtlMode,
    pub cjk_mode: bool,
    pub tts_rate: f64,
    pub tts_pitch: f64,
    pub tts_voice: Option<String>,
    pub token_goal: i64,
    pub theme: String,
}

impl Default for LanguageSettings {
    fn default() -> Self {
        Self {
            name: String::new(),
            lang_tag: "en".to_string(),
            rtl_mode: RtlMode::Auto,
            cjk_mode: false,
            tts_rate: 1.0,
            tts_pitch: 1.0,
            tts_voice: None,
            token_goal: 0,
            theme: "default".to_string(),
        }
    }
}

impl LanguageSettings {
    fn apply(self, language: &mut Language) {
        language.name = self.name;
        language.lang_tag = self.lang_tag;
        language.rtl_mode = self.rtl_mode;
        language.cjk_mode = self.cjk_mode;
        language.tts_rate = self.tts_rate;
        language.tts_pitch = self.tts_pitch;
        language.tts_voice = self.tts_voice;
        language.token_goal = self.token_goal.max(0);
        language.theme = self.theme;
    }
}

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DbError::InvalidData("name must not be empty".into()));
    }
    Ok(name.to_string())
}

fn insert_language(conn: &Connection, language: &Language, now: DateTime<Utc>) -> Result<Deck> {
    let deck = Deck {
        id: default_deck_id(&language.id),
        language_id: language.id.clone(),
        name: DEFAULT_DECK_NAME.to_string(),
        created_at: now,
    };
    conn.put_language(language)?;
    conn.put_deck(&deck)?;
    conn.put_progress(&PathProgress::new(language.id.clone(), deck.id.clone(), now))?;
    conn.put_stats(&DatasetStats {
        language_id: language.id.clone(),
        seen_words: 0,
        updated_at: now,
    })?;
    Ok(deck)
}

/// Create a language with its Main deck, progress and stats.
pub fn create_language(repo: &mut SqliteRepository, settings: LanguageSettings, now: DateTime<Utc>) -> Result<Language> {
    let name = validate_name(&settings.name)?;
    let mut language = Language::new(Uuid::new_v4().to_string(), name.clone(), String::new(), now);
    settings.apply(&mut language);
    language.name = name;

    repo.transaction(|tx| insert_language(tx, &language, now))?;
    info!(language = %language.id, name = %language.name, "created language");
    Ok(language)
}

pub fn update_language_settings(conn: &Connection, id: &str, settings: LanguageSettings) -> Result<Language> {
    let mut language = conn
        .get_language(id)?
        .ok_or_else(|| DbError::NotFound(format!("language {id}")))?;
    let name = validate_name(&settings.name)?;
    settings.apply(&mut language);
    language.name = name;
    conn.put_language(&language)?;
    Ok(language)
}

pub fn list_languages(conn: &Connection) -> Result<Vec<Language>> {
    conn.list_languages()
}

/// Delete a language after moving its sentences into another language.
///
/// Sentences are appended to the target's default deck in deck then order
/// sequence. Their review state is dropped and their import batches follow
/// them with ranges matching the new positions. Returns the number of
/// sentences moved.
pub fn delete_language(repo: &mut SqliteRepository, id: &str, reassign_to: &str, now: DateTime<Utc>) -> Result<usize> {
    if id == reassign_to {
        return Err(DbError::InvalidData("a language cannot be reassigned to itself".into()));
    }
    repo.transaction(|tx| {
        if tx.get_language(id)?.is_none() {
            return Err(DbError::NotFound(format!("language {id}")));
        }
        let target = tx
            .get_language(reassign_to)?
            .ok_or_else(|| DbError::NotFound(format!("language {reassign_to}")))?;
        let target_deck = match tx.default_deck(&target.id)? {
            Some(deck) => deck,
            None => {
                let deck = Deck {
                    id: default_deck_id(&target.id),
                    language_id: target.id.clone(),
                    name: DEFAULT_DECK_NAME.to_string(),
                    created_at: now,
                };
                tx.put_deck(&deck)?;
                deck
            }
        };

        tx.delete_srs_for_language(id)?;
        let mut next = tx.max_order(&target.id, &target_deck.id)?.map_or(0, |max| max + 1);
        let mut moved = 0;
        let decks = tx.list_decks(id)?;
        for deck in &decks {
            for sentence in tx.list_sentences(id, &deck.id)? {
                tx.move_sentence(&sentence.id, &target.id, &target_deck.id, next)?;
                next += 1;
                moved += 1;
            }
            tx.delete_progress(id, &deck.id)?;
            tx.delete_deck_row(id, &deck.id)?;
        }
        let mut batches = Vec::new();
        for deck in &decks {
            batches.extend(tx.list_import_batches(id, &deck.id)?);
        }
        tx.reassign_import_batches(id, &target.id, &target_deck.id)?;
        tx.delete_vocabulary(id)?;
        tx.delete_legacy_progress(id)?;
        tx.delete_language_row(id)?;

        tx.normalize_orders(&target.id, &target_deck.id)?;
        let placed = tx.list_sentences(&target.id, &target_deck.id)?;
        for mut batch in batches {
            let orders = placed
                .iter()
                .filter(|s| s.import_id.as_deref() == Some(batch.id.as_str()))
                .map(|s| s.order);
            let (Some(start), Some(end)) = (orders.clone().min(), orders.max()) else {
                continue;
            };
            batch.language_id = target.id.clone();
            batch.deck_id = target_deck.id.clone();
            batch.start_order = start;
            batch.end_order = end;
            tx.put_import_batch(&batch)?;
        }
        load_progress(tx, &target.id, &target_deck.id, now)?;
        tx.clamp_deck_progress(&target.id, &target_deck.id)?;
        info!(language = id, into = %target.id, moved, "deleted language");
        Ok(moved)
    })
}

/// Add a deck to a language.
pub fn create_deck(repo: &mut SqliteRepository, language_id: &str, name: &str, now: DateTime<Utc>) -> Result<Deck> {
    let name = validate_name(name)?;
    if repo.get_language(language_id)?.is_none() {
        return Err(DbError::NotFound(format!("language {language_id}")));
    }
    let deck = Deck {
        id: Uuid::new_v4().to_string(),
        language_id: language_id.to_string(),
        name,
        created_at: now,
    };
    repo.transaction(|tx| {
        tx.put_deck(&deck)?;
        tx.put_progress(&PathProgress::new(language_id.to_string(), deck.id.clone(), now))
    })?;
    Ok(deck)
}

pub fn rename_deck(conn: &Connection, language_id: &str, deck_id: &str, name: &str) -> Result<Deck> {
    let mut deck = conn
        .get_deck(language_id, deck_id)?
        .ok_or_else(|| DbError::NotFound(format!("deck {deck_id}")))?;
    deck.name = validate_name(name)?;
    conn.put_deck(&deck)?;
    Ok(deck)
}

pub fn list_decks(conn: &Connection, language_id: &str) -> Result<Vec<Deck>> {
    conn.list_decks(language_id)
}

/// Delete a deck with its sentences, review state, imports and progress.
///
/// The last deck of a language cannot be deleted.
pub fn delete_deck(repo: &mut SqliteRepository, language_id: &str, deck_id: &str) -> Result<usize> {
    repo.transaction(|tx| {
        let decks = tx.list_decks(language_id)?;
        if !decks.iter().any(|d| d.id == deck_id) {
            return Err(DbError::NotFound(format!("deck {deck_id}")));
        }
        if decks.len() <= 1 {
            return Err(DbError::InvalidData("a language must keep at least one deck".into()));
        }
        tx.delete_srs_in_deck(language_id, deck_id)?;
        let removed = tx.delete_sentences_in_deck(language_id, deck_id)?;
        tx.delete_import_batches_in_deck(language_id, deck_id)?;
        tx.delete_progress(language_id, deck_id)?;
        tx.delete_deck_row(language_id, deck_id)?;
        Ok(removed)
    })
}

/// Create the sample language when the store holds none.
pub fn ensure_seeded(repo: &mut SqliteRepository, now: DateTime<Utc>) -> Result<Option<Language>> {
    if !repo.list_languages()?.is_empty() {
        return Ok(None);
    }
    let mut language = Language::new(
        Uuid::new_v4().to_string(),
        SAMPLE_LANGUAGE.to_string(),
        "el-GR".to_string(),
        now,
    );
    language.token_goal = 1000;

    repo.transaction(|tx| {
        let deck = insert_language(tx, &language, now)?;
        let sentences: Vec<Sentence> = SAMPLE_SENTENCES
            .iter()
            .zip(0u32..)
            .map(|(&(source, target, translit), order)| Sentence {
                id: Uuid::new_v4().to_string(),
                language_id: language.id.clone(),
                deck_id: deck.id.clone(),
                order,
                import_id: None,
                source_text: source.to_string(),
                target_text: target.to_string(),
                transliteration: Some(translit.to_string()),
                gloss: None,
                token_count: token_count_u32(target, false),
            })
            .collect();
        tx.put_sentences(&sentences)
    })?;
    info!(language = %language.id, "seeded sample language");
    Ok(Some(language))
}

/// Counters shown for a deck.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeckSummary {
    pub language_id: String,
    pub deck_id: String,
    pub deck_name: String,
    pub mode: StudyMode,
    pub total_sentences: usize,
    pub due: usize,
    pub introduced: usize,
    pub new_remaining: usize,
    pub linear_order: u32,
    pub srs_new_order: u32,
    pub lifetime_reps: i64,
    pub lifetime_tokens: i64,
    pub token_goal: i64,
    pub seen_words: i64,
}

pub fn deck_summary(conn: &Connection, language_id: &str, deck_id: &str, now: DateTime<Utc>) -> Result<DeckSummary> {
    let language = conn
        .get_language(language_id)?
        .ok_or_else(|| DbError::NotFound(format!("language {language_id}")))?;
    let deck = conn
        .get_deck(language_id, deck_id)?
        .ok_or_else(|| DbError::NotFound(format!("deck {deck_id}")))?;
    let progress = load_progress(conn, language_id, deck_id, now)?;
    let total_sentences = conn.count_sentences(language_id, deck_id)?;
    let introduced = conn.count_srs(language_id, deck_id)?;
    let seen_words = match conn.get_stats(language_id)? {
        Some(stats) => stats.seen_words,
        None => conn.count_seen_words(language_id)?,
    };

    Ok(DeckSummary {
        language_id: language.id,
        deck_id: deck.id,
        deck_name: deck.name,
        mode: progress.mode,
        total_sentences,
        due: conn.count_due(language_id, deck_id, now)?,
        introduced,
        new_remaining: total_sentences.saturating_sub(introduced),
        linear_order: progress.linear_order,
        srs_new_order: progress.srs_new_order,
        lifetime_reps: progress.lifetime_reps,
        lifetime_tokens: progress.lifetime_tokens,
        token_goal: language.token_goal,
        seen_words,
    })
}

/// Delete every row of the store.
pub fn reset_store(repo: &mut SqliteRepository) -> Result<()> {
    repo.transaction(|tx| clear_all(tx))?;
    info!("store reset");
    Ok(())
}
