//! Repository pattern for database access.
//!
//! The repository traits are implemented for [`Connection`], so the same
//! calls work on the store itself and inside a [`Transaction`].

use crate::db::date_utils::{from_millis, to_millis};
use crate::db::error::DbError;
use crate::db::schema::TABLES;
use chrono::{DateTime, Utc};
use phrasebook_core::repair::{clamp_progress, dense_orders, OrderEntry};
use phrasebook_core::snapshot::{Snapshot, SNAPSHOT_FORMAT};
use phrasebook_core::types::{
    DatasetStats, Deck, ImportBatch, ImportMode, Language, LegacyDatasetProgress, PathProgress, RtlMode,
    SeenWord, Sentence, SrsState, StudyMode, DEFAULT_DECK_NAME,
};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::collections::HashMap;
use std::ops::Deref;
use std::path::Path;
use tracing::info;

pub type Result<T> = std::result::Result<T, DbError>;

const LANGUAGE_COLUMNS: &str =
    "id, name, lang_tag, rtl_mode, cjk_mode, tts_rate, tts_pitch, tts_voice, token_goal, theme, created_at";
const DECK_COLUMNS: &str = "id, language_id, name, created_at";
const SENTENCE_COLUMNS: &str = "s.id, s.language_id, s.deck_id, s.sort_order, s.import_id, s.source_text, \
     s.target_text, s.transliteration, s.gloss, s.token_count";
const BATCH_COLUMNS: &str =
    "id, language_id, deck_id, filename, mode, start_order, end_order, row_count, created_at";
const PROGRESS_COLUMNS: &str =
    "language_id, deck_id, mode, linear_order, srs_new_order, lifetime_reps, lifetime_tokens, updated_at";
const SRS_COLUMNS: &str =
    "language_id, deck_id, sentence_id, due_at, reps, lapses, interval_days, ease, updated_at";

fn count_to_usize(n: i64) -> usize {
    usize::try_from(n).unwrap_or(0)
}

/// Repository for language operations.
pub trait LanguageRepository {
    fn list_languages(&self) -> Result<Vec<Language>>;
    fn get_language(&self, id: &str) -> Result<Option<Language>>;
    fn put_language(&self, language: &Language) -> Result<()>;
    fn delete_language_row(&self, id: &str) -> Result<()>;
}

/// Repository for deck operations.
pub trait DeckRepository {
    fn list_decks(&self, language_id: &str) -> Result<Vec<Deck>>;
    fn list_all_decks(&self) -> Result<Vec<Deck>>;
    fn get_deck(&self, language_id: &str, deck_id: &str) -> Result<Option<Deck>>;
    /// The language's "Main" deck, else its oldest.
    fn default_deck(&self, language_id: &str) -> Result<Option<Deck>>;
    fn put_deck(&self, deck: &Deck) -> Result<()>;
    fn delete_deck_row(&self, language_id: &str, deck_id: &str) -> Result<()>;
}

/// Repository for sentence operations.
pub trait SentenceRepository {
    fn get_sentence(&self, id: &str) -> Result<Option<Sentence>>;
    fn sentence_exists(&self, id: &str) -> Result<bool>;
    fn sentence_at(&self, language_id: &str, deck_id: &str, order: u32) -> Result<Option<Sentence>>;
    fn list_sentences(&self, language_id: &str, deck_id: &str) -> Result<Vec<Sentence>>;
    fn list_all_sentences(&self) -> Result<Vec<Sentence>>;
    fn count_sentences(&self, language_id: &str, deck_id: &str) -> Result<usize>;
    fn max_order(&self, language_id: &str, deck_id: &str) -> Result<Option<u32>>;
    /// First sentence at or after `from_order` without review state.
    fn first_unintroduced(&self, language_id: &str, deck_id: &str, from_order: u32) -> Result<Option<Sentence>>;
    fn put_sentence(&self, sentence: &Sentence) -> Result<()>;
    fn put_sentences(&self, sentences: &[Sentence]) -> Result<()>;
    /// Move a sentence to another deck at the given order.
    fn move_sentence(&self, id: &str, language_id: &str, deck_id: &str, order: u32) -> Result<()>;
    fn delete_sentences_in_deck(&self, language_id: &str, deck_id: &str) -> Result<usize>;
    fn delete_sentences_by_import(&self, language_id: &str, deck_id: &str, import_id: &str) -> Result<usize>;
    /// Renumber a deck to `0..n-1`; returns how many rows moved.
    fn normalize_orders(&self, language_id: &str, deck_id: &str) -> Result<usize>;
}

/// Repository for per-deck progress.
pub trait ProgressRepository {
    fn get_progress(&self, language_id: &str, deck_id: &str) -> Result<Option<PathProgress>>;
    fn list_progress(&self) -> Result<Vec<PathProgress>>;
    fn put_progress(&self, progress: &PathProgress) -> Result<()>;
    fn delete_progress(&self, language_id: &str, deck_id: &str) -> Result<()>;
    /// Clamp both pointers to the deck size, persisting any correction.
    fn clamp_deck_progress(&self, language_id: &str, deck_id: &str) -> Result<Option<PathProgress>>;
}

/// Repository for review state.
pub trait SrsRepository {
    fn get_srs(&self, language_id: &str, deck_id: &str, sentence_id: &str) -> Result<Option<SrsState>>;
    fn list_srs(&self) -> Result<Vec<SrsState>>;
    /// Rows with `due_at <= now`, earliest first, ties by sentence id.
    fn due_states(&self, language_id: &str, deck_id: &str, now: DateTime<Utc>) -> Result<Vec<SrsState>>;
    fn count_due(&self, language_id: &str, deck_id: &str, now: DateTime<Utc>) -> Result<usize>;
    fn count_srs(&self, language_id: &str, deck_id: &str) -> Result<usize>;
    fn put_srs(&self, state: &SrsState) -> Result<()>;
    fn delete_srs_in_deck(&self, language_id: &str, deck_id: &str) -> Result<usize>;
    fn delete_srs_by_import(&self, language_id: &str, deck_id: &str, import_id: &str) -> Result<usize>;
    fn delete_srs_for_language(&self, language_id: &str) -> Result<usize>;
}

/// Repository for import batches.
pub trait ImportBatchRepository {
    /// Newest first.
    fn list_import_batches(&self, language_id: &str, deck_id: &str) -> Result<Vec<ImportBatch>>;
    fn list_all_import_batches(&self) -> Result<Vec<ImportBatch>>;
    fn get_import_batch(&self, language_id: &str, deck_id: &str, id: &str) -> Result<Option<ImportBatch>>;
    fn put_import_batch(&self, batch: &ImportBatch) -> Result<()>;
    fn delete_import_batch_row(&self, id: &str) -> Result<()>;
    fn delete_import_batches_in_deck(&self, language_id: &str, deck_id: &str) -> Result<usize>;
    /// Shift the ranges of batches starting after `after_order` down by `removed`.
    fn shift_import_batches(&self, language_id: &str, deck_id: &str, after_order: u32, removed: u32) -> Result<()>;
    /// Re-point every batch of a language to another language's deck.
    fn reassign_import_batches(&self, from_language: &str, to_language: &str, to_deck: &str) -> Result<usize>;
}

/// Repository for seen words and their cached counts.
pub trait VocabularyRepository {
    /// Returns whether the token was new for the language.
    fn record_seen_word(&self, language_id: &str, token: &str, at: DateTime<Utc>) -> Result<bool>;
    fn put_seen_word(&self, word: &SeenWord) -> Result<()>;
    fn list_seen_words(&self) -> Result<Vec<SeenWord>>;
    fn count_seen_words(&self, language_id: &str) -> Result<i64>;
    fn get_stats(&self, language_id: &str) -> Result<Option<DatasetStats>>;
    fn list_stats(&self) -> Result<Vec<DatasetStats>>;
    fn put_stats(&self, stats: &DatasetStats) -> Result<()>;
    fn delete_vocabulary(&self, language_id: &str) -> Result<()>;
}

/// Repository for dataset-wide progress kept from single-path stores.
pub trait LegacyProgressRepository {
    fn list_legacy_progress(&self) -> Result<Vec<LegacyDatasetProgress>>;
    fn put_legacy_progress(&self, progress: &LegacyDatasetProgress) -> Result<()>;
    fn delete_legacy_progress(&self, language_id: &str) -> Result<()>;
}

fn row_to_language(row: &Row) -> rusqlite::Result<Language> {
    Ok(Language {
        id: row.get(0)?,
        name: row.get(1)?,
        lang_tag: row.get(2)?,
        rtl_mode: RtlMode::parse(&row.get::<_, String>(3)?),
        cjk_mode: row.get(4)?,
        tts_rate: row.get(5)?,
        tts_pitch: row.get(6)?,
        tts_voice: row.get(7)?,
        token_goal: row.get(8)?,
        theme: row.get(9)?,
        created_at: from_millis(row.get(10)?),
    })
}

fn row_to_deck(row: &Row) -> rusqlite::Result<Deck> {
    Ok(Deck {
        id: row.get(0)?,
        language_id: row.get(1)?,
        name: row.get(2)?,
        created_at: from_millis(row.get(3)?),
    })
}

fn row_to_sentence(row: &Row) -> rusqlite::Result<Sentence> {
    let token_count: Option<i64> = row.get(9)?;
    Ok(Sentence {
        id: row.get(0)?,
        language_id: row.get(1)?,
        deck_id: row.get(2)?,
        order: row.get(3)?,
        import_id: row.get(4)?,
        source_text: row.get(5)?,
        target_text: row.get(6)?,
        transliteration: row.get(7)?,
        gloss: row.get(8)?,
        token_count: token_count.map_or(0, |n| u32::try_from(n.max(0)).unwrap_or(u32::MAX)),
    })
}

fn row_to_batch(row: &Row) -> rusqlite::Result<ImportBatch> {
    Ok(ImportBatch {
        id: row.get(0)?,
        language_id: row.get(1)?,
        deck_id: row.get(2)?,
        filename: row.get(3)?,
        mode: ImportMode::parse(&row.get::<_, String>(4)?),
        start_order: row.get(5)?,
        end_order: row.get(6)?,
        row_count: row.get(7)?,
        created_at: from_millis(row.get(8)?),
    })
}

fn row_to_progress(row: &Row) -> rusqlite::Result<PathProgress> {
    Ok(PathProgress {
        language_id: row.get(0)?,
        deck_id: row.get(1)?,
        mode: StudyMode::parse(&row.get::<_, String>(2)?),
        linear_order: row.get(3)?,
        srs_new_order: row.get(4)?,
        lifetime_reps: row.get(5)?,
        lifetime_tokens: row.get(6)?,
        updated_at: from_millis(row.get(7)?),
    })
}

fn row_to_srs(row: &Row) -> rusqlite::Result<SrsState> {
    Ok(SrsState {
        language_id: row.get(0)?,
        deck_id: row.get(1)?,
        sentence_id: row.get(2)?,
        due_at: from_millis(row.get(3)?),
        reps: row.get(4)?,
        lapses: row.get(5)?,
        interval_days: row.get(6)?,
        ease: row.get(7)?,
        updated_at: from_millis(row.get(8)?),
    })
}

impl LanguageRepository for Connection {
    fn list_languages(&self) -> Result<Vec<Language>> {
        let mut stmt = self.prepare_cached(&format!(
            "SELECT {LANGUAGE_COLUMNS} FROM languages ORDER BY created_at, id"
        ))?;
        let languages = stmt
            .query_map([], row_to_language)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(languages)
    }

    fn get_language(&self, id: &str) -> Result<Option<Language>> {
        self.prepare_cached(&format!("SELECT {LANGUAGE_COLUMNS} FROM languages WHERE id = ?1"))?
            .query_row(params![id], row_to_language)
            .optional()
            .map_err(Into::into)
    }

    fn put_language(&self, language: &Language) -> Result<()> {
        self.prepare_cached(&format!(
            "INSERT OR REPLACE INTO languages ({LANGUAGE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
        ))?
        .execute(params![
            language.id,
            language.name,
            language.lang_tag,
            language.rtl_mode.as_str(),
            language.cjk_mode,
            language.tts_rate,
            language.tts_pitch,
            language.tts_voice,
            language.token_goal,
            language.theme,
            to_millis(language.created_at),
        ])?;
        Ok(())
    }

    fn delete_language_row(&self, id: &str) -> Result<()> {
        self.execute("DELETE FROM languages WHERE id = ?1", params![id])?;
        Ok(())
    }
}

impl DeckRepository for Connection {
    fn list_decks(&self, language_id: &str) -> Result<Vec<Deck>> {
        let mut stmt = self.prepare_cached(&format!(
            "SELECT {DECK_COLUMNS} FROM decks WHERE language_id = ?1 ORDER BY created_at, id"
        ))?;
        let decks = stmt
            .query_map(params![language_id], row_to_deck)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(decks)
    }

    fn list_all_decks(&self) -> Result<Vec<Deck>> {
        let mut stmt =
            self.prepare_cached(&format!("SELECT {DECK_COLUMNS} FROM decks ORDER BY language_id, created_at, id"))?;
        let decks = stmt
            .query_map([], row_to_deck)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(decks)
    }

    fn get_deck(&self, language_id: &str, deck_id: &str) -> Result<Option<Deck>> {
        self.prepare_cached(&format!(
            "SELECT {DECK_COLUMNS} FROM decks WHERE id = ?1 AND language_id = ?2"
        ))?
        .query_row(params![deck_id, language_id], row_to_deck)
        .optional()
        .map_err(Into::into)
    }

    fn default_deck(&self, language_id: &str) -> Result<Option<Deck>> {
        self.prepare_cached(&format!(
            "SELECT {DECK_COLUMNS} FROM decks WHERE language_id = ?1
             ORDER BY (name = ?2) DESC, created_at, id LIMIT 1"
        ))?
        .query_row(params![language_id, DEFAULT_DECK_NAME], row_to_deck)
        .optional()
        .map_err(Into::into)
    }

    fn put_deck(&self, deck: &Deck) -> Result<()> {
        self.prepare_cached(&format!("INSERT OR REPLACE INTO decks ({DECK_COLUMNS}) VALUES (?1, ?2, ?3, ?4)"))?
            .execute(params![deck.id, deck.language_id, deck.name, to_millis(deck.created_at)])?;
        Ok(())
    }

    fn delete_deck_row(&self, language_id: &str, deck_id: &str) -> Result<()> {
        self.execute(
            "DELETE FROM decks WHERE id = ?1 AND language_id = ?2",
            params![deck_id, language_id],
        )?;
        Ok(())
    }
}

impl SentenceRepository for Connection {
    fn get_sentence(&self, id: &str) -> Result<Option<Sentence>> {
        self.prepare_cached(&format!("SELECT {SENTENCE_COLUMNS} FROM sentences s WHERE s.id = ?1"))?
            .query_row(params![id], row_to_sentence)
            .optional()
            .map_err(Into::into)
    }

    fn sentence_exists(&self, id: &str) -> Result<bool> {
        let found = self
            .prepare_cached("SELECT 1 FROM sentences WHERE id = ?1")?
            .query_row(params![id], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    fn sentence_at(&self, language_id: &str, deck_id: &str, order: u32) -> Result<Option<Sentence>> {
        self.prepare_cached(&format!(
            "SELECT {SENTENCE_COLUMNS} FROM sentences s
             WHERE s.language_id = ?1 AND s.deck_id = ?2 AND s.sort_order = ?3"
        ))?
        .query_row(params![language_id, deck_id, order], row_to_sentence)
        .optional()
        .map_err(Into::into)
    }

    fn list_sentences(&self, language_id: &str, deck_id: &str) -> Result<Vec<Sentence>> {
        let mut stmt = self.prepare_cached(&format!(
            "SELECT {SENTENCE_COLUMNS} FROM sentences s
             WHERE s.language_id = ?1 AND s.deck_id = ?2 ORDER BY s.sort_order"
        ))?;
        let sentences = stmt
            .query_map(params![language_id, deck_id], row_to_sentence)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sentences)
    }

    fn list_all_sentences(&self) -> Result<Vec<Sentence>> {
        let mut stmt = self.prepare_cached(&format!(
            "SELECT {SENTENCE_COLUMNS} FROM sentences s ORDER BY s.language_id, s.deck_id, s.sort_order"
        ))?;
        let sentences = stmt
            .query_map([], row_to_sentence)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sentences)
    }

    fn count_sentences(&self, language_id: &str, deck_id: &str) -> Result<usize> {
        let n: i64 = self
            .prepare_cached("SELECT COUNT(*) FROM sentences WHERE language_id = ?1 AND deck_id = ?2")?
            .query_row(params![language_id, deck_id], |row| row.get(0))?;
        Ok(count_to_usize(n))
    }

    fn max_order(&self, language_id: &str, deck_id: &str) -> Result<Option<u32>> {
        let max: Option<u32> = self
            .prepare_cached("SELECT MAX(sort_order) FROM sentences WHERE language_id = ?1 AND deck_id = ?2")?
            .query_row(params![language_id, deck_id], |row| row.get(0))?;
        Ok(max)
    }

    fn first_unintroduced(&self, language_id: &str, deck_id: &str, from_order: u32) -> Result<Option<Sentence>> {
        self.prepare_cached(&format!(
            "SELECT {SENTENCE_COLUMNS} FROM sentences s
             LEFT JOIN srs_state r ON r.sentence_id = s.id
             WHERE s.language_id = ?1 AND s.deck_id = ?2 AND s.sort_order >= ?3 AND r.sentence_id IS NULL
             ORDER BY s.sort_order LIMIT 1"
        ))?
        .query_row(params![language_id, deck_id, from_order], row_to_sentence)
        .optional()
        .map_err(Into::into)
    }

    fn put_sentence(&self, sentence: &Sentence) -> Result<()> {
        self.prepare_cached(
            "INSERT OR REPLACE INTO sentences (id, language_id, deck_id, sort_order, import_id, source_text,
                 target_text, transliteration, gloss, token_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )?
        .execute(params![
            sentence.id,
            sentence.language_id,
            sentence.deck_id,
            sentence.order,
            sentence.import_id,
            sentence.source_text,
            sentence.target_text,
            sentence.transliteration,
            sentence.gloss,
            sentence.token_count,
        ])?;
        Ok(())
    }

    fn put_sentences(&self, sentences: &[Sentence]) -> Result<()> {
        for sentence in sentences {
            self.put_sentence(sentence)?;
        }
        Ok(())
    }

    fn move_sentence(&self, id: &str, language_id: &str, deck_id: &str, order: u32) -> Result<()> {
        self.prepare_cached("UPDATE sentences SET language_id = ?1, deck_id = ?2, sort_order = ?3 WHERE id = ?4")?
            .execute(params![language_id, deck_id, order, id])?;
        Ok(())
    }

    fn delete_sentences_in_deck(&self, language_id: &str, deck_id: &str) -> Result<usize> {
        let count = self.execute(
            "DELETE FROM sentences WHERE language_id = ?1 AND deck_id = ?2",
            params![language_id, deck_id],
        )?;
        Ok(count)
    }

    fn delete_sentences_by_import(&self, language_id: &str, deck_id: &str, import_id: &str) -> Result<usize> {
        let count = self.execute(
            "DELETE FROM sentences WHERE language_id = ?1 AND deck_id = ?2 AND import_id = ?3",
            params![language_id, deck_id, import_id],
        )?;
        Ok(count)
    }

    fn normalize_orders(&self, language_id: &str, deck_id: &str) -> Result<usize> {
        let mut stmt =
            self.prepare_cached("SELECT id, sort_order FROM sentences WHERE language_id = ?1 AND deck_id = ?2")?;
        let entries = stmt
            .query_map(params![language_id, deck_id], |row| {
                Ok(OrderEntry {
                    id: row.get(0)?,
                    order: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        drop(stmt);
        let current: HashMap<&str, Option<i64>> = entries.iter().map(|e| (e.id.as_str(), e.order)).collect();

        // Moved rows park below every existing order first so the unique
        // index never sees two rows on one order.
        let floor = entries.iter().filter_map(|e| e.order).min().unwrap_or(0).min(0);
        let span = i64::try_from(entries.len()).unwrap_or(i64::MAX);
        if floor.checked_sub(span).and_then(|n| n.checked_sub(1)).is_none() {
            return Err(DbError::InvalidData(format!("sentence order {floor} is out of range")));
        }
        let mut moved = 0;
        {
            let mut stmt = self.prepare_cached("UPDATE sentences SET sort_order = ?1 WHERE id = ?2")?;
            for (index, id) in dense_orders(&entries).iter().enumerate() {
                let target = i64::try_from(index).unwrap_or(i64::MAX);
                if current.get(id.as_str()).copied().flatten() != Some(target) {
                    stmt.execute(params![floor - 1 - target, id])?;
                    moved += 1;
                }
            }
        }
        if moved > 0 {
            self.execute(
                "UPDATE sentences SET sort_order = ?3 - 1 - sort_order
                 WHERE language_id = ?1 AND deck_id = ?2 AND sort_order < ?3",
                params![language_id, deck_id, floor],
            )?;
        }
        Ok(moved)
    }
}

impl ProgressRepository for Connection {
    fn get_progress(&self, language_id: &str, deck_id: &str) -> Result<Option<PathProgress>> {
        self.prepare_cached(&format!(
            "SELECT {PROGRESS_COLUMNS} FROM path_progress WHERE language_id = ?1 AND deck_id = ?2"
        ))?
        .query_row(params![language_id, deck_id], row_to_progress)
        .optional()
        .map_err(Into::into)
    }

    fn list_progress(&self) -> Result<Vec<PathProgress>> {
        let mut stmt = self.prepare_cached(&format!(
            "SELECT {PROGRESS_COLUMNS} FROM path_progress ORDER BY language_id, deck_id"
        ))?;
        let rows = stmt
            .query_map([], row_to_progress)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn put_progress(&self, progress: &PathProgress) -> Result<()> {
        self.prepare_cached(&format!(
            "INSERT OR REPLACE INTO path_progress ({PROGRESS_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
        ))?
        .execute(params![
            progress.language_id,
            progress.deck_id,
            progress.mode.as_str(),
            progress.linear_order,
            progress.srs_new_order,
            progress.lifetime_reps,
            progress.lifetime_tokens,
            to_millis(progress.updated_at),
        ])?;
        Ok(())
    }

    fn delete_progress(&self, language_id: &str, deck_id: &str) -> Result<()> {
        self.execute(
            "DELETE FROM path_progress WHERE language_id = ?1 AND deck_id = ?2",
            params![language_id, deck_id],
        )?;
        Ok(())
    }

    fn clamp_deck_progress(&self, language_id: &str, deck_id: &str) -> Result<Option<PathProgress>> {
        let Some(mut progress) = self.get_progress(language_id, deck_id)? else {
            return Ok(None);
        };
        let count = self.count_sentences(language_id, deck_id)?;
        if clamp_progress(&mut progress, count) {
            self.put_progress(&progress)?;
        }
        Ok(Some(progress))
    }
}

impl SrsRepository for Connection {
    fn get_srs(&self, language_id: &str, deck_id: &str, sentence_id: &str) -> Result<Option<SrsState>> {
        self.prepare_cached(&format!(
            "SELECT {SRS_COLUMNS} FROM srs_state WHERE language_id = ?1 AND deck_id = ?2 AND sentence_id = ?3"
        ))?
        .query_row(params![language_id, deck_id, sentence_id], row_to_srs)
        .optional()
        .map_err(Into::into)
    }

    fn list_srs(&self) -> Result<Vec<SrsState>> {
        let mut stmt = self.prepare_cached(&format!(
            "SELECT {SRS_COLUMNS} FROM srs_state ORDER BY language_id, deck_id, sentence_id"
        ))?;
        let rows = stmt
            .query_map([], row_to_srs)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn due_states(&self, language_id: &str, deck_id: &str, now: DateTime<Utc>) -> Result<Vec<SrsState>> {
        let mut stmt = self.prepare_cached(&format!(
            "SELECT {SRS_COLUMNS} FROM srs_state
             WHERE language_id = ?1 AND deck_id = ?2 AND due_at <= ?3
             ORDER BY due_at, sentence_id"
        ))?;
        let rows = stmt
            .query_map(params![language_id, deck_id, to_millis(now)], row_to_srs)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn count_due(&self, language_id: &str, deck_id: &str, now: DateTime<Utc>) -> Result<usize> {
        let n: i64 = self
            .prepare_cached(
                "SELECT COUNT(*) FROM srs_state WHERE language_id = ?1 AND deck_id = ?2 AND due_at <= ?3",
            )?
            .query_row(params![language_id, deck_id, to_millis(now)], |row| row.get(0))?;
        Ok(count_to_usize(n))
    }

    fn count_srs(&self, language_id: &str, deck_id: &str) -> Result<usize> {
        let n: i64 = self
            .prepare_cached("SELECT COUNT(*) FROM srs_state WHERE language_id = ?1 AND deck_id = ?2")?
            .query_row(params![language_id, deck_id], |row| row.get(0))?;
        Ok(count_to_usize(n))
    }

    fn put_srs(&self, state: &SrsState) -> Result<()> {
        self.prepare_cached(&format!(
            "INSERT OR REPLACE INTO srs_state ({SRS_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
        ))?
        .execute(params![
            state.language_id,
            state.deck_id,
            state.sentence_id,
            to_millis(state.due_at),
            state.reps,
            state.lapses,
            state.interval_days,
            state.ease,
            to_millis(state.updated_at),
        ])?;
        Ok(())
    }

    fn delete_srs_in_deck(&self, language_id: &str, deck_id: &str) -> Result<usize> {
        let count = self.execute(
            "DELETE FROM srs_state WHERE language_id = ?1 AND deck_id = ?2",
            params![language_id, deck_id],
        )?;
        Ok(count)
    }

    fn delete_srs_by_import(&self, language_id: &str, deck_id: &str, import_id: &str) -> Result<usize> {
        let count = self.execute(
            "DELETE FROM srs_state WHERE language_id = ?1 AND deck_id = ?2 AND sentence_id IN (
                 SELECT id FROM sentences WHERE language_id = ?1 AND deck_id = ?2 AND import_id = ?3
             )",
            params![language_id, deck_id, import_id],
        )?;
        Ok(count)
    }

    fn delete_srs_for_language(&self, language_id: &str) -> Result<usize> {
        let count = self.execute("DELETE FROM srs_state WHERE language_id = ?1", params![language_id])?;
        Ok(count)
    }
}

impl ImportBatchRepository for Connection {
    fn list_import_batches(&self, language_id: &str, deck_id: &str) -> Result<Vec<ImportBatch>> {
        let mut stmt = self.prepare_cached(&format!(
            "SELECT {BATCH_COLUMNS} FROM import_batches WHERE language_id = ?1 AND deck_id = ?2
             ORDER BY created_at DESC, rowid DESC"
        ))?;
        let rows = stmt
            .query_map(params![language_id, deck_id], row_to_batch)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn list_all_import_batches(&self) -> Result<Vec<ImportBatch>> {
        let mut stmt = self.prepare_cached(&format!(
            "SELECT {BATCH_COLUMNS} FROM import_batches ORDER BY language_id, deck_id, created_at, rowid"
        ))?;
        let rows = stmt
            .query_map([], row_to_batch)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn get_import_batch(&self, language_id: &str, deck_id: &str, id: &str) -> Result<Option<ImportBatch>> {
        self.prepare_cached(&format!(
            "SELECT {BATCH_COLUMNS} FROM import_batches WHERE id = ?1 AND language_id = ?2 AND deck_id = ?3"
        ))?
        .query_row(params![id, language_id, deck_id], row_to_batch)
        .optional()
        .map_err(Into::into)
    }

    fn put_import_batch(&self, batch: &ImportBatch) -> Result<()> {
        self.prepare_cached(&format!(
            "INSERT OR REPLACE INTO import_batches ({BATCH_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
        ))?
        .execute(params![
            batch.id,
            batch.language_id,
            batch.deck_id,
            batch.filename,
            batch.mode.as_str(),
            batch.start_order,
            batch.end_order,
            batch.row_count,
            to_millis(batch.created_at),
        ])?;
        Ok(())
    }

    fn delete_import_batch_row(&self, id: &str) -> Result<()> {
        self.execute("DELETE FROM import_batches WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn delete_import_batches_in_deck(&self, language_id: &str, deck_id: &str) -> Result<usize> {
        let count = self.execute(
            "DELETE FROM import_batches WHERE language_id = ?1 AND deck_id = ?2",
            params![language_id, deck_id],
        )?;
        Ok(count)
    }

    fn shift_import_batches(&self, language_id: &str, deck_id: &str, after_order: u32, removed: u32) -> Result<()> {
        self.execute(
            "UPDATE import_batches SET start_order = MAX(start_order - ?4, 0), end_order = MAX(end_order - ?4, 0)
             WHERE language_id = ?1 AND deck_id = ?2 AND start_order > ?3",
            params![language_id, deck_id, after_order, removed],
        )?;
        Ok(())
    }

    fn reassign_import_batches(&self, from_language: &str, to_language: &str, to_deck: &str) -> Result<usize> {
        let count = self.execute(
            "UPDATE import_batches SET language_id = ?1, deck_id = ?2 WHERE language_id = ?3",
            params![to_language, to_deck, from_language],
        )?;
        Ok(count)
    }
}

impl VocabularyRepository for Connection {
    fn record_seen_word(&self, language_id: &str, token: &str, at: DateTime<Utc>) -> Result<bool> {
        let inserted = self
            .prepare_cached("INSERT OR IGNORE INTO seen_words (language_id, token, first_seen_at) VALUES (?1, ?2, ?3)")?
            .execute(params![language_id, token, to_millis(at)])?;
        Ok(inserted > 0)
    }

    fn put_seen_word(&self, word: &SeenWord) -> Result<()> {
        self.prepare_cached(
            "INSERT OR REPLACE INTO seen_words (language_id, token, first_seen_at) VALUES (?1, ?2, ?3)",
        )?
        .execute(params![word.language_id, word.token, to_millis(word.first_seen_at)])?;
        Ok(())
    }

    fn list_seen_words(&self) -> Result<Vec<SeenWord>> {
        let mut stmt = self
            .prepare_cached("SELECT language_id, token, first_seen_at FROM seen_words ORDER BY language_id, token")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(SeenWord {
                    language_id: row.get(0)?,
                    token: row.get(1)?,
                    first_seen_at: from_millis(row.get(2)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn count_seen_words(&self, language_id: &str) -> Result<i64> {
        let n = self
            .prepare_cached("SELECT COUNT(*) FROM seen_words WHERE language_id = ?1")?
            .query_row(params![language_id], |row| row.get(0))?;
        Ok(n)
    }

    fn get_stats(&self, language_id: &str) -> Result<Option<DatasetStats>> {
        self.prepare_cached("SELECT language_id, seen_words, updated_at FROM dataset_stats WHERE language_id = ?1")?
            .query_row(params![language_id], |row| {
                Ok(DatasetStats {
                    language_id: row.get(0)?,
                    seen_words: row.get(1)?,
                    updated_at: from_millis(row.get(2)?),
                })
            })
            .optional()
            .map_err(Into::into)
    }

    fn list_stats(&self) -> Result<Vec<DatasetStats>> {
        let mut stmt =
            self.prepare_cached("SELECT language_id, seen_words, updated_at FROM dataset_stats ORDER BY language_id")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(DatasetStats {
                    language_id: row.get(0)?,
                    seen_words: row.get(1)?,
                    updated_at: from_millis(row.get(2)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn put_stats(&self, stats: &DatasetStats) -> Result<()> {
        self.prepare_cached(
            "INSERT OR REPLACE INTO dataset_stats (language_id, seen_words, updated_at) VALUES (?1, ?2, ?3)",
        )?
        .execute(params![stats.language_id, stats.seen_words, to_millis(stats.updated_at)])?;
        Ok(())
    }

    fn delete_vocabulary(&self, language_id: &str) -> Result<()> {
        self.execute("DELETE FROM seen_words WHERE language_id = ?1", params![language_id])?;
        self.execute("DELETE FROM dataset_stats WHERE language_id = ?1", params![language_id])?;
        Ok(())
    }
}

impl LegacyProgressRepository for Connection {
    fn list_legacy_progress(&self) -> Result<Vec<LegacyDatasetProgress>> {
        let mut stmt = self.prepare_cached(
            "SELECT language_id, linear_order, lifetime_reps, lifetime_tokens, updated_at
             FROM legacy_progress ORDER BY language_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(LegacyDatasetProgress {
                    language_id: row.get(0)?,
                    linear_order: row.get(1)?,
                    lifetime_reps: row.get(2)?,
                    lifetime_tokens: row.get(3)?,
                    updated_at: from_millis(row.get(4)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn put_legacy_progress(&self, progress: &LegacyDatasetProgress) -> Result<()> {
        self.prepare_cached(
            "INSERT OR REPLACE INTO legacy_progress (language_id, linear_order, lifetime_reps, lifetime_tokens, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?
        .execute(params![
            progress.language_id,
            progress.linear_order,
            progress.lifetime_reps,
            progress.lifetime_tokens,
            to_millis(progress.updated_at),
        ])?;
        Ok(())
    }

    fn delete_legacy_progress(&self, language_id: &str) -> Result<()> {
        self.execute("DELETE FROM legacy_progress WHERE language_id = ?1", params![language_id])?;
        Ok(())
    }
}

/// Delete every row of every table.
pub fn clear_all(conn: &Connection) -> Result<()> {
    for table in TABLES {
        conn.execute(&format!("DELETE FROM {table}"), [])?;
    }
    Ok(())
}

/// Write every row of a snapshot; tables are expected to be empty.
pub fn insert_snapshot(conn: &Connection, snapshot: &Snapshot) -> Result<()> {
    for language in &snapshot.languages {
        conn.put_language(language)?;
    }
    for deck in &snapshot.decks {
        conn.put_deck(deck)?;
    }
    conn.put_sentences(&snapshot.sentences)?;
    for batch in &snapshot.import_batches {
        conn.put_import_batch(batch)?;
    }
    for progress in &snapshot.path_progress {
        conn.put_progress(progress)?;
    }
    for state in &snapshot.srs_state {
        conn.put_srs(state)?;
    }
    for word in &snapshot.seen_words {
        conn.put_seen_word(word)?;
    }
    for stats in &snapshot.dataset_stats {
        conn.put_stats(stats)?;
    }
    for legacy in &snapshot.legacy_progress {
        conn.put_legacy_progress(legacy)?;
    }
    Ok(())
}

/// Read every table into a snapshot.
pub fn read_snapshot(conn: &Connection, exported_at: DateTime<Utc>) -> Result<Snapshot> {
    Ok(Snapshot {
        format: SNAPSHOT_FORMAT,
        exported_at,
        languages: conn.list_languages()?,
        decks: conn.list_all_decks()?,
        import_batches: conn.list_all_import_batches()?,
        sentences: conn.list_all_sentences()?,
        path_progress: conn.list_progress()?,
        srs_state: conn.list_srs()?,
        seen_words: conn.list_seen_words()?,
        dataset_stats: conn.list_stats()?,
        legacy_progress: conn.list_legacy_progress()?,
    })
}

/// SQLite implementation of repositories.
pub struct SqliteRepository {
    conn: Connection,
}

impl SqliteRepository {
    /// Open database at path, creating and migrating it as necessary.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        let repo = Self::initialize(conn)?;
        info!(path = %path.display(), "phrasebook store opened");
        Ok(repo)
    }

    /// Open in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(mut conn: Connection) -> Result<Self> {
        conn.execute_batch(super::schema::PRAGMAS)?;
        super::migrations::migrate(&mut conn, Utc::now())?;
        Ok(Self { conn })
    }

    /// Run `body` in one transaction; any error rolls everything back.
    pub fn transaction<T>(&mut self, body: impl FnOnce(&Transaction) -> Result<T>) -> Result<T> {
        let tx = self.conn.transaction()?;
        let value = body(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Version recorded in the store.
    pub fn schema_version(&self) -> Result<i32> {
        super::migrations::user_version(&self.conn)
    }
}

impl Deref for SqliteRepository {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}
