//! Forward-only schema migrations.
//!
//! Each step runs in its own transaction: the step itself, then
//! [`repair_invariants`], then the new `user_version`. A failing step leaves
//! the store at the previous version and fails the open.

use crate::db::error::DbError;
use crate::db::repository::{
    insert_snapshot, DeckRepository, LanguageRepository, LegacyProgressRepository, ProgressRepository,
    Result, SentenceRepository, VocabularyRepository,
};
use crate::db::schema::{SCHEMA_VERSION, V2_SCHEMA, V3_SCHEMA};
use chrono::{DateTime, Utc};
use phrasebook_core::repair::{default_deck_id, settle_progress, Record};
use phrasebook_core::snapshot::upgrade_snapshot;
use phrasebook_core::tokenizer::token_count_u32;
use phrasebook_core::types::{DatasetStats, Deck, Language, StoredProgress, DEFAULT_DECK_NAME};
use rusqlite::{params, Connection};
use serde_json::Value;
use tracing::{info, warn};

const MIN_EASE: f64 = 1.3;
const MAX_EASE: f64 = 2.8;

struct Migration {
    version: i32,
    name: &'static str,
    apply: fn(&Connection, DateTime<Utc>) -> Result<()>,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 2,
        name: "languages_decks_paths",
        apply: languages_decks_paths,
    },
    Migration {
        version: 3,
        name: "vocabulary_stats",
        apply: vocabulary_stats,
    },
];

/// What [`repair_invariants`] had to fix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub languages_recovered: usize,
    pub decks_created: usize,
    pub sentences_reassigned: usize,
    pub tokens_recounted: usize,
    pub orders_moved: usize,
    pub progress_derived: usize,
    pub progress_clamped: usize,
    pub srs_repaired: usize,
    pub stats_seeded: usize,
}

impl RepairReport {
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}

pub fn user_version(conn: &Connection) -> Result<i32> {
    let version = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(version)
}

fn set_user_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute_batch(&format!("PRAGMA user_version = {version}"))?;
    Ok(())
}

pub(crate) fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![table],
        |row| row.get(0),
    )?;
    Ok(n > 0)
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
        params![table, column],
        |row| row.get(0),
    )?;
    Ok(n > 0)
}

/// Bring the store up to [`SCHEMA_VERSION`].
pub fn migrate(conn: &mut Connection, now: DateTime<Utc>) -> Result<()> {
    let mut version = user_version(conn)?;
    if version == 0 && table_exists(conn, "datasets")? {
        // Single-path stores predating the version stamp.
        version = 1;
    }
    if version > SCHEMA_VERSION {
        return Err(DbError::Migration {
            version,
            message: format!("store is newer than this build (supports up to {SCHEMA_VERSION})"),
        });
    }

    if version == 0 {
        let tx = conn.transaction()?;
        tx.execute_batch(V2_SCHEMA)?;
        tx.execute_batch(V3_SCHEMA)?;
        set_user_version(&tx, SCHEMA_VERSION)?;
        tx.commit()?;
        info!(version = SCHEMA_VERSION, "created store schema");
        return Ok(());
    }

    for migration in MIGRATIONS.iter().filter(|m| m.version > version) {
        let tx = conn.transaction()?;
        let report = (migration.apply)(&tx, now)
            .and_then(|()| repair_invariants(&tx, now))
            .map_err(|e| DbError::Migration {
                version: migration.version,
                message: e.to_string(),
            })?;
        set_user_version(&tx, migration.version)?;
        tx.commit()?;
        info!(version = migration.version, name = migration.name, ?report, "applied migration");
    }
    Ok(())
}

fn row_value(row: &rusqlite::Row, index: usize) -> rusqlite::Result<Value> {
    use rusqlite::types::ValueRef;
    Ok(match row.get_ref(index)? {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::from(n),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(t) => Value::from(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(_) => Value::Null,
    })
}

/// Rows of a table as JSON records keyed by column name.
fn table_records(conn: &Connection, table: &str) -> Result<Vec<Record>> {
    let mut stmt = conn.prepare(&format!("SELECT * FROM {table}"))?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
    let records = stmt
        .query_map([], |row| {
            let mut record = Record::new();
            for (index, column) in columns.iter().enumerate() {
                record.insert(column.clone(), row_value(row, index)?);
            }
            Ok(record)
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(records)
}

/// Legacy sentence rows: the JSON payload with the row's own id and dataset.
fn legacy_sentence_records(conn: &Connection) -> Result<Vec<Record>> {
    let mut stmt = conn.prepare("SELECT id, dataset_id, data FROM legacy_sentences")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut records = Vec::with_capacity(rows.len());
    for (id, dataset_id, data) in rows {
        let mut record = match data.as_deref().map(serde_json::from_str::<Value>) {
            Some(Ok(Value::Object(map))) => map,
            _ => {
                warn!(sentence = %id, "legacy sentence payload is not a JSON object");
                Record::new()
            }
        };
        record.insert("id".into(), Value::from(id));
        if let Some(dataset_id) = dataset_id.filter(|d| !d.trim().is_empty()) {
            record.insert("language_id".into(), Value::from(dataset_id));
        }
        records.push(record);
    }
    Ok(records)
}

/// Single-path tables become languages, decks and per-deck progress.
fn languages_decks_paths(conn: &Connection, now: DateTime<Utc>) -> Result<()> {
    let legacy_sentences = table_exists(conn, "sentences")? && has_column(conn, "sentences", "data")?;
    if legacy_sentences {
        conn.execute_batch("ALTER TABLE sentences RENAME TO legacy_sentences")?;
    }
    conn.execute_batch(V2_SCHEMA)?;

    let datasets = if table_exists(conn, "datasets")? {
        table_records(conn, "datasets")?
    } else {
        Vec::new()
    };
    let sentences = if legacy_sentences {
        legacy_sentence_records(conn)?
    } else {
        Vec::new()
    };
    let progress = if table_exists(conn, "progress")? {
        table_records(conn, "progress")?
    } else {
        Vec::new()
    };

    let mut document = Record::new();
    document.insert("datasets".into(), Value::Array(datasets.into_iter().map(Value::Object).collect()));
    document.insert("sentences".into(), Value::Array(sentences.into_iter().map(Value::Object).collect()));
    document.insert("progress".into(), Value::Array(progress.into_iter().map(Value::Object).collect()));
    let mut snapshot = upgrade_snapshot(&Value::Object(document), now)?;

    // Vocabulary tables arrive with the next version.
    snapshot.seen_words.clear();
    snapshot.dataset_stats.clear();
    insert_snapshot(conn, &snapshot)?;

    conn.execute_batch(
        "DROP TABLE IF EXISTS legacy_sentences;
         DROP TABLE IF EXISTS progress;
         DROP TABLE IF EXISTS datasets;",
    )?;
    info!(
        languages = snapshot.languages.len(),
        sentences = snapshot.sentences.len(),
        "converted single-path tables"
    );
    Ok(())
}

fn vocabulary_stats(conn: &Connection, _now: DateTime<Utc>) -> Result<()> {
    conn.execute_batch(V3_SCHEMA)?;
    Ok(())
}

fn query_ids<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let ids = stmt
        .query_map(params, |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Restore every structural invariant of the current tables.
///
/// Idempotent: a second run on a repaired store changes nothing.
pub fn repair_invariants(conn: &Connection, now: DateTime<Utc>) -> Result<RepairReport> {
    let mut report = RepairReport::default();

    // Languages referenced by sentences but missing.
    let orphan_languages = query_ids(
        conn,
        "SELECT DISTINCT language_id FROM sentences WHERE language_id NOT IN (SELECT id FROM languages)",
        [],
    )?;
    for id in orphan_languages {
        warn!(language = %id, "recovering language referenced by sentences");
        conn.put_language(&Language::new(id.clone(), id, "und".into(), now))?;
        report.languages_recovered += 1;
    }

    let languages = conn.list_languages()?;
    for language in &languages {
        if conn.list_decks(&language.id)?.is_empty() {
            conn.put_deck(&Deck {
                id: default_deck_id(&language.id),
                language_id: language.id.clone(),
                name: DEFAULT_DECK_NAME.into(),
                created_at: language.created_at,
            })?;
            report.decks_created += 1;
        }
        let Some(default_deck) = conn.default_deck(&language.id)? else { continue };

        let stray = query_ids(
            conn,
            "SELECT s.id FROM sentences s WHERE s.language_id = ?1 AND NOT EXISTS (
                 SELECT 1 FROM decks d WHERE d.id = s.deck_id AND d.language_id = s.language_id
             ) ORDER BY s.sort_order, s.id",
            params![language.id],
        )?;
        if !stray.is_empty() {
            let mut next = conn
                .max_order(&language.id, &default_deck.id)?
                .map_or(0, |max| i64::from(max) + 1);
            for id in &stray {
                conn.execute(
                    "UPDATE sentences SET deck_id = ?1, sort_order = ?2 WHERE id = ?3",
                    params![default_deck.id, next, id],
                )?;
                next += 1;
            }
            warn!(language = %language.id, count = stray.len(), "moved sentences without a deck");
            report.sentences_reassigned += stray.len();
        }
    }

    // Token counts that are missing or not positive.
    let mut stmt = conn.prepare(
        "SELECT s.id, s.target_text, l.cjk_mode, s.token_count FROM sentences s
         JOIN languages l ON l.id = s.language_id
         WHERE s.token_count IS NULL OR s.token_count <= 0",
    )?;
    let recount: Vec<(String, String, bool, Option<i64>)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    drop(stmt);
    for (id, target_text, cjk_mode, stored) in recount {
        let count = i64::from(token_count_u32(&target_text, cjk_mode));
        if stored != Some(count) {
            conn.execute("UPDATE sentences SET token_count = ?1 WHERE id = ?2", params![count, id])?;
            report.tokens_recounted += 1;
        }
    }

    let decks = conn.list_all_decks()?;
    for deck in &decks {
        report.orders_moved += conn.normalize_orders(&deck.language_id, &deck.id)?;
    }

    // Review state follows its sentence; ease stays in bounds.
    report.srs_repaired += conn.execute(
        "DELETE FROM srs_state WHERE sentence_id NOT IN (SELECT id FROM sentences)",
        [],
    )?;
    report.srs_repaired += conn.execute(
        "UPDATE srs_state SET
             language_id = (SELECT s.language_id FROM sentences s WHERE s.id = srs_state.sentence_id),
             deck_id = (SELECT s.deck_id FROM sentences s WHERE s.id = srs_state.sentence_id)
         WHERE EXISTS (
             SELECT 1 FROM sentences s WHERE s.id = srs_state.sentence_id
             AND (s.language_id != srs_state.language_id OR s.deck_id != srs_state.deck_id)
         )",
        [],
    )?;
    report.srs_repaired += conn.execute(
        "UPDATE srs_state SET ease = MIN(MAX(ease, ?1), ?2) WHERE ease < ?1 OR ease > ?2",
        params![MIN_EASE, MAX_EASE],
    )?;

    conn.execute(
        "DELETE FROM path_progress WHERE NOT EXISTS (
             SELECT 1 FROM decks d WHERE d.id = path_progress.deck_id AND d.language_id = path_progress.language_id
         )",
        [],
    )?;
    let legacy: Vec<StoredProgress> = conn
        .list_legacy_progress()?
        .into_iter()
        .map(StoredProgress::Legacy)
        .collect();
    for deck in &decks {
        if conn.get_progress(&deck.language_id, &deck.id)?.is_none() {
            let is_default = conn
                .default_deck(&deck.language_id)?
                .is_some_and(|d| d.id == deck.id);
            let progress = settle_progress(&legacy, &deck.language_id, &deck.id, is_default, now);
            conn.put_progress(&progress)?;
            report.progress_derived += 1;
        }
        let before = conn.get_progress(&deck.language_id, &deck.id)?;
        let after = conn.clamp_deck_progress(&deck.language_id, &deck.id)?;
        if before != after {
            report.progress_clamped += 1;
        }
    }

    if table_exists(conn, "dataset_stats")? {
        for language in &languages {
            if conn.get_stats(&language.id)?.is_none() {
                conn.put_stats(&DatasetStats {
                    language_id: language.id.clone(),
                    seen_words: conn.count_seen_words(&language.id)?,
                    updated_at: now,
                })?;
                report.stats_seeded += 1;
            }
        }
    }

    if !report.is_clean() {
        warn!(?report, "repaired stored data");
    }
    Ok(report)
}
