//! Bulk sentence import and import undo.
//!
//! Files are parsed and validated before anything is written, so a missing
//! column or an empty file leaves the store untouched. The rows then go in
//! as one transaction, written in fixed-size chunks with a progress report
//! after each chunk. The call is synchronous and holds the connection
//! throughout; callers that must stay responsive do their yielding inside
//! the progress callback.

use crate::db::repository::Result;
use crate::db::{
    DbError, DeckRepository, ImportBatchRepository, LanguageRepository, ProgressRepository, SentenceRepository,
    SqliteRepository, SrsRepository,
};
use crate::services::scheduler::load_progress;
use chrono::{DateTime, Utc};
use phrasebook_core::error::ImportError;
use phrasebook_core::import::{
    admit_row, parse_delimited, read_spreadsheet, resolve_columns, ColumnPreferences, Delimiter, ImportRow,
    ResolvedColumns, SpreadsheetReader, Table,
};
use phrasebook_core::types::{ImportBatch, ImportMode, Sentence};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Where the rows come from.
pub enum ImportSource<'a> {
    Delimited {
        text: &'a str,
        delimiter: Delimiter,
    },
    Spreadsheet {
        bytes: &'a [u8],
        sheet: Option<&'a str>,
        reader: &'a dyn SpreadsheetReader,
    },
}

pub struct ImportRequest<'a> {
    pub language_id: String,
    pub deck_id: String,
    pub filename: String,
    pub source: ImportSource<'a>,
    pub mapping: ColumnPreferences,
    pub mode: ImportMode,
}

/// Reported after every written chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImportProgress {
    pub written: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportOutcome {
    pub import_id: String,
    pub inserted: usize,
    pub start_order: u32,
    pub end_order: u32,
    pub columns: ResolvedColumns,
}

fn read_table(source: &ImportSource<'_>) -> std::result::Result<Table, ImportError> {
    match source {
        ImportSource::Delimited { text, delimiter } => parse_delimited(text, *delimiter),
        ImportSource::Spreadsheet { bytes, sheet, reader } => read_spreadsheet(*reader, bytes, *sheet),
    }
}

/// Import a file into a deck.
pub fn import_sentences(
    repo: &mut SqliteRepository,
    request: ImportRequest<'_>,
    batch_size: usize,
    on_progress: &mut dyn FnMut(ImportProgress),
    now: DateTime<Utc>,
) -> Result<ImportOutcome> {
    let language = repo
        .get_language(&request.language_id)?
        .ok_or_else(|| DbError::NotFound(format!("language {}", request.language_id)))?;
    if repo.get_deck(&language.id, &request.deck_id)?.is_none() {
        return Err(DbError::NotFound(format!("deck {}", request.deck_id)));
    }

    let table = read_table(&request.source)?;
    let columns = resolve_columns(&table.headers, &request.mapping)?;
    let rows: Vec<ImportRow> = table
        .rows
        .iter()
        .filter_map(|row| admit_row(row, &columns, language.cjk_mode))
        .collect();
    if rows.is_empty() {
        return Err(ImportError::NoRows.into());
    }
    let skipped = table.rows.len() - rows.len();

    let language_id = language.id.as_str();
    let deck_id = request.deck_id.as_str();
    let import_id = Uuid::new_v4().to_string();
    let total = rows.len();
    let chunk_size = batch_size.max(1);

    let (start_order, end_order) = repo.transaction(|tx| {
        let mut progress = load_progress(tx, language_id, deck_id, now)?;
        let start_order = match request.mode {
            ImportMode::Replace => {
                tx.delete_srs_in_deck(language_id, deck_id)?;
                let removed = tx.delete_sentences_in_deck(language_id, deck_id)?;
                tx.delete_import_batches_in_deck(language_id, deck_id)?;
                progress.linear_order = 0;
                progress.srs_new_order = 0;
                progress.updated_at = now;
                tx.put_progress(&progress)?;
                debug!(removed, "cleared deck for replace import");
                0
            }
            ImportMode::Append => tx.max_order(language_id, deck_id)?.map_or(0, |max| max + 1),
        };

        let mut used_ids: HashSet<String> = HashSet::with_capacity(total);
        let mut next_order = start_order;
        let mut written = 0;
        for chunk in rows.chunks(chunk_size) {
            let mut sentences = Vec::with_capacity(chunk.len());
            for row in chunk {
                let id = match row.external_id.as_deref() {
                    Some(id) => {
                        if used_ids.contains(id) || tx.sentence_exists(id)? {
                            warn!(id, "duplicate sentence id in import, assigning a new one");
                            Uuid::new_v4().to_string()
                        } else {
                            id.to_string()
                        }
                    }
                    None => Uuid::new_v4().to_string(),
                };
                used_ids.insert(id.clone());
                sentences.push(Sentence {
                    id,
                    language_id: language_id.to_string(),
                    deck_id: deck_id.to_string(),
                    order: next_order,
                    import_id: Some(import_id.clone()),
                    source_text: row.source_text.clone(),
                    target_text: row.target_text.clone(),
                    transliteration: row.transliteration.clone(),
                    gloss: row.gloss.clone(),
                    token_count: row.token_count,
                });
                next_order += 1;
            }
            tx.put_sentences(&sentences)?;
            written += sentences.len();
            debug!(written, total, "import chunk written");
            on_progress(ImportProgress { written, total });
        }

        let end_order = next_order - 1;
        tx.put_import_batch(&ImportBatch {
            id: import_id.clone(),
            language_id: language_id.to_string(),
            deck_id: deck_id.to_string(),
            filename: request.filename.clone(),
            mode: request.mode,
            start_order,
            end_order,
            row_count: u32::try_from(total).unwrap_or(u32::MAX),
            created_at: now,
        })?;
        Ok((start_order, end_order))
    })?;

    info!(
        language = language_id,
        deck = deck_id,
        import_id = %import_id,
        inserted = total,
        skipped,
        mode = request.mode.as_str(),
        "imported sentences"
    );
    Ok(ImportOutcome {
        import_id,
        inserted: total,
        start_order,
        end_order,
        columns,
    })
}

/// Undo an import: its sentences and their review state go, the deck is
/// renumbered and its pointers clamped. Returns the number of sentences removed.
pub fn delete_import_batch(
    repo: &mut SqliteRepository,
    language_id: &str,
    deck_id: &str,
    import_id: &str,
) -> Result<usize> {
    repo.transaction(|tx| {
        let batch = tx
            .get_import_batch(language_id, deck_id, import_id)?
            .ok_or_else(|| DbError::NotFound(format!("import {import_id}")))?;
        tx.delete_srs_by_import(language_id, deck_id, import_id)?;
        let removed = tx.delete_sentences_by_import(language_id, deck_id, import_id)?;
        tx.delete_import_batch_row(import_id)?;
        tx.normalize_orders(language_id, deck_id)?;
        tx.shift_import_batches(
            language_id,
            deck_id,
            batch.end_order,
            u32::try_from(removed).unwrap_or(u32::MAX),
        )?;
        tx.clamp_deck_progress(language_id, deck_id)?;
        info!(language = language_id, deck = deck_id, import_id, removed, "deleted import");
        Ok(removed)
    })
}

/// Import batches of a deck, newest first.
pub fn list_import_batches(conn: &rusqlite::Connection, language_id: &str, deck_id: &str) -> Result<Vec<ImportBatch>> {
    conn.list_import_batches(language_id, deck_id)
}
