//! Import commands.

use super::library::{current_selection, lock_repository, CommandError};
use crate::services::importer::{self, ImportOutcome, ImportProgress, ImportRequest, ImportSource};
use crate::state::AppState;
use chrono::Utc;
use phrasebook_core::import::{ColumnPreferences, Delimiter, SpreadsheetReader};
use phrasebook_core::types::{ImportBatch, ImportMode};
use std::fs;
use std::path::Path;

#[derive(Debug, Default, serde::Deserialize)]
pub struct ImportFileRequest {
    pub file_path: String,
    #[serde(default)]
    pub mode: ImportMode,
    /// Detected from the file name when absent.
    #[serde(default)]
    pub delimiter: Option<Delimiter>,
    #[serde(default)]
    pub mapping: ColumnPreferences,
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("import")
        .to_string()
}

/// Import a delimited text file into the selected deck.
pub async fn import_file(
    request: ImportFileRequest,
    on_progress: &mut dyn FnMut(ImportProgress),
    state: &AppState,
) -> Result<ImportOutcome, CommandError> {
    let path = Path::new(&request.file_path);
    let text = fs::read_to_string(path)?;
    let filename = file_name(path);
    let delimiter = request.delimiter.unwrap_or_else(|| Delimiter::for_filename(&filename));
    let (language_id, deck_id) = current_selection(state).await?;

    let mut repo = lock_repository(state)?;
    importer::import_sentences(
        &mut repo,
        ImportRequest {
            language_id,
            deck_id,
            filename,
            source: ImportSource::Delimited { text: &text, delimiter },
            mapping: request.mapping,
            mode: request.mode,
        },
        state.import_batch_size,
        on_progress,
        Utc::now(),
    )
    .map_err(Into::into)
}

/// Import one sheet of a workbook into the selected deck.
pub async fn import_spreadsheet(
    file_path: String,
    sheet: Option<String>,
    mode: ImportMode,
    mapping: ColumnPreferences,
    reader: &dyn SpreadsheetReader,
    state: &AppState,
) -> Result<ImportOutcome, CommandError> {
    let path = Path::new(&file_path);
    let bytes = fs::read(path)?;
    let (language_id, deck_id) = current_selection(state).await?;

    let mut repo = lock_repository(state)?;
    importer::import_sentences(
        &mut repo,
        ImportRequest {
            language_id,
            deck_id,
            filename: file_name(path),
            source: ImportSource::Spreadsheet {
                bytes: &bytes,
                sheet: sheet.as_deref(),
                reader,
            },
            mapping,
            mode,
        },
        state.import_batch_size,
        &mut |_| {},
        Utc::now(),
    )
    .map_err(Into::into)
}

/// Import batches of the selected deck, newest first.
pub async fn list_import_batches(state: &AppState) -> Result<Vec<ImportBatch>, CommandError> {
    let (language_id, deck_id) = current_selection(state).await?;
    let repo = lock_repository(state)?;
    importer::list_import_batches(&repo, &language_id, &deck_id).map_err(Into::into)
}

/// Undo an import of the selected deck.
pub async fn delete_import_batch(import_id: String, state: &AppState) -> Result<usize, CommandError> {
    let (language_id, deck_id) = current_selection(state).await?;
    let mut repo = lock_repository(state)?;
    importer::delete_import_batch(&mut repo, &language_id, &deck_id, &import_id).map_err(Into::into)
}
