//! Core phrasebook library shared by the store and the command line.
//!
//! Provides:
//! - Sentence import parsing and column resolution
//! - Tokenizer used for token counts and vocabulary exposure
//! - SM-2 style review scheduling
//! - Repairs and backup upgrades for legacy data shapes
//! - Shared types (Language, Deck, Sentence, progress, review state)

pub mod algorithm;
pub mod error;
pub mod import;
pub mod repair;
pub mod snapshot;
pub mod tokenizer;
pub mod types;

pub use algorithm::{SchedulingResult, SpacedRepetitionAlgorithm, Sm2};
pub use error::{ImportError, RepairError, Result};
pub use import::{
    admit_row, parse_delimited, read_spreadsheet, resolve_columns, ColumnKey, ColumnPreferences, Delimiter,
    ImportRow, ResolvedColumns, RowRecord, SpreadsheetReader, Table,
};
pub use snapshot::{upgrade_snapshot, Snapshot, SNAPSHOT_FORMAT};
pub use tokenizer::{count_tokens, token_count_u32, tokenize_text};
pub use types::{
    DatasetStats, Deck, ImportBatch, ImportMode, Language, LegacyDatasetProgress, PathProgress, Rating, RtlMode,
    Sentence, SeenWord, SrsState, StoredProgress, StudyMode, DEFAULT_DECK_NAME,
};
