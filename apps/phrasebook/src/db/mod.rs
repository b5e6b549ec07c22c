//! Local SQLite database operations.

pub mod date_utils;
pub mod error;
pub mod migrations;
pub mod repository;
pub mod schema;

pub use error::DbError;
pub use migrations::{repair_invariants, RepairReport};
pub use repository::{
    clear_all, insert_snapshot, read_snapshot, DeckRepository, ImportBatchRepository, LanguageRepository,
    LegacyProgressRepository, ProgressRepository, SentenceRepository, SqliteRepository, SrsRepository,
    VocabularyRepository,
};
