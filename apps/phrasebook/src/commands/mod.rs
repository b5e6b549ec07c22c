//! Commands used by the front end.

pub mod backup;
pub mod import;
pub mod library;
pub mod study;

pub use backup::{export_backup, restore_backup};
pub use import::{delete_import_batch, import_file, import_spreadsheet, list_import_batches, ImportFileRequest};
pub use library::{
    create_deck, create_language, deck_summary, delete_deck, delete_language, ensure_seeded, list_decks,
    list_languages, rename_deck, reset_store, select, update_language, CommandError,
};
pub use study::{get_current, next_sentence, previous_sentence, rate_sentence, set_mode, RateRequest};
