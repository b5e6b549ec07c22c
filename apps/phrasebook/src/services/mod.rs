//! Store-level operations built on the repositories.

pub mod backup;
pub mod importer;
pub mod languages;
pub mod scheduler;
pub mod vocabulary;
