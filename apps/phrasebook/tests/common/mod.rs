//! Common test utilities and fixtures for integration tests.
//!
//! This module provides shared test infrastructure including:
//! - TestContext over an in-memory store with one language
//! - Helpers to fill a deck and read its progress back

#![allow(dead_code)]

pub mod fixtures;

use chrono::{DateTime, Duration, Utc};

use phrasebook_core::types::{Language, PathProgress, Sentence};
use phrasebook_lib::db::{ProgressRepository, SentenceRepository, SqliteRepository};
use phrasebook_lib::services::languages::{create_language, LanguageSettings};

/// Test context holding a migrated in-memory store with one language.
pub struct TestContext {
    pub repo: SqliteRepository,
    pub language: Language,
    pub deck_id: String,
    pub now: DateTime<Utc>,
}

impl TestContext {
    /// Create a new test context with an empty "Greek" language.
    ///
    /// # Panics
    /// Panics if the in-memory store cannot be created.
    pub fn new() -> Self {
        let now = fixtures::start_time();
        let mut repo = SqliteRepository::open_in_memory().expect("open in-memory store");
        let language = create_language(
            &mut repo,
            LanguageSettings {
                name: "Greek".to_string(),
                lang_tag: "el-GR".to_string(),
                ..LanguageSettings::default()
            },
            now,
        )
        .expect("create language");
        let deck_id = format!("{}:main", language.id);
        Self {
            repo,
            language,
            deck_id,
            now,
        }
    }

    pub fn lang(&self) -> &str {
        &self.language.id
    }

    /// Append sentences with the given target texts to the Main deck.
    pub fn add_sentences(&mut self, targets: &[&str]) -> Vec<Sentence> {
        let start = self
            .repo
            .max_order(&self.language.id, &self.deck_id)
            .expect("max order")
            .map_or(0, |max| max + 1);
        let sentences: Vec<Sentence> = targets
            .iter()
            .zip(start..)
            .map(|(target, order)| fixtures::sentence(&self.language.id, &self.deck_id, order, target))
            .collect();
        self.repo.put_sentences(&sentences).expect("insert sentences");
        sentences
    }

    pub fn progress(&self) -> PathProgress {
        self.repo
            .get_progress(&self.language.id, &self.deck_id)
            .expect("read progress")
            .expect("progress exists")
    }

    pub fn orders(&self) -> Vec<u32> {
        self.repo
            .list_sentences(&self.language.id, &self.deck_id)
            .expect("list sentences")
            .iter()
            .map(|s| s.order)
            .collect()
    }

    /// Move the clock forward.
    pub fn advance_clock(&mut self, by: Duration) -> DateTime<Utc> {
        self.now += by;
        self.now
    }
}
