//! On-disk store migration tests.

mod common;

use pretty_assertions::assert_eq;
use rusqlite::Connection;
use tempfile::TempDir;

use common::fixtures;
use phrasebook_lib::db::migrations::repair_invariants;
use phrasebook_lib::db::schema::{LEGACY_V1_SCHEMA, SCHEMA_VERSION};
use phrasebook_lib::db::{
    DbError, DeckRepository, LanguageRepository, LegacyProgressRepository, ProgressRepository, SentenceRepository,
    SqliteRepository, VocabularyRepository,
};

fn legacy_store(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("legacy.db");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(LEGACY_V1_SCHEMA).unwrap();
    conn.execute_batch(fixtures::LEGACY_STORE_ROWS).unwrap();
    path
}

#[test]
fn version_one_store_is_upgraded_on_open() {
    let dir = TempDir::new().unwrap();
    let path = legacy_store(&dir);

    let repo = SqliteRepository::open(&path).unwrap();

    assert_eq!(repo.schema_version().unwrap(), SCHEMA_VERSION);
    let language = repo.get_language("el").unwrap().unwrap();
    assert_eq!(language.name, "Greek");
    assert_eq!(language.lang_tag, "el-GR");
    let deck = repo.default_deck("el").unwrap().unwrap();
    assert_eq!(deck.id, "el:main");

    let sentences = repo.list_sentences("el", &deck.id).unwrap();
    let orders: Vec<(&str, u32)> = sentences.iter().map(|s| (s.id.as_str(), s.order)).collect();
    assert_eq!(orders, vec![("s1", 0), ("s2", 1), ("s3", 2)]);
    assert_eq!(sentences[2].token_count, 2);
    assert_eq!(sentences[2].source_text, "Thank you very much");

    let progress = repo.get_progress("el", &deck.id).unwrap().unwrap();
    assert_eq!(progress.linear_order, 1);
    assert_eq!(progress.srs_new_order, 1);
    assert_eq!(progress.lifetime_reps, 7);
    assert_eq!(progress.lifetime_tokens, 15);
    assert_eq!(repo.list_legacy_progress().unwrap().len(), 1);
    assert_eq!(repo.get_stats("el").unwrap().unwrap().seen_words, 0);
}

#[test]
fn upgraded_store_reopens_unchanged() {
    let dir = TempDir::new().unwrap();
    let path = legacy_store(&dir);
    let before = {
        let repo = SqliteRepository::open(&path).unwrap();
        repo.list_all_sentences().unwrap()
    };

    let repo = SqliteRepository::open(&path).unwrap();

    assert_eq!(repo.list_all_sentences().unwrap(), before);
    let report = repair_invariants(&repo, fixtures::start_time()).unwrap();
    assert!(report.is_clean(), "{report:?}");
}

#[test]
fn store_from_a_newer_version_is_refused() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("future.db");
    {
        let conn = Connection::open(&path).unwrap();
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1).unwrap();
    }

    let err = SqliteRepository::open(&path).err().unwrap();
    assert!(matches!(err, DbError::Migration { .. }), "{err:?}");
}

#[test]
fn negative_orders_are_renumbered_in_place() {
    let mut ctx = common::TestContext::new();
    let sentences = ctx.add_sentences(&["ένα", "δύο", "τρία"]);
    for (sentence, order) in sentences.iter().zip([-1_i64, -3, 7]) {
        ctx.repo
            .execute("UPDATE sentences SET sort_order = ?1 WHERE id = ?2", rusqlite::params![order, sentence.id])
            .unwrap();
    }

    let report = repair_invariants(&ctx.repo, ctx.now).unwrap();

    assert_eq!(report.orders_moved, 3);
    let targets: Vec<String> = ctx
        .repo
        .list_sentences(ctx.lang(), &ctx.deck_id)
        .unwrap()
        .into_iter()
        .map(|s| s.target_text)
        .collect();
    assert_eq!(targets, vec!["δύο", "ένα", "τρία"]);
    assert_eq!(ctx.orders(), vec![0, 1, 2]);
}
