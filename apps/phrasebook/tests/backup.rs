//! Backup export and restore tests.

mod common;

use pretty_assertions::assert_eq;
use serde_json::json;

use common::{fixtures, TestContext};
use phrasebook_core::algorithm::Sm2;
use phrasebook_core::types::{Rating, StudyMode};
use phrasebook_lib::db::{DbError, DeckRepository, LanguageRepository, ProgressRepository, SentenceRepository, SqliteRepository};
use phrasebook_lib::services::backup::{export_json, export_snapshot, restore_json, restore_snapshot};
use phrasebook_lib::services::scheduler::{advance, rate, set_mode};

fn studied_context() -> TestContext {
    let mut ctx = TestContext::new();
    ctx.add_sentences(&["Γεια σου", "Καλημέρα", "Ευχαριστώ πολύ"]);
    let lang = ctx.lang().to_string();
    advance(&mut ctx.repo, &lang, &ctx.deck_id, 1, true, ctx.now).unwrap();
    set_mode(&ctx.repo, &lang, &ctx.deck_id, StudyMode::Srs, ctx.now).unwrap();
    let second = ctx.repo.sentence_at(&lang, &ctx.deck_id, 1).unwrap().unwrap();
    rate(&mut ctx.repo, &Sm2::default(), &lang, &ctx.deck_id, &second.id, Rating::Easy, ctx.now).unwrap();
    ctx
}

#[test]
fn export_restore_round_trip() {
    let ctx = studied_context();
    let exported = export_json(&ctx.repo, ctx.now).unwrap();

    let mut other = SqliteRepository::open_in_memory().unwrap();
    let summary = restore_json(&mut other, &exported, ctx.now).unwrap();

    assert_eq!(summary.languages, 1);
    assert_eq!(summary.sentences, 3);
    assert_eq!(summary.srs_states, 1);
    assert_eq!(export_snapshot(&other, ctx.now).unwrap(), export_snapshot(&ctx.repo, ctx.now).unwrap());
}

#[test]
fn restore_replaces_existing_rows() {
    let source = studied_context();
    let exported = export_json(&source.repo, source.now).unwrap();

    let mut target = TestContext::new();
    target.add_sentences(&["άλλο"]);
    let stale_language = target.lang().to_string();
    restore_json(&mut target.repo, &exported, target.now).unwrap();

    assert!(target.repo.get_language(&stale_language).unwrap().is_none());
    assert_eq!(target.repo.list_languages().unwrap().len(), 1);
    assert_eq!(target.repo.list_all_sentences().unwrap().len(), 3);
}

#[test]
fn legacy_document_is_upgraded_on_restore() {
    let document = json!({
        "datasets": [{"id": "el", "name": "Greek", "lang": "el-GR"}],
        "sentences": [
            {"id": "s2", "datasetId": "el", "english": "Thanks", "text": "Ευχαριστώ", "order": 40},
            {"id": "s1", "datasetId": "el", "english": "Hello", "text": "Γεια σου", "order": 10}
        ],
        "progress": [{"datasetId": "el", "linearOrder": 9, "lifetimeReps": 4, "lifetimeTokens": 6}]
    });
    let mut repo = SqliteRepository::open_in_memory().unwrap();

    restore_snapshot(&mut repo, &document, fixtures::start_time()).unwrap();

    let deck = repo.default_deck("el").unwrap().unwrap();
    assert_eq!(deck.id, "el:main");
    let sentences = repo.list_sentences("el", "el:main").unwrap();
    let orders: Vec<(&str, u32)> = sentences.iter().map(|s| (s.id.as_str(), s.order)).collect();
    assert_eq!(orders, vec![("s1", 0), ("s2", 1)]);
    let progress = repo.get_progress("el", "el:main").unwrap().unwrap();
    assert_eq!(progress.linear_order, 1);
    assert_eq!(progress.lifetime_reps, 4);
    assert_eq!(progress.lifetime_tokens, 6);
}

#[test]
fn malformed_document_leaves_store_untouched() {
    let mut ctx = TestContext::new();
    ctx.add_sentences(&["ένα"]);

    let err = restore_snapshot(&mut ctx.repo, &json!({"sentences": "nope"}), ctx.now).unwrap_err();
    assert!(matches!(err, DbError::Backup(_)), "{err:?}");
    let err = restore_json(&mut ctx.repo, "{ not json", ctx.now).unwrap_err();
    assert!(matches!(err, DbError::Json(_)), "{err:?}");

    assert_eq!(ctx.orders(), vec![0]);
}

#[test]
fn unlisted_languages_are_recovered_on_restore() {
    let document = json!({
        "datasets": [{"id": "el", "name": "Greek"}],
        "sentences": [
            {"id": "a", "datasetId": "el", "english": "Hello", "text": "Γεια"},
            {"id": "b", "datasetId": "fr", "english": "Hello", "text": "Bonjour"}
        ]
    });
    let mut repo = SqliteRepository::open_in_memory().unwrap();

    let summary = restore_snapshot(&mut repo, &document, fixtures::start_time()).unwrap();

    assert_eq!(summary.languages, 2);
    assert_eq!(summary.sentences, 2);
    let french = repo.get_language("fr").unwrap().unwrap();
    assert_eq!(french.lang_tag, "und");
    let moved: Vec<String> = repo.list_sentences("fr", "fr:main").unwrap().into_iter().map(|s| s.id).collect();
    assert_eq!(moved, vec!["b"]);
}

#[test]
fn document_without_datasets_keeps_its_rows() {
    let document = json!({
        "sentences": [
            {"id": "a", "datasetId": "el", "english": "One", "text": "Ένα"},
            {"id": "c", "english": "Two", "text": "Δύο"}
        ],
        "progress": [{"datasetId": "el", "lifetimeReps": 4}]
    });
    let mut repo = SqliteRepository::open_in_memory().unwrap();

    let summary = restore_snapshot(&mut repo, &document, fixtures::start_time()).unwrap();

    assert_eq!(summary.languages, 1);
    assert_eq!(summary.sentences, 2);
    let orders: Vec<(String, u32)> = repo
        .list_sentences("el", "el:main")
        .unwrap()
        .into_iter()
        .map(|s| (s.id, s.order))
        .collect();
    assert_eq!(orders, vec![("a".to_string(), 0), ("c".to_string(), 1)]);
    assert_eq!(repo.get_progress("el", "el:main").unwrap().unwrap().lifetime_reps, 4);
}
