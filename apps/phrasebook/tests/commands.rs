//! Command layer tests over an on-disk store and session file.

mod common;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use common::fixtures;
use phrasebook_core::types::{ImportMode, Rating, StudyMode};
use phrasebook_lib::commands::{self, ImportFileRequest, RateRequest};
use phrasebook_lib::config::Config;
use phrasebook_lib::db::SqliteRepository;
use phrasebook_lib::services::languages::LanguageSettings;
use phrasebook_lib::services::scheduler::{AdvanceOutcome, CardKind};
use phrasebook_lib::state::{AppState, SessionContext};

fn config(dir: &TempDir) -> Config {
    Config {
        db_path: dir.path().join("phrasebook.db"),
        session_path: dir.path().join("session.json"),
        import_batch_size: 2,
    }
}

fn open_state(config: &Config) -> AppState {
    let repository = SqliteRepository::open(&config.db_path).unwrap();
    AppState::new(repository, config)
}

#[tokio::test]
async fn first_run_seeds_and_selects_sample_language() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let state = open_state(&config);

    let seeded = commands::ensure_seeded(&state).await.unwrap().unwrap();
    let card = commands::get_current(&state).await.unwrap().unwrap();

    assert_eq!(card.kind, CardKind::Linear);
    assert_eq!(card.sentence.language_id, seeded.id);
    assert_eq!(card.sentence.order, 0);
    let saved = SessionContext::load(&config.session_path);
    assert_eq!(saved.language_id.as_deref(), Some(seeded.id.as_str()));
    assert_eq!(saved.deck_id, Some(format!("{}:main", seeded.id)));
}

#[tokio::test]
async fn selection_survives_restart() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let spanish = {
        let state = open_state(&config);
        commands::ensure_seeded(&state).await.unwrap();
        let spanish = commands::create_language(
            LanguageSettings {
                name: "Spanish".to_string(),
                lang_tag: "es-ES".to_string(),
                ..LanguageSettings::default()
            },
            &state,
        )
        .await
        .unwrap();
        commands::next_sentence(&state).await.unwrap();
        spanish
    };

    let state = open_state(&config);
    let summary = commands::deck_summary(&state).await.unwrap();

    assert_eq!(summary.language_id, spanish.id);
    assert_eq!(summary.total_sentences, 0);
}

#[tokio::test]
async fn unknown_selection_is_rejected() {
    let dir = TempDir::new().unwrap();
    let state = open_state(&config(&dir));
    commands::ensure_seeded(&state).await.unwrap();

    let err = commands::select("missing".to_string(), None, &state).await.unwrap_err();
    assert!(err.message.contains("missing"), "{}", err.message);
}

#[tokio::test]
async fn import_study_and_undo_through_commands() {
    let dir = TempDir::new().unwrap();
    let state = open_state(&config(&dir));
    let language = commands::create_language(
        LanguageSettings {
            name: "Greek".to_string(),
            ..LanguageSettings::default()
        },
        &state,
    )
    .await
    .unwrap();
    let file = dir.path().join("phrases.tsv");
    std::fs::write(
        &file,
        fixtures::sample_tsv(&[("Hello", "Γεια σου"), ("Yes", "Ναι"), ("No", "Όχι")]),
    )
    .unwrap();

    let mut seen = Vec::new();
    let outcome = commands::import_file(
        ImportFileRequest {
            file_path: file.to_string_lossy().to_string(),
            mode: ImportMode::Append,
            ..ImportFileRequest::default()
        },
        &mut |p| seen.push(p.written),
        &state,
    )
    .await
    .unwrap();
    assert_eq!(outcome.inserted, 3);
    assert_eq!(seen, vec![2, 3]);

    commands::set_mode(StudyMode::Srs, &state).await.unwrap();
    let card = commands::get_current(&state).await.unwrap().unwrap();
    assert_eq!(card.kind, CardKind::New);
    let rated = commands::rate_sentence(
        RateRequest {
            sentence_id: card.sentence.id.clone(),
            rating: Rating::Good,
        },
        &state,
    )
    .await
    .unwrap();
    assert!(rated.was_new);

    let batches = commands::list_import_batches(&state).await.unwrap();
    assert_eq!(batches.len(), 1);
    let removed = commands::delete_import_batch(batches[0].id.clone(), &state).await.unwrap();
    assert_eq!(removed, 3);

    let summary = commands::deck_summary(&state).await.unwrap();
    assert_eq!(summary.language_id, language.id);
    assert_eq!(summary.total_sentences, 0);
    assert_eq!(summary.introduced, 0);
    assert!(commands::get_current(&state).await.unwrap().is_none());
    assert_eq!(commands::next_sentence(&state).await.unwrap(), AdvanceOutcome::NoSentence);
}

#[tokio::test]
async fn backup_file_round_trip_and_reset() {
    let dir = TempDir::new().unwrap();
    let state = open_state(&config(&dir));
    commands::ensure_seeded(&state).await.unwrap();
    commands::next_sentence(&state).await.unwrap();
    let before = commands::deck_summary(&state).await.unwrap();
    let backup = dir.path().join("backups").join("store.json");
    let backup_path = backup.to_string_lossy().to_string();

    let bytes = commands::export_backup(backup_path.clone(), &state).await.unwrap();
    assert!(bytes > 0);

    commands::reset_store(&state).await.unwrap();
    assert!(commands::list_languages(&state).await.unwrap().is_empty());
    let err = commands::get_current(&state).await.unwrap_err();
    assert!(err.message.contains("no language"), "{}", err.message);

    let summary = commands::restore_backup(backup_path, &state).await.unwrap();
    assert_eq!(summary.languages, 1);
    let after = commands::deck_summary(&state).await.unwrap();
    assert_eq!(after, before);
}
