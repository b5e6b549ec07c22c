use phrasebook_lib::commands::{self, ImportFileRequest, RateRequest};
use phrasebook_lib::config::Config;
use phrasebook_lib::db::SqliteRepository;
use phrasebook_lib::services::languages::LanguageSettings;
use phrasebook_lib::speech::{LogEngine, Narrator, Utterance};
use phrasebook_lib::state::AppState;

use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context};
use phrasebook_core::import::{ColumnKey, ColumnPreferences, Delimiter};
use phrasebook_core::types::{ImportMode, Rating, RtlMode, StudyMode};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "phrasebook")]
#[command(version)]
#[command(about = "Study foreign-language sentences by reading or spaced review", long_about = None)]
struct Cli {
    /// Database file, overrides PHRASEBOOK_DB
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Switch to this language before running the command
    #[arg(long, global = true)]
    language: Option<String>,

    /// Switch to this deck of the language
    #[arg(long, global = true, requires = "language")]
    deck: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List, add, edit or delete languages
    Languages {
        #[command(subcommand)]
        action: Option<LanguageAction>,
    },
    /// List, add, rename or delete decks of the selected language
    Decks {
        #[command(subcommand)]
        action: Option<DeckAction>,
    },
    /// Import a tab or comma separated file into the selected deck
    Import {
        file: PathBuf,
        /// append or replace
        #[arg(long, default_value = "append")]
        mode: String,
        /// comma or tab; detected from the file name by default
        #[arg(long)]
        delimiter: Option<String>,
        /// Header of the source column
        #[arg(long)]
        source_column: Option<String>,
        /// Header of the target column
        #[arg(long)]
        target_column: Option<String>,
    },
    /// List imports of the selected deck
    Batches,
    /// Undo an import
    DeleteBatch { import_id: String },
    /// Show the current card
    Current {
        /// Read the target text aloud
        #[arg(long)]
        speak: bool,
    },
    /// Count the current sentence as read and move on
    Next,
    /// Go back one sentence
    Prev,
    /// Grade a sentence: again, hard, good or easy
    Rate { sentence_id: String, rating: String },
    /// Switch between linear and srs study
    Mode { mode: String },
    /// Counters of the selected deck
    Summary,
    /// Write a backup of the whole store
    Export { file: PathBuf },
    /// Replace the store with a backup
    Restore { file: PathBuf },
    /// Delete everything
    Reset {
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum LanguageAction {
    Add {
        name: String,
        /// BCP 47 tag used for speech
        #[arg(long, default_value = "en")]
        tag: String,
        /// Count every character as a token
        #[arg(long)]
        cjk: bool,
        /// auto, rtl or ltr
        #[arg(long, default_value = "auto")]
        rtl: String,
        #[arg(long, default_value_t = 0)]
        token_goal: i64,
    },
    Rename { id: String, name: String },
    Delete {
        id: String,
        /// Language that receives the sentences
        #[arg(long)]
        into: String,
    },
}

#[derive(Subcommand)]
enum DeckAction {
    Add { name: String },
    Rename { id: String, name: String },
    Delete { id: String },
}

fn print<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn path_string(path: PathBuf) -> anyhow::Result<String> {
    path.into_os_string()
        .into_string()
        .map_err(|p| anyhow!("path is not valid UTF-8: {}", p.to_string_lossy()))
}

fn parse_delimiter(raw: &str) -> anyhow::Result<Delimiter> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "comma" | "," | "csv" => Ok(Delimiter::Comma),
        "tab" | "\\t" | "tsv" => Ok(Delimiter::Tab),
        other => bail!("unknown delimiter {other:?}; use comma or tab"),
    }
}

async fn selected_language_id(state: &AppState) -> anyhow::Result<String> {
    let summary = commands::deck_summary(state).await?;
    Ok(summary.language_id)
}

async fn languages(action: Option<LanguageAction>, state: &AppState) -> anyhow::Result<()> {
    match action {
        None => print(&commands::list_languages(state).await?),
        Some(LanguageAction::Add {
            name,
            tag,
            cjk,
            rtl,
            token_goal,
        }) => {
            let settings = LanguageSettings {
                name,
                lang_tag: tag,
                cjk_mode: cjk,
                rtl_mode: RtlMode::parse(&rtl),
                token_goal,
                ..LanguageSettings::default()
            };
            print(&commands::create_language(settings, state).await?)
        }
        Some(LanguageAction::Rename { id, name }) => {
            let current = commands::list_languages(state)
                .await?
                .into_iter()
                .find(|l| l.id == id)
                .ok_or_else(|| anyhow!("unknown language {id}"))?;
            let settings = LanguageSettings {
                name,
                lang_tag: current.lang_tag,
                rtl_mode: current.rtl_mode,
                cjk_mode: current.cjk_mode,
                tts_rate: current.tts_rate,
                tts_pitch: current.tts_pitch,
                tts_voice: current.tts_voice,
                token_goal: current.token_goal,
                theme: current.theme,
            };
            print(&commands::update_language(id, settings, state).await?)
        }
        Some(LanguageAction::Delete { id, into }) => {
            let moved = commands::delete_language(id, into, state).await?;
            print(&serde_json::json!({ "moved": moved }))
        }
    }
}

async fn decks(action: Option<DeckAction>, state: &AppState) -> anyhow::Result<()> {
    let language_id = selected_language_id(state).await?;
    match action {
        None => print(&commands::list_decks(language_id, state).await?),
        Some(DeckAction::Add { name }) => print(&commands::create_deck(language_id, name, state).await?),
        Some(DeckAction::Rename { id, name }) => {
            print(&commands::rename_deck(language_id, id, name, state).await?)
        }
        Some(DeckAction::Delete { id }) => {
            let removed = commands::delete_deck(language_id, id, state).await?;
            print(&serde_json::json!({ "removed": removed }))
        }
    }
}

async fn run(command: Command, state: &AppState) -> anyhow::Result<()> {
    match command {
        Command::Languages { action } => languages(action, state).await,
        Command::Decks { action } => decks(action, state).await,
        Command::Import {
            file,
            mode,
            delimiter,
            source_column,
            target_column,
        } => {
            let mut mapping = ColumnPreferences::new();
            if let Some(header) = source_column {
                mapping.insert(ColumnKey::Source, header);
            }
            if let Some(header) = target_column {
                mapping.insert(ColumnKey::Target, header);
            }
            let request = ImportFileRequest {
                file_path: path_string(file)?,
                mode: ImportMode::parse(&mode),
                delimiter: delimiter.as_deref().map(parse_delimiter).transpose()?,
                mapping,
            };
            let outcome = commands::import_file(
                request,
                &mut |p| eprintln!("imported {}/{}", p.written, p.total),
                state,
            )
            .await?;
            print(&outcome)
        }
        Command::Batches => print(&commands::list_import_batches(state).await?),
        Command::DeleteBatch { import_id } => {
            let removed = commands::delete_import_batch(import_id, state).await?;
            print(&serde_json::json!({ "removed": removed }))
        }
        Command::Current { speak } => {
            let current = commands::get_current(state).await?;
            if let (true, Some(card)) = (speak, current.as_ref()) {
                let language = commands::list_languages(state)
                    .await?
                    .into_iter()
                    .find(|l| l.id == card.sentence.language_id)
                    .ok_or_else(|| anyhow!("unknown language {}", card.sentence.language_id))?;
                let narrator = Narrator::new(LogEngine);
                narrator
                    .speak(Utterance::for_language(card.sentence.target_text.clone(), &language))
                    .await?;
            }
            print(&current)
        }
        Command::Next => print(&commands::next_sentence(state).await?),
        Command::Prev => print(&commands::previous_sentence(state).await?),
        Command::Rate { sentence_id, rating } => {
            let rating = Rating::parse(&rating).ok_or_else(|| anyhow!("unknown rating {rating:?}"))?;
            print(&commands::rate_sentence(RateRequest { sentence_id, rating }, state).await?)
        }
        Command::Mode { mode } => {
            let mode = match mode.trim().to_ascii_lowercase().as_str() {
                "linear" => StudyMode::Linear,
                "srs" | "review" => StudyMode::Srs,
                other => bail!("unknown mode {other:?}; use linear or srs"),
            };
            print(&commands::set_mode(mode, state).await?)
        }
        Command::Summary => print(&commands::deck_summary(state).await?),
        Command::Export { file } => {
            let bytes = commands::export_backup(path_string(file)?, state).await?;
            print(&serde_json::json!({ "bytes": bytes }))
        }
        Command::Restore { file } => print(&commands::restore_backup(path_string(file)?, state).await?),
        Command::Reset { yes } => {
            if !yes {
                bail!("reset deletes every language and sentence; pass --yes to confirm");
            }
            commands::reset_store(state).await?;
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    phrasebook_lib::init_tracing();
    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(db) = cli.db {
        config = config.with_db_path(db);
    }
    if let Some(parent) = config.db_path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let repository = SqliteRepository::open(&config.db_path)
        .with_context(|| format!("failed to open {}", config.db_path.display()))?;
    let state = AppState::new(repository, &config);

    if !matches!(cli.command, Command::Reset { .. } | Command::Restore { .. }) {
        commands::ensure_seeded(&state).await?;
    }
    if let Some(language) = cli.language {
        commands::select(language, cli.deck, &state).await?;
    }
    run(cli.command, &state).await
}
