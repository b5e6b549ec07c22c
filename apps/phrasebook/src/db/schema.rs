//! SQLite schema definitions.
//!
//! The version lives in `PRAGMA user_version`. Fresh stores get the current
//! tables directly; older stores are walked forward by `migrations`.

/// Current schema version for migrations.
pub const SCHEMA_VERSION: i32 = 3;

/// Connection settings applied on every open.
pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
"#;

/// Single-path store: one implicit deck per dataset, sentences kept as
/// free-form JSON and one progress row per dataset.
pub const LEGACY_V1_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS datasets (
    id TEXT PRIMARY KEY,
    name TEXT,
    lang TEXT,
    created_at INTEGER
);

CREATE TABLE IF NOT EXISTS sentences (
    id TEXT PRIMARY KEY,
    dataset_id TEXT,
    data TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS progress (
    dataset_id TEXT PRIMARY KEY,
    linear_order INTEGER,
    lifetime_reps INTEGER,
    lifetime_tokens INTEGER,
    updated_at INTEGER
);

PRAGMA user_version = 1;
"#;

/// Languages, decks and per-deck progress.
pub const V2_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS languages (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    lang_tag TEXT NOT NULL,
    rtl_mode TEXT NOT NULL DEFAULT 'auto',
    cjk_mode INTEGER NOT NULL DEFAULT 0,
    tts_rate REAL NOT NULL DEFAULT 1.0,
    tts_pitch REAL NOT NULL DEFAULT 1.0,
    tts_voice TEXT,
    token_goal INTEGER NOT NULL DEFAULT 0,
    theme TEXT NOT NULL DEFAULT 'default',
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS decks (
    id TEXT PRIMARY KEY,
    language_id TEXT NOT NULL REFERENCES languages(id),
    name TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

-- Orders are dense per deck: exactly 0..count-1
CREATE TABLE IF NOT EXISTS sentences (
    id TEXT PRIMARY KEY,
    language_id TEXT NOT NULL REFERENCES languages(id),
    deck_id TEXT NOT NULL REFERENCES decks(id),
    sort_order INTEGER NOT NULL,
    import_id TEXT,
    source_text TEXT NOT NULL DEFAULT '',
    target_text TEXT NOT NULL DEFAULT '',
    transliteration TEXT,
    gloss TEXT,
    token_count INTEGER
);

-- end_order is inclusive
CREATE TABLE IF NOT EXISTS import_batches (
    id TEXT PRIMARY KEY,
    language_id TEXT NOT NULL REFERENCES languages(id),
    deck_id TEXT NOT NULL REFERENCES decks(id),
    filename TEXT NOT NULL,
    mode TEXT NOT NULL,
    start_order INTEGER NOT NULL,
    end_order INTEGER NOT NULL,
    row_count INTEGER NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS path_progress (
    language_id TEXT NOT NULL REFERENCES languages(id),
    deck_id TEXT NOT NULL REFERENCES decks(id),
    mode TEXT NOT NULL DEFAULT 'linear',
    linear_order INTEGER NOT NULL DEFAULT 0,
    srs_new_order INTEGER NOT NULL DEFAULT 0,
    lifetime_reps INTEGER NOT NULL DEFAULT 0,
    lifetime_tokens INTEGER NOT NULL DEFAULT 0,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (language_id, deck_id)
);

CREATE TABLE IF NOT EXISTS srs_state (
    language_id TEXT NOT NULL,
    deck_id TEXT NOT NULL,
    sentence_id TEXT NOT NULL REFERENCES sentences(id),
    due_at INTEGER NOT NULL,
    reps INTEGER NOT NULL DEFAULT 0,
    lapses INTEGER NOT NULL DEFAULT 0,
    interval_days REAL NOT NULL DEFAULT 0,
    ease REAL NOT NULL DEFAULT 2.5,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (language_id, deck_id, sentence_id)
);

-- Dataset-wide progress from single-path stores; read only by repairs
CREATE TABLE IF NOT EXISTS legacy_progress (
    language_id TEXT PRIMARY KEY,
    linear_order INTEGER NOT NULL DEFAULT 0,
    lifetime_reps INTEGER NOT NULL DEFAULT 0,
    lifetime_tokens INTEGER NOT NULL DEFAULT 0,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_decks_language ON decks(language_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_sentences_order ON sentences(language_id, deck_id, sort_order);
CREATE INDEX IF NOT EXISTS idx_sentences_import ON sentences(import_id);
CREATE INDEX IF NOT EXISTS idx_import_batches_deck ON import_batches(language_id, deck_id);
CREATE INDEX IF NOT EXISTS idx_srs_due ON srs_state(language_id, deck_id, due_at);
CREATE UNIQUE INDEX IF NOT EXISTS idx_srs_sentence ON srs_state(sentence_id);
"#;

/// Vocabulary exposure.
pub const V3_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS seen_words (
    language_id TEXT NOT NULL REFERENCES languages(id),
    token TEXT NOT NULL,
    first_seen_at INTEGER NOT NULL,
    PRIMARY KEY (language_id, token)
);

CREATE TABLE IF NOT EXISTS dataset_stats (
    language_id TEXT PRIMARY KEY REFERENCES languages(id),
    seen_words INTEGER NOT NULL DEFAULT 0,
    updated_at INTEGER NOT NULL
);
"#;

/// Every table of the current schema, children first.
pub const TABLES: &[&str] = &[
    "srs_state",
    "seen_words",
    "dataset_stats",
    "legacy_progress",
    "path_progress",
    "import_batches",
    "sentences",
    "decks",
    "languages",
];
