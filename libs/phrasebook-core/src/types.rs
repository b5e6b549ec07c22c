//! Core types for the sentence practice store.
//!
//! Timestamps are `DateTime<Utc>` in memory and epoch milliseconds on disk
//! and in backup documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name given to the deck every language is created with.
pub const DEFAULT_DECK_NAME: &str = "Main";

/// Text direction used when displaying target sentences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RtlMode {
    #[default]
    Auto,
    Rtl,
    Ltr,
}

impl RtlMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Rtl => "rtl",
            Self::Ltr => "ltr",
        }
    }

    /// Parse from string, falling back to `Auto` for unknown values.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "rtl" => Self::Rtl,
            "ltr" => Self::Ltr,
            _ => Self::Auto,
        }
    }
}

/// How a deck is traversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudyMode {
    #[default]
    Linear,
    Srs,
}

impl StudyMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Srs => "srs",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "srs" | "review" => Self::Srs,
            _ => Self::Linear,
        }
    }
}

/// Whether an import adds to a deck or replaces its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    #[default]
    Append,
    Replace,
}

impl ImportMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Append => "append",
            Self::Replace => "replace",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "replace" => Self::Replace,
            _ => Self::Append,
        }
    }
}

/// Grade given to a card in review mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    Again,
    Hard,
    Good,
    Easy,
}

impl Rating {
    /// Convert to 4-point numeric value (1-4).
    pub fn to_value(self) -> u8 {
        match self {
            Self::Again => 1,
            Self::Hard => 2,
            Self::Good => 3,
            Self::Easy => 4,
        }
    }

    /// Create from 4-point numeric value.
    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Again),
            2 => Some(Self::Hard),
            3 => Some(Self::Good),
            4 => Some(Self::Easy),
            _ => None,
        }
    }

    /// Parse a grade name or its numeric value.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "again" | "1" => Some(Self::Again),
            "hard" | "2" => Some(Self::Hard),
            "good" | "3" => Some(Self::Good),
            "easy" | "4" => Some(Self::Easy),
            _ => None,
        }
    }
}

/// A learning target with its own settings and decks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Language {
    pub id: String,
    pub name: String,
    /// BCP-47 tag, e.g. `el-GR`.
    pub lang_tag: String,
    pub rtl_mode: RtlMode,
    /// Count characters instead of space-delimited words.
    pub cjk_mode: bool,
    pub tts_rate: f64,
    pub tts_pitch: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tts_voice: Option<String>,
    /// Lifetime tokens target shown alongside progress.
    pub token_goal: i64,
    pub theme: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl Language {
    /// Language with default settings.
    pub fn new(id: String, name: String, lang_tag: String, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name,
            lang_tag,
            rtl_mode: RtlMode::Auto,
            cjk_mode: false,
            tts_rate: 1.0,
            tts_pitch: 1.0,
            tts_voice: None,
            token_goal: 0,
            theme: "default".to_string(),
            created_at,
        }
    }
}

/// Ordered list of sentences under one language ("path").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deck {
    pub id: String,
    pub language_id: String,
    pub name: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

/// One bilingual practice unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentence {
    pub id: String,
    pub language_id: String,
    pub deck_id: String,
    /// Dense zero-based position within the deck.
    pub order: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_id: Option<String>,
    pub source_text: String,
    pub target_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transliteration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gloss: Option<String>,
    pub token_count: u32,
}

/// Record of one bulk insert, kept so the insert can be undone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportBatch {
    pub id: String,
    pub language_id: String,
    pub deck_id: String,
    pub filename: String,
    pub mode: ImportMode,
    /// First order assigned by the import.
    pub start_order: u32,
    /// Last order assigned by the import (inclusive).
    pub end_order: u32,
    pub row_count: u32,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

/// Per-deck cursor and lifetime counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathProgress {
    pub language_id: String,
    pub deck_id: String,
    pub mode: StudyMode,
    pub linear_order: u32,
    /// Order of the next sentence never introduced in review mode.
    pub srs_new_order: u32,
    pub lifetime_reps: i64,
    pub lifetime_tokens: i64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl PathProgress {
    /// Zeroed progress for a deck.
    pub fn new(language_id: String, deck_id: String, now: DateTime<Utc>) -> Self {
        Self {
            language_id,
            deck_id,
            mode: StudyMode::Linear,
            linear_order: 0,
            srs_new_order: 0,
            lifetime_reps: 0,
            lifetime_tokens: 0,
            updated_at: now,
        }
    }
}

/// Spaced repetition state of one sentence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SrsState {
    pub language_id: String,
    pub deck_id: String,
    pub sentence_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub due_at: DateTime<Utc>,
    pub reps: u32,
    pub lapses: u32,
    pub interval_days: f64,
    pub ease: f64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

/// First encounter of a normalized token in a language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeenWord {
    pub language_id: String,
    pub token: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub first_seen_at: DateTime<Utc>,
}

/// Cached per-language vocabulary counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetStats {
    pub language_id: String,
    pub seen_words: i64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

/// Dataset-wide progress from the single-path era.
///
/// Only read by migrations and restore; new code never writes one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyDatasetProgress {
    pub language_id: String,
    pub linear_order: u32,
    pub lifetime_reps: i64,
    pub lifetime_tokens: i64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

/// Progress as it may be found in stored or exported data.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredProgress {
    Legacy(LegacyDatasetProgress),
    Path(PathProgress),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_parse_accepts_names_and_values() {
        assert_eq!(Rating::parse("Again"), Some(Rating::Again));
        assert_eq!(Rating::parse("3"), Some(Rating::Good));
        assert_eq!(Rating::parse("meh"), None);
        assert_eq!(Rating::from_value(4), Some(Rating::Easy));
    }

    #[test]
    fn unknown_modes_fall_back_to_defaults() {
        assert_eq!(StudyMode::parse("review"), StudyMode::Srs);
        assert_eq!(StudyMode::parse("book"), StudyMode::Linear);
        assert_eq!(RtlMode::parse("RTL"), RtlMode::Rtl);
        assert_eq!(ImportMode::parse(""), ImportMode::Append);
    }

    #[test]
    fn timestamps_serialize_as_millis() {
        let at = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        let deck = Deck {
            id: "d".into(),
            language_id: "l".into(),
            name: DEFAULT_DECK_NAME.into(),
            created_at: at,
        };
        let json = serde_json::to_value(&deck).unwrap();
        assert_eq!(json["created_at"], 1_700_000_000_123_i64);
    }
}
