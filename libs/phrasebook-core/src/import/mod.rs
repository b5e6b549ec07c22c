//! Column resolution and row admission for sentence imports.
//!
//! Headers are matched case-insensitively: an explicit preference first, then
//! the canonical name and its synonyms, then containment of a synonym inside
//! a longer header such as `Target Language (Greek)`.

pub mod delimited;
pub mod spreadsheet;

use crate::error::{ImportError, Result};
use crate::tokenizer::token_count_u32;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use delimited::{parse_delimited, Delimiter};
pub use spreadsheet::{read_spreadsheet, SpreadsheetReader};

/// One data row keyed by normalized header.
pub type RowRecord = BTreeMap<String, String>;

/// Parsed file contents before column resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    /// Normalized headers in file order.
    pub headers: Vec<String>,
    pub rows: Vec<RowRecord>,
}

/// Canonical columns an import understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKey {
    Source,
    Target,
    Transliteration,
    Gloss,
    TokenCount,
    ExternalId,
}

impl ColumnKey {
    /// Resolution order; earlier keys claim headers first.
    pub const ALL: [ColumnKey; 6] = [
        ColumnKey::Source,
        ColumnKey::Target,
        ColumnKey::Transliteration,
        ColumnKey::Gloss,
        ColumnKey::TokenCount,
        ColumnKey::ExternalId,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Target => "target",
            Self::Transliteration => "transliteration",
            Self::Gloss => "gloss",
            Self::TokenCount => "tokens",
            Self::ExternalId => "id",
        }
    }

    /// Known header names for this column, most specific first.
    pub fn synonyms(self) -> &'static [&'static str] {
        match self {
            Self::Source => &[
                "source", "sourcetext", "source_text", "source text", "english", "prompt",
                "question", "front", "native", "en",
            ],
            Self::Target => &[
                "target", "targettext", "target_text", "target text", "answer", "text",
                "translation", "back", "sentence",
            ],
            Self::Transliteration => &[
                "transliteration", "translit", "romanization", "romanisation", "pinyin",
                "romaji", "pronunciation",
            ],
            Self::Gloss => &["gloss", "notes", "note", "meaning", "literal"],
            Self::TokenCount => &[
                "tokens", "token_count", "tokencount", "token count", "word_count", "words",
            ],
            Self::ExternalId => &["id", "uid", "external_id", "row_id", "sentence_id"],
        }
    }

    fn required(self) -> bool {
        matches!(self, Self::Source | Self::Target)
    }
}

/// User-chosen header for some canonical keys.
pub type ColumnPreferences = BTreeMap<ColumnKey, String>;

/// Headers chosen for each canonical key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedColumns {
    pub source: String,
    pub target: String,
    pub transliteration: Option<String>,
    pub gloss: Option<String>,
    pub token_count: Option<String>,
    pub external_id: Option<String>,
}

/// Trimmed, lower-cased header.
pub fn normalize_header(header: &str) -> String {
    header.trim().trim_start_matches('\u{FEFF}').trim().to_lowercase()
}

fn header_words(header: &str) -> Vec<&str> {
    header
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| !w.is_empty())
        .collect()
}

fn find_header(
    headers: &[String],
    claimed: &[String],
    key: ColumnKey,
    preferred: Option<&str>,
) -> Option<String> {
    let free: Vec<&String> = headers.iter().filter(|h| !claimed.contains(h)).collect();

    if let Some(pref) = preferred.map(normalize_header).filter(|p| !p.is_empty()) {
        if let Some(h) = free.iter().find(|h| ***h == pref) {
            return Some((*h).clone());
        }
    }

    let synonyms = key.synonyms();
    for synonym in synonyms {
        if let Some(h) = free.iter().find(|h| h.as_str() == *synonym) {
            return Some((*h).clone());
        }
    }

    // A synonym appearing as a whole word beats a partial match.
    for synonym in synonyms {
        if let Some(h) = free
            .iter()
            .find(|h| header_words(h).iter().any(|w| w == synonym))
        {
            return Some((*h).clone());
        }
    }

    // Short synonyms ("en", "id", "text") are too ambiguous for substrings.
    for synonym in synonyms.iter().filter(|s| s.len() >= 4) {
        if let Some(h) = free.iter().find(|h| h.contains(synonym)) {
            return Some((*h).clone());
        }
    }

    None
}

/// Map canonical keys to actual headers.
///
/// Fails when no header can serve as source or target.
pub fn resolve_columns(headers: &[String], preferences: &ColumnPreferences) -> Result<ResolvedColumns> {
    let headers: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
    let mut claimed: Vec<String> = Vec::new();
    let mut found: BTreeMap<ColumnKey, String> = BTreeMap::new();

    for key in ColumnKey::ALL {
        let preferred = preferences.get(&key).map(String::as_str);
        match find_header(&headers, &claimed, key, preferred) {
            Some(header) => {
                claimed.push(header.clone());
                found.insert(key, header);
            }
            None if key.required() => {
                return Err(ImportError::MissingColumn {
                    column: key.as_str().to_string(),
                    found: headers.clone(),
                });
            }
            None => {}
        }
    }

    let mut take = |key: ColumnKey| found.remove(&key);
    Ok(ResolvedColumns {
        source: take(ColumnKey::Source).unwrap_or_default(),
        target: take(ColumnKey::Target).unwrap_or_default(),
        transliteration: take(ColumnKey::Transliteration),
        gloss: take(ColumnKey::Gloss),
        token_count: take(ColumnKey::TokenCount),
        external_id: take(ColumnKey::ExternalId),
    })
}

/// A row accepted for insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRow {
    pub external_id: Option<String>,
    pub source_text: String,
    pub target_text: String,
    pub transliteration: Option<String>,
    pub gloss: Option<String>,
    pub token_count: u32,
}

fn cell<'a>(row: &'a RowRecord, header: Option<&String>) -> Option<&'a str> {
    header
        .and_then(|h| row.get(h))
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

fn parse_token_override(value: &str) -> Option<u32> {
    let parsed: f64 = value.parse().ok()?;
    if parsed.is_finite() && parsed >= 0.0 && parsed <= f64::from(u32::MAX) {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Some(parsed.round() as u32)
    } else {
        None
    }
}

/// Turn a raw row into an insertable one; `None` when both texts are empty.
pub fn admit_row(row: &RowRecord, columns: &ResolvedColumns, cjk_mode: bool) -> Option<ImportRow> {
    let source_text = cell(row, Some(&columns.source)).unwrap_or_default().to_string();
    let target_text = cell(row, Some(&columns.target)).unwrap_or_default().to_string();
    if source_text.is_empty() && target_text.is_empty() {
        return None;
    }

    let token_count = cell(row, columns.token_count.as_ref())
        .and_then(parse_token_override)
        .unwrap_or_else(|| token_count_u32(&target_text, cjk_mode));

    Some(ImportRow {
        external_id: cell(row, columns.external_id.as_ref()).map(str::to_string),
        source_text,
        target_text,
        transliteration: cell(row, columns.transliteration.as_ref()).map(str::to_string),
        gloss: cell(row, columns.gloss.as_ref()).map(str::to_string),
        token_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn resolves_synonyms_exactly() {
        let cols = resolve_columns(&headers(&["English", " Greek ", "Answer", "Notes"]), &ColumnPreferences::new())
            .unwrap();
        assert_eq!(cols.source, "english");
        assert_eq!(cols.target, "answer");
        assert_eq!(cols.gloss.as_deref(), Some("notes"));
        assert_eq!(cols.transliteration, None);
    }

    #[test]
    fn resolves_descriptive_headers_by_containment() {
        let cols = resolve_columns(
            &headers(&["Source Sentence", "Target Language (Greek)", "Translit."]),
            &ColumnPreferences::new(),
        )
        .unwrap();
        assert_eq!(cols.source, "source sentence");
        assert_eq!(cols.target, "target language (greek)");
        assert_eq!(cols.transliteration.as_deref(), Some("translit."));
    }

    #[test]
    fn whole_word_match_beats_partial() {
        let cols =
            resolve_columns(&headers(&["prompt", "subtext", "the text"]), &ColumnPreferences::new()).unwrap();
        assert_eq!(cols.target, "the text");
    }

    #[test]
    fn preference_wins() {
        let mut prefs = ColumnPreferences::new();
        prefs.insert(ColumnKey::Target, "Greek".into());
        let cols = resolve_columns(&headers(&["english", "greek", "target"]), &prefs).unwrap();
        assert_eq!(cols.target, "greek");
    }

    #[test]
    fn missing_target_is_reported_with_headers() {
        let err = resolve_columns(&headers(&["English", "Notes"]), &ColumnPreferences::new()).unwrap_err();
        match err {
            ImportError::MissingColumn { column, found } => {
                assert_eq!(column, "target");
                assert_eq!(found, headers(&["english", "notes"]));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    fn row(pairs: &[(&str, &str)]) -> RowRecord {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn columns() -> ResolvedColumns {
        ResolvedColumns {
            source: "english".into(),
            target: "greek".into(),
            token_count: Some("tokens".into()),
            external_id: Some("id".into()),
            ..Default::default()
        }
    }

    #[test]
    fn skips_rows_without_text() {
        assert_eq!(admit_row(&row(&[("english", " "), ("greek", "")]), &columns(), false), None);
    }

    #[test]
    fn token_override_used_when_non_negative() {
        let admitted = admit_row(
            &row(&[("english", "Hi"), ("greek", "Γεια σου"), ("tokens", "7"), ("id", "s-1")]),
            &columns(),
            false,
        )
        .unwrap();
        assert_eq!(admitted.token_count, 7);
        assert_eq!(admitted.external_id.as_deref(), Some("s-1"));

        let computed = admit_row(
            &row(&[("english", "Hi"), ("greek", "Γεια σου"), ("tokens", "-2")]),
            &columns(),
            false,
        )
        .unwrap();
        assert_eq!(computed.token_count, 2);
        assert_eq!(computed.external_id, None);
    }
}
