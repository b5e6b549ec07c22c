//! Repairs shared by store migrations and backup restore.
//!
//! Legacy rows are read as generic JSON records through ordered lists of
//! historical field names instead of fixed structs.

use crate::tokenizer::token_count_u32;
use crate::types::{LegacyDatasetProgress, PathProgress, StoredProgress, StudyMode};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// A schema-less stored or exported row.
pub type Record = Map<String, Value>;

pub const ID_FIELDS: &[&str] = &["id", "sentence_id", "sentenceId", "uid"];
pub const LANGUAGE_FIELDS: &[&str] = &[
    "language_id",
    "languageId",
    "dataset_id",
    "datasetId",
    "dataset",
];
pub const DECK_FIELDS: &[&str] = &["deck_id", "deckId", "path_id", "pathId"];
pub const ORDER_FIELDS: &[&str] = &["order", "sort_order", "sortOrder", "position", "index"];
pub const SOURCE_FIELDS: &[&str] = &[
    "source_text",
    "sourceText",
    "english",
    "source",
    "prompt",
];
pub const TARGET_FIELDS: &[&str] = &[
    "target_text",
    "targetText",
    "target",
    "answer",
    "text",
];
pub const TRANSLITERATION_FIELDS: &[&str] = &["transliteration", "translit", "romanization"];
pub const GLOSS_FIELDS: &[&str] = &["gloss", "notes", "note"];
pub const TOKEN_FIELDS: &[&str] = &["token_count", "tokenCount", "tokens"];
pub const IMPORT_FIELDS: &[&str] = &["import_id", "importId", "batch_id", "batchId"];

/// Id of the deck synthesized for a language that has none.
pub fn default_deck_id(language_id: &str) -> String {
    format!("{language_id}:main")
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// First candidate field holding a non-empty string, or `""`.
pub fn first_non_empty(record: &Record, keys: &[&str]) -> String {
    opt_string(record, keys).unwrap_or_default()
}

/// First candidate field holding a non-empty string.
pub fn opt_string(record: &Record, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| record.get(*k))
        .filter_map(value_as_string)
        .find(|s| !s.is_empty())
}

/// First candidate field holding a finite number (or numeric string).
pub fn number(record: &Record, keys: &[&str]) -> Option<f64> {
    keys.iter().filter_map(|k| record.get(*k)).find_map(|v| {
        let n = match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        n.filter(|n| n.is_finite())
    })
}

/// Non-negative integer field, saturated to `u32`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn uint(record: &Record, keys: &[&str]) -> Option<u32> {
    number(record, keys)
        .filter(|n| *n >= 0.0)
        .map(|n| n.round().min(f64::from(u32::MAX)) as u32)
}

#[allow(clippy::cast_possible_truncation)]
pub fn int(record: &Record, keys: &[&str]) -> Option<i64> {
    number(record, keys).map(|n| n.round() as i64)
}

pub fn boolean(record: &Record, keys: &[&str]) -> Option<bool> {
    keys.iter().filter_map(|k| record.get(*k)).find_map(|v| match v {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

/// Timestamp stored as epoch millis or an RFC 3339 string.
pub fn timestamp(record: &Record, keys: &[&str]) -> Option<DateTime<Utc>> {
    keys.iter().filter_map(|k| record.get(*k)).find_map(|v| match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
            .and_then(DateTime::from_timestamp_millis),
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|| s.trim().parse::<i64>().ok().and_then(DateTime::from_timestamp_millis)),
        _ => None,
    })
}

/// Whether a stored token count must be recomputed.
pub fn needs_token_recount(stored: Option<f64>) -> bool {
    !matches!(stored, Some(n) if n.is_finite() && n > 0.0)
}

/// A sentence recovered from an arbitrarily shaped row.
#[derive(Debug, Clone, PartialEq)]
pub struct RepairedSentence {
    pub id: String,
    pub language_id: String,
    pub deck_id: Option<String>,
    pub order: Option<i64>,
    pub import_id: Option<String>,
    pub source_text: String,
    pub target_text: String,
    pub transliteration: Option<String>,
    pub gloss: Option<String>,
    pub token_count: u32,
}

/// Recover a sentence from a legacy or current row.
///
/// `fallback_language` is used when the row names none; `cjk_mode` reports
/// the tokenization mode of a language id. Returns `None` when the row has
/// neither an id nor a language.
pub fn repair_sentence(
    record: &Record,
    fallback_language: Option<&str>,
    cjk_mode: impl Fn(&str) -> bool,
) -> Option<RepairedSentence> {
    let id = opt_string(record, ID_FIELDS)?;
    let language_id = opt_string(record, LANGUAGE_FIELDS).or_else(|| fallback_language.map(str::to_string))?;

    let source_text = first_non_empty(record, SOURCE_FIELDS);
    let target_text = first_non_empty(record, TARGET_FIELDS);
    let stored_tokens = number(record, TOKEN_FIELDS);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let token_count = if needs_token_recount(stored_tokens) {
        token_count_u32(&target_text, cjk_mode(&language_id))
    } else {
        stored_tokens.map_or(0, |n| n.round().min(f64::from(u32::MAX)) as u32)
    };

    Some(RepairedSentence {
        id,
        deck_id: opt_string(record, DECK_FIELDS),
        order: int(record, ORDER_FIELDS),
        import_id: opt_string(record, IMPORT_FIELDS),
        source_text,
        target_text,
        transliteration: opt_string(record, TRANSLITERATION_FIELDS),
        gloss: opt_string(record, GLOSS_FIELDS),
        token_count,
        language_id,
    })
}

/// Current position of a sentence when densifying a deck.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderEntry {
    pub id: String,
    pub order: Option<i64>,
}

/// Ids in their dense order: by existing order then id, unordered rows
/// last by id. The index of each id is its new order.
pub fn dense_orders(entries: &[OrderEntry]) -> Vec<String> {
    let mut sorted: Vec<&OrderEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| match (a.order, b.order) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.id.cmp(&b.id)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.id.cmp(&b.id),
    });
    sorted.dedup_by(|a, b| a.id == b.id);
    sorted.into_iter().map(|e| e.id.clone()).collect()
}

/// Largest valid pointer for a deck of `count` sentences.
pub fn max_pointer(count: usize) -> u32 {
    u32::try_from(count.saturating_sub(1)).unwrap_or(u32::MAX)
}

/// Clamp a pointer into `[0, max(0, count - 1)]`.
pub fn clamp_pointer(pointer: u32, count: usize) -> u32 {
    pointer.min(max_pointer(count))
}

/// Clamp both pointers; returns whether anything changed.
pub fn clamp_progress(progress: &mut PathProgress, count: usize) -> bool {
    let linear = clamp_pointer(progress.linear_order, count);
    let srs_new = clamp_pointer(progress.srs_new_order, count);
    let changed = linear != progress.linear_order || srs_new != progress.srs_new_order;
    progress.linear_order = linear;
    progress.srs_new_order = srs_new;
    changed
}

/// Per-deck progress seeded from dataset-wide progress.
///
/// The linear pointer also becomes the first never-reviewed pointer.
pub fn derive_path_progress(legacy: &LegacyDatasetProgress, deck_id: &str, now: DateTime<Utc>) -> PathProgress {
    PathProgress {
        language_id: legacy.language_id.clone(),
        deck_id: deck_id.to_string(),
        mode: StudyMode::Linear,
        linear_order: legacy.linear_order,
        srs_new_order: legacy.linear_order,
        lifetime_reps: legacy.lifetime_reps.max(0),
        lifetime_tokens: legacy.lifetime_tokens.max(0),
        updated_at: now,
    }
}

/// Pick the progress of one deck from whatever was stored.
///
/// A per-deck row wins. Dataset-wide progress only seeds the language's
/// default deck. Otherwise the deck starts from zero.
pub fn settle_progress(
    stored: &[StoredProgress],
    language_id: &str,
    deck_id: &str,
    is_default_deck: bool,
    now: DateTime<Utc>,
) -> PathProgress {
    let path = stored.iter().find_map(|p| match p {
        StoredProgress::Path(p) if p.language_id == language_id && p.deck_id == deck_id => Some(p),
        _ => None,
    });
    if let Some(p) = path {
        return p.clone();
    }

    if is_default_deck {
        let legacy = stored.iter().find_map(|p| match p {
            StoredProgress::Legacy(l) if l.language_id == language_id => Some(l),
            _ => None,
        });
        if let Some(l) = legacy {
            return derive_path_progress(l, deck_id, now);
        }
    }

    PathProgress::new(language_id.to_string(), deck_id.to_string(), now)
}

/// Classify a stored progress row: with a deck it is per-deck progress,
/// without one it is the dataset-wide legacy record.
pub fn classify_progress(record: &Record, now: DateTime<Utc>) -> Option<StoredProgress> {
    let language_id = opt_string(record, LANGUAGE_FIELDS).or_else(|| opt_string(record, &["id"]))?;
    let linear_order = uint(record, &["linear_order", "linearOrder", "currentOrder", "index"]).unwrap_or(0);
    let lifetime_reps = int(record, &["lifetime_reps", "lifetimeReps", "reps"]).unwrap_or(0).max(0);
    let lifetime_tokens = int(record, &["lifetime_tokens", "lifetimeTokens", "tokens"]).unwrap_or(0).max(0);
    let updated_at = timestamp(record, &["updated_at", "updatedAt"]).unwrap_or(now);

    let progress = match opt_string(record, DECK_FIELDS) {
        Some(deck_id) => StoredProgress::Path(PathProgress {
            language_id,
            deck_id,
            mode: StudyMode::parse(&first_non_empty(record, &["mode", "study_mode", "studyMode"])),
            linear_order,
            srs_new_order: uint(record, &["srs_new_order", "srsNewOrder"]).unwrap_or(0),
            lifetime_reps,
            lifetime_tokens,
            updated_at,
        }),
        None => StoredProgress::Legacy(LegacyDatasetProgress {
            language_id,
            linear_order,
            lifetime_reps,
            lifetime_tokens,
            updated_at,
        }),
    };
    Some(progress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()
    }

    #[test]
    fn first_non_empty_skips_blank_candidates() {
        let r = record(json!({"sourceText": "  ", "english": "Good morning", "prompt": "x"}));
        assert_eq!(first_non_empty(&r, SOURCE_FIELDS), "Good morning");
        assert_eq!(first_non_empty(&r, &["missing"]), "");
    }

    #[test]
    fn repairs_legacy_sentence_fields() {
        let r = record(json!({
            "id": "s1",
            "english": "Thank you",
            "answer": "Ευχαριστώ πολύ",
            "tokenCount": 0
        }));
        let s = repair_sentence(&r, Some("greek"), |_| false).unwrap();
        assert_eq!(s.language_id, "greek");
        assert_eq!(s.source_text, "Thank you");
        assert_eq!(s.target_text, "Ευχαριστώ πολύ");
        assert_eq!(s.token_count, 2);
        assert_eq!(s.deck_id, None);
        assert_eq!(s.order, None);
    }

    #[test]
    fn keeps_valid_token_counts() {
        let r = record(json!({"id": "s1", "datasetId": "zh", "text": "你好", "tokens": 5}));
        assert_eq!(repair_sentence(&r, None, |_| true).unwrap().token_count, 5);

        let bad = record(json!({"id": "s2", "datasetId": "zh", "text": "你好", "tokens": "NaN"}));
        assert_eq!(repair_sentence(&bad, None, |_| true).unwrap().token_count, 2);
    }

    #[test]
    fn rows_without_language_are_dropped() {
        let r = record(json!({"id": "s1", "text": "hi"}));
        assert_eq!(repair_sentence(&r, None, |_| false), None);
    }

    #[test]
    fn dense_orders_sorts_by_order_then_id() {
        let entries = vec![
            OrderEntry { id: "c".into(), order: Some(7) },
            OrderEntry { id: "b".into(), order: None },
            OrderEntry { id: "a".into(), order: Some(7) },
            OrderEntry { id: "z".into(), order: Some(2) },
            OrderEntry { id: "a0".into(), order: None },
        ];
        assert_eq!(dense_orders(&entries), vec!["z", "a", "c", "a0", "b"]);
    }

    #[test]
    fn clamp_handles_empty_deck() {
        assert_eq!(clamp_pointer(5, 0), 0);
        assert_eq!(clamp_pointer(5, 3), 2);
        assert_eq!(clamp_pointer(1, 3), 1);
    }

    #[test]
    fn legacy_progress_seeds_default_deck_only() {
        let legacy = classify_progress(
            &record(json!({"datasetId": "el", "linearOrder": 4, "lifetimeReps": 9, "lifetimeTokens": 40})),
            now(),
        )
        .unwrap();
        assert!(matches!(legacy, StoredProgress::Legacy(_)));

        let stored = vec![legacy];
        let main = settle_progress(&stored, "el", "el:main", true, now());
        assert_eq!(main.linear_order, 4);
        assert_eq!(main.srs_new_order, 4);
        assert_eq!(main.lifetime_reps, 9);
        assert_eq!(main.lifetime_tokens, 40);

        let other = settle_progress(&stored, "el", "verbs", false, now());
        assert_eq!(other.lifetime_reps, 0);
    }

    #[test]
    fn per_deck_progress_wins_over_legacy() {
        let stored = vec![
            classify_progress(&record(json!({"datasetId": "el", "linearOrder": 4})), now()).unwrap(),
            classify_progress(
                &record(json!({"language_id": "el", "deck_id": "el:main", "mode": "srs", "srs_new_order": 2})),
                now(),
            )
            .unwrap(),
        ];
        let settled = settle_progress(&stored, "el", "el:main", true, now());
        assert_eq!(settled.mode, StudyMode::Srs);
        assert_eq!(settled.srs_new_order, 2);
        assert_eq!(settled.linear_order, 0);
    }

    #[test]
    fn timestamps_accept_millis_and_rfc3339() {
        let r = record(json!({"a": 1_700_000_000_000_i64, "b": "2023-11-14T22:13:20Z"}));
        assert_eq!(timestamp(&r, &["a"]), Some(now()));
        assert_eq!(timestamp(&r, &["b"]), Some(now()));
    }
}
