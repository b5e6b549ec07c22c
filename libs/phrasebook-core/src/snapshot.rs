//! Portable backup document.
//!
//! Exports are written in the current shape. Restores accept any historical
//! shape and are upgraded with the same repairs the store migrations apply,
//! so a restored store satisfies every ordering and progress invariant.

use crate::error::RepairError;
use crate::repair::{
    self, classify_progress, default_deck_id, dense_orders, first_non_empty, opt_string, settle_progress,
    OrderEntry, Record, DECK_FIELDS, LANGUAGE_FIELDS,
};
use crate::types::{
    DatasetStats, Deck, ImportBatch, ImportMode, Language, LegacyDatasetProgress, PathProgress, RtlMode,
    Sentence, SeenWord, SrsState, StoredProgress, DEFAULT_DECK_NAME,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Format written by [`Snapshot`] exports.
pub const SNAPSHOT_FORMAT: u32 = 3;

const MIN_EASE: f64 = 1.3;
const MAX_EASE: f64 = 2.8;
const DEFAULT_EASE: f64 = 2.5;

/// Complete dump of every table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub format: u32,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub exported_at: DateTime<Utc>,
    pub languages: Vec<Language>,
    pub decks: Vec<Deck>,
    pub import_batches: Vec<ImportBatch>,
    pub sentences: Vec<Sentence>,
    pub path_progress: Vec<PathProgress>,
    pub srs_state: Vec<SrsState>,
    pub seen_words: Vec<SeenWord>,
    pub dataset_stats: Vec<DatasetStats>,
    /// Dataset-wide progress kept for older readers.
    #[serde(default)]
    pub legacy_progress: Vec<LegacyDatasetProgress>,
}

impl Snapshot {
    pub fn empty(exported_at: DateTime<Utc>) -> Self {
        Self {
            format: SNAPSHOT_FORMAT,
            exported_at,
            languages: Vec::new(),
            decks: Vec::new(),
            import_batches: Vec::new(),
            sentences: Vec::new(),
            path_progress: Vec::new(),
            srs_state: Vec::new(),
            seen_words: Vec::new(),
            dataset_stats: Vec::new(),
            legacy_progress: Vec::new(),
        }
    }
}

fn records<'a>(doc: &'a Record, keys: &[&str]) -> Result<Vec<&'a Record>, RepairError> {
    let mut out = Vec::new();
    for key in keys {
        match doc.get(*key) {
            None | Some(Value::Null) => {}
            Some(Value::Array(items)) => out.extend(items.iter().filter_map(Value::as_object)),
            Some(_) => return Err(RepairError::NotAnArray((*key).to_string())),
        }
    }
    Ok(out)
}

fn has_any(doc: &Record, keys: &[&str]) -> bool {
    keys.iter().any(|k| matches!(doc.get(*k), Some(Value::Array(_))))
}

fn language_from(record: &Record, now: DateTime<Utc>) -> Option<Language> {
    let id = opt_string(record, &["id", "language_id", "languageId", "dataset_id", "datasetId"])?;
    let name = opt_string(record, &["name", "title", "label"]).unwrap_or_else(|| id.clone());
    let lang_tag = opt_string(record, &["lang_tag", "langTag", "lang", "bcp47", "locale"]).unwrap_or_else(|| "en".into());
    let mut language = Language::new(
        id,
        name,
        lang_tag,
        repair::timestamp(record, &["created_at", "createdAt"]).unwrap_or(now),
    );
    language.rtl_mode = match record.get("rtl") {
        Some(Value::Bool(true)) => RtlMode::Rtl,
        Some(Value::Bool(false)) => RtlMode::Ltr,
        _ => RtlMode::parse(&first_non_empty(record, &["rtl_mode", "rtlMode", "dir", "rtl"])),
    };
    language.cjk_mode = repair::boolean(record, &["cjk_mode", "cjkMode", "cjk"]).unwrap_or(false);
    language.tts_rate = repair::number(record, &["tts_rate", "ttsRate", "rate"]).unwrap_or(1.0);
    language.tts_pitch = repair::number(record, &["tts_pitch", "ttsPitch", "pitch"]).unwrap_or(1.0);
    language.tts_voice = opt_string(record, &["tts_voice", "ttsVoice", "voiceURI", "voice_uri", "voice"]);
    language.token_goal = repair::int(record, &["token_goal", "tokenGoal", "lifetimeTokenGoal", "goal"])
        .unwrap_or(0)
        .max(0);
    if let Some(theme) = opt_string(record, &["theme"]) {
        language.theme = theme;
    }
    Some(language)
}

fn ease_from(record: &Record) -> f64 {
    repair::number(record, &["ease", "ease_factor", "easeFactor"])
        .unwrap_or(DEFAULT_EASE)
        .clamp(MIN_EASE, MAX_EASE)
}

/// Default deck of each language: its "Main" deck, else its oldest deck.
fn default_decks(decks: &[Deck]) -> HashMap<String, String> {
    let mut by_language: BTreeMap<&str, Vec<&Deck>> = BTreeMap::new();
    for deck in decks {
        by_language.entry(deck.language_id.as_str()).or_default().push(deck);
    }
    by_language
        .into_iter()
        .filter_map(|(language, mut decks)| {
            decks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
            let chosen = decks
                .iter()
                .find(|d| d.name == DEFAULT_DECK_NAME)
                .or_else(|| decks.first())?;
            Some((language.to_string(), chosen.id.clone()))
        })
        .collect()
}

/// Language ids named by rows that hang off a language, in first-seen order.
fn referenced_languages(doc: &Record, now: DateTime<Utc>) -> Result<Vec<String>, RepairError> {
    let mut ids = Vec::new();
    let mut push = |id: String| {
        if !id.trim().is_empty() && !ids.contains(&id) {
            ids.push(id);
        }
    };
    let tables: [&[&str]; 4] = [
        &["decks", "paths"],
        &["sentences"],
        &["import_batches", "importBatches", "imports"],
        &["seen_words", "seenWords"],
    ];
    for keys in tables {
        for record in records(doc, keys)? {
            if let Some(id) = opt_string(record, LANGUAGE_FIELDS) {
                push(id);
            }
        }
    }
    for record in records(doc, &["path_progress", "pathProgress", "legacy_progress", "legacyProgress", "progress"])? {
        match classify_progress(record, now) {
            Some(StoredProgress::Path(p)) => push(p.language_id),
            Some(StoredProgress::Legacy(l)) => push(l.language_id),
            None => {}
        }
    }
    Ok(ids)
}

/// Upgrade a backup document of any known shape.
///
/// Rows naming a language the document does not list bring that language
/// back with an undetermined tag rather than being dropped.
pub fn upgrade_snapshot(document: &Value, now: DateTime<Utc>) -> Result<Snapshot, RepairError> {
    let doc = document.as_object().ok_or(RepairError::NotAnObject)?;
    let mut snapshot = Snapshot::empty(repair::timestamp(doc, &["exported_at", "exportedAt"]).unwrap_or(now));

    // Languages first; everything else must reference one.
    let mut seen_languages = BTreeSet::new();
    for record in records(doc, &["languages", "datasets"])? {
        if let Some(language) = language_from(record, now) {
            if seen_languages.insert(language.id.clone()) {
                snapshot.languages.push(language);
            }
        }
    }
    for id in referenced_languages(doc, now)? {
        if seen_languages.insert(id.clone()) {
            snapshot.languages.push(Language::new(id.clone(), id, "und".into(), now));
        }
    }
    let cjk: HashMap<String, bool> = snapshot
        .languages
        .iter()
        .map(|l| (l.id.clone(), l.cjk_mode))
        .collect();
    let single_language = (snapshot.languages.len() == 1).then(|| snapshot.languages[0].id.clone());

    let mut deck_ids = BTreeSet::new();
    for record in records(doc, &["decks", "paths"])? {
        let Some(id) = opt_string(record, &["id", "deck_id", "deckId"]) else { continue };
        let Some(language_id) = opt_string(record, LANGUAGE_FIELDS).or_else(|| single_language.clone()) else {
            continue;
        };
        if !cjk.contains_key(&language_id) || !deck_ids.insert(id.clone()) {
            continue;
        }
        snapshot.decks.push(Deck {
            id,
            language_id,
            name: opt_string(record, &["name", "title"]).unwrap_or_else(|| DEFAULT_DECK_NAME.into()),
            created_at: repair::timestamp(record, &["created_at", "createdAt"]).unwrap_or(now),
        });
    }

    // Every language owns at least one deck.
    for language in &snapshot.languages {
        if !snapshot.decks.iter().any(|d| d.language_id == language.id) {
            let id = default_deck_id(&language.id);
            deck_ids.insert(id.clone());
            snapshot.decks.push(Deck {
                id,
                language_id: language.id.clone(),
                name: DEFAULT_DECK_NAME.into(),
                created_at: language.created_at,
            });
        }
    }
    let defaults = default_decks(&snapshot.decks);
    let deck_language: HashMap<&str, &str> = snapshot
        .decks
        .iter()
        .map(|d| (d.id.as_str(), d.language_id.as_str()))
        .collect();

    // Sentences grouped per deck, then densely renumbered.
    let mut per_deck: BTreeMap<(String, String), Vec<repair::RepairedSentence>> = BTreeMap::new();
    let mut sentence_ids = BTreeSet::new();
    for record in records(doc, &["sentences"])? {
        let Some(mut sentence) = repair::repair_sentence(record, single_language.as_deref(), |id| {
            cjk.get(id).copied().unwrap_or(false)
        }) else {
            continue;
        };
        let Some(default_deck) = defaults.get(&sentence.language_id) else { continue };
        let deck_ok = sentence
            .deck_id
            .as_deref()
            .is_some_and(|d| deck_language.get(d) == Some(&sentence.language_id.as_str()));
        if !deck_ok {
            sentence.deck_id = Some(default_deck.clone());
        }
        if !sentence_ids.insert(sentence.id.clone()) {
            continue;
        }
        let key = (sentence.language_id.clone(), sentence.deck_id.clone().unwrap_or_default());
        per_deck.entry(key).or_default().push(sentence);
    }

    let mut deck_counts: HashMap<(String, String), usize> = HashMap::new();
    let mut sentence_location: HashMap<String, (String, String)> = HashMap::new();
    for ((language_id, deck_id), rows) in per_deck {
        let entries: Vec<OrderEntry> = rows
            .iter()
            .map(|s| OrderEntry { id: s.id.clone(), order: s.order })
            .collect();
        let order_of: HashMap<String, u32> = dense_orders(&entries)
            .into_iter()
            .enumerate()
            .map(|(i, id)| (id, u32::try_from(i).unwrap_or(u32::MAX)))
            .collect();
        deck_counts.insert((language_id.clone(), deck_id.clone()), rows.len());
        for s in rows {
            sentence_location.insert(s.id.clone(), (language_id.clone(), deck_id.clone()));
            snapshot.sentences.push(Sentence {
                order: order_of.get(&s.id).copied().unwrap_or(0),
                id: s.id,
                language_id: s.language_id,
                deck_id: deck_id.clone(),
                import_id: s.import_id,
                source_text: s.source_text,
                target_text: s.target_text,
                transliteration: s.transliteration,
                gloss: s.gloss,
                token_count: s.token_count,
            });
        }
    }
    snapshot
        .sentences
        .sort_by(|a, b| (&a.language_id, &a.deck_id, a.order).cmp(&(&b.language_id, &b.deck_id, b.order)));

    for record in records(doc, &["import_batches", "importBatches", "imports"])? {
        let Some(id) = opt_string(record, &["id", "import_id", "importId"]) else { continue };
        let Some(language_id) = opt_string(record, LANGUAGE_FIELDS).or_else(|| single_language.clone()) else {
            continue;
        };
        let Some(default_deck) = defaults.get(&language_id) else { continue };
        let deck_id = opt_string(record, DECK_FIELDS)
            .filter(|d| deck_language.get(d.as_str()) == Some(&language_id.as_str()))
            .unwrap_or_else(|| default_deck.clone());
        let start_order = repair::uint(record, &["start_order", "startOrder"]).unwrap_or(0);
        snapshot.import_batches.push(ImportBatch {
            id,
            language_id,
            deck_id,
            filename: opt_string(record, &["filename", "fileName", "name"]).unwrap_or_default(),
            mode: ImportMode::parse(&first_non_empty(record, &["mode"])),
            start_order,
            end_order: repair::uint(record, &["end_order", "endOrder"]).unwrap_or(start_order),
            row_count: repair::uint(record, &["row_count", "rowCount", "count"]).unwrap_or(0),
            created_at: repair::timestamp(record, &["created_at", "createdAt"]).unwrap_or(now),
        });
    }

    // Progress: per-deck rows and dataset-wide legacy rows side by side.
    let mut stored: Vec<StoredProgress> = Vec::new();
    for record in records(doc, &["path_progress", "pathProgress"])? {
        if let Some(StoredProgress::Path(p)) = classify_progress(record, now) {
            stored.push(StoredProgress::Path(p));
        }
    }
    for record in records(doc, &["legacy_progress", "legacyProgress", "progress"])? {
        if let Some(p) = classify_progress(record, now) {
            stored.push(p);
        }
    }
    for deck in &snapshot.decks {
        let is_default = defaults.get(&deck.language_id) == Some(&deck.id);
        let mut progress = settle_progress(&stored, &deck.language_id, &deck.id, is_default, now);
        let count = deck_counts
            .get(&(deck.language_id.clone(), deck.id.clone()))
            .copied()
            .unwrap_or(0);
        repair::clamp_progress(&mut progress, count);
        snapshot.path_progress.push(progress);
    }
    let mut legacy_seen = BTreeSet::new();
    for p in stored {
        if let StoredProgress::Legacy(l) = p {
            if cjk.contains_key(&l.language_id) && legacy_seen.insert(l.language_id.clone()) {
                snapshot.legacy_progress.push(l);
            }
        }
    }

    // Review state follows its sentence; orphans vanish.
    let mut srs: BTreeMap<String, SrsState> = BTreeMap::new();
    for record in records(doc, &["srs_state", "srsState", "srs"])? {
        let Some(sentence_id) = opt_string(record, &["sentence_id", "sentenceId", "id"]) else { continue };
        let Some((language_id, deck_id)) = sentence_location.get(&sentence_id) else { continue };
        srs.insert(
            sentence_id.clone(),
            SrsState {
                language_id: language_id.clone(),
                deck_id: deck_id.clone(),
                sentence_id,
                due_at: repair::timestamp(record, &["due_at", "dueAt", "due"]).unwrap_or(now),
                reps: repair::uint(record, &["reps", "repetitions"]).unwrap_or(0),
                lapses: repair::uint(record, &["lapses"]).unwrap_or(0),
                interval_days: repair::number(record, &["interval_days", "intervalDays", "interval"])
                    .unwrap_or(0.0)
                    .max(0.0),
                ease: ease_from(record),
                updated_at: repair::timestamp(record, &["updated_at", "updatedAt"]).unwrap_or(now),
            },
        );
    }
    snapshot.srs_state = srs.into_values().collect();

    let words_present = has_any(doc, &["seen_words", "seenWords"]);
    let mut words: BTreeMap<(String, String), SeenWord> = BTreeMap::new();
    for record in records(doc, &["seen_words", "seenWords"])? {
        let Some(language_id) = opt_string(record, LANGUAGE_FIELDS).or_else(|| single_language.clone()) else {
            continue;
        };
        let Some(token) = opt_string(record, &["token", "word"]) else { continue };
        if !cjk.contains_key(&language_id) {
            continue;
        }
        let first_seen_at = repair::timestamp(record, &["first_seen_at", "firstSeenAt", "seen_at"]).unwrap_or(now);
        words
            .entry((language_id.clone(), token.clone()))
            .and_modify(|w| w.first_seen_at = w.first_seen_at.min(first_seen_at))
            .or_insert(SeenWord { language_id, token, first_seen_at });
    }
    snapshot.seen_words = words.into_values().collect();

    let mut stored_stats: HashMap<String, i64> = HashMap::new();
    for record in records(doc, &["dataset_stats", "datasetStats", "stats"])? {
        if let Some(language_id) = opt_string(record, LANGUAGE_FIELDS).or_else(|| opt_string(record, &["id"])) {
            let count = repair::int(record, &["seen_words", "seenWords", "wordsSeen"]).unwrap_or(0).max(0);
            stored_stats.insert(language_id, count);
        }
    }
    for language in &snapshot.languages {
        let seen_words = if words_present {
            let n = snapshot.seen_words.iter().filter(|w| w.language_id == language.id).count();
            i64::try_from(n).unwrap_or(i64::MAX)
        } else {
            stored_stats.get(&language.id).copied().unwrap_or(0)
        };
        snapshot.dataset_stats.push(DatasetStats {
            language_id: language.id.clone(),
            seen_words,
            updated_at: now,
        });
    }

    Ok(snapshot)
}
