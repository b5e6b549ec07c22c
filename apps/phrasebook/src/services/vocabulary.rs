//! Vocabulary exposure: tokens of completed sentences become seen words.

use crate::db::repository::Result;
use crate::db::VocabularyRepository;
use chrono::{DateTime, Utc};
use phrasebook_core::tokenizer::tokenize_text;
use phrasebook_core::types::{DatasetStats, Sentence};
use rusqlite::Connection;

/// Record the tokens of a completed sentence; returns how many were new.
///
/// The first-seen timestamp of known tokens is kept. The cached count of the
/// language grows by the number of new tokens.
pub fn record_exposure(conn: &Connection, sentence: &Sentence, cjk_mode: bool, now: DateTime<Utc>) -> Result<usize> {
    let mut added = 0;
    for token in tokenize_text(&sentence.target_text, cjk_mode) {
        if conn.record_seen_word(&sentence.language_id, &token, now)? {
            added += 1;
        }
    }
    if added == 0 {
        return Ok(0);
    }

    let seen_words = match conn.get_stats(&sentence.language_id)? {
        Some(stats) => stats.seen_words + i64::try_from(added).unwrap_or(i64::MAX),
        None => conn.count_seen_words(&sentence.language_id)?,
    };
    conn.put_stats(&DatasetStats {
        language_id: sentence.language_id.clone(),
        seen_words,
        updated_at: now,
    })?;
    Ok(added)
}
