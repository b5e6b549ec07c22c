//! Picks the current card of a deck and records study activity.
//!
//! Linear mode walks the deck by `linear_order`. Review mode is evaluated on
//! every pick: the earliest due card, else the first sentence at or after
//! `srs_new_order` that was never reviewed.

use crate::db::repository::Result;
use crate::db::{
    DbError, DeckRepository, LanguageRepository, ProgressRepository, SentenceRepository, SqliteRepository,
    SrsRepository,
};
use crate::services::vocabulary::record_exposure;
use chrono::{DateTime, Utc};
use phrasebook_core::algorithm::SpacedRepetitionAlgorithm;
use phrasebook_core::repair::{clamp_pointer, clamp_progress, max_pointer};
use phrasebook_core::types::{PathProgress, Rating, Sentence, SrsState, StudyMode};
use rusqlite::Connection;
use serde::Serialize;
use tracing::debug;

/// Why a card is current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CardKind {
    Linear,
    Due,
    New,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentCard {
    pub sentence: Sentence,
    pub kind: CardKind,
    /// Stored review state, or the pending initial state of a new card.
    pub state: Option<SrsState>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdvanceOutcome {
    Moved {
        progress: PathProgress,
        sentence: Option<Sentence>,
    },
    /// The deck is empty.
    NoSentence,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateOutcome {
    pub state: SrsState,
    pub progress: PathProgress,
    pub was_new: bool,
    pub new_words: usize,
}

/// Progress of a deck, creating zeroed progress for a deck that has none.
pub fn load_progress(conn: &Connection, language_id: &str, deck_id: &str, now: DateTime<Utc>) -> Result<PathProgress> {
    if let Some(progress) = conn.get_progress(language_id, deck_id)? {
        return Ok(progress);
    }
    if conn.get_deck(language_id, deck_id)?.is_none() {
        return Err(DbError::NotFound(format!("deck {deck_id} of language {language_id}")));
    }
    let progress = PathProgress::new(language_id.to_string(), deck_id.to_string(), now);
    conn.put_progress(&progress)?;
    Ok(progress)
}

fn cjk_mode(conn: &Connection, language_id: &str) -> Result<bool> {
    Ok(conn.get_language(language_id)?.is_some_and(|l| l.cjk_mode))
}

/// The card to show now, or `None` when the deck has nothing to study.
///
/// Reading twice without a mutation in between returns the same card. An
/// out-of-range linear pointer is clamped and the correction persisted.
pub fn pick_current(
    conn: &Connection,
    algorithm: &dyn SpacedRepetitionAlgorithm,
    language_id: &str,
    deck_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<CurrentCard>> {
    let mut progress = load_progress(conn, language_id, deck_id, now)?;
    let count = conn.count_sentences(language_id, deck_id)?;
    if clamp_progress(&mut progress, count) {
        debug!(language = language_id, deck = deck_id, "clamped progress pointers");
        conn.put_progress(&progress)?;
    }
    if count == 0 {
        return Ok(None);
    }

    match progress.mode {
        StudyMode::Linear => Ok(conn
            .sentence_at(language_id, deck_id, progress.linear_order)?
            .map(|sentence| CurrentCard {
                sentence,
                kind: CardKind::Linear,
                state: None,
            })),
        StudyMode::Srs => {
            if let Some(state) = conn.due_states(language_id, deck_id, now)?.into_iter().next() {
                if let Some(sentence) = conn.get_sentence(&state.sentence_id)? {
                    return Ok(Some(CurrentCard {
                        sentence,
                        kind: CardKind::Due,
                        state: Some(state),
                    }));
                }
            }
            let Some(sentence) = conn.first_unintroduced(language_id, deck_id, progress.srs_new_order)? else {
                return Ok(None);
            };
            let state = algorithm.initial_state(language_id, deck_id, &sentence.id, now);
            Ok(Some(CurrentCard {
                sentence,
                kind: CardKind::New,
                state: Some(state),
            }))
        }
    }
}

/// Move the linear pointer by `delta`, clamped to the deck.
///
/// With `counts_as_rep` the sentence being left counts as studied, even when
/// the pointer is already at the boundary.
pub fn advance(
    repo: &mut SqliteRepository,
    language_id: &str,
    deck_id: &str,
    delta: i64,
    counts_as_rep: bool,
    now: DateTime<Utc>,
) -> Result<AdvanceOutcome> {
    repo.transaction(|tx| {
        let mut progress = load_progress(tx, language_id, deck_id, now)?;
        let count = tx.count_sentences(language_id, deck_id)?;
        if count == 0 {
            return Ok(AdvanceOutcome::NoSentence);
        }

        let current = clamp_pointer(progress.linear_order, count);
        let target = (i64::from(current) + delta).clamp(0, i64::from(max_pointer(count)));
        let target = u32::try_from(target).unwrap_or(0);

        if counts_as_rep {
            if let Some(left) = tx.sentence_at(language_id, deck_id, current)? {
                progress.lifetime_reps += 1;
                progress.lifetime_tokens += i64::from(left.token_count);
                record_exposure(tx, &left, cjk_mode(tx, language_id)?, now)?;
            }
            progress.srs_new_order = clamp_pointer(progress.srs_new_order.max(target), count);
        }
        progress.linear_order = target;
        progress.updated_at = now;
        tx.put_progress(&progress)?;

        let sentence = tx.sentence_at(language_id, deck_id, target)?;
        Ok(AdvanceOutcome::Moved { progress, sentence })
    })
}

/// Grade a sentence in review mode.
///
/// A never-reviewed sentence gets its first state and moves `srs_new_order`
/// past it. Review state and progress commit together.
pub fn rate(
    repo: &mut SqliteRepository,
    algorithm: &dyn SpacedRepetitionAlgorithm,
    language_id: &str,
    deck_id: &str,
    sentence_id: &str,
    rating: Rating,
    now: DateTime<Utc>,
) -> Result<RateOutcome> {
    repo.transaction(|tx| {
        let sentence = tx
            .get_sentence(sentence_id)?
            .filter(|s| s.language_id == language_id && s.deck_id == deck_id)
            .ok_or_else(|| DbError::NotFound(format!("sentence {sentence_id}")))?;
        let mut progress = load_progress(tx, language_id, deck_id, now)?;
        let count = tx.count_sentences(language_id, deck_id)?;

        let existing = tx.get_srs(language_id, deck_id, sentence_id)?;
        let was_new = existing.is_none();
        let state = existing.unwrap_or_else(|| algorithm.initial_state(language_id, deck_id, sentence_id, now));
        let result = algorithm.schedule(&state, rating, now);
        tx.put_srs(&result.new_state)?;

        if was_new {
            let next = progress.srs_new_order.saturating_add(1).max(sentence.order.saturating_add(1));
            progress.srs_new_order = clamp_pointer(next, count);
        }
        progress.lifetime_reps += 1;
        progress.lifetime_tokens += i64::from(sentence.token_count);
        progress.updated_at = now;
        tx.put_progress(&progress)?;

        let new_words = record_exposure(tx, &sentence, cjk_mode(tx, language_id)?, now)?;
        debug!(
            sentence = sentence_id,
            rating = rating.to_value(),
            due = %result.next_due,
            "graded sentence"
        );
        Ok(RateOutcome {
            state: result.new_state,
            progress,
            was_new,
            new_words,
        })
    })
}

/// Switch a deck between linear and review mode; pointers are untouched.
pub fn set_mode(
    conn: &Connection,
    language_id: &str,
    deck_id: &str,
    mode: StudyMode,
    now: DateTime<Utc>,
) -> Result<PathProgress> {
    let mut progress = load_progress(conn, language_id, deck_id, now)?;
    progress.mode = mode;
    progress.updated_at = now;
    conn.put_progress(&progress)?;
    Ok(progress)
}
