//! Study session commands.

use super::library::{current_selection, lock_repository, CommandError};
use crate::services::scheduler::{self, AdvanceOutcome, CurrentCard, RateOutcome};
use crate::state::AppState;
use chrono::Utc;
use phrasebook_core::types::{PathProgress, Rating, StudyMode};

#[derive(Debug, serde::Deserialize)]
pub struct RateRequest {
    pub sentence_id: String,
    pub rating: Rating,
}

/// The card to show for the selected deck.
pub async fn get_current(state: &AppState) -> Result<Option<CurrentCard>, CommandError> {
    let (language_id, deck_id) = current_selection(state).await?;
    let repo = lock_repository(state)?;
    scheduler::pick_current(&repo, &state.algorithm, &language_id, &deck_id, Utc::now()).map_err(Into::into)
}

/// Finish the current sentence and move to the next one.
pub async fn next_sentence(state: &AppState) -> Result<AdvanceOutcome, CommandError> {
    let (language_id, deck_id) = current_selection(state).await?;
    let mut repo = lock_repository(state)?;
    scheduler::advance(&mut repo, &language_id, &deck_id, 1, true, Utc::now()).map_err(Into::into)
}

/// Step back without counting a repetition.
pub async fn previous_sentence(state: &AppState) -> Result<AdvanceOutcome, CommandError> {
    let (language_id, deck_id) = current_selection(state).await?;
    let mut repo = lock_repository(state)?;
    scheduler::advance(&mut repo, &language_id, &deck_id, -1, false, Utc::now()).map_err(Into::into)
}

/// Grade a sentence of the selected deck.
pub async fn rate_sentence(request: RateRequest, state: &AppState) -> Result<RateOutcome, CommandError> {
    let (language_id, deck_id) = current_selection(state).await?;
    let mut repo = lock_repository(state)?;
    scheduler::rate(
        &mut repo,
        &state.algorithm,
        &language_id,
        &deck_id,
        &request.sentence_id,
        request.rating,
        Utc::now(),
    )
    .map_err(Into::into)
}

pub async fn set_mode(mode: StudyMode, state: &AppState) -> Result<PathProgress, CommandError> {
    let (language_id, deck_id) = current_selection(state).await?;
    let repo = lock_repository(state)?;
    scheduler::set_mode(&repo, &language_id, &deck_id, mode, Utc::now()).map_err(Into::into)
}
