//! Spaced repetition grading.

pub mod sm2;

use crate::types::{Rating, SrsState};
use chrono::{DateTime, Utc};

pub use sm2::Sm2;

/// Result of grading a card.
#[derive(Debug, Clone)]
pub struct SchedulingResult {
    pub new_state: SrsState,
    pub next_due: DateTime<Utc>,
}

/// Trait for spaced repetition algorithms.
pub trait SpacedRepetitionAlgorithm: Send + Sync {
    /// Algorithm identifier.
    fn name(&self) -> &'static str;

    /// Calculate the next state after a grade.
    fn schedule(&self, state: &SrsState, rating: Rating, now: DateTime<Utc>) -> SchedulingResult;

    /// Zero-initialized state for a sentence that was never reviewed.
    fn initial_state(
        &self,
        language_id: &str,
        deck_id: &str,
        sentence_id: &str,
        now: DateTime<Utc>,
    ) -> SrsState;
}
