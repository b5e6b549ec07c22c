//! SM-2 family grading with the sentence-practice constants.
//!
//! The multipliers are the reference behaviour for stored review data and
//! must not drift: hard ×1.0, good ×1.8, easy ×2.2 on top of the ease, with
//! the first two repetitions fixed at 1 and 3 days.

use super::{SchedulingResult, SpacedRepetitionAlgorithm};
use crate::types::{Rating, SrsState};
use chrono::{DateTime, Duration, Utc};

const MILLIS_PER_DAY: f64 = 24.0 * 60.0 * 60.0 * 1000.0;

/// SM-2 algorithm with configurable parameters.
#[derive(Debug, Clone)]
pub struct Sm2 {
    pub initial_ease: f64,
    pub minimum_ease: f64,
    pub maximum_ease: f64,
    pub again_penalty: f64,
    pub hard_penalty: f64,
    pub easy_bonus: f64,
    pub hard_multiplier: f64,
    pub good_multiplier: f64,
    pub easy_multiplier: f64,
    pub first_interval: f64,
    pub second_interval: f64,
    /// Delay before a failed card comes due again.
    pub relearn_delay: Duration,
}

impl Default for Sm2 {
    fn default() -> Self {
        Self {
            initial_ease: 2.5,
            minimum_ease: 1.3,
            maximum_ease: 2.8,
            again_penalty: 0.2,
            hard_penalty: 0.15,
            easy_bonus: 0.15,
            hard_multiplier: 1.0,
            good_multiplier: 1.8,
            easy_multiplier: 2.2,
            first_interval: 1.0,
            second_interval: 3.0,
            relearn_delay: Duration::minutes(1),
        }
    }
}

impl SpacedRepetitionAlgorithm for Sm2 {
    fn name(&self) -> &'static str {
        "sm2"
    }

    fn initial_state(
        &self,
        language_id: &str,
        deck_id: &str,
        sentence_id: &str,
        now: DateTime<Utc>,
    ) -> SrsState {
        SrsState {
            language_id: language_id.to_string(),
            deck_id: deck_id.to_string(),
            sentence_id: sentence_id.to_string(),
            due_at: now,
            reps: 0,
            lapses: 0,
            interval_days: 0.0,
            ease: self.initial_ease,
            updated_at: now,
        }
    }

    fn schedule(&self, state: &SrsState, rating: Rating, now: DateTime<Utc>) -> SchedulingResult {
        let ease = self.sanitize_ease(state.ease);
        let mut new_state = state.clone();
        new_state.updated_at = now;

        let next_due = match rating {
            Rating::Again => {
                if state.reps > 0 {
                    new_state.lapses = state.lapses.saturating_add(1);
                }
                new_state.reps = 0;
                new_state.interval_days = 0.0;
                new_state.ease = self.clamp_ease(ease - self.again_penalty);
                now + self.relearn_delay
            }
            Rating::Hard | Rating::Good | Rating::Easy => {
                let (ease_delta, multiplier) = match rating {
                    Rating::Hard => (-self.hard_penalty, self.hard_multiplier),
                    Rating::Easy => (self.easy_bonus, self.easy_multiplier),
                    _ => (0.0, self.good_multiplier),
                };
                let new_ease = self.clamp_ease(ease + ease_delta);
                let reps = state.reps.saturating_add(1);
                let interval = match reps {
                    1 => self.first_interval,
                    2 => self.second_interval,
                    _ => {
                        let prev = if state.interval_days.is_finite() {
                            state.interval_days.max(0.0)
                        } else {
                            0.0
                        };
                        (prev * new_ease * multiplier).round().max(1.0)
                    }
                };
                new_state.reps = reps;
                new_state.interval_days = interval;
                new_state.ease = new_ease;
                now + days_to_duration(interval)
            }
        };

        new_state.due_at = next_due;
        SchedulingResult { new_state, next_due }
    }
}

impl Sm2 {
    fn clamp_ease(&self, ease: f64) -> f64 {
        ease.clamp(self.minimum_ease, self.maximum_ease)
    }

    fn sanitize_ease(&self, ease: f64) -> f64 {
        if ease.is_finite() {
            self.clamp_ease(ease)
        } else {
            self.initial_ease
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn days_to_duration(days: f64) -> Duration {
    Duration::milliseconds((days * MILLIS_PER_DAY).round() as i64)
}
