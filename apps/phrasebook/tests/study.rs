//! Study flow tests: linear reading, review mode and vocabulary exposure.

mod common;

use chrono::Duration;
use pretty_assertions::assert_eq;

use common::TestContext;
use phrasebook_core::algorithm::Sm2;
use phrasebook_core::types::{Rating, SrsState, StudyMode};
use phrasebook_lib::db::{ProgressRepository, SentenceRepository, SrsRepository, VocabularyRepository};
use phrasebook_lib::services::scheduler::{advance, pick_current, rate, set_mode, AdvanceOutcome, CardKind};

fn srs_context(targets: &[&str]) -> TestContext {
    let mut ctx = TestContext::new();
    ctx.add_sentences(targets);
    let lang = ctx.lang().to_string();
    set_mode(&ctx.repo, &lang, &ctx.deck_id, StudyMode::Srs, ctx.now).unwrap();
    ctx
}

#[test]
fn linear_advance_counts_reps_and_tokens() {
    let mut ctx = TestContext::new();
    ctx.add_sentences(&["ένα δύο τρία", "τέσσερα πέντε έξι επτά οκτώ", "εννέα δέκα"]);
    let lang = ctx.lang().to_string();

    for _ in 0..3 {
        advance(&mut ctx.repo, &lang, &ctx.deck_id, 1, true, ctx.now).unwrap();
    }

    let progress = ctx.progress();
    assert_eq!(progress.lifetime_reps, 3);
    assert_eq!(progress.lifetime_tokens, 10);
    assert_eq!(progress.linear_order, 2);
    assert_eq!(ctx.repo.count_seen_words(&lang).unwrap(), 10);
    assert_eq!(ctx.repo.get_stats(&lang).unwrap().unwrap().seen_words, 10);
}

#[test]
fn stepping_back_is_not_a_rep() {
    let mut ctx = TestContext::new();
    ctx.add_sentences(&["ένα", "δύο"]);
    let lang = ctx.lang().to_string();

    let outcome = advance(&mut ctx.repo, &lang, &ctx.deck_id, -1, false, ctx.now).unwrap();
    let AdvanceOutcome::Moved { progress, sentence } = outcome else {
        panic!("expected a move");
    };
    assert_eq!(progress.linear_order, 0);
    assert_eq!(progress.lifetime_reps, 0);
    assert_eq!(sentence.unwrap().target_text, "ένα");
    assert_eq!(ctx.repo.count_seen_words(&lang).unwrap(), 0);
}

#[test]
fn advancing_moves_the_new_card_pointer_forward() {
    let mut ctx = TestContext::new();
    ctx.add_sentences(&["ένα", "δύο", "τρία"]);
    let lang = ctx.lang().to_string();

    advance(&mut ctx.repo, &lang, &ctx.deck_id, 1, true, ctx.now).unwrap();
    advance(&mut ctx.repo, &lang, &ctx.deck_id, 1, true, ctx.now).unwrap();
    advance(&mut ctx.repo, &lang, &ctx.deck_id, -1, false, ctx.now).unwrap();

    let progress = ctx.progress();
    assert_eq!(progress.linear_order, 1);
    assert_eq!(progress.srs_new_order, 2);
}

#[test]
fn empty_deck_has_no_current_card() {
    let mut ctx = TestContext::new();
    let lang = ctx.lang().to_string();

    assert!(pick_current(&ctx.repo, &Sm2::default(), &lang, &ctx.deck_id, ctx.now).unwrap().is_none());
    let outcome = advance(&mut ctx.repo, &lang, &ctx.deck_id, 1, true, ctx.now).unwrap();
    assert_eq!(outcome, AdvanceOutcome::NoSentence);
    assert_eq!(ctx.progress().lifetime_reps, 0);
}

#[test]
fn out_of_range_pointer_is_clamped_and_persisted() {
    let mut ctx = TestContext::new();
    ctx.add_sentences(&["ένα", "δύο", "τρία"]);
    let lang = ctx.lang().to_string();
    let mut progress = ctx.progress();
    progress.linear_order = 10;
    progress.srs_new_order = 7;
    ctx.repo.put_progress(&progress).unwrap();

    let card = pick_current(&ctx.repo, &Sm2::default(), &lang, &ctx.deck_id, ctx.now)
        .unwrap()
        .unwrap();

    assert_eq!(card.kind, CardKind::Linear);
    assert_eq!(card.sentence.order, 2);
    let stored = ctx.progress();
    assert_eq!(stored.linear_order, 2);
    assert_eq!(stored.srs_new_order, 2);
}

#[test]
fn review_pick_is_stable_without_mutation() {
    let ctx = srs_context(&["ένα", "δύο", "τρία"]);
    let sm2 = Sm2::default();

    let first = pick_current(&ctx.repo, &sm2, ctx.lang(), &ctx.deck_id, ctx.now).unwrap().unwrap();
    let second = pick_current(&ctx.repo, &sm2, ctx.lang(), &ctx.deck_id, ctx.now).unwrap().unwrap();

    assert_eq!(first, second);
    assert_eq!(first.kind, CardKind::New);
    assert_eq!(first.sentence.order, 0);
    assert_eq!(ctx.repo.count_srs(ctx.lang(), &ctx.deck_id).unwrap(), 0);
}

#[test]
fn due_pick_is_stable_and_breaks_ties_by_id() {
    let ctx = srs_context(&["ένα", "δύο", "τρία"]);
    let sm2 = Sm2::default();
    let sentences = ctx.repo.list_sentences(ctx.lang(), &ctx.deck_id).unwrap();
    let (low, high) = if sentences[0].id < sentences[1].id {
        (&sentences[0], &sentences[1])
    } else {
        (&sentences[1], &sentences[0])
    };
    for sentence in [high, low] {
        ctx.repo
            .put_srs(&SrsState {
                language_id: ctx.lang().to_string(),
                deck_id: ctx.deck_id.clone(),
                sentence_id: sentence.id.clone(),
                due_at: ctx.now - Duration::hours(1),
                reps: 1,
                lapses: 0,
                interval_days: 1.0,
                ease: 2.5,
                updated_at: ctx.now,
            })
            .unwrap();
    }

    let first = pick_current(&ctx.repo, &sm2, ctx.lang(), &ctx.deck_id, ctx.now).unwrap().unwrap();
    let second = pick_current(&ctx.repo, &sm2, ctx.lang(), &ctx.deck_id, ctx.now).unwrap().unwrap();

    assert_eq!(first.kind, CardKind::Due);
    assert_eq!(first.sentence.id, low.id);
    assert_eq!(first, second);
    assert_eq!(ctx.repo.count_srs(ctx.lang(), &ctx.deck_id).unwrap(), 2);
    assert_eq!(ctx.progress().lifetime_reps, 0);
}

#[test]
fn new_cards_are_introduced_in_order() {
    let mut ctx = srs_context(&["ένα", "δύο", "τρία"]);
    let sm2 = Sm2::default();
    let lang = ctx.lang().to_string();

    let mut introduced = Vec::new();
    for minute in 0..3 {
        let at = ctx.now + Duration::minutes(minute);
        let card = pick_current(&ctx.repo, &sm2, &lang, &ctx.deck_id, at).unwrap().unwrap();
        assert_eq!(card.kind, CardKind::New);
        introduced.push(card.sentence.order);
        let outcome = rate(&mut ctx.repo, &sm2, &lang, &ctx.deck_id, &card.sentence.id, Rating::Good, at).unwrap();
        assert!(outcome.was_new);
    }

    assert_eq!(introduced, vec![0, 1, 2]);
    let progress = ctx.progress();
    assert_eq!(progress.srs_new_order, 2);
    assert_eq!(progress.lifetime_reps, 3);
    assert!(pick_current(&ctx.repo, &sm2, &lang, &ctx.deck_id, ctx.now).unwrap().is_none());

    let later = ctx.advance_clock(Duration::days(2));
    let due = pick_current(&ctx.repo, &sm2, &lang, &ctx.deck_id, later).unwrap().unwrap();
    assert_eq!(due.kind, CardKind::Due);
    assert_eq!(due.sentence.order, 0);
}

#[test]
fn due_card_comes_before_new_cards() {
    let ctx = srs_context(&["ένα", "δύο", "τρία"]);
    let sentences = ctx.repo.list_sentences(ctx.lang(), &ctx.deck_id).unwrap();
    let late = &sentences[2];
    ctx.repo
        .put_srs(&SrsState {
            language_id: ctx.lang().to_string(),
            deck_id: ctx.deck_id.clone(),
            sentence_id: late.id.clone(),
            due_at: ctx.now - Duration::hours(1),
            reps: 2,
            lapses: 0,
            interval_days: 3.0,
            ease: 2.5,
            updated_at: ctx.now,
        })
        .unwrap();

    let card = pick_current(&ctx.repo, &Sm2::default(), ctx.lang(), &ctx.deck_id, ctx.now)
        .unwrap()
        .unwrap();
    assert_eq!(card.kind, CardKind::Due);
    assert_eq!(card.sentence.id, late.id);
}

#[test]
fn again_resets_a_mature_card() {
    let mut ctx = srs_context(&["ένα δύο"]);
    let sm2 = Sm2::default();
    let lang = ctx.lang().to_string();
    let sentence = ctx.repo.list_sentences(&lang, &ctx.deck_id).unwrap().remove(0);
    ctx.repo
        .put_srs(&SrsState {
            language_id: lang.clone(),
            deck_id: ctx.deck_id.clone(),
            sentence_id: sentence.id.clone(),
            due_at: ctx.now,
            reps: 3,
            lapses: 0,
            interval_days: 10.0,
            ease: 2.5,
            updated_at: ctx.now,
        })
        .unwrap();

    let outcome = rate(&mut ctx.repo, &sm2, &lang, &ctx.deck_id, &sentence.id, Rating::Again, ctx.now).unwrap();

    assert!(!outcome.was_new);
    assert_eq!(outcome.state.reps, 0);
    assert_eq!(outcome.state.interval_days, 0.0);
    assert_eq!(outcome.state.lapses, 1);
    assert!(outcome.state.ease < 2.5);
    assert!(outcome.state.ease >= sm2.minimum_ease);
    assert_eq!(outcome.state.due_at, ctx.now + Duration::minutes(1));
    assert_eq!(outcome.new_words, 2);
    assert_eq!(ctx.repo.get_srs(&lang, &ctx.deck_id, &sentence.id).unwrap().unwrap(), outcome.state);
}

#[test]
fn grading_a_sentence_of_another_deck_is_rejected() {
    let mut ctx = srs_context(&["ένα"]);
    let lang = ctx.lang().to_string();
    let err = rate(&mut ctx.repo, &Sm2::default(), &lang, &ctx.deck_id, "missing", Rating::Good, ctx.now);
    assert!(err.is_err());
    assert_eq!(ctx.progress().lifetime_reps, 0);
}

#[test]
fn mode_switch_keeps_pointers() {
    let mut ctx = TestContext::new();
    ctx.add_sentences(&["ένα", "δύο", "τρία"]);
    let lang = ctx.lang().to_string();
    advance(&mut ctx.repo, &lang, &ctx.deck_id, 1, true, ctx.now).unwrap();

    let progress = set_mode(&ctx.repo, &lang, &ctx.deck_id, StudyMode::Srs, ctx.now).unwrap();
    assert_eq!(progress.mode, StudyMode::Srs);
    assert_eq!(progress.linear_order, 1);
    assert_eq!(progress.srs_new_order, 1);
}
