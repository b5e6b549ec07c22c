//! Test fixtures and factory functions for creating test data.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use phrasebook_core::tokenizer::token_count_u32;
use phrasebook_core::types::Sentence;

/// A fixed clock so due dates are predictable.
pub fn start_time() -> DateTime<Utc> {
    DateTime::from_timestamp_millis(1_700_000_000_000).expect("valid timestamp")
}

/// A sentence whose token count is derived from its target text.
pub fn sentence(language_id: &str, deck_id: &str, order: u32, target: &str) -> Sentence {
    Sentence {
        id: Uuid::new_v4().to_string(),
        language_id: language_id.to_string(),
        deck_id: deck_id.to_string(),
        order,
        import_id: None,
        source_text: format!("source {order}"),
        target_text: target.to_string(),
        transliteration: None,
        gloss: None,
        token_count: token_count_u32(target, false),
    }
}

/// Tab separated import text with an English and a Greek column.
pub fn sample_tsv(rows: &[(&str, &str)]) -> String {
    let mut text = String::from("English\tTarget (Greek)\n");
    for (source, target) in rows {
        text.push_str(source);
        text.push('\t');
        text.push_str(target);
        text.push('\n');
    }
    text
}

/// Version 1 store contents: one dataset, three sentences with sparse
/// orders and dataset-wide progress.
pub const LEGACY_STORE_ROWS: &str = r#"
INSERT INTO datasets (id, name, lang, created_at) VALUES ('el', 'Greek', 'el-GR', 1000);
INSERT INTO sentences (id, dataset_id, data) VALUES
    ('s1', 'el', '{"english": "Hello", "text": "Γεια σου", "order": 10}'),
    ('s2', 'el', '{"english": "Good night", "text": "Καληνύχτα", "order": 20}'),
    ('s3', 'el', '{"english": "Thank you very much", "text": "Ευχαριστώ πολύ", "order": 30}');
INSERT INTO progress (dataset_id, linear_order, lifetime_reps, lifetime_tokens, updated_at)
    VALUES ('el', 1, 7, 15, 1000);
"#;
