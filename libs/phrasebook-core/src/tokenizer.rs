//! Approximate token counting.
//!
//! Space-delimited scripts are split on whitespace and a fixed punctuation
//! class. In CJK mode every character that is not whitespace, punctuation
//! or a symbol counts as one token.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

/// Characters removed before any splitting.
const INVISIBLE: &[char] = &['\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}'];

/// One counted character in CJK mode. Combining marks count.
static CJK_COUNTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\s\p{P}\p{S}]").expect("CJK character class compiles"));

/// Punctuation treated as a word boundary in space-delimited mode.
const SEPARATORS: &[char] = &[
    '.', ',', '!', '?', ';', ':', '"', '(', ')', '[', ']', '{', '}', '<', '>', '/', '\\', '|',
    '-', '_', '*', '#', '&', '+', '=', '~', '`', '…', '–', '—', '«', '»', '“', '”', '„', '‘',
    '’', '¿', '¡', '·', '\u{037E}', '\u{0387}', '、', '。', '，', '！', '？', '；', '：', '「',
    '」', '『', '』', '（', '）',
];

fn strip_invisible(text: &str) -> String {
    text.chars().filter(|c| !INVISIBLE.contains(c)).collect()
}

fn is_separator(c: char) -> bool {
    c.is_whitespace() || SEPARATORS.contains(&c)
}

fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(is_separator).filter(|w| !w.is_empty())
}

fn cjk_chars(text: &str) -> impl Iterator<Item = char> + '_ {
    CJK_COUNTED
        .find_iter(text)
        .filter_map(|m| m.as_str().chars().next())
}

/// Approximate number of tokens in `text`.
pub fn count_tokens(text: &str, cjk_mode: bool) -> usize {
    let cleaned = strip_invisible(text);
    if cjk_mode {
        cjk_chars(&cleaned).count()
    } else {
        words(cleaned.trim()).count()
    }
}

/// De-duplicated, normalized tokens of `text`.
pub fn tokenize_text(text: &str, cjk_mode: bool) -> BTreeSet<String> {
    let cleaned = strip_invisible(text);
    if cjk_mode {
        cjk_chars(&cleaned).map(|c| c.to_string()).collect()
    } else {
        words(cleaned.trim()).map(str::to_lowercase).collect()
    }
}

/// Token count saturated into the stored width.
pub fn token_count_u32(text: &str, cjk_mode: bool) -> u32 {
    u32::try_from(count_tokens(text, cjk_mode)).unwrap_or(u32::MAX)
}
