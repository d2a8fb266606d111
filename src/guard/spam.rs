//! Spam heuristics for free-text submissions and display names.
//!
//! Checked in a fixed order; the first matching pattern is reported.

use crate::text::lexicon::{is_spam_keyword, URL_MARKERS};

/// Identical non-space characters in a row that count as spam.
pub const REPEATED_CHAR_RUN: usize = 8;
/// Consecutive uppercase ASCII letters that count as shouting.
pub const CAPS_RUN: usize = 12;
/// Consecutive digits that count as spam.
pub const DIGIT_RUN: usize = 10;
/// Back-to-back copies of a phrase that count as spam.
pub const PHRASE_REPEATS: usize = 5;
/// Shortest phrase considered by the repeated-phrase check.
pub const MIN_PHRASE_LEN: usize = 2;

/// Why a text was classified as spam.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpamPattern {
    RepeatedCharacter,
    UrlLike,
    RepeatedPhrase,
    ExcessiveCaps,
    DigitRun,
    Keyword,
}

/// First spam pattern matched by `text`, if any.
pub fn detect_spam(text: &str) -> Option<SpamPattern> {
    let chars: Vec<char> = text.chars().collect();

    if has_repeated_char_run(&chars) {
        return Some(SpamPattern::RepeatedCharacter);
    }
    if has_url_marker(text) {
        return Some(SpamPattern::UrlLike);
    }
    if has_repeated_phrase(&chars) {
        return Some(SpamPattern::RepeatedPhrase);
    }
    if longest_run(&chars, |c| c.is_ascii_uppercase()) >= CAPS_RUN {
        return Some(SpamPattern::ExcessiveCaps);
    }
    if longest_run(&chars, |c| c.is_ascii_digit()) >= DIGIT_RUN {
        return Some(SpamPattern::DigitRun);
    }
    if has_spam_keyword(text) {
        return Some(SpamPattern::Keyword);
    }
    None
}

#[inline]
pub fn is_spam(text: &str) -> bool {
    detect_spam(text).is_some()
}

fn has_repeated_char_run(chars: &[char]) -> bool {
    let mut run = 0;
    let mut prev: Option<char> = None;
    for &c in chars {
        if c.is_whitespace() {
            run = 0;
            prev = None;
            continue;
        }
        run = if prev == Some(c) { run + 1 } else { 1 };
        if run >= REPEATED_CHAR_RUN {
            return true;
        }
        prev = Some(c);
    }
    false
}

fn has_url_marker(text: &str) -> bool {
    let lower = text.to_lowercase();
    URL_MARKERS.iter().any(|m| lower.contains(m))
}

/// A block of length `p` repeated back to back `PHRASE_REPEATS` times means
/// `chars[j] == chars[j + p]` holds for `(PHRASE_REPEATS - 1) * p` positions in a row.
fn has_repeated_phrase(chars: &[char]) -> bool {
    let n = chars.len();
    for p in MIN_PHRASE_LEN..=n / PHRASE_REPEATS {
        let needed = (PHRASE_REPEATS - 1) * p;
        let mut run = 0;
        for j in 0..n - p {
            if chars[j] == chars[j + p] {
                run += 1;
                if run >= needed {
                    return true;
                }
            } else {
                run = 0;
            }
        }
    }
    false
}

fn longest_run(chars: &[char], pred: impl Fn(char) -> bool) -> usize {
    let mut best = 0;
    let mut run = 0;
    for &c in chars {
        run = if pred(c) { run + 1 } else { 0 };
        best = best.max(run);
    }
    best
}

fn has_spam_keyword(text: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .any(|w| is_spam_keyword(&w.to_lowercase()))
}
