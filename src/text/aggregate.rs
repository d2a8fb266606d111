//! Term aggregation: raw messages → ranked, capped term-frequency table.
//!
//! The table is always rebuilt from the full message list. Messages are
//! tokenized in parallel, then counted sequentially so that ties keep the
//! order in which terms were first seen.

use std::collections::HashMap;
use std::ops::Deref;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::lexicon::is_stop_word;

/// Maximum number of terms kept in a ranked set.
pub const MAX_TERMS: usize = 50;

/// Minimum term length, in characters.
pub const MIN_TERM_LEN: usize = 3;

/// Trailing contraction suffixes, in stripping priority. At most one is
/// removed per token.
const CONTRACTION_SUFFIXES: &[&str] = &["'t", "'re", "'ve", "'ll", "'d", "'s"];

/// A normalized term and how many times it occurred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermRecord {
    pub term: String,
    pub frequency: u32,
}

impl TermRecord {
    pub fn new(term: impl Into<String>, frequency: u32) -> Self {
        Self {
            term: term.into(),
            frequency,
        }
    }
}

/// Terms sorted by descending frequency (stable on first-seen order),
/// at most [`MAX_TERMS`] long, without duplicate terms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RankedTermSet {
    terms: Vec<TermRecord>,
}

impl RankedTermSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Lowest and highest frequency in the set, if any.
    pub fn frequency_range(&self) -> Option<(u32, u32)> {
        let min = self.terms.iter().map(|t| t.frequency).min()?;
        let max = self.terms.iter().map(|t| t.frequency).max()?;
        Some((min, max))
    }

    pub fn get(&self, term: &str) -> Option<&TermRecord> {
        self.terms.iter().find(|t| t.term == term)
    }

    pub fn into_vec(self) -> Vec<TermRecord> {
        self.terms
    }
}

impl Deref for RankedTermSet {
    type Target = [TermRecord];

    fn deref(&self) -> &Self::Target {
        &self.terms
    }
}

impl<'a> IntoIterator for &'a RankedTermSet {
    type Item = &'a TermRecord;
    type IntoIter = std::slice::Iter<'a, TermRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.terms.iter()
    }
}

/// Build the ranked term set for a list of messages.
///
/// Total: empty input, or input made only of stop words and short tokens,
/// yields an empty set.
pub fn aggregate<S>(messages: &[S]) -> RankedTermSet
where
    S: AsRef<str> + Sync,
{
    let tokenized: Vec<Vec<String>> = messages
        .par_iter()
        .map(|m| normalize_message(m.as_ref()))
        .collect();

    let mut index: HashMap<String, usize> = HashMap::new();
    let mut terms: Vec<TermRecord> = Vec::new();

    for token in tokenized.into_iter().flatten() {
        match index.get(&token) {
            Some(&i) => terms[i].frequency += 1,
            None => {
                index.insert(token.clone(), terms.len());
                terms.push(TermRecord::new(token, 1));
            }
        }
    }

    // `sort_by` is stable: equal frequencies keep first-seen order.
    terms.sort_by(|a, b| b.frequency.cmp(&a.frequency));
    terms.truncate(MAX_TERMS);

    log::trace!("aggregated {} messages into {} terms", messages.len(), terms.len());
    RankedTermSet { terms }
}

/// Normalize one message into the terms it contributes, in order.
pub fn normalize_message(message: &str) -> Vec<String> {
    let lowered = message.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| if is_kept_char(c) { c } else { ' ' })
        .collect();

    strip_numeric_runs(&cleaned)
        .split_whitespace()
        .filter_map(normalize_token)
        .collect()
}

/// True if `word` may appear in a ranked set.
pub fn is_valid_term(word: &str) -> bool {
    word.chars().count() >= MIN_TERM_LEN
        && word.chars().any(|c| c.is_ascii_alphabetic())
        && !is_stop_word(word)
}

#[inline]
fn is_kept_char(c: char) -> bool {
    matches!(c, 'a'..='z' | '0'..='9' | '\'' | '-' | ' ')
}

/// Blank out every alphanumeric run that contains a digit.
fn strip_numeric_runs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut run = String::new();
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            run.push(c);
            continue;
        }
        flush_run(&mut out, &mut run);
        out.push(c);
    }
    flush_run(&mut out, &mut run);
    out
}

fn flush_run(out: &mut String, run: &mut String) {
    if run.bytes().any(|b| b.is_ascii_digit()) {
        out.push(' ');
    } else {
        out.push_str(run);
    }
    run.clear();
}

fn normalize_token(token: &str) -> Option<String> {
    let trimmed = token.trim_matches(|c| c == '\'' || c == '-');
    let stem = strip_contraction(trimmed);
    is_valid_term(stem).then(|| stem.to_string())
}

fn strip_contraction(token: &str) -> &str {
    CONTRACTION_SUFFIXES
        .iter()
        .find_map(|suffix| token.strip_suffix(suffix))
        .unwrap_or(token)
}
