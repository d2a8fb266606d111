//! Submission validation.
//!
//! Rules run in a fixed order and the first failing rule decides the
//! rejection reason:
//! 1. empty after trimming
//! 2. fewer than 5 characters after trimming
//! 3. more than 500 characters (untrimmed)
//! 4. fewer than 2 whitespace-separated words
//! 5. spam pattern in the message
//! 6. display name, when given: more than 50 characters, then spam
//!
//! Lengths are counted in characters, not bytes.

use std::fmt;

use super::spam::{detect_spam, SpamPattern};

pub const MIN_MESSAGE_CHARS: usize = 5;
pub const MAX_MESSAGE_CHARS: usize = 500;
pub const MIN_WORDS: usize = 2;
pub const MAX_NAME_CHARS: usize = 50;

/// Why a submission was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Empty,
    TooShort,
    TooLong,
    TooFewWords,
    Spam(SpamPattern),
    NameTooLong,
    InvalidName(SpamPattern),
}

impl Rejection {
    /// Human-readable reason shown to the submitter.
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::Empty => "Please enter your thoughts",
            Rejection::TooShort => "Message too short (min 5 characters)",
            Rejection::TooLong => "Message too long (max 500 characters)",
            Rejection::TooFewWords => "Please write at least 2 words.",
            Rejection::Spam(_) => "Please write a genuine message without spam content.",
            Rejection::NameTooLong => "Name too long (max 50 characters)",
            Rejection::InvalidName(_) => "Please enter a valid name.",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    Accepted,
    Rejected(Rejection),
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validation::Accepted)
    }

    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            Validation::Accepted => None,
            Validation::Rejected(r) => Some(*r),
        }
    }

    /// Reason text, `None` when accepted.
    pub fn reason(&self) -> Option<&'static str> {
        self.rejection().map(|r| r.reason())
    }
}

/// Validate a message and optional display name.
pub fn validate(text: &str, name: Option<&str>) -> Validation {
    match first_rejection(text, name) {
        Some(r) => {
            log::debug!("submission rejected: {:?}", r);
            Validation::Rejected(r)
        }
        None => Validation::Accepted,
    }
}

fn first_rejection(text: &str, name: Option<&str>) -> Option<Rejection> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Some(Rejection::Empty);
    }
    if trimmed.chars().count() < MIN_MESSAGE_CHARS {
        return Some(Rejection::TooShort);
    }
    if text.chars().count() > MAX_MESSAGE_CHARS {
        return Some(Rejection::TooLong);
    }
    if trimmed.split_whitespace().count() < MIN_WORDS {
        return Some(Rejection::TooFewWords);
    }
    if let Some(pattern) = detect_spam(trimmed) {
        return Some(Rejection::Spam(pattern));
    }

    let name = name.map(str::trim).filter(|n| !n.is_empty())?;
    if name.chars().count() > MAX_NAME_CHARS {
        return Some(Rejection::NameTooLong);
    }
    detect_spam(name).map(Rejection::InvalidName)
}
