//! Word lists shared by the term aggregator and the submission guard.
//!
//! There is exactly one stop-word table and one spam-keyword table in the
//! crate; every filter reads from here.

use std::collections::HashSet;
use std::sync::OnceLock;

/// Function words, pronouns, auxiliaries and generic fillers that never
/// become cloud terms. Entries are lowercase, already stripped of contraction
/// suffixes (`don't` is looked up as `don`).
pub const STOP_WORDS: &[&str] = &[
    // articles, conjunctions, prepositions
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of",
    "with", "by", "from", "into", "about", "after", "again", "against",
    "before", "between", "through", "during", "above", "below", "up", "down",
    "out", "off", "over", "under", "as", "than", "then", "if", "because",
    "while", "once", "nor", "not", "no",
    // auxiliaries and modals
    "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
    "do", "does", "did", "will", "would", "could", "should", "may", "might",
    "must", "can", "shall", "am",
    // pronouns and determiners
    "i", "you", "he", "she", "it", "we", "they", "me", "him", "her", "us",
    "them", "my", "your", "his", "hers", "its", "our", "their", "mine",
    "yours", "theirs", "this", "that", "these", "those", "all", "any", "both",
    "each", "few", "more", "most", "other", "some", "such", "same",
    "different", "much", "many", "less", "little",
    // adverbs and fillers
    "here", "there", "where", "when", "why", "how", "very", "really", "just",
    "so", "too", "also", "only", "even", "still", "well", "now", "far",
    "near", "back", "away", "around", "let", "like",
    // generic verbs
    "feel", "get", "got", "go", "going", "went", "come", "came", "take",
    "took", "make", "made", "see", "saw", "look", "looked", "know", "knew",
    "think", "thought", "say", "said", "tell", "told", "give", "gave",
    "find", "found", "use", "used", "work", "worked", "want", "wanted",
    "need", "needed", "try", "tried", "keep", "kept", "put", "set",
    // generic adjectives and ordinals
    "one", "two", "three", "first", "last", "new", "old", "good", "bad",
    "big", "small", "long", "short", "high", "low", "right", "left", "next",
    // contraction stems left after suffix stripping
    "don", "doesn", "didn", "won", "wouldn", "shouldn", "couldn", "mustn",
    "needn", "daren", "mightn", "shan", "haven", "hasn", "hadn", "isn",
    "aren", "wasn", "weren",
    // generic nouns
    "thing", "things", "something", "anything", "nothing", "everything",
    "someone", "anyone", "everyone", "somewhere", "anywhere", "everywhere",
    "way", "ways", "time", "times", "day", "days", "year", "years", "people",
    "person", "man", "woman", "child", "children", "place", "world", "life",
    "hand", "part", "end", "case", "fact", "lot", "bit", "kind", "sort",
    "type", "stuff",
];

/// Whole words that mark a message as low-effort or automated.
pub const SPAM_KEYWORDS: &[&str] = &[
    "spam", "bot", "test", "aaa", "bbb", "ccc", "ddd", "eee", "fff", "ggg",
    "hhh", "iii",
];

/// Substrings that indicate a link or domain inside free text.
pub const URL_MARKERS: &[&str] = &[
    "http", "www", ".com", ".net", ".org", ".co", ".io",
];

fn stop_word_set() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| STOP_WORDS.iter().copied().collect())
}

/// True if `word` (already lowercase) is a stop word.
#[inline]
pub fn is_stop_word(word: &str) -> bool {
    stop_word_set().contains(word)
}

/// True if `word` (already lowercase) is a spam keyword.
#[inline]
pub fn is_spam_keyword(word: &str) -> bool {
    SPAM_KEYWORDS.contains(&word)
}
