//! Statistics derived from the messages currently held.

use std::collections::HashSet;

use serde::Serialize;

use crate::net::InsightsSummary;
use crate::text::RankedTermSet;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalInsights {
    /// Terms in the ranked set.
    pub active_words: usize,
    /// Distinct message texts, a stand-in for distinct contributors.
    pub distinct_messages: usize,
    pub total_messages: usize,
    pub total_words: usize,
    pub avg_words_per_message: f64,
}

/// Insights from local data plus the backend summary when available.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insights {
    pub local: LocalInsights,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<InsightsSummary>,
}

pub fn local_insights(messages: &[&str], terms: &RankedTermSet) -> LocalInsights {
    let distinct: HashSet<&str> = messages.iter().copied().collect();
    let total_words: usize = messages.iter().map(|m| m.split_whitespace().count()).sum();
    let avg = if messages.is_empty() {
        0.0
    } else {
        total_words as f64 / messages.len() as f64
    };
    LocalInsights {
        active_words: terms.len(),
        distinct_messages: distinct.len(),
        total_messages: messages.len(),
        total_words,
        avg_words_per_message: avg,
    }
}
