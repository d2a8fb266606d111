//! In-memory message list, newest first.
//!
//! Every change goes through [`MessageFeed::merge`], so optimistic local
//! submissions and their later echo from the live feed reconcile in one place.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};

/// Default number of messages kept.
pub const FEED_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageEntry {
    /// Submitted locally, not yet seen on the live feed.
    Pending {
        text: String,
        submitted_at: DateTime<Utc>,
    },
    /// Known to be stored by the backend.
    Confirmed { text: String, id: Option<String> },
}

impl MessageEntry {
    pub fn text(&self) -> &str {
        match self {
            MessageEntry::Pending { text, .. } | MessageEntry::Confirmed { text, .. } => text,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, MessageEntry::Pending { .. })
    }

    fn id(&self) -> Option<&str> {
        match self {
            MessageEntry::Confirmed { id, .. } => id.as_deref(),
            MessageEntry::Pending { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedUpdate {
    /// Result of a historical fetch, newest first.
    History(Vec<String>),
    /// Row pushed by the live feed.
    Live { text: String, id: Option<String> },
    /// Accepted local submission.
    Local {
        text: String,
        submitted_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone)]
pub struct MessageFeed {
    entries: VecDeque<MessageEntry>,
    capacity: usize,
}

impl MessageFeed {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(FEED_CAPACITY)),
            capacity,
        }
    }

    /// Apply an update. Returns true if the visible text list changed.
    pub fn merge(&mut self, update: FeedUpdate) -> bool {
        match update {
            FeedUpdate::History(texts) => {
                self.merge_history(texts);
                true
            }
            FeedUpdate::Live { text, id } => self.merge_live(text, id),
            FeedUpdate::Local { text, submitted_at } => {
                self.entries
                    .push_front(MessageEntry::Pending { text, submitted_at });
                self.truncate();
                true
            }
        }
    }

    /// History replaces the list. Entries added since the fetch started are
    /// kept on top unless the history already contains them, in which case
    /// they take over the matching history slot. A pending entry stays
    /// pending there, so its live echo still confirms it.
    fn merge_history(&mut self, texts: Vec<String>) {
        let mut unclaimed: HashMap<&str, usize> = HashMap::new();
        for text in &texts {
            *unclaimed.entry(text.as_str()).or_insert(0) += 1;
        }

        let mut merged: VecDeque<MessageEntry> = VecDeque::with_capacity(self.capacity);
        let mut claimed: HashMap<String, VecDeque<MessageEntry>> = HashMap::new();
        for entry in self.entries.drain(..) {
            match unclaimed.get_mut(entry.text()) {
                Some(count) if *count > 0 => {
                    *count -= 1;
                    claimed
                        .entry(entry.text().to_string())
                        .or_default()
                        .push_back(entry);
                }
                _ => merged.push_back(entry),
            }
        }

        for text in texts {
            match claimed.get_mut(&text).and_then(VecDeque::pop_front) {
                Some(entry) => merged.push_back(entry),
                None => merged.push_back(MessageEntry::Confirmed { text, id: None }),
            }
        }
        self.entries = merged;
        self.truncate();
    }

    fn merge_live(&mut self, text: String, id: Option<String>) -> bool {
        if let Some(id) = id.as_deref() {
            if self.entries.iter().any(|e| e.id() == Some(id)) {
                log::debug!("ignoring repeated delivery of {}", id);
                return false;
            }
        }

        // Oldest pending copy is the one this echo confirms.
        let pending = self
            .entries
            .iter()
            .rposition(|e| e.is_pending() && e.text() == text);
        if let Some(pos) = pending {
            log::debug!("live echo confirmed a pending submission");
            self.entries[pos] = MessageEntry::Confirmed { text, id };
            return false;
        }

        self.entries.push_front(MessageEntry::Confirmed { text, id });
        self.truncate();
        true
    }

    fn truncate(&mut self) {
        self.entries.truncate(self.capacity);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> impl Iterator<Item = &MessageEntry> {
        self.entries.iter()
    }

    /// Message texts, newest first.
    pub fn texts(&self) -> Vec<&str> {
        self.entries.iter().map(MessageEntry::text).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_pending()).count()
    }
}

impl Default for MessageFeed {
    fn default() -> Self {
        Self::new(FEED_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live(text: &str, id: &str) -> FeedUpdate {
        FeedUpdate::Live {
            text: text.into(),
            id: Some(id.into()),
        }
    }

    fn local(text: &str) -> FeedUpdate {
        FeedUpdate::Local {
            text: text.into(),
            submitted_at: Utc::now(),
        }
    }

    #[test]
    fn live_messages_prepend() {
        let mut feed = MessageFeed::default();
        feed.merge(FeedUpdate::History(vec!["second one".into(), "first one".into()]));
        assert!(feed.merge(live("third one", "3")));
        assert_eq!(feed.texts(), vec!["third one", "second one", "first one"]);
    }

    #[test]
    fn echo_of_local_submission_is_not_double_counted() {
        let mut feed = MessageFeed::default();
        feed.merge(local("great project team"));
        assert_eq!(feed.pending_count(), 1);

        assert!(!feed.merge(live("great project team", "9")));
        assert_eq!(feed.len(), 1);
        assert_eq!(feed.pending_count(), 0);
    }

    #[test]
    fn repeated_delivery_is_ignored() {
        let mut feed = MessageFeed::default();
        feed.merge(live("hello there", "1"));
        assert!(!feed.merge(live("hello there", "1")));
        assert_eq!(feed.len(), 1);
        // same text under a new id is a new message
        assert!(feed.merge(live("hello there", "2")));
        assert_eq!(feed.len(), 2);
    }

    #[test]
    fn history_absorbs_entries_it_already_contains() {
        let mut feed = MessageFeed::default();
        feed.merge(live("arrived early", "5"));
        feed.merge(local("mine pending"));
        feed.merge(local("also mine"));

        feed.merge(FeedUpdate::History(vec![
            "arrived early".into(),
            "also mine".into(),
            "older".into(),
        ]));
        assert_eq!(feed.texts(), vec!["mine pending", "arrived early", "also mine", "older"]);
        assert_eq!(feed.pending_count(), 2);
        // the absorbed live row keeps its id
        assert!(!feed.merge(live("arrived early", "5")));
        assert_eq!(feed.len(), 4);
    }

    #[test]
    fn echo_after_history_confirms_pending_entry() {
        let mut feed = MessageFeed::default();
        feed.merge(local("great project team"));
        feed.merge(FeedUpdate::History(vec!["great project team".into()]));
        assert_eq!(feed.pending_count(), 1);

        assert!(!feed.merge(live("great project team", "9")));
        assert_eq!(feed.texts(), vec!["great project team"]);
        assert_eq!(feed.pending_count(), 0);
    }

    #[test]
    fn history_copies_beyond_local_ones_stay_separate() {
        let mut feed = MessageFeed::default();
        feed.merge(local("same words here"));
        feed.merge(FeedUpdate::History(vec![
            "same words here".into(),
            "same words here".into(),
        ]));
        assert_eq!(feed.len(), 2);
        assert_eq!(feed.pending_count(), 1);
    }

    #[test]
    fn capacity_keeps_newest() {
        let mut feed = MessageFeed::new(3);
        for i in 0..5 {
            feed.merge(live(&format!("message {}", i), &i.to_string()));
        }
        assert_eq!(feed.texts(), vec!["message 4", "message 3", "message 2"]);
    }
}
