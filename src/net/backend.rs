//! Backend interface for message storage and the live feed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::poller::Poller;

/// One stored sentiment message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentRow {
    #[serde(default, deserialize_with = "id_as_string")]
    pub id: Option<String>,
    pub sentiment_text: String,
    #[serde(default)]
    pub contributor_name: Option<String>,
    #[serde(default)]
    pub project_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload. Column names match the stored row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewSubmission {
    pub sentiment_text: String,
    pub contributor_name: Option<String>,
    pub project_name: String,
    pub user_ip_hash: String,
}

/// Backend-computed statistics for a scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsightsSummary {
    pub total_words: u64,
    pub unique_contributors: u64,
    pub total_submissions: u64,
    pub avg_words_per_submission: f64,
}

/// Called once per newly inserted row in the subscribed scope.
pub type MessageCallback = Box<dyn Fn(SentimentRow) + Send + 'static>;

/// Owned live-feed subscription. Dropping it unsubscribes.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Subscription backed by a polling worker.
    pub fn polling(poller: Poller) -> Self {
        Self::new(move || drop(poller))
    }

    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }

    pub fn unsubscribe(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Storage and feed operations the cloud depends on.
///
/// Implementations must be shareable across threads: history fetches and
/// status polls run off the caller's thread.
pub trait SentimentBackend: Send + Sync + 'static {
    /// Texts of the newest `limit` messages in `scope`, newest first.
    fn fetch_recent_messages(&self, scope: &str, limit: usize) -> Result<Vec<String>, BackendError>;

    /// Store a submission. Backend refusals come back as `BackendError::Rejected`.
    fn insert_message(&self, submission: &NewSubmission) -> Result<SentimentRow, BackendError>;

    /// Deliver rows inserted into `scope` after this call.
    fn subscribe(&self, scope: &str, on_message: MessageCallback) -> Result<Subscription, BackendError>;

    fn fetch_insights(&self, scope: &str) -> Result<InsightsSummary, BackendError>;

    /// Creation times of `user_key`'s submissions since `since`.
    fn submission_times_since(
        &self,
        user_key: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, BackendError>;

    /// Whether `user_key` submitted exactly `text` since `since`.
    fn has_submitted_since(
        &self,
        user_key: &str,
        text: &str,
        since: DateTime<Utc>,
    ) -> Result<bool, BackendError>;
}

// Row ids are uuids on some deployments and bigints on others.
fn id_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn row_accepts_numeric_and_string_ids() {
        let numeric: SentimentRow = serde_json::from_str(
            r#"{"id": 42, "sentiment_text": "great vibes", "created_at": "2025-03-01T12:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(numeric.id.as_deref(), Some("42"));
        assert_eq!(numeric.contributor_name, None);

        let uuid: SentimentRow = serde_json::from_str(
            r#"{"id": "a1b2", "sentiment_text": "x y", "contributor_name": "Ada",
                "project_name": "Magic Newton", "created_at": "2025-03-01T12:00:00.123+00:00"}"#,
        )
        .unwrap();
        assert_eq!(uuid.id.as_deref(), Some("a1b2"));
        assert_eq!(uuid.project_name.as_deref(), Some("Magic Newton"));
    }

    #[test]
    fn insights_tolerate_missing_fields() {
        let summary: InsightsSummary = serde_json::from_str(r#"{"total_words": 12}"#).unwrap();
        assert_eq!(summary.total_words, 12);
        assert_eq!(summary.total_submissions, 0);
    }

    #[test]
    fn subscription_cancels_once_on_drop() {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let mut sub = Subscription::new(move || {
            assert!(!flag.swap(true, Ordering::SeqCst));
        });
        assert!(sub.is_active());
        sub.unsubscribe();
        assert!(!sub.is_active());
        drop(sub);
        assert!(cancelled.load(Ordering::SeqCst));
    }
}
