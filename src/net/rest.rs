//! Blocking REST backend for a PostgREST-style managed database.
//!
//! Messages live in `community_sentiment`, per-scope statistics in the
//! `community_insights` view. The live feed polls for rows at or after the
//! newest one delivered, starting from the newest row stored when the
//! subscription opens.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use super::backend::{
    InsightsSummary, MessageCallback, NewSubmission, SentimentBackend, SentimentRow, Subscription,
};
use crate::error::BackendError;
use crate::poller::Poller;

const MESSAGES_TABLE: &str = "community_sentiment";
const INSIGHTS_VIEW: &str = "community_insights";
/// Rows fetched per live-feed poll.
const FEED_BATCH: usize = 50;

#[derive(Clone)]
pub struct RestBackend {
    client: Client,
    base: Url,
    key: String,
    feed_poll: Duration,
}

/// Error body returned by the database gateway.
#[derive(Deserialize)]
struct GatewayError {
    message: Option<String>,
    code: Option<String>,
}

#[derive(Deserialize)]
struct TextOnly {
    sentiment_text: String,
}

#[derive(Deserialize)]
struct CreatedOnly {
    created_at: DateTime<Utc>,
}

impl RestBackend {
    pub fn new(base: Url, key: &str, feed_poll: Duration) -> Result<Self, BackendError> {
        if key.trim().is_empty() {
            return Err(BackendError::Config("empty API key".into()));
        }
        let client = Client::builder()
            .user_agent(concat!("sentiment-cloud/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            base: with_trailing_slash(base),
            key: key.to_string(),
            feed_poll,
        })
    }

    fn endpoint(&self, relation: &str) -> Result<Url, BackendError> {
        self.base
            .join(&format!("rest/v1/{}", relation))
            .map_err(|e| BackendError::Config(format!("bad endpoint: {}", e)))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("apikey", &self.key).bearer_auth(&self.key)
    }

    fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, BackendError> {
        let response = self
            .authorized(self.client.get(url))
            .header("Accept", "application/json")
            .send()?;
        decode(response)
    }

    fn feed_url(&self, scope: &str, cursor: &FeedCursor) -> Result<Url, BackendError> {
        let mut url = self.endpoint(MESSAGES_TABLE)?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("select", ROW_COLUMNS)
                .append_pair("project_name", &format!("eq.{}", scope));
            if let Some(at) = cursor.at {
                // Stored timestamps carry microseconds; anything coarser
                // would re-read rows older than the cursor.
                let since = at.to_rfc3339_opts(SecondsFormat::Micros, true);
                query.append_pair("created_at", &format!("gte.{}", since));
            }
            query
                .append_pair("order", "created_at.asc,id.asc")
                .append_pair("limit", &cursor.batch_size().to_string());
        }
        Ok(url)
    }

    /// Cursor positioned after the newest rows currently stored for `scope`.
    fn feed_start(&self, scope: &str) -> Result<FeedCursor, BackendError> {
        let mut url = self.endpoint(MESSAGES_TABLE)?;
        url.query_pairs_mut()
            .append_pair("select", ROW_COLUMNS)
            .append_pair("project_name", &format!("eq.{}", scope))
            .append_pair("order", "created_at.desc")
            .append_pair("limit", &FEED_BATCH.to_string());
        let newest: Vec<SentimentRow> = self.get_json(url)?;
        Ok(FeedCursor::after(newest))
    }

    fn poll_feed(&self, scope: &str, cursor: &mut FeedCursor) -> Result<Vec<SentimentRow>, BackendError> {
        let rows: Vec<SentimentRow> = self.get_json(self.feed_url(scope, cursor)?)?;
        Ok(cursor.accept(rows))
    }
}

const ROW_COLUMNS: &str = "id,sentiment_text,contributor_name,project_name,created_at";

/// Live-feed position: the newest `created_at` delivered and the rows
/// delivered at exactly that instant.
///
/// Polling with `gte` and skipping the rows already seen at the boundary
/// keeps rows that share a timestamp across two batches. The position
/// comes from server timestamps only, so the local clock never matters.
#[derive(Debug, Default)]
struct FeedCursor {
    at: Option<DateTime<Utc>>,
    seen: HashSet<String>,
}

impl FeedCursor {
    /// Cursor past `rows`, in any order. Empty input starts from the beginning.
    fn after(rows: Vec<SentimentRow>) -> Self {
        let mut cursor = FeedCursor::default();
        let Some(newest) = rows.iter().map(|r| r.created_at).max() else {
            return cursor;
        };
        cursor.at = Some(newest);
        cursor.seen = rows
            .iter()
            .filter(|r| r.created_at == newest)
            .map(row_key)
            .collect();
        cursor
    }

    /// Boundary rows come back on every poll, so the page grows with them.
    fn batch_size(&self) -> usize {
        FEED_BATCH + self.seen.len()
    }

    /// Rows not delivered before, in order. Expects ascending `created_at`.
    fn accept(&mut self, rows: Vec<SentimentRow>) -> Vec<SentimentRow> {
        rows.into_iter().filter(|row| self.advance(row)).collect()
    }

    fn advance(&mut self, row: &SentimentRow) -> bool {
        match self.at {
            Some(at) if row.created_at < at => false,
            Some(at) if row.created_at == at => self.seen.insert(row_key(row)),
            _ => {
                self.at = Some(row.created_at);
                self.seen.clear();
                self.seen.insert(row_key(row));
                true
            }
        }
    }
}

fn row_key(row: &SentimentRow) -> String {
    row.id
        .clone()
        .unwrap_or_else(|| format!("{}:{}", row.created_at.timestamp_micros(), row.sentiment_text))
}

impl SentimentBackend for RestBackend {
    fn fetch_recent_messages(&self, scope: &str, limit: usize) -> Result<Vec<String>, BackendError> {
        let mut url = self.endpoint(MESSAGES_TABLE)?;
        url.query_pairs_mut()
            .append_pair("select", "sentiment_text")
            .append_pair("project_name", &format!("eq.{}", scope))
            .append_pair("order", "created_at.desc")
            .append_pair("limit", &limit.to_string());
        let rows: Vec<TextOnly> = self.get_json(url)?;
        log::debug!("fetched {} messages for '{}'", rows.len(), scope);
        Ok(rows.into_iter().map(|r| r.sentiment_text).collect())
    }

    fn insert_message(&self, submission: &NewSubmission) -> Result<SentimentRow, BackendError> {
        let url = self.endpoint(MESSAGES_TABLE)?;
        let response = self
            .authorized(self.client.post(url))
            .header("Prefer", "return=representation")
            .json(submission)
            .send()?;
        let mut rows: Vec<SentimentRow> = decode(response)?;
        rows.pop()
            .ok_or_else(|| BackendError::Decode("insert returned no row".into()))
    }

    fn subscribe(&self, scope: &str, on_message: MessageCallback) -> Result<Subscription, BackendError> {
        let mut cursor = self.feed_start(scope)?;
        log::debug!("live feed for '{}' starts after {:?}", scope, cursor.at);
        let backend = self.clone();
        let scope = scope.to_string();
        let poller = Poller::start("feed", self.feed_poll, move || {
            match backend.poll_feed(&scope, &mut cursor) {
                Ok(rows) => {
                    for row in rows {
                        on_message(row);
                    }
                }
                Err(e) => log::warn!("live feed poll failed: {}", e),
            }
        })
        .map_err(|e| BackendError::Config(format!("cannot start feed worker: {}", e)))?;
        Ok(Subscription::polling(poller))
    }

    fn fetch_insights(&self, scope: &str) -> Result<InsightsSummary, BackendError> {
        let mut url = self.endpoint(INSIGHTS_VIEW)?;
        url.query_pairs_mut()
            .append_pair("select", "*")
            .append_pair("project_name", &format!("eq.{}", scope));
        let response = self
            .authorized(self.client.get(url))
            .header("Accept", "application/vnd.pgrst.object+json")
            .send()?;
        decode(response)
    }

    fn submission_times_since(
        &self,
        user_key: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, BackendError> {
        let mut url = self.endpoint(MESSAGES_TABLE)?;
        url.query_pairs_mut()
            .append_pair("select", "created_at")
            .append_pair("user_ip_hash", &format!("eq.{}", user_key))
            .append_pair("created_at", &format!("gte.{}", timestamp(since)))
            .append_pair("order", "created_at.asc");
        let rows: Vec<CreatedOnly> = self.get_json(url)?;
        Ok(rows.into_iter().map(|r| r.created_at).collect())
    }

    fn has_submitted_since(
        &self,
        user_key: &str,
        text: &str,
        since: DateTime<Utc>,
    ) -> Result<bool, BackendError> {
        let mut url = self.endpoint(MESSAGES_TABLE)?;
        url.query_pairs_mut()
            .append_pair("select", "id")
            .append_pair("user_ip_hash", &format!("eq.{}", user_key))
            .append_pair("sentiment_text", &format!("eq.{}", text))
            .append_pair("created_at", &format!("gte.{}", timestamp(since)))
            .append_pair("limit", "1");
        let rows: Vec<serde_json::Value> = self.get_json(url)?;
        Ok(!rows.is_empty())
    }
}

fn decode<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(error_from_body(status.as_u16(), &body));
    }
    response
        .json::<T>()
        .map_err(|e| BackendError::Decode(e.to_string()))
}

fn error_from_body(status: u16, body: &str) -> BackendError {
    let parsed: Option<GatewayError> = serde_json::from_str(body).ok();
    let code = parsed.as_ref().and_then(|e| e.code.clone());
    let message = parsed
        .and_then(|e| e.message)
        .unwrap_or_else(|| body.trim().to_string());
    BackendError::from_response(status, code.as_deref(), message)
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// Url::join replaces the last path segment unless the base ends in '/'.
fn with_trailing_slash(mut base: Url) -> Url {
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn backend(base: &str) -> RestBackend {
        RestBackend::new(Url::parse(base).unwrap(), "anon", Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn endpoints_keep_base_path() {
        let b = backend("https://db.example/project");
        assert_eq!(
            b.endpoint(MESSAGES_TABLE).unwrap().as_str(),
            "https://db.example/project/rest/v1/community_sentiment"
        );
        let root = backend("https://db.example");
        assert_eq!(
            root.endpoint(INSIGHTS_VIEW).unwrap().as_str(),
            "https://db.example/rest/v1/community_insights"
        );
    }

    #[test]
    fn empty_key_is_config_error() {
        let err = RestBackend::new(Url::parse("https://db.example").unwrap(), " ", Duration::from_secs(1));
        assert!(matches!(err, Err(BackendError::Config(_))));
    }

    #[test]
    fn gateway_errors_are_classified() {
        let err = error_from_body(
            400,
            r#"{"code":"P0001","message":"Rate limit exceeded. Please wait before submitting again."}"#,
        );
        assert_eq!(err.to_string(), "Rate limit exceeded. Please wait before submitting again.");
        assert!(err.is_rejection());

        let err = error_from_body(502, "bad gateway");
        assert_eq!(err.to_string(), "Backend returned 502: bad gateway");
    }

    fn row(id: &str, second: u32) -> SentimentRow {
        SentimentRow {
            id: Some(id.to_string()),
            sentiment_text: format!("message {}", id),
            contributor_name: None,
            project_name: None,
            created_at: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, second).unwrap(),
        }
    }

    fn ids(rows: &[SentimentRow]) -> Vec<&str> {
        rows.iter().filter_map(|r| r.id.as_deref()).collect()
    }

    #[test]
    fn rows_sharing_a_timestamp_survive_a_batch_boundary() {
        let mut cursor = FeedCursor::default();
        let first = cursor.accept(vec![row("1", 1), row("2", 2), row("3", 2)]);
        assert_eq!(ids(&first), vec!["1", "2", "3"]);

        // the next page starts at the boundary instant and repeats its rows
        let second = cursor.accept(vec![row("2", 2), row("3", 2), row("4", 2), row("5", 3)]);
        assert_eq!(ids(&second), vec!["4", "5"]);
        assert!(cursor.accept(vec![row("5", 3)]).is_empty());
    }

    #[test]
    fn feed_starts_after_newest_stored_rows() {
        // newest-first, as the start query returns them; the local clock is
        // never consulted, so a skewed client still sees row 9
        let mut cursor = FeedCursor::after(vec![row("7", 5), row("8", 5), row("6", 4)]);
        assert_eq!(cursor.at, Some(row("7", 5).created_at));
        let fresh = cursor.accept(vec![row("7", 5), row("8", 5), row("9", 5), row("10", 6)]);
        assert_eq!(ids(&fresh), vec!["9", "10"]);
        assert!(cursor.accept(vec![row("6", 4)]).is_empty());

        let mut empty = FeedCursor::after(Vec::new());
        assert_eq!(ids(&empty.accept(vec![row("1", 0)])), vec!["1"]);
    }

    #[test]
    fn feed_query_uses_inclusive_micros_cursor() {
        let b = backend("https://db.example");
        let url = b.feed_url("Magic Newton", &FeedCursor::default()).unwrap();
        assert!(!url.query().unwrap_or_default().contains("created_at=gte"));

        let cursor = FeedCursor::after(vec![row("1", 30), row("2", 30)]);
        let url = b.feed_url("Magic Newton", &cursor).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("created_at".into(), "gte.2025-03-01T12:00:30.000000Z".into())));
        assert!(pairs.contains(&("limit".into(), (FEED_BATCH + 2).to_string())));
        assert!(pairs.contains(&("project_name".into(), "eq.Magic Newton".into())));
    }

    #[test]
    fn timestamps_are_utc_millis() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(timestamp(at), "2025-03-01T12:00:00.000Z");
    }
}
