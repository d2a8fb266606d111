use std::fmt;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::feed::{FeedUpdate, MessageFeed};
use super::insights::{local_insights, Insights, LocalInsights};
use crate::config::Config;
use crate::guard::rate_limit::{check_rate_limit_at, duplicate_window_start, RateLimitPolicy, SubmissionStatus};
use crate::guard::{validate, Rejection, Validation};
use crate::net::backend::{MessageCallback, NewSubmission, SentimentBackend, SentimentRow, Subscription};
use crate::poller::Poller;
use crate::render::animator::{plan_transitions, resting_poses, Transition};
use crate::render::layout::{RandomRotation, RotationSource};
use crate::render::{Canvas, CloudLayoutEngine, PlacedTerm};
use crate::text::sanitize::sanitize_message;
use crate::text::{aggregate, RankedTermSet};

/// Settings for one cloud session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub scope: String,
    pub canvas: Canvas,
    pub history_limit: usize,
    pub status_poll: Duration,
    pub policy: RateLimitPolicy,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            scope: config.scope.clone(),
            canvas: config.canvas,
            history_limit: config.history_limit,
            status_poll: config.status_poll,
            policy: RateLimitPolicy::default(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            scope: crate::config::DEFAULT_SCOPE.to_string(),
            canvas: Canvas::default(),
            history_limit: 100,
            status_poll: Duration::from_secs(30),
            policy: RateLimitPolicy::default(),
        }
    }
}

/// Messages from background work back to the session.
enum SessionEvent {
    History {
        fetch: u64,
        scope_generation: u64,
        result: Result<Vec<String>, String>,
    },
    Live {
        scope_generation: u64,
        text: String,
        id: Option<String>,
    },
    Status(SubmissionStatus),
}

/// Result of a submission attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Accepted(SentimentRow),
    Rejected(Rejection),
    RateLimited {
        status: SubmissionStatus,
        policy: RateLimitPolicy,
    },
    Duplicate,
    /// Backend failure or refusal. `rate_limited` marks backend-side limits.
    Failed { message: String, rate_limited: bool },
}

impl SubmitOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SubmitOutcome::Accepted(_))
    }
}

impl fmt::Display for SubmitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitOutcome::Accepted(_) => {
                f.write_str("Thanks for sharing! Your sentiment has been added to the word cloud.")
            }
            SubmitOutcome::Rejected(r) => write!(f, "{}", r),
            SubmitOutcome::RateLimited { policy, .. } if policy.window_minutes() == 60 => write!(
                f,
                "Rate limit exceeded. Maximum {} submissions per hour.",
                policy.max_per_window
            ),
            SubmitOutcome::RateLimited { policy, .. } => write!(
                f,
                "Rate limit exceeded. Maximum {} submissions per {} minutes.",
                policy.max_per_window,
                policy.window_minutes()
            ),
            SubmitOutcome::Duplicate => {
                f.write_str("You have already submitted this exact message recently.")
            }
            SubmitOutcome::Failed { message, .. } => f.write_str(message),
        }
    }
}

/// State owned by one word-cloud view.
///
/// Holds the message feed for the active scope, the live subscription, the
/// submitter's rate-limit status and the most recent layout. Background work
/// (history fetch, live feed, status polling) reports back over a channel;
/// call [`CloudSession::pump`] to apply what has arrived.
pub struct CloudSession<B: SentimentBackend> {
    backend: Arc<B>,
    settings: SessionSettings,
    user_key: String,

    // Bumped on every scope switch / history request. Results tagged with an
    // older value are discarded.
    scope_generation: u64,
    fetch_generation: u64,
    loading: bool,
    // Kept apart so a successful history load cannot hide a dead live feed.
    history_error: Option<String>,
    feed_error: Option<String>,

    feed: MessageFeed,
    terms: RankedTermSet,
    placements: Vec<PlacedTerm>,
    transitions: Vec<Transition>,
    dirty: bool,
    engine: CloudLayoutEngine,
    rotations: Box<dyn RotationSource + Send>,

    status: SubmissionStatus,
    events_tx: Sender<SessionEvent>,
    events_rx: Receiver<SessionEvent>,
    subscription: Option<Subscription>,
    status_poller: Option<Poller>,
}

impl<B: SentimentBackend> CloudSession<B> {
    pub fn new(backend: Arc<B>, user_key: impl Into<String>, settings: SessionSettings) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        Self {
            backend,
            user_key: user_key.into(),
            scope_generation: 0,
            fetch_generation: 0,
            loading: false,
            history_error: None,
            feed_error: None,
            feed: MessageFeed::new(settings.history_limit),
            terms: RankedTermSet::empty(),
            placements: Vec::new(),
            transitions: Vec::new(),
            dirty: false,
            engine: CloudLayoutEngine::new(settings.canvas),
            rotations: Box::new(RandomRotation::with_rng(StdRng::from_entropy())),
            status: SubmissionStatus::lenient_default(&settings.policy),
            events_tx,
            events_rx,
            subscription: None,
            status_poller: None,
            settings,
        }
    }

    /// Replace the orientation source used by later layouts.
    pub fn with_rotations(mut self, rotations: Box<dyn RotationSource + Send>) -> Self {
        self.rotations = rotations;
        self
    }

    /// Start the history fetch and the live subscription for the current scope.
    pub fn open(&mut self) {
        self.load_history();
        self.subscribe_live();
    }

    /// Fetch recent messages in the background. Any fetch still in flight is
    /// superseded.
    pub fn load_history(&mut self) {
        self.fetch_generation += 1;
        self.loading = true;

        let backend = Arc::clone(&self.backend);
        let scope = self.settings.scope.clone();
        let limit = self.settings.history_limit;
        let tx = self.events_tx.clone();
        let fetch = self.fetch_generation;
        let scope_generation = self.scope_generation;

        log::info!("loading history for '{}'", scope);
        let spawned = thread::Builder::new()
            .name("history".into())
            .spawn(move || {
                let result = backend
                    .fetch_recent_messages(&scope, limit)
                    .map_err(|e| e.to_string());
                let _ = tx.send(SessionEvent::History {
                    fetch,
                    scope_generation,
                    result,
                });
            });

        if let Err(e) = spawned {
            self.loading = false;
            self.history_error = Some(format!("Cannot start history fetch: {}", e));
        }
    }

    fn subscribe_live(&mut self) {
        // Dropping the old handle unsubscribes it.
        self.subscription = None;

        let tx = self.events_tx.clone();
        let scope_generation = self.scope_generation;
        let on_message: MessageCallback = Box::new(move |row: SentimentRow| {
            let _ = tx.send(SessionEvent::Live {
                scope_generation,
                text: row.sentiment_text,
                id: row.id,
            });
        });

        match self.backend.subscribe(&self.settings.scope, on_message) {
            Ok(subscription) => {
                self.subscription = Some(subscription);
                self.feed_error = None;
            }
            Err(e) => {
                log::warn!("live feed unavailable: {}", e);
                self.feed_error = Some(e.to_string());
            }
        }
    }

    /// Move to another scope. Pending history for the old scope is abandoned
    /// and its subscription released.
    pub fn switch_scope(&mut self, scope: &str) {
        if scope == self.settings.scope {
            return;
        }
        log::info!("switching scope '{}' -> '{}'", self.settings.scope, scope);
        self.subscription = None;
        self.scope_generation += 1;
        self.settings.scope = scope.to_string();
        self.feed.clear();
        self.history_error = None;
        self.feed_error = None;
        self.dirty = true;
        self.open();
    }

    /// Apply every event that has arrived. Returns how many changed state.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            if self.apply(event) {
                applied += 1;
            }
        }
        applied
    }

    /// Block until the current history fetch resolves or `timeout` passes.
    pub fn wait_for_history(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.loading {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            match self.events_rx.recv_timeout(remaining) {
                Ok(event) => {
                    self.apply(event);
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return false,
            }
        }
        self.pump();
        true
    }

    /// Block until at least one event changes state or `timeout` passes.
    pub fn wait_for_update(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            match self.events_rx.recv_timeout(remaining) {
                Ok(event) => {
                    if self.apply(event) {
                        self.pump();
                        return true;
                    }
                }
                Err(_) => return false,
            }
        }
    }

    fn apply(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::History {
                fetch,
                scope_generation,
                result,
            } => {
                if fetch != self.fetch_generation || scope_generation != self.scope_generation {
                    log::debug!("discarding stale history result");
                    return false;
                }
                self.loading = false;
                match result {
                    Ok(texts) => {
                        let clean: Vec<String> =
                            texts.iter().filter_map(|t| sanitize_message(t)).collect();
                        log::info!("history loaded: {} messages", clean.len());
                        self.feed.merge(FeedUpdate::History(clean));
                        self.history_error = None;
                        self.dirty = true;
                    }
                    Err(message) => {
                        // Keep whatever is already displayed.
                        log::warn!("history fetch failed: {}", message);
                        self.history_error = Some(message);
                    }
                }
                true
            }
            SessionEvent::Live {
                scope_generation,
                text,
                id,
            } => {
                if scope_generation != self.scope_generation {
                    return false;
                }
                let Some(text) = sanitize_message(&text) else {
                    return false;
                };
                log::debug!("live message received");
                if self.feed.merge(FeedUpdate::Live { text, id }) {
                    self.dirty = true;
                }
                true
            }
            SessionEvent::Status(status) => {
                self.status = status;
                true
            }
        }
    }

    fn refresh(&mut self) {
        if !self.dirty {
            return;
        }
        self.terms = aggregate(&self.feed.texts());
        let previous = resting_poses(&self.placements);
        let placements = self
            .engine
            .layout(&self.terms, Some(&previous), self.rotations.as_mut());
        self.transitions = plan_transitions(&previous, &placements);
        self.placements = placements;
        self.dirty = false;
    }

    /// Ranked terms for the messages currently held.
    pub fn terms(&mut self) -> &RankedTermSet {
        self.refresh();
        &self.terms
    }

    /// Placements of the latest layout pass.
    pub fn placements(&mut self) -> &[PlacedTerm] {
        self.refresh();
        &self.placements
    }

    /// Transitions from the previous layout pass to the latest one.
    pub fn transitions(&mut self) -> &[Transition] {
        self.refresh();
        &self.transitions
    }

    /// Validate, check limits and store a submission.
    ///
    /// The submitter's status is refreshed after every attempt.
    pub fn submit(&mut self, text: &str, name: Option<&str>) -> SubmitOutcome {
        let outcome = self.try_submit(text, name);
        match &outcome {
            SubmitOutcome::Accepted(_) => log::info!("submission accepted"),
            other => log::info!("submission not stored: {}", other),
        }
        self.refresh_status();
        outcome
    }

    fn try_submit(&mut self, text: &str, name: Option<&str>) -> SubmitOutcome {
        // Rules apply to what would be stored, so markup cannot hide a
        // short or spammy message.
        let clean_text = sanitize_message(text.trim())
            .map(|t| t.trim().to_string())
            .unwrap_or_default();
        let clean_name = name
            .and_then(|n| sanitize_message(n.trim()))
            .map(|n| n.trim().to_string());
        if let Validation::Rejected(rejection) = validate(&clean_text, clean_name.as_deref()) {
            return SubmitOutcome::Rejected(rejection);
        }

        let now = Utc::now();
        let policy = self.settings.policy;
        let times = match self
            .backend
            .submission_times_since(&self.user_key, policy.window_start(now))
        {
            Ok(times) => times,
            Err(e) => {
                log::warn!("rate limit lookup failed: {}", e);
                return failed("Unable to verify submission limits.");
            }
        };
        let status = check_rate_limit_at(&times, &policy, now);
        if !status.can_submit {
            return SubmitOutcome::RateLimited { status, policy };
        }

        match self
            .backend
            .has_submitted_since(&self.user_key, &clean_text, duplicate_window_start(now))
        {
            Ok(true) => return SubmitOutcome::Duplicate,
            Ok(false) => {}
            Err(e) => {
                log::warn!("duplicate lookup failed: {}", e);
                return failed("Unable to verify content uniqueness.");
            }
        }

        let submission = NewSubmission {
            sentiment_text: clean_text.clone(),
            contributor_name: clean_name,
            project_name: self.settings.scope.clone(),
            user_ip_hash: self.user_key.clone(),
        };
        match self.backend.insert_message(&submission) {
            Ok(row) => {
                self.feed.merge(FeedUpdate::Local {
                    text: clean_text,
                    submitted_at: now,
                });
                self.dirty = true;
                SubmitOutcome::Accepted(row)
            }
            Err(e) if e.is_rejection() => SubmitOutcome::Failed {
                message: e.to_string(),
                rate_limited: true,
            },
            Err(e) => {
                log::warn!("insert failed: {}", e);
                failed("Unable to submit right now. Please try again later.")
            }
        }
    }

    /// Look up the submitter's status now.
    pub fn refresh_status(&mut self) -> SubmissionStatus {
        self.status = current_status(&*self.backend, &self.user_key, &self.settings.policy);
        self.status
    }

    /// Refresh the status on a fixed interval until stopped.
    pub fn start_status_polling(&mut self) -> std::io::Result<()> {
        self.stop_status_polling();
        let backend = Arc::clone(&self.backend);
        let user_key = self.user_key.clone();
        let policy = self.settings.policy;
        let tx = self.events_tx.clone();
        let poller = Poller::start("status", self.settings.status_poll, move || {
            let status = current_status(&*backend, &user_key, &policy);
            let _ = tx.send(SessionEvent::Status(status));
        })?;
        self.status_poller = Some(poller);
        Ok(())
    }

    pub fn stop_status_polling(&mut self) {
        if let Some(mut poller) = self.status_poller.take() {
            poller.stop();
        }
    }

    pub fn is_status_polling(&self) -> bool {
        self.status_poller.is_some()
    }

    /// Local statistics, plus the backend summary when `with_backend` is set
    /// and the lookup succeeds.
    pub fn insights(&mut self, with_backend: bool) -> Insights {
        self.refresh();
        let local = self.local_insights();
        let backend = if with_backend {
            self.backend
                .fetch_insights(&self.settings.scope)
                .map_err(|e| log::warn!("insights unavailable: {}", e))
                .ok()
        } else {
            None
        };
        Insights { local, backend }
    }

    fn local_insights(&self) -> LocalInsights {
        local_insights(&self.feed.texts(), &self.terms)
    }

    /// Release the live subscription and stop polling.
    pub fn close(&mut self) {
        self.stop_status_polling();
        self.subscription = None;
    }

    pub fn scope(&self) -> &str {
        &self.settings.scope
    }

    pub fn user_key(&self) -> &str {
        &self.user_key
    }

    /// Outstanding backend failure. A live-feed failure is reported first
    /// and only cleared by a successful subscribe; a history failure is
    /// cleared by the next successful history load.
    pub fn error(&self) -> Option<&str> {
        self.feed_error.as_deref().or(self.history_error.as_deref())
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.as_ref().is_some_and(Subscription::is_active)
    }

    pub fn status(&self) -> SubmissionStatus {
        self.status
    }

    pub fn feed(&self) -> &MessageFeed {
        &self.feed
    }
}

impl<B: SentimentBackend> Drop for CloudSession<B> {
    fn drop(&mut self) {
        self.close();
    }
}

fn failed(message: &str) -> SubmitOutcome {
    SubmitOutcome::Failed {
        message: message.to_string(),
        rate_limited: false,
    }
}

/// Status from the backend, or the lenient default when the lookup fails.
fn current_status<B: SentimentBackend + ?Sized>(
    backend: &B,
    user_key: &str,
    policy: &RateLimitPolicy,
) -> SubmissionStatus {
    let now: DateTime<Utc> = Utc::now();
    match backend.submission_times_since(user_key, policy.window_start(now)) {
        Ok(times) => check_rate_limit_at(&times, policy, now),
        Err(e) => {
            log::warn!("status lookup failed, assuming submissions allowed: {}", e);
            SubmissionStatus::lenient_default(policy)
        }
    }
}
