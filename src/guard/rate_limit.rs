//! Rolling-window submission limits.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_WINDOW_MINUTES: i64 = 60;
pub const DEFAULT_MAX_PER_WINDOW: u32 = 3;
/// The same text from the same user is refused within this window.
pub const DUPLICATE_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub window: Duration,
    pub max_per_window: u32,
}

impl RateLimitPolicy {
    pub fn new(window_minutes: i64, max_per_window: u32) -> Self {
        Self {
            window: Duration::minutes(window_minutes),
            max_per_window,
        }
    }

    /// Earliest timestamp still inside the window ending at `now`.
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.window
    }

    pub fn window_minutes(&self) -> i64 {
        self.window.num_minutes()
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_MINUTES, DEFAULT_MAX_PER_WINDOW)
    }
}

/// Whether a user may submit right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionStatus {
    pub can_submit: bool,
    pub remaining_submissions: u32,
    /// Set only when `can_submit` is false.
    pub next_allowed_at: Option<DateTime<Utc>>,
}

impl SubmissionStatus {
    /// Status assumed when the lookup itself fails.
    pub fn lenient_default(policy: &RateLimitPolicy) -> Self {
        Self {
            can_submit: true,
            remaining_submissions: policy.max_per_window,
            next_allowed_at: None,
        }
    }

    /// Time left until the next submission is allowed.
    pub fn wait_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.next_allowed_at
            .map(|at| at - now)
            .filter(|d| *d > Duration::zero())
    }
}

/// Rate-limit status against the current wall clock.
pub fn check_rate_limit(recent: &[DateTime<Utc>], policy: &RateLimitPolicy) -> SubmissionStatus {
    check_rate_limit_at(recent, policy, Utc::now())
}

/// Rate-limit status at `now`. Timestamps older than the window are ignored.
pub fn check_rate_limit_at(
    recent: &[DateTime<Utc>],
    policy: &RateLimitPolicy,
    now: DateTime<Utc>,
) -> SubmissionStatus {
    let start = policy.window_start(now);
    let in_window: Vec<DateTime<Utc>> = recent.iter().copied().filter(|t| *t >= start).collect();

    let used = u32::try_from(in_window.len()).unwrap_or(u32::MAX);
    let remaining = policy.max_per_window.saturating_sub(used);
    let can_submit = used < policy.max_per_window;

    let next_allowed_at = if can_submit {
        None
    } else {
        in_window.iter().min().map(|oldest| *oldest + policy.window)
    };

    SubmissionStatus {
        can_submit,
        remaining_submissions: remaining,
        next_allowed_at,
    }
}

/// Earliest timestamp inside the duplicate-submission window.
pub fn duplicate_window_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::hours(DUPLICATE_WINDOW_HOURS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, h, m, 0).unwrap()
    }

    #[test]
    fn no_history_allows_full_quota() {
        let status = check_rate_limit_at(&[], &RateLimitPolicy::default(), at(12, 0));
        assert_eq!(
            status,
            SubmissionStatus {
                can_submit: true,
                remaining_submissions: 3,
                next_allowed_at: None,
            }
        );
    }

    #[test]
    fn partial_window() {
        let status = check_rate_limit_at(&[at(11, 30)], &RateLimitPolicy::default(), at(12, 0));
        assert!(status.can_submit);
        assert_eq!(status.remaining_submissions, 2);
        assert_eq!(status.next_allowed_at, None);
    }

    #[test]
    fn full_window_reports_next_allowed() {
        let now = at(12, 0);
        let recent = [at(11, 50), at(11, 10), at(11, 30)];
        let status = check_rate_limit_at(&recent, &RateLimitPolicy::default(), now);
        assert!(!status.can_submit);
        assert_eq!(status.remaining_submissions, 0);
        // oldest in-window submission plus the window
        assert_eq!(status.next_allowed_at, Some(at(12, 10)));
        assert_eq!(status.wait_remaining(now), Some(Duration::minutes(10)));
    }

    #[test]
    fn old_timestamps_are_ignored() {
        let recent = [at(9, 0), at(10, 0), at(10, 59)];
        let status = check_rate_limit_at(&recent, &RateLimitPolicy::default(), at(12, 0));
        assert!(status.can_submit);
        assert_eq!(status.remaining_submissions, 3);
    }

    #[test]
    fn over_quota_saturates_at_zero() {
        let recent = [at(11, 1), at(11, 2), at(11, 3), at(11, 4)];
        let status = check_rate_limit_at(&recent, &RateLimitPolicy::new(60, 3), at(11, 30));
        assert_eq!(status.remaining_submissions, 0);
        assert_eq!(status.next_allowed_at, Some(at(12, 1)));
    }

    #[test]
    fn custom_policy_and_lenient_default() {
        let policy = RateLimitPolicy::new(10, 1);
        assert_eq!(policy.window_minutes(), 10);
        let status = check_rate_limit_at(&[at(11, 55)], &policy, at(12, 0));
        assert!(!status.can_submit);
        assert_eq!(status.next_allowed_at, Some(at(12, 5)));

        let lenient = SubmissionStatus::lenient_default(&RateLimitPolicy::default());
        assert!(lenient.can_submit);
        assert_eq!(lenient.remaining_submissions, 3);
    }

    #[test]
    fn duplicate_window_is_one_day() {
        assert_eq!(duplicate_window_start(at(12, 0)), at(12, 0) - Duration::hours(24));
    }

    #[test]
    fn status_serializes_camel_case() {
        let json = serde_json::to_value(SubmissionStatus::lenient_default(&RateLimitPolicy::default()))
            .unwrap();
        assert_eq!(json["canSubmit"], true);
        assert_eq!(json["remainingSubmissions"], 3);
        assert!(json["nextAllowedAt"].is_null());
    }
}
