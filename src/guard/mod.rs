//! Submission Guard: content validation, spam heuristics and rate limits.

pub mod rate_limit;
pub mod spam;
pub mod validate;

pub use rate_limit::{check_rate_limit, check_rate_limit_at, RateLimitPolicy, SubmissionStatus};
pub use validate::{validate, Rejection, Validation};
