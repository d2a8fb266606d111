pub mod backend;
pub mod identity;
pub mod rest;

pub use backend::{InsightsSummary, NewSubmission, SentimentBackend, SentimentRow, Subscription};
pub use rest::RestBackend;
