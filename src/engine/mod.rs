//! Session state: message feed, live updates, submissions and insights.

pub mod feed;
pub mod insights;
pub mod session;

pub use feed::{FeedUpdate, MessageEntry, MessageFeed};
pub use insights::{Insights, LocalInsights};
pub use session::{CloudSession, SessionSettings, SubmitOutcome};
