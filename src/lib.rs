pub mod config;
pub mod error;
pub mod poller;

// Term Aggregator
pub mod text;

// Cloud Layout Engine
pub mod render;

// Submission Guard
pub mod guard;

pub mod net;
pub mod engine;
