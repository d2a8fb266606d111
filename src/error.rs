use thiserror::Error;

/// Failure talking to the sentiment backend.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Backend returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Unexpected response: {0}")]
    Decode(String),

    /// Refusal by the backend itself (rate limit, duplicate, constraint).
    /// The message is passed through verbatim.
    #[error("{0}")]
    Rejected(String),

    #[error("Backend misconfigured: {0}")]
    Config(String),
}

impl BackendError {
    /// Classify an error response by its status, error code and message.
    pub fn from_response(status: u16, code: Option<&str>, message: String) -> Self {
        // 23505: unique violation, 23514: check violation
        let constraint_code = matches!(code, Some("23505") | Some("23514") | Some("P0001"));
        if status == 429 || constraint_code || mentions_limit(&message) {
            BackendError::Rejected(message)
        } else {
            BackendError::Status { status, message }
        }
    }

    /// Whether this is a backend-side refusal rather than a fault.
    pub fn is_rejection(&self) -> bool {
        matches!(self, BackendError::Rejected(_))
    }
}

fn mentions_limit(message: &str) -> bool {
    let lower = message.to_lowercase();
    ["rate limit", "duplicate", "constraint"]
        .iter()
        .any(|needle| lower.contains(needle))
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable {0} is required")]
    Missing(&'static str),

    #[error("Invalid {key} value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}
