use std::{env, fmt::Display, path::PathBuf, str::FromStr, time::Duration};

use url::Url;

use crate::error::ConfigError;
use crate::render::Canvas;

pub const DEFAULT_SCOPE: &str = "Magic Newton";

/// Runtime settings, read from `SENTIMENT_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub backend_url: Option<String>,
    pub backend_key: Option<String>,
    pub scope: String,
    pub canvas: Canvas,
    pub history_limit: usize,
    pub status_poll: Duration,
    pub feed_poll: Duration,
    pub identity_path: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Ok(Self {
            backend_url: optional("SENTIMENT_BACKEND_URL"),
            backend_key: optional("SENTIMENT_BACKEND_KEY"),
            scope: try_load("SENTIMENT_SCOPE", DEFAULT_SCOPE)?,
            canvas: Canvas::new(
                try_load("SENTIMENT_CANVAS_WIDTH", "700")?,
                try_load("SENTIMENT_CANVAS_HEIGHT", "400")?,
            ),
            history_limit: try_load("SENTIMENT_HISTORY_LIMIT", "100")?,
            status_poll: Duration::from_secs(positive("SENTIMENT_STATUS_POLL_SECS", "30")?),
            feed_poll: Duration::from_millis(positive("SENTIMENT_FEED_POLL_MS", "2000")?),
            identity_path: try_load("SENTIMENT_IDENTITY_PATH", ".sentiment_user_id")?,
        })
    }

    /// Backend base URL and key, required by every networked command.
    pub fn backend(&self) -> Result<(Url, &str), ConfigError> {
        let raw = self
            .backend_url
            .as_deref()
            .ok_or(ConfigError::Missing("SENTIMENT_BACKEND_URL"))?;
        let key = self
            .backend_key
            .as_deref()
            .ok_or(ConfigError::Missing("SENTIMENT_BACKEND_KEY"))?;
        let url = Url::parse(raw).map_err(|e| ConfigError::Invalid {
            key: "SENTIMENT_BACKEND_URL",
            value: raw.to_string(),
            reason: e.to_string(),
        })?;
        Ok((url, key))
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn try_load<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    let value = env::var(key).unwrap_or_else(|_| {
        log::info!("{key} not set, using default: {default}");
        default.to_string()
    });
    value.parse().map_err(|e: T::Err| {
        log::warn!("Invalid {key} value: {e}");
        ConfigError::Invalid {
            key,
            value,
            reason: e.to_string(),
        }
    })
}

/// Poll intervals: zero would spin the poller against the backend.
fn positive(key: &'static str, default: &str) -> Result<u64, ConfigError> {
    match try_load(key, default)? {
        0 => Err(ConfigError::Invalid {
            key,
            value: "0".to_string(),
            reason: "must be greater than zero".to_string(),
        }),
        n => Ok(n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: Option<&str>, key: Option<&str>) -> Config {
        Config {
            backend_url: url.map(String::from),
            backend_key: key.map(String::from),
            scope: DEFAULT_SCOPE.into(),
            canvas: Canvas::default(),
            history_limit: 100,
            status_poll: Duration::from_secs(30),
            feed_poll: Duration::from_millis(2000),
            identity_path: PathBuf::from(".sentiment_user_id"),
        }
    }

    #[test]
    fn backend_requires_url_and_key() {
        assert!(matches!(
            config(None, Some("k")).backend(),
            Err(ConfigError::Missing("SENTIMENT_BACKEND_URL"))
        ));
        assert!(matches!(
            config(Some("https://db.example"), None).backend(),
            Err(ConfigError::Missing("SENTIMENT_BACKEND_KEY"))
        ));
        let cfg = config(Some("https://db.example"), Some("anon"));
        let (url, key) = cfg.backend().unwrap();
        assert_eq!(url.host_str(), Some("db.example"));
        assert_eq!(key, "anon");
    }

    #[test]
    fn malformed_url_is_invalid() {
        let err = config(Some("not a url"), Some("k")).backend().unwrap_err();
        assert!(err.to_string().contains("SENTIMENT_BACKEND_URL"));
    }

    #[test]
    fn parse_failure_reports_key() {
        // variable name unique to this test
        env::set_var("SENTIMENT_TEST_PARSE_NUMBER", "many");
        let err = try_load::<usize>("SENTIMENT_TEST_PARSE_NUMBER", "1").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "SENTIMENT_TEST_PARSE_NUMBER", .. }));
        assert_eq!(try_load::<usize>("SENTIMENT_TEST_UNSET_NUMBER", "7").unwrap(), 7);
    }

    #[test]
    fn zero_interval_is_invalid() {
        env::set_var("SENTIMENT_TEST_ZERO_INTERVAL", "0");
        let err = positive("SENTIMENT_TEST_ZERO_INTERVAL", "30").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "SENTIMENT_TEST_ZERO_INTERVAL", .. }));
        assert!(err.to_string().contains("greater than zero"));

        env::set_var("SENTIMENT_TEST_SOME_INTERVAL", "250");
        assert_eq!(positive("SENTIMENT_TEST_SOME_INTERVAL", "30").unwrap(), 250);
        assert_eq!(positive("SENTIMENT_TEST_UNSET_INTERVAL", "30").unwrap(), 30);
    }
}
