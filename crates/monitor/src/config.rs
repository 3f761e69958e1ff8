//! Monitor configuration (environment-driven).

use std::time::Duration;

use thiserror::Error;

/// Default job-status polling interval (T_poll).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Default campaign registry refresh interval (T_reg).
pub const DEFAULT_REGISTRY_INTERVAL: Duration = Duration::from_secs(5);
/// Default per-request HTTP timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Prevent zero/near-zero intervals from turning a loop into a busy-loop.
pub const MIN_INTERVAL: Duration = Duration::from_millis(100);

pub const DEFAULT_API_URL: &str = "http://localhost:3000";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a whole number of milliseconds, got '{value}'")]
    InvalidMillis { var: &'static str, value: String },
    #[error("{var} must not be empty")]
    Empty { var: &'static str },
}

/// Runtime configuration for a [`crate::SendMonitor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Base URL of the execution engine API.
    pub api_url: String,
    /// Optional bearer token for the engine API.
    pub auth_token: Option<String>,
    /// How often job status is polled while campaigns are sending.
    pub poll_interval: Duration,
    /// How often the campaign registry refreshes on its own.
    pub registry_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            auth_token: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            registry_interval: DEFAULT_REGISTRY_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl MonitorConfig {
    /// Load configuration from `SENDWATCH_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("SENDWATCH_API_URL") {
            let url = url.trim().trim_end_matches('/').to_string();
            if url.is_empty() {
                return Err(ConfigError::Empty {
                    var: "SENDWATCH_API_URL",
                });
            }
            config.api_url = url;
        }

        config.auth_token = lookup("SENDWATCH_AUTH_TOKEN")
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        if let Some(d) = millis(&lookup, "SENDWATCH_POLL_INTERVAL_MS")? {
            config = config.with_poll_interval(d);
        }
        if let Some(d) = millis(&lookup, "SENDWATCH_REGISTRY_INTERVAL_MS")? {
            config = config.with_registry_interval(d);
        }
        if let Some(d) = millis(&lookup, "SENDWATCH_REQUEST_TIMEOUT_MS")? {
            config.request_timeout = d;
        }

        Ok(config)
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(MIN_INTERVAL);
        self
    }

    pub fn with_registry_interval(mut self, interval: Duration) -> Self {
        self.registry_interval = interval.max(MIN_INTERVAL);
        self
    }
}

fn millis<F>(lookup: &F, var: &'static str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };

    raw.trim()
        .parse::<u64>()
        .map(|ms| Some(Duration::from_millis(ms)))
        .map_err(|_| ConfigError::InvalidMillis { var, value: raw })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = MonitorConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, MonitorConfig::default());
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.registry_interval, Duration::from_secs(5));
    }

    #[test]
    fn reads_overrides() {
        let config = MonitorConfig::from_lookup(lookup(&[
            ("SENDWATCH_API_URL", "https://mail.example.com/"),
            ("SENDWATCH_AUTH_TOKEN", "secret"),
            ("SENDWATCH_POLL_INTERVAL_MS", "1500"),
            ("SENDWATCH_REGISTRY_INTERVAL_MS", "8000"),
        ]))
        .unwrap();

        assert_eq!(config.api_url, "https://mail.example.com");
        assert_eq!(config.auth_token.as_deref(), Some("secret"));
        assert_eq!(config.poll_interval, Duration::from_millis(1500));
        assert_eq!(config.registry_interval, Duration::from_secs(8));
    }

    #[test]
    fn intervals_are_clamped_to_floor() {
        let config =
            MonitorConfig::from_lookup(lookup(&[("SENDWATCH_POLL_INTERVAL_MS", "0")])).unwrap();
        assert_eq!(config.poll_interval, MIN_INTERVAL);
    }

    #[test]
    fn malformed_interval_is_an_error() {
        let err = MonitorConfig::from_lookup(lookup(&[("SENDWATCH_POLL_INTERVAL_MS", "2s")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidMillis {
                var: "SENDWATCH_POLL_INTERVAL_MS",
                value: "2s".to_string()
            }
        );
    }

    #[test]
    fn blank_token_is_ignored() {
        let config = MonitorConfig::from_lookup(lookup(&[("SENDWATCH_AUTH_TOKEN", "  ")])).unwrap();
        assert!(config.auth_token.is_none());
    }
}
