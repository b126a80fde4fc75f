use std::fmt;
use std::time::Duration;

use thiserror::Error;

pub const ENV_SCRATCH_USERNAME: &str = "SCRATCH_USERNAME";
pub const ENV_SCRATCH_PASSWORD: &str = "SCRATCH_PASSWORD";
pub const ENV_PROJECT_ID: &str = "PROJECT_ID";
pub const ENV_GEMINI_API_KEY: &str = "GEMINI_API_KEY";
pub const ENV_GEMINI_MODEL: &str = "GEMINI_MODEL";
pub const ENV_GEMINI_TIMEOUT_SECS: &str = "GEMINI_TIMEOUT_SECS";

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_GEMINI_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Sleep intervals that pace the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTimings {
    /// Between polls of the queue id while connected.
    pub poll_interval: Duration,
    /// After each response slot write.
    pub write_delay: Duration,
    /// Between checks while the session is disconnected.
    pub disconnected_backoff: Duration,
    /// After a cycle fails.
    pub error_backoff: Duration,
    /// Wait after session creation before requiring an `Open` event.
    pub settle: Duration,
}

impl Default for PollTimings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10_000),
            write_delay: Duration::from_millis(300),
            disconnected_backoff: Duration::from_millis(10_000),
            error_backoff: Duration::from_millis(5_000),
            settle: Duration::from_millis(5_000),
        }
    }
}

/// Top-level relay configuration.
#[derive(Clone)]
pub struct RelayConfig {
    pub scratch_username: String,
    pub scratch_password: String,
    /// Project whose cloud variables carry the traffic.
    pub project_id: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_timeout: Duration,
    pub timings: PollTimings,
}

impl RelayConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through an arbitrary lookup. Empty values count as missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        let required = [
            ENV_SCRATCH_USERNAME,
            ENV_SCRATCH_PASSWORD,
            ENV_PROJECT_ID,
            ENV_GEMINI_API_KEY,
        ];
        let missing: Vec<&'static str> = required
            .iter()
            .copied()
            .filter(|&name| get(name).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let gemini_timeout = match get(ENV_GEMINI_TIMEOUT_SECS) {
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                    name: ENV_GEMINI_TIMEOUT_SECS,
                    reason: format!("expected whole seconds, got {raw:?}"),
                })?;
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_GEMINI_TIMEOUT_SECS),
        };

        Ok(Self {
            scratch_username: get(ENV_SCRATCH_USERNAME).unwrap_or_default(),
            scratch_password: get(ENV_SCRATCH_PASSWORD).unwrap_or_default(),
            project_id: get(ENV_PROJECT_ID).unwrap_or_default(),
            gemini_api_key: get(ENV_GEMINI_API_KEY).unwrap_or_default(),
            gemini_model: get(ENV_GEMINI_MODEL).unwrap_or_else(|| DEFAULT_GEMINI_MODEL.into()),
            gemini_timeout,
            timings: PollTimings::default(),
        })
    }
}

// Secrets stay out of logs.
impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("scratch_username", &self.scratch_username)
            .field("scratch_password", &"<redacted>")
            .field("project_id", &self.project_id)
            .field("gemini_api_key", &"<redacted>")
            .field("gemini_model", &self.gemini_model)
            .field("gemini_timeout", &self.gemini_timeout)
            .field("timings", &self.timings)
            .finish()
    }
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
        move |name: &str| map.get(name).cloned()
    }

    fn full() -> Vec<(&'static str, &'static str)> {
        vec![
            (ENV_SCRATCH_USERNAME, "relay_bot"),
            (ENV_SCRATCH_PASSWORD, "hunter2"),
            (ENV_PROJECT_ID, "123456789"),
            (ENV_GEMINI_API_KEY, "AIza-test"),
        ]
    }

    #[test]
    fn test_complete_config() {
        let config = RelayConfig::from_lookup(lookup(&full())).unwrap();
        assert_eq!(config.scratch_username, "relay_bot");
        assert_eq!(config.project_id, "123456789");
        assert_eq!(config.gemini_model, DEFAULT_GEMINI_MODEL);
        assert_eq!(config.gemini_timeout, Duration::from_secs(60));
        assert_eq!(config.timings, PollTimings::default());
    }

    #[test]
    fn test_missing_values_are_all_reported() {
        let err = RelayConfig::from_lookup(lookup(&[(ENV_SCRATCH_USERNAME, "relay_bot")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::Missing(vec![
                ENV_SCRATCH_PASSWORD,
                ENV_PROJECT_ID,
                ENV_GEMINI_API_KEY
            ])
        );
        assert!(err.to_string().contains("SCRATCH_PASSWORD, PROJECT_ID"));
    }

    #[test]
    fn test_empty_counts_as_missing() {
        let mut pairs = full();
        pairs[3] = (ENV_GEMINI_API_KEY, "");
        let err = RelayConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert_eq!(err, ConfigError::Missing(vec![ENV_GEMINI_API_KEY]));
    }

    #[test]
    fn test_whitespace_value_is_present() {
        let mut pairs = full();
        pairs[1] = (ENV_SCRATCH_PASSWORD, "  ");
        let config = RelayConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.scratch_password, "  ");
    }

    #[test]
    fn test_optional_overrides() {
        let mut pairs = full();
        pairs.push((ENV_GEMINI_MODEL, "gemini-2.5-pro"));
        pairs.push((ENV_GEMINI_TIMEOUT_SECS, "15"));
        let config = RelayConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.gemini_model, "gemini-2.5-pro");
        assert_eq!(config.gemini_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_invalid_timeout() {
        let mut pairs = full();
        pairs.push((ENV_GEMINI_TIMEOUT_SECS, "soon"));
        let err = RelayConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: ENV_GEMINI_TIMEOUT_SECS,
                ..
            }
        ));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = RelayConfig::from_lookup(lookup(&full())).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("AIza-test"));
        assert!(debug.contains("relay_bot"));
    }

    #[test]
    fn test_default_timings() {
        let timings = PollTimings::default();
        assert_eq!(timings.poll_interval, Duration::from_secs(10));
        assert_eq!(timings.write_delay, Duration::from_millis(300));
        assert_eq!(timings.disconnected_backoff, Duration::from_secs(10));
        assert_eq!(timings.error_backoff, Duration::from_secs(5));
        assert_eq!(timings.settle, Duration::from_secs(5));
    }
}
